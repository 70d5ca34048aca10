/// Append-only audit log of dashboard actions
use crate::{
    auth::{Actor, DiscordAccount, SteamAccount},
    error::{DashboardError, DashboardResult},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection, SqlitePool};

/// Who performed an audited action; either half may be unknown
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditAuthor {
    pub discord: Option<DiscordAccount>,
    pub steam: Option<SteamAccount>,
}

impl AuditAuthor {
    pub fn from_actor(actor: &Actor) -> Self {
        let discord = &actor.discord;
        let steam = &actor.steam;

        let has_discord =
            discord.id.is_some() || discord.username.is_some() || discord.discriminator.is_some();
        let has_steam =
            steam.steam64id.is_some() || steam.display_name.is_some() || steam.identifier.is_some();

        Self {
            discord: has_discord.then(|| discord.clone()),
            steam: has_steam.then(|| steam.clone()),
        }
    }
}

/// Persisted audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: i64,
    pub action: String,
    pub author: AuditAuthor,
    pub ip: Option<String>,
    pub details: Value,
    pub timestamp: DateTime<Utc>,
}

/// Audit entry waiting to be written
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub action: String,
    pub author: AuditAuthor,
    pub ip: Option<String>,
    pub details: Value,
}

impl NewAuditEntry {
    pub fn new(action: impl Into<String>, actor: &Actor, details: Value) -> Self {
        Self {
            action: action.into(),
            author: AuditAuthor::from_actor(actor),
            ip: actor.ip.clone(),
            details,
        }
    }
}

/// Audit recorder
#[derive(Clone)]
pub struct AuditRecorder {
    db: SqlitePool,
}

impl AuditRecorder {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Persist an entry. Failures surface as `Persistence` so callers can tell
    /// "the action happened but was not logged" apart from "the action failed".
    pub async fn record(&self, entry: NewAuditEntry) -> DashboardResult<i64> {
        let mut conn = self.db.acquire().await.map_err(DashboardError::persistence)?;
        let id = Self::record_in(&mut conn, &entry)
            .await
            .map_err(DashboardError::persistence)?;

        tracing::info!(audit_id = id, action = %entry.action, "Audit entry recorded");

        Ok(id)
    }

    /// Insert on an existing connection or transaction
    pub async fn record_in(
        conn: &mut SqliteConnection,
        entry: &NewAuditEntry,
    ) -> Result<i64, sqlx::Error> {
        let discord = entry.author.discord.clone().unwrap_or_default();
        let steam = entry.author.steam.clone().unwrap_or_default();

        let result = sqlx::query(
            r#"
            INSERT INTO audit_log
            (action, discord_id, discord_username, discord_discriminator,
             steam_id, steam_name, steam_profile, ip_address, details, timestamp)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.action)
        .bind(&discord.id)
        .bind(&discord.username)
        .bind(&discord.discriminator)
        .bind(&steam.steam64id)
        .bind(&steam.display_name)
        .bind(&steam.identifier)
        .bind(&entry.ip)
        .bind(entry.details.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *conn)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Most recent entries, newest first
    pub async fn recent(&self, limit: i64) -> DashboardResult<Vec<AuditLogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, action, discord_id, discord_username, discord_discriminator,
                   steam_id, steam_name, steam_profile, ip_address, details, timestamp
            FROM audit_log
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(parse_entry).collect()
    }
}

fn parse_entry(row: &SqliteRow) -> DashboardResult<AuditLogEntry> {
    let timestamp_str: String = row.get("timestamp");
    let timestamp = DateTime::parse_from_rfc3339(&timestamp_str)
        .map_err(|e| DashboardError::Internal(format!("Invalid timestamp: {}", e)))?
        .with_timezone(&Utc);

    let details_str: String = row.get("details");
    let details = serde_json::from_str(&details_str).unwrap_or(Value::Null);

    let discord = DiscordAccount {
        id: row.get("discord_id"),
        username: row.get("discord_username"),
        discriminator: row.get("discord_discriminator"),
    };
    let steam = SteamAccount {
        steam64id: row.get("steam_id"),
        display_name: row.get("steam_name"),
        identifier: row.get("steam_profile"),
    };

    Ok(AuditLogEntry {
        id: row.get("id"),
        action: row.get("action"),
        author: AuditAuthor::from_actor(&Actor {
            discord,
            steam,
            ip: None,
        }),
        ip: row.get("ip_address"),
        details,
        timestamp,
    })
}
