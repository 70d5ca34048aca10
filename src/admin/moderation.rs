/// Player moderation records (kicks, warnings, bans)
use crate::{
    auth::Actor,
    error::{DashboardError, DashboardResult},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection, SqlitePool};

/// Moderation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModerationKind {
    Kick,
    Warn,
    Ban,
}

impl ModerationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModerationKind::Kick => "kick",
            ModerationKind::Warn => "warn",
            ModerationKind::Ban => "ban",
        }
    }

    pub fn from_str(s: &str) -> DashboardResult<Self> {
        match s.to_lowercase().as_str() {
            "kick" => Ok(ModerationKind::Kick),
            "warn" => Ok(ModerationKind::Warn),
            "ban" => Ok(ModerationKind::Ban),
            _ => Err(DashboardError::Validation(format!("Invalid moderation kind: {}", s))),
        }
    }
}

/// Moderation record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationRecord {
    pub id: i64,
    #[serde(rename = "steamID")]
    pub steam_id: String,
    #[serde(rename = "moderatorSteamID")]
    pub moderator_steam_id: Option<String>,
    pub moderator_name: Option<String>,
    pub moderator_discord_id: Option<String>,
    pub kind: ModerationKind,
    pub reason: String,
    /// Epoch milliseconds; `None` is permanent for bans and unused otherwise
    pub end_date: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub lifted: bool,
    pub lifted_at: Option<DateTime<Utc>>,
}

impl ModerationRecord {
    /// A ban that is neither lifted nor expired at `now_ms`
    pub fn is_active_ban(&self, now_ms: i64) -> bool {
        self.kind == ModerationKind::Ban && !self.lifted && self.end_date.map_or(true, |end| end > now_ms)
    }
}

/// Moderation record waiting to be written
#[derive(Debug, Clone)]
pub struct NewModeration {
    pub steam_id: String,
    pub moderator_steam_id: Option<String>,
    pub moderator_name: Option<String>,
    pub moderator_discord_id: Option<String>,
    pub kind: ModerationKind,
    pub reason: String,
    pub end_date: Option<i64>,
}

impl NewModeration {
    pub fn new(
        steam_id: impl Into<String>,
        moderator: &Actor,
        kind: ModerationKind,
        reason: impl Into<String>,
        end_date: Option<i64>,
    ) -> Self {
        Self {
            steam_id: steam_id.into(),
            moderator_steam_id: moderator.steam.steam64id.clone(),
            moderator_name: moderator.display_name().map(str::to_string),
            moderator_discord_id: moderator.user_id().map(str::to_string),
            kind,
            reason: reason.into(),
            end_date,
        }
    }
}

/// Per-kind totals for one player
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ModerationCount {
    pub kick: i64,
    pub warn: i64,
    pub ban: i64,
}

const ACTIVE_BAN_FILTER: &str =
    "kind = 'ban' AND lifted = 0 AND (end_date IS NULL OR end_date > ?)";

/// Moderation manager
#[derive(Clone)]
pub struct ModerationManager {
    db: SqlitePool,
}

impl ModerationManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Insert a record on an existing connection or transaction
    pub async fn insert_in(
        conn: &mut SqliteConnection,
        record: &NewModeration,
    ) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO moderation
            (steam_id, moderator_steam_id, moderator_name, moderator_discord_id,
             kind, reason, end_date, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.steam_id)
        .bind(&record.moderator_steam_id)
        .bind(&record.moderator_name)
        .bind(&record.moderator_discord_id)
        .bind(record.kind.as_str())
        .bind(&record.reason)
        .bind(record.end_date)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *conn)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Insert a ban only if the player has no active ban at `now_ms`.
    ///
    /// Returns `None` when an active ban already exists. The check and the
    /// insert are one statement.
    pub async fn insert_ban_if_clear_in(
        conn: &mut SqliteConnection,
        record: &NewModeration,
        now_ms: i64,
    ) -> Result<Option<i64>, sqlx::Error> {
        let sql = format!(
            r#"
            INSERT INTO moderation
            (steam_id, moderator_steam_id, moderator_name, moderator_discord_id,
             kind, reason, end_date, created_at)
            SELECT ?, ?, ?, ?, 'ban', ?, ?, ?
            WHERE NOT EXISTS (
                SELECT 1 FROM moderation WHERE steam_id = ? AND {}
            )
            "#,
            ACTIVE_BAN_FILTER
        );

        let result = sqlx::query(&sql)
            .bind(&record.steam_id)
            .bind(&record.moderator_steam_id)
            .bind(&record.moderator_name)
            .bind(&record.moderator_discord_id)
            .bind(&record.reason)
            .bind(record.end_date)
            .bind(Utc::now().to_rfc3339())
            .bind(&record.steam_id)
            .bind(now_ms)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            Ok(None)
        } else {
            Ok(Some(result.last_insert_rowid()))
        }
    }

    /// Record a moderation action outside of a command dispatch
    pub async fn add(&self, record: &NewModeration) -> DashboardResult<i64> {
        let mut conn = self.db.acquire().await.map_err(DashboardError::persistence)?;
        Self::insert_in(&mut conn, record)
            .await
            .map_err(DashboardError::persistence)
    }

    /// Active ban for a player, if any
    pub async fn active_ban(&self, steam_id: &str, now_ms: i64) -> DashboardResult<Option<ModerationRecord>> {
        let sql = format!(
            r#"
            SELECT id, steam_id, moderator_steam_id, moderator_name, moderator_discord_id,
                   kind, reason, end_date, created_at, lifted, lifted_at
            FROM moderation
            WHERE steam_id = ? AND {}
            ORDER BY id DESC
            LIMIT 1
            "#,
            ACTIVE_BAN_FILTER
        );

        let row = sqlx::query(&sql)
            .bind(steam_id)
            .bind(now_ms)
            .fetch_optional(&self.db)
            .await?;

        row.as_ref().map(parse_record).transpose()
    }

    /// Every active ban, oldest first
    pub async fn active_bans(&self, now_ms: i64) -> DashboardResult<Vec<ModerationRecord>> {
        let sql = format!(
            r#"
            SELECT id, steam_id, moderator_steam_id, moderator_name, moderator_discord_id,
                   kind, reason, end_date, created_at, lifted, lifted_at
            FROM moderation
            WHERE {}
            ORDER BY id ASC
            "#,
            ACTIVE_BAN_FILTER
        );

        let rows = sqlx::query(&sql).bind(now_ms).fetch_all(&self.db).await?;

        rows.iter().map(parse_record).collect()
    }

    /// Per-kind totals for a player
    pub async fn count(&self, steam_id: &str) -> DashboardResult<ModerationCount> {
        let rows = sqlx::query(
            r#"
            SELECT kind, COUNT(*) AS total
            FROM moderation
            WHERE steam_id = ?
            GROUP BY kind
            "#,
        )
        .bind(steam_id)
        .fetch_all(&self.db)
        .await?;

        let mut count = ModerationCount::default();
        for row in rows {
            let kind: String = row.get("kind");
            let total: i64 = row.get("total");
            match ModerationKind::from_str(&kind)? {
                ModerationKind::Kick => count.kick = total,
                ModerationKind::Warn => count.warn = total,
                ModerationKind::Ban => count.ban = total,
            }
        }

        Ok(count)
    }

    /// Lift the ban with the given end date (`None` for permanent bans)
    pub async fn lift_ban(
        &self,
        steam_id: &str,
        end_date: Option<i64>,
        lifted_by: Option<&str>,
        reason: &str,
    ) -> DashboardResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE moderation
            SET lifted = 1,
                lifted_at = ?,
                lifted_by = ?,
                lift_reason = ?
            WHERE steam_id = ? AND kind = 'ban' AND lifted = 0 AND end_date IS ?
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(lifted_by)
        .bind(reason)
        .bind(steam_id)
        .bind(end_date)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DashboardError::NotFound(format!(
                "No ban found for {}",
                steam_id
            )));
        }

        Ok(result.rows_affected())
    }

    /// Full history for a player, newest first
    pub async fn history(&self, steam_id: &str) -> DashboardResult<Vec<ModerationRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, steam_id, moderator_steam_id, moderator_name, moderator_discord_id,
                   kind, reason, end_date, created_at, lifted, lifted_at
            FROM moderation
            WHERE steam_id = ?
            ORDER BY id DESC
            "#,
        )
        .bind(steam_id)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(parse_record).collect()
    }
}

fn parse_record(row: &SqliteRow) -> DashboardResult<ModerationRecord> {
    let kind_str: String = row.get("kind");
    let kind = ModerationKind::from_str(&kind_str)?;

    let created_at_str: String = row.get("created_at");
    let created_at = DateTime::parse_from_rfc3339(&created_at_str)
        .map_err(|e| DashboardError::Internal(format!("Invalid timestamp: {}", e)))?
        .with_timezone(&Utc);

    let lifted_at = row
        .try_get::<String, _>("lifted_at")
        .ok()
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc));

    Ok(ModerationRecord {
        id: row.get("id"),
        steam_id: row.get("steam_id"),
        moderator_steam_id: row.get("moderator_steam_id"),
        moderator_name: row.get("moderator_name"),
        moderator_discord_id: row.get("moderator_discord_id"),
        kind,
        reason: row.get("reason"),
        end_date: row.get("end_date"),
        created_at,
        lifted: row.get("lifted"),
        lifted_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_memory_pool;

    fn ban(steam_id: &str, end_date: Option<i64>) -> NewModeration {
        NewModeration::new(steam_id, &Actor::default(), ModerationKind::Ban, "cheating", end_date)
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!(ModerationKind::from_str("ban").unwrap(), ModerationKind::Ban);
        assert_eq!(ModerationKind::from_str("KICK").unwrap(), ModerationKind::Kick);
        assert!(ModerationKind::from_str("mute").is_err());
    }

    #[tokio::test]
    async fn test_active_ban_respects_end_date_and_permanence() {
        let manager = ModerationManager::new(create_memory_pool().await.unwrap());
        let now = 1_700_000_000_000;

        manager.add(&ban("expired", Some(now - 1))).await.unwrap();
        manager.add(&ban("temporary", Some(now + 60_000))).await.unwrap();
        manager.add(&ban("permanent", None)).await.unwrap();
        manager
            .add(&NewModeration::new("kicked", &Actor::default(), ModerationKind::Kick, "afk", None))
            .await
            .unwrap();

        assert!(manager.active_ban("expired", now).await.unwrap().is_none());
        assert!(manager.active_ban("temporary", now).await.unwrap().is_some());
        assert!(manager.active_ban("permanent", now).await.unwrap().is_some());
        assert!(manager.active_ban("kicked", now).await.unwrap().is_none());

        let bans = manager.active_bans(now).await.unwrap();
        assert_eq!(bans.len(), 2);
        assert!(bans.iter().all(|b| b.is_active_ban(now)));
    }

    #[tokio::test]
    async fn test_conditional_ban_insert_refuses_duplicates() {
        let pool = create_memory_pool().await.unwrap();
        let now = 1_700_000_000_000;
        let mut conn = pool.acquire().await.unwrap();

        let first = ModerationManager::insert_ban_if_clear_in(&mut conn, &ban("765", None), now)
            .await
            .unwrap();
        assert!(first.is_some());

        let second = ModerationManager::insert_ban_if_clear_in(&mut conn, &ban("765", Some(now + 1)), now)
            .await
            .unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn test_count_and_lift() {
        let manager = ModerationManager::new(create_memory_pool().await.unwrap());
        let now = Utc::now().timestamp_millis();

        for kind in [ModerationKind::Warn, ModerationKind::Warn, ModerationKind::Kick] {
            manager
                .add(&NewModeration::new("765", &Actor::default(), kind, "reason", None))
                .await
                .unwrap();
        }
        manager.add(&ban("765", Some(now + 60_000))).await.unwrap();

        let count = manager.count("765").await.unwrap();
        assert_eq!(count, ModerationCount { kick: 1, warn: 2, ban: 1 });

        assert!(manager.lift_ban("765", None, Some("42"), "appeal").await.is_err());
        manager
            .lift_ban("765", Some(now + 60_000), Some("42"), "appeal")
            .await
            .unwrap();
        assert!(manager.active_ban("765", now).await.unwrap().is_none());

        let history = manager.history("765").await.unwrap();
        assert_eq!(history.len(), 4);
        assert!(history[0].lifted);
    }
}
