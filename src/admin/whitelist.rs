/// Squad remote-admin whitelist (admins.cfg groups and entries)
use crate::error::{DashboardError, DashboardResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Whitelist group with its in-game permissions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhitelistGroup {
    pub permissions: Vec<String>,
}

/// Whitelisted player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhitelistEntry {
    pub role: String,
    pub description: String,
}

/// Full whitelist, keyed by group name and steam id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Whitelist {
    pub roles: BTreeMap<String, WhitelistGroup>,
    pub whitelisted: BTreeMap<String, WhitelistEntry>,
}

fn group_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*Group=(.*?):(.*)$").expect("valid group regex"))
}

fn admin_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^\s*Admin=([^:\r\n]*):([^\r\n]*?)(?://([^\r\n]*))?\r?$")
            .expect("valid admin regex")
    })
}

/// Parse the contents of an `admins.cfg` file
pub fn parse_admin_cfg(content: &str) -> Whitelist {
    let mut whitelist = Whitelist::default();

    for caps in group_line().captures_iter(content) {
        let name = caps[1].trim().to_string();
        let permissions = caps[2]
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();
        whitelist.roles.insert(name, WhitelistGroup { permissions });
    }

    for caps in admin_line().captures_iter(content) {
        let steam_id = caps[1].trim().to_string();
        let role = caps[2].trim().to_string();
        if steam_id.is_empty() || role.is_empty() {
            continue;
        }
        let description = caps
            .get(3)
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default();
        whitelist
            .whitelisted
            .insert(steam_id, WhitelistEntry { role, description });
    }

    whitelist
}

/// Render the whitelist in the format the game server fetches
pub fn render_admin_cfg(whitelist: &Whitelist) -> String {
    let mut out = String::new();

    for (name, group) in &whitelist.roles {
        out.push_str(&format!("Group={}:{}\n", name, group.permissions.join(",")));
    }
    for (steam_id, entry) in &whitelist.whitelisted {
        out.push_str(&format!(
            "Admin={}:{} // {}\n",
            steam_id, entry.role, entry.description
        ));
    }

    out
}

/// Group names are restricted to ASCII letters, digits and underscores
pub fn sanitize_group_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect()
}

/// Whitelist storage
#[derive(Clone)]
pub struct WhitelistManager {
    db: SqlitePool,
}

impl WhitelistManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Current whitelist
    pub async fn load(&self) -> DashboardResult<Whitelist> {
        let mut whitelist = Whitelist::default();

        let groups: Vec<String> =
            sqlx::query_scalar("SELECT name FROM whitelist_groups ORDER BY name")
                .fetch_all(&self.db)
                .await?;
        for group in groups {
            whitelist.roles.insert(group, WhitelistGroup::default());
        }

        let permissions: Vec<(String, String)> = sqlx::query_as(
            "SELECT group_name, permission FROM whitelist_group_permissions ORDER BY rowid",
        )
        .fetch_all(&self.db)
        .await?;
        for (group, permission) in permissions {
            whitelist
                .roles
                .entry(group)
                .or_default()
                .permissions
                .push(permission);
        }

        let users: Vec<(String, String, String)> = sqlx::query_as(
            "SELECT steam_id, group_name, description FROM whitelist_users ORDER BY steam_id",
        )
        .fetch_all(&self.db)
        .await?;
        for (steam_id, role, description) in users {
            whitelist
                .whitelisted
                .insert(steam_id, WhitelistEntry { role, description });
        }

        Ok(whitelist)
    }

    /// Create a group; the name is sanitized first and the sanitized name returned
    pub async fn add_group(&self, name: &str) -> DashboardResult<String> {
        let name = sanitize_group_name(name);
        if name.is_empty() {
            return Err(DashboardError::Validation(
                "Group name must contain letters, digits or underscores".to_string(),
            ));
        }

        let result = sqlx::query("INSERT OR IGNORE INTO whitelist_groups (name) VALUES (?)")
            .bind(&name)
            .execute(&self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DashboardError::Conflict(format!("Group {} already exists", name)));
        }

        Ok(name)
    }

    /// Delete a group along with its permissions and members
    pub async fn remove_group(&self, name: &str) -> DashboardResult<()> {
        let result = sqlx::query("DELETE FROM whitelist_groups WHERE name = ?")
            .bind(name)
            .execute(&self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DashboardError::NotFound(format!("Group {} not found", name)));
        }
        Ok(())
    }

    pub async fn add_permission(&self, group: &str, permission: &str) -> DashboardResult<()> {
        self.require_group(group).await?;
        sqlx::query(
            "INSERT OR IGNORE INTO whitelist_group_permissions (group_name, permission) VALUES (?, ?)",
        )
        .bind(group)
        .bind(permission.trim())
        .execute(&self.db)
        .await?;
        Ok(())
    }

    pub async fn remove_permission(&self, group: &str, permission: &str) -> DashboardResult<()> {
        let result = sqlx::query(
            "DELETE FROM whitelist_group_permissions WHERE group_name = ? AND permission = ?",
        )
        .bind(group)
        .bind(permission.trim())
        .execute(&self.db)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DashboardError::NotFound(format!(
                "Permission {} not found on group {}",
                permission, group
            )));
        }
        Ok(())
    }

    /// Insert or replace a whitelist entry
    pub async fn add_user(
        &self,
        steam_id: &str,
        group: &str,
        description: &str,
    ) -> DashboardResult<()> {
        self.require_group(group).await?;
        sqlx::query(
            r#"
            INSERT INTO whitelist_users (steam_id, group_name, description)
            VALUES (?, ?, ?)
            ON CONFLICT(steam_id) DO UPDATE SET
                group_name = excluded.group_name,
                description = excluded.description
            "#,
        )
        .bind(steam_id)
        .bind(group)
        .bind(description)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    pub async fn remove_user(&self, steam_id: &str) -> DashboardResult<()> {
        let result = sqlx::query("DELETE FROM whitelist_users WHERE steam_id = ?")
            .bind(steam_id)
            .execute(&self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DashboardError::NotFound(format!(
                "{} is not whitelisted",
                steam_id
            )));
        }
        Ok(())
    }

    /// Replace the stored whitelist with an imported one. Entries whose group is
    /// not declared in the file get an empty group so the import never loses a player.
    pub async fn import(&self, whitelist: &Whitelist) -> DashboardResult<()> {
        let mut tx = self.db.begin().await?;

        sqlx::query("DELETE FROM whitelist_users").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM whitelist_group_permissions")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM whitelist_groups").execute(&mut *tx).await?;

        for (name, group) in &whitelist.roles {
            sqlx::query("INSERT OR IGNORE INTO whitelist_groups (name) VALUES (?)")
                .bind(name)
                .execute(&mut *tx)
                .await?;
            for permission in &group.permissions {
                sqlx::query(
                    "INSERT OR IGNORE INTO whitelist_group_permissions (group_name, permission) VALUES (?, ?)",
                )
                .bind(name)
                .bind(permission)
                .execute(&mut *tx)
                .await?;
            }
        }

        for (steam_id, entry) in &whitelist.whitelisted {
            sqlx::query("INSERT OR IGNORE INTO whitelist_groups (name) VALUES (?)")
                .bind(&entry.role)
                .execute(&mut *tx)
                .await?;
            sqlx::query(
                "INSERT OR REPLACE INTO whitelist_users (steam_id, group_name, description) VALUES (?, ?, ?)",
            )
            .bind(steam_id)
            .bind(&entry.role)
            .bind(&entry.description)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::info!(
            groups = whitelist.roles.len(),
            players = whitelist.whitelisted.len(),
            "Whitelist imported"
        );

        Ok(())
    }

    async fn require_group(&self, group: &str) -> DashboardResult<()> {
        let found: Option<String> =
            sqlx::query_scalar("SELECT name FROM whitelist_groups WHERE name = ?")
                .bind(group)
                .fetch_optional(&self.db)
                .await?;
        found
            .map(|_| ())
            .ok_or_else(|| DashboardError::NotFound(format!("Group {} not found", group)))
    }
}
