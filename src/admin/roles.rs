/// Dashboard roles and the permission resolver
use crate::error::{DashboardError, DashboardResult, SCHEMA_INVALID};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use std::collections::{BTreeMap, BTreeSet};

/// The role that can never be removed
pub const OWNER_ROLE: &str = "owner";

/// Permission-gated game-server actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Action {
    #[serde(rename = "setNextMap")]
    SetNextMap,
    #[serde(rename = "setCurrentMap")]
    SetCurrentMap,
    #[serde(rename = "broadcast")]
    Broadcast,
    #[serde(rename = "kick")]
    Kick,
    #[serde(rename = "warn")]
    Warn,
    #[serde(rename = "ban")]
    Ban,
    #[serde(rename = "disbandSquad")]
    DisbandSquad,
    #[serde(rename = "removeFromSquad")]
    RemoveFromSquad,
}

impl Action {
    pub const ALL: [Action; 8] = [
        Action::SetNextMap,
        Action::SetCurrentMap,
        Action::Broadcast,
        Action::Kick,
        Action::Warn,
        Action::Ban,
        Action::DisbandSquad,
        Action::RemoveFromSquad,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::SetNextMap => "setNextMap",
            Action::SetCurrentMap => "setCurrentMap",
            Action::Broadcast => "broadcast",
            Action::Kick => "kick",
            Action::Warn => "warn",
            Action::Ban => "ban",
            Action::DisbandSquad => "disbandSquad",
            Action::RemoveFromSquad => "removeFromSquad",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|action| action.as_str() == s)
    }
}

/// Dashboard pages whose visibility is role-gated
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Page {
    Dashboard,
    Players,
    Logs,
    Moderation,
    Roles,
    Whitelist,
    Banlist,
    Settings,
}

impl Page {
    pub const ALL: [Page; 8] = [
        Page::Dashboard,
        Page::Players,
        Page::Logs,
        Page::Moderation,
        Page::Roles,
        Page::Whitelist,
        Page::Banlist,
        Page::Settings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Page::Dashboard => "dashboard",
            Page::Players => "players",
            Page::Logs => "logs",
            Page::Moderation => "moderation",
            Page::Roles => "roles",
            Page::Whitelist => "whitelist",
            Page::Banlist => "banlist",
            Page::Settings => "settings",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|page| page.as_str() == s)
    }
}

/// Result of flipping a grant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    Added,
    Removed,
}

impl Toggle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Toggle::Added => "added",
            Toggle::Removed => "removed",
        }
    }
}

/// Dashboard role with the actions it may perform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    pub permissions: BTreeSet<Action>,
}

/// Action → allowed roles, validated when loaded
#[derive(Debug, Clone, Default)]
pub struct PermissionSchema {
    who_can: BTreeMap<Action, BTreeSet<String>>,
}

impl PermissionSchema {
    /// Build from raw `(action, role)` rows; any unknown action name invalidates the schema
    pub fn from_rows<I>(rows: I) -> DashboardResult<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut who_can: BTreeMap<Action, BTreeSet<String>> = BTreeMap::new();
        for (action_name, role) in rows {
            let action = Action::from_str(&action_name).ok_or_else(|| {
                tracing::error!(action = %action_name, "Unknown action in permission table");
                DashboardError::SchemaInvalid(SCHEMA_INVALID.to_string())
            })?;
            who_can.entry(action).or_default().insert(role);
        }

        Ok(Self { who_can })
    }

    pub fn who_can(&self, action: Action) -> BTreeSet<String> {
        self.who_can.get(&action).cloned().unwrap_or_default()
    }

    /// True iff the role sets intersect
    pub fn allows(&self, roles: &BTreeSet<String>, action: Action) -> bool {
        self.who_can
            .get(&action)
            .map_or(false, |allowed| !allowed.is_disjoint(roles))
    }
}

/// Dashboard role manager and permission resolver
#[derive(Clone)]
pub struct RoleManager {
    db: SqlitePool,
}

impl RoleManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Roles held by a dashboard user; unknown users hold none
    pub async fn roles_of(&self, user_id: &str) -> DashboardResult<BTreeSet<String>> {
        let roles: Vec<String> =
            sqlx::query_scalar("SELECT role FROM user_roles WHERE user_id = ?")
                .bind(user_id)
                .fetch_all(&self.db)
                .await?;

        Ok(roles.into_iter().collect())
    }

    pub async fn has_role(&self, user_id: Option<&str>, role: &str) -> DashboardResult<bool> {
        match user_id {
            Some(user_id) => Ok(self.roles_of(user_id).await?.contains(role)),
            None => Ok(false),
        }
    }

    /// Load and validate the full action → roles mapping
    pub async fn load_schema(&self) -> DashboardResult<PermissionSchema> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT action, role FROM action_permissions")
                .fetch_all(&self.db)
                .await?;

        PermissionSchema::from_rows(rows)
    }

    /// Roles allowed to perform an action
    pub async fn who_can(&self, action: Action) -> DashboardResult<BTreeSet<String>> {
        Ok(self.load_schema().await?.who_can(action))
    }

    /// Whether the user may perform the action. A corrupted schema is an error, never an allow.
    pub async fn is_allowed(&self, user_id: Option<&str>, action: Action) -> DashboardResult<bool> {
        let schema = self.load_schema().await?;
        let Some(user_id) = user_id else {
            return Ok(false);
        };
        let roles = self.roles_of(user_id).await?;

        Ok(schema.allows(&roles, action))
    }

    /// Whether the user may see a dashboard page
    pub async fn can_see(&self, user_id: Option<&str>, page: Page) -> DashboardResult<bool> {
        let Some(user_id) = user_id else {
            return Ok(false);
        };

        let allowed: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT 1 FROM page_permissions p
            JOIN user_roles u ON u.role = p.role
            WHERE p.page = ? AND u.user_id = ?
            LIMIT 1
            "#,
        )
        .bind(page.as_str())
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(allowed.is_some())
    }

    async fn role_exists(&self, role: &str) -> DashboardResult<bool> {
        let found: Option<String> =
            sqlx::query_scalar("SELECT name FROM dashboard_roles WHERE name = ?")
                .bind(role)
                .fetch_optional(&self.db)
                .await?;
        Ok(found.is_some())
    }

    async fn require_role(&self, role: &str) -> DashboardResult<()> {
        if self.role_exists(role).await? {
            Ok(())
        } else {
            Err(DashboardError::SchemaInvalid(SCHEMA_INVALID.to_string()))
        }
    }

    /// Create a dashboard role
    pub async fn add_role(&self, role: &str) -> DashboardResult<()> {
        let role = role.trim();
        if role.is_empty() || self.role_exists(role).await? {
            return Err(DashboardError::SchemaInvalid(SCHEMA_INVALID.to_string()));
        }

        sqlx::query("INSERT INTO dashboard_roles (name, created_at) VALUES (?, ?)")
            .bind(role)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.db)
            .await?;

        Ok(())
    }

    /// Delete a dashboard role and every grant that references it
    pub async fn remove_role(&self, role: &str) -> DashboardResult<()> {
        if role == OWNER_ROLE {
            return Err(DashboardError::Validation(
                "You can't remove the owner role!".to_string(),
            ));
        }

        let result = sqlx::query("DELETE FROM dashboard_roles WHERE name = ?")
            .bind(role)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DashboardError::SchemaInvalid(SCHEMA_INVALID.to_string()));
        }

        Ok(())
    }

    /// Grant or revoke a role for a user
    pub async fn toggle_user_role(&self, user_id: &str, role: &str) -> DashboardResult<Toggle> {
        self.require_role(role).await?;

        let removed = sqlx::query("DELETE FROM user_roles WHERE user_id = ? AND role = ?")
            .bind(user_id)
            .bind(role)
            .execute(&self.db)
            .await?;

        if removed.rows_affected() > 0 {
            return Ok(Toggle::Removed);
        }

        sqlx::query("INSERT INTO user_roles (user_id, role) VALUES (?, ?)")
            .bind(user_id)
            .bind(role)
            .execute(&self.db)
            .await?;

        Ok(Toggle::Added)
    }

    /// Flip whether a role may perform an action
    pub async fn toggle_who_can(&self, action: &str, role: &str) -> DashboardResult<Toggle> {
        let action = Action::from_str(action)
            .ok_or_else(|| DashboardError::SchemaInvalid(SCHEMA_INVALID.to_string()))?;
        self.require_role(role).await?;

        self.toggle_grant("action_permissions", "action", action.as_str(), role)
            .await
    }

    /// Flip whether a role may see a page
    pub async fn toggle_can_see(&self, page: &str, role: &str) -> DashboardResult<Toggle> {
        let page = Page::from_str(page)
            .ok_or_else(|| DashboardError::SchemaInvalid(SCHEMA_INVALID.to_string()))?;
        self.require_role(role).await?;

        self.toggle_grant("page_permissions", "page", page.as_str(), role)
            .await
    }

    async fn toggle_grant(
        &self,
        table: &str,
        column: &str,
        key: &str,
        role: &str,
    ) -> DashboardResult<Toggle> {
        let removed = sqlx::query(&format!(
            "DELETE FROM {table} WHERE {column} = ? AND role = ?"
        ))
        .bind(key)
        .bind(role)
        .execute(&self.db)
        .await?;

        if removed.rows_affected() > 0 {
            return Ok(Toggle::Removed);
        }

        sqlx::query(&format!(
            "INSERT INTO {table} ({column}, role) VALUES (?, ?)"
        ))
        .bind(key)
        .bind(role)
        .execute(&self.db)
        .await?;

        Ok(Toggle::Added)
    }

    /// All roles with the actions they may perform
    pub async fn list_roles(&self) -> DashboardResult<Vec<Role>> {
        let schema = self.load_schema().await?;
        let rows = sqlx::query("SELECT name FROM dashboard_roles ORDER BY name")
            .fetch_all(&self.db)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let name: String = row.get("name");
                let permissions = Action::ALL
                    .into_iter()
                    .filter(|action| schema.who_can(*action).contains(&name))
                    .collect();
                Role { name, permissions }
            })
            .collect())
    }

    /// Make sure the configured owners hold the owner role
    pub async fn ensure_owners(&self, owner_ids: &[String]) -> DashboardResult<()> {
        for owner in owner_ids {
            sqlx::query("INSERT OR IGNORE INTO user_roles (user_id, role) VALUES (?, ?)")
                .bind(owner)
                .bind(OWNER_ROLE)
                .execute(&self.db)
                .await?;
            tracing::info!("Owner role ensured for {}", owner);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_memory_pool;

    #[test]
    fn test_action_names_round_trip() {
        for action in Action::ALL {
            assert_eq!(Action::from_str(action.as_str()), Some(action));
        }
        assert_eq!(Action::from_str("nuke"), None);
        assert_eq!(Page::from_str("roles"), Some(Page::Roles));
    }

    #[test]
    fn test_schema_rejects_unknown_actions() {
        let rows = vec![
            ("kick".to_string(), "admin".to_string()),
            ("launchMissiles".to_string(), "admin".to_string()),
        ];
        assert!(matches!(
            PermissionSchema::from_rows(rows),
            Err(DashboardError::SchemaInvalid(_))
        ));
    }

    #[test]
    fn test_schema_intersection() {
        let schema = PermissionSchema::from_rows(vec![
            ("kick".to_string(), "admin".to_string()),
            ("kick".to_string(), "moderator".to_string()),
        ])
        .unwrap();

        let moderator: BTreeSet<String> = ["moderator".to_string()].into();
        let nobody = BTreeSet::new();
        assert!(schema.allows(&moderator, Action::Kick));
        assert!(!schema.allows(&moderator, Action::Ban));
        assert!(!schema.allows(&nobody, Action::Kick));
    }

    #[tokio::test]
    async fn test_grant_and_resolve() {
        let manager = RoleManager::new(create_memory_pool().await.unwrap());

        assert!(!manager.is_allowed(Some("42"), Action::Kick).await.unwrap());
        assert!(!manager.is_allowed(None, Action::Kick).await.unwrap());

        manager.add_role("moderator").await.unwrap();
        assert_eq!(manager.toggle_user_role("42", "moderator").await.unwrap(), Toggle::Added);
        assert_eq!(manager.toggle_who_can("kick", "moderator").await.unwrap(), Toggle::Added);

        assert!(manager.is_allowed(Some("42"), Action::Kick).await.unwrap());
        assert!(!manager.is_allowed(Some("42"), Action::Ban).await.unwrap());
        assert!(manager.who_can(Action::Kick).await.unwrap().contains("moderator"));

        assert_eq!(manager.toggle_who_can("kick", "moderator").await.unwrap(), Toggle::Removed);
        assert!(!manager.is_allowed(Some("42"), Action::Kick).await.unwrap());
    }

    #[tokio::test]
    async fn test_corrupted_schema_is_error_not_allow() {
        let pool = create_memory_pool().await.unwrap();
        let manager = RoleManager::new(pool.clone());
        manager.ensure_owners(&["1".to_string()]).await.unwrap();
        assert!(manager.is_allowed(Some("1"), Action::Ban).await.unwrap());

        sqlx::query("INSERT INTO action_permissions (action, role) VALUES ('selfDestruct', 'owner')")
            .execute(&pool)
            .await
            .unwrap();

        assert!(matches!(
            manager.is_allowed(Some("1"), Action::Ban).await,
            Err(DashboardError::SchemaInvalid(_))
        ));
    }

    #[tokio::test]
    async fn test_owner_role_is_protected_and_removal_cascades() {
        let manager = RoleManager::new(create_memory_pool().await.unwrap());

        assert!(matches!(
            manager.remove_role(OWNER_ROLE).await,
            Err(DashboardError::Validation(_))
        ));

        manager.add_role("helper").await.unwrap();
        assert!(manager.add_role("helper").await.is_err());
        manager.toggle_user_role("7", "helper").await.unwrap();
        manager.toggle_can_see("logs", "helper").await.unwrap();
        assert!(manager.can_see(Some("7"), Page::Logs).await.unwrap());

        manager.remove_role("helper").await.unwrap();
        assert!(!manager.can_see(Some("7"), Page::Logs).await.unwrap());
        assert!(manager.roles_of("7").await.unwrap().is_empty());
        assert!(manager.toggle_user_role("7", "helper").await.is_err());
    }

    #[tokio::test]
    async fn test_list_roles_includes_owner_permissions() {
        let manager = RoleManager::new(create_memory_pool().await.unwrap());
        let roles = manager.list_roles().await.unwrap();

        let owner = roles.iter().find(|r| r.name == OWNER_ROLE).unwrap();
        assert_eq!(owner.permissions.len(), Action::ALL.len());
    }
}
