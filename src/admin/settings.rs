/// Dashboard settings: whitelist URL token and per-user display preferences
use crate::error::{DashboardError, DashboardResult};
use rand::{distributions::Alphanumeric, Rng};
use sqlx::SqlitePool;
use std::collections::BTreeMap;

const WHITELIST_TOKEN_KEY: &str = "whitelist.token";
const NOTIFICATIONS_PREFIX: &str = "notifications.";
const UPDATE_PLAYERS_TABLE_KEY: &str = "dashboard.updatePlayersTable";
const DASHBOARD_PREFIX: &str = "dashboard.settings.";

/// Key/value settings store
#[derive(Clone)]
pub struct SettingsManager {
    db: SqlitePool,
}

impl SettingsManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Random token guarding the public whitelist and banlist URLs
    pub fn generate_token() -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect()
    }

    pub async fn get(&self, key: &str) -> DashboardResult<Option<String>> {
        let value = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.db)
            .await?;
        Ok(value)
    }

    pub async fn set(&self, key: &str, value: &str) -> DashboardResult<()> {
        sqlx::query(
            "INSERT INTO settings (key, value) VALUES (?, ?) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    /// Current whitelist token, created on first use
    pub async fn whitelist_token(&self) -> DashboardResult<String> {
        if let Some(token) = self.get(WHITELIST_TOKEN_KEY).await? {
            return Ok(token);
        }

        let token = Self::generate_token();
        sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
            .bind(WHITELIST_TOKEN_KEY)
            .bind(&token)
            .execute(&self.db)
            .await?;

        // A concurrent caller may have won the insert
        self.get(WHITELIST_TOKEN_KEY)
            .await?
            .ok_or_else(|| DashboardError::Internal("Whitelist token vanished".to_string()))
    }

    /// Replace the whitelist token; old URLs stop working immediately
    pub async fn regenerate_whitelist_token(&self) -> DashboardResult<String> {
        let token = Self::generate_token();
        self.set(WHITELIST_TOKEN_KEY, &token).await?;
        tracing::info!("Whitelist token regenerated");
        Ok(token)
    }

    /// Compare a URL token against the stored one. No stored token never matches.
    pub async fn check_whitelist_token(&self, provided: &str) -> DashboardResult<bool> {
        Ok(self
            .get(WHITELIST_TOKEN_KEY)
            .await?
            .map_or(false, |token| !provided.is_empty() && token == provided))
    }

    /// Flip the notification flag for one action type, returning the new value
    pub async fn toggle_notification(&self, action_type: &str) -> DashboardResult<bool> {
        let key = format!("{}{}", NOTIFICATIONS_PREFIX, action_type);
        let current = self.get(&key).await?.map_or(true, |v| v == "true");
        let next = !current;
        self.set(&key, if next { "true" } else { "false" }).await?;
        Ok(next)
    }

    /// Notification flags per action type; types never toggled are shown
    pub async fn notifications(&self) -> DashboardResult<BTreeMap<String, bool>> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT key, value FROM settings WHERE key LIKE ? ORDER BY key")
                .bind(format!("{}%", NOTIFICATIONS_PREFIX))
                .fetch_all(&self.db)
                .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(NOTIFICATIONS_PREFIX)
                    .map(|action| (action.to_string(), value == "true"))
            })
            .collect())
    }

    pub async fn set_update_players_table(&self, raw: &str) -> DashboardResult<bool> {
        let enabled = match raw.trim().to_ascii_lowercase().as_str() {
            "on" | "true" => true,
            "off" | "false" => false,
            other => {
                return Err(DashboardError::Validation(format!(
                    "Unknown toggle value: {}",
                    other
                )))
            }
        };
        self.set(UPDATE_PLAYERS_TABLE_KEY, if enabled { "true" } else { "false" })
            .await?;
        Ok(enabled)
    }

    pub async fn update_players_table(&self) -> DashboardResult<bool> {
        Ok(self
            .get(UPDATE_PLAYERS_TABLE_KEY)
            .await?
            .map_or(true, |v| v == "true"))
    }

    /// Store a free-form dashboard setting
    pub async fn set_dashboard_setting(&self, name: &str, value: &str) -> DashboardResult<()> {
        self.set(&format!("{}{}", DASHBOARD_PREFIX, name), value)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_memory_pool;

    #[tokio::test]
    async fn test_whitelist_token_lifecycle() {
        let settings = SettingsManager::new(create_memory_pool().await.unwrap());

        assert!(!settings.check_whitelist_token("anything").await.unwrap());

        let token = settings.whitelist_token().await.unwrap();
        assert_eq!(token.len(), 32);
        assert_eq!(settings.whitelist_token().await.unwrap(), token);
        assert!(settings.check_whitelist_token(&token).await.unwrap());

        let fresh = settings.regenerate_whitelist_token().await.unwrap();
        assert_ne!(fresh, token);
        assert!(!settings.check_whitelist_token(&token).await.unwrap());
        assert!(settings.check_whitelist_token(&fresh).await.unwrap());
    }

    #[tokio::test]
    async fn test_notification_toggles() {
        let settings = SettingsManager::new(create_memory_pool().await.unwrap());

        assert!(!settings.toggle_notification("PLAYER_KICKED").await.unwrap());
        assert!(settings.toggle_notification("PLAYER_KICKED").await.unwrap());
        assert!(!settings.toggle_notification("PLAYER_BANNED").await.unwrap());

        let flags = settings.notifications().await.unwrap();
        assert_eq!(flags.get("PLAYER_KICKED"), Some(&true));
        assert_eq!(flags.get("PLAYER_BANNED"), Some(&false));
    }

    #[tokio::test]
    async fn test_update_players_table_flag() {
        let settings = SettingsManager::new(create_memory_pool().await.unwrap());

        assert!(settings.update_players_table().await.unwrap());
        assert!(!settings.set_update_players_table("off").await.unwrap());
        assert!(!settings.update_players_table().await.unwrap());
        assert!(settings.set_update_players_table("TRUE").await.unwrap());
        assert!(settings.set_update_players_table("maybe").await.is_err());
    }
}
