/// Application context and dependency injection
use crate::{
    admin::{AuditRecorder, ModerationManager, RoleManager, SettingsManager, WhitelistManager},
    battlemetrics::BattleMetricsClient,
    config::ServerConfig,
    db,
    error::{DashboardError, DashboardResult},
    pipeline::CommandPipeline,
    rate_limit::RateLimiter,
    rcon::{CommandExecutor, RconConnection, SocketBridge},
};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub pipeline: CommandPipeline,
    pub audit: AuditRecorder,
    pub roles: RoleManager,
    pub moderation: ModerationManager,
    pub whitelist: WhitelistManager,
    pub settings: SettingsManager,
    pub battlemetrics: Option<BattleMetricsClient>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppContext {
    /// Open the database and connect to the game-server bridge
    pub async fn new(config: ServerConfig) -> DashboardResult<Self> {
        config.validate()?;

        if !config.storage.data_directory.exists() {
            tokio::fs::create_dir_all(&config.storage.data_directory)
                .await
                .map_err(|e| {
                    DashboardError::Internal(format!(
                        "Failed to create directory {:?}: {}",
                        config.storage.data_directory, e
                    ))
                })?;
        }

        let db = db::create_pool(&config.storage.database, db::DatabaseOptions::default()).await?;
        db::run_migrations(&db).await?;
        db::test_connection(&db).await?;

        let bridge = SocketBridge::connect(
            config.rcon.bridge_url.clone(),
            Duration::from_secs(config.rcon.reconnect_interval_secs),
        );

        Self::with_connection(config, db, Arc::new(bridge)).await
    }

    /// Build the context around an existing pool and game-server connection
    pub async fn with_connection(
        config: ServerConfig,
        db: SqlitePool,
        connection: Arc<dyn RconConnection>,
    ) -> DashboardResult<Self> {
        let executor = CommandExecutor::new(
            connection,
            Duration::from_secs(config.rcon.ack_timeout_secs),
        );

        let roles = RoleManager::new(db.clone());
        roles.ensure_owners(&config.authentication.owner_ids).await?;

        let battlemetrics = match &config.battlemetrics {
            Some(bm) => Some(BattleMetricsClient::new(bm.clone())?),
            None => {
                tracing::info!("BattleMetrics not configured - server info disabled");
                None
            }
        };

        let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limit));

        Ok(Self {
            pipeline: CommandPipeline::new(db.clone(), executor),
            audit: AuditRecorder::new(db.clone()),
            roles,
            moderation: ModerationManager::new(db.clone()),
            whitelist: WhitelistManager::new(db.clone()),
            settings: SettingsManager::new(db.clone()),
            battlemetrics,
            rate_limiter,
            config: Arc::new(config),
            db,
        })
    }

    /// Get service URL
    pub fn service_url(&self) -> String {
        format!(
            "http://{}:{}",
            self.config.service.hostname, self.config.service.port
        )
    }
}
