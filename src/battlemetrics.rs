/// BattleMetrics server-info lookups
use crate::{
    config::BattleMetricsConfig,
    error::{DashboardError, DashboardResult},
};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

const API_BASE: &str = "https://api.battlemetrics.com";

/// BattleMetrics API client
#[derive(Clone)]
pub struct BattleMetricsClient {
    http_client: Client,
    base_url: String,
    config: BattleMetricsConfig,
}

impl BattleMetricsClient {
    pub fn new(config: BattleMetricsConfig) -> DashboardResult<Self> {
        Self::with_base_url(config, API_BASE)
    }

    pub fn with_base_url(config: BattleMetricsConfig, base_url: &str) -> DashboardResult<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| DashboardError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            config,
        })
    }

    pub fn server_url(&self) -> String {
        format!("{}/servers/{}", self.base_url, self.config.server_id)
    }

    /// Full server document for the configured server
    pub async fn server_info(&self) -> DashboardResult<Value> {
        let url = self.server_url();
        tracing::debug!(game = %self.config.game, "Fetching BattleMetrics server info: {}", url);

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&self.config.token)
            .send()
            .await
            .map_err(|e| DashboardError::Upstream(format!("BattleMetrics request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(DashboardError::Upstream(format!(
                "BattleMetrics returned {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| DashboardError::Upstream(format!("Invalid BattleMetrics response: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BattleMetricsConfig {
        BattleMetricsConfig {
            token: "token".to_string(),
            server_id: "4242".to_string(),
            game: "squad".to_string(),
        }
    }

    #[test]
    fn test_server_url() {
        let client = BattleMetricsClient::new(config()).unwrap();
        assert_eq!(client.server_url(), "https://api.battlemetrics.com/servers/4242");

        let local = BattleMetricsClient::with_base_url(config(), "http://127.0.0.1:9/").unwrap();
        assert_eq!(local.server_url(), "http://127.0.0.1:9/servers/4242");
    }

    #[tokio::test]
    async fn test_unreachable_api_is_upstream_error() {
        let client = BattleMetricsClient::with_base_url(config(), "http://127.0.0.1:1").unwrap();
        assert!(matches!(
            client.server_info().await,
            Err(DashboardError::Upstream(_))
        ));
    }
}
