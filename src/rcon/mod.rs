/// Game-server command execution
///
/// The dashboard never speaks the RCON wire protocol itself. It emits named
/// events over a persistent connection to a bridge process and waits for one
/// acknowledgement per event.

pub mod bridge;
pub mod duration;

pub use bridge::SocketBridge;
pub use duration::parse_ban_duration;

use crate::error::{DashboardError, DashboardResult};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Acknowledgement payload returned by the game server
pub type ResponsePayload = Value;

/// Event carrying a raw admin command
pub const EVENT_EXECUTE: &str = "rcon.execute";
/// Event carrying a player warning
pub const EVENT_WARN: &str = "rcon.warn";
pub const EVENT_PLAYERS: &str = "players";
pub const EVENT_NEXT_MAP: &str = "rcon.getNextMap";
pub const EVENT_CURRENT_MAP: &str = "rcon.getCurrentMap";

/// Connection to the game server. Each emit resolves with exactly one acknowledgement.
#[async_trait]
pub trait RconConnection: Send + Sync {
    async fn emit(&self, event: &str, args: Vec<Value>) -> DashboardResult<ResponsePayload>;
}

/// Admin commands the dashboard can send
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RconCommand {
    SetNextLayer { layer: String },
    ChangeLayer { layer: String },
    Broadcast { message: String },
    Kick { steam_id: String, reason: String },
    Warn { steam_id: String, reason: String },
    Ban { steam_id: String, duration: String, reason: String },
    DisbandSquad { team_id: String, squad_id: String },
    RemovePlayerFromSquad { steam_id: String },
}

impl RconCommand {
    /// Command text as typed in the server console
    pub fn render(&self) -> String {
        match self {
            RconCommand::SetNextLayer { layer } => format!("AdminSetNextLayer {}", layer),
            RconCommand::ChangeLayer { layer } => format!("AdminChangeLayer {}", layer),
            RconCommand::Broadcast { message } => format!("AdminBroadcast {}", message),
            RconCommand::Kick { steam_id, reason } => format!("AdminKick {} {}", steam_id, reason),
            RconCommand::Warn { steam_id, reason } => format!("AdminWarn {} {}", steam_id, reason),
            RconCommand::Ban {
                steam_id,
                duration,
                reason,
            } => format!("AdminBan {} {} {}", steam_id, duration, reason),
            RconCommand::DisbandSquad { team_id, squad_id } => {
                format!("AdminDisbandSquad {} {}", team_id, squad_id)
            }
            RconCommand::RemovePlayerFromSquad { steam_id } => {
                format!("AdminRemovePlayerFromSquad {}", steam_id)
            }
        }
    }

    /// Event name and arguments carrying this command over the bridge
    pub fn emission(&self) -> (&'static str, Vec<Value>) {
        match self {
            RconCommand::Warn { steam_id, reason } => {
                (EVENT_WARN, vec![json!(steam_id), json!(reason)])
            }
            other => (EVENT_EXECUTE, vec![json!(other.render())]),
        }
    }
}

/// Sends commands and awaits their acknowledgement with a deadline
#[derive(Clone)]
pub struct CommandExecutor {
    connection: Arc<dyn RconConnection>,
    timeout: Duration,
}

impl CommandExecutor {
    pub fn new(connection: Arc<dyn RconConnection>, timeout: Duration) -> Self {
        Self {
            connection,
            timeout,
        }
    }

    /// Send one admin command. No retry: a missing or failed acknowledgement is `Upstream`.
    pub async fn execute(&self, command: &RconCommand) -> DashboardResult<ResponsePayload> {
        let (event, args) = command.emission();
        tracing::info!(command = %command.render(), "Sending RCON command");
        self.emit(event, args).await
    }

    /// Read-only event without arguments
    pub async fn query(&self, event: &str) -> DashboardResult<ResponsePayload> {
        self.emit(event, Vec::new()).await
    }

    async fn emit(&self, event: &str, args: Vec<Value>) -> DashboardResult<ResponsePayload> {
        match tokio::time::timeout(self.timeout, self.connection.emit(event, args)).await {
            Ok(Ok(payload)) => Ok(payload),
            Ok(Err(DashboardError::Upstream(msg))) => {
                tracing::warn!(event, "Game server rejected event: {}", msg);
                Err(DashboardError::Upstream(msg))
            }
            Ok(Err(e)) => Err(DashboardError::Upstream(e.to_string())),
            Err(_) => {
                tracing::warn!(event, timeout = ?self.timeout, "No acknowledgement from game server");
                Err(DashboardError::Upstream(format!(
                    "no acknowledgement for {} within {}s",
                    event,
                    self.timeout.as_secs_f32()
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recording {
        sent: Mutex<Vec<(String, Vec<Value>)>>,
        delay: Duration,
    }

    #[async_trait]
    impl RconConnection for Recording {
        async fn emit(&self, event: &str, args: Vec<Value>) -> DashboardResult<ResponsePayload> {
            self.sent.lock().unwrap().push((event.to_string(), args));
            tokio::time::sleep(self.delay).await;
            Ok(json!("ok"))
        }
    }

    #[test]
    fn test_command_rendering() {
        let kick = RconCommand::Kick {
            steam_id: "123".to_string(),
            reason: "abc".to_string(),
        };
        assert_eq!(kick.render(), "AdminKick 123 abc");
        assert_eq!(kick.emission(), (EVENT_EXECUTE, vec![json!("AdminKick 123 abc")]));

        let ban = RconCommand::Ban {
            steam_id: "1".to_string(),
            duration: "2d".to_string(),
            reason: "teamkilling".to_string(),
        };
        assert_eq!(ban.render(), "AdminBan 1 2d teamkilling");

        let warn = RconCommand::Warn {
            steam_id: "1".to_string(),
            reason: "language".to_string(),
        };
        assert_eq!(warn.emission(), (EVENT_WARN, vec![json!("1"), json!("language")]));

        let disband = RconCommand::DisbandSquad {
            team_id: "2".to_string(),
            squad_id: "5".to_string(),
        };
        assert_eq!(disband.render(), "AdminDisbandSquad 2 5");
    }

    #[tokio::test]
    async fn test_execute_forwards_command() {
        let connection = Arc::new(Recording {
            sent: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        });
        let executor = CommandExecutor::new(connection.clone(), Duration::from_secs(1));

        let ack = executor
            .execute(&RconCommand::SetNextLayer {
                layer: "Narva AAS v2".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(ack, json!("ok"));

        let sent = connection.sent.lock().unwrap();
        assert_eq!(sent[0].0, EVENT_EXECUTE);
        assert_eq!(sent[0].1, vec![json!("AdminSetNextLayer Narva AAS v2")]);
    }

    #[tokio::test]
    async fn test_missing_acknowledgement_is_upstream_error() {
        let connection = Arc::new(Recording {
            sent: Mutex::new(Vec::new()),
            delay: Duration::from_secs(5),
        });
        let executor = CommandExecutor::new(connection, Duration::from_millis(20));

        let err = executor.query(EVENT_PLAYERS).await.unwrap_err();
        assert!(matches!(err, DashboardError::Upstream(_)));
    }
}
