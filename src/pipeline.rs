/// Command dispatch and audit pipeline
///
/// Every game-server action runs the same stages:
/// validate, authorize, execute, record, respond.
/// Early exits: `Validation` and `Authorization` before anything is sent,
/// `Conflict` for a ban on an already banned player, `Upstream` when the
/// server does not acknowledge, `Persistence` when the action ran but could
/// not be recorded.
use crate::{
    admin::{
        Action, AuditRecorder, ModerationKind, ModerationManager, NewAuditEntry, NewModeration,
        RoleManager,
    },
    auth::Actor,
    error::{DashboardError, DashboardResult, MALFORMED_REQUEST, NOT_ALLOWED},
    rcon::{
        parse_ban_duration, CommandExecutor, RconCommand, ResponsePayload, EVENT_CURRENT_MAP,
        EVENT_NEXT_MAP, EVENT_PLAYERS,
    },
};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

/// Permission-gated game-server action with its parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminAction {
    SetNextMap { layer: String },
    SetCurrentMap { layer: String },
    Broadcast { content: String },
    Kick { steam_id: String, reason: String },
    Warn { steam_id: String, reason: String },
    Ban { steam_id: String, reason: String, duration: String },
    DisbandSquad { squad_id: String, team_id: String },
    RemoveFromSquad { steam_id: String },
}

impl AdminAction {
    /// Permission the actor's roles must grant
    pub fn permission(&self) -> Action {
        match self {
            AdminAction::SetNextMap { .. } => Action::SetNextMap,
            AdminAction::SetCurrentMap { .. } => Action::SetCurrentMap,
            AdminAction::Broadcast { .. } => Action::Broadcast,
            AdminAction::Kick { .. } => Action::Kick,
            AdminAction::Warn { .. } => Action::Warn,
            AdminAction::Ban { .. } => Action::Ban,
            AdminAction::DisbandSquad { .. } => Action::DisbandSquad,
            AdminAction::RemoveFromSquad { .. } => Action::RemoveFromSquad,
        }
    }

    /// Name written to the audit log
    pub fn audit_name(&self) -> &'static str {
        match self {
            AdminAction::SetNextMap { .. } => "SET_NEXT_MAP",
            AdminAction::SetCurrentMap { .. } => "CHANGE_CURRENT_MAP",
            AdminAction::Broadcast { .. } => "ADMIN_BROADCAST",
            AdminAction::Kick { .. } => "PLAYER_KICKED",
            AdminAction::Warn { .. } => "PLAYER_WARNED",
            AdminAction::Ban { .. } => "PLAYER_BANNED",
            AdminAction::DisbandSquad { .. } => "SQUAD_DISBAND",
            AdminAction::RemoveFromSquad { .. } => "KICK_PLAYER_FROM_SQUAD",
        }
    }

    fn fields(&self) -> Vec<&str> {
        match self {
            AdminAction::SetNextMap { layer } | AdminAction::SetCurrentMap { layer } => {
                vec![layer.as_str()]
            }
            AdminAction::Broadcast { content } => vec![content.as_str()],
            AdminAction::Kick { steam_id, reason } | AdminAction::Warn { steam_id, reason } => {
                vec![steam_id.as_str(), reason.as_str()]
            }
            AdminAction::Ban {
                steam_id,
                reason,
                duration,
            } => vec![steam_id.as_str(), reason.as_str(), duration.as_str()],
            AdminAction::DisbandSquad { squad_id, team_id } => {
                vec![squad_id.as_str(), team_id.as_str()]
            }
            AdminAction::RemoveFromSquad { steam_id } => vec![steam_id.as_str()],
        }
    }

    /// Every parameter must be present and non-blank
    pub fn validate(&self) -> DashboardResult<()> {
        if self.fields().iter().any(|field| field.trim().is_empty()) {
            return Err(DashboardError::Validation(MALFORMED_REQUEST.to_string()));
        }
        Ok(())
    }

    pub fn command(&self) -> RconCommand {
        match self.clone() {
            AdminAction::SetNextMap { layer } => RconCommand::SetNextLayer { layer },
            AdminAction::SetCurrentMap { layer } => RconCommand::ChangeLayer { layer },
            AdminAction::Broadcast { content } => RconCommand::Broadcast { message: content },
            AdminAction::Kick { steam_id, reason } => RconCommand::Kick { steam_id, reason },
            AdminAction::Warn { steam_id, reason } => RconCommand::Warn { steam_id, reason },
            AdminAction::Ban {
                steam_id,
                reason,
                duration,
            } => RconCommand::Ban {
                steam_id,
                duration,
                reason,
            },
            AdminAction::DisbandSquad { squad_id, team_id } => {
                RconCommand::DisbandSquad { team_id, squad_id }
            }
            AdminAction::RemoveFromSquad { steam_id } => {
                RconCommand::RemovePlayerFromSquad { steam_id }
            }
        }
    }

    /// Free-form audit details
    pub fn details(&self) -> Value {
        match self {
            AdminAction::SetNextMap { layer } | AdminAction::SetCurrentMap { layer } => {
                json!({ "nextLayer": layer })
            }
            AdminAction::Broadcast { content } => json!({ "broadcast": content }),
            AdminAction::Kick { steam_id, reason } | AdminAction::Warn { steam_id, reason } => {
                json!({ "player": steam_id, "reason": reason })
            }
            AdminAction::Ban {
                steam_id,
                reason,
                duration,
            } => json!({ "player": steam_id, "reason": reason, "duration": duration }),
            AdminAction::DisbandSquad { squad_id, team_id } => {
                json!({ "squadID": squad_id, "teamID": team_id })
            }
            AdminAction::RemoveFromSquad { steam_id } => json!({ "player": steam_id }),
        }
    }

    fn moderation(&self, actor: &Actor, end_date: Option<i64>) -> Option<NewModeration> {
        match self {
            AdminAction::Kick { steam_id, reason } => Some(NewModeration::new(
                steam_id.as_str(),
                actor,
                ModerationKind::Kick,
                reason.as_str(),
                None,
            )),
            AdminAction::Warn { steam_id, reason } => Some(NewModeration::new(
                steam_id.as_str(),
                actor,
                ModerationKind::Warn,
                reason.as_str(),
                None,
            )),
            AdminAction::Ban {
                steam_id, reason, ..
            } => Some(NewModeration::new(
                steam_id.as_str(),
                actor,
                ModerationKind::Ban,
                reason.as_str(),
                end_date,
            )),
            _ => None,
        }
    }

    fn success_message(&self, ack: &ResponsePayload) -> String {
        let from_ack = |fallback: &str| {
            ack.as_str()
                .filter(|text| !text.trim().is_empty())
                .unwrap_or(fallback)
                .to_string()
        };

        match self {
            AdminAction::SetNextMap { .. } => "Next Map set!".to_string(),
            AdminAction::SetCurrentMap { .. } => "Current Map set!".to_string(),
            AdminAction::Broadcast { .. } => "Broadcast sent!".to_string(),
            AdminAction::Kick { .. } => "Player kicked!".to_string(),
            AdminAction::Warn { .. } => "Player warned!".to_string(),
            AdminAction::Ban { .. } => "Player banned!".to_string(),
            AdminAction::DisbandSquad { .. } => from_ack("Squad is disband!"),
            AdminAction::RemoveFromSquad { .. } => from_ack("Player removed from squad!"),
        }
    }
}

/// One incoming action, discarded after the response
#[derive(Debug, Clone)]
pub struct ActionRequest {
    pub actor: Actor,
    pub action: AdminAction,
}

/// Outcome of a completed action
#[derive(Debug, Clone, Serialize)]
pub struct ActionReceipt {
    pub message: String,
    pub audit_id: i64,
    pub moderation_id: Option<i64>,
    pub response: ResponsePayload,
}

/// Read-only game-server queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerQuery {
    PlayersList,
    NextMap,
    CurrentMap,
}

impl ServerQuery {
    fn event(&self) -> &'static str {
        match self {
            ServerQuery::PlayersList => EVENT_PLAYERS,
            ServerQuery::NextMap => EVENT_NEXT_MAP,
            ServerQuery::CurrentMap => EVENT_CURRENT_MAP,
        }
    }

    fn audit_name(&self) -> &'static str {
        match self {
            ServerQuery::PlayersList => "GET_PLAYERS_LIST",
            ServerQuery::NextMap => "GET_NEXT_MAP",
            ServerQuery::CurrentMap => "GET_CURRENT_MAP",
        }
    }
}

/// Async locks keyed by target id; entries vanish when no one holds or waits on them
#[derive(Clone, Default)]
pub struct TargetLocks {
    inner: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl TargetLocks {
    fn map(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<tokio::sync::Mutex<()>>>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub async fn lock(&self, key: &str) -> TargetGuard {
        let mutex = self.map().entry(key.to_string()).or_default().clone();
        let guard = mutex.lock_owned().await;

        TargetGuard {
            key: key.to_string(),
            locks: self.clone(),
            guard: Some(guard),
        }
    }

    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Held while a target is being acted upon
pub struct TargetGuard {
    key: String,
    locks: TargetLocks,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for TargetGuard {
    fn drop(&mut self) {
        self.guard.take();
        let mut map = self.locks.map();
        if map
            .get(&self.key)
            .map_or(false, |mutex| Arc::strong_count(mutex) == 1)
        {
            map.remove(&self.key);
        }
    }
}

/// Pipeline orchestrator
#[derive(Clone)]
pub struct CommandPipeline {
    db: SqlitePool,
    roles: RoleManager,
    moderation: ModerationManager,
    audit: AuditRecorder,
    executor: CommandExecutor,
    locks: TargetLocks,
}

impl CommandPipeline {
    pub fn new(db: SqlitePool, executor: CommandExecutor) -> Self {
        Self {
            roles: RoleManager::new(db.clone()),
            moderation: ModerationManager::new(db.clone()),
            audit: AuditRecorder::new(db.clone()),
            executor,
            locks: TargetLocks::default(),
            db,
        }
    }

    /// Run one action through every stage.
    ///
    /// Once the command is sent, the rest runs on its own task: a caller that
    /// goes away does not cancel the command or its audit entry.
    pub async fn dispatch(&self, request: ActionRequest) -> DashboardResult<ActionReceipt> {
        let ActionRequest { actor, action } = request;

        action.validate()?;
        self.authorize(&actor, action.permission()).await?;

        let now_ms = Utc::now().timestamp_millis();
        let (end_date, target) = match &action {
            AdminAction::Ban {
                steam_id, duration, ..
            } => {
                let end_date = parse_ban_duration(duration, now_ms)?;
                let target = self.locks.lock(steam_id).await;
                if self.moderation.active_ban(steam_id, now_ms).await?.is_some() {
                    tracing::info!(player = %steam_id, "Ban refused, player already banned");
                    return Err(DashboardError::Conflict("Player already banned!".to_string()));
                }
                (end_date, Some(target))
            }
            _ => (None, None),
        };

        let pipeline = self.clone();
        let handle = tokio::spawn(async move {
            let _target = target;
            pipeline
                .execute_and_record(actor, action, end_date, now_ms)
                .await
        });

        handle
            .await
            .map_err(|e| DashboardError::Internal(format!("Dispatch task failed: {}", e)))?
    }

    /// Send a read-only query and audit it
    pub async fn query(&self, actor: &Actor, query: ServerQuery) -> DashboardResult<ResponsePayload> {
        let data = self.executor.query(query.event()).await?;
        self.audit
            .record(NewAuditEntry::new(query.audit_name(), actor, Value::Null))
            .await?;
        Ok(data)
    }

    async fn authorize(&self, actor: &Actor, action: Action) -> DashboardResult<()> {
        if self.roles.is_allowed(actor.user_id(), action).await? {
            return Ok(());
        }

        tracing::warn!(
            user = ?actor.user_id(),
            action = action.as_str(),
            "Action refused, missing permission"
        );
        Err(DashboardError::Authorization(NOT_ALLOWED.to_string()))
    }

    async fn execute_and_record(
        &self,
        actor: Actor,
        action: AdminAction,
        end_date: Option<i64>,
        now_ms: i64,
    ) -> DashboardResult<ActionReceipt> {
        let ack = self.executor.execute(&action.command()).await?;

        let entry = NewAuditEntry::new(action.audit_name(), &actor, action.details());
        let record = action.moderation(&actor, end_date);

        let mut tx = self.db.begin().await.map_err(DashboardError::persistence)?;
        let audit_id = AuditRecorder::record_in(&mut *tx, &entry)
            .await
            .map_err(DashboardError::persistence)?;

        let moderation_id = match record {
            Some(record) if record.kind == ModerationKind::Ban => {
                let id = ModerationManager::insert_ban_if_clear_in(&mut *tx, &record, now_ms)
                    .await
                    .map_err(DashboardError::persistence)?;
                if id.is_none() {
                    tracing::warn!(player = %record.steam_id, "Active ban appeared while the ban command was in flight");
                }
                id
            }
            Some(record) => Some(
                ModerationManager::insert_in(&mut *tx, &record)
                    .await
                    .map_err(DashboardError::persistence)?,
            ),
            None => None,
        };

        tx.commit().await.map_err(DashboardError::persistence)?;

        tracing::info!(
            audit_id,
            action = action.audit_name(),
            user = ?actor.user_id(),
            "Action executed"
        );

        Ok(ActionReceipt {
            message: action.success_message(&ack),
            audit_id,
            moderation_id,
            response: ack,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{auth::DiscordAccount, db::create_memory_pool, rcon::RconConnection};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct SlowServer {
        calls: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl RconConnection for SlowServer {
        async fn emit(&self, _event: &str, _args: Vec<Value>) -> DashboardResult<ResponsePayload> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(Value::Null)
        }
    }

    fn owner() -> Actor {
        Actor {
            discord: DiscordAccount {
                id: Some("1".to_string()),
                username: Some("owner".to_string()),
                discriminator: None,
            },
            ..Default::default()
        }
    }

    async fn pipeline(delay: Duration) -> (CommandPipeline, Arc<SlowServer>, SqlitePool) {
        let pool = create_memory_pool().await.unwrap();
        RoleManager::new(pool.clone())
            .ensure_owners(&["1".to_string()])
            .await
            .unwrap();
        let server = Arc::new(SlowServer {
            calls: AtomicUsize::new(0),
            delay,
        });
        let executor = CommandExecutor::new(server.clone(), Duration::from_secs(2));
        (CommandPipeline::new(pool.clone(), executor), server, pool)
    }

    fn ban(steam_id: &str) -> AdminAction {
        AdminAction::Ban {
            steam_id: steam_id.to_string(),
            reason: "cheating".to_string(),
            duration: "1d".to_string(),
        }
    }

    #[test]
    fn test_blank_fields_fail_validation() {
        let kick = AdminAction::Kick {
            steam_id: "123".to_string(),
            reason: "   ".to_string(),
        };
        assert!(matches!(kick.validate(), Err(DashboardError::Validation(_))));
    }

    #[tokio::test]
    async fn test_concurrent_bans_send_one_command() {
        let (pipeline, server, _pool) = pipeline(Duration::from_millis(50)).await;

        let first = pipeline.dispatch(ActionRequest {
            actor: owner(),
            action: ban("765"),
        });
        let second = pipeline.dispatch(ActionRequest {
            actor: owner(),
            action: ban("765"),
        });
        let (first, second) = tokio::join!(first, second);

        let outcomes = [first, second];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(outcomes
            .iter()
            .any(|r| matches!(r, Err(DashboardError::Conflict(_)))));
        assert_eq!(server.calls.load(Ordering::SeqCst), 1);
        assert!(pipeline.locks.is_empty());
    }

    #[tokio::test]
    async fn test_dropped_caller_still_records() {
        let (pipeline, server, pool) = pipeline(Duration::from_millis(300)).await;

        let request = ActionRequest {
            actor: owner(),
            action: AdminAction::Warn {
                steam_id: "765".to_string(),
                reason: "language".to_string(),
            },
        };
        let abandoned = tokio::time::timeout(Duration::from_millis(100), pipeline.dispatch(request)).await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(server.calls.load(Ordering::SeqCst), 1);

        let warnings: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM moderation WHERE kind = 'warn'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(warnings, 1);
    }

    #[tokio::test]
    async fn test_unrecorded_kick_is_persistence_error() {
        let (pipeline, server, pool) = pipeline(Duration::ZERO).await;
        sqlx::query("ALTER TABLE moderation RENAME TO moderation_archived")
            .execute(&pool)
            .await
            .unwrap();

        let err = pipeline
            .dispatch(ActionRequest {
                actor: owner(),
                action: AdminAction::Kick {
                    steam_id: "123".to_string(),
                    reason: "abc".to_string(),
                },
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DashboardError::Persistence(_)));
        assert_eq!(err.status_code(), "nok5");
        assert_eq!(server.calls.load(Ordering::SeqCst), 1);

        let audit_rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM audit_log")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(audit_rows, 0);
    }

    #[tokio::test]
    async fn test_disband_reports_server_message() {
        let (pipeline, _server, _pool) = pipeline(Duration::ZERO).await;

        let receipt = pipeline
            .dispatch(ActionRequest {
                actor: owner(),
                action: AdminAction::DisbandSquad {
                    squad_id: "3".to_string(),
                    team_id: "1".to_string(),
                },
            })
            .await
            .unwrap();
        assert_eq!(receipt.message, "Squad is disband!");
        assert_eq!(receipt.moderation_id, None);
    }
}
