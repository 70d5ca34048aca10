/// Permission-gated game-server commands
use crate::{
    api::{ok, require, Param, Payload},
    auth::AuthContext,
    context::AppContext,
    error::DashboardResult,
    pipeline::{ActionRequest, AdminAction},
};
use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;
use serde_json::Value;

/// Build command routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/setNextMap", post(set_next_map))
        .route("/setCurrentMap", post(set_current_map))
        .route("/broadcast", post(broadcast))
        .route("/kick", post(kick))
        .route("/warn", post(warn))
        .route("/ban", post(ban))
        .route("/disbandSquad", post(disband_squad))
        .route("/removeFromSquad", post(remove_from_squad))
}

#[derive(Debug, Deserialize)]
pub struct LayerRequest {
    pub layer: Option<Param>,
}

#[derive(Debug, Deserialize)]
pub struct BroadcastRequest {
    pub content: Option<Param>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PunishRequest {
    #[serde(rename = "steamUID")]
    pub steam_uid: Option<Param>,
    pub reason: Option<Param>,
    pub duration: Option<Param>,
}

#[derive(Debug, Deserialize)]
pub struct DisbandRequest {
    #[serde(rename = "squadID")]
    pub squad_id: Option<Param>,
    #[serde(rename = "teamID")]
    pub team_id: Option<Param>,
}

#[derive(Debug, Deserialize)]
pub struct RemoveFromSquadRequest {
    #[serde(rename = "steamID")]
    pub steam_id: Option<Param>,
}

async fn run(ctx: &AppContext, auth: AuthContext, action: AdminAction) -> DashboardResult<Json<Value>> {
    let receipt = ctx
        .pipeline
        .dispatch(ActionRequest {
            actor: auth.actor,
            action,
        })
        .await?;

    Ok(ok(receipt.message))
}

async fn set_next_map(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Payload(req): Payload<LayerRequest>,
) -> DashboardResult<Json<Value>> {
    let action = AdminAction::SetNextMap {
        layer: require(&req.layer)?,
    };
    run(&ctx, auth, action).await
}

async fn set_current_map(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Payload(req): Payload<LayerRequest>,
) -> DashboardResult<Json<Value>> {
    let action = AdminAction::SetCurrentMap {
        layer: require(&req.layer)?,
    };
    run(&ctx, auth, action).await
}

async fn broadcast(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Payload(req): Payload<BroadcastRequest>,
) -> DashboardResult<Json<Value>> {
    let action = AdminAction::Broadcast {
        content: require(&req.content)?,
    };
    run(&ctx, auth, action).await
}

async fn kick(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Payload(req): Payload<PunishRequest>,
) -> DashboardResult<Json<Value>> {
    let action = AdminAction::Kick {
        steam_id: require(&req.steam_uid)?,
        reason: require(&req.reason)?,
    };
    run(&ctx, auth, action).await
}

async fn warn(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Payload(req): Payload<PunishRequest>,
) -> DashboardResult<Json<Value>> {
    let action = AdminAction::Warn {
        steam_id: require(&req.steam_uid)?,
        reason: require(&req.reason)?,
    };
    run(&ctx, auth, action).await
}

async fn ban(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Payload(req): Payload<PunishRequest>,
) -> DashboardResult<Json<Value>> {
    let action = AdminAction::Ban {
        steam_id: require(&req.steam_uid)?,
        reason: require(&req.reason)?,
        duration: require(&req.duration)?,
    };
    run(&ctx, auth, action).await
}

async fn disband_squad(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Payload(req): Payload<DisbandRequest>,
) -> DashboardResult<Json<Value>> {
    let action = AdminAction::DisbandSquad {
        squad_id: require(&req.squad_id)?,
        team_id: require(&req.team_id)?,
    };
    run(&ctx, auth, action).await
}

async fn remove_from_squad(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Payload(req): Payload<RemoveFromSquadRequest>,
) -> DashboardResult<Json<Value>> {
    let action = AdminAction::RemoveFromSquad {
        steam_id: require(&req.steam_id)?,
    };
    run(&ctx, auth, action).await
}
