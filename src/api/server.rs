/// Read-only game-server endpoints
use crate::{
    admin::NewAuditEntry,
    auth::AuthContext,
    context::AppContext,
    error::{DashboardError, DashboardResult},
    pipeline::ServerQuery,
};
use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};

/// Build server routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/", get(welcome))
        .route("/getServerInfo", get(get_server_info))
        .route("/getPlayersList", get(get_players_list))
        .route("/getNextMap", get(get_next_map))
        .route("/getCurrentMap", get(get_current_map))
}

async fn welcome(_auth: AuthContext) -> &'static str {
    "Welcome to the Squad dashboard API!"
}

/// BattleMetrics document for the configured server
async fn get_server_info(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> DashboardResult<Json<Value>> {
    let client = ctx.battlemetrics.as_ref().ok_or_else(|| {
        DashboardError::Upstream("BattleMetrics is not configured".to_string())
    })?;

    let info = client.server_info().await?;

    ctx.audit
        .record(NewAuditEntry::new(
            "GET_SERVER_INFO",
            &auth.actor,
            json!({ "user": auth.actor.user_id() }),
        ))
        .await?;

    Ok(Json(info))
}

async fn get_players_list(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> DashboardResult<Json<Value>> {
    let players = ctx.pipeline.query(&auth.actor, ServerQuery::PlayersList).await?;
    Ok(Json(players))
}

async fn get_next_map(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> DashboardResult<Json<Value>> {
    let layer = ctx.pipeline.query(&auth.actor, ServerQuery::NextMap).await?;
    Ok(Json(layer))
}

async fn get_current_map(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> DashboardResult<Json<Value>> {
    let layer = ctx.pipeline.query(&auth.actor, ServerQuery::CurrentMap).await?;
    Ok(Json(layer))
}
