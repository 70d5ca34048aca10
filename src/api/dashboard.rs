/// Dashboard display preferences
use crate::{
    api::{ok, require, Param, Payload},
    auth::AuthContext,
    context::AppContext,
    error::DashboardResult,
};
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

/// Build dashboard routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/dashboard/toggleShowNotifications", post(toggle_show_notifications))
        .route("/dashboard/toggleUpdatePlayersTable", post(toggle_update_players_table))
        .route("/dashboard/getShowNotifications", get(get_show_notifications))
        .route("/dashboard/getUpdatePlayersTable", get(get_update_players_table))
        .route("/dashboard/toggleDashboardSettings", post(toggle_dashboard_settings))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionTypeRequest {
    pub action_type: Option<Param>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSettingRequest {
    pub type_setting: Option<Param>,
    pub on_setting: Option<Param>,
}

async fn toggle_show_notifications(
    State(ctx): State<AppContext>,
    _auth: AuthContext,
    Payload(req): Payload<ActionTypeRequest>,
) -> DashboardResult<Json<Value>> {
    let action_type = require(&req.action_type)?;
    ctx.settings.toggle_notification(&action_type).await?;
    Ok(ok("Toggled the notification!"))
}

async fn toggle_update_players_table(
    State(ctx): State<AppContext>,
    _auth: AuthContext,
    Payload(req): Payload<ActionTypeRequest>,
) -> DashboardResult<Json<Value>> {
    let value = require(&req.action_type)?;
    ctx.settings.set_update_players_table(&value).await?;
    Ok(ok("Toggled the notification!"))
}

async fn get_show_notifications(
    State(ctx): State<AppContext>,
    _auth: AuthContext,
) -> DashboardResult<Json<Value>> {
    let flags = ctx.settings.notifications().await?;
    Ok(Json(json!({ "status": "ok", "showNotifications": flags })))
}

async fn get_update_players_table(
    State(ctx): State<AppContext>,
    _auth: AuthContext,
) -> DashboardResult<Json<Value>> {
    let enabled = ctx.settings.update_players_table().await?;
    Ok(Json(json!({ "status": "ok", "showUpdatePlayersTable": enabled })))
}

async fn toggle_dashboard_settings(
    State(ctx): State<AppContext>,
    _auth: AuthContext,
    Payload(req): Payload<DashboardSettingRequest>,
) -> DashboardResult<Json<Value>> {
    let setting = require(&req.type_setting)?;
    let value = require(&req.on_setting)?;
    ctx.settings.set_dashboard_setting(&setting, &value).await?;
    Ok(ok("Toggled!"))
}
