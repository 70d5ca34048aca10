/// Moderation history, the public banlist and the audit log
use crate::{
    admin::{ModerationRecord, NewAuditEntry, Page},
    api::{malformed, ok, require, require_page, Param, Payload},
    auth::AuthContext,
    context::AppContext,
    error::{DashboardError, DashboardResult},
};
use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

const DEFAULT_LOG_LIMIT: i64 = 100;
const MAX_LOG_LIMIT: i64 = 1000;

/// Build moderation routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/moderation/getCount", post(get_count))
        .route("/moderation/getHistory", post(get_history))
        .route("/banlist/:token", get(banlist))
        .route("/banlist/removeUserBanlist", post(remove_user_banlist))
        .route("/logs", get(recent_logs))
}

#[derive(Debug, Deserialize)]
pub struct CountRequest {
    pub steamid: Option<Param>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveBanRequest {
    #[serde(rename = "steamUID")]
    pub steam_uid: Option<Param>,
    pub reason: Option<Param>,
    pub end_date: Option<Param>,
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub limit: Option<i64>,
}

/// Kick, warn and ban totals for a player
async fn get_count(
    State(ctx): State<AppContext>,
    _auth: AuthContext,
    Payload(req): Payload<CountRequest>,
) -> DashboardResult<Json<Value>> {
    let steam_id = require(&req.steamid)?;
    let count = ctx.moderation.count(&steam_id).await?;

    Ok(Json(json!({
        "status": "ok",
        "count": {
            "kick": count.kick.to_string(),
            "ban": count.ban.to_string(),
            "warn": count.warn.to_string(),
        }
    })))
}

/// Every moderation record for a player, newest first
async fn get_history(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Payload(req): Payload<CountRequest>,
) -> DashboardResult<Json<Value>> {
    let steam_id = require(&req.steamid)?;
    require_page(&ctx, &auth.actor, Page::Banlist).await?;

    let history = ctx.moderation.history(&steam_id).await?;
    Ok(Json(json!({ "status": "ok", "history": history })))
}

/// One line per active ban: `<steamId>:<end epoch seconds, 0 if permanent> //<reason>`
pub fn render_banlist(bans: &[ModerationRecord]) -> String {
    bans.iter()
        .map(|ban| {
            format!(
                "{}:{} //{}\n",
                ban.steam_id,
                ban.end_date.map_or(0, |end| end / 1000),
                ban.reason
            )
        })
        .collect()
}

/// Token-gated banlist fetched by the game server
async fn banlist(
    State(ctx): State<AppContext>,
    Path(token): Path<String>,
) -> DashboardResult<String> {
    if !ctx.settings.check_whitelist_token(&token).await? {
        tracing::warn!("Banlist requested with a wrong token");
        return Err(DashboardError::Authentication("Something went wrong!".to_string()));
    }

    let bans = ctx.moderation.active_bans(Utc::now().timestamp_millis()).await?;
    Ok(render_banlist(&bans))
}

/// Lift a ban identified by player and end date (`0` for permanent bans)
async fn remove_user_banlist(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Payload(req): Payload<RemoveBanRequest>,
) -> DashboardResult<Json<Value>> {
    let steam_id = require(&req.steam_uid)?;
    let reason = require(&req.reason)?;
    let end_date: i64 = require(&req.end_date)?
        .trim()
        .parse()
        .map_err(|_| malformed())?;
    let end_date = (end_date != 0).then_some(end_date);

    require_page(&ctx, &auth.actor, Page::Banlist).await?;

    ctx.moderation
        .lift_ban(&steam_id, end_date, auth.actor.user_id(), &reason)
        .await?;

    ctx.audit
        .record(NewAuditEntry::new(
            "PLAYER_BANLIST_REMOVED",
            &auth.actor,
            json!({ "player": steam_id, "reason": reason }),
        ))
        .await?;

    Ok(ok("Player removed from banlist!"))
}

/// Most recent audit entries
async fn recent_logs(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    query: Result<Query<LogsQuery>, QueryRejection>,
) -> DashboardResult<Json<Value>> {
    let Query(query) = query.map_err(|e| {
        tracing::debug!("Rejected logs query: {}", e);
        malformed()
    })?;
    require_page(&ctx, &auth.actor, Page::Logs).await?;

    let limit = query
        .limit
        .unwrap_or(DEFAULT_LOG_LIMIT)
        .clamp(1, MAX_LOG_LIMIT);
    let logs = ctx.audit.recent(limit).await?;

    Ok(Json(json!({ "status": "ok", "logs": logs })))
}
