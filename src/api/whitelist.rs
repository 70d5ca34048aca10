/// Squad whitelist management and the token-gated admins list
use crate::{
    admin::{whitelist::parse_admin_cfg, whitelist::render_admin_cfg, NewAuditEntry, Page},
    api::{malformed, ok, require, require_owner, require_page, Param, Payload},
    auth::AuthContext,
    context::AppContext,
    error::{DashboardError, DashboardResult},
};
use axum::{
    extract::{multipart::MultipartRejection, Multipart, Path, State},
    response::Redirect,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

/// Build whitelist routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/whitelist/:token", get(whitelist))
        .route("/url", get(whitelist_url))
        .route("/url/regenerate", get(regenerate_whitelist_url))
        .route("/whitelist/removeUserWhitelist", post(remove_user))
        .route("/whitelist/roles/addPermission", post(add_permission))
        .route("/whitelist/roles/removePermission", post(remove_permission))
        .route("/whitelist/addGroup", post(add_group))
        .route("/whitelist/addUserWhitelist", post(add_user))
        .route("/whitelist/removeGroup", post(remove_group))
        .route("/whitelist/import", post(import))
}

#[derive(Debug, Deserialize)]
pub struct RemoveUserRequest {
    #[serde(rename = "steamUID")]
    pub steam_uid: Option<Param>,
    pub reason: Option<Param>,
}

#[derive(Debug, Deserialize)]
pub struct GroupPermissionRequest {
    pub role: Option<Param>,
    pub permission: Option<Param>,
}

#[derive(Debug, Deserialize)]
pub struct GroupRequest {
    pub group: Option<Param>,
}

#[derive(Debug, Deserialize)]
pub struct AddUserRequest {
    #[serde(rename = "steamID")]
    pub steam_id: Option<Param>,
    pub description: Option<Param>,
    pub role: Option<Param>,
}

const ADMINS_FILE: &str = "admins.cfg";
const ROLES_PAGE: &str = "/roles";

/// Token-gated admins list fetched by the game server
async fn whitelist(
    State(ctx): State<AppContext>,
    Path(token): Path<String>,
) -> DashboardResult<String> {
    if !ctx.settings.check_whitelist_token(&token).await? {
        tracing::warn!("Whitelist requested with a wrong token");
        return Err(DashboardError::Authentication("Something went wrong!".to_string()));
    }

    let whitelist = ctx.whitelist.load().await?;
    Ok(render_admin_cfg(&whitelist))
}

async fn whitelist_url(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> DashboardResult<Json<Value>> {
    require_page(&ctx, &auth.actor, Page::Roles).await?;
    require_owner(&ctx, &auth.actor).await?;

    let token = ctx.settings.whitelist_token().await?;
    ctx.audit
        .record(NewAuditEntry::new("WHITELIST_URL", &auth.actor, Value::Null))
        .await?;

    Ok(Json(json!({ "status": "ok", "message": "URL sent!", "token": token })))
}

async fn regenerate_whitelist_url(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> DashboardResult<Json<Value>> {
    require_page(&ctx, &auth.actor, Page::Roles).await?;
    require_owner(&ctx, &auth.actor).await?;

    let token = ctx.settings.regenerate_whitelist_token().await?;
    ctx.audit
        .record(NewAuditEntry::new(
            "WHITELIST_URL_REGENERATED",
            &auth.actor,
            Value::Null,
        ))
        .await?;

    Ok(Json(json!({ "status": "ok", "message": "URL sent!", "token": token })))
}

async fn remove_user(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Payload(req): Payload<RemoveUserRequest>,
) -> DashboardResult<Json<Value>> {
    let steam_id = require(&req.steam_uid)?;
    let reason = require(&req.reason)?;
    require_page(&ctx, &auth.actor, Page::Roles).await?;

    ctx.whitelist.remove_user(&steam_id).await?;
    ctx.audit
        .record(NewAuditEntry::new(
            "PLAYER_WHITELIST_REMOVED",
            &auth.actor,
            json!({ "player": steam_id, "reason": reason }),
        ))
        .await?;

    Ok(ok("Whitelist removed from the player!"))
}

async fn add_permission(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Payload(req): Payload<GroupPermissionRequest>,
) -> DashboardResult<Json<Value>> {
    let role = require(&req.role)?;
    let permission = require(&req.permission)?;
    require_page(&ctx, &auth.actor, Page::Roles).await?;

    ctx.whitelist.add_permission(&role, &permission).await?;
    ctx.audit
        .record(NewAuditEntry::new(
            "WHITELIST_GROUPE_PERM_ADD",
            &auth.actor,
            json!({ "role": role, "permission": permission }),
        ))
        .await?;

    Ok(ok("Permission added!"))
}

async fn remove_permission(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Payload(req): Payload<GroupPermissionRequest>,
) -> DashboardResult<Json<Value>> {
    let role = require(&req.role)?;
    let permission = require(&req.permission)?;
    require_page(&ctx, &auth.actor, Page::Roles).await?;

    ctx.whitelist.remove_permission(&role, &permission).await?;
    ctx.audit
        .record(NewAuditEntry::new(
            "WHITELIST_GROUPE_PERM_REMOVE",
            &auth.actor,
            json!({ "role": role, "permission": permission }),
        ))
        .await?;

    Ok(ok("Permission removed!"))
}

async fn add_group(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Payload(req): Payload<GroupRequest>,
) -> DashboardResult<Redirect> {
    let requested = require(&req.group)?;
    require_page(&ctx, &auth.actor, Page::Roles).await?;

    let group = ctx
        .whitelist
        .add_group(&requested)
        .await
        .map_err(|e| match e {
            DashboardError::Validation(_) => malformed(),
            other => other,
        })?;
    ctx.audit
        .record(NewAuditEntry::new(
            "WHITELIST_GROUP_ADD",
            &auth.actor,
            json!({ "group": group }),
        ))
        .await?;

    Ok(Redirect::to(ROLES_PAGE))
}

async fn add_user(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Payload(req): Payload<AddUserRequest>,
) -> DashboardResult<Redirect> {
    let steam_id = require(&req.steam_id)?;
    let description = require(&req.description)?;
    let role = require(&req.role)?;
    require_page(&ctx, &auth.actor, Page::Roles).await?;

    ctx.whitelist.add_user(&steam_id, &role, &description).await?;
    ctx.audit
        .record(NewAuditEntry::new(
            "PLAYER_WHITELIST_ADD",
            &auth.actor,
            json!({ "player": steam_id, "description": description, "role": role }),
        ))
        .await?;

    Ok(Redirect::to(ROLES_PAGE))
}

async fn remove_group(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Payload(req): Payload<GroupRequest>,
) -> DashboardResult<Json<Value>> {
    let group = require(&req.group)?;
    require_page(&ctx, &auth.actor, Page::Roles).await?;

    ctx.whitelist.remove_group(&group).await?;
    ctx.audit
        .record(NewAuditEntry::new(
            "WHITELIST_GROUP_REMOVE",
            &auth.actor,
            json!({ "group": group }),
        ))
        .await?;

    Ok(ok("Group removed!"))
}

/// Replace the whitelist with an uploaded `admins.cfg`
async fn import(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    multipart: Result<Multipart, MultipartRejection>,
) -> DashboardResult<Redirect> {
    require_page(&ctx, &auth.actor, Page::Roles).await?;
    require_owner(&ctx, &auth.actor).await?;

    let mut multipart = multipart.map_err(|e| {
        tracing::debug!("Rejected multipart body: {}", e);
        malformed()
    })?;

    let mut content = None;
    while let Some(field) = multipart.next_field().await.map_err(|_| malformed())? {
        if field.name() != Some("whitelistfile") {
            continue;
        }
        if content.is_some() {
            return Err(DashboardError::Validation("Too many files".to_string()));
        }

        let file_name = field.file_name().unwrap_or_default().to_ascii_lowercase();
        if file_name != ADMINS_FILE {
            return Err(DashboardError::Validation(format!(
                "File name should be {}",
                ADMINS_FILE
            )));
        }

        content = Some(field.text().await.map_err(|_| malformed())?);
    }

    let content = content.ok_or_else(|| DashboardError::Validation("No file found".to_string()))?;
    let parsed = parse_admin_cfg(&content);

    ctx.whitelist.import(&parsed).await?;
    ctx.audit
        .record(NewAuditEntry::new(
            "WHITELIST_IMPORTED",
            &auth.actor,
            json!({ "groups": parsed.roles.len(), "players": parsed.whitelisted.len() }),
        ))
        .await?;

    Ok(Redirect::to(ROLES_PAGE))
}
