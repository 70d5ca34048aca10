/// Dashboard role and permission management
use crate::{
    admin::{NewAuditEntry, Page, Toggle},
    api::{ok, require, require_page, Param, Payload},
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

/// Build role routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/roles", get(list_roles))
        .route("/roles/toggleRole", post(toggle_role))
        .route("/roles/toggleWhoCan", post(toggle_who_can))
        .route("/roles/toggleCanSee", post(toggle_can_see))
        .route("/roles/addRole", post(add_role))
        .route("/roles/removeRole", post(remove_role))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleRoleRequest {
    pub user_id: Option<Param>,
    pub role: Option<Param>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleWhoCanRequest {
    pub type_action: Option<Param>,
    pub role: Option<Param>,
}

#[derive(Debug, Deserialize)]
pub struct ToggleCanSeeRequest {
    pub page: Option<Param>,
    pub role: Option<Param>,
}

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub role: Option<Param>,
}

fn toggle_label(toggle: Toggle) -> String {
    toggle.as_str().to_uppercase()
}

async fn list_roles(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> DashboardResult<Json<Value>> {
    require_page(&ctx, &auth.actor, Page::Roles).await?;
    let roles = ctx.roles.list_roles().await?;
    Ok(Json(json!({ "status": "ok", "roles": roles })))
}

/// Grant or revoke a dashboard role for a user
async fn toggle_role(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Payload(req): Payload<ToggleRoleRequest>,
) -> DashboardResult<Json<Value>> {
    let user_id = require(&req.user_id)?;
    let role = require(&req.role)?;
    require_page(&ctx, &auth.actor, Page::Roles).await?;

    let label = toggle_label(ctx.roles.toggle_user_role(&user_id, &role).await?);
    ctx.audit
        .record(NewAuditEntry::new(
            format!("ROLE_{}", label),
            &auth.actor,
            json!({ "userId": user_id, "role": role }),
        ))
        .await?;

    Ok(ok(label))
}

/// Flip whether a role may perform an action
async fn toggle_who_can(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Payload(req): Payload<ToggleWhoCanRequest>,
) -> DashboardResult<Json<Value>> {
    let action = require(&req.type_action)?;
    let role = require(&req.role)?;
    require_page(&ctx, &auth.actor, Page::Roles).await?;

    let label = toggle_label(ctx.roles.toggle_who_can(&action, &role).await?);
    ctx.audit
        .record(NewAuditEntry::new(
            format!(
                "WHO_CAN_{}_{}_{}",
                action.to_uppercase(),
                label,
                role.to_uppercase()
            ),
            &auth.actor,
            json!({ "typeAction": action, "role": role }),
        ))
        .await?;

    Ok(ok(label))
}

/// Flip whether a role may see a page
async fn toggle_can_see(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Payload(req): Payload<ToggleCanSeeRequest>,
) -> DashboardResult<Json<Value>> {
    let page = require(&req.page)?;
    let role = require(&req.role)?;
    require_page(&ctx, &auth.actor, Page::Roles).await?;

    let label = toggle_label(ctx.roles.toggle_can_see(&page, &role).await?);
    ctx.audit
        .record(NewAuditEntry::new(
            format!(
                "CAN_SEE_{}_{}_{}",
                page.to_uppercase(),
                label,
                role.to_uppercase()
            ),
            &auth.actor,
            json!({ "page": page, "role": role }),
        ))
        .await?;

    Ok(ok(label))
}

async fn add_role(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Payload(req): Payload<RoleRequest>,
) -> DashboardResult<Json<Value>> {
    let role = require(&req.role)?;
    require_page(&ctx, &auth.actor, Page::Roles).await?;

    ctx.roles.add_role(&role).await?;
    ctx.audit
        .record(NewAuditEntry::new(
            "ADD_NEW_ROLE",
            &auth.actor,
            json!({ "role": role }),
        ))
        .await?;

    Ok(ok("The new role is added!"))
}

async fn remove_role(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Payload(req): Payload<RoleRequest>,
) -> DashboardResult<Json<Value>> {
    let role = require(&req.role)?;
    require_page(&ctx, &auth.actor, Page::Roles).await?;

    ctx.roles.remove_role(&role).await?;
    ctx.audit
        .record(NewAuditEntry::new(
            "REMOVE_ROLE",
            &auth.actor,
            json!({ "role": role }),
        ))
        .await?;

    Ok(ok("The role is removed!"))
}
