/// API routes and handlers
pub mod commands;
pub mod dashboard;
pub mod middleware;
pub mod moderation;
pub mod roles;
pub mod server;
pub mod whitelist;

use crate::{
    admin::{Page, OWNER_ROLE},
    auth::Actor,
    context::AppContext,
    error::{DashboardError, DashboardResult, MALFORMED_REQUEST, NOT_ALLOWED},
};
use axum::{
    async_trait,
    extract::{FromRequest, Request},
    http::header::CONTENT_TYPE,
    Form, Json, Router,
};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(server::routes())
        .merge(commands::routes())
        .merge(moderation::routes())
        .merge(whitelist::routes())
        .merge(roles::routes())
        .merge(dashboard::routes())
}

/// Request body sent either as JSON or as an urlencoded form
#[derive(Debug, Clone)]
pub struct Payload<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for Payload<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = DashboardError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map_or(false, |ct| ct.starts_with("application/json"));

        if is_json {
            let Json(body) = Json::<T>::from_request(req, state).await.map_err(|e| {
                tracing::debug!("Rejected JSON body: {}", e);
                malformed()
            })?;
            Ok(Payload(body))
        } else {
            let Form(body) = Form::<T>::from_request(req, state).await.map_err(|e| {
                tracing::debug!("Rejected form body: {}", e);
                malformed()
            })?;
            Ok(Payload(body))
        }
    }
}

/// Body field that may arrive as a string, a number or a boolean
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Param {
    Text(String),
    Number(serde_json::Number),
    Flag(bool),
}

impl Param {
    pub fn as_text(&self) -> String {
        match self {
            Param::Text(text) => text.clone(),
            Param::Number(number) => number.to_string(),
            Param::Flag(flag) => flag.to_string(),
        }
    }
}

pub fn malformed() -> DashboardError {
    DashboardError::Validation(MALFORMED_REQUEST.to_string())
}

/// Required field: present and not blank
pub fn require(param: &Option<Param>) -> DashboardResult<String> {
    param
        .as_ref()
        .map(Param::as_text)
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(malformed)
}

/// `{status: "ok", message}` envelope
pub fn ok(message: impl Into<String>) -> Json<Value> {
    Json(json!({ "status": "ok", "message": message.into() }))
}

/// The actor must be allowed to see the page
pub async fn require_page(ctx: &AppContext, actor: &Actor, page: Page) -> DashboardResult<()> {
    if ctx.roles.can_see(actor.user_id(), page).await? {
        Ok(())
    } else {
        tracing::warn!(user = ?actor.user_id(), page = page.as_str(), "Page access refused");
        Err(DashboardError::Authorization(NOT_ALLOWED.to_string()))
    }
}

/// The actor must hold the owner role
pub async fn require_owner(ctx: &AppContext, actor: &Actor) -> DashboardResult<()> {
    if ctx.roles.has_role(actor.user_id(), OWNER_ROLE).await? {
        Ok(())
    } else {
        tracing::warn!(user = ?actor.user_id(), "Owner-only operation refused");
        Err(DashboardError::Authorization(NOT_ALLOWED.to_string()))
    }
}
