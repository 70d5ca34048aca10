/// Unified error types for the Squad dashboard
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Message returned for malformed requests, shared by every route
pub const MALFORMED_REQUEST: &str = "You are doing something wrong.";

/// Message returned when the actor's roles do not cover the action
pub const NOT_ALLOWED: &str = "You are not allowed to do this.";

/// Message returned when the role/permission tables cannot be trusted
pub const SCHEMA_INVALID: &str = "Something is not good with the permissions schema!";

/// Main error type for the dashboard
#[derive(Error, Debug)]
pub enum DashboardError {
    /// Missing or empty required field
    #[error("Validation error: {0}")]
    Validation(String),

    /// No valid session
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Actor's roles do not allow the action
    #[error("Not authorized: {0}")]
    Authorization(String),

    /// Domain conflict (e.g. player already banned)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Role/permission mapping is corrupted or references unknown entries
    #[error("Permission schema invalid: {0}")]
    SchemaInvalid(String),

    /// The game server never acknowledged a command, or acknowledged it with an error
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Audit or moderation write failed after the action itself succeeded
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Rate limiting errors
    #[error("Rate limit exceeded")]
    RateLimitExceeded { retry_after: std::time::Duration },

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DashboardError {
    /// Envelope status code sent to the dashboard front-end
    pub fn status_code(&self) -> &'static str {
        match self {
            DashboardError::Authorization(_) => "nok2",
            DashboardError::Conflict(_) => "nok3",
            DashboardError::Upstream(_) => "nok4",
            DashboardError::Persistence(_) => "nok5",
            _ => "nok",
        }
    }

    /// Wrap a storage failure that happened after the action already took effect
    pub fn persistence(err: sqlx::Error) -> Self {
        DashboardError::Persistence(err.to_string())
    }
}

/// Status envelope returned by every JSON route
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub status: String,
    pub message: String,
}

/// Convert DashboardError to HTTP response
impl IntoResponse for DashboardError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let (http_status, message) = match &self {
            DashboardError::Validation(msg) | DashboardError::SchemaInvalid(msg) => {
                (StatusCode::BAD_REQUEST, msg.clone())
            }
            DashboardError::Authentication(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            DashboardError::Authorization(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            DashboardError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            DashboardError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            DashboardError::Upstream(msg) => (
                StatusCode::BAD_GATEWAY,
                format!("The game server did not confirm the command: {}", msg),
            ),
            DashboardError::Persistence(_) => {
                tracing::error!("{}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "The action was executed but could not be logged.".to_string(),
                )
            }
            DashboardError::RateLimitExceeded { .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                "Rate limit exceeded".to_string(),
            ),
            DashboardError::Database(_) | DashboardError::Io(_) | DashboardError::Internal(_) => {
                tracing::error!("{}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(), // Don't leak details
                )
            }
        };

        let retry_after = match &self {
            DashboardError::RateLimitExceeded { retry_after } => Some(retry_after.as_secs().max(1)),
            _ => None,
        };

        let body = Json(ErrorEnvelope {
            status: status.to_string(),
            message,
        });

        let mut response = (http_status, body).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

/// Result type alias for dashboard operations
pub type DashboardResult<T> = Result<T, DashboardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_stay_distinct() {
        assert_eq!(DashboardError::Validation(MALFORMED_REQUEST.into()).status_code(), "nok");
        assert_eq!(DashboardError::Authorization(NOT_ALLOWED.into()).status_code(), "nok2");
        assert_eq!(DashboardError::Conflict("dup".into()).status_code(), "nok3");
        assert_eq!(DashboardError::Upstream("timeout".into()).status_code(), "nok4");
        assert_eq!(DashboardError::Persistence("disk".into()).status_code(), "nok5");
        assert_eq!(DashboardError::SchemaInvalid(SCHEMA_INVALID.into()).status_code(), "nok");
    }

    #[test]
    fn test_http_status_mapping() {
        let response = DashboardError::Authorization(NOT_ALLOWED.into()).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = DashboardError::Upstream("timeout".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let response = DashboardError::Internal("boom".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().get(header::RETRY_AFTER).is_none());
    }

    #[test]
    fn test_rate_limit_sets_retry_after() {
        let response = DashboardError::RateLimitExceeded {
            retry_after: std::time::Duration::from_secs(3),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "3");
    }
}
