/// Session authentication and the acting administrator's identity
use crate::{
    api::middleware::{client_ip, extract_bearer_token},
    context::AppContext,
    error::{DashboardError, DashboardResult},
};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Chat-platform half of an administrator's identity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscordAccount {
    pub id: Option<String>,
    pub username: Option<String>,
    pub discriminator: Option<String>,
}

/// Game-platform half of an administrator's identity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SteamAccount {
    pub steam64id: Option<String>,
    pub display_name: Option<String>,
    pub identifier: Option<String>,
}

/// The authenticated administrator behind a request
#[derive(Debug, Clone, Default)]
pub struct Actor {
    pub discord: DiscordAccount,
    pub steam: SteamAccount,
    pub ip: Option<String>,
}

impl Actor {
    /// Dashboard user id (the Discord id) used for role lookups
    pub fn user_id(&self) -> Option<&str> {
        self.discord.id.as_deref()
    }

    pub fn display_name(&self) -> Option<&str> {
        self.discord.username.as_deref()
    }
}

/// Claims carried by a dashboard session token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Discord id
    pub sub: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub discriminator: Option<String>,
    #[serde(default)]
    pub steam_id: Option<String>,
    #[serde(default)]
    pub steam_name: Option<String>,
    #[serde(default)]
    pub steam_profile: Option<String>,
    /// Expiry, seconds since the epoch
    pub exp: usize,
}

impl SessionClaims {
    fn into_actor(self, ip: Option<String>) -> Actor {
        Actor {
            discord: DiscordAccount {
                id: Some(self.sub),
                username: self.username,
                discriminator: self.discriminator,
            },
            steam: SteamAccount {
                steam64id: self.steam_id,
                display_name: self.steam_name,
                identifier: self.steam_profile,
            },
            ip,
        }
    }
}

/// Sign a session token for the given claims
pub fn issue_session_token(claims: &SessionClaims, secret: &str) -> DashboardResult<String> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| DashboardError::Internal(format!("Failed to sign session token: {}", e)))
}

/// Verify a session token with full validation
pub fn verify_session_token(token: &str, secret: &str) -> DashboardResult<SessionClaims> {
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    // Allow some clock skew (1 minute)
    validation.leeway = 60;

    decode::<SessionClaims>(token, &decoding_key, &validation)
        .map(|data| data.claims)
        .map_err(|e| {
            tracing::warn!("Session verification failed: {}", e);
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    DashboardError::Authentication("Session has expired".to_string())
                }
                _ => DashboardError::Authentication("Invalid session".to_string()),
            }
        })
}

/// Authenticated context - every dashboard API route except the token-gated lists
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub actor: Actor,
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthContext {
    type Rejection = DashboardError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)
            .ok_or_else(|| DashboardError::Authentication("Missing authorization header".to_string()))?;

        let claims = verify_session_token(&token, &state.config.authentication.session_secret)?;
        let actor = claims.into_actor(client_ip(&parts.headers));

        tracing::debug!(user = ?actor.user_id(), ip = ?actor.ip, "Session accepted");

        Ok(AuthContext { actor })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn claims(exp: usize) -> SessionClaims {
        SessionClaims {
            sub: "123456789".to_string(),
            username: Some("moderator".to_string()),
            discriminator: Some("0001".to_string()),
            steam_id: Some("76561198000000001".to_string()),
            steam_name: Some("Mod".to_string()),
            steam_profile: None,
            exp,
        }
    }

    #[test]
    fn test_token_roundtrip_builds_actor() {
        let exp = (chrono::Utc::now().timestamp() + 3600) as usize;
        let token = issue_session_token(&claims(exp), SECRET).unwrap();

        let actor = verify_session_token(&token, SECRET)
            .unwrap()
            .into_actor(Some("203.0.113.9".to_string()));

        assert_eq!(actor.user_id(), Some("123456789"));
        assert_eq!(actor.steam.steam64id.as_deref(), Some("76561198000000001"));
        assert_eq!(actor.ip.as_deref(), Some("203.0.113.9"));
    }

    #[test]
    fn test_rejects_wrong_secret_and_expired() {
        let exp = (chrono::Utc::now().timestamp() + 3600) as usize;
        let token = issue_session_token(&claims(exp), SECRET).unwrap();
        assert!(verify_session_token(&token, "another-secret-another-secret-xx").is_err());

        let expired = issue_session_token(&claims(1_000), SECRET).unwrap();
        assert!(matches!(
            verify_session_token(&expired, SECRET),
            Err(DashboardError::Authentication(_))
        ));
    }
}
