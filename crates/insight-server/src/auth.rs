//! Bearer-token authentication.
//!
//! An [`IdentityProvider`] turns a bearer token into a user id and a user id
//! into a profile. Handlers take an [`AuthUser`] argument; extraction fails
//! with 401 whenever the caller cannot be identified.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::state::AppState;
use insight_core::{Error, Result, UserProfile};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid or expired token")]
    InvalidToken,

    #[error("unknown user: {0}")]
    UnknownUser(String),

    #[error("identity provider error: {0}")]
    Provider(String),
}

/// Verifies bearer credentials and looks up user profiles.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Map a bearer token to the user id it was issued for.
    async fn verify_token(&self, token: &str) -> std::result::Result<String, AuthError>;

    /// Profile of a verified user.
    async fn user_profile(&self, user_id: &str) -> std::result::Result<UserProfile, AuthError>;
}

#[derive(Debug, Deserialize)]
struct CredentialsFile {
    #[serde(default)]
    tokens: HashMap<String, UserProfile>,
}

/// Identity provider backed by a fixed token table.
///
/// The credentials file has the shape
/// `{"tokens": {"<token>": {"uid": "...", "email": "..."}}}`.
pub struct StaticIdentityProvider {
    tokens: HashMap<String, String>,
    profiles: HashMap<String, UserProfile>,
}

impl StaticIdentityProvider {
    pub fn from_profiles(entries: impl IntoIterator<Item = (String, UserProfile)>) -> Self {
        let mut tokens = HashMap::new();
        let mut profiles = HashMap::new();
        for (token, profile) in entries {
            tokens.insert(token, profile.user_id.clone());
            profiles.insert(profile.user_id.clone(), profile);
        }
        Self { tokens, profiles }
    }

    /// Load the token table. A missing file yields a provider that rejects
    /// every token.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    "No credentials file at {}, all requests will be rejected",
                    path.display()
                );
                return Ok(Self::from_profiles(HashMap::new()));
            }
            Err(e) => return Err(Error::Io(e)),
        };
        let file: CredentialsFile = serde_json::from_str(&raw)?;
        info!("Loaded {} credentials from {}", file.tokens.len(), path.display());
        Ok(Self::from_profiles(file.tokens))
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn verify_token(&self, token: &str) -> std::result::Result<String, AuthError> {
        self.tokens.get(token).cloned().ok_or(AuthError::InvalidToken)
    }

    async fn user_profile(&self, user_id: &str) -> std::result::Result<UserProfile, AuthError> {
        self.profiles
            .get(user_id)
            .cloned()
            .ok_or_else(|| AuthError::UnknownUser(user_id.to_string()))
    }
}

/// The authenticated caller of a request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> std::result::Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or_else(|| {
            ApiError::Unauthenticated("Authorization header required.".into())
        })?;

        let user_id = state.identity.verify_token(token).await.map_err(|e| {
            debug!("Rejected bearer token: {}", e);
            ApiError::Unauthenticated("Invalid token.".into())
        })?;

        Ok(AuthUser { user_id })
    }
}

/// Token from an `Authorization: Bearer <token>` header. The scheme name is
/// matched case-insensitively.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let auth = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = auth.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}
