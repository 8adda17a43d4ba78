use std::convert::Infallible;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, header, request::Parts},
};
use axum_extra::extract::cookie::CookieJar;
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{AppConfig, Env};

/// Cookie carrying the Supabase access token set by the login page.
pub const ACCESS_TOKEN_COOKIE: &str = "sb-access-token";
/// Cookie carrying the Supabase refresh token. Never read here; refreshing
/// belongs to the auth service, not to this backend.
pub const REFRESH_TOKEN_COOKIE: &str = "sb-refresh-token";
/// Development-only header naming the subject directly (honoured in `Env::Local`).
pub const DEV_USER_HEADER: &str = "x-user-id";

/// Claims
///
/// The subset of a Supabase access token this service reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the auth user's UUID, also the key of `user_roles`.
    pub sub: Uuid,
    pub exp: usize,
    pub iat: usize,
    /// Supabase stamps "authenticated" on user sessions.
    pub aud: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Server-controlled metadata. Only this block is trusted for an embedded role;
    /// `user_metadata` is writable by the user and is ignored.
    #[serde(default)]
    pub app_metadata: AppMetadata,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// Identity
///
/// An authenticated principal as issued by the identity provider. Opaque to this
/// service apart from its subject id and the optional role it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub subject_id: Uuid,
    pub embedded_role: Option<String>,
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        Identity {
            subject_id: claims.sub,
            embedded_role: claims.app_metadata.role,
        }
    }
}

/// session_from_headers
///
/// Resolves the current session from a request's credential carriers, in order:
/// 1. `x-user-id` (local only),
/// 2. `Authorization: Bearer <jwt>`,
/// 3. the `sb-access-token` cookie.
///
/// Returns `None` for anonymous requests and for any token that fails
/// verification (bad signature, wrong audience, expired, malformed).
pub fn session_from_headers(headers: &HeaderMap, config: &AppConfig) -> Option<Identity> {
    if config.env == Env::Local {
        if let Some(subject_id) = headers
            .get(DEV_USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|raw| Uuid::parse_str(raw).ok())
        {
            return Some(Identity {
                subject_id,
                embedded_role: None,
            });
        }
    }

    let token = bearer_token(headers).or_else(|| cookie_token(headers))?;

    match verify_access_token(&token, config) {
        Ok(claims) => Some(claims.into()),
        Err(e) => {
            tracing::debug!(error = %e, "rejected session token");
            None
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

fn cookie_token(headers: &HeaderMap) -> Option<String> {
    CookieJar::from_headers(headers)
        .get(ACCESS_TOKEN_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|token| !token.is_empty())
}

/// verify_access_token
///
/// Decodes and validates a Supabase access token: HS256 signature against the
/// project JWT secret, expiry, and audience.
pub fn verify_access_token(
    token: &str,
    config: &AppConfig,
) -> Result<Claims, jsonwebtoken::errors::Error> {
    let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());

    let mut validation = Validation::default();
    validation.validate_exp = true;
    validation.set_audience(&[config.jwt_audience.as_str()]);

    decode::<Claims>(token, &decoding_key, &validation).map(|data| data.claims)
}

/// Session
///
/// Extractor yielding the current identity, or `None` for anonymous requests.
/// Never rejects; deciding what an absent session means is the gate's job.
#[derive(Debug, Clone)]
pub struct Session(pub Option<Identity>);

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
    AppConfig: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let config = AppConfig::from_ref(state);
        Ok(Session(session_from_headers(&parts.headers, &config)))
    }
}
