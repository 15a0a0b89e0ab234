//! Authentication extractors.
//!
//! This module provides extractors for:
//! - `AuthUser` - End-user authentication via identity-provider JWT
//! - `AdminAuth` - An `AuthUser` who is also an admin (email allow-list or account flag)

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use paw_points_core::UserId;

use crate::error::ApiError;
use crate::state::AppState;

// ============================================================================
// Constants
// ============================================================================

/// How long to cache JWKS keys before refreshing.
const JWKS_CACHE_DURATION: Duration = Duration::from_secs(3600); // 1 hour

/// Timeout for JWKS fetch requests.
const JWKS_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// An authenticated user extracted from a bearer JWT.
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// The user ID (`sub` claim).
    pub user_id: UserId,
    /// The `email` claim, if present.
    pub email: Option<String>,
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        state: &'life1 Arc<AppState>,
    ) -> ::core::pin::Pin<
        Box<
            dyn ::core::future::Future<Output = Result<Self, Self::Rejection>>
                + ::core::marker::Send
                + 'async_trait,
        >,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            let auth_header = parts
                .headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .ok_or(ApiError::Unauthorized)?;

            let token = auth_header
                .strip_prefix("Bearer ")
                .ok_or(ApiError::Unauthorized)?;

            // Only compiled into test builds and builds with the "test-auth" feature.
            #[cfg(any(test, feature = "test-auth"))]
            if let Some(rest) = token.strip_prefix("test-token:") {
                return test_token_user(rest);
            }

            let claims = validate_jwt(token, state).await?;

            let user_id = claims
                .sub
                .parse::<UserId>()
                .map_err(|_| ApiError::Unauthorized)?;

            Ok(AuthUser {
                user_id,
                email: claims.email,
            })
        })
    }
}

/// Parse `<uuid>` or `<uuid>:<email>`.
#[cfg(any(test, feature = "test-auth"))]
fn test_token_user(rest: &str) -> Result<AuthUser, ApiError> {
    let (user_id, email) = match rest.split_once(':') {
        Some((id, email)) => (id, Some(email.to_string())),
        None => (rest, None),
    };

    let user_id = user_id
        .parse::<UserId>()
        .map_err(|_| ApiError::Unauthorized)?;

    Ok(AuthUser { user_id, email })
}

/// An authenticated admin.
///
/// Admin status comes from the `ADMIN_EMAILS` allow-list or the account's
/// `is_admin` flag.
#[derive(Debug, Clone)]
pub struct AdminAuth {
    /// The admin's user ID (for audit logging).
    pub user_id: UserId,
    /// The admin's email, if the token carried one.
    pub email: Option<String>,
}

impl FromRequestParts<Arc<AppState>> for AdminAuth {
    type Rejection = ApiError;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        state: &'life1 Arc<AppState>,
    ) -> ::core::pin::Pin<
        Box<
            dyn ::core::future::Future<Output = Result<Self, Self::Rejection>>
                + ::core::marker::Send
                + 'async_trait,
        >,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            let user = AuthUser::from_request_parts(parts, state).await?;

            let by_email = user
                .email
                .as_deref()
                .is_some_and(|email| state.config.is_admin_email(email));

            let is_admin = by_email
                || state
                    .store
                    .get_account(&user.user_id)
                    .await?
                    .is_some_and(|account| account.is_admin);

            if !is_admin {
                tracing::warn!(user_id = %user.user_id, "Non-admin attempted admin access");
                return Err(ApiError::Forbidden);
            }

            tracing::info!(user_id = %user.user_id, "Admin authenticated");

            Ok(AdminAuth {
                user_id: user.user_id,
                email: user.email,
            })
        })
    }
}

/// JWT claims issued by the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject (user ID).
    pub sub: String,
    /// Email address, if the provider includes it.
    #[serde(default)]
    pub email: Option<String>,
    /// Audience (can be string or array).
    #[serde(default)]
    pub aud: Option<serde_json::Value>,
    /// Issuer.
    pub iss: String,
    /// Expiration time.
    pub exp: i64,
    /// Issued at.
    pub iat: i64,
}

// ============================================================================
// JWKS Client and JWT Validation
// ============================================================================

/// JWKS (JSON Web Key Set) response structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwks {
    /// List of JWK keys.
    pub keys: Vec<Jwk>,
}

/// Single JSON Web Key.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type (e.g., "RSA").
    pub kty: String,
    /// Key ID.
    pub kid: Option<String>,
    /// Algorithm (e.g., "RS256").
    pub alg: Option<String>,
    /// RSA public key modulus (base64url encoded).
    pub n: Option<String>,
    /// RSA public key exponent (base64url encoded).
    pub e: Option<String>,
    /// Key use (e.g., "sig" for signature).
    #[serde(rename = "use")]
    pub key_use: Option<String>,
}

struct JwksCache {
    /// Shared so fetches reuse pooled connections.
    client: reqwest::Client,
    /// Keys by kid.
    keys: HashMap<String, DecodingKey>,
    /// Used for tokens without a kid.
    default_key: Option<DecodingKey>,
    last_updated: Instant,
}

impl JwksCache {
    fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(JWKS_FETCH_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            keys: HashMap::new(),
            default_key: None,
            // Start expired so the first lookup fetches.
            last_updated: Instant::now()
                .checked_sub(JWKS_CACHE_DURATION)
                .unwrap_or_else(Instant::now),
        }
    }

    fn is_expired(&self) -> bool {
        self.last_updated.elapsed() >= JWKS_CACHE_DURATION
    }

    fn lookup(&self, kid: Option<&str>) -> Option<DecodingKey> {
        match kid {
            Some(kid) => self.keys.get(kid).cloned(),
            None => self.default_key.clone(),
        }
    }

    fn replace(&mut self, jwks: &Jwks) {
        self.keys.clear();
        self.default_key = None;
        self.last_updated = Instant::now();

        for jwk in &jwks.keys {
            if let Some(decoding_key) = jwk_to_decoding_key(jwk) {
                if let Some(ref key_kid) = jwk.kid {
                    self.keys.insert(key_kid.clone(), decoding_key.clone());
                }
                if self.default_key.is_none() {
                    self.default_key = Some(decoding_key);
                }
            }
        }
    }
}

static JWKS_CACHE: std::sync::OnceLock<RwLock<JwksCache>> = std::sync::OnceLock::new();

fn get_jwks_cache() -> &'static RwLock<JwksCache> {
    JWKS_CACHE.get_or_init(|| RwLock::new(JwksCache::new()))
}

/// Validate a JWT against the provider's JWKS.
async fn validate_jwt(token: &str, state: &AppState) -> Result<JwtClaims, ApiError> {
    let header = decode_header(token).map_err(|e| {
        tracing::debug!(error = %e, "Failed to decode JWT header");
        ApiError::Unauthorized
    })?;

    let decoding_key = get_decoding_key(header.kid.as_deref(), state).await?;

    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_audience(&[&state.config.auth_audience]);
    validation.set_issuer(&[&state.config.auth_base_url]);

    let token_data = decode::<JwtClaims>(token, &decoding_key, &validation).map_err(|e| {
        tracing::debug!(error = %e, "JWT validation failed");
        ApiError::Unauthorized
    })?;

    Ok(token_data.claims)
}

/// Get a decoding key from cache, refreshing the JWKS on a miss or expiry.
async fn get_decoding_key(kid: Option<&str>, state: &AppState) -> Result<DecodingKey, ApiError> {
    let cache = get_jwks_cache();

    {
        let cache_read = cache.read().await;
        if !cache_read.is_expired() {
            if let Some(key) = cache_read.lookup(kid) {
                return Ok(key);
            }
        }
    }

    let jwks = fetch_jwks(state).await?;

    let mut cache_write = cache.write().await;
    cache_write.replace(&jwks);
    cache_write.lookup(kid).ok_or(ApiError::Unauthorized)
}

async fn fetch_jwks(state: &AppState) -> Result<Jwks, ApiError> {
    let jwks_url = format!("{}/.well-known/jwks.json", state.config.auth_base_url);

    tracing::debug!(url = %jwks_url, "Fetching JWKS");

    let client = get_jwks_cache().read().await.client.clone();

    let response = client.get(&jwks_url).send().await.map_err(|e| {
        tracing::error!(error = %e, url = %jwks_url, "Failed to fetch JWKS");
        ApiError::ExternalService("Failed to fetch authentication keys".into())
    })?;

    if !response.status().is_success() {
        tracing::error!(
            status = %response.status(),
            url = %jwks_url,
            "JWKS fetch returned non-success status"
        );
        return Err(ApiError::ExternalService(
            "Failed to fetch authentication keys".into(),
        ));
    }

    let jwks: Jwks = response.json().await.map_err(|e| {
        tracing::error!(error = %e, "Failed to parse JWKS response");
        ApiError::ExternalService("Failed to parse authentication keys".into())
    })?;

    tracing::info!(keys_count = %jwks.keys.len(), "JWKS fetched successfully");

    Ok(jwks)
}

fn jwk_to_decoding_key(jwk: &Jwk) -> Option<DecodingKey> {
    if jwk.kty != "RSA" {
        tracing::debug!(kty = %jwk.kty, "Skipping non-RSA JWK");
        return None;
    }

    let n = jwk.n.as_ref()?;
    let e = jwk.e.as_ref()?;

    DecodingKey::from_rsa_components(n, e).ok()
}
