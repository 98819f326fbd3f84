//! Client-credentials token exchange
//!
//! A token is reused from the [`SnapshotCache`] while it is inside its
//! validity window. Refreshes are serialised by a mutex so concurrent
//! callers trigger a single exchange. Failures are returned as
//! [`AppError::AuthError`]; there is no stale fallback for tokens.

use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cache::SnapshotCache;
use crate::config::{CredentialsConfig, SourcesConfig};
use crate::error::AppError;
use crate::metrics;
use crate::models::CachedToken;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(deserialize_with = "deserialize_seconds")]
    expires_in: i64,
}

#[derive(Debug, Default, Deserialize)]
struct TokenErrorResponse {
    error: Option<String>,
    error_description: Option<String>,
}

/// `expires_in` arrives as a number from some authorities and a string from others
fn deserialize_seconds<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Number(i64),
        Text(String),
    }

    match Seconds::deserialize(deserializer)? {
        Seconds::Number(n) => Ok(n),
        Seconds::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Token source for the usage fetcher
pub struct TokenProvider {
    client: reqwest::Client,
    authority_url: String,
    scope: String,
    timeout: Duration,
    credentials: CredentialsConfig,
    cache: Arc<SnapshotCache>,
    refresh_lock: Mutex<()>,
}

impl TokenProvider {
    pub fn new(
        client: reqwest::Client,
        sources: &SourcesConfig,
        credentials: CredentialsConfig,
        cache: Arc<SnapshotCache>,
    ) -> Self {
        Self {
            client,
            authority_url: sources.authority_url.clone(),
            scope: sources.token_scope.clone(),
            timeout: sources.timeout(),
            credentials,
            cache,
            refresh_lock: Mutex::new(()),
        }
    }

    /// Cached token if still valid, otherwise a fresh exchange
    pub async fn get_token(&self) -> Result<String, AppError> {
        if let Some(token) = self.cache.valid_token(Utc::now()) {
            return Ok(token.value.clone());
        }

        let _guard = self.refresh_lock.lock().await;

        // Another caller may have refreshed while we waited
        if let Some(token) = self.cache.valid_token(Utc::now()) {
            return Ok(token.value.clone());
        }

        self.cache.clear_token();

        let result = request_token(
            &self.client,
            &self.authority_url,
            &self.scope,
            &self.credentials,
            self.timeout,
        )
        .await;
        metrics::record_token_exchange(result.is_ok());

        let token = result?;
        info!(
            expires_at = %token.expires_at,
            "Acquired access token"
        );

        let value = token.value.clone();
        self.cache.store_token(token);
        Ok(value)
    }
}

/// Perform one client-credentials exchange without touching any cache
pub async fn request_token(
    client: &reqwest::Client,
    authority_url: &str,
    scope: &str,
    credentials: &CredentialsConfig,
    timeout: Duration,
) -> Result<CachedToken, AppError> {
    let url = format!(
        "{}/{}/oauth2/v2.0/token",
        authority_url.trim_end_matches('/'),
        credentials.tenant_id.trim()
    );
    let form = [
        ("grant_type", "client_credentials"),
        ("client_id", credentials.client_id.trim()),
        ("client_secret", credentials.client_secret.as_str()),
        ("scope", scope),
    ];

    let started = Instant::now();
    let issued_at = Utc::now();
    let response = client
        .post(&url)
        .form(&form)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| AppError::AuthError(format!("Token request failed: {}", e)))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| AppError::AuthError(format!("Failed to read token response: {}", e)))?;

    debug!(
        status = %status,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Token endpoint responded"
    );

    if !status.is_success() {
        let detail: TokenErrorResponse = serde_json::from_str(&body).unwrap_or_default();
        let message = detail
            .error_description
            .or(detail.error)
            .unwrap_or_else(|| format!("token endpoint returned HTTP {}", status));
        warn!(status = %status, "Token exchange rejected");
        return Err(AppError::AuthError(message));
    }

    let parsed: TokenResponse = serde_json::from_str(&body)
        .map_err(|e| AppError::AuthError(format!("Malformed token response: {}", e)))?;

    if parsed.access_token.is_empty() {
        return Err(AppError::AuthError(
            "Token response contained an empty access_token".to_string(),
        ));
    }

    Ok(CachedToken::new(parsed.access_token, issued_at, parsed.expires_in))
}

/// Validate a candidate credential set by attempting only the token exchange
///
/// Format errors are reported before any request is made. Rejections are
/// returned as-is rather than degraded.
pub async fn test_credentials(
    client: &reqwest::Client,
    sources: &SourcesConfig,
    credentials: &CredentialsConfig,
) -> Result<(), AppError> {
    credentials.validate()?;

    request_token(
        client,
        &sources.authority_url,
        &sources.token_scope,
        credentials,
        sources.timeout(),
    )
    .await
    .map(|_| ())
}
