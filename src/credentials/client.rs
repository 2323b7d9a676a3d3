use crate::config::RenewalConfig;
use crate::credentials::types::{mask_token, ApiError, CredentialEntry, TokenError};
use chrono::DateTime;
use serde::Deserialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Query parameter carrying the expiring token
const TOKEN_QUERY_PARAM: &str = "token";

/// Future returned by [`RenewalClient::renew`]
pub type RenewFuture<'a> =
    Pin<Box<dyn Future<Output = Result<CredentialEntry, ApiError>> + Send + 'a>>;

/// Performs the network call that exchanges an expiring token for a new one
///
/// Transport-level retry for transient failures belongs to the implementation.
/// Any error returned here is final for the current sweep: the renewal worker
/// evicts the credential.
pub trait RenewalClient: Send + Sync {
    /// Renew `token`, returning the replacement credential
    fn renew<'a>(&'a self, token: &'a str) -> RenewFuture<'a>;
}

impl<T: RenewalClient + ?Sized> RenewalClient for Arc<T> {
    fn renew<'a>(&'a self, token: &'a str) -> RenewFuture<'a> {
        (**self).renew(token)
    }
}

/// Renewal endpoint response body
#[derive(Debug, Deserialize)]
struct RenewResponse {
    token: String,
    #[serde(alias = "expiresAt", alias = "expires")]
    expires_at: ExpiryValue,
}

/// Expiry as reported by the issuer: epoch seconds or an RFC 3339 timestamp
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ExpiryValue {
    Seconds(i64),
    Fractional(f64),
    Timestamp(String),
}

impl ExpiryValue {
    fn to_epoch_seconds(&self) -> Result<i64, ApiError> {
        match self {
            ExpiryValue::Seconds(secs) => Ok(*secs),
            ExpiryValue::Fractional(secs) if secs.is_finite() => Ok(secs.floor() as i64),
            ExpiryValue::Fractional(secs) => {
                Err(ApiError::Parse(format!("Invalid expiry value: {}", secs)))
            }
            ExpiryValue::Timestamp(raw) => DateTime::parse_from_rfc3339(raw)
                .map(|expiry| expiry.timestamp())
                .map_err(|e| ApiError::Parse(format!("Invalid expiry timestamp '{}': {}", raw, e))),
        }
    }
}

/// HTTP client for the token renewal endpoint
///
/// Sends `GET <base_url>?token=<expiring token>` and expects a JSON body
/// with the new `token` and its `expires_at`. Non-2xx responses and
/// malformed bodies are renewal failures.
#[derive(Debug, Clone)]
pub struct HttpRenewalClient {
    /// Renewal endpoint URL
    base_url: String,
    /// HTTP client for making requests
    client: reqwest::Client,
}

impl HttpRenewalClient {
    /// Create a client for `base_url` with default TLS settings
    ///
    /// # Example
    ///
    /// ```no_run
    /// use tokenkeeper::HttpRenewalClient;
    ///
    /// let client = HttpRenewalClient::new("https://auth.example.com/token/renew");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    /// Create a client around a preconfigured `reqwest::Client`
    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        let base_url = base_url.into();
        tracing::debug!("Creating HttpRenewalClient with base URL: {}", base_url);

        Self { base_url, client }
    }

    /// Build a client from the renewal URL, TLS flag and timeout in `config`
    pub fn from_config(config: &RenewalConfig) -> Result<Self, TokenError> {
        let base_url = config.renewal_url.clone().ok_or_else(|| {
            TokenError::Config("renewal_url is required for the HTTP renewal client".to_string())
        })?;

        if !config.verify_tls {
            tracing::warn!(
                "TLS certificate verification is disabled for renewal endpoint {}",
                base_url
            );
        }

        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(!config.verify_tls)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| TokenError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self::with_client(base_url, client))
    }

    /// Get the renewal endpoint URL for this client
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Exchange `token` for a fresh credential
    pub async fn renew_token(&self, token: &str) -> Result<CredentialEntry, ApiError> {
        tracing::debug!(
            "Requesting credential renewal from {} for token {}",
            self.base_url,
            mask_token(token)
        );

        let response = self
            .client
            .get(&self.base_url)
            .query(&[(TOKEN_QUERY_PARAM, token)])
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to send renewal request: {}", e);
                ApiError::from(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::error!("Renewal failed: HTTP {} - {}", status.as_u16(), error_body);
            return Err(ApiError::Http {
                status: status.as_u16(),
                message: error_body,
            });
        }

        let body: RenewResponse = response.json().await.map_err(|e| {
            tracing::error!("Failed to parse renewal response: {}", e);
            ApiError::Parse(format!("Failed to parse response JSON: {}", e))
        })?;

        if body.token.trim().is_empty() {
            return Err(ApiError::Parse("Renewal response contained an empty token".to_string()));
        }
        let expires_at = body.expires_at.to_epoch_seconds()?;

        tracing::debug!(
            "Renewal succeeded: token={}, expires_at={}",
            mask_token(&body.token),
            expires_at
        );

        Ok(CredentialEntry::new(body.token, expires_at))
    }
}

impl RenewalClient for HttpRenewalClient {
    fn renew<'a>(&'a self, token: &'a str) -> RenewFuture<'a> {
        Box::pin(self.renew_token(token))
    }
}
