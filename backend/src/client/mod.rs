//! # Marketplace API Client
//!
//! This module talks to the external marketplace REST API on behalf of a
//! vendor. The marketplace owns the ledger: commission calculation, the
//! holding period and payouts all happen there.
//!
//! ## Endpoints Used
//!
//! | Method | Path | Purpose |
//! |--------|------|---------|
//! | GET | `/vendors/earnings` | Earning rows + summary |
//! | POST | `/vendors/withdraw` | Withdrawal through the payment processor |
//! | GET | `/vendors/profile` | Onboarding status after a withdrawal |
//!
//! ## Envelope
//!
//! Every marketplace response is wrapped:
//!
//! ```json
//! { "success": true, "data": { ... } }
//! { "success": false, "message": "...", "requiresOnboarding": true }
//! ```
//!
//! [`interpret_response`] turns a status code and body into the typed
//! payload or a [`ClientError`].
//!
//! ## Authentication
//!
//! The bearer token is injected through a [`TokenProvider`] when the client
//! is built. Nothing in here reads ambient state.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::models::{EarningsPage, EarningsQuery, VendorProfile, WithdrawalReceipt};
use crate::utils::truncate_string;

#[cfg(test)]
pub mod mock;

/// Errors from marketplace API calls.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    /// The request never got an answer (connection refused, reset, DNS).
    #[error("network error: {0}")]
    Network(String),

    /// No answer within the client-side timeout.
    #[error("marketplace did not answer within {0:?}")]
    Timeout(Duration),

    /// The marketplace rejected the token.
    #[error("marketplace rejected the credentials")]
    Unauthorized,

    /// The marketplace answered `success: false` with a reason.
    #[error("{message}")]
    Rejected {
        message: String,
        requires_onboarding: bool,
        stripe_account_id: Option<String>,
    },

    /// Non-success HTTP status without a usable envelope.
    #[error("marketplace returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The body did not match the expected shape.
    #[error("parse error: {0}")]
    Parse(String),
}

impl ClientError {
    /// Whether the request may have been processed even though no
    /// definitive answer came back.
    pub fn is_ambiguous(&self) -> bool {
        match self {
            ClientError::Network(_) | ClientError::Timeout(_) => true,
            ClientError::Http { status, .. } => *status >= 500,
            ClientError::Unauthorized | ClientError::Rejected { .. } | ClientError::Parse(_) => false,
        }
    }
}

/// Source of the bearer token sent to the marketplace.
pub trait TokenProvider: Send + Sync {
    fn bearer_token(&self) -> Option<String>;
}

/// A token fixed at construction time (one vendor session).
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl TokenProvider for StaticToken {
    fn bearer_token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// Operations the service needs from the marketplace.
///
/// Implement this trait to substitute the marketplace in tests.
#[async_trait]
pub trait MarketplaceApi: Send + Sync {
    /// `GET /vendors/earnings`
    async fn list_earnings(&self, query: &EarningsQuery) -> Result<EarningsPage, ClientError>;

    /// `POST /vendors/withdraw`
    async fn request_withdrawal(
        &self,
        amount: Decimal,
        idempotency_key: Uuid,
    ) -> Result<WithdrawalReceipt, ClientError>;

    /// `GET /vendors/profile`
    async fn vendor_profile(&self) -> Result<VendorProfile, ClientError>;
}

/// Builds one marketplace client per vendor session.
pub trait ClientFactory: Send + Sync {
    fn for_token(&self, token: &str) -> Arc<dyn MarketplaceApi>;
}

/// Marketplace envelope.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<T> {
    success: bool,
    data: Option<T>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    requires_onboarding: Option<bool>,
    #[serde(default)]
    stripe_account_id: Option<String>,
}

/// Body of `POST /vendors/withdraw`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WithdrawPayload {
    #[serde(with = "rust_decimal::serde::float")]
    amount: Decimal,
    idempotency_key: Uuid,
}

/// Decode a marketplace response.
///
/// | Status | Body | Result |
/// |--------|------|--------|
/// | 401 | any | `Unauthorized` |
/// | any | `success: true` with data | `Ok(data)` |
/// | 5xx | anything else | `Http` |
/// | other | `success: false` | `Rejected` |
/// | other | anything else | `Parse` / `Http` |
pub fn interpret_response<T: DeserializeOwned>(status: u16, body: &str) -> Result<T, ClientError> {
    if status == StatusCode::UNAUTHORIZED.as_u16() {
        return Err(ClientError::Unauthorized);
    }

    let envelope: Envelope<T> = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        Err(e) => {
            if (200..300).contains(&status) {
                return Err(ClientError::Parse(e.to_string()));
            }
            return Err(ClientError::Http {
                status,
                message: truncate_string(body, 200),
            });
        }
    };

    match (envelope.success, envelope.data) {
        (true, Some(data)) => Ok(data),
        (true, None) => Err(ClientError::Parse("success response without data".to_string())),
        (false, _) if status >= 500 => Err(ClientError::Http {
            status,
            message: envelope.message.unwrap_or_else(|| "server error".to_string()),
        }),
        (false, _) => Err(ClientError::Rejected {
            message: envelope
                .message
                .unwrap_or_else(|| "The marketplace rejected the request".to_string()),
            requires_onboarding: envelope.requires_onboarding.unwrap_or(false),
            stripe_account_id: envelope.stripe_account_id,
        }),
    }
}

/// reqwest-backed marketplace client for one vendor.
///
/// ## Usage
///
/// ```rust,ignore
/// let client = HttpMarketplaceClient::new(http, &config, Arc::new(StaticToken::new(token)));
/// let page = client.list_earnings(&EarningsQuery::default()).await?;
/// ```
#[derive(Clone)]
pub struct HttpMarketplaceClient {
    http: Client,
    base_url: String,
    read_timeout: Duration,
    tokens: Arc<dyn TokenProvider>,
}

impl HttpMarketplaceClient {
    pub fn new(http: Client, config: &AppConfig, tokens: Arc<dyn TokenProvider>) -> Self {
        Self {
            http,
            base_url: config.marketplace_api_url.clone(),
            read_timeout: config.upstream_timeout,
            tokens,
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.tokens.bearer_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        timeout: Option<Duration>,
    ) -> Result<T, ClientError> {
        let response = self.authorize(request).send().await.map_err(|e| {
            if e.is_timeout() {
                ClientError::Timeout(timeout.unwrap_or_default())
            } else {
                ClientError::Network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        debug!("Marketplace answered HTTP {} ({} bytes)", status, body.len());

        let result = interpret_response(status, &body);
        if let Err(ClientError::Http { status, message }) = &result {
            warn!("Marketplace error HTTP {}: {}", status, message);
        }
        result
    }
}

#[async_trait]
impl MarketplaceApi for HttpMarketplaceClient {
    async fn list_earnings(&self, query: &EarningsQuery) -> Result<EarningsPage, ClientError> {
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(page) = query.page {
            params.push(("page", page.to_string()));
        }
        if let Some(limit) = query.limit {
            params.push(("limit", limit.to_string()));
        }
        if let Some(status) = &query.status {
            params.push(("status", status.clone()));
        }

        let request = self
            .http
            .get(format!("{}/vendors/earnings", self.base_url))
            .query(&params)
            .timeout(self.read_timeout);

        self.execute(request, Some(self.read_timeout)).await
    }

    async fn request_withdrawal(
        &self,
        amount: Decimal,
        idempotency_key: Uuid,
    ) -> Result<WithdrawalReceipt, ClientError> {
        // No transport timeout here; the withdrawal service owns it.
        let request = self
            .http
            .post(format!("{}/vendors/withdraw", self.base_url))
            .header("Idempotency-Key", idempotency_key.to_string())
            .json(&WithdrawPayload {
                amount,
                idempotency_key,
            });

        self.execute(request, None).await
    }

    async fn vendor_profile(&self) -> Result<VendorProfile, ClientError> {
        let request = self
            .http
            .get(format!("{}/vendors/profile", self.base_url))
            .timeout(self.read_timeout);

        self.execute(request, Some(self.read_timeout)).await
    }
}

/// Factory sharing one connection pool across all sessions.
#[derive(Clone)]
pub struct HttpClientFactory {
    http: Client,
    config: AppConfig,
}

impl HttpClientFactory {
    pub fn new(config: &AppConfig) -> Result<Self, ClientError> {
        let http = Client::builder()
            .user_agent(concat!("vendor-earnings-backend/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(config.upstream_timeout)
            .build()
            .map_err(|e| ClientError::Network(e.to_string()))?;

        Ok(Self {
            http,
            config: config.clone(),
        })
    }
}

impl ClientFactory for HttpClientFactory {
    fn for_token(&self, token: &str) -> Arc<dyn MarketplaceApi> {
        Arc::new(HttpMarketplaceClient::new(
            self.http.clone(),
            &self.config,
            Arc::new(StaticToken::new(token)),
        ))
    }
}
