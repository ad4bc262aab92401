//! OAuth token parsed from exchange response headers, and the store that
//! holds the current one.

use anyhow::Result;
use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::header::{HeaderMap, HeaderValue};
use tokio::sync::RwLock;

use crate::api::ScopeValidator;

pub const ACCESS_TOKEN_HEADER: &str = "access-token";
pub const CLIENT_HEADER: &str = "client";
pub const UID_HEADER: &str = "uid";
pub const TOKEN_TYPE_HEADER: &str = "token-type";
pub const EXPIRY_HEADER: &str = "expiry";

const DEFAULT_TOKEN_TYPE: &str = "Bearer";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthToken {
    pub access_token: String,
    pub token_type: String,
    pub client: Option<String>,
    pub uid: Option<String>,
    /// Unix timestamp, seconds.
    pub expiry: Option<u64>,
}

impl OAuthToken {
    /// Token with only an access token, e.g. supplied by the operator.
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: DEFAULT_TOKEN_TYPE.to_string(),
            client: None,
            uid: None,
            expiry: None,
        }
    }

    /// Reads the token from exchange response headers.
    ///
    /// `access-token`, `client` and `uid` are required; without any of them
    /// there is no token.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let access_token = header_str(headers, ACCESS_TOKEN_HEADER)?;
        let client = header_str(headers, CLIENT_HEADER)?;
        let uid = header_str(headers, UID_HEADER)?;

        let token_type = header_str(headers, TOKEN_TYPE_HEADER)
            .unwrap_or_else(|| DEFAULT_TOKEN_TYPE.to_string());
        let expiry = header_str(headers, EXPIRY_HEADER).and_then(|v| v.parse().ok());

        Some(Self {
            access_token,
            token_type,
            client: Some(client),
            uid: Some(uid),
            expiry,
        })
    }

    /// Value of the Authorization header, e.g. `Bearer abc`.
    pub fn authorization_value(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }

    pub fn is_expired(&self, now_unix: u64) -> bool {
        self.expiry.is_some_and(|expiry| expiry <= now_unix)
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Current credential, shared by the executor and the auth manager.
#[derive(Debug, Default)]
pub struct TokenStore {
    token: RwLock<Option<OAuthToken>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: OAuthToken) -> Self {
        Self {
            token: RwLock::new(Some(token)),
        }
    }

    pub async fn set(&self, token: OAuthToken) {
        *self.token.write().await = Some(token);
    }

    pub async fn clear(&self) {
        *self.token.write().await = None;
    }

    pub async fn current(&self) -> Option<OAuthToken> {
        self.token.read().await.clone()
    }

    /// Authorization header for protected requests, marked sensitive.
    pub async fn authorization(&self) -> Option<HeaderValue> {
        let token = self.current().await?;
        match HeaderValue::from_str(&token.authorization_value()) {
            Ok(mut value) => {
                value.set_sensitive(true);
                Some(value)
            }
            Err(e) => {
                warn!("Stored token is not a valid header value: {}", e);
                None
            }
        }
    }
}

/// Minimal recovery: drop the rejected credential so the next login starts
/// clean. Applications with refresh tokens inject their own validator.
#[async_trait]
impl ScopeValidator for TokenStore {
    async fn validate_full_scope(&self) -> Result<()> {
        if self.current().await.is_some() {
            info!("Discarding rejected access token");
        } else {
            debug!("No access token to discard");
        }
        self.clear().await;
        Ok(())
    }
}
