//! One-shot OAuth code exchange.

use std::sync::Arc;

use log::{debug, info, warn};
use reqwest::Url;
use tokio::sync::watch;

use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::http::{CachePolicy, HttpMethod, RequestDescriptor, Transport};

use super::token::{OAuthToken, TokenStore};

/// Form parameters of a code exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeParams {
    pub code: String,
    pub redirect_uri: Option<String>,
    pub client_id: Option<String>,
    pub extra: Vec<(String, String)>,
}

impl ExchangeParams {
    pub fn authorization_code(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            redirect_uri: None,
            client_id: None,
            extra: Vec::new(),
        }
    }

    pub fn redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(redirect_uri.into());
        self
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.push((name.into(), value.into()));
        self
    }

    fn into_pairs(self) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("grant_type".to_string(), "authorization_code".to_string()),
            ("code".to_string(), self.code),
        ];
        if let Some(redirect_uri) = self.redirect_uri {
            pairs.push(("redirect_uri".to_string(), redirect_uri));
        }
        if let Some(client_id) = self.client_id {
            pairs.push(("client_id".to_string(), client_id));
        }
        pairs.extend(self.extra);
        pairs
    }
}

/// Progress of the latest exchange attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    Idle,
    Requested,
    TokenObtained,
    Failed,
}

/// Holds an attempt in `Requested` until it is finished. An attempt dropped
/// midway (timeout, `select!`, aborted task) is published as `Failed`.
struct AttemptGuard<'a> {
    state: &'a watch::Sender<ExchangeState>,
    finished: bool,
}

impl AttemptGuard<'_> {
    fn finish(mut self, state: ExchangeState) {
        self.state.send_replace(state);
        self.finished = true;
    }
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            warn!("Code exchange abandoned before completion");
            self.state.send_replace(ExchangeState::Failed);
        }
    }
}

/// Exchanges authorization codes for tokens and stores the result.
pub struct AuthManager {
    transport: Arc<dyn Transport>,
    auth_url: Url,
    token_store: Arc<TokenStore>,
    state: watch::Sender<ExchangeState>,
}

impl AuthManager {
    pub fn new(transport: Arc<dyn Transport>, auth_url: Url, token_store: Arc<TokenStore>) -> Self {
        let (state, _) = watch::channel(ExchangeState::Idle);
        Self {
            transport,
            auth_url,
            token_store,
            state,
        }
    }

    pub fn from_config(
        transport: Arc<dyn Transport>,
        config: &ApiConfig,
        token_store: Arc<TokenStore>,
    ) -> Self {
        Self::new(transport, config.auth_url.clone(), token_store)
    }

    pub fn state(&self) -> ExchangeState {
        *self.state.borrow()
    }

    /// Observe state transitions, e.g. to drive a progress indicator.
    pub fn subscribe(&self) -> watch::Receiver<ExchangeState> {
        self.state.subscribe()
    }

    /// Performs a single exchange attempt. No retries.
    ///
    /// Every failure is reported as the same opaque auth error. A second
    /// call while an attempt is in flight fails without sending anything.
    #[tracing::instrument(skip(self, params))]
    pub async fn authenticate_with_code(
        &self,
        params: ExchangeParams,
    ) -> Result<OAuthToken, ApiError> {
        let started = self.state.send_if_modified(|state| {
            if *state == ExchangeState::Requested {
                false
            } else {
                *state = ExchangeState::Requested;
                true
            }
        });
        if !started {
            warn!("Code exchange already in progress");
            return Err(ApiError::auth_exchange());
        }
        let guard = AttemptGuard {
            state: &self.state,
            finished: false,
        };

        let result = self.exchange(params).await;

        guard.finish(match &result {
            Ok(_) => ExchangeState::TokenObtained,
            Err(_) => ExchangeState::Failed,
        });

        result
    }

    async fn exchange(&self, params: ExchangeParams) -> Result<OAuthToken, ApiError> {
        info!("Exchanging authorization code at {}...", self.auth_url);

        let request = RequestDescriptor::new(HttpMethod::Post, self.auth_url.clone())
            .form(params.into_pairs())
            .cache_policy(CachePolicy::ReloadIgnoringCache);

        let exchange = self.transport.send(request).await;

        if let Some(error) = &exchange.error {
            debug!("Code exchange transport failure: {}", error.message);
            return Err(ApiError::auth_exchange());
        }

        match exchange.status {
            Some(status) if (200..300).contains(&status) => {}
            status => {
                debug!("Code exchange rejected with status {:?}", status);
                return Err(ApiError::auth_exchange());
            }
        }

        let Some(token) = OAuthToken::from_headers(&exchange.headers) else {
            warn!("Code exchange response carried no token headers");
            return Err(ApiError::auth_exchange());
        };

        self.token_store.set(token.clone()).await;
        info!("Code exchange succeeded");
        Ok(token)
    }
}
