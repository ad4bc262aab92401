//! Recovery path for requests rejected with HTTP 401.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use log::{info, warn};

use crate::error::{API_CLIENT_DOMAIN, ApiError};

/// External credential recovery ("validate full scope").
///
/// Implementations refresh or re-acquire credentials. The API layer awaits
/// the operation once per rejected request.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ScopeValidator: Send + Sync {
    async fn validate_full_scope(&self) -> Result<()>;
}

#[derive(Clone)]
pub struct ReauthCoordinator {
    validator: Arc<dyn ScopeValidator>,
}

impl ReauthCoordinator {
    pub fn new(validator: Arc<dyn ScopeValidator>) -> Self {
        Self { validator }
    }

    /// Runs recovery and returns the error the original caller sees.
    ///
    /// The caller always gets an unknown error: the original request is not
    /// retried and the recovery outcome is not forwarded.
    #[tracing::instrument(skip(self))]
    pub async fn recover(&self) -> ApiError {
        info!("Request rejected as unauthorized, validating full scope...");

        match self.validator.validate_full_scope().await {
            Ok(()) => info!("Full scope validation finished"),
            Err(e) => warn!("Full scope validation failed: {:#}", e),
        }

        ApiError::unknown(API_CLIENT_DOMAIN)
    }
}
