//! Networking layer for the liq backend: authenticated JSON requests with a
//! single normalized error type, and OAuth code exchange.

pub mod api;
pub mod auth;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod http;

pub use api::{ApiClient, ApiTask, CancelHandle, ScopeValidator};
pub use auth::{AuthManager, ExchangeParams, OAuthToken, TokenStore};
pub use config::ApiConfig;
pub use dispatch::CallbackContext;
pub use error::{ApiError, ErrorKind};
pub use http::{HttpMethod, HttpTransport, JsonPayload};
