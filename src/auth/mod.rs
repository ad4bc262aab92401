//! Authentication: code exchange and the current credential.

mod manager;
mod token;

pub use manager::{AuthManager, ExchangeParams, ExchangeState};
pub use token::{OAuthToken, TokenStore};
