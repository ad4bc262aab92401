//! Request executor, per-request tasks and the unauthorized recovery path.

mod client;
mod reauth;
mod task;

pub use client::ApiClient;
#[cfg(test)]
pub use reauth::MockScopeValidator;
pub use reauth::{ReauthCoordinator, ScopeValidator};
pub use task::{ApiTask, CancelHandle};
