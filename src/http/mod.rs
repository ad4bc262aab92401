//! HTTP layer: request description, transport and response classification.

mod classify;
mod request;
mod transport;

pub use classify::{ARRAY_WRAPPER_KEY, BodyExpectation, JsonPayload, ResponseOutcome, classify};
pub use request::{CachePolicy, HttpMethod, Params, REQUEST_TIMEOUT, RequestBody, RequestDescriptor};
#[cfg(test)]
pub use transport::MockTransport;
pub use transport::{HttpTransport, RawExchange, Transport, TransportFailure};
