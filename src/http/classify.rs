//! Turns a raw exchange into exactly one [`ResponseOutcome`].

use serde_json::{Map, Value};

use crate::error::{API_CLIENT_DOMAIN, ApiError};

use super::transport::RawExchange;

/// Key under which array bodies are wrapped.
pub const ARRAY_WRAPPER_KEY: &str = "response";

/// Success payload of a JSON request.
///
/// Callers historically always received an object. Array bodies are
/// therefore presented as `{"response": [...]}` by [`JsonPayload::into_object`];
/// keep that shape when consuming this type generically.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonPayload {
    Object(Map<String, Value>),
    ArrayWrapped(Vec<Value>),
}

impl JsonPayload {
    /// Returns the object-shaped payload, wrapping arrays under `"response"`.
    pub fn into_object(self) -> Map<String, Value> {
        match self {
            JsonPayload::Object(map) => map,
            JsonPayload::ArrayWrapped(items) => {
                let mut map = Map::new();
                map.insert(ARRAY_WRAPPER_KEY.to_string(), Value::Array(items));
                map
            }
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.into_object())
    }
}

/// What the caller expects from a 2xx body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyExpectation {
    /// The body is not consumed; any 2xx is a success.
    Ignored,
    /// The body must be a non-empty JSON object or array.
    JsonObject,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseOutcome {
    Success(Option<JsonPayload>),
    Unauthorized,
    Failure(ApiError),
}

/// Classifies a completed exchange.
pub fn classify(exchange: &RawExchange, expectation: BodyExpectation) -> ResponseOutcome {
    if let Some(failure) = &exchange.error {
        let partial = if exchange.body.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(&exchange.body).into_owned())
        };
        return ResponseOutcome::Failure(ApiError::transport(
            failure.code,
            failure.message.clone(),
            partial,
        ));
    }

    let status = match exchange.status {
        Some(status) => status,
        None => return ResponseOutcome::Failure(ApiError::unknown(API_CLIENT_DOMAIN)),
    };

    if status == 401 {
        return ResponseOutcome::Unauthorized;
    }

    // Failure starts at 400. reqwest follows redirects, so a 3xx seen here
    // is typically 304: plain requests accept it, JSON requests then fail on
    // its empty body.
    if !(200..400).contains(&status) {
        let body = serde_json::from_slice::<Value>(&exchange.body).ok();
        return ResponseOutcome::Failure(ApiError::http(status, body.as_ref()));
    }

    match expectation {
        BodyExpectation::Ignored => ResponseOutcome::Success(None),
        BodyExpectation::JsonObject => match parse_payload(&exchange.body) {
            Some(payload) => ResponseOutcome::Success(Some(payload)),
            None if exchange.body.is_empty() => {
                ResponseOutcome::Failure(ApiError::serialization(status))
            }
            None => ResponseOutcome::Failure(
                ApiError::serialization(status)
                    .with_response_text(Some(String::from_utf8_lossy(&exchange.body).into_owned())),
            ),
        },
    }
}

/// Object first, then array. Anything else (including empty) is `None`.
fn parse_payload(body: &[u8]) -> Option<JsonPayload> {
    if body.is_empty() {
        return None;
    }
    if let Ok(map) = serde_json::from_slice::<Map<String, Value>>(body) {
        return Some(JsonPayload::Object(map));
    }
    serde_json::from_slice::<Vec<Value>>(body)
        .ok()
        .map(JsonPayload::ArrayWrapped)
}
