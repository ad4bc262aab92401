//! Uniform error value handed to every caller of the API layer.

use std::fmt;

/// Error domain for failures raised by the request executor.
pub const API_CLIENT_DOMAIN: &str = "liqapi.api-client";

/// Error domain for failures raised by the OAuth code exchange.
pub const AUTH_MANAGER_DOMAIN: &str = "liqapi.auth-manager";

/// Error domain for failures that happened before a response was received.
pub const TRANSPORT_DOMAIN: &str = "liqapi.transport";

/// Numeric codes shared by every domain.
pub mod code {
    /// The situation could not be classified.
    pub const UNKNOWN_ERROR: i64 = 1000;
    /// The server rejected the credential (HTTP 401).
    pub const UNAUTHORIZED_ERROR: i64 = 1001;
    /// The request could not be built (bad URL, unencodable body).
    pub const INVALID_REQUEST: i64 = 1002;
    /// The task was cancelled before it completed.
    pub const CANCELLED: i64 = -999;
    /// Transport: generic failure.
    pub const TRANSPORT_FAILED: i64 = -1;
    /// Transport: the request timed out.
    pub const TIMED_OUT: i64 = -1001;
    /// Transport: the host could not be reached.
    pub const CANNOT_CONNECT: i64 = -1004;
}

/// Failure classes a caller may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Connectivity loss, timeout, DNS failure.
    Transport,
    /// HTTP 401. Only surfaced by requests that skip recovery.
    Unauthorized,
    /// Empty or unparsable success body.
    Serialization,
    /// Any other 4xx/5xx response.
    Http,
    /// Not classifiable, including the result of a recovered 401.
    Unknown,
    /// Code exchange failed.
    AuthExchange,
    /// The task was cancelled by its owner.
    Cancelled,
}

/// A normalized API failure: domain, numeric code and optional raw text.
///
/// Transport failures also carry the transport's own description of what
/// went wrong, separate from any partial response text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    kind: ErrorKind,
    domain: &'static str,
    code: i64,
    description: Option<String>,
    response_text: Option<String>,
}

impl ApiError {
    /// Builds an error from a domain/code pair with no body.
    pub fn new(kind: ErrorKind, domain: &'static str, code: i64) -> Self {
        Self {
            kind,
            domain,
            code,
            description: None,
            response_text: None,
        }
    }

    /// Builds a transport failure from the transport's description.
    /// `partial_body` is kept as plain text.
    pub fn transport(
        code: i64,
        description: impl Into<String>,
        partial_body: Option<String>,
    ) -> Self {
        let mut err = Self::new(ErrorKind::Transport, TRANSPORT_DOMAIN, code)
            .with_response_text(partial_body);
        err.description = Some(description.into());
        err
    }

    /// Builds an HTTP failure from a status code and the parsed body, if any.
    pub fn http(status: u16, body: Option<&serde_json::Value>) -> Self {
        let text = body.map(|value| value.to_string());
        Self::new(ErrorKind::Http, API_CLIENT_DOMAIN, i64::from(status)).with_response_text(text)
    }

    /// Unclassifiable failure in `domain`.
    pub fn unknown(domain: &'static str) -> Self {
        Self::new(ErrorKind::Unknown, domain, code::UNKNOWN_ERROR)
    }

    /// HTTP 401 reported without recovery.
    pub fn unauthorized() -> Self {
        Self::new(
            ErrorKind::Unauthorized,
            API_CLIENT_DOMAIN,
            code::UNAUTHORIZED_ERROR,
        )
    }

    /// Success status whose body is empty or not a JSON object or array.
    pub fn serialization(status: u16) -> Self {
        Self::new(ErrorKind::Serialization, API_CLIENT_DOMAIN, i64::from(status))
    }

    /// The request could not be built; `detail` says why.
    pub fn invalid_request(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, API_CLIENT_DOMAIN, code::INVALID_REQUEST)
            .with_response_text(Some(detail.into()))
    }

    /// The task was aborted before it produced a result.
    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, API_CLIENT_DOMAIN, code::CANCELLED)
    }

    /// Code exchange failure. Detail is never attached.
    pub fn auth_exchange() -> Self {
        Self::new(
            ErrorKind::AuthExchange,
            AUTH_MANAGER_DOMAIN,
            code::UNKNOWN_ERROR,
        )
    }

    /// Replaces the raw response text.
    pub fn with_response_text(mut self, text: Option<String>) -> Self {
        self.response_text = text;
        self
    }

    /// Failure class.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Error domain, one of the `*_DOMAIN` constants.
    pub fn domain(&self) -> &'static str {
        self.domain
    }

    /// Numeric code: an HTTP status or one of the [`code`] constants.
    pub fn code(&self) -> i64 {
        self.code
    }

    /// Transport description, e.g. `"dns error: no such host"`.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Raw response text, if any was received.
    pub fn response_text(&self) -> Option<&str> {
        self.response_text.as_deref()
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error {}", self.domain, self.code)?;
        if let Some(description) = &self.description {
            write!(f, " ({})", description)?;
        }
        if let Some(text) = &self.response_text {
            write!(f, ": {}", text)?;
        }
        Ok(())
    }
}

impl std::error::Error for ApiError {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_http_error_serializes_body() {
        let body = json!({"msg": "err"});
        let err = ApiError::http(500, Some(&body));

        assert_eq!(err.kind(), ErrorKind::Http);
        assert_eq!(err.domain(), API_CLIENT_DOMAIN);
        assert_eq!(err.code(), 500);
        assert!(err.response_text().unwrap().contains(r#""msg":"err""#));
    }

    #[test]
    fn test_http_error_without_body() {
        let err = ApiError::http(404, None);
        assert_eq!(err.code(), 404);
        assert_eq!(err.response_text(), None);
    }

    #[test]
    fn test_transport_error_keeps_plain_text() {
        let err = ApiError::transport(
            code::TIMED_OUT,
            "operation timed out",
            Some("{not json".to_string()),
        );
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(err.domain(), TRANSPORT_DOMAIN);
        assert_eq!(err.description(), Some("operation timed out"));
        assert_eq!(err.response_text(), Some("{not json"));
    }

    #[test]
    fn test_transport_display_includes_description() {
        let err = ApiError::transport(code::TRANSPORT_FAILED, "dns error: no such host", None);
        assert_eq!(
            err.to_string(),
            "liqapi.transport error -1 (dns error: no such host)"
        );

        let err = ApiError::transport(code::TIMED_OUT, "timed out", Some("{\"id\"".to_string()));
        assert_eq!(
            err.to_string(),
            r#"liqapi.transport error -1001 (timed out): {"id""#
        );
    }

    #[test]
    fn test_auth_exchange_error_is_opaque() {
        let err = ApiError::auth_exchange();
        assert_eq!(err.domain(), AUTH_MANAGER_DOMAIN);
        assert_eq!(err.code(), code::UNKNOWN_ERROR);
        assert_eq!(err.response_text(), None);
    }

    #[test]
    fn test_display() {
        let err = ApiError::unknown(API_CLIENT_DOMAIN);
        assert_eq!(err.to_string(), "liqapi.api-client error 1000");

        let err = ApiError::http(400, Some(&json!({"a": 1})));
        assert_eq!(err.to_string(), r#"liqapi.api-client error 400: {"a":1}"#);
    }
}
