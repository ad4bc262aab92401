//! HTTP session boundary: issue a request, get back the raw exchange.

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::header::{CACHE_CONTROL, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, Response};

use crate::error::code;

use super::request::{RequestBody, RequestDescriptor};

/// Why no complete response was received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportFailure {
    pub code: i64,
    pub message: String,
}

impl TransportFailure {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn from_reqwest(error: &reqwest::Error) -> Self {
        let code = if error.is_timeout() {
            code::TIMED_OUT
        } else if error.is_connect() {
            code::CANNOT_CONNECT
        } else {
            code::TRANSPORT_FAILED
        };
        Self::new(code, error.to_string())
    }
}

/// Everything the transport observed for one request.
///
/// `status` is absent when no response head arrived. `body` holds whatever
/// bytes were read, which may be a partial body when `error` is set.
#[derive(Debug, Clone, Default)]
pub struct RawExchange {
    pub status: Option<u16>,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    pub error: Option<TransportFailure>,
}

impl RawExchange {
    pub fn response(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: Some(status),
            body: body.into(),
            ..Default::default()
        }
    }

    pub fn failed(error: TransportFailure) -> Self {
        Self {
            error: Some(error),
            ..Default::default()
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends the request. Never fails: transport problems are reported
    /// inside the returned exchange.
    async fn send(&self, request: RequestDescriptor) -> RawExchange;
}

/// [`Transport`] backed by a reqwest [`Client`].
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn build(&self, request: RequestDescriptor) -> Result<reqwest::RequestBuilder, TransportFailure> {
        let mut builder = self
            .client
            .request(request.method.into(), request.url)
            .headers(request.headers)
            .header(
                CACHE_CONTROL,
                HeaderValue::from_static(request.cache_policy.header_value()),
            )
            .timeout(request.timeout);

        match request.body {
            Some(RequestBody::Json(value)) => {
                let bytes = serde_json::to_vec_pretty(&value)
                    .map_err(|e| TransportFailure::new(code::TRANSPORT_FAILED, e.to_string()))?;
                builder = builder
                    .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
                    .body(bytes);
            }
            Some(RequestBody::Form(pairs)) => {
                builder = builder.form(&pairs);
            }
            None => {}
        }

        Ok(builder)
    }

    /// Reads the body chunk by chunk so a failure mid-stream keeps what
    /// arrived so far.
    async fn read_body(mut response: Response) -> (Vec<u8>, Option<TransportFailure>) {
        let mut body = Vec::new();
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => body.extend_from_slice(&chunk),
                Ok(None) => return (body, None),
                Err(e) => {
                    warn!("Response body interrupted after {} bytes: {}", body.len(), e);
                    return (body, Some(TransportFailure::from_reqwest(&e)));
                }
            }
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[tracing::instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    async fn send(&self, request: RequestDescriptor) -> RawExchange {
        debug!("{} {}...", request.method, request.url);

        let builder = match self.build(request) {
            Ok(builder) => builder,
            Err(failure) => return RawExchange::failed(failure),
        };

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                debug!("Request failed before a response arrived: {}", e);
                return RawExchange::failed(TransportFailure::from_reqwest(&e));
            }
        };

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let (body, error) = Self::read_body(response).await;

        debug!("Received HTTP {} with {} body bytes", status, body.len());

        RawExchange {
            status: Some(status),
            headers,
            body,
            error,
        }
    }
}
