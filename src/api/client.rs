//! Request executor for the backend API.

use std::sync::Arc;

use log::debug;
use reqwest::Url;
use reqwest::header::AUTHORIZATION;

use crate::auth::TokenStore;
use crate::config::ApiConfig;
use crate::error::{API_CLIENT_DOMAIN, ApiError};
use crate::http::{
    BodyExpectation, HttpMethod, JsonPayload, Params, RequestDescriptor, ResponseOutcome,
    Transport, classify,
};

use super::reauth::{ReauthCoordinator, ScopeValidator};
use super::task::ApiTask;

/// Whether an unauthorized outcome goes through full-scope recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Recovery {
    Enabled,
    Disabled,
}

/// Issues API requests and normalizes their outcome.
///
/// Every method returns immediately with an [`ApiTask`]; the request runs on
/// the Tokio runtime. Must be called from within a runtime.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    config: Arc<ApiConfig>,
    token_store: Arc<TokenStore>,
    reauth: ReauthCoordinator,
}

impl ApiClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        config: ApiConfig,
        token_store: Arc<TokenStore>,
        validator: Arc<dyn ScopeValidator>,
    ) -> Self {
        Self {
            transport,
            config: Arc::new(config),
            token_store,
            reauth: ReauthCoordinator::new(validator),
        }
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Sends a command whose response body is not consumed. `url` must be
    /// absolute.
    pub fn request(&self, method: HttpMethod, url: &str, params: Option<Params>) -> ApiTask<()> {
        let url = match Url::parse(url) {
            Ok(url) => url,
            Err(e) => return ApiTask::ready(Err(ApiError::invalid_request(e.to_string()))),
        };

        let client = self.clone();
        ApiTask::spawn(async move {
            let request = client.protected_request(method, url, params).await;
            client
                .execute(request, BodyExpectation::Ignored, Recovery::Enabled)
                .await
                .map(|_| ())
        })
    }

    /// Fetches a JSON payload. `path` is resolved against the base URL.
    pub fn request_json(
        &self,
        method: HttpMethod,
        path: &str,
        params: Option<Params>,
    ) -> ApiTask<JsonPayload> {
        let url = match self.config.resolve(path) {
            Ok(url) => url,
            Err(e) => return ApiTask::ready(Err(ApiError::invalid_request(format!("{:#}", e)))),
        };

        let client = self.clone();
        ApiTask::spawn(async move {
            let request = client.protected_request(method, url, params).await;
            client
                .execute(request, BodyExpectation::JsonObject, Recovery::Enabled)
                .await?
                .ok_or_else(|| ApiError::unknown(API_CLIENT_DOMAIN))
        })
    }

    pub fn get_json(&self, path: &str) -> ApiTask<JsonPayload> {
        self.request_json(HttpMethod::Get, path, None)
    }

    /// Sends a command without any Authorization header. An unauthorized
    /// response is reported as is; no recovery runs.
    pub fn request_without_authorization(
        &self,
        method: HttpMethod,
        url: &str,
        params: Option<Params>,
    ) -> ApiTask<()> {
        let url = match Url::parse(url) {
            Ok(url) => url,
            Err(e) => return ApiTask::ready(Err(ApiError::invalid_request(e.to_string()))),
        };

        let client = self.clone();
        ApiTask::spawn(async move {
            let request = client.base_request(method, url, params).without_authorization();
            client
                .execute(request, BodyExpectation::Ignored, Recovery::Disabled)
                .await
                .map(|_| ())
        })
    }

    fn base_request(&self, method: HttpMethod, url: Url, params: Option<Params>) -> RequestDescriptor {
        let mut request = RequestDescriptor::new(method, url)
            .headers(self.config.additional_headers.clone())
            .json_params(params);
        request.timeout = self.config.timeout;
        request
    }

    async fn protected_request(
        &self,
        method: HttpMethod,
        url: Url,
        params: Option<Params>,
    ) -> RequestDescriptor {
        let mut request = self.base_request(method, url, params);
        if let Some(value) = self.token_store.authorization().await {
            request.headers.insert(AUTHORIZATION, value);
        }
        request
    }

    #[tracing::instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    async fn execute(
        &self,
        request: RequestDescriptor,
        expectation: BodyExpectation,
        recovery: Recovery,
    ) -> Result<Option<JsonPayload>, ApiError> {
        let exchange = self.transport.send(request).await;

        match classify(&exchange, expectation) {
            ResponseOutcome::Success(payload) => Ok(payload),
            ResponseOutcome::Unauthorized => match recovery {
                Recovery::Enabled => Err(self.reauth.recover().await),
                Recovery::Disabled => Err(ApiError::unauthorized()),
            },
            ResponseOutcome::Failure(error) => {
                debug!("Request failed: {}", error);
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockScopeValidator;
    use crate::auth::OAuthToken;
    use crate::dispatch::CallbackContext;
    use crate::error::{ErrorKind, code};
    use crate::http::{HttpTransport, MockTransport, RawExchange, TransportFailure};
    use mockito::Matcher;
    use reqwest::Client;
    use serde_json::json;
    use std::sync::Mutex;

    fn no_recovery() -> MockScopeValidator {
        let mut validator = MockScopeValidator::new();
        validator.expect_validate_full_scope().never();
        validator
    }

    fn client_for(
        server_url: &str,
        store: Arc<TokenStore>,
        validator: MockScopeValidator,
    ) -> ApiClient {
        let config = ApiConfig::new(server_url)
            .unwrap()
            .with_header("X-Api-Key", "key-123")
            .unwrap();
        ApiClient::new(
            Arc::new(HttpTransport::new(Client::new())),
            config,
            store,
            Arc::new(validator),
        )
    }

    fn params(value: serde_json::Value) -> Option<Params> {
        match value {
            serde_json::Value::Object(map) => Some(map),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_get_json_object_with_headers() {
        // --- Setup Mock Server ---
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("GET", "/documents")
            .match_header("x-api-key", "key-123")
            .match_header("authorization", "Bearer tok")
            .match_header("cache-control", "max-stale")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"documents": [{"id": 1}]}"#)
            .create_async()
            .await;

        // --- Execute ---
        let store = Arc::new(TokenStore::with_token(OAuthToken::bearer("tok")));
        let client = client_for(&server.url(), store, no_recovery());
        let payload = client.get_json("documents").await.unwrap();

        // --- Verify ---
        mock.assert_async().await;
        assert_eq!(payload.into_value(), json!({"documents": [{"id": 1}]}));
    }

    #[tokio::test]
    async fn test_post_json_array_is_wrapped() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("POST", "/items")
            .match_body(Matcher::Json(json!({"a": 1})))
            .with_status(201)
            .with_body(r#"[{"id":1}]"#)
            .create_async()
            .await;

        let client = client_for(&server.url(), Arc::new(TokenStore::new()), no_recovery());
        let payload = client
            .request_json(HttpMethod::Post, "items", params(json!({"a": 1})))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(payload.into_value(), json!({"response": [{"id": 1}]}));
    }

    #[tokio::test]
    async fn test_get_json_server_error() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("GET", "/documents")
            .with_status(500)
            .with_body(r#"{"msg":"err"}"#)
            .create_async()
            .await;

        let client = client_for(&server.url(), Arc::new(TokenStore::new()), no_recovery());
        let err = client.get_json("documents").await.unwrap_err();

        mock.assert_async().await;
        assert_eq!(err.kind(), ErrorKind::Http);
        assert_eq!(err.code(), 500);
        assert!(err.response_text().unwrap().contains(r#""msg":"err""#));
    }

    #[tokio::test]
    async fn test_get_json_empty_body_is_failure() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("GET", "/documents")
            .with_status(200)
            .create_async()
            .await;

        let client = client_for(&server.url(), Arc::new(TokenStore::new()), no_recovery());
        let err = client.get_json("documents").await.unwrap_err();

        mock.assert_async().await;
        assert_eq!(err.kind(), ErrorKind::Serialization);
        assert_eq!(err.code(), 200);
    }

    #[test_log::test(tokio::test)]
    async fn test_unauthorized_runs_recovery_then_reports_unknown() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("GET", "/documents")
            .with_status(401)
            .with_body(r#"{"error": "expired"}"#)
            .create_async()
            .await;

        let mut validator = MockScopeValidator::new();
        validator
            .expect_validate_full_scope()
            .times(1)
            .returning(|| Ok(()));

        let client = client_for(&server.url(), Arc::new(TokenStore::new()), validator);
        let err = client.get_json("documents").await.unwrap_err();

        mock.assert_async().await;
        assert_eq!(err.kind(), ErrorKind::Unknown);
        assert_eq!(err.code(), code::UNKNOWN_ERROR);
    }

    #[tokio::test]
    async fn test_plain_request_unauthorized_runs_recovery() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("DELETE", "/documents/1")
            .with_status(401)
            .create_async()
            .await;

        let mut validator = MockScopeValidator::new();
        validator
            .expect_validate_full_scope()
            .times(1)
            .returning(|| Err(anyhow::anyhow!("refresh failed")));

        let client = client_for(&server.url(), Arc::new(TokenStore::new()), validator);
        let err = client
            .request(HttpMethod::Delete, &format!("{}/documents/1", server.url()), None)
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert_eq!(err.kind(), ErrorKind::Unknown);
    }

    #[tokio::test]
    async fn test_plain_request_ignores_body() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("PUT", "/documents/1")
            .match_body(Matcher::Json(json!({"title": "x"})))
            .with_status(204)
            .create_async()
            .await;

        let client = client_for(&server.url(), Arc::new(TokenStore::new()), no_recovery());
        let result = client
            .request(
                HttpMethod::Put,
                &format!("{}/documents/1", server.url()),
                params(json!({"title": "x"})),
            )
            .await;

        mock.assert_async().await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_request_without_authorization_strips_header() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("POST", "/users")
            .match_header("authorization", Matcher::Missing)
            .match_header("x-api-key", "key-123")
            .with_status(401)
            .create_async()
            .await;

        let store = Arc::new(TokenStore::with_token(OAuthToken::bearer("tok")));
        let client = client_for(&server.url(), store, no_recovery());
        let err = client
            .request_without_authorization(
                HttpMethod::Post,
                &format!("{}/users", server.url()),
                params(json!({"email": "a@b.c"})),
            )
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert_eq!(err.code(), code::UNAUTHORIZED_ERROR);
    }

    #[tokio::test]
    async fn test_invalid_url_resolves_with_error() {
        let client = ApiClient::new(
            Arc::new(MockTransport::new()),
            ApiConfig::new("https://api.example.com").unwrap(),
            Arc::new(TokenStore::new()),
            Arc::new(no_recovery()),
        );

        let err = client
            .request(HttpMethod::Get, "not a url", None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), code::INVALID_REQUEST);
    }

    #[tokio::test]
    async fn test_transport_failure_keeps_partial_text() {
        let mut transport = MockTransport::new();
        transport.expect_send().times(1).returning(|_| RawExchange {
            status: Some(200),
            body: b"{\"partial".to_vec(),
            error: Some(TransportFailure::new(code::TIMED_OUT, "timed out")),
            ..Default::default()
        });

        let client = ApiClient::new(
            Arc::new(transport),
            ApiConfig::new("https://api.example.com").unwrap(),
            Arc::new(TokenStore::new()),
            Arc::new(no_recovery()),
        );

        let err = client.get_json("documents").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(err.code(), code::TIMED_OUT);
        assert_eq!(err.description(), Some("timed out"));
        assert_eq!(err.response_text(), Some("{\"partial"));
    }

    #[tokio::test]
    async fn test_recovery_completes_before_callback() {
        let events = Arc::new(Mutex::new(Vec::new()));

        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .times(1)
            .returning(|_| RawExchange::response(401, ""));

        let mut validator = MockScopeValidator::new();
        let recorded = events.clone();
        validator
            .expect_validate_full_scope()
            .times(1)
            .returning(move || {
                recorded.lock().unwrap().push("recovery");
                Ok(())
            });

        let client = ApiClient::new(
            Arc::new(transport),
            ApiConfig::new("https://api.example.com").unwrap(),
            Arc::new(TokenStore::new()),
            Arc::new(validator),
        );

        let (context, callback_loop) = CallbackContext::new();
        let recorded = events.clone();
        client
            .get_json("documents")
            .on_complete(&context, move |result| {
                assert_eq!(result.unwrap_err().kind(), ErrorKind::Unknown);
                recorded.lock().unwrap().push("callback");
            });
        drop(context);

        callback_loop.run().await;
        assert_eq!(*events.lock().unwrap(), vec!["recovery", "callback"]);
    }

    #[tokio::test]
    async fn test_each_request_resolves_exactly_once() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("GET", "/documents")
            .with_status(200)
            .with_body(r#"{"ok": true}"#)
            .expect(5)
            .create_async()
            .await;

        let client = client_for(&server.url(), Arc::new(TokenStore::new()), no_recovery());
        let (context, callback_loop) = CallbackContext::new();
        let calls = Arc::new(Mutex::new(0));

        for _ in 0..5 {
            let calls = calls.clone();
            client.get_json("documents").on_complete(&context, move |result| {
                assert!(result.is_ok());
                *calls.lock().unwrap() += 1;
            });
        }
        drop(context);

        callback_loop.run().await;
        mock.assert_async().await;
        assert_eq!(*calls.lock().unwrap(), 5);
    }

    /// Never answers.
    struct StalledTransport;

    #[async_trait::async_trait]
    impl Transport for StalledTransport {
        async fn send(&self, _request: RequestDescriptor) -> RawExchange {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_cancelled_request_reports_cancelled() {
        let client = ApiClient::new(
            Arc::new(StalledTransport),
            ApiConfig::new("https://api.example.com").unwrap(),
            Arc::new(TokenStore::new()),
            Arc::new(no_recovery()),
        );

        let task = client.get_json("documents");
        task.cancel_handle().cancel();

        let err = task.await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert_eq!(err.code(), code::CANCELLED);
    }
}
