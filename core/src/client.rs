//! Request builder, response parser, and the async call operations.
//!
//! # Design
//! `ApiClient` keeps the build/parse split: `build_call` and
//! `build_binary_call` produce an `HttpRequest`, `parse_response` consumes an
//! `HttpResponse`, and both halves are pure. `call` and `call_with_binary`
//! glue them together around one `Transport::execute`, logging the request
//! before it is sent and the outcome after.
//!
//! The client holds no per-call state. Identity is asked of the injected
//! provider on every build.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::config::{ClientConfig, OriginPolicy};
use crate::error::ApiError;
use crate::http::{BinaryPayload, HttpMethod, HttpRequest, HttpResponse, RequestBody};
use crate::identity::{resolve_identity, IdentityProvider};
use crate::transport::{ReqwestTransport, Transport};

/// JSON object sent as a request body.
pub type JsonPayload = serde_json::Map<String, Value>;

pub const USER_ID_HEADER: &str = "X-User-ID";
pub const CONTENT_TYPE_HEADER: &str = "Content-Type";
pub const ORIGIN_HEADER: &str = "Origin";
const JSON_CONTENT_TYPE: &str = "application/json";

/// Client for the backend API.
#[derive(Clone)]
pub struct ApiClient<T = ReqwestTransport> {
    base_url: String,
    policy: OriginPolicy,
    pub(crate) solve_text_field: String,
    identity: Arc<dyn IdentityProvider>,
    transport: T,
}

impl<T> fmt::Debug for ApiClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("policy", &self.policy)
            .field("solve_text_field", &self.solve_text_field)
            .finish_non_exhaustive()
    }
}

impl ApiClient<ReqwestTransport> {
    /// Client over a reqwest transport configured from `config.origin_policy`.
    pub fn new(
        config: ClientConfig,
        identity: impl IdentityProvider + 'static,
    ) -> Result<Self, ApiError> {
        let transport = ReqwestTransport::new(&config.origin_policy)?;
        Ok(Self::with_transport(config, identity, transport))
    }
}

impl<T: Transport> ApiClient<T> {
    pub fn with_transport(
        config: ClientConfig,
        identity: impl IdentityProvider + 'static,
        transport: T,
    ) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            policy: config.origin_policy,
            solve_text_field: config.solve_text_field,
            identity: Arc::new(identity),
            transport,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Identity the next call would send.
    pub fn current_identity(&self) -> String {
        resolve_identity(self.identity.as_ref())
    }

    /// Build a JSON request. `GET` never carries a body, and neither does any
    /// method when `payload` is empty.
    pub fn build_call(
        &self,
        endpoint: &str,
        payload: &JsonPayload,
        method: HttpMethod,
    ) -> Result<HttpRequest, ApiError> {
        let identity = self.current_identity();
        self.build_call_as(&identity, endpoint, payload, method)
    }

    pub(crate) fn build_call_as(
        &self,
        identity: &str,
        endpoint: &str,
        payload: &JsonPayload,
        method: HttpMethod,
    ) -> Result<HttpRequest, ApiError> {
        let mut headers = vec![(CONTENT_TYPE_HEADER.to_string(), JSON_CONTENT_TYPE.to_string())];
        headers.extend(self.common_headers(identity));

        let body = if method != HttpMethod::Get && !payload.is_empty() {
            let json = serde_json::to_string(payload)
                .map_err(|e| ApiError::Serialization(e.to_string()))?;
            Some(RequestBody::Json(json))
        } else {
            None
        };

        Ok(HttpRequest {
            method,
            url: format!("{}{endpoint}", self.base_url),
            headers,
            body,
        })
    }

    /// Build a multipart `POST` carrying `payload` under `field_name`.
    /// `Content-Type` is left for the transport to fill in with the boundary.
    pub fn build_binary_call(
        &self,
        endpoint: &str,
        field_name: &str,
        payload: BinaryPayload,
    ) -> HttpRequest {
        let identity = self.current_identity();
        HttpRequest {
            method: HttpMethod::Post,
            url: format!("{}{endpoint}", self.base_url),
            headers: self.common_headers(&identity),
            body: Some(RequestBody::Multipart(vec![payload.into_part(field_name)])),
        }
    }

    /// Map a response to its JSON body, or to the error it represents.
    pub fn parse_response(&self, response: HttpResponse) -> Result<Value, ApiError> {
        check_status(&response)?;
        serde_json::from_str(&response.body).map_err(|e| ApiError::Parse(e.to_string()))
    }

    /// Issue a JSON call and return the parsed response body.
    pub async fn call(
        &self,
        endpoint: &str,
        payload: &JsonPayload,
        method: HttpMethod,
    ) -> Result<Value, ApiError> {
        let identity = self.current_identity();
        self.call_as(&identity, endpoint, payload, method).await
    }

    pub(crate) async fn call_as(
        &self,
        identity: &str,
        endpoint: &str,
        payload: &JsonPayload,
        method: HttpMethod,
    ) -> Result<Value, ApiError> {
        tracing::info!(
            %method,
            endpoint,
            payload = %serde_json::Value::Object(payload.clone()),
            "API request"
        );
        let result = match self.build_call_as(identity, endpoint, payload, method) {
            Ok(request) => self.round_trip(request).await,
            Err(e) => Err(e),
        };
        log_outcome(endpoint, &result);
        result
    }

    /// Submit one binary attachment as multipart form data.
    pub async fn call_with_binary(
        &self,
        endpoint: &str,
        field_name: &str,
        payload: BinaryPayload,
    ) -> Result<Value, ApiError> {
        tracing::info!(
            method = %HttpMethod::Post,
            endpoint,
            field = field_name,
            bytes = payload.data.len(),
            "API multipart request"
        );
        let request = self.build_binary_call(endpoint, field_name, payload);
        let result = self.round_trip(request).await;
        log_outcome(endpoint, &result);
        result
    }

    async fn round_trip(&self, request: HttpRequest) -> Result<Value, ApiError> {
        let response = self.transport.execute(request).await?;
        tracing::debug!(status = response.status, "API response received");
        self.parse_response(response)
    }

    fn common_headers(&self, identity: &str) -> Vec<(String, String)> {
        let mut headers = vec![(USER_ID_HEADER.to_string(), identity.to_string())];
        if self.policy.cross_origin {
            if let Some(origin) = &self.policy.origin {
                headers.push((ORIGIN_HEADER.to_string(), origin.clone()));
            }
        }
        headers
    }
}

/// Any status outside 200-299 is a failure carrying that status.
fn check_status(response: &HttpResponse) -> Result<(), ApiError> {
    if response.is_success() {
        return Ok(());
    }
    Err(ApiError::HttpStatus {
        status: response.status,
        status_text: response.status_text.clone(),
    })
}

fn log_outcome(endpoint: &str, result: &Result<Value, ApiError>) {
    match result {
        Ok(value) => tracing::info!(endpoint, response = %value, "API response"),
        Err(e) => tracing::error!(endpoint, error = %e, "API error"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{NoIdentity, StaticIdentity};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    const BASE_URL: &str = "http://localhost:8000/api";

    /// Records requests and answers each with a canned response.
    #[derive(Clone, Default)]
    struct FakeTransport {
        seen: Arc<Mutex<Vec<HttpRequest>>>,
        reply: Arc<Mutex<Option<Result<HttpResponse, String>>>>,
    }

    impl FakeTransport {
        fn replying(status: u16, status_text: &str, body: &str) -> Self {
            let fake = Self::default();
            *fake.reply.lock().unwrap() = Some(Ok(HttpResponse {
                status,
                status_text: status_text.to_string(),
                headers: Vec::new(),
                body: body.to_string(),
            }));
            fake
        }

        fn failing(msg: &str) -> Self {
            let fake = Self::default();
            *fake.reply.lock().unwrap() = Some(Err(msg.to_string()));
            fake
        }

        fn last(&self) -> HttpRequest {
            self.seen.lock().unwrap().last().cloned().expect("no request sent")
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
            self.seen.lock().unwrap().push(request);
            match self.reply.lock().unwrap().clone().expect("no reply configured") {
                Ok(resp) => Ok(resp),
                Err(msg) => Err(ApiError::Transport(msg)),
            }
        }
    }

    fn client_with(transport: FakeTransport) -> ApiClient<FakeTransport> {
        ApiClient::with_transport(ClientConfig::new(BASE_URL), StaticIdentity::new("user_8"), transport)
    }

    fn client() -> ApiClient<FakeTransport> {
        client_with(FakeTransport::default())
    }

    fn payload(value: Value) -> JsonPayload {
        value.as_object().cloned().unwrap()
    }

    fn response(status: u16, status_text: &str, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            status_text: status_text.to_string(),
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    #[test]
    fn build_post_serializes_payload() {
        let req = client()
            .build_call("/solve/", &payload(json!({"text": "What is 2+2?"})), HttpMethod::Post)
            .unwrap();
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.url, "http://localhost:8000/api/solve/");
        assert_eq!(req.header("content-type"), Some("application/json"));
        assert_eq!(req.header("x-user-id"), Some("user_8"));
        let body: Value = serde_json::from_str(req.body.as_ref().unwrap().as_json().unwrap()).unwrap();
        assert_eq!(body, json!({"text": "What is 2+2?"}));
    }

    #[test]
    fn get_never_carries_body() {
        let req = client()
            .build_call("/subscriptions/status/", &payload(json!({"ignored": true})), HttpMethod::Get)
            .unwrap();
        assert!(req.body.is_none());
    }

    #[test]
    fn empty_payload_has_no_body_for_any_method() {
        let c = client();
        for method in [HttpMethod::Post, HttpMethod::Put, HttpMethod::Delete] {
            let req = c.build_call("/usage/record/", &JsonPayload::new(), method).unwrap();
            assert!(req.body.is_none(), "{method} should not carry a body");
        }
    }

    #[test]
    fn endpoint_is_concatenated_verbatim() {
        let req = client()
            .build_call("solve/?q=a b", &JsonPayload::new(), HttpMethod::Get)
            .unwrap();
        assert_eq!(req.url, "http://localhost:8000/apisolve/?q=a b");
    }

    #[test]
    fn trailing_slash_is_stripped() {
        let c = ApiClient::with_transport(
            ClientConfig::new("http://localhost:8000/api/"),
            NoIdentity,
            FakeTransport::default(),
        );
        assert_eq!(c.base_url(), BASE_URL);
    }

    #[test]
    fn whitespace_identity_never_reaches_header() {
        let c = ApiClient::with_transport(
            ClientConfig::new(BASE_URL),
            StaticIdentity::new("   "),
            FakeTransport::default(),
        );
        let req = c.build_call("/health/", &JsonPayload::new(), HttpMethod::Get).unwrap();
        let id = req.header("x-user-id").unwrap();
        assert_eq!(id, id.trim());
        assert!(id.starts_with("user_") && id.len() > "user_".len());
    }

    #[test]
    fn fallback_identity_is_sent_when_none_stored() {
        let c = ApiClient::with_transport(ClientConfig::new(BASE_URL), NoIdentity, FakeTransport::default());
        let req = c.build_call("/health/", &JsonPayload::new(), HttpMethod::Get).unwrap();
        let id = req.header("x-user-id").unwrap();
        assert!(id.starts_with("user_") && id.len() > "user_".len());
    }

    #[test]
    fn origin_header_follows_policy() {
        let config = ClientConfig::new(BASE_URL).with_origin("http://localhost:8081");
        let c = ApiClient::with_transport(config.clone(), NoIdentity, FakeTransport::default());
        let req = c.build_call("/health/", &JsonPayload::new(), HttpMethod::Get).unwrap();
        assert_eq!(req.header("origin"), Some("http://localhost:8081"));

        let mut same_origin = config;
        same_origin.origin_policy.cross_origin = false;
        let c = ApiClient::with_transport(same_origin, NoIdentity, FakeTransport::default());
        let req = c.build_call("/health/", &JsonPayload::new(), HttpMethod::Get).unwrap();
        assert!(req.header("origin").is_none());
    }

    #[test]
    fn binary_call_is_multipart_without_content_type() {
        let image = BinaryPayload::new(vec![0x89, b'P', b'N', b'G'])
            .file_name("q.png")
            .content_type("image/png");
        let req = client().build_binary_call("/solve/", "image", image);
        assert_eq!(req.method, HttpMethod::Post);
        assert!(req.header("content-type").is_none());
        assert_eq!(req.header("x-user-id"), Some("user_8"));
        match req.body {
            Some(RequestBody::Multipart(parts)) => {
                assert_eq!(parts.len(), 1);
                assert_eq!(parts[0].name, "image");
                assert_eq!(parts[0].file_name.as_deref(), Some("q.png"));
                assert_eq!(parts[0].data, vec![0x89, b'P', b'N', b'G']);
            }
            other => panic!("expected multipart body, got {other:?}"),
        }
    }

    #[test]
    fn parse_failing_status_carries_code() {
        let c = client();
        for (status, text) in [(404, "Not Found"), (500, "Internal Server Error")] {
            let err = c.parse_response(response(status, text, r#"{"ok":true}"#)).unwrap_err();
            match err {
                ApiError::HttpStatus { status: got, status_text } => {
                    assert_eq!(got, status);
                    assert_eq!(status_text, text);
                }
                other => panic!("expected HttpStatus, got {other:?}"),
            }
        }
    }

    #[test]
    fn parse_malformed_body_is_parse_error() {
        let err = client()
            .parse_response(response(200, "OK", "<html>Service Unavailable</html>"))
            .unwrap_err();
        assert!(matches!(err, ApiError::Parse(_)));
    }

    #[test]
    fn parse_empty_success_body_is_parse_error() {
        let err = client().parse_response(response(204, "No Content", "")).unwrap_err();
        assert!(matches!(err, ApiError::Parse(_)));
    }

    #[tokio::test]
    async fn call_returns_parsed_body() {
        let fake = FakeTransport::replying(200, "OK", r#"{"answer": "4"}"#);
        let c = client_with(fake.clone());
        let result = c
            .call("/solve/", &payload(json!({"text": "What is 2+2?"})), HttpMethod::Post)
            .await
            .unwrap();
        assert_eq!(result, json!({"answer": "4"}));
        assert_eq!(fake.last().url, "http://localhost:8000/api/solve/");
    }

    #[tokio::test]
    async fn call_get_sends_no_body() {
        let fake = FakeTransport::replying(200, "OK", r#"{"plan": "FREE", "is_active": false}"#);
        let c = client_with(fake.clone());
        let result = c
            .call("/subscriptions/status/", &JsonPayload::new(), HttpMethod::Get)
            .await
            .unwrap();
        assert_eq!(result["plan"], "FREE");
        let sent = fake.last();
        assert_eq!(sent.method, HttpMethod::Get);
        assert!(sent.body.is_none());
    }

    #[tokio::test]
    async fn call_propagates_transport_error() {
        let c = client_with(FakeTransport::failing("connection refused"));
        let err = c.call("/health/", &JsonPayload::new(), HttpMethod::Get).await.unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn call_surfaces_server_error() {
        let c = client_with(FakeTransport::replying(502, "Bad Gateway", "<html></html>"));
        let err = c
            .call("/solve/", &payload(json!({"text": "x"})), HttpMethod::Post)
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(502));
    }

    #[tokio::test]
    async fn call_with_binary_uses_same_normalization() {
        let fake = FakeTransport::replying(403, "Forbidden", r#"{"success": false}"#);
        let c = client_with(fake.clone());
        let err = c
            .call_with_binary("/solve/", "image", BinaryPayload::new(vec![1, 2, 3]))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(403));
        assert!(matches!(fake.last().body, Some(RequestBody::Multipart(_))));
    }
}
