//! Network execution of `HttpRequest` values.
//!
//! # Design
//! `Transport` is the only place where I/O happens. A failing HTTP status is
//! returned as an ordinary `HttpResponse`; status interpretation belongs to
//! `ApiClient::parse_response`. Only failures that leave no response at all
//! become `ApiError::Transport`.
//!
//! No timeout is configured: a call that the network never answers never
//! resolves.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{Method, StatusCode};

use crate::config::OriginPolicy;
use crate::error::ApiError;
use crate::http::{FormPart, HttpMethod, HttpRequest, HttpResponse, RequestBody};

/// Executes one request and returns whatever response the server produced.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError>;
}

/// `Transport` backed by a pooled `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a client honoring `policy`. Credential inclusion keeps a cookie
    /// store for the lifetime of the transport.
    pub fn new(policy: &OriginPolicy) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .cookie_store(policy.include_credentials)
            .build()
            .map_err(|e| ApiError::InvalidConfig(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Wrap an already configured client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let mut builder = self
            .client
            .request(to_reqwest_method(request.method), &request.url)
            .headers(to_header_map(&request.headers)?);

        builder = match request.body {
            Some(RequestBody::Json(body)) => builder.body(body),
            Some(RequestBody::Multipart(parts)) => builder.multipart(to_form(parts)?),
            None => builder,
        };

        let response = builder
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
            .collect();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Transport(format!("failed to read response body: {e}")))?;

        Ok(HttpResponse {
            status: status.as_u16(),
            status_text: status_text(status),
            headers,
            body,
        })
    }
}

/// Reason phrase for `status`. Codes without a registered phrase (520 and
/// friends from proxies) get a generic one so the text is never empty.
fn status_text(status: StatusCode) -> String {
    status
        .canonical_reason()
        .unwrap_or("Unknown Status")
        .to_string()
}

fn to_reqwest_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Delete => Method::DELETE,
    }
}

fn to_header_map(headers: &[(String, String)]) -> Result<HeaderMap, ApiError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (k, v) in headers {
        let name = HeaderName::from_bytes(k.as_bytes())
            .map_err(|e| ApiError::InvalidRequest(format!("invalid header name {k}: {e}")))?;
        let value = HeaderValue::from_str(v)
            .map_err(|e| ApiError::InvalidRequest(format!("invalid header value for {k}: {e}")))?;
        map.append(name, value);
    }
    Ok(map)
}

fn to_form(parts: Vec<FormPart>) -> Result<Form, ApiError> {
    let mut form = Form::new();
    for part in parts {
        let mut p = Part::bytes(part.data);
        if let Some(file_name) = part.file_name {
            p = p.file_name(file_name);
        }
        if let Some(mime) = part.content_type {
            p = p
                .mime_str(&mime)
                .map_err(|e| ApiError::InvalidRequest(format!("invalid content type {mime}: {e}")))?;
        }
        form = form.part(part.name, p);
    }
    Ok(form)
}
