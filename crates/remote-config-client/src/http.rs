// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP plumbing for the remote configuration service.
//!
//! The client talks to the service through the [`HttpExecutor`] seam so the
//! concurrency protocol can be exercised without a network. [`ReqwestExecutor`]
//! is the production implementation: it owns a pooled `reqwest::Client`, the
//! base URL and the shared default headers (user agent, bearer token), and logs
//! every exchange at `debug` with credentials redacted.

use std::borrow::Cow;
use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, Method, StatusCode};
use thiserror::Error;
use tokio::sync::OnceCell;

pub use reqwest::header::{ETAG, IF_MATCH};

/// Errors raised before or while exchanging a request with the service.
#[derive(Debug, Error)]
pub enum HttpError {
    /// Transport-level issue (DNS, TLS, socket, timeout, etc.).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// The provided URL violates the required transport policy.
    #[error("insecure base url requires explicit opt-in: {0}")]
    InsecureUrl(String),
    /// A header could not be encoded (e.g. a token with control characters).
    #[error("invalid value for header `{0}`")]
    InvalidHeader(&'static str),
    /// The TLS-enabled client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    ClientBuilder(String),
}

/// A request relative to the executor's base URL.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    /// Path starting with `/`.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn query(mut self, name: &str, value: impl Into<String>) -> Self {
        self.query.push((name.to_string(), value.into()));
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Attaches a JSON body and the matching content type.
    pub fn json_body(mut self, body: Vec<u8>) -> Self {
        self.headers.insert(
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        self.body = Some(body);
        self
    }
}

/// A fully buffered response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Returns the `ETag` header, or the empty string when absent.
    pub fn etag(&self) -> String {
        self.headers
            .get(ETAG)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string()
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Executes requests against the remote configuration service.
///
/// Implementations must be safe to share between concurrent callers.
/// Deadlines and cancellation belong to the implementation.
#[async_trait]
pub trait HttpExecutor: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, HttpError>;
}

pub type TokenResolverFn =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = String> + Send>> + Send + Sync>;

/// Source of the OAuth2 bearer token attached to every request.
///
/// Acquiring credentials is left to the embedder: either a fixed token or a
/// resolver that is invoked once, on the first request.
#[derive(Clone)]
pub enum TokenFactory {
    Static(String),
    Dynamic {
        resolver_fn: TokenResolverFn,
        token: Arc<OnceCell<String>>,
    },
}

impl TokenFactory {
    pub fn new_from_resolver(resolver_fn: TokenResolverFn) -> Self {
        Self::Dynamic {
            resolver_fn,
            token: Arc::new(OnceCell::new()),
        }
    }

    pub fn new_from_static_token(token: &str) -> Self {
        Self::Static(token.to_string())
    }

    pub async fn get_token(&self) -> &str {
        match self {
            Self::Static(token) => token,
            Self::Dynamic { resolver_fn, token } => {
                token.get_or_init(|| async { (resolver_fn)().await }).await
            }
        }
    }
}

impl Debug for TokenFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TokenFactory")
    }
}

/// Options governing how the `reqwest` client is constructed.
#[derive(Debug, Clone, Copy)]
pub struct HttpClientOptions {
    /// Whether plaintext (HTTP) endpoints are allowed.
    pub allow_plaintext: bool,
    /// Overall deadline for one request.
    pub timeout: Duration,
}

impl Default for HttpClientOptions {
    fn default() -> Self {
        Self {
            allow_plaintext: false,
            timeout: Duration::from_secs(30),
        }
    }
}

/// [`HttpExecutor`] backed by a pooled `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestExecutor {
    client: Client,
    base_url: String,
    headers: HeaderMap,
    token: Option<TokenFactory>,
}

impl ReqwestExecutor {
    pub fn new(
        base_url: impl Into<String>,
        client_version: &str,
        token: Option<TokenFactory>,
        options: HttpClientOptions,
    ) -> Result<Self, HttpError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        // Plaintext endpoints leak the bearer token; only allow them on request.
        if !options.allow_plaintext && base_url.starts_with("http://") {
            return Err(HttpError::InsecureUrl(base_url));
        }

        let mut headers = HeaderMap::new();
        let user_agent = format!("remote-config-client/{client_version}");
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&user_agent).map_err(|_| HttpError::InvalidHeader("user-agent"))?,
        );
        headers.insert(
            reqwest::header::ACCEPT,
            HeaderValue::from_static("application/json"),
        );

        // `gzip` advertises `Accept-Encoding: gzip` and inflates responses.
        let client = Client::builder()
            .gzip(true)
            .timeout(options.timeout)
            .build()
            .map_err(|e| HttpError::ClientBuilder(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            headers,
            token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl HttpExecutor for ReqwestExecutor {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let HttpRequest {
            method,
            path,
            query,
            headers: request_headers,
            body,
        } = request;
        let url = format!("{}{}", self.base_url, path);

        let mut headers = self.headers.clone();
        if let Some(token) = &self.token {
            let bearer = format!("Bearer {}", token.get_token().await);
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&bearer).map_err(|_| HttpError::InvalidHeader("authorization"))?,
            );
        }
        headers.extend(request_headers);

        let body_len = body.as_ref().map(|bytes| bytes.len()).unwrap_or(0);
        if tracing::enabled!(tracing::Level::TRACE) {
            let preview = body
                .as_deref()
                .map(|bytes| request_body_preview(&headers, bytes))
                .unwrap_or_default();
            tracing::debug!(
                method = %method,
                url = %url,
                query = ?query,
                headers = ?redact_headers(&headers),
                body_len = body_len,
                body = %preview,
                "remote-config HTTP request"
            );
        } else {
            tracing::debug!(
                method = %method,
                url = %url,
                query = ?query,
                headers = ?redact_headers(&headers),
                body_len = body_len,
                "remote-config HTTP request"
            );
        }

        let mut builder = self
            .client
            .request(method.clone(), url.as_str())
            .headers(headers);
        if !query.is_empty() {
            builder = builder.query(&query);
        }
        // GET requests go out without a body.
        if let Some(bytes) = body {
            builder = builder.body(bytes);
        }
        let response = builder.send().await?;

        let status = response.status();
        let response_headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        if status.is_success() {
            tracing::debug!(
                method = %method,
                url = %url,
                status = %status,
                content_length = body.len(),
                "remote-config HTTP response"
            );
        } else {
            tracing::debug!(
                method = %method,
                url = %url,
                status = %status,
                content_length = body.len(),
                body = %truncate_preview_text(String::from_utf8_lossy(&body)),
                "remote-config HTTP response"
            );
        }

        Ok(HttpResponse {
            status,
            headers: response_headers,
            body,
        })
    }
}

/// Returns a redacted view of request headers suitable for debug logging.
fn redact_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    const SENSITIVE_HEADERS: [&str; 2] = ["authorization", "x-goog-api-key"];

    headers
        .iter()
        .map(|(name, value)| {
            let lower = name.as_str().to_ascii_lowercase();
            let display = if SENSITIVE_HEADERS.contains(&lower.as_str()) {
                "<redacted>".to_string()
            } else {
                value
                    .to_str()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|_| "<non-utf8>".to_string())
            };
            (lower, display)
        })
        .collect()
}

/// Returns a human-readable preview of a request body for verbose logging.
fn request_body_preview(headers: &HeaderMap, body: &[u8]) -> String {
    let content_type = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();
    let is_text = content_type.contains("json") || content_type.contains("text");
    if !is_text {
        return format!("[{} bytes binary]", body.len());
    }
    truncate_preview_text(String::from_utf8_lossy(body))
}

fn truncate_preview_text(text: Cow<'_, str>) -> String {
    const MAX_CHARS: usize = 1024;
    let mut chars = text.chars();
    let mut preview = String::new();
    for _ in 0..MAX_CHARS {
        match chars.next() {
            Some(ch) => preview.push(ch),
            None => return preview,
        }
    }
    if chars.next().is_some() {
        preview.push('…');
    }
    preview
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn options() -> HttpClientOptions {
        HttpClientOptions {
            allow_plaintext: true,
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn executor_sends_headers_query_and_body() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("PUT", "/v1/projects/demo/remoteConfig")
            .match_header("authorization", "Bearer secret-token")
            .match_header("if-match", "etag-1")
            .match_header("content-type", "application/json; charset=utf-8")
            .match_header("user-agent", "remote-config-client/0.1.0")
            .match_header("accept-encoding", "gzip")
            .match_query(Matcher::UrlEncoded("validateOnly".into(), "true".into()))
            .match_body(r#"{"parameters":{}}"#)
            .with_status(200)
            .with_header("etag", "etag-2")
            .with_body("{}")
            .create_async()
            .await;

        let executor = ReqwestExecutor::new(
            server.url(),
            "0.1.0",
            Some(TokenFactory::new_from_static_token("secret-token")),
            options(),
        )
        .expect("executor");
        let request = HttpRequest::new(Method::PUT, "/v1/projects/demo/remoteConfig")
            .query("validateOnly", "true")
            .header(IF_MATCH, HeaderValue::from_static("etag-1"))
            .json_body(br#"{"parameters":{}}"#.to_vec());

        let response = executor.execute(request).await.expect("response");
        mock.assert_async().await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.etag(), "etag-2");
        assert_eq!(response.body_text(), "{}");
    }

    #[tokio::test]
    async fn executor_inflates_gzip_responses() {
        use flate2::{write::GzEncoder, Compression};
        use std::io::Write;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(br#"{"parameters":{}}"#)
            .expect("gzip write succeeds");
        let compressed = encoder.finish().expect("gzip finish");

        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/v1/projects/demo/remoteConfig")
            .match_header("accept-encoding", "gzip")
            .with_status(200)
            .with_header("content-encoding", "gzip")
            .with_header("etag", "etag-gz")
            .with_body(compressed)
            .create_async()
            .await;

        let executor = ReqwestExecutor::new(server.url(), "0.1.0", None, options()).expect("executor");
        let response = executor
            .execute(HttpRequest::new(Method::GET, "/v1/projects/demo/remoteConfig"))
            .await
            .expect("response");
        assert_eq!(response.etag(), "etag-gz");
        assert_eq!(response.body_text(), r#"{"parameters":{}}"#);
    }

    #[tokio::test]
    async fn executor_returns_error_statuses_with_body() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/v1/projects/demo/remoteConfig")
            .with_status(404)
            .with_body(r#"{"error":{"message":"not found"}}"#)
            .create_async()
            .await;

        let executor = ReqwestExecutor::new(server.url(), "0.1.0", None, options()).expect("executor");
        let response = executor
            .execute(HttpRequest::new(Method::GET, "/v1/projects/demo/remoteConfig"))
            .await
            .expect("response");
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert!(response.body_text().contains("not found"));
        assert_eq!(response.etag(), "");
    }

    #[tokio::test]
    async fn dynamic_token_is_resolved_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let factory = TokenFactory::new_from_resolver(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move { "resolved-token".to_string() })
                as Pin<Box<dyn Future<Output = String> + Send>>
        }));
        assert_eq!(factory.get_token().await, "resolved-token");
        assert_eq!(factory.get_token().await, "resolved-token");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn executor_rejects_insecure_url_without_opt_in() {
        let err = ReqwestExecutor::new(
            "http://remote-config.example.com",
            "0.1.0",
            None,
            HttpClientOptions::default(),
        )
        .expect_err("insecure transport should fail");
        assert!(matches!(err, HttpError::InsecureUrl(_)));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let executor = ReqwestExecutor::new(
            "https://remote-config.example.com/",
            "0.1.0",
            None,
            HttpClientOptions::default(),
        )
        .expect("executor");
        assert_eq!(executor.base_url(), "https://remote-config.example.com");
    }

    #[test]
    fn redact_headers_hides_credentials() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer secret"));
        headers.insert(USER_AGENT, HeaderValue::from_static("agent"));
        let redacted = redact_headers(&headers);
        assert!(redacted.contains(&("authorization".to_string(), "<redacted>".to_string())));
        assert!(redacted.contains(&("user-agent".to_string(), "agent".to_string())));
    }

    #[test]
    fn request_body_preview_handles_plain_text() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        let preview = request_body_preview(&headers, br#"{"hello":"world"}"#);
        assert_eq!(preview, r#"{"hello":"world"}"#);
    }

    #[test]
    fn request_body_preview_limits_length() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("text/plain"));
        let payload = "a".repeat(1500);
        let preview = request_body_preview(&headers, payload.as_bytes());
        assert!(preview.ends_with('…'), "preview should be truncated");
        assert!(preview.chars().count() <= 1025);
    }

    #[test]
    fn request_body_preview_handles_binary_payloads() {
        let headers = HeaderMap::new();
        let preview = request_body_preview(&headers, &[0, 159, 146, 150]);
        assert_eq!(preview, "[4 bytes binary]");
    }
}
