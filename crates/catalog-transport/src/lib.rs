//! HTTP transport seam, reqwest implementation and the request wrapper that
//! funnels every failure through the error interceptor.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use catalog_core::{to_normalized_error, NormalizedError, RawFailure};
use catalog_notify::NotificationService;
pub use reqwest::header::{HeaderMap, HeaderValue};
pub use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{debug, info_span, warn, Instrument};

pub const CRATE_NAME: &str = "catalog-transport";

pub const DEFAULT_BASE_URL: &str = "http://localhost:3002/bp";

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub user_agent: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(20),
            user_agent: Some(format!("catalog-cli/{}", env!("CARGO_PKG_VERSION"))),
        }
    }
}

impl HttpClientConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("CATALOG_API_BASE_URL").unwrap_or(defaults.base_url),
            timeout: std::env::var("CATALOG_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            user_agent: std::env::var("CATALOG_USER_AGENT").ok().or(defaults.user_agent),
        }
    }
}

/// Scalar query parameter value; stringified when encoded.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for QueryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(v) => f.write_str(v),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for QueryValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for QueryValue {
    fn from(value: i32) -> Self {
        Self::Integer(value.into())
    }
}

impl From<u32> for QueryValue {
    fn from(value: u32) -> Self {
        Self::Integer(value.into())
    }
}

impl From<f64> for QueryValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for QueryValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Query parameters; `None` values are left out of the encoded string.
pub type HttpQuery = BTreeMap<String, Option<QueryValue>>;

/// Base without trailing slashes + path with exactly one leading slash.
pub fn join_url(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

/// `None` when no parameter carries a value.
pub fn encode_query(query: &HttpQuery) -> Option<String> {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    let mut any = false;
    for (key, value) in query {
        if let Some(value) = value {
            serializer.append_pair(key, &value.to_string());
            any = true;
        }
    }
    any.then(|| serializer.finish())
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<JsonValue>,
    pub headers: HeaderMap,
}

/// Raw HTTP boundary. Successful responses yield the decoded JSON body
/// (`null` when empty); failures are reported as [`RawFailure`].
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<JsonValue, RawFailure>;
}

/// Requests that never produced a response look like status 0 to callers.
pub fn classify_reqwest_error(err: &reqwest::Error) -> RawFailure {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        RawFailure::network()
    } else {
        RawFailure::Other(err.to_string())
    }
}

fn body_to_json(bytes: &[u8]) -> JsonValue {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return JsonValue::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| JsonValue::String(String::from_utf8_lossy(bytes).into_owned()))
}

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(config: &HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<JsonValue, RawFailure> {
        let span = info_span!("http_request", method = %request.method, url = %request.url);
        async move {
            let mut builder = self
                .client
                .request(request.method, &request.url)
                .headers(request.headers);
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }

            let resp = builder.send().await.map_err(|err| classify_reqwest_error(&err))?;
            let status = resp.status();
            let bytes = resp.bytes().await.map_err(|err| classify_reqwest_error(&err))?;
            let payload = body_to_json(&bytes);
            debug!(status = status.as_u16(), bytes = bytes.len(), "response received");

            if status.is_success() {
                Ok(payload)
            } else {
                Err(RawFailure::http(status.as_u16(), payload))
            }
        }
        .instrument(span)
        .await
    }
}

/// Single interception point for failed requests: normalize, notify, hand back.
#[derive(Debug, Clone)]
pub struct ErrorInterceptor {
    notifications: NotificationService,
}

impl ErrorInterceptor {
    pub const NOTIFICATION_TITLE: &'static str = "Error";

    pub fn new(notifications: NotificationService) -> Self {
        Self { notifications }
    }

    pub fn intercept(&self, raw: RawFailure) -> NormalizedError {
        let err = to_normalized_error(&raw);
        warn!(code = %err.code, status = ?err.status, raw = %raw, "request failed");
        self.notifications
            .error(Self::NOTIFICATION_TITLE, Some(err.message.clone()));
        err
    }
}

/// Request wrapper used by repositories; callers only ever see
/// [`NormalizedError`]s.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    interceptor: ErrorInterceptor,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        base_url: impl Into<String>,
        notifications: NotificationService,
    ) -> Self {
        Self {
            transport,
            base_url: base_url.into(),
            interceptor: ErrorInterceptor::new(notifications),
        }
    }

    pub fn from_config(
        config: &HttpClientConfig,
        notifications: NotificationService,
    ) -> anyhow::Result<Self> {
        let transport = ReqwestTransport::new(config)?;
        Ok(Self::new(Arc::new(transport), config.base_url.clone(), notifications))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: Option<&HttpQuery>,
        headers: Option<HeaderMap>,
    ) -> Result<T, NormalizedError> {
        self.execute(Method::GET, path, None, query, headers).await
    }

    pub async fn post<B, T>(
        &self,
        path: &str,
        body: &B,
        query: Option<&HttpQuery>,
        headers: Option<HeaderMap>,
    ) -> Result<T, NormalizedError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = self.encode_body(body)?;
        self.execute(Method::POST, path, Some(body), query, headers).await
    }

    pub async fn put<B, T>(
        &self,
        path: &str,
        body: &B,
        query: Option<&HttpQuery>,
        headers: Option<HeaderMap>,
    ) -> Result<T, NormalizedError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = self.encode_body(body)?;
        self.execute(Method::PUT, path, Some(body), query, headers).await
    }

    pub async fn delete<T: DeserializeOwned>(
        &self,
        path: &str,
        query: Option<&HttpQuery>,
        headers: Option<HeaderMap>,
    ) -> Result<T, NormalizedError> {
        self.execute(Method::DELETE, path, None, query, headers).await
    }

    /// Route a failure detected above the transport (e.g. an unreadable
    /// payload) through the same interceptor as transport failures.
    pub fn reject(&self, raw: RawFailure) -> NormalizedError {
        self.interceptor.intercept(raw)
    }

    fn encode_body<B: Serialize + ?Sized>(&self, body: &B) -> Result<JsonValue, NormalizedError> {
        serde_json::to_value(body)
            .map_err(|err| self.reject(RawFailure::Other(format!("encoding request body: {err}"))))
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<JsonValue>,
        query: Option<&HttpQuery>,
        headers: Option<HeaderMap>,
    ) -> Result<T, NormalizedError> {
        let mut url = self.url(path);
        if let Some(qs) = query.and_then(encode_query) {
            url.push('?');
            url.push_str(&qs);
        }

        let request = HttpRequest {
            method,
            url,
            body,
            headers: headers.unwrap_or_default(),
        };

        let payload = self
            .transport
            .send(request)
            .await
            .map_err(|raw| self.interceptor.intercept(raw))?;

        serde_json::from_value(payload)
            .map_err(|err| self.reject(RawFailure::Other(format!("decoding response body: {err}"))))
    }
}
