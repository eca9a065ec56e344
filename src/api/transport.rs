//! HTTP boundary for the CropManage client
//!
//! Everything above this module speaks `ApiRequest` → JSON. Tests swap the
//! reqwest-backed transport for an in-memory one.

use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Maximum length of a response body quoted in an error
const MAX_ERROR_BODY_LEN: usize = 600;

#[derive(Debug, Clone, PartialEq)]
pub enum Method {
    Get,
    PostJson(Value),
    PostForm(Vec<(String, String)>),
}

/// One logical HTTP call.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub timeout: Duration,
}

impl ApiRequest {
    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            query: Vec::new(),
            timeout,
        }
    }

    pub fn post_json(url: impl Into<String>, body: Value, timeout: Duration) -> Self {
        Self {
            method: Method::PostJson(body),
            url: url.into(),
            query: Vec::new(),
            timeout,
        }
    }

    pub fn post_form(url: impl Into<String>, form: Vec<(String, String)>, timeout: Duration) -> Self {
        Self {
            method: Method::PostForm(form),
            url: url.into(),
            query: Vec::new(),
            timeout,
        }
    }

    pub fn with_query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    /// URL with the query string appended, as it goes over the wire.
    pub fn display_url(&self) -> String {
        if self.query.is_empty() {
            return self.url.clone();
        }
        let query: String = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.query.iter())
            .finish();
        format!("{}?{}", self.url, query)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },
    #[error("{url} returned HTTP {status}: {body}")]
    Status { url: String, status: u16, body: String },
    #[error("could not decode response from {url}: {message}")]
    Decode { url: String, message: String },
}

/// Sends one request and hands back the decoded JSON body.
///
/// Implementations must treat any non-2xx status as an error.
#[allow(async_fn_in_trait)]
pub trait Transport {
    async fn send(&self, request: &ApiRequest) -> Result<Value, TransportError>;
}

/// reqwest-backed transport carrying an optional bearer token.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    token: Option<String>,
}

impl HttpTransport {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("cropmanage-agent/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;
        Ok(Self {
            client,
            token: None,
        })
    }

    /// Same connection pool, now sending `Authorization: Bearer <token>`.
    pub fn with_bearer(&self, token: &str) -> Self {
        Self {
            client: self.client.clone(),
            token: Some(token.to_string()),
        }
    }
}

impl Transport for HttpTransport {
    async fn send(&self, request: &ApiRequest) -> Result<Value, TransportError> {
        let url = request.display_url();
        let mut builder = match &request.method {
            Method::Get => self.client.get(&request.url),
            Method::PostJson(body) => self.client.post(&request.url).json(body),
            Method::PostForm(form) => self.client.post(&request.url).form(form),
        };
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }

        tracing::debug!("{} {}", method_label(&request.method), url);

        let response = builder
            .timeout(request.timeout)
            .send()
            .await
            .map_err(|e| TransportError::Request {
                url: url.clone(),
                message: e.to_string(),
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| TransportError::Request {
            url: url.clone(),
            message: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(TransportError::Status {
                url,
                status: status.as_u16(),
                body: crate::util::clip(text.trim(), MAX_ERROR_BODY_LEN).to_string(),
            });
        }

        decode_body(&url, &text)
    }
}

fn method_label(method: &Method) -> &'static str {
    match method {
        Method::Get => "GET",
        Method::PostJson(_) | Method::PostForm(_) => "POST",
    }
}

/// Empty bodies decode to `null` rather than failing.
pub(crate) fn decode_body(url: &str, text: &str) -> Result<Value, TransportError> {
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(text).map_err(|e| TransportError::Decode {
        url: url.to_string(),
        message: e.to_string(),
    })
}
