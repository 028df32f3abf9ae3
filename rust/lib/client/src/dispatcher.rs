use reqwest::Method;
use serde::Serialize;
use tracing::debug;

use crate::error::ApiError;

/// Description of one API call.
///
/// Kept separate from `reqwest::Request` so the same call can be sent
/// again after a token refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the base URL, e.g. `/admin/products`.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Attach a JSON body.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body)
            .map_err(|e| ApiError::Decode(format!("request body: {}", e)))?;
        self.body = Some(value);
        Ok(self)
    }
}

/// Issues exactly one HTTP call per `dispatch`.
#[derive(Debug, Clone)]
pub struct RequestDispatcher {
    http: reqwest::Client,
    base_url: String,
}

impl RequestDispatcher {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_http(reqwest::Client::new(), base_url)
    }

    /// Use a preconfigured `reqwest::Client` (timeouts, proxies, TLS).
    pub fn with_http(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Send `request`, attaching `Authorization: Bearer <token>` when a
    /// token is given. The response is returned as-is, whatever its status.
    pub async fn dispatch(
        &self,
        request: &ApiRequest,
        token: Option<&str>,
    ) -> Result<reqwest::Response, ApiError> {
        let mut builder = self.http.request(request.method.clone(), self.url(&request.path));
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }

        debug!(
            method = %request.method,
            path = %request.path,
            authenticated = token.is_some(),
            "dispatching request"
        );
        let resp = builder.send().await?;
        debug!(path = %request.path, status = resp.status().as_u16(), "response received");
        Ok(resp)
    }
}
