use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::dispatcher::{ApiRequest, RequestDispatcher};
use crate::endpoints::{EndpointSet, RoleEndpointMap};
use crate::error::ApiError;
use crate::reauth::ReauthInterceptor;
use crate::role::Role;
use crate::session::{MemorySessionStore, ObservedSession, Session, SessionStore};

/// Connection settings for an [`AuthClient`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientOptions {
    /// Server URL, e.g. `http://localhost:8080`.
    pub base_url: String,
    #[serde(default)]
    pub endpoints: RoleEndpointMap,
}

impl ClientOptions {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            endpoints: RoleEndpointMap::standard(),
        }
    }
}

#[derive(Deserialize)]
struct LoginResponse {
    access_token: String,
}

/// Who-am-i documents come either bare or wrapped in `{ "data": ... }`.
/// A wrapped payload that does not decode is an error, never a bare
/// document.
fn unwrap_data<T: DeserializeOwned>(mut body: serde_json::Value) -> Result<T, ApiError> {
    let payload = match body.as_object_mut().and_then(|obj| obj.remove("data")) {
        Some(data) => data,
        None => body,
    };
    serde_json::from_value(payload).map_err(|e| ApiError::Decode(format!("identity document: {}", e)))
}

/// Authenticated API client: owns the session and routes every call
/// through the [`ReauthInterceptor`].
#[derive(Clone)]
pub struct AuthClient {
    dispatcher: RequestDispatcher,
    endpoints: Arc<RoleEndpointMap>,
    session: Arc<ObservedSession>,
    interceptor: ReauthInterceptor,
}

impl AuthClient {
    /// Client with an in-memory session.
    pub fn new(options: ClientOptions) -> Self {
        Self::with_session(options, Arc::new(MemorySessionStore::new()))
    }

    /// Client backed by a caller-provided session store.
    pub fn with_session(options: ClientOptions, session: Arc<dyn SessionStore>) -> Self {
        let dispatcher = RequestDispatcher::new(options.base_url);
        let endpoints = Arc::new(options.endpoints);
        let session = Arc::new(ObservedSession::new(session));
        let interceptor = ReauthInterceptor::new(
            dispatcher.clone(),
            Arc::clone(&endpoints),
            Arc::clone(&session) as Arc<dyn SessionStore>,
        );
        Self {
            dispatcher,
            endpoints,
            session,
            interceptor,
        }
    }

    pub fn session(&self) -> Session {
        self.session.load()
    }

    /// Receiver notified on every session write: login, token refresh,
    /// logout and the forced logout after a failed renewal.
    pub fn session_changes(&self) -> watch::Receiver<Session> {
        self.session.subscribe()
    }

    pub fn endpoints(&self, role: Role) -> &EndpointSet {
        self.endpoints.get(role)
    }

    /// Exchange credentials for a token on the role's login endpoint.
    ///
    /// The login call never carries the current token and is not retried.
    pub async fn login<C: Serialize + ?Sized>(
        &self,
        role: Role,
        credentials: &C,
    ) -> Result<Session, ApiError> {
        let request = ApiRequest::post(self.endpoints.get(role).login.clone()).json(credentials)?;
        let resp = self.dispatcher.dispatch(&request, None).await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Auth(format!("login failed ({}): {}", status, body)));
        }
        let lr: LoginResponse = resp
            .json()
            .await
            .map_err(|e| ApiError::Decode(format!("login response: {}", e)))?;
        if lr.access_token.is_empty() {
            return Err(ApiError::Auth("login response carried an empty access_token".into()));
        }

        let session = Session::authenticated(role, lr.access_token);
        self.session.save(session.clone());
        info!(%role, "logged in");
        Ok(session)
    }

    /// Tell the server the session ends, then clear it locally.
    ///
    /// The server call is best-effort: the local session is cleared even
    /// when it fails.
    pub async fn logout(&self) {
        let current = self.session.load();
        if let (Some(role), Some(token)) = (current.role(), current.token()) {
            let request = ApiRequest::post(self.endpoints.get(role).logout.clone());
            match self.dispatcher.dispatch(&request, Some(token)).await {
                Ok(resp) if !resp.status().is_success() => {
                    warn!(%role, status = resp.status().as_u16(), "server-side logout rejected");
                }
                Ok(_) => {}
                Err(e) => warn!(%role, error = %e, "server-side logout failed"),
            }
            info!(%role, "logged out");
        }
        self.session.clear();
    }

    /// Fetch the identity document of the current session.
    pub async fn who_am_i<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        let role = self.session.load().role().ok_or(ApiError::NotAuthenticated)?;
        let request = ApiRequest::get(self.endpoints.get(role).who_am_i.clone());
        let resp = self.send(&request).await?;
        let body: serde_json::Value = Self::parse(resp).await?;
        unwrap_data(body)
    }

    /// Send an arbitrary request through the interceptor.
    pub async fn send(&self, request: &ApiRequest) -> Result<reqwest::Response, ApiError> {
        self.interceptor.send(request).await
    }

    pub async fn get_json<R: DeserializeOwned>(&self, path: &str) -> Result<R, ApiError> {
        let resp = self.send(&ApiRequest::get(path)).await?;
        Self::parse(resp).await
    }

    pub async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, ApiError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let resp = self.send(&ApiRequest::post(path).json(body)?).await?;
        Self::parse(resp).await
    }

    pub async fn put_json<B, R>(&self, path: &str, body: &B) -> Result<R, ApiError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let resp = self.send(&ApiRequest::put(path).json(body)?).await?;
        Self::parse(resp).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        let resp = self.send(&ApiRequest::delete(path)).await?;
        Self::check(resp).await.map(|_| ())
    }

    /// Map non-2xx responses to `ApiError::Server`.
    pub async fn check(resp: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = resp.status();
        if !status.is_success() {
            let code = status.as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Server { status: code, message: body });
        }
        Ok(resp)
    }

    /// Parse an API response, mapping HTTP errors to `ApiError`.
    pub async fn parse<R: DeserializeOwned>(resp: reqwest::Response) -> Result<R, ApiError> {
        let resp = Self::check(resp).await?;
        resp.json::<R>()
            .await
            .map_err(|e| ApiError::Decode(format!("response body: {}", e)))
    }
}
