//! Transparent session renewal.
//!
//! A request rejected with 401 triggers one role-scoped refresh and one
//! retry. Concurrent 401s share a single in-flight refresh: the first
//! handler installs a [`Shared`] future in the slot, later handlers clone
//! it, and the refresh itself empties the slot once its outcome has been
//! written to the session store. Both writes happen under the slot lock,
//! so a handler either joins the pending refresh or sees its result.

use std::sync::{Arc, Mutex, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{info, warn};

use crate::dispatcher::{ApiRequest, RequestDispatcher};
use crate::endpoints::RoleEndpointMap;
use crate::error::{ApiError, RefreshFailure};
use crate::role::Role;
use crate::session::{Session, SessionStore};

type RefreshOutcome = Result<String, RefreshFailure>;
type PendingRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

#[derive(Deserialize)]
struct RefreshResponse {
    access_token: String,
}

/// Wraps a [`RequestDispatcher`] and recovers from expired credentials.
#[derive(Clone)]
pub struct ReauthInterceptor {
    dispatcher: RequestDispatcher,
    endpoints: Arc<RoleEndpointMap>,
    session: Arc<dyn SessionStore>,
    pending: Arc<Mutex<Option<PendingRefresh>>>,
}

/// Token a request issued under `role` may be retried with after the
/// session moved on. A session of another role (or none) ends the request.
fn token_for(role: Role, current: &Session) -> RefreshOutcome {
    match (current.role(), current.token()) {
        (Some(current_role), Some(token)) if current_role == role => Ok(token.to_string()),
        _ => Err(RefreshFailure::LoggedOut),
    }
}

impl ReauthInterceptor {
    pub fn new(
        dispatcher: RequestDispatcher,
        endpoints: Arc<RoleEndpointMap>,
        session: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            dispatcher,
            endpoints,
            session,
            pending: Arc::new(Mutex::new(None)),
        }
    }

    /// Send `request` with the current session token.
    ///
    /// Non-401 responses, and 401s on requests sent without a token, are
    /// returned unchanged. A 401 on an authenticated request is retried
    /// once after a refresh; if the refresh fails or the retry is rejected
    /// again the session is cleared and `ApiError::SessionExpired` returned.
    pub async fn send(&self, request: &ApiRequest) -> Result<reqwest::Response, ApiError> {
        let sent = self.session.load();
        let resp = self.dispatcher.dispatch(request, sent.token()).await?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return Ok(resp);
        }
        let (Some(role), Some(stale)) = (sent.role(), sent.token()) else {
            return Ok(resp);
        };

        let detail = resp.text().await.unwrap_or_default();
        info!(path = %request.path, %role, "request rejected with 401, renewing session");

        let token = match self.renewed_token(role, stale).await {
            Ok(token) => token,
            Err(failure) => {
                warn!(path = %request.path, error = %failure, "session renewal failed");
                return Err(ApiError::SessionExpired(format!(
                    "HTTP 401: {} ({})",
                    detail, failure
                )));
            }
        };

        let retried = self.dispatcher.dispatch(request, Some(&token)).await?;
        if retried.status() == StatusCode::UNAUTHORIZED {
            warn!(path = %request.path, "retry rejected with 401, clearing session");
            self.session.replace_if(Some(&token), Session::anonymous());
            let detail = retried.text().await.unwrap_or_default();
            return Err(ApiError::SessionExpired(format!("HTTP 401 after refresh: {}", detail)));
        }
        Ok(retried)
    }

    /// Token to retry with after `stale` was rejected: joins the pending
    /// refresh, reuses a token another request already obtained, or starts
    /// a new refresh.
    async fn renewed_token(&self, role: Role, stale: &str) -> RefreshOutcome {
        let pending = {
            let mut slot = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            match slot.as_ref() {
                Some(pending) => pending.clone(),
                None => {
                    let current = self.session.load();
                    if current.token() != Some(stale) {
                        return token_for(role, &current);
                    }
                    let pending = self.start_refresh(role, stale.to_string());
                    *slot = Some(pending.clone());
                    pending
                }
            }
        };
        pending.await
    }

    fn start_refresh(&self, role: Role, stale: String) -> PendingRefresh {
        let dispatcher = self.dispatcher.clone();
        let refresh_path = self.endpoints.get(role).refresh.clone();
        let session = Arc::clone(&self.session);
        // The future lives in the slot, so it only holds the slot weakly.
        let slot = Arc::downgrade(&self.pending);
        async move {
            let outcome = request_token(&dispatcher, refresh_path, &stale).await;

            let slot = slot.upgrade();
            let mut guard = slot
                .as_ref()
                .map(|slot| slot.lock().unwrap_or_else(PoisonError::into_inner));
            let next = match &outcome {
                Ok(token) => Session::authenticated(role, token.clone()),
                Err(_) => Session::anonymous(),
            };
            let outcome = if session.replace_if(Some(&stale), next) {
                match &outcome {
                    Ok(_) => info!(%role, "session token renewed"),
                    Err(failure) => warn!(%role, error = %failure, "refresh failed, session cleared"),
                }
                outcome
            } else {
                // Session changed underneath the refresh (logout or new login).
                token_for(role, &session.load())
            };
            if let Some(guard) = guard.as_mut() {
                **guard = None;
            }
            outcome
        }
        .boxed()
        .shared()
    }
}

async fn request_token(dispatcher: &RequestDispatcher, path: String, stale: &str) -> RefreshOutcome {
    let request = ApiRequest::post(path);
    let resp = dispatcher
        .dispatch(&request, Some(stale))
        .await
        .map_err(|e| RefreshFailure::Network(e.to_string()))?;

    let status = resp.status();
    if !status.is_success() {
        return Err(RefreshFailure::Rejected(status.as_u16()));
    }
    let body: RefreshResponse = resp
        .json()
        .await
        .map_err(|e| RefreshFailure::Malformed(e.to_string()))?;
    if body.access_token.is_empty() {
        return Err(RefreshFailure::Malformed("empty access_token".into()));
    }
    Ok(body.access_token)
}
