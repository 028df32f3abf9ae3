//! Client tests against a real HTTP server.
//!
//! Starts an axum backend that issues rotating tokens and counts refresh
//! calls, then drives `AuthClient` through expiry, refresh, concurrent
//! expiry and forced logout.

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::{Arc, Mutex, RwLock};
    use std::time::Duration;

    use axum::extract::{Path, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::{IntoResponse, Response};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde::Deserialize;
    use serde_json::{json, Value};
    use tokio::sync::Notify;

    use crate::{
        ApiError, ApiRequest, AuthClient, ClientOptions, MemorySessionStore, Role, Session,
        SessionStore,
    };

    // =====================================================================
    // Test backend
    // =====================================================================

    const PASSWORD: &str = "secret";

    #[derive(Clone, Copy, PartialEq)]
    enum RefreshMode {
        Issue,
        Reject,
        Malformed,
    }

    #[derive(Clone)]
    struct Backend {
        valid_token: Arc<RwLock<String>>,
        next_token: Arc<AtomicU64>,
        refresh_mode: Arc<RwLock<RefreshMode>>,
        refresh_calls: Arc<AtomicU64>,
        refresh_seen: Arc<Mutex<Vec<(String, Option<String>)>>>,
        always_401_hits: Arc<AtomicU64>,
        logout_calls: Arc<AtomicU64>,
        echo_seen: Arc<Mutex<Vec<Option<String>>>>,
        /// Parks the next refresh call until `refresh_release` fires.
        hold_refresh: Arc<AtomicBool>,
        refresh_arrived: Arc<Notify>,
        refresh_release: Arc<Notify>,
        /// Parks the next `/held-echo` call (after it has judged the token)
        /// until `held_release` fires.
        hold_echo: Arc<AtomicBool>,
        held_arrived: Arc<Notify>,
        held_release: Arc<Notify>,
        held_seen: Arc<Mutex<Vec<Option<String>>>>,
        broken_me: Arc<AtomicBool>,
    }

    impl Backend {
        fn new() -> Self {
            Self {
                valid_token: Arc::new(RwLock::new("tok-1".to_string())),
                next_token: Arc::new(AtomicU64::new(2)),
                refresh_mode: Arc::new(RwLock::new(RefreshMode::Issue)),
                refresh_calls: Arc::new(AtomicU64::new(0)),
                refresh_seen: Arc::new(Mutex::new(Vec::new())),
                always_401_hits: Arc::new(AtomicU64::new(0)),
                logout_calls: Arc::new(AtomicU64::new(0)),
                echo_seen: Arc::new(Mutex::new(Vec::new())),
                hold_refresh: Arc::new(AtomicBool::new(false)),
                refresh_arrived: Arc::new(Notify::new()),
                refresh_release: Arc::new(Notify::new()),
                hold_echo: Arc::new(AtomicBool::new(false)),
                held_arrived: Arc::new(Notify::new()),
                held_release: Arc::new(Notify::new()),
                held_seen: Arc::new(Mutex::new(Vec::new())),
                broken_me: Arc::new(AtomicBool::new(false)),
            }
        }

        fn set_mode(&self, mode: RefreshMode) {
            *self.refresh_mode.write().unwrap() = mode;
        }

        fn is_valid(&self, headers: &HeaderMap) -> bool {
            bearer(headers).as_deref() == Some(self.valid_token.read().unwrap().as_str())
        }

        fn refreshes(&self) -> u64 {
            self.refresh_calls.load(Ordering::SeqCst)
        }
    }

    fn bearer(headers: &HeaderMap) -> Option<String> {
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::to_owned)
    }

    fn unauthorized() -> Response {
        (StatusCode::UNAUTHORIZED, Json(json!({"error": "token expired"}))).into_response()
    }

    #[derive(Deserialize)]
    struct LoginBody {
        password: String,
    }

    async fn login_handler(State(b): State<Backend>, Json(body): Json<LoginBody>) -> Response {
        if body.password != PASSWORD {
            return (StatusCode::UNAUTHORIZED, Json(json!({"error": "invalid credentials"})))
                .into_response();
        }
        let token = b.valid_token.read().unwrap().clone();
        Json(json!({"access_token": token, "token_type": "Bearer"})).into_response()
    }

    async fn refresh_handler(
        State(b): State<Backend>,
        Path(role): Path<String>,
        headers: HeaderMap,
    ) -> Response {
        b.refresh_calls.fetch_add(1, Ordering::SeqCst);
        b.refresh_seen.lock().unwrap().push((role, bearer(&headers)));

        if b.hold_refresh.swap(false, Ordering::SeqCst) {
            b.refresh_arrived.notify_one();
            b.refresh_release.notified().await;
        }

        // Keep the refresh in flight long enough for concurrent 401s to pile up.
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mode = *b.refresh_mode.read().unwrap();
        match mode {
            RefreshMode::Issue => {
                let token = format!("tok-{}", b.next_token.fetch_add(1, Ordering::SeqCst));
                *b.valid_token.write().unwrap() = token.clone();
                Json(json!({"access_token": token})).into_response()
            }
            RefreshMode::Reject => unauthorized(),
            RefreshMode::Malformed => Json(json!({"token": "nope"})).into_response(),
        }
    }

    async fn logout_handler(State(b): State<Backend>) -> StatusCode {
        b.logout_calls.fetch_add(1, Ordering::SeqCst);
        StatusCode::NO_CONTENT
    }

    async fn me_handler(State(b): State<Backend>, headers: HeaderMap) -> Response {
        if !b.is_valid(&headers) {
            return unauthorized();
        }
        if b.broken_me.load(Ordering::SeqCst) {
            return Json(json!({"data": {"type": "admin", "permissions": [42]}})).into_response();
        }
        Json(json!({"data": {"type": "staff", "permissions": ["admin.catalog"]}})).into_response()
    }

    async fn held_echo_handler(State(b): State<Backend>, headers: HeaderMap) -> Response {
        let seen = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        b.held_seen.lock().unwrap().push(seen.clone());
        let valid = b.is_valid(&headers);
        if b.hold_echo.swap(false, Ordering::SeqCst) {
            b.held_arrived.notify_one();
            b.held_release.notified().await;
        }
        if !valid {
            return unauthorized();
        }
        Json(json!({"authorization": seen})).into_response()
    }

    async fn echo_handler(State(b): State<Backend>, headers: HeaderMap) -> Response {
        let seen = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        b.echo_seen.lock().unwrap().push(seen.clone());
        if !b.is_valid(&headers) {
            return unauthorized();
        }
        Json(json!({"authorization": seen})).into_response()
    }

    async fn always_401_handler(State(b): State<Backend>) -> Response {
        b.always_401_hits.fetch_add(1, Ordering::SeqCst);
        unauthorized()
    }

    async fn boom_handler() -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response()
    }

    async fn start_backend() -> (Backend, String) {
        let backend = Backend::new();
        let app = Router::new()
            .route("/{role}/login", post(login_handler))
            .route("/{role}/refresh", post(refresh_handler))
            .route("/{role}/logout", post(logout_handler))
            .route("/{role}/me", get(me_handler))
            .route("/echo", get(echo_handler))
            .route("/held-echo", get(held_echo_handler))
            .route("/always-401", get(always_401_handler))
            .route("/boom", get(boom_handler))
            .with_state(backend.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (backend, base_url)
    }

    fn client_with(base_url: &str, session: Session) -> (AuthClient, Arc<MemorySessionStore>) {
        let store = Arc::new(MemorySessionStore::with_session(session));
        let client = AuthClient::with_session(ClientOptions::new(base_url), store.clone());
        (client, store)
    }

    fn stale_admin() -> Session {
        Session::authenticated(Role::Admin, "stale")
    }

    // =====================================================================
    // Login / logout
    // =====================================================================

    #[tokio::test]
    async fn login_then_every_request_carries_bearer() {
        let (backend, url) = start_backend().await;
        let client = AuthClient::new(ClientOptions::new(&url));

        let session = client
            .login(Role::Admin, &json!({"username": "root", "password": PASSWORD}))
            .await
            .unwrap();
        assert_eq!(session.token(), Some("tok-1"));
        assert!(client.session().is_authenticated());

        for _ in 0..3 {
            let v: Value = client.get_json("/echo").await.unwrap();
            assert_eq!(v["authorization"], "Bearer tok-1");
        }
        assert_eq!(backend.refreshes(), 0);
    }

    #[tokio::test]
    async fn login_bad_credentials() {
        let (_backend, url) = start_backend().await;
        let client = AuthClient::new(ClientOptions::new(&url));

        let err = client
            .login(Role::Merchant, &json!({"username": "m", "password": "wrong"}))
            .await
            .unwrap_err();
        match err {
            ApiError::Auth(msg) => assert!(msg.contains("login failed"), "got: {}", msg),
            other => panic!("expected Auth error, got: {:?}", other),
        }
        assert!(!client.session().is_authenticated());
    }

    #[tokio::test]
    async fn logout_notifies_server_and_clears_session() {
        let (backend, url) = start_backend().await;
        let client = AuthClient::new(ClientOptions::new(&url));
        client
            .login(Role::Member, &json!({"username": "m", "password": PASSWORD}))
            .await
            .unwrap();

        client.logout().await;
        assert_eq!(client.session(), Session::anonymous());
        assert_eq!(backend.logout_calls.load(Ordering::SeqCst), 1);

        // Logging out twice does not call the server again.
        client.logout().await;
        assert_eq!(backend.logout_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn who_am_i_requires_session_and_unwraps_envelope() {
        let (_backend, url) = start_backend().await;
        let client = AuthClient::new(ClientOptions::new(&url));

        let err = client.who_am_i::<Value>().await.unwrap_err();
        assert!(matches!(err, ApiError::NotAuthenticated), "got: {:?}", err);

        client
            .login(Role::Admin, &json!({"username": "a", "password": PASSWORD}))
            .await
            .unwrap();
        let me: Value = client.who_am_i().await.unwrap();
        assert_eq!(me["type"], "staff");
        assert_eq!(me["permissions"][0], "admin.catalog");
    }

    #[tokio::test]
    async fn who_am_i_rejects_broken_wrapped_document() {
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Me {
            #[serde(rename = "type")]
            kind: Option<String>,
            #[serde(default)]
            permissions: Vec<String>,
            #[serde(flatten)]
            extra: serde_json::Map<String, Value>,
        }

        let (backend, url) = start_backend().await;
        backend.broken_me.store(true, Ordering::SeqCst);
        let (client, _store) = client_with(&url, Session::authenticated(Role::Admin, "tok-1"));

        let err = client.who_am_i::<Me>().await.unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)), "got: {:?}", err);
    }

    // =====================================================================
    // Session moving on during renewal
    // =====================================================================

    #[tokio::test]
    async fn late_401_reuses_token_from_finished_refresh() {
        let (backend, url) = start_backend().await;
        let (client, store) = client_with(&url, stale_admin());

        // First request is judged with the stale token, then parked.
        backend.hold_echo.store(true, Ordering::SeqCst);
        let late = {
            let client = client.clone();
            tokio::spawn(async move { client.get_json::<Value>("/held-echo").await })
        };
        backend.held_arrived.notified().await;

        // A second request expires and completes the refresh meanwhile.
        let v: Value = client.get_json("/echo").await.unwrap();
        assert_eq!(v["authorization"], "Bearer tok-2");
        assert_eq!(backend.refreshes(), 1);

        // The parked 401 now arrives with the refresh already finished.
        backend.held_release.notify_one();
        let v = late.await.unwrap().unwrap();
        assert_eq!(v["authorization"], "Bearer tok-2");

        assert_eq!(backend.refreshes(), 1, "late 401 does not refresh again");
        let seen = backend.held_seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![Some("Bearer stale".to_string()), Some("Bearer tok-2".to_string())]
        );
        assert_eq!(store.load().token(), Some("tok-2"));
    }

    #[tokio::test]
    async fn logout_during_refresh_ends_waiting_request() {
        let (backend, url) = start_backend().await;
        backend.hold_refresh.store(true, Ordering::SeqCst);
        let (client, store) = client_with(&url, stale_admin());

        let pending = {
            let client = client.clone();
            tokio::spawn(async move { client.get_json::<Value>("/echo").await })
        };
        backend.refresh_arrived.notified().await;

        client.logout().await;
        backend.refresh_release.notify_one();

        let err = pending.await.unwrap().unwrap_err();
        assert!(matches!(err, ApiError::SessionExpired(_)), "got: {:?}", err);
        assert_eq!(store.load(), Session::anonymous(), "refreshed token is not installed");
        let echoes = backend.echo_seen.lock().unwrap().clone();
        assert_eq!(echoes, vec![Some("Bearer stale".to_string())], "no retry after logout");
    }

    #[tokio::test]
    async fn login_as_other_role_during_refresh_is_not_reused() {
        let (backend, url) = start_backend().await;
        backend.hold_refresh.store(true, Ordering::SeqCst);
        let (client, store) = client_with(&url, stale_admin());

        let pending = {
            let client = client.clone();
            tokio::spawn(async move { client.get_json::<Value>("/echo").await })
        };
        backend.refresh_arrived.notified().await;

        client
            .login(Role::Merchant, &json!({"username": "m", "password": PASSWORD}))
            .await
            .unwrap();
        backend.refresh_release.notify_one();

        let err = pending.await.unwrap().unwrap_err();
        assert!(matches!(err, ApiError::SessionExpired(_)), "got: {:?}", err);
        assert_eq!(store.load(), Session::authenticated(Role::Merchant, "tok-1"));
        let echoes = backend.echo_seen.lock().unwrap().clone();
        assert_eq!(echoes, vec![Some("Bearer stale".to_string())]);
    }

    #[tokio::test]
    async fn login_as_same_role_during_refresh_is_reused() {
        let (backend, url) = start_backend().await;
        backend.hold_refresh.store(true, Ordering::SeqCst);
        let (client, store) = client_with(&url, stale_admin());

        let pending = {
            let client = client.clone();
            tokio::spawn(async move { client.get_json::<Value>("/echo").await })
        };
        backend.refresh_arrived.notified().await;

        client
            .login(Role::Admin, &json!({"username": "root", "password": PASSWORD}))
            .await
            .unwrap();
        backend.refresh_release.notify_one();

        // The refresh rotates the server token, so the retry with the login
        // token is rejected; what matters is which token was used.
        let _ = pending.await.unwrap();
        assert_eq!(backend.refreshes(), 1);
        let echoes = backend.echo_seen.lock().unwrap().clone();
        assert_eq!(
            echoes,
            vec![Some("Bearer stale".to_string()), Some("Bearer tok-1".to_string())]
        );
        assert_ne!(store.load().token(), Some("tok-2"), "refresh result is dropped");
    }

    #[tokio::test]
    async fn session_changes_report_forced_logout() {
        let (backend, url) = start_backend().await;
        backend.set_mode(RefreshMode::Reject);
        let (client, _store) = client_with(&url, stale_admin());

        let mut changes = client.session_changes();
        assert!(changes.borrow_and_update().is_authenticated());

        let _ = client.get_json::<Value>("/echo").await.unwrap_err();
        assert!(changes.has_changed().unwrap());
        assert_eq!(*changes.borrow_and_update(), Session::anonymous());
    }

    // =====================================================================
    // Refresh and retry
    // =====================================================================

    #[tokio::test]
    async fn expired_token_is_refreshed_and_request_retried() {
        let (backend, url) = start_backend().await;
        let (client, store) = client_with(&url, stale_admin());

        let v: Value = client.get_json("/echo").await.unwrap();
        assert_eq!(v["authorization"], "Bearer tok-2");
        assert_eq!(backend.refreshes(), 1);
        assert_eq!(store.load(), Session::authenticated(Role::Admin, "tok-2"));

        // Refresh went to the admin family and carried the expired token.
        let seen = backend.refresh_seen.lock().unwrap().clone();
        assert_eq!(seen, vec![("admin".to_string(), Some("stale".to_string()))]);

        // Original request sent once with the stale token, once with the new one.
        let echoes = backend.echo_seen.lock().unwrap().clone();
        assert_eq!(
            echoes,
            vec![Some("Bearer stale".to_string()), Some("Bearer tok-2".to_string())]
        );
    }

    #[tokio::test]
    async fn refresh_uses_endpoint_of_session_role() {
        let (backend, url) = start_backend().await;
        let (client, _store) = client_with(&url, Session::authenticated(Role::Merchant, "old"));

        let _: Value = client.get_json("/echo").await.unwrap();
        let seen = backend.refresh_seen.lock().unwrap().clone();
        assert_eq!(seen[0].0, "merchant");
    }

    #[tokio::test]
    async fn concurrent_401s_share_one_refresh() {
        let (backend, url) = start_backend().await;
        let (client, store) = client_with(&url, stale_admin());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let client = client.clone();
            handles.push(tokio::spawn(async move {
                client.get_json::<Value>("/echo").await
            }));
        }
        for handle in handles {
            let v = handle.await.unwrap().unwrap();
            assert_eq!(v["authorization"], "Bearer tok-2");
        }

        assert_eq!(backend.refreshes(), 1, "exactly one refresh for concurrent expiry");
        assert_eq!(store.load().token(), Some("tok-2"));
    }

    #[tokio::test]
    async fn concurrent_401s_joined_on_one_task() {
        let (backend, url) = start_backend().await;
        let (client, _store) = client_with(&url, stale_admin());

        let calls = (0..5).map(|_| client.get_json::<Value>("/echo"));
        let results = futures::future::join_all(calls).await;
        for r in results {
            assert_eq!(r.unwrap()["authorization"], "Bearer tok-2");
        }
        assert_eq!(backend.refreshes(), 1);
    }

    #[tokio::test]
    async fn next_expiry_cycle_refreshes_again() {
        let (backend, url) = start_backend().await;
        let (client, store) = client_with(&url, stale_admin());

        let _: Value = client.get_json("/echo").await.unwrap();
        // Server rotates the token behind the client's back.
        *backend.valid_token.write().unwrap() = "rotated".to_string();

        let v: Value = client.get_json("/echo").await.unwrap();
        assert_eq!(v["authorization"], "Bearer tok-3");
        assert_eq!(backend.refreshes(), 2);
        assert_eq!(store.load().token(), Some("tok-3"));
    }

    #[tokio::test]
    async fn refresh_rejected_forces_logout() {
        let (backend, url) = start_backend().await;
        backend.set_mode(RefreshMode::Reject);
        let (client, store) = client_with(&url, stale_admin());

        let err = client.get_json::<Value>("/echo").await.unwrap_err();
        assert!(matches!(err, ApiError::SessionExpired(_)), "got: {:?}", err);
        assert!(err.requires_login());
        assert_eq!(store.load(), Session::anonymous());
        assert_eq!(backend.refreshes(), 1);

        // Nothing goes out with the old token afterwards.
        let err = client.get_json::<Value>("/echo").await.unwrap_err();
        match err {
            ApiError::Server { status, .. } => assert_eq!(status, 401),
            other => panic!("expected Server error, got: {:?}", other),
        }
        let echoes = backend.echo_seen.lock().unwrap().clone();
        assert_eq!(echoes, vec![Some("Bearer stale".to_string()), None]);
        assert_eq!(backend.refreshes(), 1);
    }

    #[tokio::test]
    async fn concurrent_waiters_all_observe_failed_refresh() {
        let (backend, url) = start_backend().await;
        backend.set_mode(RefreshMode::Reject);
        let (client, store) = client_with(&url, stale_admin());

        let calls = (0..4).map(|_| client.get_json::<Value>("/echo"));
        for r in futures::future::join_all(calls).await {
            assert!(matches!(r, Err(ApiError::SessionExpired(_))), "got: {:?}", r);
        }
        assert_eq!(backend.refreshes(), 1);
        assert!(!store.load().is_authenticated());
    }

    #[tokio::test]
    async fn malformed_refresh_response_forces_logout() {
        let (backend, url) = start_backend().await;
        backend.set_mode(RefreshMode::Malformed);
        let (client, store) = client_with(&url, stale_admin());

        let err = client.get_json::<Value>("/echo").await.unwrap_err();
        match err {
            ApiError::SessionExpired(msg) => assert!(msg.contains("malformed"), "got: {}", msg),
            other => panic!("expected SessionExpired, got: {:?}", other),
        }
        assert_eq!(store.load(), Session::anonymous());
    }

    #[tokio::test]
    async fn retry_rejected_again_is_final() {
        let (backend, url) = start_backend().await;
        let (client, store) = client_with(&url, stale_admin());

        let err = client.send(&ApiRequest::get("/always-401")).await.unwrap_err();
        assert!(matches!(err, ApiError::SessionExpired(_)), "got: {:?}", err);

        assert_eq!(backend.always_401_hits.load(Ordering::SeqCst), 2, "original + one retry");
        assert_eq!(backend.refreshes(), 1, "no second refresh");
        assert_eq!(store.load(), Session::anonymous());
    }

    #[tokio::test]
    async fn non_401_errors_pass_through_untouched() {
        let (backend, url) = start_backend().await;
        let (client, _store) = client_with(&url, Session::authenticated(Role::Admin, "tok-1"));

        let resp = client.send(&ApiRequest::get("/boom")).await.unwrap();
        assert_eq!(resp.status().as_u16(), 500);

        let err = client.get_json::<Value>("/boom").await.unwrap_err();
        match err {
            ApiError::Server { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "boom");
            }
            other => panic!("expected Server error, got: {:?}", other),
        }
        assert_eq!(backend.refreshes(), 0);
    }

    #[tokio::test]
    async fn anonymous_401_is_not_refreshed() {
        let (backend, url) = start_backend().await;
        let client = AuthClient::new(ClientOptions::new(&url));

        let resp = client.send(&ApiRequest::get("/always-401")).await.unwrap();
        assert_eq!(resp.status().as_u16(), 401);
        assert_eq!(backend.always_401_hits.load(Ordering::SeqCst), 1);
        assert_eq!(backend.refreshes(), 0);
    }

    #[tokio::test]
    async fn network_failure_is_propagated() {
        // Nothing listens on this port once the listener is dropped.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let (client, store) = client_with(&url, stale_admin());
        let err = client.get_json::<Value>("/echo").await.unwrap_err();
        assert!(matches!(err, ApiError::Network(_)), "got: {:?}", err);
        assert_eq!(store.load(), stale_admin(), "transport errors leave the session alone");
    }
}
