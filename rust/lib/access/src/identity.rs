//! Profile lifecycle: fetch on login, publish as [`AccessState`], discard
//! on logout.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use portal_client::{ApiError, AuthClient, Role, Session};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::gate::AccessState;
use crate::nav::NavConfig;
use crate::planner::LandingPlanner;
use crate::profile::Profile;
use crate::resolver::PermissionResolver;

pub struct IdentityService {
    client: AuthClient,
    published: Arc<Published>,
    /// Forwards session clears (including forced logouts inside the
    /// client) to the published state.
    forward: Option<JoinHandle<()>>,
}

struct Published {
    state: watch::Sender<AccessState>,
    /// Bumped by every load and discard; stale loads do not publish.
    generation: AtomicU64,
}

impl Published {
    fn publish(&self, generation: u64, next: AccessState) {
        self.state.send_if_modified(|current| {
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            *current = next;
            true
        });
    }

    /// Drop the profile: in-flight loads are superseded and subscribers
    /// see `Unavailable`.
    fn discard(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.set_unavailable();
    }

    /// [`discard`](Self::discard) unless a load started after `generation`
    /// was read; that load publishes its own outcome.
    fn discard_since(&self, generation: u64) {
        if self
            .generation
            .compare_exchange(generation, generation + 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.set_unavailable();
        }
    }

    fn set_unavailable(&self) {
        self.state.send_if_modified(|current| {
            if matches!(current, AccessState::Unavailable) {
                return false;
            }
            *current = AccessState::Unavailable;
            true
        });
    }
}

impl IdentityService {
    /// A client that already holds a session starts out `Loading`: its
    /// profile is expected to be fetched next.
    ///
    /// Session clears are only forwarded to subscribers when this is
    /// called inside a tokio runtime; [`state`](Self::state) is correct
    /// either way.
    pub fn new(client: AuthClient) -> Self {
        let initial = if client.session().is_authenticated() {
            AccessState::Loading
        } else {
            AccessState::Unavailable
        };
        let (state, _) = watch::channel(initial);
        let published = Arc::new(Published {
            state,
            generation: AtomicU64::new(0),
        });
        let forward = forward_session_clears(&client, &published);
        Self {
            client,
            published,
            forward,
        }
    }

    pub fn client(&self) -> &AuthClient {
        &self.client
    }

    /// Current permission data. Never outlives the session: once the
    /// client is signed out (including a forced logout after a failed
    /// refresh) this is `Unavailable`.
    pub fn state(&self) -> AccessState {
        if !self.client.session().is_authenticated() {
            return AccessState::Unavailable;
        }
        self.published.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AccessState> {
        self.published.state.subscribe()
    }

    pub async fn login<C: Serialize + ?Sized>(
        &self,
        role: Role,
        credentials: &C,
    ) -> Result<Arc<PermissionResolver>, ApiError> {
        self.client.login(role, credentials).await?;
        self.load_profile().await
    }

    pub async fn logout(&self) {
        self.published.discard();
        self.client.logout().await;
    }

    /// Fetch the profile and rebuild the resolver. `Loading` is published
    /// for the duration of the fetch.
    pub async fn load_profile(&self) -> Result<Arc<PermissionResolver>, ApiError> {
        let generation = self.published.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.published.publish(generation, AccessState::Loading);

        match self.fetch().await {
            Ok(resolver) => {
                debug!(
                    role = %resolver.role(),
                    permissions = resolver.permission_set().len(),
                    main_admin = resolver.is_main_admin(),
                    "profile loaded"
                );
                self.published
                    .publish(generation, AccessState::Ready(Arc::clone(&resolver)));
                Ok(resolver)
            }
            Err(e) => {
                warn!(error = %e, "profile fetch failed");
                self.published.publish(generation, AccessState::Unavailable);
                Err(e)
            }
        }
    }

    /// Landing route for the loaded identity; `None` until a profile is ready.
    pub fn landing_path(&self, planner: &LandingPlanner, nav: &NavConfig) -> Option<String> {
        self.state()
            .resolver()
            .map(|resolver| planner.landing_path(resolver, nav))
    }

    async fn fetch(&self) -> Result<Arc<PermissionResolver>, ApiError> {
        let session: Session = self.client.session();
        let role = session.role().ok_or(ApiError::NotAuthenticated)?;
        let profile: Profile = self.client.who_am_i().await?;
        Ok(Arc::new(PermissionResolver::new(role, Arc::new(profile))))
    }
}

impl Drop for IdentityService {
    fn drop(&mut self) {
        if let Some(forward) = self.forward.take() {
            forward.abort();
        }
    }
}

fn forward_session_clears(client: &AuthClient, published: &Arc<Published>) -> Option<JoinHandle<()>> {
    let runtime = tokio::runtime::Handle::try_current().ok()?;
    let mut changes = client.session_changes();
    let published = Arc::downgrade(published);
    Some(runtime.spawn(async move {
        while changes.changed().await.is_ok() {
            let Some(published) = published.upgrade() else {
                break;
            };
            let generation = published.generation.load(Ordering::SeqCst);
            if changes.borrow_and_update().is_authenticated() {
                continue;
            }
            debug!("session cleared, discarding profile");
            published.discard_since(generation);
        }
    }))
}
