use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::watch;

use crate::role::Role;

/// Current identity of the client.
///
/// Fields are private: a session is either anonymous or carries both a
/// role and a bearer token, so `is_authenticated()` always agrees with
/// the presence of a token.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Session {
    role: Option<Role>,
    token: Option<String>,
}

impl Session {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticated(role: Role, token: impl Into<String>) -> Self {
        Self {
            role: Some(role),
            token: Some(token.into()),
        }
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }
}

/// Holder of the shared [`Session`].
///
/// Written only by login, token refresh and logout. Every write replaces
/// the whole value, so readers never see a new token paired with a stale
/// role.
pub trait SessionStore: Send + Sync + 'static {
    /// Snapshot of the current session.
    fn load(&self) -> Session;

    /// Replace the session unconditionally.
    fn save(&self, session: Session);

    /// Replace the session only if its current token equals `expected`.
    /// Returns whether the replacement happened.
    fn replace_if(&self, expected: Option<&str>, next: Session) -> bool;

    fn clear(&self) {
        self.save(Session::anonymous());
    }
}

/// In-process session store.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    current: RwLock<Session>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: Session) -> Self {
        Self {
            current: RwLock::new(session),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Session {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn save(&self, session: Session) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = session;
    }

    fn replace_if(&self, expected: Option<&str>, next: Session) -> bool {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        if guard.token() != expected {
            return false;
        }
        *guard = next;
        true
    }
}

/// Wraps the caller's store and broadcasts every session write.
///
/// The inner write happens inside the channel's write lock, so
/// subscribers observe writes in the order the store applied them.
pub(crate) struct ObservedSession {
    inner: Arc<dyn SessionStore>,
    changes: watch::Sender<Session>,
}

impl ObservedSession {
    pub(crate) fn new(inner: Arc<dyn SessionStore>) -> Self {
        let (changes, _) = watch::channel(inner.load());
        Self { inner, changes }
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Session> {
        self.changes.subscribe()
    }
}

impl SessionStore for ObservedSession {
    fn load(&self) -> Session {
        self.inner.load()
    }

    fn save(&self, session: Session) {
        self.changes.send_modify(|current| {
            self.inner.save(session.clone());
            *current = session;
        });
    }

    fn replace_if(&self, expected: Option<&str>, next: Session) -> bool {
        self.changes.send_if_modified(|current| {
            if !self.inner.replace_if(expected, next.clone()) {
                return false;
            }
            *current = next;
            true
        })
    }
}
