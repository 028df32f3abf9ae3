use std::sync::Arc;

use crate::permission::Requirement;
use crate::resolver::PermissionResolver;

/// Permission data as seen by the UI.
#[derive(Debug, Clone, Default)]
pub enum AccessState {
    /// A profile fetch is in flight; nothing can be decided yet.
    Loading,
    Ready(Arc<PermissionResolver>),
    /// Signed out, or the profile could not be fetched. Denies everything.
    #[default]
    Unavailable,
}

/// Outcome of a capability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Pending,
    Granted,
    Denied,
}

impl AccessState {
    pub fn is_loading(&self) -> bool {
        matches!(self, AccessState::Loading)
    }

    pub fn resolver(&self) -> Option<&Arc<PermissionResolver>> {
        match self {
            AccessState::Ready(resolver) => Some(resolver),
            _ => None,
        }
    }

    pub fn decide<R: Requirement + ?Sized>(&self, required: &R) -> AccessDecision {
        match self {
            AccessState::Loading => AccessDecision::Pending,
            AccessState::Ready(resolver) if resolver.has_permission(required) => {
                AccessDecision::Granted
            }
            AccessState::Ready(_) | AccessState::Unavailable => AccessDecision::Denied,
        }
    }
}

/// Guard that withholds privileged content.
///
/// While permission data is loading neither the content nor the fallback
/// is produced, so privileged controls never flash before the profile
/// arrives.
pub struct AccessGate<'a> {
    state: &'a AccessState,
}

impl<'a> AccessGate<'a> {
    pub fn new(state: &'a AccessState) -> Self {
        Self { state }
    }

    /// `children` when granted, `fallback` when denied, nothing while pending.
    pub fn render<R, T, C, F>(&self, required: &R, children: C, fallback: F) -> Option<T>
    where
        R: Requirement + ?Sized,
        C: FnOnce() -> T,
        F: FnOnce() -> Option<T>,
    {
        match self.state.decide(required) {
            AccessDecision::Pending => None,
            AccessDecision::Granted => Some(children()),
            AccessDecision::Denied => fallback(),
        }
    }

    /// [`render`](Self::render) without a fallback.
    pub fn show<R, T, C>(&self, required: &R, children: C) -> Option<T>
    where
        R: Requirement + ?Sized,
        C: FnOnce() -> T,
    {
        self.render(required, children, || None)
    }
}
