use std::sync::Arc;

use portal_client::Role;

use crate::permission::{PermissionSet, Requirement};
use crate::profile::Profile;

/// Identities that skip permission checks altogether.
///
/// Two business rules live here and nowhere else:
/// - a main admin (admin role, profile `type` = `"admin"`) holds every permission;
/// - members are not permission-gated.
pub struct AccessPolicy;

impl AccessPolicy {
    pub fn always_allow(role: Role, profile: &Profile) -> bool {
        match role {
            Role::Admin => profile.is_main_admin_type(),
            Role::Member => true,
            Role::Merchant => false,
        }
    }
}

/// Answers capability queries for one identity.
///
/// Built from a fresh profile; rebuilt, never mutated, when the profile
/// changes.
#[derive(Debug, Clone)]
pub struct PermissionResolver {
    role: Role,
    profile: Arc<Profile>,
    permissions: PermissionSet,
    always_allow: bool,
}

impl PermissionResolver {
    pub fn new(role: Role, profile: Arc<Profile>) -> Self {
        let always_allow = AccessPolicy::always_allow(role, &profile);
        let permissions = PermissionSet::from_profile(&profile);
        Self {
            role,
            profile,
            permissions,
            always_allow,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn permission_set(&self) -> &PermissionSet {
        &self.permissions
    }

    pub fn is_main_admin(&self) -> bool {
        self.role == Role::Admin && self.profile.is_main_admin_type()
    }

    /// True if the identity may use any of the required permissions.
    ///
    /// An empty requirement is denied unless the identity bypasses checks.
    pub fn has_permission<R: Requirement + ?Sized>(&self, required: &R) -> bool {
        if self.always_allow {
            return true;
        }
        required
            .requested()
            .into_iter()
            .any(|p| self.permissions.allows(p))
    }
}
