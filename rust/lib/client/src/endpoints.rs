//! Role → endpoint lookup.
//!
//! Every role has its own login/logout/who-am-i/refresh family. Callers
//! resolve paths here instead of branching on the role themselves.

use serde::{Deserialize, Serialize};

use crate::role::Role;

/// Authentication endpoint paths for one role. Paths are relative to the
/// client's base URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSet {
    pub login: String,
    pub logout: String,
    pub who_am_i: String,
    pub refresh: String,
}

impl EndpointSet {
    /// `/{role}/login`, `/{role}/logout`, `/{role}/me`, `/{role}/refresh`
    /// under an optional prefix.
    pub fn for_role(prefix: &str, role: Role) -> Self {
        let base = format!("{}/{}", prefix.trim_end_matches('/'), role.as_str());
        Self {
            login: format!("{}/login", base),
            logout: format!("{}/logout", base),
            who_am_i: format!("{}/me", base),
            refresh: format!("{}/refresh", base),
        }
    }
}

/// Exactly one [`EndpointSet`] per [`Role`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleEndpointMap {
    pub admin: EndpointSet,
    pub merchant: EndpointSet,
    pub member: EndpointSet,
}

impl RoleEndpointMap {
    /// The standard `/{role}/...` layout.
    pub fn standard() -> Self {
        Self::with_prefix("")
    }

    /// The standard layout mounted under an API prefix such as `/api/v1`.
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            admin: EndpointSet::for_role(prefix, Role::Admin),
            merchant: EndpointSet::for_role(prefix, Role::Merchant),
            member: EndpointSet::for_role(prefix, Role::Member),
        }
    }

    pub fn get(&self, role: Role) -> &EndpointSet {
        match role {
            Role::Admin => &self.admin,
            Role::Merchant => &self.merchant,
            Role::Member => &self.member,
        }
    }
}

impl Default for RoleEndpointMap {
    fn default() -> Self {
        Self::standard()
    }
}
