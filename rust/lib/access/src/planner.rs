//! Landing-route resolution.

use portal_client::Role;

use crate::nav::{NavConfig, NavNode};
use crate::resolver::PermissionResolver;

/// Menu entries that are never used as a landing page.
const UTILITY_ITEMS: [&str; 2] = ["Logout", "Profile"];

fn is_eligible<'a>(node: &'a NavNode, has_permission: &impl Fn(&str) -> bool) -> Option<&'a str> {
    let path = node.path.as_deref()?;
    match node.permission.as_deref() {
        None => Some(path),
        Some(permission) if has_permission(permission) => Some(path),
        Some(_) => None,
    }
}

/// First path in declaration order the identity may open.
///
/// Top-level items are checked first; an item without a usable path of
/// its own falls through to its direct sub-items. Deeper levels are not
/// searched. `None` means nothing qualifies.
pub fn find_first_accessible_path<'a, F>(nav: &'a [NavNode], has_permission: F) -> Option<&'a str>
where
    F: Fn(&str) -> bool,
{
    for node in nav {
        if UTILITY_ITEMS.contains(&node.name.as_str()) {
            continue;
        }
        if let Some(path) = is_eligible(node, &has_permission) {
            return Some(path);
        }
        if let Some(path) = node
            .sub_items
            .iter()
            .find_map(|sub| is_eligible(sub, &has_permission))
        {
            return Some(path);
        }
    }
    None
}

/// Computes where an identity lands after login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LandingPlanner {
    /// Fixed landing page for main admins; the nav scan is skipped for them.
    pub main_admin_path: String,
    pub admin_fallback: String,
    pub merchant_fallback: String,
    pub member_fallback: String,
}

impl Default for LandingPlanner {
    fn default() -> Self {
        Self {
            main_admin_path: "/admin/dashboard".to_string(),
            admin_fallback: "/admin/profile".to_string(),
            merchant_fallback: "/merchant/profile".to_string(),
            member_fallback: "/member/profile".to_string(),
        }
    }
}

impl LandingPlanner {
    pub fn fallback(&self, role: Role) -> &str {
        match role {
            Role::Admin => &self.admin_fallback,
            Role::Merchant => &self.merchant_fallback,
            Role::Member => &self.member_fallback,
        }
    }

    pub fn landing_path(&self, resolver: &PermissionResolver, nav: &NavConfig) -> String {
        if resolver.is_main_admin() {
            return self.main_admin_path.clone();
        }
        let role = resolver.role();
        find_first_accessible_path(nav.for_role(role), |p| resolver.has_permission(p))
            .unwrap_or_else(|| self.fallback(role))
            .to_string()
    }
}
