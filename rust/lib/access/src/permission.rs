//! Permission strings and sets.
//!
//! A permission is a dot-delimited capability id such as
//! `admin.e-commerce.attribute.create`. Holding a permission grants it
//! and everything below it in the dot hierarchy: `admin.catalog` grants
//! `admin.catalog.create`, but not `admin.catalogs` and not `admin`.

use std::collections::BTreeSet;

use crate::profile::Profile;

/// True if `held` equals `required` or is one of its dot-ancestors.
pub fn grants(held: &str, required: &str) -> bool {
    match required.strip_prefix(held) {
        Some("") => true,
        Some(rest) => !held.is_empty() && rest.starts_with('.'),
        None => false,
    }
}

/// Deduplicated, immutable set of held permissions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSet {
    names: BTreeSet<String>,
}

impl PermissionSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Union of every `roles[].permissions[].name` and every
    /// `permissions[]` entry of the profile.
    pub fn from_profile(profile: &Profile) -> Self {
        let from_roles = profile
            .roles
            .iter()
            .flat_map(|r| r.permissions.iter().map(|p| p.name.as_str()));
        let direct = profile.permissions.iter().map(|p| p.name());
        from_roles.chain(direct).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// True if any held permission grants `required`.
    pub fn allows(&self, required: &str) -> bool {
        !required.is_empty() && self.iter().any(|held| grants(held, required))
    }
}

impl<S: Into<String>> FromIterator<S> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// One or more required permissions. Access is granted when any of them
/// is allowed.
pub trait Requirement {
    fn requested(&self) -> Vec<&str>;
}

impl Requirement for str {
    fn requested(&self) -> Vec<&str> {
        vec![self]
    }
}

impl Requirement for String {
    fn requested(&self) -> Vec<&str> {
        vec![self.as_str()]
    }
}

impl<S: AsRef<str>> Requirement for [S] {
    fn requested(&self) -> Vec<&str> {
        self.iter().map(AsRef::as_ref).collect()
    }
}

impl<S: AsRef<str>, const N: usize> Requirement for [S; N] {
    fn requested(&self) -> Vec<&str> {
        self.iter().map(AsRef::as_ref).collect()
    }
}

impl<S: AsRef<str>> Requirement for Vec<S> {
    fn requested(&self) -> Vec<&str> {
        self.iter().map(AsRef::as_ref).collect()
    }
}

impl<R: Requirement + ?Sized> Requirement for &R {
    fn requested(&self) -> Vec<&str> {
        (**self).requested()
    }
}
