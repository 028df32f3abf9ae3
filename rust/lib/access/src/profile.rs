//! Identity document returned by the who-am-i endpoint.

use serde::{Deserialize, Deserializer, Serialize};

/// Value of `type` that marks a main (super) admin.
pub const MAIN_ADMIN_TYPE: &str = "admin";

/// Server-returned identity. Only the fields the access layer reads are
/// typed; everything else (`member_type`, names, ...) lands in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub roles: Vec<RoleGrant>,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub permissions: Vec<PermissionRef>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Profile {
    pub fn is_main_admin_type(&self) -> bool {
        self.kind.as_deref() == Some(MAIN_ADMIN_TYPE)
    }

    /// Look up an untyped field such as `member_type`.
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.extra.get(name)
    }
}

/// A role assigned to a staff or merchant account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoleGrant {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub permissions: Vec<NamedPermission>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedPermission {
    pub name: String,
}

/// A direct permission: either a bare string or an object with `name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PermissionRef {
    Name(String),
    Object(NamedPermission),
}

impl PermissionRef {
    pub fn name(&self) -> &str {
        match self {
            PermissionRef::Name(name) => name,
            PermissionRef::Object(p) => &p.name,
        }
    }
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
