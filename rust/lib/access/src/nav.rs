//! Per-role navigation trees.
//!
//! The same ordered tree drives the rendered menu and landing-route
//! resolution, so declaration order matters.

use std::path::Path;

use portal_client::Role;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavNode {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_items: Vec<NavNode>,
}

impl NavNode {
    pub fn link(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: Some(path.into()),
            permission: None,
            sub_items: Vec::new(),
        }
    }

    pub fn group(name: impl Into<String>, sub_items: Vec<NavNode>) -> Self {
        Self {
            name: name.into(),
            path: None,
            permission: None,
            sub_items,
        }
    }

    pub fn requires(mut self, permission: impl Into<String>) -> Self {
        self.permission = Some(permission.into());
        self
    }
}

#[derive(Debug, Error)]
pub enum NavConfigError {
    #[error("read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parse {path}: {message}")]
    Parse { path: String, message: String },
}

/// Static navigation configuration, one tree per role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavConfig {
    #[serde(default)]
    pub admin: Vec<NavNode>,
    #[serde(default)]
    pub merchant: Vec<NavNode>,
    #[serde(default)]
    pub member: Vec<NavNode>,
}

impl NavConfig {
    pub fn for_role(&self, role: Role) -> &[NavNode] {
        match role {
            Role::Admin => &self.admin,
            Role::Merchant => &self.merchant,
            Role::Member => &self.member,
        }
    }

    /// Load from a `.json` file, or TOML for any other extension.
    pub fn load(path: &Path) -> Result<Self, NavConfigError> {
        let display = path.display().to_string();
        let content = std::fs::read_to_string(path).map_err(|source| NavConfigError::Io {
            path: display.clone(),
            source,
        })?;

        let is_json = path.extension().is_some_and(|ext| ext == "json");
        let parsed = if is_json {
            serde_json::from_str(&content).map_err(|e| e.to_string())
        } else {
            toml::from_str(&content).map_err(|e| e.to_string())
        };
        parsed.map_err(|message| NavConfigError::Parse {
            path: display,
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[[admin]]
name = "Dashboard"
path = "/admin/dashboard"
permission = "admin.dashboard"

[[admin]]
name = "Catalog"

[[admin.subItems]]
name = "Attributes"
path = "/admin/catalog/attributes"
permission = "admin.e-commerce.attribute"

[[member]]
name = "Rewards"
path = "/member/rewards"
"#;

    #[test]
    fn parse_toml_tree() {
        let config: NavConfig = toml::from_str(SAMPLE).unwrap();
        let admin = config.for_role(Role::Admin);
        assert_eq!(admin.len(), 2);
        assert_eq!(admin[0].permission.as_deref(), Some("admin.dashboard"));
        assert_eq!(admin[1].path, None);
        assert_eq!(admin[1].sub_items[0].name, "Attributes");
        assert!(config.for_role(Role::Merchant).is_empty());
        assert_eq!(config.for_role(Role::Member)[0].path.as_deref(), Some("/member/rewards"));
    }

    #[test]
    fn parse_json_tree_with_camel_case() {
        let json = r#"{"merchant": [{"name": "Shop", "subItems": [{"name": "Products", "path": "/merchant/products"}]}]}"#;
        let config: NavConfig = serde_json::from_str(json).unwrap();
        assert_eq!(
            config.for_role(Role::Merchant)[0].sub_items[0],
            NavNode::link("Products", "/merchant/products")
        );
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nav.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        let config = NavConfig::load(&path).unwrap();
        assert_eq!(config.admin.len(), 2);
    }

    #[test]
    fn load_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nav.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = NavConfig::load(&path).unwrap_err();
        assert!(matches!(err, NavConfigError::Parse { .. }), "got: {:?}", err);
    }

    #[test]
    fn load_missing_file() {
        let err = NavConfig::load(Path::new("/nonexistent/nav.toml")).unwrap_err();
        assert!(matches!(err, NavConfigError::Io { .. }), "got: {:?}", err);
    }
}
