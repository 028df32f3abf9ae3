//! Client-side context management.
//!
//! Reads/writes `~/.portal/config.toml`. The active context's token is the
//! persisted half of the session.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use portal_access::NavConfig;
use portal_client::{ClientOptions, Role, RoleEndpointMap, Session, SessionStore};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A single context: connection to one portal backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Context {
    /// Context name (e.g. "shop-stage").
    pub name: String,

    /// Server URL (e.g. "http://localhost:8080").
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub server: String,

    /// Endpoint family used to log in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,

    /// API prefix in front of `/{role}/...` (e.g. "/api/v1").
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_prefix: String,

    /// Path to the navigation tree file (TOML or JSON).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub nav: String,

    /// Bearer token (set by `portal login`, rotated on refresh).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub token: String,
}

impl Context {
    pub fn client_options(&self) -> anyhow::Result<ClientOptions> {
        if self.server.is_empty() {
            anyhow::bail!(
                "No server URL set for context \"{}\". Run `portal context set {} --server <url>`.",
                self.name,
                self.name
            );
        }
        Ok(ClientOptions {
            base_url: self.server.clone(),
            endpoints: RoleEndpointMap::with_prefix(&self.api_prefix),
        })
    }

    /// Session persisted in this context.
    pub fn session(&self) -> Session {
        match self.role {
            Some(role) if !self.token.is_empty() => Session::authenticated(role, self.token.clone()),
            _ => Session::anonymous(),
        }
    }

    /// Navigation trees for this context; empty when none is configured.
    pub fn nav_config(&self) -> anyhow::Result<NavConfig> {
        if self.nav.is_empty() {
            return Ok(NavConfig::default());
        }
        Ok(NavConfig::load(Path::new(&self.nav))?)
    }
}

/// Client configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Name of the currently active context.
    #[serde(rename = "current-context", default)]
    pub current_context: String,

    /// List of configured contexts.
    #[serde(default)]
    pub contexts: Vec<Context>,
}

impl ClientConfig {
    /// Default config file path: ~/.portal/config.toml.
    pub fn default_path() -> PathBuf {
        dirs_path().join("config.toml")
    }

    /// Load config from disk, or return default if file doesn't exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: ClientConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save config to disk.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the currently active context, if any.
    pub fn current(&self) -> Option<&Context> {
        self.contexts.iter().find(|c| c.name == self.current_context)
    }

    /// Get a mutable reference to a context by name.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Context> {
        self.contexts.iter_mut().find(|c| c.name == name)
    }

    /// Get a context by name, creating an empty one if missing.
    pub fn get_or_insert(&mut self, name: &str) -> &mut Context {
        if let Some(idx) = self.contexts.iter().position(|c| c.name == name) {
            return &mut self.contexts[idx];
        }
        self.contexts.push(Context {
            name: name.to_string(),
            ..Default::default()
        });
        let last = self.contexts.len() - 1;
        &mut self.contexts[last]
    }

    /// Remove a context by name. Returns true if it was found.
    pub fn remove_context(&mut self, name: &str) -> bool {
        let len = self.contexts.len();
        self.contexts.retain(|c| c.name != name);
        if self.current_context == name {
            self.current_context = String::new();
        }
        self.contexts.len() < len
    }
}

/// Return the portal config directory (~/.portal).
fn dirs_path() -> PathBuf {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".portal")
}

/// Session store that writes every token change back into one context of
/// the config file, so a refreshed token survives the process.
pub struct FileSessionStore {
    path: PathBuf,
    context: String,
    current: Mutex<Session>,
}

impl FileSessionStore {
    pub fn new(path: &Path, context: &Context) -> Self {
        Self {
            path: path.to_path_buf(),
            context: context.name.clone(),
            current: Mutex::new(context.session()),
        }
    }

    fn persist(&self, session: &Session) {
        if let Err(e) = self.write(session) {
            warn!(path = %self.path.display(), error = %e, "failed to persist session");
        }
    }

    fn write(&self, session: &Session) -> anyhow::Result<()> {
        let mut config = ClientConfig::load(&self.path)?;
        let ctx = config
            .get_mut(&self.context)
            .ok_or_else(|| anyhow::anyhow!("context \"{}\" disappeared", self.context))?;
        ctx.token = session.token().unwrap_or_default().to_string();
        if let Some(role) = session.role() {
            ctx.role = Some(role);
        }
        config.save(&self.path)
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Session {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn save(&self, session: Session) {
        let mut guard = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        self.persist(&session);
        *guard = session;
    }

    fn replace_if(&self, expected: Option<&str>, next: Session) -> bool {
        let mut guard = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.token() != expected {
            return false;
        }
        self.persist(&next);
        *guard = next;
        true
    }
}
