pub mod access;
pub mod context;
pub mod login;
pub mod request;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use portal_client::AuthClient;

use crate::config::{ClientConfig, Context, FileSessionStore};

/// Load the current context.
pub fn current_context(client_config_path: &Path) -> Result<Context> {
    let config = ClientConfig::load(client_config_path)?;
    config
        .current()
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("No current context. Run `portal use context <name>`."))
}

/// Client bound to the current context. Token rotations are written back
/// to the config file.
pub fn open(client_config_path: &Path) -> Result<(Context, AuthClient)> {
    let ctx = current_context(client_config_path)?;
    let store = FileSessionStore::new(client_config_path, &ctx);
    let client = AuthClient::with_session(ctx.client_options()?, Arc::new(store));
    Ok((ctx, client))
}

/// Print a JSON value either pretty (`-o json`) or compact.
pub fn print_json(value: &serde_json::Value, json_output: bool) -> Result<()> {
    if json_output {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", value);
    }
    Ok(())
}
