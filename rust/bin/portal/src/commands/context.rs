//! Context management commands.

use std::path::Path;

use anyhow::Result;
use portal_client::Role;

use crate::config::ClientConfig;

/// Properties accepted by `portal context set`.
#[derive(Debug, Default)]
pub struct ContextUpdate {
    pub server: Option<String>,
    pub role: Option<Role>,
    pub api_prefix: Option<String>,
    pub nav: Option<String>,
}

/// List all contexts.
pub fn list(client_config_path: &Path) -> Result<()> {
    let config = ClientConfig::load(client_config_path)?;

    if config.contexts.is_empty() {
        println!("No contexts configured.");
        println!("Run: portal context set <name> --server <url>");
        return Ok(());
    }

    println!("{:2} {:20} {:40} {:10} {:6}", "", "NAME", "SERVER", "ROLE", "LOGIN");
    for ctx in &config.contexts {
        let marker = if ctx.name == config.current_context { "*" } else { "" };
        let server = if ctx.server.is_empty() { "-" } else { &ctx.server };
        let role = ctx.role.map(|r| r.as_str()).unwrap_or("-");
        let login = if ctx.session().is_authenticated() { "yes" } else { "no" };
        println!("{:2} {:20} {:40} {:10} {:6}", marker, ctx.name, server, role, login);
    }

    Ok(())
}

/// Switch the current context.
pub fn use_context(name: &str, client_config_path: &Path) -> Result<()> {
    let mut config = ClientConfig::load(client_config_path)?;

    if !config.contexts.iter().any(|c| c.name == name) {
        anyhow::bail!("Context \"{}\" not found. Run `portal context list` to see available contexts.", name);
    }

    config.current_context = name.to_string();
    config.save(client_config_path)?;
    println!("Switched to context \"{}\".", name);
    Ok(())
}

/// Create or update a context. The first context created becomes current.
pub fn set(name: &str, update: ContextUpdate, client_config_path: &Path) -> Result<()> {
    let mut config = ClientConfig::load(client_config_path)?;
    let created = !config.contexts.iter().any(|c| c.name == name);

    let ctx = config.get_or_insert(name);
    if let Some(server) = update.server {
        ctx.server = server;
    }
    if let Some(role) = update.role {
        if ctx.role.is_some_and(|r| r != role) {
            // A token is only valid for the endpoint family that issued it.
            ctx.token = String::new();
        }
        ctx.role = Some(role);
    }
    if let Some(prefix) = update.api_prefix {
        ctx.api_prefix = prefix;
    }
    if let Some(nav) = update.nav {
        ctx.nav = nav;
    }

    if config.current_context.is_empty() {
        config.current_context = name.to_string();
    }
    config.save(client_config_path)?;

    if created {
        println!("Context \"{}\" created.", name);
    } else {
        println!("Context \"{}\" updated.", name);
    }
    Ok(())
}

/// Delete a context.
pub fn delete(name: &str, client_config_path: &Path) -> Result<()> {
    let mut config = ClientConfig::load(client_config_path)?;

    if !config.remove_context(name) {
        anyhow::bail!("Context \"{}\" not found.", name);
    }

    config.save(client_config_path)?;
    println!("Context \"{}\" deleted.", name);
    Ok(())
}
