//! Login / logout commands.

use std::path::Path;

use anyhow::Result;
use portal_client::Role;

use crate::commands;

/// Login to the current context's server as `role`.
///
/// Falls back to the context's role when none is given. The token is
/// persisted through the context's session store.
pub async fn login(
    role: Option<Role>,
    login_field: &str,
    user: &str,
    password: &str,
    client_config_path: &Path,
) -> Result<()> {
    let (ctx, client) = commands::open(client_config_path)?;
    let role = role.or(ctx.role).ok_or_else(|| {
        anyhow::anyhow!(
            "No role given. Pass --role or run `portal context set {} --role <admin|merchant|member>`.",
            ctx.name
        )
    })?;

    let mut credentials = serde_json::Map::new();
    credentials.insert(login_field.to_string(), user.into());
    credentials.insert("password".to_string(), password.into());

    client
        .login(role, &credentials)
        .await
        .map_err(|e| anyhow::anyhow!("Login failed: {}", e))?;

    println!("Logged in as {} ({}).", user, role);
    println!("Token saved to context \"{}\".", ctx.name);
    Ok(())
}

/// Logout: notify the server, then clear the token from the current context.
pub async fn logout(client_config_path: &Path) -> Result<()> {
    let (ctx, client) = commands::open(client_config_path)?;
    if !client.session().is_authenticated() {
        println!("Context \"{}\" is not logged in.", ctx.name);
        return Ok(());
    }
    client.logout().await;
    println!("Logged out from context \"{}\".", ctx.name);
    Ok(())
}
