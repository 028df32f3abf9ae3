//! Identity and permission inspection.
//!
//! `portal whoami`, `portal can admin.e-commerce.attribute.create`,
//! `portal landing`.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use portal_access::{AccessGate, IdentityService, LandingPlanner, PermissionResolver};

use crate::commands;

async fn resolve(client_config_path: &Path) -> Result<(IdentityService, Arc<PermissionResolver>)> {
    let (ctx, client) = commands::open(client_config_path)?;
    if !client.session().is_authenticated() {
        anyhow::bail!("Context \"{}\" is not logged in. Run `portal login`.", ctx.name);
    }
    let identity = IdentityService::new(client);
    let resolver = identity.load_profile().await.map_err(|e| {
        if e.requires_login() {
            anyhow::anyhow!("Session expired for context \"{}\". Run `portal login`.", ctx.name)
        } else {
            anyhow::anyhow!("Failed to load profile: {}", e)
        }
    })?;
    Ok((identity, resolver))
}

/// Show the signed-in identity.
pub async fn whoami(json_output: bool, client_config_path: &Path) -> Result<()> {
    let (_identity, resolver) = resolve(client_config_path).await?;

    if json_output {
        let profile = serde_json::to_value(resolver.profile())?;
        return commands::print_json(&profile, true);
    }

    println!("Role:        {}", resolver.role());
    println!("Type:        {}", resolver.profile().kind.as_deref().unwrap_or("-"));
    println!("Main admin:  {}", if resolver.is_main_admin() { "yes" } else { "no" });
    if resolver.permission_set().is_empty() {
        println!("Permissions: -");
    } else {
        println!("Permissions:");
        for p in resolver.permission_set().iter() {
            println!("  {}", p);
        }
    }
    Ok(())
}

/// Check permissions. Succeeds when any of them is granted.
pub async fn can(permissions: &[String], client_config_path: &Path) -> Result<()> {
    let (identity, resolver) = resolve(client_config_path).await?;

    for p in permissions {
        let verdict = if resolver.has_permission(p.as_str()) { "granted" } else { "denied" };
        println!("{:50} {}", p, verdict);
    }

    let state = identity.state();
    let gate = AccessGate::new(&state);
    if gate.show(permissions, || ()).is_none() {
        anyhow::bail!("Access denied.");
    }
    Ok(())
}

/// Print the landing route for the signed-in identity.
pub async fn landing(client_config_path: &Path) -> Result<()> {
    let ctx = commands::current_context(client_config_path)?;
    let nav = ctx.nav_config()?;
    let (identity, _resolver) = resolve(client_config_path).await?;

    let path = identity
        .landing_path(&LandingPlanner::default(), &nav)
        .ok_or_else(|| anyhow::anyhow!("Profile is not available."))?;
    println!("{}", path);
    Ok(())
}
