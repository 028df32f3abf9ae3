//! Raw authenticated requests.
//!
//! `portal get /admin/products`, `portal post /admin/products --json '{...}'`.
//! Requests go through the refresh-and-retry path like any other call.

use std::path::Path;

use anyhow::Result;
use portal_client::{ApiError, ApiRequest, AuthClient};
use reqwest::Method;

use crate::commands;

/// Split `key=value` query arguments.
fn parse_query(args: &[String]) -> Result<Vec<(String, String)>> {
    args.iter()
        .map(|arg| {
            arg.split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .ok_or_else(|| anyhow::anyhow!("Invalid query \"{}\": expected key=value.", arg))
        })
        .collect()
}

fn with_hint(e: ApiError) -> anyhow::Error {
    if e.requires_login() {
        anyhow::anyhow!("{}. Run `portal login`.", e)
    } else {
        anyhow::Error::new(e)
    }
}

async fn execute(client: &AuthClient, request: ApiRequest, json_output: bool) -> Result<()> {
    let resp = client.send(&request).await.map_err(with_hint)?;
    let resp = AuthClient::check(resp).await.map_err(with_hint)?;

    let text = resp.text().await?;
    if text.trim().is_empty() {
        println!("OK.");
        return Ok(());
    }
    match serde_json::from_str::<serde_json::Value>(&text) {
        Ok(value) => commands::print_json(&value, json_output),
        Err(_) => {
            println!("{}", text);
            Ok(())
        }
    }
}

/// Send a request to `path` on the current context's server.
pub async fn run(
    method: Method,
    path: &str,
    query: &[String],
    body: Option<&str>,
    json_output: bool,
    client_config_path: &Path,
) -> Result<()> {
    let (_ctx, client) = commands::open(client_config_path)?;

    let mut request = ApiRequest::new(method, path);
    for (k, v) in parse_query(query)? {
        request = request.query(k, v);
    }
    if let Some(body) = body {
        let value: serde_json::Value =
            serde_json::from_str(body).map_err(|e| anyhow::anyhow!("Invalid JSON body: {}", e))?;
        request = request.json(&value)?;
    }

    execute(&client, request, json_output).await
}
