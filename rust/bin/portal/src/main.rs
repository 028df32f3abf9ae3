//! `portal`: command-line client for the role-partitioned portal API.
//!
//! Manages contexts, logs in against the admin/merchant/member endpoint
//! families, and sends authenticated requests with transparent token
//! refresh.

mod commands;
mod config;

use clap::{Parser, Subcommand};
use portal_client::Role;
use reqwest::Method;
use tracing_subscriber::EnvFilter;

/// Portal CLI tool.
#[derive(Parser, Debug)]
#[command(name = "portal", about = "Portal API client")]
struct Cli {
    /// Path to client config file (default: ~/.portal/config.toml).
    #[arg(long = "config", global = true)]
    config: Option<String>,

    /// Output format: table or json.
    #[arg(long = "output", short = 'o', global = true, default_value = "table")]
    output: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage contexts.
    #[command(name = "context")]
    Context {
        #[command(subcommand)]
        action: ContextAction,
    },

    /// Switch the current context.
    #[command(name = "use")]
    Use {
        #[command(subcommand)]
        what: UseWhat,
    },

    /// Login to the current context's server.
    Login {
        /// Endpoint family (admin, merchant or member). Defaults to the context's role.
        #[arg(long)]
        role: Option<Role>,
        /// Login identifier (email or phone).
        #[arg(long)]
        user: Option<String>,
        /// Credential field the identifier is sent as.
        #[arg(long, default_value = "email")]
        login_field: String,
        /// Password (not recommended, use the interactive prompt).
        #[arg(long)]
        password: Option<String>,
    },

    /// Logout and clear the token from the current context.
    Logout,

    /// Show the signed-in identity.
    Whoami,

    /// Check whether the signed-in identity holds any of the given permissions.
    Can {
        #[arg(required = true)]
        permissions: Vec<String>,
    },

    /// Print the landing route for the signed-in identity.
    Landing,

    /// GET an API path.
    Get {
        path: String,
        /// Query parameters as key=value.
        #[arg(long = "query", short = 'q')]
        query: Vec<String>,
    },

    /// POST a JSON body to an API path.
    Post {
        path: String,
        /// JSON body.
        #[arg(long = "json")]
        json_body: Option<String>,
        /// Read JSON from file.
        #[arg(short = 'f', long = "file")]
        file: Option<String>,
    },

    /// PUT a JSON body to an API path.
    Put {
        path: String,
        /// JSON body.
        #[arg(long = "json")]
        json_body: Option<String>,
        /// Read JSON from file.
        #[arg(short = 'f', long = "file")]
        file: Option<String>,
    },

    /// DELETE an API path.
    Delete {
        path: String,
        /// Skip confirmation.
        #[arg(long = "yes", short = 'y')]
        yes: bool,
    },

    /// Show version.
    Version,
}

#[derive(Subcommand, Debug)]
enum ContextAction {
    /// List all contexts.
    List,
    /// Create a context or set properties on it.
    Set {
        name: String,
        #[arg(long)]
        server: Option<String>,
        #[arg(long)]
        role: Option<Role>,
        /// Prefix in front of `/{role}/...` (e.g. /api/v1).
        #[arg(long)]
        api_prefix: Option<String>,
        /// Navigation tree file (TOML or JSON).
        #[arg(long)]
        nav: Option<String>,
    },
    /// Delete a context.
    Delete { name: String },
}

#[derive(Subcommand, Debug)]
enum UseWhat {
    /// Switch to a context.
    Context { name: String },
}

fn read_body(json_body: Option<String>, file: Option<String>) -> anyhow::Result<String> {
    if let Some(path) = file {
        Ok(std::fs::read_to_string(&path)?)
    } else if let Some(json) = json_body {
        Ok(json)
    } else {
        anyhow::bail!("Provide --json or -f <file>.");
    }
}

fn prompt_line(prompt: &str) -> anyhow::Result<String> {
    eprint!("{}", prompt);
    let mut s = String::new();
    std::io::stdin().read_line(&mut s)?;
    Ok(s.trim().to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let json_output = cli.output == "json";

    let config_path = cli
        .config
        .map(std::path::PathBuf::from)
        .unwrap_or_else(config::ClientConfig::default_path);

    match cli.command {
        Commands::Context { action } => match action {
            ContextAction::List => {
                commands::context::list(&config_path)?;
            }
            ContextAction::Set {
                name,
                server,
                role,
                api_prefix,
                nav,
            } => {
                let update = commands::context::ContextUpdate {
                    server,
                    role,
                    api_prefix,
                    nav,
                };
                commands::context::set(&name, update, &config_path)?;
            }
            ContextAction::Delete { name } => {
                commands::context::delete(&name, &config_path)?;
            }
        },

        Commands::Use { what } => match what {
            UseWhat::Context { name } => {
                commands::context::use_context(&name, &config_path)?;
            }
        },

        Commands::Login {
            role,
            user,
            login_field,
            password,
        } => {
            let user = match user {
                Some(u) => u,
                None => prompt_line(&format!("{}: ", login_field))?,
            };
            let password = match password {
                Some(p) => p,
                None => rpassword::prompt_password("Password: ")?,
            };
            if user.is_empty() || password.is_empty() {
                anyhow::bail!("Login identifier and password cannot be empty.");
            }
            commands::login::login(role, &login_field, &user, &password, &config_path).await?;
        }

        Commands::Logout => {
            commands::login::logout(&config_path).await?;
        }

        Commands::Whoami => {
            commands::access::whoami(json_output, &config_path).await?;
        }

        Commands::Can { permissions } => {
            commands::access::can(&permissions, &config_path).await?;
        }

        Commands::Landing => {
            commands::access::landing(&config_path).await?;
        }

        Commands::Get { path, query } => {
            commands::request::run(Method::GET, &path, &query, None, json_output, &config_path)
                .await?;
        }

        Commands::Post {
            path,
            json_body,
            file,
        } => {
            let body = read_body(json_body, file)?;
            commands::request::run(Method::POST, &path, &[], Some(&body), json_output, &config_path)
                .await?;
        }

        Commands::Put {
            path,
            json_body,
            file,
        } => {
            let body = read_body(json_body, file)?;
            commands::request::run(Method::PUT, &path, &[], Some(&body), json_output, &config_path)
                .await?;
        }

        Commands::Delete { path, yes } => {
            if !yes {
                let answer = prompt_line("Are you sure? [y/N]: ")?;
                if !answer.eq_ignore_ascii_case("y") {
                    println!("Cancelled.");
                    return Ok(());
                }
            }
            commands::request::run(Method::DELETE, &path, &[], None, json_output, &config_path)
                .await?;
        }

        Commands::Version => {
            println!("portal cli v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
