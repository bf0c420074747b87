//! mcproto: MCP server descriptors on the AT Protocol
//!
//! Main binary with subcommands:
//! - `serve`: HTTP API over the registry
//! - `register`: publish or update a server descriptor
//! - `list`, `delete`: browse and remove descriptors
//! - `attest`, `attestations`: write and read attestations
//! - `discover`, `tools`: inspect local servers before registering them

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use mcproto_atproto::{AtprotoClient, SessionInfo};
use mcproto_registry::{DEFAULT_SEARCH_LIMIT, SortKey};
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod browse;
mod register;
mod serve;

#[derive(Parser)]
#[command(name = "mcproto")]
#[command(about = "Publish and browse MCP servers on the AT Protocol", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Account used to read and write records.
#[derive(Args, Clone)]
struct Credentials {
    /// PDS URL
    #[arg(long, env = "MCPROTO_PDS_URL", default_value = "https://bsky.social")]
    pds_url: String,

    /// Account handle
    #[arg(long, env = "BSKY_HANDLE")]
    handle: String,

    /// App password
    #[arg(long, env = "BSKY_PASSWORD", hide_env_values = true)]
    password: String,
}

impl Credentials {
    async fn login(&self) -> Result<(AtprotoClient, SessionInfo)> {
        let client = AtprotoClient::new(&self.pds_url);
        let session = client
            .login(&self.handle, &self.password)
            .await
            .map_err(|e| miette::miette!("failed to log in as {}: {}", self.handle, e))?;
        Ok((client, session))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        #[command(flatten)]
        credentials: Credentials,

        /// HTTP server port
        #[arg(long, env = "MCPROTO_PORT", default_value = "3000")]
        port: u16,

        /// Maximum search hits scanned per listing
        #[arg(long, env = "MCPROTO_SEARCH_LIMIT", default_value_t = DEFAULT_SEARCH_LIMIT)]
        search_limit: u8,
    },

    /// Publish a server descriptor, merging into any existing one
    Register {
        #[command(flatten)]
        credentials: Credentials,

        /// Package id, repository URL or launch command
        #[arg(long, env = "MCPROTO_INSTALLATION", conflicts_with = "from_source")]
        installation: Option<String>,

        /// Display name (defaults to the name a probed server reports)
        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        version: Option<String>,

        /// Tool name (repeatable)
        #[arg(long = "tool", value_name = "TOOL")]
        tools: Vec<String>,

        #[arg(long)]
        language: Option<String>,

        /// Commit SHA (resolved from GitHub when omitted)
        #[arg(long)]
        commit_sha: Option<String>,

        /// Launch this command and add the tools it lists
        #[arg(long, value_name = "COMMAND")]
        probe: Option<String>,

        /// Register every server declared under this directory
        #[arg(long, value_name = "DIR")]
        from_source: Option<PathBuf>,
    },

    /// List every visible server
    List {
        #[command(flatten)]
        credentials: Credentials,

        /// Ordering: last-active, oldest or name
        #[arg(long, default_value = "last-active")]
        sort: SortKey,

        /// Keep servers matching this text
        #[arg(long)]
        filter: Option<String>,

        /// Print raw JSON
        #[arg(long)]
        json: bool,

        #[arg(long, env = "MCPROTO_SEARCH_LIMIT", default_value_t = DEFAULT_SEARCH_LIMIT)]
        search_limit: u8,
    },

    /// Delete a server descriptor you own
    Delete {
        #[command(flatten)]
        credentials: Credentials,

        /// at:// URI of the descriptor
        uri: String,
    },

    /// Attest to having used a server
    Attest {
        #[command(flatten)]
        credentials: Credentials,

        /// at:// URI of the server descriptor
        server_uri: String,

        /// Rating between 0 and 1
        #[arg(long)]
        rating: f64,

        #[arg(long)]
        comment: Option<String>,

        /// Tool used (repeatable)
        #[arg(long = "tool-used", value_name = "TOOL")]
        tools_used: Vec<String>,

        /// How long the server was used, e.g. "5m"
        #[arg(long)]
        duration: Option<String>,
    },

    /// Show the latest attestation per publisher for a server
    Attestations {
        #[command(flatten)]
        credentials: Credentials,

        /// at:// URI of the server descriptor
        server_uri: String,

        /// Show every attestation instead of the first few
        #[arg(long)]
        all: bool,

        #[arg(long, env = "MCPROTO_SEARCH_LIMIT", default_value_t = DEFAULT_SEARCH_LIMIT)]
        search_limit: u8,
    },

    /// Find MCP server declarations in a source tree
    Discover {
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Launch an MCP server and list its tools
    Tools {
        /// Shell command that starts the server
        command: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Settings may live in .env
    let _ = dotenvy::dotenv();

    // Stdout is reserved for command output
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "mcproto=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            credentials,
            port,
            search_limit,
        } => serve::run(&credentials, port, search_limit).await,

        Commands::Register {
            credentials,
            installation,
            name,
            description,
            version,
            tools,
            language,
            commit_sha,
            probe,
            from_source,
        } => {
            let (client, session) = credentials.login().await?;
            match from_source {
                Some(root) => register::from_source(&client, &session, &root).await,
                None => {
                    let installation = installation.ok_or_else(|| {
                        miette::miette!("--installation (or MCPROTO_INSTALLATION) is required")
                    })?;
                    let args = register::RegisterArgs {
                        installation,
                        name,
                        description,
                        version,
                        tools,
                        language,
                        commit_sha,
                        probe,
                    };
                    register::run(&client, &session, args).await
                }
            }
        }

        Commands::List {
            credentials,
            sort,
            filter,
            json,
            search_limit,
        } => {
            let (client, session) = credentials.login().await?;
            browse::list(&client, &session, sort, filter.as_deref(), json, search_limit).await
        }

        Commands::Delete { credentials, uri } => {
            let (client, session) = credentials.login().await?;
            browse::delete(&client, &session, &uri).await
        }

        Commands::Attest {
            credentials,
            server_uri,
            rating,
            comment,
            tools_used,
            duration,
        } => {
            let (client, session) = credentials.login().await?;
            browse::attest(
                &client,
                &session,
                server_uri,
                rating,
                comment,
                tools_used,
                duration,
            )
            .await
        }

        Commands::Attestations {
            credentials,
            server_uri,
            all,
            search_limit,
        } => {
            let (client, session) = credentials.login().await?;
            browse::attestations(&client, &session, &server_uri, all, search_limit).await
        }

        Commands::Discover { path } => register::discover(&path),

        Commands::Tools { command } => register::tools(&command).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn sort_defaults_to_last_active() {
        let cli = Cli::try_parse_from([
            "mcproto", "list", "--handle", "a.test", "--password", "pw",
        ])
        .unwrap();
        match cli.command {
            Commands::List { sort, json, .. } => {
                assert_eq!(sort, SortKey::LastActive);
                assert!(!json);
            }
            _ => panic!("expected list"),
        }
    }

    #[test]
    fn unknown_sort_is_rejected() {
        let result = Cli::try_parse_from([
            "mcproto", "list", "--handle", "a.test", "--password", "pw", "--sort", "newest",
        ]);
        assert!(result.is_err());
    }
}
