//! `register`, `discover` and `tools`.

use std::path::Path;

use mcproto_atproto::{AtprotoClient, SessionInfo};
use mcproto_mcp::probe_tools;
use mcproto_registry::{
    Registrar, ServerRegistration,
    discovery::discover_servers,
    source::{GithubApi, github_blob_url},
};
use miette::Result;
use tracing::{info, warn};

/// Descriptor fields given on the command line.
pub struct RegisterArgs {
    pub installation: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub version: Option<String>,
    pub tools: Vec<String>,
    pub language: Option<String>,
    pub commit_sha: Option<String>,
    pub probe: Option<String>,
}

pub async fn run(client: &AtprotoClient, session: &SessionInfo, args: RegisterArgs) -> Result<()> {
    let mut name = args.name;
    let mut tools = args.tools;

    if let Some(command) = &args.probe {
        let (server_name, probed) = probe_tools(command)
            .await
            .map_err(|e| miette::miette!("failed to probe `{}`: {}", command, e))?;
        info!(server = %server_name, tools = probed.len(), "probed server");
        name.get_or_insert(server_name);
        tools.extend(probed);
    }

    let name = name.ok_or_else(|| miette::miette!("--name is required unless --probe is given"))?;
    let commit_sha = match args.commit_sha {
        Some(sha) => Some(sha),
        None => GithubApi::default()
            .resolve_commit_sha(&args.installation)
            .await,
    };

    let registration = ServerRegistration {
        description: args.description,
        version: args.version,
        tools,
        language: args.language,
        commit_sha,
        ..ServerRegistration::new(args.installation, name)
    };
    publish(client, session, &registration).await
}

/// Register every server declared under `root`, using its GitHub URL as
/// the installation.
pub async fn from_source(client: &AtprotoClient, session: &SessionInfo, root: &Path) -> Result<()> {
    let discovered =
        discover_servers(root).map_err(|e| miette::miette!("failed to scan {}: {}", root.display(), e))?;
    if discovered.is_empty() {
        warn!(root = %root.display(), "no server declarations found");
        return Ok(());
    }

    let github = GithubApi::default();
    for server in discovered {
        let installation = github_blob_url(&server.file)
            .await
            .map_err(|e| miette::miette!("{}: {}", server.file.display(), e))?;
        let commit_sha = github.resolve_commit_sha(&installation).await;

        let registration = ServerRegistration {
            description: server.description,
            language: language_for(&server.file).map(str::to_string),
            commit_sha,
            ..ServerRegistration::new(installation, server.name)
        };
        publish(client, session, &registration).await?;
    }
    Ok(())
}

async fn publish(
    client: &AtprotoClient,
    session: &SessionInfo,
    registration: &ServerRegistration,
) -> Result<()> {
    let outcome = Registrar::new(client, session)
        .register(registration)
        .await
        .map_err(|e| miette::miette!("failed to register {}: {}", registration.name, e))?
        .ok_or_else(|| miette::miette!("registration of {} was skipped", registration.name))?;

    let verb = if outcome.created { "registered" } else { "updated" };
    println!("{} {}", verb, outcome.record.name);
    println!("  uri:   {}", outcome.uri);
    println!("  tools: {}", outcome.record.tools.join(", "));
    Ok(())
}

pub fn discover(root: &Path) -> Result<()> {
    let discovered =
        discover_servers(root).map_err(|e| miette::miette!("failed to scan {}: {}", root.display(), e))?;
    for server in &discovered {
        match &server.description {
            Some(description) => println!("{}  {}  {}", server.file.display(), server.name, description),
            None => println!("{}  {}", server.file.display(), server.name),
        }
    }
    info!(count = discovered.len(), "discovery finished");
    Ok(())
}

pub async fn tools(command: &str) -> Result<()> {
    let (name, tools) = probe_tools(command)
        .await
        .map_err(|e| miette::miette!("failed to probe `{}`: {}", command, e))?;
    println!("{}", name);
    for tool in tools {
        println!("  {}", tool);
    }
    Ok(())
}

fn language_for(file: &Path) -> Option<&'static str> {
    match file.extension()?.to_str()? {
        "py" => Some("python"),
        "ts" => Some("typescript"),
        "js" => Some("javascript"),
        _ => None,
    }
}
