//! `list`, `delete`, `attest` and `attestations`.

use mcproto_atproto::{AtprotoClient, SessionInfo};
use mcproto_registry::{
    AttestationPreview, NewAttestation, Publisher, SortKey, Usage, create_attestation,
    delete_server, filter_servers, list_attestations, list_servers, sort_servers,
};
use miette::Result;

pub async fn list(
    client: &AtprotoClient,
    session: &SessionInfo,
    sort: SortKey,
    filter: Option<&str>,
    json: bool,
    search_limit: u8,
) -> Result<()> {
    let servers = list_servers(client, session, search_limit)
        .await
        .map_err(|e| miette::miette!("failed to list servers: {}", e))?;
    let mut servers = filter_servers(servers, filter.unwrap_or_default());
    sort_servers(&mut servers, sort);

    if json {
        let out = serde_json::to_string_pretty(&servers).map_err(|e| miette::miette!("{}", e))?;
        println!("{}", out);
        return Ok(());
    }

    for entry in &servers {
        let server = &entry.value;
        println!("{} by {}", server.name, publisher_label(&server.publisher));
        if let Some(description) = &server.description {
            println!("  {}", description);
        }
        println!("  install: {}", server.installation);
        if !server.tools.is_empty() {
            println!("  tools:   {}", server.tools.join(", "));
        }
        println!(
            "  active:  {}",
            server.last_registered_at.format("%Y-%m-%d %H:%M UTC")
        );
        println!("  uri:     {}", entry.uri);
    }
    println!("{} server(s)", servers.len());
    Ok(())
}

pub async fn delete(client: &AtprotoClient, session: &SessionInfo, uri: &str) -> Result<()> {
    let deleted = delete_server(client, session, uri)
        .await
        .map_err(|e| miette::miette!("failed to delete {}: {}", uri, e))?;
    println!("deleted {}", deleted);
    Ok(())
}

pub async fn attest(
    client: &AtprotoClient,
    session: &SessionInfo,
    server_uri: String,
    rating: f64,
    comment: Option<String>,
    tools_used: Vec<String>,
    duration: Option<String>,
) -> Result<()> {
    let usage = (!tools_used.is_empty() || duration.is_some()).then(|| Usage {
        tools_used: (!tools_used.is_empty()).then_some(tools_used),
        duration,
    });

    let created = create_attestation(
        client,
        session,
        NewAttestation {
            server_uri,
            rating,
            comment,
            usage,
        },
    )
    .await
    .map_err(|e| miette::miette!("failed to attest: {}", e))?;
    println!("attested {}", created.uri);
    Ok(())
}

pub async fn attestations(
    client: &AtprotoClient,
    session: &SessionInfo,
    server_uri: &str,
    show_all: bool,
    search_limit: u8,
) -> Result<()> {
    let attestations = list_attestations(client, session, server_uri, search_limit)
        .await
        .map_err(|e| miette::miette!("failed to list attestations: {}", e))?;

    let preview = AttestationPreview::new(&attestations, show_all);
    for entry in preview.visible {
        let a = &entry.value;
        print!(
            "{:.2}  {}  {}",
            a.rating,
            publisher_label(&entry.publisher),
            a.timestamp.format("%Y-%m-%d")
        );
        match &a.comment {
            Some(comment) => println!("  {}", comment),
            None => println!(),
        }
    }
    if preview.hidden() > 0 {
        println!("({} more, pass --all to show them)", preview.hidden());
    }
    if attestations.is_empty() {
        println!("no attestations");
    }
    Ok(())
}

fn publisher_label(publisher: &Publisher) -> String {
    match (&publisher.display_name, &publisher.handle) {
        (Some(name), Some(handle)) => format!("{} (@{})", name, handle),
        (None, Some(handle)) => format!("@{}", handle),
        _ => publisher.did.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn publisher_labels() {
        let mut publisher = Publisher::from_did("did:plc:abc");
        assert_eq!(publisher_label(&publisher), "did:plc:abc");

        publisher.handle = Some("abc.test".to_string());
        assert_eq!(publisher_label(&publisher), "@abc.test");

        publisher.display_name = Some("Abc".to_string());
        assert_eq!(publisher_label(&publisher), "Abc (@abc.test)");
    }
}
