//! `mcproto serve`: run the HTTP API.

use std::sync::Arc;

use mcproto_atproto::AtprotoClient;
use mcproto_web::{AppState, Authenticator, ServiceAuthenticator, create_router};
use miette::Result;
use tracing::{info, warn};

use crate::Credentials;

pub async fn run(credentials: &Credentials, port: u16, search_limit: u8) -> Result<()> {
    let client = Arc::new(AtprotoClient::new(&credentials.pds_url));
    let auth = ServiceAuthenticator::new(
        client.clone(),
        &credentials.handle,
        &credentials.password,
    );

    // Requests re-establish the session themselves, so a PDS that is down
    // at startup is not fatal
    match auth.service_session().await {
        Ok(session) => info!(did = %session.did, handle = %session.handle, "service session established"),
        Err(e) => warn!(error = %e, "initial login failed, will retry per request"),
    }

    let state = Arc::new(AppState {
        auth: Arc::new(auth),
        store: client,
        search_limit,
    });
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| miette::miette!("failed to bind to {}: {}", addr, e))?;
    info!("API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| miette::miette!("server error: {}", e))?;

    info!("API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
