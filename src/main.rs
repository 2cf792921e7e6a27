// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 ReVibe

use std::process::ExitCode;
use std::sync::Arc;

use chrono::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use revibe_server::api::router;
use revibe_server::auth::{AuthService, SessionKeys};
use revibe_server::chain::RpcChainClient;
use revibe_server::config::Config;
use revibe_server::state::AppState;
use revibe_server::storage::MirrorStore;
use revibe_server::sync::EventSynchronizer;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match std::env::var("LOG_FORMAT").as_deref() {
        Ok("json") => builder.json().init(),
        _ => builder.init(),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = std::fs::create_dir_all(&config.data_dir) {
        error!(path = %config.data_dir.display(), "cannot create data directory: {e}");
        return ExitCode::FAILURE;
    }

    let store = match MirrorStore::open(&config.data_dir.join("mirror.redb")) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("cannot open mirror database: {e}");
            return ExitCode::FAILURE;
        }
    };

    // The initial connection is fatal so a misconfigured endpoint surfaces
    // at startup. Later disconnects are retried by the synchronizer.
    info!(
        chain_id = config.chain_id,
        contract = %config.contract_address,
        "connecting to chain node"
    );
    let client = match RpcChainClient::connect(&config.rpc_url, config.contract_address).await {
        Ok(client) => client,
        Err(e) => {
            error!(url = %config.rpc_url, "cannot connect to chain node: {e}");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = CancellationToken::new();
    let synchronizer = EventSynchronizer::new(client, store.clone(), config.genesis_block);
    let sync_task = tokio::spawn(synchronizer.run(shutdown.clone()));

    let sessions = SessionKeys::new(
        &config.jwt_secret,
        Duration::hours(config.session_validity_hours),
    );
    let auth = Arc::new(AuthService::new(store.clone(), sessions));
    let app = router(AppState::new(auth, store));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(addr, "cannot bind server address: {e}");
            shutdown.cancel();
            let _ = sync_task.await;
            return ExitCode::FAILURE;
        }
    };

    info!("ReVibe server listening on http://{addr} (docs at /docs)");

    let serve_shutdown = shutdown.clone();
    let served = axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("shutdown signal received");
                }
                _ = serve_shutdown.cancelled() => {}
            }
        })
        .await;

    shutdown.cancel();
    if let Err(e) = sync_task.await {
        error!("synchronizer task panicked: {e}");
    }

    match served {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("server error: {e}");
            ExitCode::FAILURE
        }
    }
}
