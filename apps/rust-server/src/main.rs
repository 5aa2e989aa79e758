// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{net::SocketAddr, process::ExitCode, sync::Arc, time::Duration};

use axum_server::{tls_rustls::RustlsConfig, Handle};
use tokio_util::sync::CancellationToken;

use waas_server::{
    api::router,
    config::AppConfig,
    logging::{init_logging, LogFormat},
    state::AppState,
};

/// Time in-flight requests get to finish after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> ExitCode {
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            init_logging(LogFormat::default());
            tracing::error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };
    init_logging(config.log_format);

    // Must happen before any TLS use, including outbound RPC over HTTPS.
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        tracing::error!("failed to install rustls crypto provider");
        return ExitCode::FAILURE;
    }

    let addr = match config.bind_addr() {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!(error = %e, "invalid bind address");
            return ExitCode::FAILURE;
        }
    };
    let tls = config.tls.clone();
    tracing::info!(?config, "configuration loaded");

    let state = match AppState::from_config(config) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "failed to initialise application state");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = CancellationToken::new();
    let pruner = tokio::spawn(Arc::clone(&state.spend).run_pruner(shutdown.clone()));

    let handle: Handle<SocketAddr> = Handle::new();
    tokio::spawn(watch_for_shutdown(handle.clone(), shutdown.clone()));

    let app = router(state).into_make_service_with_connect_info::<SocketAddr>();
    let served = match tls {
        Some(paths) => {
            let rustls = match RustlsConfig::from_pem_file(&paths.cert_path, &paths.key_path).await {
                Ok(rustls) => rustls,
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        cert = %paths.cert_path.display(),
                        key = %paths.key_path.display(),
                        "failed to load TLS certificate"
                    );
                    return ExitCode::FAILURE;
                }
            };
            tracing::info!("WaaS server listening on https://{addr} (docs at /docs)");
            axum_server::bind_rustls(addr, rustls)
                .handle(handle)
                .serve(app)
                .await
        }
        None => {
            tracing::info!("WaaS server listening on http://{addr} (docs at /docs)");
            axum_server::bind(addr).handle(handle).serve(app).await
        }
    };

    shutdown.cancel();
    let _ = pruner.await;

    match served {
        Ok(()) => {
            tracing::info!("server stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "server failed");
            ExitCode::FAILURE
        }
    }
}

/// Wait for Ctrl-C or SIGTERM, then drain connections and stop background tasks.
async fn watch_for_shutdown(handle: Handle<SocketAddr>, shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received, draining connections");
    shutdown.cancel();
    handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
}
