// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Federation server binary.

use clap::Parser;
use fedauth_server::{create_router, AppState};
use fedauth_server_config::{LoggingConfig, ServerConfig};
use fedauth_server_credentials::{CredentialStore, KubeSecretBackend};
use fedauth_server_k8s::SecretClient;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Authenticates ServiceAccount tokens from any trusted cluster.
#[derive(Parser, Debug)]
#[command(name = "fedauth-server", about = "Cross-cluster identity review server", version)]
struct Args {
	/// Configuration file; without it the system file is used when present.
	#[arg(long, env = "FEDAUTH_SERVER_CONFIG")]
	config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();

	let config = match &args.config {
		Some(path) => fedauth_server_config::load_config_with_file(path)?,
		None => fedauth_server_config::load_config()?,
	};
	init_tracing(&config.logging);

	tracing::info!(
		host = %config.http.host,
		port = config.http.port,
		clusters = ?config.cluster_names().collect::<Vec<_>>(),
		"starting fedauth-server"
	);

	let store = Arc::new(create_store(&config).await);
	match store.load().await {
		Ok(count) => tracing::info!(count, "loaded persisted credentials"),
		Err(e) => tracing::warn!(error = %e, "failed to load persisted credentials"),
	}
	for bootstrap in &config.bootstrap {
		if let Err(e) = store
			.load_from_files(&bootstrap.cluster, &bootstrap.token_path, &bootstrap.ca_path)
			.await
		{
			tracing::warn!(cluster = %bootstrap.cluster, error = %e, "failed to load bootstrap credentials");
		}
	}

	let addr = config.socket_addr();
	let state = AppState::new(Arc::new(config), store);
	let app = create_router(state).layer(TraceLayer::new_for_http());

	let listener = tokio::net::TcpListener::bind(&addr).await?;
	tracing::info!("listening on {}", addr);

	axum::serve(listener, app)
		.with_graceful_shutdown(shutdown_signal())
		.await?;

	tracing::info!("Server shutdown complete");
	Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
	let filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| logging.level.clone().into());
	tracing_subscriber::registry()
		.with(filter)
		.with(logging.json.then(|| tracing_subscriber::fmt::layer().json()))
		.with((!logging.json).then(tracing_subscriber::fmt::layer))
		.init();
}

/// Uses the Kubernetes Secret backend when persistence is enabled and a
/// cluster is reachable; otherwise credentials live in memory only.
async fn create_store(config: &ServerConfig) -> CredentialStore {
	if !config.persistence.enabled {
		tracing::info!("credential persistence disabled");
		return CredentialStore::in_memory();
	}

	let persistence = &config.persistence;
	match SecretClient::try_default(&persistence.namespace, &persistence.secret_name).await {
		Ok(client) => CredentialStore::with_backend(Arc::new(KubeSecretBackend::new(client))),
		Err(e) => {
			tracing::warn!(error = %e, "not running in cluster, credentials will not be persisted");
			CredentialStore::in_memory()
		}
	}
}

async fn shutdown_signal() {
	let ctrl_c = async {
		if let Err(e) = tokio::signal::ctrl_c().await {
			tracing::error!(error = %e, "failed to listen for ctrl-c");
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
				tracing::error!(error = %e, "failed to listen for SIGTERM");
				std::future::pending::<()>().await;
			}
		}
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {}
		_ = terminate => {}
	}
	tracing::info!("Received shutdown signal");
}
