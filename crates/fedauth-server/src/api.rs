// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use axum::{
	routing::{get, post},
	Router,
};
use fedauth_server_config::ServerConfig;
use fedauth_server_credentials::CredentialStore;
use fedauth_server_k8s::TOKEN_REVIEW_PATH;
use fedauth_server_oidc::VerifierManager;
use std::sync::Arc;

use crate::review::ReviewForwarder;
use crate::routes::{clusters, health, register, token_review, validate};

#[derive(Clone)]
pub struct AppState {
	pub config: Arc<ServerConfig>,
	pub store: Arc<CredentialStore>,
	pub verifier: Arc<VerifierManager>,
	pub forwarder: Arc<ReviewForwarder>,
}

impl AppState {
	pub fn new(config: Arc<ServerConfig>, store: Arc<CredentialStore>) -> Self {
		let forwarder = ReviewForwarder::new(config.clone(), store.clone());
		Self::with_forwarder(config, store, forwarder)
	}

	pub fn with_forwarder(
		config: Arc<ServerConfig>,
		store: Arc<CredentialStore>,
		forwarder: ReviewForwarder,
	) -> Self {
		let verifier = Arc::new(VerifierManager::new(config.clone(), Some(store.clone())));
		Self {
			config,
			store,
			verifier,
			forwarder: Arc::new(forwarder),
		}
	}
}

pub fn create_router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health::health_check))
		.route("/clusters", get(clusters::list_clusters))
		.route(TOKEN_REVIEW_PATH, post(token_review::review_token))
		.route("/register", post(register::register))
		.route("/validate", post(validate::validate))
		.with_state(state)
}
