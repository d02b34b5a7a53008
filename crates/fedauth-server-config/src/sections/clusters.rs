// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Trusted clusters, the agent allow-list and bootstrap credential files.

use serde::Deserialize;
use std::path::PathBuf;

/// One trusted cluster. Immutable after load.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ClusterConfig {
	/// Expected `iss` claim of tokens this cluster issues.
	pub issuer: String,
	/// API endpoint used for discovery, key-set fetches and identity review
	/// when it differs from the issuer.
	#[serde(default)]
	pub api_server: Option<String>,
	/// PEM bundle trusted when talking to the cluster.
	#[serde(default)]
	pub ca_cert: Option<PathBuf>,
	/// Static bearer token file, re-read on every request.
	#[serde(default)]
	pub token_path: Option<PathBuf>,
}

impl ClusterConfig {
	pub fn new(issuer: impl Into<String>) -> Self {
		Self {
			issuer: issuer.into(),
			..Default::default()
		}
	}

	pub fn with_api_server(mut self, api_server: impl Into<String>) -> Self {
		self.api_server = Some(api_server.into());
		self
	}

	/// Endpoint for discovery and API calls: `api_server` when set, else the issuer.
	pub fn discovery_endpoint(&self) -> &str {
		match self.api_server.as_deref() {
			Some(api) if !api.is_empty() => api,
			_ => &self.issuer,
		}
	}

	/// True when the cluster is reached through an endpoint distinct from its issuer.
	pub fn is_remote(&self) -> bool {
		self.api_server.as_deref().is_some_and(|api| !api.is_empty())
	}
}

/// Identity allowed to push credentials for a cluster.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AgentConfig {
	/// Full subject, e.g. `system:serviceaccount:kube-federated-auth:agent`.
	#[serde(alias = "serviceAccount")]
	pub service_account: String,
}

/// Credential files loaded into the store at startup.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct BootstrapConfig {
	pub cluster: String,
	pub token_path: PathBuf,
	pub ca_path: PathBuf,
}
