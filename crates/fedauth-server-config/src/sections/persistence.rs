// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Where registered credentials are persisted.

use serde::Deserialize;

pub const DEFAULT_NAMESPACE: &str = "kube-federated-auth";
pub const DEFAULT_SECRET_NAME: &str = "kube-federated-auth-credentials";

/// Kubernetes Secret that holds registered credentials across restarts.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistenceConfig {
	pub enabled: bool,
	pub namespace: String,
	pub secret_name: String,
}

impl Default for PersistenceConfig {
	fn default() -> Self {
		PersistenceConfigLayer::default().finalize()
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PersistenceConfigLayer {
	#[serde(default)]
	pub enabled: Option<bool>,
	#[serde(default)]
	pub namespace: Option<String>,
	#[serde(default)]
	pub secret_name: Option<String>,
}

impl PersistenceConfigLayer {
	pub fn merge(&mut self, other: PersistenceConfigLayer) {
		if other.enabled.is_some() {
			self.enabled = other.enabled;
		}
		if other.namespace.is_some() {
			self.namespace = other.namespace;
		}
		if other.secret_name.is_some() {
			self.secret_name = other.secret_name;
		}
	}

	pub fn finalize(self) -> PersistenceConfig {
		PersistenceConfig {
			enabled: self.enabled.unwrap_or(true),
			namespace: self
				.namespace
				.unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
			secret_name: self
				.secret_name
				.unwrap_or_else(|| DEFAULT_SECRET_NAME.to_string()),
		}
	}
}
