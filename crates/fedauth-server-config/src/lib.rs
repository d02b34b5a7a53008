// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration for the federation server.
//!
//! This crate provides:
//! - Layered configuration from defaults, a TOML file and the environment
//! - The trusted cluster map and the registration allow-list
//! - Validation of cross-references between clusters, agents and bootstrap files
//!
//! # Usage
//!
//! ```ignore
//! use fedauth_server_config::load_config_with_file;
//!
//! let config = load_config_with_file("/etc/kube-federated-auth/server.toml")?;
//! println!("{} cluster(s) trusted", config.clusters.len());
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::ServerConfigLayer;
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use std::collections::BTreeMap;
use tracing::{debug, info};

/// Fully resolved server configuration.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
	pub http: HttpConfig,
	pub logging: LoggingConfig,
	pub oidc: OidcConfig,
	pub persistence: PersistenceConfig,
	/// Trusted clusters keyed by name. Ordered so listings are stable.
	pub clusters: BTreeMap<String, ClusterConfig>,
	/// Registration allow-list keyed by cluster name.
	pub agents: BTreeMap<String, AgentConfig>,
	pub bootstrap: Vec<BootstrapConfig>,
}

impl ServerConfig {
	/// Get the socket address string for binding.
	pub fn socket_addr(&self) -> String {
		format!("{}:{}", self.http.host, self.http.port)
	}

	pub fn cluster(&self, name: &str) -> Option<&ClusterConfig> {
		self.clusters.get(name)
	}

	pub fn cluster_names(&self) -> impl Iterator<Item = &str> {
		self.clusters.keys().map(String::as_str)
	}

	/// Whether `subject` may register credentials for `cluster`.
	pub fn is_agent_authorized(&self, cluster: &str, subject: &str) -> bool {
		self
			.agents
			.get(cluster)
			.is_some_and(|agent| agent.service_account == subject)
	}
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`FEDAUTH_SERVER_*`)
/// 2. Config file (`/etc/kube-federated-auth/server.toml`, optional)
/// 3. Built-in defaults
pub fn load_config() -> Result<ServerConfig, ConfigError> {
	load_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Load configuration with a config file that must exist.
pub fn load_config_with_file(
	config_path: impl Into<std::path::PathBuf>,
) -> Result<ServerConfig, ConfigError> {
	load_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

/// Parse a TOML document directly, without environment overrides.
pub fn load_config_from_str(toml_str: &str) -> Result<ServerConfig, ConfigError> {
	let layer: ServerConfigLayer =
		toml::from_str(toml_str).map_err(|e| ConfigError::TomlParse {
			path: std::path::PathBuf::from("<inline>"),
			source: e,
		})?;
	finalize(layer)
}

fn load_sources(mut sources: Vec<Box<dyn ConfigSource>>) -> Result<ServerConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = ServerConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		merged.merge(source.load()?);
	}

	finalize(merged)
}

/// Finalize configuration layer into resolved config.
fn finalize(layer: ServerConfigLayer) -> Result<ServerConfig, ConfigError> {
	let config = ServerConfig {
		http: layer.http.unwrap_or_default().finalize(),
		logging: layer.logging.unwrap_or_default().finalize(),
		oidc: layer.oidc.unwrap_or_default().finalize(),
		persistence: layer.persistence.unwrap_or_default().finalize(),
		clusters: layer.clusters.unwrap_or_default(),
		agents: layer.agents.unwrap_or_default(),
		bootstrap: layer.bootstrap.unwrap_or_default(),
	};

	validate_config(&config)?;

	info!(
		host = %config.http.host,
		port = config.http.port,
		clusters = ?config.clusters.keys().collect::<Vec<_>>(),
		agents = config.agents.len(),
		bootstrap = config.bootstrap.len(),
		persistence_enabled = config.persistence.enabled,
		"Server configuration loaded"
	);

	Ok(config)
}

/// Validate cross-field configuration rules.
fn validate_config(config: &ServerConfig) -> Result<(), ConfigError> {
	if config.clusters.is_empty() {
		return Err(ConfigError::Validation("no clusters configured".to_string()));
	}

	for (name, cluster) in &config.clusters {
		if cluster.issuer.trim().is_empty() {
			return Err(ConfigError::Validation(format!(
				"cluster {name:?}: issuer is required"
			)));
		}
		if let Err(e) = url::Url::parse(&cluster.issuer) {
			return Err(ConfigError::InvalidValue {
				key: format!("clusters.{name}.issuer"),
				message: e.to_string(),
			});
		}
		if let Some(api_server) = cluster.api_server.as_deref().filter(|s| !s.is_empty()) {
			if let Err(e) = url::Url::parse(api_server) {
				return Err(ConfigError::InvalidValue {
					key: format!("clusters.{name}.api_server"),
					message: e.to_string(),
				});
			}
		}
	}

	for (name, agent) in &config.agents {
		if !config.clusters.contains_key(name) {
			return Err(ConfigError::Validation(format!(
				"agent entry {name:?} does not name a configured cluster"
			)));
		}
		if agent.service_account.trim().is_empty() {
			return Err(ConfigError::Validation(format!(
				"agent entry {name:?}: service_account is required"
			)));
		}
	}

	for entry in &config.bootstrap {
		if !config.clusters.contains_key(&entry.cluster) {
			return Err(ConfigError::Validation(format!(
				"bootstrap entry {:?} does not name a configured cluster",
				entry.cluster
			)));
		}
	}

	Ok(())
}
