// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: environment variables and TOML files.

use std::path::PathBuf;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::ServerConfigLayer;
use crate::sections::{HttpConfigLayer, LoggingConfigLayer, PersistenceConfigLayer};

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

/// Trait for configuration sources.
pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<ServerConfigLayer, ConfigError>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		Ok(ServerConfigLayer::default())
	}
}

/// TOML file configuration source.
pub struct TomlSource {
	path: PathBuf,
	required: bool,
}

impl TomlSource {
	/// A file that must exist.
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self {
			path: path.into(),
			required: true,
		}
	}

	/// The system-wide file, skipped when absent.
	pub fn system() -> Self {
		Self {
			path: PathBuf::from("/etc/kube-federated-auth/server.toml"),
			required: false,
		}
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		if !self.required && !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(ServerConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: ServerConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: FEDAUTH_SERVER_<FIELD>. Clusters and agents are file-only.
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading environment variables");
		load_from_lookup(|name| std::env::var(name).ok())
	}
}

/// Builds the environment layer from an arbitrary variable lookup.
pub(crate) fn load_from_lookup<F>(lookup: F) -> Result<ServerConfigLayer, ConfigError>
where
	F: Fn(&str) -> Option<String>,
{
	let var = |name: &str| lookup(name).filter(|s| !s.is_empty());
	let flag = |name: &str| var(name).map(|v| v.eq_ignore_ascii_case("true") || v == "1");

	let port = match var("FEDAUTH_SERVER_PORT") {
		Some(v) => Some(v.parse::<u16>().map_err(|_| ConfigError::InvalidValue {
			key: "FEDAUTH_SERVER_PORT".to_string(),
			message: format!("invalid u16 value '{v}'"),
		})?),
		None => None,
	};

	Ok(ServerConfigLayer {
		http: Some(HttpConfigLayer {
			host: var("FEDAUTH_SERVER_HOST"),
			port,
			review_timeout_secs: None,
		}),
		logging: Some(LoggingConfigLayer {
			level: var("FEDAUTH_SERVER_LOG_LEVEL"),
			json: flag("FEDAUTH_SERVER_LOG_JSON"),
		}),
		persistence: Some(PersistenceConfigLayer {
			enabled: flag("FEDAUTH_SERVER_PERSISTENCE"),
			namespace: var("FEDAUTH_SERVER_NAMESPACE"),
			secret_name: var("FEDAUTH_SERVER_SECRET_NAME"),
		}),
		..Default::default()
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;

	fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
		let map: HashMap<String, String> = vars
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect();
		move |name| map.get(name).cloned()
	}

	#[test]
	fn test_env_overrides_are_read() {
		let layer = load_from_lookup(lookup(&[
			("FEDAUTH_SERVER_PORT", "9443"),
			("FEDAUTH_SERVER_LOG_JSON", "1"),
			("FEDAUTH_SERVER_PERSISTENCE", "false"),
			("FEDAUTH_SERVER_NAMESPACE", "auth"),
		]))
		.unwrap();

		assert_eq!(layer.http.unwrap().port, Some(9443));
		assert_eq!(layer.logging.unwrap().json, Some(true));
		let persistence = layer.persistence.unwrap();
		assert_eq!(persistence.enabled, Some(false));
		assert_eq!(persistence.namespace.as_deref(), Some("auth"));
	}

	#[test]
	fn test_empty_env_values_are_ignored() {
		let layer = load_from_lookup(lookup(&[("FEDAUTH_SERVER_HOST", "")])).unwrap();
		assert!(layer.http.unwrap().host.is_none());
	}

	#[test]
	fn test_invalid_port_is_rejected() {
		let err = load_from_lookup(lookup(&[("FEDAUTH_SERVER_PORT", "http")])).unwrap_err();
		assert!(matches!(err, ConfigError::InvalidValue { .. }));
	}

	#[test]
	fn test_missing_required_file_fails() {
		let dir = tempfile::tempdir().unwrap();
		let source = TomlSource::new(dir.path().join("absent.toml"));
		assert!(matches!(
			source.load(),
			Err(ConfigError::FileRead { .. })
		));
	}
}
