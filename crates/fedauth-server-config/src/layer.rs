// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration layer for merging from multiple sources.

use serde::Deserialize;
use std::collections::BTreeMap;

use crate::sections::{
	AgentConfig, BootstrapConfig, ClusterConfig, HttpConfigLayer, LoggingConfigLayer,
	OidcConfigLayer, PersistenceConfigLayer,
};

/// Server configuration layer - all fields are Option for merging.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfigLayer {
	#[serde(default)]
	pub http: Option<HttpConfigLayer>,
	#[serde(default)]
	pub logging: Option<LoggingConfigLayer>,
	#[serde(default)]
	pub oidc: Option<OidcConfigLayer>,
	#[serde(default)]
	pub persistence: Option<PersistenceConfigLayer>,
	#[serde(default)]
	pub clusters: Option<BTreeMap<String, ClusterConfig>>,
	#[serde(default)]
	pub agents: Option<BTreeMap<String, AgentConfig>>,
	#[serde(default)]
	pub bootstrap: Option<Vec<BootstrapConfig>>,
}

impl ServerConfigLayer {
	/// Merge another layer into this one. Other layer takes precedence.
	///
	/// Cluster and agent maps merge per entry; a bootstrap list replaces the
	/// previous one wholesale.
	pub fn merge(&mut self, other: ServerConfigLayer) {
		merge_option(&mut self.http, other.http, HttpConfigLayer::merge);
		merge_option(&mut self.logging, other.logging, LoggingConfigLayer::merge);
		merge_option(&mut self.oidc, other.oidc, OidcConfigLayer::merge);
		merge_option(
			&mut self.persistence,
			other.persistence,
			PersistenceConfigLayer::merge,
		);
		merge_option(&mut self.clusters, other.clusters, |t, s| t.extend(s));
		merge_option(&mut self.agents, other.agents, |t, s| t.extend(s));
		if other.bootstrap.is_some() {
			self.bootstrap = other.bootstrap;
		}
	}
}

fn merge_option<T, F>(target: &mut Option<T>, source: Option<T>, merge_fn: F)
where
	F: FnOnce(&mut T, T),
{
	match (target.as_mut(), source) {
		(Some(t), Some(s)) => merge_fn(t, s),
		(None, Some(s)) => *target = Some(s),
		_ => {}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_merge_preserves_base_when_other_empty() {
		let mut base = ServerConfigLayer {
			http: Some(HttpConfigLayer {
				port: Some(9000),
				..Default::default()
			}),
			..Default::default()
		};
		base.merge(ServerConfigLayer::default());
		assert_eq!(base.http.as_ref().unwrap().port, Some(9000));
	}

	#[test]
	fn test_cluster_maps_merge_per_entry() {
		let mut base = ServerConfigLayer {
			clusters: Some(BTreeMap::from([
				("a".to_string(), ClusterConfig::new("https://a")),
				("b".to_string(), ClusterConfig::new("https://b")),
			])),
			..Default::default()
		};
		base.merge(ServerConfigLayer {
			clusters: Some(BTreeMap::from([(
				"b".to_string(),
				ClusterConfig::new("https://b2"),
			)])),
			..Default::default()
		});

		let clusters = base.clusters.unwrap();
		assert_eq!(clusters.len(), 2);
		assert_eq!(clusters["a"].issuer, "https://a");
		assert_eq!(clusters["b"].issuer, "https://b2");
	}
}
