// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Discovery and key-set fetch tuning.

use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct OidcConfig {
	/// Timeout for a single discovery or key-set request.
	pub http_timeout: Duration,
	/// How long a fetched key set is trusted before it is re-fetched.
	pub jwks_ttl: Duration,
	/// Minimum spacing between refreshes triggered by an unknown `kid`.
	pub jwks_min_refresh: Duration,
	/// Clock skew tolerated on `exp` and `nbf`.
	pub leeway: Duration,
	/// After a failed discovery, calls for that cluster fail fast for this
	/// long instead of waiting on the endpoint again.
	pub failure_backoff: Duration,
}

impl Default for OidcConfig {
	fn default() -> Self {
		OidcConfigLayer::default().finalize()
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OidcConfigLayer {
	#[serde(default)]
	pub http_timeout_secs: Option<u64>,
	#[serde(default)]
	pub jwks_ttl_secs: Option<u64>,
	#[serde(default)]
	pub jwks_min_refresh_secs: Option<u64>,
	#[serde(default)]
	pub leeway_secs: Option<u64>,
	#[serde(default)]
	pub failure_backoff_secs: Option<u64>,
}

impl OidcConfigLayer {
	pub fn merge(&mut self, other: OidcConfigLayer) {
		if other.http_timeout_secs.is_some() {
			self.http_timeout_secs = other.http_timeout_secs;
		}
		if other.jwks_ttl_secs.is_some() {
			self.jwks_ttl_secs = other.jwks_ttl_secs;
		}
		if other.jwks_min_refresh_secs.is_some() {
			self.jwks_min_refresh_secs = other.jwks_min_refresh_secs;
		}
		if other.leeway_secs.is_some() {
			self.leeway_secs = other.leeway_secs;
		}
		if other.failure_backoff_secs.is_some() {
			self.failure_backoff_secs = other.failure_backoff_secs;
		}
	}

	pub fn finalize(self) -> OidcConfig {
		OidcConfig {
			http_timeout: Duration::from_secs(self.http_timeout_secs.unwrap_or(10)),
			jwks_ttl: Duration::from_secs(self.jwks_ttl_secs.unwrap_or(3600)),
			jwks_min_refresh: Duration::from_secs(self.jwks_min_refresh_secs.unwrap_or(10)),
			leeway: Duration::from_secs(self.leeway_secs.unwrap_or(60)),
			failure_backoff: Duration::from_secs(self.failure_backoff_secs.unwrap_or(5)),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults() {
		let config = OidcConfig::default();
		assert_eq!(config.http_timeout, Duration::from_secs(10));
		assert_eq!(config.jwks_ttl, Duration::from_secs(3600));
		assert_eq!(config.jwks_min_refresh, Duration::from_secs(10));
		assert_eq!(config.leeway, Duration::from_secs(60));
		assert_eq!(config.failure_backoff, Duration::from_secs(5));
	}

	#[test]
	fn failure_backoff_can_be_disabled() {
		let mut layer = OidcConfigLayer::default();
		layer.merge(OidcConfigLayer {
			failure_backoff_secs: Some(0),
			..Default::default()
		});
		assert_eq!(layer.finalize().failure_backoff, Duration::ZERO);
	}
}
