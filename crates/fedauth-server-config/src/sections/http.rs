// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! HTTP server configuration.

use serde::Deserialize;
use std::time::Duration;

/// HTTP server configuration (runtime, fully resolved).
#[derive(Debug, Clone)]
pub struct HttpConfig {
	pub host: String,
	pub port: u16,
	/// Deadline for a single identity review, detection plus forwarding.
	pub review_timeout: Duration,
}

impl Default for HttpConfig {
	fn default() -> Self {
		HttpConfigLayer::default().finalize()
	}
}

/// HTTP configuration layer (partial, for merging).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HttpConfigLayer {
	#[serde(default)]
	pub host: Option<String>,
	#[serde(default)]
	pub port: Option<u16>,
	#[serde(default)]
	pub review_timeout_secs: Option<u64>,
}

impl HttpConfigLayer {
	pub fn merge(&mut self, other: HttpConfigLayer) {
		if other.host.is_some() {
			self.host = other.host;
		}
		if other.port.is_some() {
			self.port = other.port;
		}
		if other.review_timeout_secs.is_some() {
			self.review_timeout_secs = other.review_timeout_secs;
		}
	}

	pub fn finalize(self) -> HttpConfig {
		HttpConfig {
			host: self.host.unwrap_or_else(|| "0.0.0.0".to_string()),
			port: self.port.unwrap_or(8080),
			review_timeout: Duration::from_secs(self.review_timeout_secs.unwrap_or(30)),
		}
	}
}
