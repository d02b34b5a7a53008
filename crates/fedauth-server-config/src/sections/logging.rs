// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Logging configuration section.

use serde::Deserialize;

fn default_level() -> String {
	"info,tower_http::trace=debug".to_string()
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct LoggingConfigLayer {
	pub level: Option<String>,
	pub json: Option<bool>,
}

impl LoggingConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.level.is_some() {
			self.level = other.level;
		}
		if other.json.is_some() {
			self.json = other.json;
		}
	}

	pub fn finalize(self) -> LoggingConfig {
		LoggingConfig {
			level: self.level.unwrap_or_else(default_level),
			json: self.json.unwrap_or(false),
		}
	}
}

/// Filter directive used when `RUST_LOG` is unset, and output format.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
	pub level: String,
	pub json: bool,
}

impl Default for LoggingConfig {
	fn default() -> Self {
		LoggingConfigLayer::default().finalize()
	}
}
