// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use clap::Parser;
use fedauth_common_http::RetryConfig;
use std::path::PathBuf;
use std::time::Duration;

pub const SA_TOKEN_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";
pub const SA_CA_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt";

#[derive(Debug, Clone, Parser)]
#[command(name = "fedauth-agent", about = "Kube federated auth registration agent", version)]
pub struct AgentConfig {
	/// Base URL of the federated auth server
	#[arg(long, env = "FEDAUTH_ENDPOINT")]
	pub endpoint: String,

	/// Name this cluster is configured under on the server
	#[arg(long, env = "CLUSTER_NAME")]
	pub cluster: String,

	/// How often credentials are re-registered
	#[arg(long, env = "REFRESH_INTERVAL", default_value = "7d", value_parser = humantime::parse_duration)]
	pub refresh_interval: Duration,

	#[arg(long, env = "TOKEN_PATH", default_value = SA_TOKEN_PATH)]
	pub token_path: PathBuf,

	#[arg(long, env = "CA_PATH", default_value = SA_CA_PATH)]
	pub ca_path: PathBuf,

	/// Attempts per registration cycle before waiting for the next interval
	#[arg(long, env = "REGISTER_MAX_ATTEMPTS", default_value_t = 10)]
	pub max_attempts: u32,

	#[arg(long, env = "REGISTER_BASE_DELAY", default_value = "5s", value_parser = humantime::parse_duration)]
	pub base_delay: Duration,

	#[arg(long, env = "REGISTER_MAX_DELAY", default_value = "5m", value_parser = humantime::parse_duration)]
	pub max_delay: Duration,

	/// Per-request timeout
	#[arg(long, env = "REGISTER_TIMEOUT", default_value = "30s", value_parser = humantime::parse_duration)]
	pub timeout: Duration,

	/// Emit logs as JSON
	#[arg(long, env = "LOG_JSON", default_value_t = false)]
	pub log_json: bool,
}

impl AgentConfig {
	pub fn retry_config(&self) -> RetryConfig {
		RetryConfig {
			max_attempts: self.max_attempts.max(1),
			base_delay: self.base_delay,
			max_delay: self.max_delay,
			..RetryConfig::default()
		}
	}

	pub fn register_url(&self) -> String {
		format!("{}/register", self.endpoint.trim_end_matches('/'))
	}
}
