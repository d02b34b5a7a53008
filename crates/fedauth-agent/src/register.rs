// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! A single registration call.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use fedauth_common_http::sanitize_body_for_error;
use fedauth_common_secret::SecretString;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

use crate::config::AgentConfig;
use crate::error::{RegistrationError, RegistrationResult};

#[derive(Serialize)]
struct RegisterRequest<'a> {
	cluster: &'a str,
	credentials: RequestCredentials<'a>,
}

#[derive(Serialize)]
struct RequestCredentials<'a> {
	token: &'a str,
	ca_cert: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterResponse {
	pub status: String,
	pub cluster: String,
	#[serde(default)]
	pub expires_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
	error: String,
	#[serde(default)]
	message: String,
}

/// Reads the local credentials and posts them to the server.
pub struct Registrar {
	http_client: reqwest::Client,
	url: String,
	cluster: String,
	token_path: PathBuf,
	ca_path: PathBuf,
}

impl Registrar {
	pub fn new(config: &AgentConfig) -> RegistrationResult<Self> {
		if config.cluster.is_empty() {
			return Err(RegistrationError::Configuration(
				"cluster name is empty".into(),
			));
		}
		let http_client = fedauth_common_http::builder()
			.timeout(config.timeout)
			.build()
			.map_err(|e| {
				RegistrationError::Configuration(format!("failed to create HTTP client: {e}"))
			})?;

		Ok(Self {
			http_client,
			url: config.register_url(),
			cluster: config.cluster.clone(),
			token_path: config.token_path.clone(),
			ca_path: config.ca_path.clone(),
		})
	}

	pub fn cluster(&self) -> &str {
		&self.cluster
	}

	/// Files are re-read on every call so a rotated token is picked up.
	#[instrument(skip(self), fields(cluster = %self.cluster))]
	pub async fn register(&self) -> RegistrationResult<RegisterResponse> {
		let token = read_token(&self.token_path).await?;
		let ca_cert = read_file("CA certificate", &self.ca_path).await?;

		let body = RegisterRequest {
			cluster: &self.cluster,
			credentials: RequestCredentials {
				token: token.expose(),
				ca_cert: STANDARD.encode(&ca_cert),
			},
		};

		debug!(url = %self.url, "registering credentials");
		let response = self
			.http_client
			.post(&self.url)
			.header(CONTENT_TYPE, "application/json")
			.header(AUTHORIZATION, format!("Bearer {}", token.expose()))
			.json(&body)
			.send()
			.await?;

		let status = response.status();
		let text = response.text().await?;

		if !status.is_success() {
			let (error, message) = match serde_json::from_str::<ErrorResponse>(&text) {
				Ok(body) => (body.error, body.message),
				Err(_) => (
					status.canonical_reason().unwrap_or("error").to_string(),
					sanitize_body_for_error(&text, 200),
				),
			};
			return Err(RegistrationError::Rejected {
				status,
				error,
				message,
			});
		}

		let accepted: RegisterResponse = serde_json::from_str(&text)
			.map_err(|e| RegistrationError::InvalidResponse(e.to_string()))?;
		info!(
			expires_at = accepted.expires_at.as_deref().unwrap_or("unknown"),
			"registration accepted"
		);
		Ok(accepted)
	}
}

async fn read_file(what: &'static str, path: &Path) -> RegistrationResult<Vec<u8>> {
	tokio::fs::read(path)
		.await
		.map_err(|source| RegistrationError::ReadFile {
			what,
			path: path.to_path_buf(),
			source,
		})
}

async fn read_token(path: &Path) -> RegistrationResult<SecretString> {
	let raw = read_file("service account token", path).await?;
	let token = String::from_utf8_lossy(&raw).trim().to_string();
	if token.is_empty() {
		return Err(RegistrationError::EmptyToken(path.to_path_buf()));
	}
	Ok(SecretString::new(token))
}
