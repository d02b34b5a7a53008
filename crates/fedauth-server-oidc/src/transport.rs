// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! HTTP transport to one cluster's discovery and key-set endpoints.

use fedauth_common_http::{builder_with_ca, sanitize_body_for_error};
use fedauth_common_secret::SecretString;
use fedauth_server_config::ClusterConfig;
use fedauth_server_credentials::Credentials;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::error::{VerifyError, VerifyResult};

const MAX_ERROR_BODY: usize = 256;

/// Where the bearer credential for a cluster comes from.
#[derive(Debug, Clone)]
pub(crate) enum BearerSource {
	None,
	/// A token pushed by the registration agent.
	Static(SecretString),
	/// A projected token file, re-read on every request so rotation is seen.
	File(PathBuf),
}

impl BearerSource {
	pub fn describe(&self) -> &'static str {
		match self {
			BearerSource::None => "none",
			BearerSource::Static(_) => "registered",
			BearerSource::File(_) => "file",
		}
	}

	async fn resolve(&self) -> Result<Option<String>, FetchError> {
		match self {
			BearerSource::None => Ok(None),
			BearerSource::Static(token) => Ok(Some(token.expose().clone())),
			BearerSource::File(path) => {
				let raw = tokio::fs::read_to_string(path)
					.await
					.map_err(|source| FetchError::Token {
						path: path.clone(),
						source,
					})?;
				Ok(Some(raw.trim().to_string()))
			}
		}
	}
}

#[derive(Debug, Error)]
pub(crate) enum FetchError {
	#[error("reading token file {path}: {source}")]
	Token {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("request failed: {0}")]
	Request(#[from] reqwest::Error),

	#[error("returned status {status}: {body}")]
	Status { status: StatusCode, body: String },
}

#[derive(Debug)]
pub(crate) struct ClusterTransport {
	client: Client,
	bearer: BearerSource,
}

impl ClusterTransport {
	/// Builds the transport from registered credentials, falling back to the
	/// static files named in the cluster configuration.
	pub async fn new(
		cfg: &ClusterConfig,
		creds: Option<&Credentials>,
		timeout: Duration,
	) -> VerifyResult<Self> {
		let ca_pem = match (creds, &cfg.ca_cert) {
			(Some(creds), _) if !creds.ca_cert.is_empty() => creds.ca_cert.clone(),
			(_, Some(path)) => tokio::fs::read(path).await.map_err(|e| {
				VerifyError::Client(format!("reading CA cert {}: {e}", path.display()))
			})?,
			_ => Vec::new(),
		};

		let bearer = match (creds, &cfg.token_path) {
			(Some(creds), _) if !creds.token.is_blank() => BearerSource::Static(creds.token.clone()),
			(_, Some(path)) => BearerSource::File(path.clone()),
			_ => BearerSource::None,
		};

		let client = builder_with_ca(&ca_pem)
			.and_then(|b| b.timeout(timeout).build())
			.map_err(|e| VerifyError::Client(format!("building HTTP client: {e}")))?;

		Ok(Self { client, bearer })
	}

	pub fn bearer(&self) -> &BearerSource {
		&self.bearer
	}

	pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
		let mut request = self.client.get(url);
		if let Some(token) = self.bearer.resolve().await? {
			request = request.bearer_auth(token);
		}

		let response = request.send().await?;
		let status = response.status();
		if !status.is_success() {
			let body = response.text().await.unwrap_or_default();
			return Err(FetchError::Status {
				status,
				body: sanitize_body_for_error(&body, MAX_ERROR_BODY),
			});
		}
		Ok(response.json().await?)
	}
}
