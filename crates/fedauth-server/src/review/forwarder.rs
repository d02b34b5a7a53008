// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use fedauth_common_http::RetryableError;
use fedauth_common_secret::SecretString;
use fedauth_server_config::{ClusterConfig, ServerConfig};
use fedauth_server_credentials::CredentialStore;
use fedauth_server_k8s::{
	HttpTokenReviewer, K8sError, KubeTokenReviewer, TokenReview, TokenReviewer,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, instrument, warn};

#[derive(Debug, Error)]
pub enum ForwardError {
	#[error("cluster not found: {0}")]
	ClusterNotFound(String),

	#[error("no credentials available for cluster {0}")]
	MissingCredentials(String),

	#[error("reading {path}: {source}")]
	CredentialFile {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error(transparent)]
	Review(#[from] K8sError),
}

impl RetryableError for ForwardError {
	fn is_retryable(&self) -> bool {
		match self {
			ForwardError::Review(err) => err.is_retryable(),
			ForwardError::CredentialFile { .. } => true,
			ForwardError::ClusterNotFound(_) | ForwardError::MissingCredentials(_) => false,
		}
	}
}

/// Submits an identity review to the cluster a token was attributed to.
///
/// Clusters with an `api_server` are reached with their registered
/// credentials, or the static `ca_cert`/`token_path` files when none are
/// registered. The local cluster is reached with this process's own
/// in-cluster identity, or at its issuer URL outside a cluster.
pub struct ReviewForwarder {
	config: Arc<ServerConfig>,
	store: Arc<CredentialStore>,
	ambient: OnceCell<Option<KubeTokenReviewer>>,
}

impl ReviewForwarder {
	pub fn new(config: Arc<ServerConfig>, store: Arc<CredentialStore>) -> Self {
		Self {
			config,
			store,
			ambient: OnceCell::new(),
		}
	}

	/// A forwarder with a fixed ambient identity; `None` means the process
	/// is treated as running outside any cluster.
	pub fn with_ambient(
		config: Arc<ServerConfig>,
		store: Arc<CredentialStore>,
		ambient: Option<KubeTokenReviewer>,
	) -> Self {
		Self {
			config,
			store,
			ambient: OnceCell::new_with(Some(ambient)),
		}
	}

	#[instrument(skip(self, request))]
	pub async fn forward(
		&self,
		cluster: &str,
		request: &TokenReview,
	) -> Result<TokenReview, ForwardError> {
		let reviewer = self.reviewer_for(cluster).await?;
		let response = reviewer.review(request).await?;
		debug!(
			authenticated = response.is_authenticated(),
			"identity review relayed"
		);
		Ok(response.normalize_envelope())
	}

	async fn reviewer_for(&self, cluster: &str) -> Result<Box<dyn TokenReviewer>, ForwardError> {
		let cfg = self
			.config
			.cluster(cluster)
			.ok_or_else(|| ForwardError::ClusterNotFound(cluster.to_string()))?;
		let timeout = self.config.http.review_timeout;

		if cfg.is_remote() {
			let (ca_pem, bearer) = self.remote_credentials(cluster, cfg).await?;
			let reviewer =
				HttpTokenReviewer::new(cfg.discovery_endpoint(), &ca_pem, Some(bearer), timeout)?;
			return Ok(Box::new(reviewer));
		}

		if let Some(ambient) = self.ambient().await {
			return Ok(Box::new(ambient.clone()));
		}
		debug!(cluster, issuer = %cfg.issuer, "no in-cluster identity, reviewing at issuer URL");
		Ok(Box::new(HttpTokenReviewer::new(&cfg.issuer, &[], None, timeout)?))
	}

	async fn remote_credentials(
		&self,
		cluster: &str,
		cfg: &ClusterConfig,
	) -> Result<(Vec<u8>, SecretString), ForwardError> {
		if let Some(creds) = self.store.get(cluster).await {
			if !creds.token.is_blank() {
				return Ok((creds.ca_cert.clone(), creds.token.clone()));
			}
		}

		let Some(token_path) = &cfg.token_path else {
			return Err(ForwardError::MissingCredentials(cluster.to_string()));
		};
		let token = read_file(token_path).await?;
		let ca_pem = match &cfg.ca_cert {
			Some(path) => read_file(path).await?,
			None => Vec::new(),
		};
		let token = String::from_utf8_lossy(&token).trim().to_string();
		Ok((ca_pem, SecretString::new(token)))
	}

	async fn ambient(&self) -> Option<&KubeTokenReviewer> {
		self
			.ambient
			.get_or_init(|| async {
				match KubeTokenReviewer::in_cluster() {
					Ok(reviewer) => Some(reviewer),
					Err(err) => {
						warn!(error = %err, "in-cluster identity unavailable");
						None
					}
				}
			})
			.await
			.as_ref()
	}
}

async fn read_file(path: &Path) -> Result<Vec<u8>, ForwardError> {
	tokio::fs::read(path)
		.await
		.map_err(|source| ForwardError::CredentialFile {
			path: path.to_path_buf(),
			source,
		})
}

#[cfg(test)]
mod tests {
	use super::*;
	use fedauth_server_credentials::Credentials;
	use std::collections::BTreeMap;

	fn remote_config() -> Arc<ServerConfig> {
		let mut clusters = BTreeMap::new();
		clusters.insert(
			"remote".to_string(),
			ClusterConfig::new("https://kubernetes.default.svc.cluster.local")
				.with_api_server("http://127.0.0.1:1"),
		);
		Arc::new(ServerConfig {
			clusters,
			..Default::default()
		})
	}

	#[tokio::test]
	async fn remote_cluster_without_credentials_is_rejected() {
		let forwarder = ReviewForwarder::with_ambient(
			remote_config(),
			Arc::new(CredentialStore::in_memory()),
			None,
		);
		let err = forwarder
			.forward("remote", &TokenReview::request("t", None))
			.await
			.unwrap_err();
		assert!(matches!(err, ForwardError::MissingCredentials(ref c) if c == "remote"));
		assert!(!err.is_retryable());
	}

	#[tokio::test]
	async fn unreachable_cluster_is_retryable() {
		let store = Arc::new(CredentialStore::in_memory());
		store
			.set(
				"remote",
				Credentials {
					token: SecretString::new("bearer".to_string()),
					ca_cert: Vec::new(),
				},
			)
			.await
			.unwrap();
		let forwarder = ReviewForwarder::with_ambient(remote_config(), store, None);
		let err = forwarder
			.forward("remote", &TokenReview::request("t", None))
			.await
			.unwrap_err();
		assert!(matches!(err, ForwardError::Review(K8sError::Unreachable { .. })));
		assert!(err.is_retryable());
	}

	#[tokio::test]
	async fn unknown_cluster_is_not_forwarded() {
		let forwarder = ReviewForwarder::with_ambient(
			remote_config(),
			Arc::new(CredentialStore::in_memory()),
			None,
		);
		let err = forwarder
			.forward("elsewhere", &TokenReview::request("t", None))
			.await
			.unwrap_err();
		assert!(matches!(err, ForwardError::ClusterNotFound(_)));
	}
}
