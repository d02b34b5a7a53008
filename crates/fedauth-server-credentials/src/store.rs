// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use base64::{engine::general_purpose::STANDARD, Engine as _};
use fedauth_common_secret::SecretString;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::backend::{decode_entries, encode_entries, CredentialBackend};
use crate::error::{CredentialError, CredentialResult};

/// Bearer token and CA bundle for one remote cluster. Replaced wholesale.
#[derive(Clone, PartialEq)]
pub struct Credentials {
	pub token: SecretString,
	/// PEM bytes, possibly several certificates.
	pub ca_cert: Vec<u8>,
}

impl fmt::Debug for Credentials {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Credentials")
			.field("token", &self.token)
			.field("ca_cert_len", &self.ca_cert.len())
			.finish()
	}
}

/// Concurrent cluster → credentials map with optional write-through persistence.
///
/// Entries are stored behind `Arc`, so a reader always sees one complete pair.
pub struct CredentialStore {
	entries: RwLock<HashMap<String, Arc<Credentials>>>,
	backend: Option<Arc<dyn CredentialBackend>>,
}

impl fmt::Debug for CredentialStore {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("CredentialStore")
			.field(
				"backend",
				&self.backend.as_ref().map(|b| b.describe()),
			)
			.finish_non_exhaustive()
	}
}

impl Default for CredentialStore {
	fn default() -> Self {
		Self::in_memory()
	}
}

impl CredentialStore {
	/// A store that never persists.
	pub fn in_memory() -> Self {
		Self {
			entries: RwLock::new(HashMap::new()),
			backend: None,
		}
	}

	pub fn with_backend(backend: Arc<dyn CredentialBackend>) -> Self {
		Self {
			entries: RwLock::new(HashMap::new()),
			backend: Some(backend),
		}
	}

	pub async fn get(&self, cluster: &str) -> Option<Arc<Credentials>> {
		self.entries.read().await.get(cluster).cloned()
	}

	/// Stores `creds` for `cluster`, replacing any previous pair.
	///
	/// The in-memory update is always applied. When the durable write fails
	/// the error is returned as [`CredentialError::Persistence`] for the caller
	/// to log; the new credentials are already being served.
	#[instrument(skip(self, creds), fields(cluster = %cluster))]
	pub async fn set(&self, cluster: &str, creds: Credentials) -> CredentialResult<()> {
		self
			.entries
			.write()
			.await
			.insert(cluster.to_string(), Arc::new(creds));

		let Some(backend) = &self.backend else {
			return Ok(());
		};

		// Snapshot under the read lock; the durable write runs unlocked.
		let snapshot = encode_entries(&*self.entries.read().await);
		backend
			.write(snapshot)
			.await
			.map_err(|e| CredentialError::Persistence {
				cluster: cluster.to_string(),
				message: e.to_string(),
			})?;

		debug!(backend = %backend.describe(), "credentials persisted");
		Ok(())
	}

	/// Loads every persisted entry in one pass.
	///
	/// A missing object is not an error. Corrupt entries are reported after
	/// the valid ones have been loaded, so the caller can log and carry on.
	pub async fn load(&self) -> CredentialResult<usize> {
		let Some(backend) = &self.backend else {
			return Ok(0);
		};

		let Some(data) = backend.read().await? else {
			info!(backend = %backend.describe(), "no persisted credentials, starting fresh");
			return Ok(0);
		};

		let decoded = decode_entries(data);
		let loaded = decoded.entries.len();
		{
			let mut entries = self.entries.write().await;
			for (cluster, creds) in decoded.entries {
				info!(cluster = %cluster, "loaded persisted credentials");
				entries.insert(cluster, Arc::new(creds));
			}
		}

		if !decoded.corrupt.is_empty() {
			return Err(CredentialError::Corrupt {
				clusters: decoded.corrupt,
			});
		}
		Ok(loaded)
	}

	/// Reads bootstrap credentials from disk into memory. Not persisted.
	pub async fn load_from_files(
		&self,
		cluster: &str,
		token_path: &Path,
		ca_path: &Path,
	) -> CredentialResult<()> {
		let token = tokio::fs::read_to_string(token_path)
			.await
			.map_err(|source| CredentialError::FileRead {
				path: token_path.to_path_buf(),
				source,
			})?;
		let ca_cert = tokio::fs::read(ca_path)
			.await
			.map_err(|source| CredentialError::FileRead {
				path: ca_path.to_path_buf(),
				source,
			})?;

		let token = token.trim();
		if token.is_empty() {
			warn!(cluster = %cluster, path = %token_path.display(), "bootstrap token file is empty");
		}

		self.entries.write().await.insert(
			cluster.to_string(),
			Arc::new(Credentials {
				token: SecretString::new(token.to_string()),
				ca_cert,
			}),
		);
		info!(cluster = %cluster, "loaded bootstrap credentials from files");
		Ok(())
	}
}

/// Decodes the base64 (standard alphabet) CA bundle sent by agents.
pub fn decode_ca_cert(encoded: &str) -> CredentialResult<Vec<u8>> {
	Ok(STANDARD.decode(encoded.trim())?)
}
