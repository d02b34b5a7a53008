// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Durable storage for registered credentials.
//!
//! All clusters share one key-value object. Each cluster contributes two keys,
//! `cluster-<name>-token` and `cluster-<name>-ca.crt`.

use async_trait::async_trait;
use fedauth_common_secret::SecretString;
use fedauth_server_k8s::SecretClient;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::CredentialResult;
use crate::store::Credentials;

const KEY_PREFIX: &str = "cluster-";
const TOKEN_SUFFIX: &str = "-token";
const CA_SUFFIX: &str = "-ca.crt";

#[async_trait]
pub trait CredentialBackend: Send + Sync {
	/// Human-readable location, for logs.
	fn describe(&self) -> String;

	/// The stored object, or `None` when nothing has been persisted yet.
	async fn read(&self) -> CredentialResult<Option<BTreeMap<String, Vec<u8>>>>;

	/// Replaces the stored object.
	async fn write(&self, data: BTreeMap<String, Vec<u8>>) -> CredentialResult<()>;
}

/// Persists into a Kubernetes Secret.
pub struct KubeSecretBackend {
	client: SecretClient,
}

impl KubeSecretBackend {
	pub fn new(client: SecretClient) -> Self {
		Self { client }
	}
}

#[async_trait]
impl CredentialBackend for KubeSecretBackend {
	fn describe(&self) -> String {
		format!("secret {}/{}", self.client.namespace(), self.client.name())
	}

	async fn read(&self) -> CredentialResult<Option<BTreeMap<String, Vec<u8>>>> {
		Ok(self.client.read().await?)
	}

	async fn write(&self, data: BTreeMap<String, Vec<u8>>) -> CredentialResult<()> {
		Ok(self.client.apply(data).await?)
	}
}

/// Process-local backend for tests and runs outside a cluster.
#[derive(Clone, Default)]
pub struct MemoryBackend {
	data: Arc<Mutex<Option<BTreeMap<String, Vec<u8>>>>>,
}

impl MemoryBackend {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_data(data: BTreeMap<String, Vec<u8>>) -> Self {
		Self {
			data: Arc::new(Mutex::new(Some(data))),
		}
	}

	pub async fn snapshot(&self) -> Option<BTreeMap<String, Vec<u8>>> {
		self.data.lock().await.clone()
	}
}

#[async_trait]
impl CredentialBackend for MemoryBackend {
	fn describe(&self) -> String {
		"memory".to_string()
	}

	async fn read(&self) -> CredentialResult<Option<BTreeMap<String, Vec<u8>>>> {
		Ok(self.data.lock().await.clone())
	}

	async fn write(&self, data: BTreeMap<String, Vec<u8>>) -> CredentialResult<()> {
		*self.data.lock().await = Some(data);
		Ok(())
	}
}

pub fn token_key(cluster: &str) -> String {
	format!("{KEY_PREFIX}{cluster}{TOKEN_SUFFIX}")
}

pub fn ca_key(cluster: &str) -> String {
	format!("{KEY_PREFIX}{cluster}{CA_SUFFIX}")
}

/// Serializes every entry into the persisted key layout.
pub fn encode_entries(entries: &HashMap<String, Arc<Credentials>>) -> BTreeMap<String, Vec<u8>> {
	let mut data = BTreeMap::new();
	for (cluster, creds) in entries {
		data.insert(
			token_key(cluster),
			creds.token.expose().as_bytes().to_vec(),
		);
		data.insert(ca_key(cluster), creds.ca_cert.clone());
	}
	data
}

/// Result of parsing a persisted object.
#[derive(Debug, Default)]
pub struct DecodedEntries {
	pub entries: Vec<(String, Credentials)>,
	/// Clusters whose token was not valid UTF-8.
	pub corrupt: Vec<String>,
}

/// Parses the persisted key layout. Clusters with only one of the two keys
/// are skipped; unrelated keys are ignored.
pub fn decode_entries(mut data: BTreeMap<String, Vec<u8>>) -> DecodedEntries {
	let clusters: BTreeSet<String> = data
		.keys()
		.filter_map(|key| {
			let rest = key.strip_prefix(KEY_PREFIX)?;
			rest
				.strip_suffix(TOKEN_SUFFIX)
				.or_else(|| rest.strip_suffix(CA_SUFFIX))
				.filter(|name| !name.is_empty())
				.map(str::to_string)
		})
		.collect();

	let mut decoded = DecodedEntries::default();
	for cluster in clusters {
		let token = data.remove(&token_key(&cluster));
		let ca_cert = data.remove(&ca_key(&cluster));
		let (Some(token), Some(ca_cert)) = (token, ca_cert) else {
			warn!(cluster = %cluster, "skipping incomplete persisted credentials");
			continue;
		};

		match String::from_utf8(token) {
			Ok(token) => decoded.entries.push((
				cluster,
				Credentials {
					token: SecretString::new(token),
					ca_cert,
				},
			)),
			Err(_) => decoded.corrupt.push(cluster),
		}
	}
	decoded
}
