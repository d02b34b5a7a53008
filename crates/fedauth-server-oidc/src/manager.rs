// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use fedauth_server_config::{ClusterConfig, OidcConfig, ServerConfig};
use fedauth_server_credentials::CredentialStore;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::decode_header;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, OnceCell, RwLock};
use tracing::{debug, error, info, instrument, warn};

use crate::claims::Claims;
use crate::discovery::{discovery_url, rewrite_jwks_url, DiscoveryDocument};
use crate::error::{VerifyError, VerifyResult};
use crate::keys::{is_algorithm_allowed, validation, CachedKeys};
use crate::transport::ClusterTransport;

type Slot = Arc<OnceCell<Arc<VerifierEntry>>>;

/// Lazily built, per-cluster verification contexts.
///
/// Each cluster has at most one slot. The first caller for a cluster builds
/// the entry while later callers wait on the same slot; the map lock is only
/// held to look up or insert the slot, never across the discovery fetch.
/// A failed build leaves the slot empty; the failure is replayed to callers
/// until `failure_backoff` elapses, after which the next call retries.
pub struct VerifierManager {
	config: Arc<ServerConfig>,
	store: Option<Arc<CredentialStore>>,
	entries: RwLock<HashMap<String, Slot>>,
	/// Last key set seen per cluster, for the cross-cluster collision check.
	registry: RwLock<HashMap<String, Arc<CachedKeys>>>,
	failures: RwLock<HashMap<String, (Instant, VerifyError)>>,
}

impl fmt::Debug for VerifierManager {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("VerifierManager")
			.field("clusters", &self.config.clusters.len())
			.field("persistent_store", &self.store.is_some())
			.finish_non_exhaustive()
	}
}

impl VerifierManager {
	pub fn new(config: Arc<ServerConfig>, store: Option<Arc<CredentialStore>>) -> Self {
		Self {
			config,
			store,
			entries: RwLock::new(HashMap::new()),
			registry: RwLock::new(HashMap::new()),
			failures: RwLock::new(HashMap::new()),
		}
	}

	pub fn config(&self) -> &ServerConfig {
		&self.config
	}

	/// Verifies `token` against `cluster`'s published keys and returns its claims.
	///
	/// Checks signature, issuer (the configured one, not the discovery
	/// endpoint), expiry and not-before. Audience is not restricted.
	///
	/// Dropping the returned future abandons any discovery or key-set fetch
	/// in flight.
	#[instrument(skip(self, token))]
	pub async fn verify(&self, cluster: &str, token: &str) -> VerifyResult<Claims> {
		let cfg = self
			.config
			.cluster(cluster)
			.ok_or_else(|| VerifyError::ClusterNotFound(cluster.to_string()))?;

		let header = decode_header(token).map_err(|e| VerifyError::Malformed(e.to_string()))?;
		if !is_algorithm_allowed(header.alg) {
			return Err(VerifyError::UnsupportedAlgorithm(header.alg));
		}
		let kid = header.kid.as_deref();

		let entry = self.entry(cluster, cfg).await?;
		let keys = entry.keys_for(kid, &self.config.oidc).await?;
		self.check_collisions(cluster, &keys).await?;

		let rules = validation(header.alg, &cfg.issuer, self.config.oidc.leeway);
		let claims = keys.decode(token, kid, header.alg, &rules)?.into_claims(cluster);
		debug!(
			subject = %claims.subject,
			namespace = claims.namespace().unwrap_or_default(),
			"token verified"
		);
		Ok(claims)
	}

	/// Evicts the cached entry so the next verification rebuilds it with the
	/// cluster's current credentials.
	#[instrument(skip(self))]
	pub async fn invalidate_verifier(&self, cluster: &str) {
		let removed = self.entries.write().await.remove(cluster).is_some();
		self.registry.write().await.remove(cluster);
		self.failures.write().await.remove(cluster);
		if removed {
			info!(cluster, "invalidated verifier");
		}
	}

	/// Whether a built entry is cached for `cluster`.
	pub async fn is_cached(&self, cluster: &str) -> bool {
		self
			.entries
			.read()
			.await
			.get(cluster)
			.is_some_and(|slot| slot.initialized())
	}

	async fn entry(&self, cluster: &str, cfg: &ClusterConfig) -> VerifyResult<Arc<VerifierEntry>> {
		let existing = self.entries.read().await.get(cluster).cloned();
		let slot = match existing {
			Some(slot) => slot,
			None => self
				.entries
				.write()
				.await
				.entry(cluster.to_string())
				.or_default()
				.clone(),
		};
		if let Some(entry) = slot.get() {
			return Ok(entry.clone());
		}
		if let Some(err) = self.recent_failure(cluster).await {
			debug!(cluster, error = %err, "discovery failed recently, not retrying yet");
			return Err(err);
		}

		let result = slot
			.get_or_try_init(|| self.build(cluster, cfg))
			.await
			.cloned();
		let mut failures = self.failures.write().await;
		match &result {
			Ok(_) => {
				failures.remove(cluster);
			}
			Err(err) if !self.config.oidc.failure_backoff.is_zero() => {
				failures.insert(cluster.to_string(), (Instant::now(), err.clone()));
			}
			Err(_) => {}
		}
		result
	}

	async fn recent_failure(&self, cluster: &str) -> Option<VerifyError> {
		let backoff = self.config.oidc.failure_backoff;
		self
			.failures
			.read()
			.await
			.get(cluster)
			.filter(|(at, _)| at.elapsed() < backoff)
			.map(|(_, err)| err.clone())
	}

	async fn build(&self, cluster: &str, cfg: &ClusterConfig) -> VerifyResult<Arc<VerifierEntry>> {
		let creds = match &self.store {
			Some(store) => store.get(cluster).await,
			None => None,
		};
		let transport =
			ClusterTransport::new(cfg, creds.as_deref(), self.config.oidc.http_timeout).await?;

		let endpoint = cfg.discovery_endpoint();
		let url = discovery_url(endpoint);
		let document: DiscoveryDocument = transport
			.get_json(&url)
			.await
			.map_err(|e| VerifyError::Discovery(format!("fetching {url}: {e}")))?;

		let jwks_url = if cfg.is_remote() {
			rewrite_jwks_url(&document.jwks_uri, endpoint)
		} else {
			document.jwks_uri
		};
		info!(
			cluster,
			%jwks_url,
			bearer = transport.bearer().describe(),
			"built verifier"
		);

		Ok(Arc::new(VerifierEntry {
			cluster: cluster.to_string(),
			jwks_url,
			transport,
			keys: RwLock::new(None),
			refresh: Mutex::new(()),
		}))
	}

	async fn check_collisions(&self, cluster: &str, keys: &Arc<CachedKeys>) -> VerifyResult<()> {
		let registered = self
			.registry
			.read()
			.await
			.get(cluster)
			.is_some_and(|known| Arc::ptr_eq(known, keys));
		if !registered {
			self
				.registry
				.write()
				.await
				.insert(cluster.to_string(), keys.clone());
		}

		let registry = self.registry.read().await;
		for (other, other_keys) in registry.iter() {
			if other == cluster {
				continue;
			}
			if !keys.fingerprints.is_disjoint(&other_keys.fingerprints) {
				error!(
					cluster,
					other = %other,
					"clusters publish a common signing key; refusing to verify"
				);
				return Err(VerifyError::KeyCollision {
					cluster: cluster.to_string(),
					other: other.clone(),
				});
			}
		}
		Ok(())
	}
}

struct VerifierEntry {
	cluster: String,
	jwks_url: String,
	transport: ClusterTransport,
	keys: RwLock<Option<Arc<CachedKeys>>>,
	refresh: Mutex<()>,
}

impl VerifierEntry {
	fn is_fresh(keys: &CachedKeys, kid: Option<&str>, oidc: &OidcConfig) -> bool {
		let age = keys.age();
		if age >= oidc.jwks_ttl {
			return false;
		}
		match kid {
			Some(kid) if !keys.has_kid(kid) => age < oidc.jwks_min_refresh,
			_ => true,
		}
	}

	async fn fresh_keys(&self, kid: Option<&str>, oidc: &OidcConfig) -> Option<Arc<CachedKeys>> {
		self
			.keys
			.read()
			.await
			.as_ref()
			.filter(|keys| Self::is_fresh(keys, kid, oidc))
			.cloned()
	}

	/// Returns a key set suitable for `kid`, fetching when none is cached,
	/// the cached set has expired or it lacks `kid`.
	async fn keys_for(&self, kid: Option<&str>, oidc: &OidcConfig) -> VerifyResult<Arc<CachedKeys>> {
		if let Some(keys) = self.fresh_keys(kid, oidc).await {
			return Ok(keys);
		}

		let _guard = self.refresh.lock().await;
		if let Some(keys) = self.fresh_keys(kid, oidc).await {
			return Ok(keys);
		}

		let previous = self.keys.read().await.clone();
		match self.fetch().await {
			Ok(keys) => {
				*self.keys.write().await = Some(keys.clone());
				Ok(keys)
			}
			// A set that is only missing a kid is still within its TTL.
			Err(err) => match previous {
				Some(keys) if keys.age() < oidc.jwks_ttl => {
					warn!(cluster = %self.cluster, error = %err, "key set refresh failed, keeping cached set");
					Ok(keys)
				}
				_ => Err(err),
			},
		}
	}

	async fn fetch(&self) -> VerifyResult<Arc<CachedKeys>> {
		let jwks: JwkSet = self
			.transport
			.get_json(&self.jwks_url)
			.await
			.map_err(|e| VerifyError::KeySet(format!("fetching {}: {e}", self.jwks_url)))?;
		debug!(cluster = %self.cluster, keys = jwks.keys.len(), "fetched key set");
		Ok(Arc::new(CachedKeys::new(jwks)))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::VerifyErrorKind;
	use crate::test_support::{service_account_claims, MockCluster, TestKey, IN_CLUSTER_ISSUER};
	use fedauth_common_secret::SecretString;
	use fedauth_server_credentials::Credentials;
	use jsonwebtoken::{EncodingKey, Header};
	use serde_json::json;
	use std::io::Write;
	use std::sync::atomic::Ordering;
	use std::time::Duration;

	fn config_for(clusters: &[(&str, &MockCluster)]) -> ServerConfig {
		let mut config = ServerConfig::default();
		for (name, mock) in clusters {
			config.clusters.insert(
				name.to_string(),
				ClusterConfig::new(IN_CLUSTER_ISSUER).with_api_server(mock.url()),
			);
		}
		config
	}

	fn manager(config: ServerConfig) -> VerifierManager {
		VerifierManager::new(Arc::new(config), None)
	}

	fn creds(token: &str) -> Credentials {
		Credentials {
			token: SecretString::new(token.to_string()),
			ca_cert: Vec::new(),
		}
	}

	#[tokio::test]
	async fn verifies_token_through_rewritten_key_set_url() {
		let key = TestKey::new(1, "b-key");
		let mock = MockCluster::start(&[&key]).await;
		let manager = manager(config_for(&[("cluster-b", &mock)]));

		let token = key.mint(service_account_claims("payments", "api"));
		let claims = manager.verify("cluster-b", &token).await.unwrap();

		assert_eq!(claims.cluster, "cluster-b");
		assert_eq!(claims.issuer, IN_CLUSTER_ISSUER);
		assert_eq!(claims.subject, "system:serviceaccount:payments:api");
		assert_eq!(claims.service_account_uid(), Some("sa-uid"));
		assert_eq!(mock.state.jwks_hits.load(Ordering::SeqCst), 1);
		assert!(manager.is_cached("cluster-b").await);
	}

	#[tokio::test]
	async fn unknown_cluster_is_configuration_error() {
		let manager = manager(ServerConfig::default());
		let err = manager.verify("nope", "a.b.c").await.unwrap_err();
		assert!(matches!(err, VerifyError::ClusterNotFound(ref name) if name == "nope"));
		assert_eq!(err.kind(), VerifyErrorKind::Configuration);
	}

	#[tokio::test]
	async fn token_from_another_cluster_is_signature_mismatch() {
		let key_a = TestKey::new(1, "a-key");
		let key_b = TestKey::new(2, "b-key");
		let mock_a = MockCluster::start(&[&key_a]).await;
		let mock_b = MockCluster::start(&[&key_b]).await;
		let manager = manager(config_for(&[("a", &mock_a), ("b", &mock_b)]));

		let token = key_b.mint(service_account_claims("default", "app"));
		let err = manager.verify("a", &token).await.unwrap_err();
		assert_eq!(err.kind(), VerifyErrorKind::SignatureMismatch);
		assert_eq!(manager.verify("b", &token).await.unwrap().cluster, "b");
	}

	#[tokio::test]
	async fn forged_signature_with_known_kid_is_rejected() {
		let published = TestKey::new(1, "shared");
		let forger = TestKey::new(9, "shared");
		let mock = MockCluster::start(&[&published]).await;
		let manager = manager(config_for(&[("a", &mock)]));

		let token = forger.mint(service_account_claims("default", "app"));
		let err = manager.verify("a", &token).await.unwrap_err();
		assert!(matches!(err, VerifyError::InvalidSignature));
	}

	#[tokio::test]
	async fn expired_token_is_claim_invalid() {
		let key = TestKey::new(3, "k");
		let mock = MockCluster::start(&[&key]).await;
		let manager = manager(config_for(&[("a", &mock)]));

		let mut claims = service_account_claims("default", "app");
		claims["exp"] = json!(jsonwebtoken::get_current_timestamp() - 3600);
		let err = manager.verify("a", &key.mint(claims)).await.unwrap_err();
		assert!(matches!(err, VerifyError::Expired));
		assert_eq!(err.kind(), VerifyErrorKind::ClaimInvalid);
	}

	#[tokio::test]
	async fn issuer_is_checked_against_configuration() {
		let key = TestKey::new(3, "k");
		let mock = MockCluster::start(&[&key]).await;
		let manager = manager(config_for(&[("a", &mock)]));

		let mut claims = service_account_claims("default", "app");
		claims["iss"] = json!(mock.url());
		let err = manager.verify("a", &key.mint(claims)).await.unwrap_err();
		assert!(matches!(err, VerifyError::IssuerMismatch));
	}

	#[tokio::test]
	async fn hmac_token_is_rejected_before_any_fetch() {
		let key = TestKey::new(3, "k");
		let mock = MockCluster::start(&[&key]).await;
		let manager = manager(config_for(&[("a", &mock)]));

		let token = jsonwebtoken::encode(
			&Header::default(),
			&service_account_claims("default", "app"),
			&EncodingKey::from_secret(b"shared-secret"),
		)
		.unwrap();
		let err = manager.verify("a", &token).await.unwrap_err();
		assert!(matches!(err, VerifyError::UnsupportedAlgorithm(_)));
		assert_eq!(mock.state.discovery_hits.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn garbage_token_is_malformed() {
		let key = TestKey::new(3, "k");
		let mock = MockCluster::start(&[&key]).await;
		let manager = manager(config_for(&[("a", &mock)]));

		let err = manager.verify("a", "invalid.token.here").await.unwrap_err();
		assert!(matches!(err, VerifyError::Malformed(_)));
		assert_eq!(mock.state.discovery_hits.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn concurrent_first_calls_build_one_entry() {
		let key = TestKey::new(4, "k");
		let mock = MockCluster::start(&[&key]).await;
		let manager = Arc::new(manager(config_for(&[("a", &mock)])));
		let token = key.mint(service_account_claims("default", "app"));

		let handles: Vec<_> = (0..8)
			.map(|_| {
				let manager = manager.clone();
				let token = token.clone();
				tokio::spawn(async move { manager.verify("a", &token).await })
			})
			.collect();
		for handle in handles {
			assert!(handle.await.unwrap().is_ok());
		}
		assert_eq!(mock.state.discovery_hits.load(Ordering::SeqCst), 1);
		assert_eq!(mock.state.jwks_hits.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn invalidation_rebuilds_with_current_credentials() {
		let key = TestKey::new(5, "k");
		let mock = MockCluster::start(&[&key]).await;
		let store = Arc::new(CredentialStore::in_memory());
		store.set("b", creds("old-bearer")).await.unwrap();
		let manager = VerifierManager::new(
			Arc::new(config_for(&[("b", &mock)])),
			Some(store.clone()),
		);
		let token = key.mint(service_account_claims("default", "app"));

		manager.verify("b", &token).await.unwrap();
		assert_eq!(mock.state.last_bearer().as_deref(), Some("old-bearer"));

		store.set("b", creds("new-bearer")).await.unwrap();
		manager.invalidate_verifier("b").await;
		assert!(!manager.is_cached("b").await);

		manager.verify("b", &token).await.unwrap();
		assert_eq!(mock.state.discovery_hits.load(Ordering::SeqCst), 2);
		assert_eq!(mock.state.last_bearer().as_deref(), Some("new-bearer"));
	}

	#[tokio::test]
	async fn token_file_is_used_without_registered_credentials() {
		let key = TestKey::new(5, "k");
		let mock = MockCluster::start(&[&key]).await;
		let mut token_file = tempfile::NamedTempFile::new().unwrap();
		writeln!(token_file, "projected-token").unwrap();

		let mut config = config_for(&[("b", &mock)]);
		if let Some(cluster) = config.clusters.get_mut("b") {
			cluster.token_path = Some(token_file.path().to_path_buf());
		}
		let manager = manager(config);
		manager
			.verify("b", &key.mint(service_account_claims("default", "app")))
			.await
			.unwrap();
		assert_eq!(mock.state.last_bearer().as_deref(), Some("projected-token"));
	}

	#[tokio::test]
	async fn unknown_kid_refreshes_key_set() {
		let old = TestKey::new(6, "old");
		let rotated = TestKey::new(7, "rotated");
		let mock = MockCluster::start(&[&old]).await;
		let mut config = config_for(&[("a", &mock)]);
		config.oidc.jwks_min_refresh = Duration::ZERO;
		let manager = manager(config);

		manager
			.verify("a", &old.mint(service_account_claims("default", "app")))
			.await
			.unwrap();
		mock.publish(&[&old, &rotated]);
		manager
			.verify("a", &rotated.mint(service_account_claims("default", "app")))
			.await
			.unwrap();
		assert_eq!(mock.state.jwks_hits.load(Ordering::SeqCst), 2);
		assert_eq!(mock.state.discovery_hits.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn unknown_kid_refresh_is_rate_limited() {
		let old = TestKey::new(6, "old");
		let rotated = TestKey::new(7, "rotated");
		let mock = MockCluster::start(&[&old]).await;
		let mut config = config_for(&[("a", &mock)]);
		config.oidc.jwks_min_refresh = Duration::from_secs(3600);
		let manager = manager(config);

		manager
			.verify("a", &old.mint(service_account_claims("default", "app")))
			.await
			.unwrap();
		mock.publish(&[&old, &rotated]);
		let err = manager
			.verify("a", &rotated.mint(service_account_claims("default", "app")))
			.await
			.unwrap_err();
		assert!(matches!(err, VerifyError::KeyNotFound));
		assert_eq!(mock.state.jwks_hits.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn shared_signing_key_is_refused() {
		let shared = TestKey::new(8, "shared");
		let mock_a = MockCluster::start(&[&shared]).await;
		let mock_b = MockCluster::start(&[&shared]).await;
		let manager = manager(config_for(&[("a", &mock_a), ("b", &mock_b)]));
		let token = shared.mint(service_account_claims("default", "app"));

		assert!(manager.verify("a", &token).await.is_ok());
		let err = manager.verify("b", &token).await.unwrap_err();
		assert!(matches!(err, VerifyError::KeyCollision { ref other, .. } if other == "a"));
		assert!(matches!(
			manager.verify("a", &token).await,
			Err(VerifyError::KeyCollision { .. })
		));
	}

	#[tokio::test]
	async fn failed_discovery_is_not_cached() {
		let key = TestKey::new(9, "k");
		let mock = MockCluster::start(&[&key]).await;
		mock.state.fail_discovery.store(true, Ordering::SeqCst);
		let mut config = config_for(&[("a", &mock)]);
		config.oidc.failure_backoff = Duration::ZERO;
		let manager = manager(config);
		let token = key.mint(service_account_claims("default", "app"));

		let err = manager.verify("a", &token).await.unwrap_err();
		assert_eq!(err.kind(), VerifyErrorKind::Discovery);
		assert!(err.is_transient());
		assert!(!manager.is_cached("a").await);

		mock.state.fail_discovery.store(false, Ordering::SeqCst);
		assert!(manager.verify("a", &token).await.is_ok());
	}

	#[tokio::test]
	async fn failed_discovery_fails_fast_until_backoff_or_invalidation() {
		let key = TestKey::new(9, "k");
		let mock = MockCluster::start(&[&key]).await;
		mock.state.fail_discovery.store(true, Ordering::SeqCst);
		let mut config = config_for(&[("a", &mock)]);
		config.oidc.failure_backoff = Duration::from_secs(3600);
		let manager = manager(config);
		let token = key.mint(service_account_claims("default", "app"));

		assert!(manager.verify("a", &token).await.is_err());
		mock.state.fail_discovery.store(false, Ordering::SeqCst);
		let err = manager.verify("a", &token).await.unwrap_err();
		assert_eq!(err.kind(), VerifyErrorKind::Discovery);
		assert_eq!(mock.state.discovery_hits.load(Ordering::SeqCst), 1);

		manager.invalidate_verifier("a").await;
		assert!(manager.verify("a", &token).await.is_ok());
		assert_eq!(mock.state.discovery_hits.load(Ordering::SeqCst), 2);
	}
}
