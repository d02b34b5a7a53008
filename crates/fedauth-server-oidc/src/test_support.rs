// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Deterministic signing keys and a mock cluster API server.
//!
//! Compiled for this crate's unit tests and, through the `test-support`
//! feature, for the integration suites of crates built on top of it.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use ed25519_dalek::pkcs8::EncodePrivateKey;
use ed25519_dalek::SigningKey;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

pub const IN_CLUSTER_ISSUER: &str = "https://kubernetes.default.svc.cluster.local";

const TOKEN_REVIEW_PATH: &str = "/apis/authentication.k8s.io/v1/tokenreviews";

pub struct TestKey {
	signing: SigningKey,
	kid: String,
}

impl TestKey {
	pub fn new(seed: u8, kid: &str) -> Self {
		Self {
			signing: SigningKey::from_bytes(&[seed; 32]),
			kid: kid.to_string(),
		}
	}

	pub fn jwk(&self) -> Value {
		json!({
			"kty": "OKP",
			"crv": "Ed25519",
			"use": "sig",
			"alg": "EdDSA",
			"kid": self.kid,
			"x": URL_SAFE_NO_PAD.encode(self.signing.verifying_key().to_bytes()),
		})
	}

	pub fn mint(&self, claims: Value) -> String {
		let mut header = Header::new(Algorithm::EdDSA);
		header.kid = Some(self.kid.clone());
		self.encode(header, claims)
	}

	pub fn mint_without_kid(&self, claims: Value) -> String {
		self.encode(Header::new(Algorithm::EdDSA), claims)
	}

	/// A ServiceAccount token for `subject`, issued by `issuer`.
	pub fn service_account_token(&self, issuer: &str, subject: &str) -> String {
		let now = jsonwebtoken::get_current_timestamp();
		let namespace = subject.split(':').nth(2).unwrap_or_default();
		self.mint(json!({
			"iss": issuer,
			"sub": subject,
			"aud": [issuer],
			"iat": now,
			"exp": now + 600,
			"kubernetes.io": {"namespace": namespace}
		}))
	}

	fn encode(&self, header: Header, claims: Value) -> String {
		let der = self.signing.to_pkcs8_der().expect("pkcs8 der");
		jsonwebtoken::encode(&header, &claims, &EncodingKey::from_ed_der(der.as_bytes()))
			.expect("token")
	}
}

/// Claims of a ServiceAccount token issued by the in-cluster issuer.
pub fn service_account_claims(namespace: &str, name: &str) -> Value {
	let now = jsonwebtoken::get_current_timestamp();
	json!({
		"iss": IN_CLUSTER_ISSUER,
		"sub": format!("system:serviceaccount:{namespace}:{name}"),
		"aud": [IN_CLUSTER_ISSUER],
		"iat": now,
		"exp": now + 600,
		"kubernetes.io": {
			"namespace": namespace,
			"serviceaccount": {"name": name, "uid": "sa-uid"}
		}
	})
}

#[derive(Default)]
pub struct MockState {
	pub advertised_issuer: Mutex<String>,
	pub jwks: Mutex<Value>,
	pub discovery_hits: AtomicUsize,
	pub jwks_hits: AtomicUsize,
	pub review_hits: AtomicUsize,
	/// Bearers presented on discovery and key-set requests.
	pub bearers: Mutex<Vec<Option<String>>>,
	pub review_bearers: Mutex<Vec<Option<String>>>,
	pub review_username: Mutex<String>,
	pub fail_discovery: AtomicBool,
}

fn bearer(headers: &HeaderMap) -> Option<String> {
	headers
		.get("authorization")
		.and_then(|v| v.to_str().ok())
		.and_then(|v| v.strip_prefix("Bearer "))
		.map(str::to_string)
}

impl MockState {
	pub fn last_bearer(&self) -> Option<String> {
		self.bearers.lock().unwrap().last().cloned().flatten()
	}
}

/// A cluster API server serving discovery, its key set and TokenReview.
pub struct MockCluster {
	pub addr: SocketAddr,
	pub state: Arc<MockState>,
}

impl MockCluster {
	/// Publishes `keys` under the in-cluster issuer host, so clients must
	/// rewrite the key-set URL to reach it.
	pub async fn start(keys: &[&TestKey]) -> Self {
		Self::serve(keys, Some(IN_CLUSTER_ISSUER)).await
	}

	pub async fn remote(key: &TestKey) -> Self {
		Self::serve(&[key], Some(IN_CLUSTER_ISSUER)).await
	}

	/// Advertises its key set under its own address.
	pub async fn local(key: &TestKey) -> Self {
		Self::serve(&[key], None).await
	}

	async fn serve(keys: &[&TestKey], advertised: Option<&str>) -> Self {
		let state = Arc::new(MockState::default());
		*state.review_username.lock().unwrap() = "system:serviceaccount:payments:api".to_string();

		let app = Router::new()
			.route("/.well-known/openid-configuration", get(discovery))
			.route("/openid/v1/jwks", get(jwks))
			.route(TOKEN_REVIEW_PATH, post(token_review))
			.with_state(state.clone());
		let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
		let addr = listener.local_addr().expect("addr");
		*state.advertised_issuer.lock().unwrap() = advertised
			.map(str::to_string)
			.unwrap_or_else(|| format!("http://{addr}"));
		tokio::spawn(async move {
			let _ = axum::serve(listener, app).await;
		});

		let mock = Self { addr, state };
		mock.publish(keys);
		mock
	}

	pub fn url(&self) -> String {
		format!("http://{}", self.addr)
	}

	pub fn publish(&self, keys: &[&TestKey]) {
		*self.state.jwks.lock().unwrap() =
			json!({ "keys": keys.iter().map(|k| k.jwk()).collect::<Vec<_>>() });
	}

	pub fn discovery_hits(&self) -> usize {
		self.state.discovery_hits.load(Ordering::SeqCst)
	}

	pub fn review_hits(&self) -> usize {
		self.state.review_hits.load(Ordering::SeqCst)
	}

	pub fn last_key_set_bearer(&self) -> Option<String> {
		self.state.last_bearer()
	}

	pub fn last_review_bearer(&self) -> Option<String> {
		self.state.review_bearers.lock().unwrap().last().cloned().flatten()
	}
}

async fn discovery(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
	state.bearers.lock().unwrap().push(bearer(&headers));
	state.discovery_hits.fetch_add(1, Ordering::SeqCst);
	if state.fail_discovery.load(Ordering::SeqCst) {
		return (StatusCode::SERVICE_UNAVAILABLE, "unavailable").into_response();
	}
	let issuer = state.advertised_issuer.lock().unwrap().clone();
	Json(json!({
		"issuer": issuer,
		"jwks_uri": format!("{issuer}/openid/v1/jwks"),
	}))
	.into_response()
}

async fn jwks(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Json<Value> {
	state.bearers.lock().unwrap().push(bearer(&headers));
	state.jwks_hits.fetch_add(1, Ordering::SeqCst);
	let jwks = state.jwks.lock().unwrap().clone();
	Json(jwks)
}

/// Authenticates every non-empty token; the envelope's type fields are left
/// empty, as some API servers do.
async fn token_review(
	State(state): State<Arc<MockState>>,
	headers: HeaderMap,
	Json(request): Json<Value>,
) -> Response {
	state.review_hits.fetch_add(1, Ordering::SeqCst);
	state.review_bearers.lock().unwrap().push(bearer(&headers));
	if request["spec"]["token"].as_str().unwrap_or_default().is_empty() {
		return (StatusCode::BAD_REQUEST, "token is required").into_response();
	}
	let username = state.review_username.lock().unwrap().clone();
	Json(json!({
		"spec": request["spec"],
		"status": {
			"authenticated": true,
			"user": {
				"username": username,
				"uid": "sa-uid",
				"groups": [
					"system:serviceaccounts",
					"system:serviceaccounts:payments",
					"system:authenticated"
				]
			},
			"audiences": request["spec"]["audiences"].as_array().cloned().unwrap_or_default()
		}
	}))
	.into_response()
}
