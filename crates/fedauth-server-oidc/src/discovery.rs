// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use serde::Deserialize;
use url::Url;

/// The fields of `/.well-known/openid-configuration` that are used.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryDocument {
	#[serde(default)]
	pub issuer: Option<String>,
	pub jwks_uri: String,
}

pub fn discovery_url(endpoint: &str) -> String {
	format!(
		"{}/.well-known/openid-configuration",
		endpoint.trim_end_matches('/')
	)
}

/// Points the advertised key-set URL at `endpoint`.
///
/// A cluster's discovery document advertises its key set under the issuer
/// host (e.g. `https://kubernetes.default.svc.cluster.local/openid/v1/jwks`),
/// which is unreachable from outside the cluster. When the advertised host
/// differs from `endpoint`'s, the path is kept and re-rooted under `endpoint`,
/// including any path prefix `endpoint` carries.
pub fn rewrite_jwks_url(jwks_uri: &str, endpoint: &str) -> String {
	let base = endpoint.trim_end_matches('/');
	let (Ok(advertised), Ok(target)) = (Url::parse(jwks_uri), Url::parse(endpoint)) else {
		if jwks_uri.starts_with('/') {
			return format!("{base}{jwks_uri}");
		}
		return jwks_uri.to_string();
	};

	let same_origin = advertised.scheme() == target.scheme()
		&& advertised.host_str() == target.host_str()
		&& advertised.port_or_known_default() == target.port_or_known_default();
	if same_origin {
		return jwks_uri.to_string();
	}

	match advertised.query() {
		Some(query) => format!("{base}{}?{query}", advertised.path()),
		None => format!("{base}{}", advertised.path()),
	}
}
