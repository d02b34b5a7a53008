// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Key-set caching, key selection and signature verification.

use crate::claims::RawClaims;
use crate::error::{VerifyError, VerifyResult};
use jsonwebtoken::errors::{Error as JwtError, ErrorKind};
use jsonwebtoken::jwk::{
	AlgorithmParameters, EllipticCurve, Jwk, JwkSet, KeyAlgorithm, PublicKeyUse,
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::time::{Duration, Instant};

/// Asymmetric signature algorithms accepted on ServiceAccount tokens.
pub fn is_algorithm_allowed(alg: Algorithm) -> bool {
	matches!(
		alg,
		Algorithm::RS256
			| Algorithm::RS384
			| Algorithm::RS512
			| Algorithm::PS256
			| Algorithm::PS384
			| Algorithm::PS512
			| Algorithm::ES256
			| Algorithm::ES384
			| Algorithm::EdDSA
	)
}

/// Stable identity of a public key, independent of its `kid`.
///
/// Returns `None` for symmetric keys, which are never trusted.
pub fn key_fingerprint(jwk: &Jwk) -> Option<String> {
	let material = match &jwk.algorithm {
		AlgorithmParameters::RSA(rsa) => format!("RSA:{}:{}", rsa.n, rsa.e),
		AlgorithmParameters::EllipticCurve(ec) => {
			format!("EC:{:?}:{}:{}", ec.curve, ec.x, ec.y)
		}
		AlgorithmParameters::OctetKeyPair(okp) => format!("OKP:{:?}:{}", okp.curve, okp.x),
		AlgorithmParameters::OctetKey(_) => return None,
	};
	Some(hex::encode(Sha256::digest(material.as_bytes())))
}

fn declared_algorithm(alg: KeyAlgorithm) -> Option<Algorithm> {
	Some(match alg {
		KeyAlgorithm::RS256 => Algorithm::RS256,
		KeyAlgorithm::RS384 => Algorithm::RS384,
		KeyAlgorithm::RS512 => Algorithm::RS512,
		KeyAlgorithm::PS256 => Algorithm::PS256,
		KeyAlgorithm::PS384 => Algorithm::PS384,
		KeyAlgorithm::PS512 => Algorithm::PS512,
		KeyAlgorithm::ES256 => Algorithm::ES256,
		KeyAlgorithm::ES384 => Algorithm::ES384,
		KeyAlgorithm::EdDSA => Algorithm::EdDSA,
		_ => return None,
	})
}

/// Whether `jwk` can verify a signature made with `alg`.
fn jwk_supports(jwk: &Jwk, alg: Algorithm) -> bool {
	if matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption)) {
		return false;
	}
	if let Some(declared) = jwk.common.key_algorithm {
		if declared_algorithm(declared) != Some(alg) {
			return false;
		}
	}
	match (&jwk.algorithm, alg) {
		(
			AlgorithmParameters::RSA(_),
			Algorithm::RS256
			| Algorithm::RS384
			| Algorithm::RS512
			| Algorithm::PS256
			| Algorithm::PS384
			| Algorithm::PS512,
		) => true,
		(AlgorithmParameters::EllipticCurve(ec), Algorithm::ES256) => {
			ec.curve == EllipticCurve::P256
		}
		(AlgorithmParameters::EllipticCurve(ec), Algorithm::ES384) => {
			ec.curve == EllipticCurve::P384
		}
		(AlgorithmParameters::OctetKeyPair(okp), Algorithm::EdDSA) => {
			okp.curve == EllipticCurve::Ed25519
		}
		_ => false,
	}
}

/// Validation rules for a token signed with `alg`.
///
/// Audience is not checked: tokens minted for any audience are accepted and
/// the audience is reported back to the caller.
pub(crate) fn validation(alg: Algorithm, issuer: &str, leeway: Duration) -> Validation {
	let mut validation = Validation::new(alg);
	validation.set_issuer(&[issuer]);
	validation.set_required_spec_claims(&["exp", "iss"]);
	validation.validate_aud = false;
	validation.validate_exp = true;
	validation.validate_nbf = true;
	validation.leeway = leeway.as_secs();
	validation
}

/// A fetched key set.
#[derive(Debug)]
pub(crate) struct CachedKeys {
	pub jwks: JwkSet,
	pub fetched_at: Instant,
	pub fingerprints: HashSet<String>,
}

impl CachedKeys {
	pub fn new(jwks: JwkSet) -> Self {
		let fingerprints = jwks.keys.iter().filter_map(key_fingerprint).collect();
		Self {
			jwks,
			fetched_at: Instant::now(),
			fingerprints,
		}
	}

	pub fn has_kid(&self, kid: &str) -> bool {
		self
			.jwks
			.keys
			.iter()
			.any(|k| k.common.key_id.as_deref() == Some(kid))
	}

	pub fn age(&self) -> Duration {
		self.fetched_at.elapsed()
	}

	/// Verifies `token` against the keys that could have signed it.
	///
	/// With a `kid` only keys carrying that id are tried; without one every
	/// compatible key is. Claim failures on a correctly signed token are
	/// returned at once.
	pub fn decode(
		&self,
		token: &str,
		kid: Option<&str>,
		alg: Algorithm,
		validation: &Validation,
	) -> VerifyResult<RawClaims> {
		let candidates: Vec<&Jwk> = self
			.jwks
			.keys
			.iter()
			.filter(|k| kid.map_or(true, |kid| k.common.key_id.as_deref() == Some(kid)))
			.filter(|k| jwk_supports(k, alg))
			.collect();
		if candidates.is_empty() {
			return Err(VerifyError::KeyNotFound);
		}

		for jwk in candidates {
			let Ok(key) = DecodingKey::from_jwk(jwk) else {
				continue;
			};
			match jsonwebtoken::decode::<RawClaims>(token, &key, validation) {
				Ok(data) => return Ok(data.claims),
				Err(err) if is_key_mismatch(&err) => continue,
				Err(err) => return Err(map_jwt_error(err)),
			}
		}
		Err(VerifyError::InvalidSignature)
	}
}

fn is_key_mismatch(err: &JwtError) -> bool {
	matches!(
		err.kind(),
		ErrorKind::InvalidSignature
			| ErrorKind::InvalidAlgorithm
			| ErrorKind::InvalidEcdsaKey
			| ErrorKind::InvalidRsaKey(_)
			| ErrorKind::InvalidKeyFormat
			| ErrorKind::Crypto(_)
	)
}

fn map_jwt_error(err: JwtError) -> VerifyError {
	match err.kind() {
		ErrorKind::ExpiredSignature => VerifyError::Expired,
		ErrorKind::ImmatureSignature => VerifyError::NotYetValid,
		ErrorKind::InvalidIssuer => VerifyError::IssuerMismatch,
		ErrorKind::MissingRequiredClaim(claim) => {
			VerifyError::InvalidClaims(format!("missing required claim {claim}"))
		}
		ErrorKind::InvalidToken
		| ErrorKind::Base64(_)
		| ErrorKind::Json(_)
		| ErrorKind::Utf8(_) => VerifyError::Malformed(err.to_string()),
		_ => VerifyError::InvalidClaims(err.to_string()),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::TestKey;
	use serde_json::json;

	fn set_of(keys: &[&TestKey]) -> CachedKeys {
		let jwks: JwkSet =
			serde_json::from_value(json!({ "keys": keys.iter().map(|k| k.jwk()).collect::<Vec<_>>() }))
				.unwrap();
		CachedKeys::new(jwks)
	}

	fn issuer_validation() -> Validation {
		validation(
			Algorithm::EdDSA,
			"https://kubernetes.default.svc",
			Duration::from_secs(60),
		)
	}

	#[test]
	fn hmac_and_none_are_not_allowed() {
		assert!(!is_algorithm_allowed(Algorithm::HS256));
		assert!(!is_algorithm_allowed(Algorithm::HS512));
		assert!(is_algorithm_allowed(Algorithm::RS256));
		assert!(is_algorithm_allowed(Algorithm::EdDSA));
	}

	#[test]
	fn fingerprint_ignores_kid() {
		let key = TestKey::new(7, "first");
		let renamed = TestKey::new(7, "second");
		let other = TestKey::new(8, "first");
		let fp = |k: &TestKey| key_fingerprint(&serde_json::from_value(k.jwk()).unwrap());
		assert_eq!(fp(&key), fp(&renamed));
		assert_ne!(fp(&key), fp(&other));
	}

	#[test]
	fn symmetric_keys_have_no_fingerprint() {
		let jwk: Jwk = serde_json::from_value(json!({
			"kty": "oct",
			"kid": "hmac",
			"k": "c2VjcmV0"
		}))
		.unwrap();
		assert!(key_fingerprint(&jwk).is_none());
	}

	#[test]
	fn decodes_with_matching_kid() {
		let key = TestKey::new(1, "k1");
		let keys = set_of(&[&key]);
		let token = key.mint(json!({
			"iss": "https://kubernetes.default.svc",
			"sub": "system:serviceaccount:default:app",
			"exp": jsonwebtoken::get_current_timestamp() + 300,
		}));
		let claims = keys
			.decode(&token, Some("k1"), Algorithm::EdDSA, &issuer_validation())
			.unwrap()
			.into_claims("a");
		assert_eq!(claims.subject, "system:serviceaccount:default:app");
		assert!(keys.has_kid("k1"));
		assert!(!keys.has_kid("k2"));
	}

	#[test]
	fn unknown_kid_is_key_not_found() {
		let key = TestKey::new(1, "k1");
		let keys = set_of(&[&key]);
		let token = key.mint(json!({
			"iss": "https://kubernetes.default.svc",
			"exp": jsonwebtoken::get_current_timestamp() + 300,
		}));
		let err = keys
			.decode(&token, Some("missing"), Algorithm::EdDSA, &issuer_validation())
			.unwrap_err();
		assert!(matches!(err, VerifyError::KeyNotFound));
	}

	#[test]
	fn kidless_token_tries_every_key() {
		let wrong = TestKey::new(2, "k2");
		let right = TestKey::new(3, "k3");
		let keys = set_of(&[&wrong, &right]);
		let token = right.mint_without_kid(json!({
			"iss": "https://kubernetes.default.svc",
			"exp": jsonwebtoken::get_current_timestamp() + 300,
		}));
		assert!(keys
			.decode(&token, None, Algorithm::EdDSA, &issuer_validation())
			.is_ok());
	}

	#[test]
	fn foreign_signature_is_invalid_signature() {
		let published = TestKey::new(4, "shared-kid");
		let forger = TestKey::new(5, "shared-kid");
		let keys = set_of(&[&published]);
		let token = forger.mint(json!({
			"iss": "https://kubernetes.default.svc",
			"exp": jsonwebtoken::get_current_timestamp() + 300,
		}));
		let err = keys
			.decode(&token, Some("shared-kid"), Algorithm::EdDSA, &issuer_validation())
			.unwrap_err();
		assert!(matches!(err, VerifyError::InvalidSignature));
	}

	#[test]
	fn claim_failures_are_mapped() {
		let key = TestKey::new(6, "k6");
		let keys = set_of(&[&key]);
		let now = jsonwebtoken::get_current_timestamp();

		let expired = key.mint(json!({
			"iss": "https://kubernetes.default.svc",
			"exp": now - 3600,
		}));
		assert!(matches!(
			keys.decode(&expired, Some("k6"), Algorithm::EdDSA, &issuer_validation()),
			Err(VerifyError::Expired)
		));

		let future = key.mint(json!({
			"iss": "https://kubernetes.default.svc",
			"exp": now + 7200,
			"nbf": now + 3600,
		}));
		assert!(matches!(
			keys.decode(&future, Some("k6"), Algorithm::EdDSA, &issuer_validation()),
			Err(VerifyError::NotYetValid)
		));

		let wrong_issuer = key.mint(json!({
			"iss": "https://other.example",
			"exp": now + 300,
		}));
		assert!(matches!(
			keys.decode(&wrong_issuer, Some("k6"), Algorithm::EdDSA, &issuer_validation()),
			Err(VerifyError::IssuerMismatch)
		));
	}

	#[test]
	fn leeway_tolerates_small_skew() {
		let key = TestKey::new(9, "k9");
		let keys = set_of(&[&key]);
		let token = key.mint(json!({
			"iss": "https://kubernetes.default.svc",
			"exp": jsonwebtoken::get_current_timestamp() - 10,
		}));
		assert!(keys
			.decode(&token, Some("k9"), Algorithm::EdDSA, &issuer_validation())
			.is_ok());
	}
}
