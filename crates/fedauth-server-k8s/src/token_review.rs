// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! The `authentication.k8s.io/v1` TokenReview envelope as it appears on the wire.
//!
//! The same type is accepted from callers, forwarded to the detected cluster
//! and relayed back. Unknown envelope metadata passes through untouched.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const TOKEN_REVIEW_API_VERSION: &str = "authentication.k8s.io/v1";
pub const TOKEN_REVIEW_KIND: &str = "TokenReview";
pub const TOKEN_REVIEW_PATH: &str = "/apis/authentication.k8s.io/v1/tokenreviews";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenReview {
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub api_version: String,
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub kind: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub metadata: Option<serde_json::Value>,
	#[serde(default, skip_serializing_if = "TokenReviewSpec::is_empty")]
	pub spec: TokenReviewSpec,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub status: Option<TokenReviewStatus>,
}

#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenReviewSpec {
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub token: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub audiences: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenReviewStatus {
	#[serde(default)]
	pub authenticated: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub user: Option<UserInfo>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub audiences: Vec<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub username: String,
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub uid: String,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub groups: Vec<String>,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub extra: BTreeMap<String, Vec<String>>,
}

impl fmt::Debug for TokenReviewSpec {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("TokenReviewSpec")
			.field("token", &fedauth_common_secret::REDACTED)
			.field("audiences", &self.audiences)
			.finish()
	}
}

impl TokenReviewSpec {
	pub fn is_empty(&self) -> bool {
		self.token.is_empty() && self.audiences.is_none()
	}
}

impl TokenReview {
	/// A request envelope for `token`.
	pub fn request(token: impl Into<String>, audiences: Option<Vec<String>>) -> Self {
		Self {
			api_version: TOKEN_REVIEW_API_VERSION.to_string(),
			kind: TOKEN_REVIEW_KIND.to_string(),
			metadata: None,
			spec: TokenReviewSpec {
				token: token.into(),
				audiences,
			},
			status: None,
		}
	}

	/// A response envelope reporting `authenticated: false`.
	pub fn unauthenticated(error: impl Into<String>) -> Self {
		Self {
			api_version: TOKEN_REVIEW_API_VERSION.to_string(),
			kind: TOKEN_REVIEW_KIND.to_string(),
			metadata: None,
			spec: TokenReviewSpec::default(),
			status: Some(TokenReviewStatus {
				authenticated: false,
				error: Some(error.into()),
				..Default::default()
			}),
		}
	}

	/// Fills `apiVersion` and `kind`, which the API server leaves empty on
	/// some responses.
	pub fn normalize_envelope(mut self) -> Self {
		self.api_version = TOKEN_REVIEW_API_VERSION.to_string();
		self.kind = TOKEN_REVIEW_KIND.to_string();
		self
	}

	pub fn is_authenticated(&self) -> bool {
		self.status.as_ref().is_some_and(|s| s.authenticated)
	}

	pub fn user(&self) -> Option<&UserInfo> {
		self.status.as_ref().and_then(|s| s.user.as_ref())
	}

	pub fn error(&self) -> Option<&str> {
		self.status.as_ref().and_then(|s| s.error.as_deref())
	}
}

impl UserInfo {
	/// Namespace parsed from `system:serviceaccount:{namespace}:{name}`.
	pub fn namespace(&self) -> Option<&str> {
		self.service_account_parts().map(|(ns, _)| ns)
	}

	pub fn service_account_name(&self) -> Option<&str> {
		self.service_account_parts().map(|(_, name)| name)
	}

	fn service_account_parts(&self) -> Option<(&str, &str)> {
		let rest = self.username.strip_prefix("system:serviceaccount:")?;
		let (namespace, name) = rest.split_once(':')?;
		if namespace.is_empty() || name.is_empty() {
			return None;
		}
		Some((namespace, name))
	}
}

impl From<&TokenReview> for k8s_openapi::api::authentication::v1::TokenReview {
	fn from(review: &TokenReview) -> Self {
		use k8s_openapi::api::authentication::v1 as authv1;
		authv1::TokenReview {
			metadata: Default::default(),
			spec: authv1::TokenReviewSpec {
				audiences: review.spec.audiences.clone(),
				token: Some(review.spec.token.clone()),
			},
			status: None,
		}
	}
}

impl From<k8s_openapi::api::authentication::v1::TokenReview> for TokenReview {
	fn from(review: k8s_openapi::api::authentication::v1::TokenReview) -> Self {
		let status = review.status.map(|status| TokenReviewStatus {
			authenticated: status.authenticated.unwrap_or(false),
			user: status.user.map(|user| UserInfo {
				username: user.username.unwrap_or_default(),
				uid: user.uid.unwrap_or_default(),
				groups: user.groups.unwrap_or_default(),
				extra: user.extra.unwrap_or_default(),
			}),
			audiences: status.audiences.unwrap_or_default(),
			error: status.error.filter(|e| !e.is_empty()),
		});

		TokenReview {
			api_version: String::new(),
			kind: String::new(),
			metadata: None,
			spec: TokenReviewSpec {
				token: review.spec.token.unwrap_or_default(),
				audiences: review.spec.audiences,
			},
			status,
		}
		.normalize_envelope()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn parses_minimal_request() {
		let review: TokenReview = serde_json::from_value(json!({
			"apiVersion": "authentication.k8s.io/v1",
			"kind": "TokenReview",
			"spec": {"token": "abc", "audiences": ["api"]}
		}))
		.unwrap();
		assert_eq!(review.spec.token, "abc");
		assert_eq!(review.spec.audiences, Some(vec!["api".to_string()]));
		assert!(review.status.is_none());
	}

	#[test]
	fn unauthenticated_serializes_flag_and_error() {
		let value = serde_json::to_value(TokenReview::unauthenticated("nope")).unwrap();
		assert_eq!(
			value,
			json!({
				"apiVersion": "authentication.k8s.io/v1",
				"kind": "TokenReview",
				"status": {"authenticated": false, "error": "nope"}
			})
		);
	}

	#[test]
	fn normalize_fills_missing_envelope() {
		let review = TokenReview {
			status: Some(TokenReviewStatus {
				authenticated: true,
				..Default::default()
			}),
			..Default::default()
		}
		.normalize_envelope();
		assert_eq!(review.api_version, TOKEN_REVIEW_API_VERSION);
		assert_eq!(review.kind, TOKEN_REVIEW_KIND);
		assert!(review.is_authenticated());
	}

	#[test]
	fn debug_redacts_token() {
		let review = TokenReview::request("super-secret-jwt", None);
		assert!(!format!("{review:?}").contains("super-secret-jwt"));
	}

	#[test]
	fn user_info_accessors() {
		let user = UserInfo {
			username: "system:serviceaccount:payments:api".to_string(),
			uid: "7f0c".to_string(),
			..Default::default()
		};
		assert_eq!(user.namespace(), Some("payments"));
		assert_eq!(user.service_account_name(), Some("api"));

		for username in ["kubernetes-admin", "system:serviceaccount::api"] {
			let user = UserInfo {
				username: username.to_string(),
				..Default::default()
			};
			assert!(user.namespace().is_none(), "{username}");
			assert!(user.service_account_name().is_none(), "{username}");
		}
	}

	#[test]
	fn converts_from_kube_response() {
		use k8s_openapi::api::authentication::v1 as authv1;
		let upstream = authv1::TokenReview {
			metadata: Default::default(),
			spec: authv1::TokenReviewSpec {
				audiences: None,
				token: Some("t".to_string()),
			},
			status: Some(authv1::TokenReviewStatus {
				authenticated: Some(true),
				user: Some(authv1::UserInfo {
					username: Some("system:serviceaccount:default:sa".to_string()),
					uid: Some("u-1".to_string()),
					groups: Some(vec!["system:authenticated".to_string()]),
					extra: None,
				}),
				audiences: Some(vec!["https://kubernetes.default.svc".to_string()]),
				error: None,
			}),
		};

		let review = TokenReview::from(upstream);
		assert!(review.is_authenticated());
		assert_eq!(review.kind, TOKEN_REVIEW_KIND);
		assert_eq!(review.user().unwrap().uid, "u-1");
	}
}
