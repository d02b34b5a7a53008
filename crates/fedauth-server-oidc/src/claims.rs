// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Verified ServiceAccount token claims.
//!
//! The `kubernetes.io` claim is kept as an untyped map so fields added by
//! newer API servers pass through; the accessors below read the subset the
//! identity-review contract needs.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

const SERVICE_ACCOUNT_PREFIX: &str = "system:serviceaccount:";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
	/// Name of the configured cluster whose key set verified the token.
	pub cluster: String,
	#[serde(rename = "iss")]
	pub issuer: String,
	#[serde(rename = "sub")]
	pub subject: String,
	#[serde(rename = "aud", default, deserialize_with = "one_or_many")]
	pub audience: Vec<String>,
	#[serde(rename = "exp")]
	pub expiry: i64,
	#[serde(rename = "iat", default)]
	pub issued_at: i64,
	#[serde(rename = "nbf", default, skip_serializing_if = "Option::is_none")]
	pub not_before: Option<i64>,
	#[serde(
		rename = "kubernetes.io",
		default,
		skip_serializing_if = "Option::is_none"
	)]
	pub kubernetes: Option<Map<String, Value>>,
}

/// Payload as it appears in the JWT, before the cluster name is attached.
#[derive(Debug, Deserialize)]
pub(crate) struct RawClaims {
	#[serde(default)]
	iss: String,
	#[serde(default)]
	sub: String,
	#[serde(default, deserialize_with = "one_or_many")]
	aud: Vec<String>,
	exp: i64,
	#[serde(default)]
	iat: i64,
	#[serde(default)]
	nbf: Option<i64>,
	#[serde(rename = "kubernetes.io", default)]
	kubernetes: Option<Map<String, Value>>,
}

impl RawClaims {
	pub(crate) fn into_claims(self, cluster: &str) -> Claims {
		Claims {
			cluster: cluster.to_string(),
			issuer: self.iss,
			subject: self.sub,
			audience: self.aud,
			expiry: self.exp,
			issued_at: self.iat,
			not_before: self.nbf,
			kubernetes: self.kubernetes,
		}
	}
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
	D: Deserializer<'de>,
{
	#[derive(Deserialize)]
	#[serde(untagged)]
	enum OneOrMany {
		One(String),
		Many(Vec<String>),
	}

	Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
		Some(OneOrMany::One(s)) => vec![s],
		Some(OneOrMany::Many(v)) => v,
		None => Vec::new(),
	})
}

impl Claims {
	fn k8s_str(&self, path: &[&str]) -> Option<&str> {
		let (last, parents) = path.split_last()?;
		let mut map = self.kubernetes.as_ref()?;
		for key in parents {
			map = map.get(*key)?.as_object()?;
		}
		map.get(*last)?.as_str()
	}

	fn subject_parts(&self) -> Option<(&str, &str)> {
		self
			.subject
			.strip_prefix(SERVICE_ACCOUNT_PREFIX)?
			.split_once(':')
	}

	pub fn namespace(&self) -> Option<&str> {
		self
			.k8s_str(&["namespace"])
			.or_else(|| self.subject_parts().map(|(ns, _)| ns))
	}

	pub fn service_account_name(&self) -> Option<&str> {
		self
			.k8s_str(&["serviceaccount", "name"])
			.or_else(|| self.subject_parts().map(|(_, name)| name))
	}

	pub fn service_account_uid(&self) -> Option<&str> {
		self.k8s_str(&["serviceaccount", "uid"])
	}

	pub fn pod_name(&self) -> Option<&str> {
		self.k8s_str(&["pod", "name"])
	}

	pub fn pod_uid(&self) -> Option<&str> {
		self.k8s_str(&["pod", "uid"])
	}

	/// Groups the API server assigns to a ServiceAccount identity.
	pub fn groups(&self) -> Vec<String> {
		match self.namespace() {
			Some(ns) if self.subject.starts_with(SERVICE_ACCOUNT_PREFIX) => vec![
				"system:serviceaccounts".to_string(),
				format!("system:serviceaccounts:{ns}"),
				"system:authenticated".to_string(),
			],
			_ => vec!["system:authenticated".to_string()],
		}
	}

	/// The `authentication.kubernetes.io/*` extra fields of a bound token.
	pub fn extra(&self) -> BTreeMap<String, Vec<String>> {
		let fields = [
			("pod-name", self.pod_name()),
			("pod-uid", self.pod_uid()),
			("node-name", self.k8s_str(&["node", "name"])),
			("node-uid", self.k8s_str(&["node", "uid"])),
		];
		fields
			.into_iter()
			.filter_map(|(key, value)| {
				value.map(|v| {
					(
						format!("authentication.kubernetes.io/{key}"),
						vec![v.to_string()],
					)
				})
			})
			.collect()
	}
}
