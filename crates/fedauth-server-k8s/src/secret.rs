// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Access to the single Secret object that backs credential persistence.

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::{
	api::{Api, Patch, PatchParams},
	Client,
};
use std::collections::BTreeMap;
use tracing::{debug, instrument};

use crate::error::K8sResult;

const FIELD_MANAGER: &str = "kube-federated-auth";

/// Reads and writes the data map of one namespaced Secret.
#[derive(Clone)]
pub struct SecretClient {
	api: Api<Secret>,
	namespace: String,
	name: String,
}

impl SecretClient {
	/// Connects with the ambient cluster identity.
	pub async fn try_default(namespace: &str, name: &str) -> K8sResult<Self> {
		let client = Client::try_default().await?;
		Ok(Self::from_client(client, namespace, name))
	}

	pub fn from_client(client: Client, namespace: &str, name: &str) -> Self {
		Self {
			api: Api::namespaced(client, namespace),
			namespace: namespace.to_string(),
			name: name.to_string(),
		}
	}

	pub fn namespace(&self) -> &str {
		&self.namespace
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	/// The Secret's data, or `None` when the Secret does not exist.
	#[instrument(skip(self), fields(namespace = %self.namespace, name = %self.name))]
	pub async fn read(&self) -> K8sResult<Option<BTreeMap<String, Vec<u8>>>> {
		let Some(secret) = self.api.get_opt(&self.name).await? else {
			debug!("credential secret not found");
			return Ok(None);
		};

		let data = secret
			.data
			.unwrap_or_default()
			.into_iter()
			.map(|(k, v)| (k, v.0))
			.collect();
		Ok(Some(data))
	}

	/// Creates or replaces the Secret's data with server-side apply.
	#[instrument(skip(self, data), fields(namespace = %self.namespace, name = %self.name, keys = data.len()))]
	pub async fn apply(&self, data: BTreeMap<String, Vec<u8>>) -> K8sResult<()> {
		let secret = Secret {
			metadata: ObjectMeta {
				name: Some(self.name.clone()),
				namespace: Some(self.namespace.clone()),
				..Default::default()
			},
			type_: Some("Opaque".to_string()),
			data: Some(
				data.into_iter()
					.map(|(k, v)| (k, ByteString(v)))
					.collect(),
			),
			..Default::default()
		};

		self
			.api
			.patch(
				&self.name,
				&PatchParams::apply(FIELD_MANAGER).force(),
				&Patch::Apply(&secret),
			)
			.await?;
		debug!("credential secret applied");
		Ok(())
	}
}
