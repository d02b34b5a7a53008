// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::path::PathBuf;
use thiserror::Error;

pub type CredentialResult<T> = Result<T, CredentialError>;

#[derive(Error, Debug)]
pub enum CredentialError {
	/// The in-memory update was applied; only the durable write failed.
	#[error("persisting credentials for cluster {cluster}: {message}")]
	Persistence { cluster: String, message: String },

	#[error("credential backend error: {message}")]
	Backend { message: String },

	/// Entries that could not be decoded. Valid entries were still loaded.
	#[error("corrupt persisted credentials for cluster(s): {}", clusters.join(", "))]
	Corrupt { clusters: Vec<String> },

	#[error("reading {path}: {source}")]
	FileRead {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("invalid base64 CA certificate: {0}")]
	InvalidCaEncoding(#[from] base64::DecodeError),
}

impl From<fedauth_server_k8s::K8sError> for CredentialError {
	fn from(err: fedauth_server_k8s::K8sError) -> Self {
		CredentialError::Backend {
			message: err.to_string(),
		}
	}
}
