// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Credential store for remote clusters.
//!
//! Each remote cluster's agent pushes a (bearer token, CA bundle) pair through
//! the registration endpoint. The pairs live in memory, which is the source of
//! truth for serving requests, and are written through to a durable
//! [`CredentialBackend`] on a best-effort basis.

mod backend;
mod error;
mod status;
mod store;

pub use backend::{
	decode_entries, encode_entries, CredentialBackend, DecodedEntries, KubeSecretBackend,
	MemoryBackend,
};
pub use error::{CredentialError, CredentialResult};
pub use status::{token_status, TokenState, TokenStatus, EXPIRING_SOON_THRESHOLD};
pub use store::{decode_ca_cert, CredentialStore, Credentials};
