// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! ServiceAccount JWT verification against each trusted cluster's published keys.
//!
//! [`VerifierManager`] lazily builds one verification context per cluster:
//! an HTTP transport carrying the cluster's CA and bearer credential, the
//! discovered key-set URL and a cached key set. Verification only touches
//! public key material; the token being verified never leaves the process.

mod claims;
mod discovery;
mod error;
mod keys;
mod manager;
mod transport;

pub use claims::Claims;
pub use discovery::{discovery_url, rewrite_jwks_url, DiscoveryDocument};
pub use error::{VerifyError, VerifyErrorKind, VerifyResult};
pub use keys::{is_algorithm_allowed, key_fingerprint};
pub use manager::VerifierManager;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
