// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Registration agent.
//!
//! Runs inside a member cluster, reads that cluster's ServiceAccount token and
//! CA bundle, and pushes them to the federated auth server so it can reach
//! the cluster's API. Registration is repeated on a fixed interval so the
//! server always holds a live token.

pub mod config;
pub mod error;
pub mod register;
pub mod runner;

pub use config::AgentConfig;
pub use error::{RegistrationError, RegistrationResult};
pub use register::{RegisterResponse, Registrar};
pub use runner::{register_with_retry, run};
