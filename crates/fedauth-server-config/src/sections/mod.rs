// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sections for fedauth-server.

pub mod clusters;
pub mod http;
pub mod logging;
pub mod oidc;
pub mod persistence;

pub use clusters::{AgentConfig, BootstrapConfig, ClusterConfig};
pub use http::{HttpConfig, HttpConfigLayer};
pub use logging::{LoggingConfig, LoggingConfigLayer};
pub use oidc::{OidcConfig, OidcConfigLayer};
pub use persistence::{PersistenceConfig, PersistenceConfigLayer};
