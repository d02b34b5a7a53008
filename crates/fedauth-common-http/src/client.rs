// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! HTTP client construction.

use reqwest::{Certificate, Client, ClientBuilder};

/// Creates a client builder with the standard User-Agent header.
///
/// # Example
/// ```ignore
/// let client = fedauth_common_http::builder()
///     .timeout(Duration::from_secs(10))
///     .build()?;
/// ```
pub fn builder() -> ClientBuilder {
	Client::builder().user_agent(user_agent())
}

/// Like [`builder`], additionally trusting the given PEM bundle.
///
/// An empty bundle leaves the system roots as the only trust anchors. Every
/// certificate in a multi-certificate bundle is added.
pub fn builder_with_ca(ca_pem: &[u8]) -> reqwest::Result<ClientBuilder> {
	let mut builder = builder();
	if ca_pem.iter().all(u8::is_ascii_whitespace) {
		return Ok(builder);
	}
	for cert in Certificate::from_pem_bundle(ca_pem)? {
		builder = builder.add_root_certificate(cert);
	}
	Ok(builder)
}

/// Returns the User-Agent string: `kube-federated-auth/{version} ({os}-{arch})`.
pub fn user_agent() -> String {
	format!(
		"kube-federated-auth/{} ({}-{})",
		env!("CARGO_PKG_VERSION"),
		std::env::consts::OS,
		std::env::consts::ARCH
	)
}

/// Strips control characters and truncates a response body so it can be
/// embedded in an error message.
pub fn sanitize_body_for_error(body: &str, max_len: usize) -> String {
	let sanitized: String = body
		.chars()
		.filter(|c| !c.is_control() || *c == ' ')
		.take(max_len)
		.collect();
	if body.chars().count() > max_len {
		format!("{sanitized}...")
	} else {
		sanitized
	}
}
