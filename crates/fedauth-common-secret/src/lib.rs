// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Redacting wrapper for service account tokens.
//!
//! Every bearer token that passes through the federation service (reviewed
//! tokens, registered agent credentials, static cluster tokens) is held in a
//! [`Secret`]. Debug, Display and Serialize all print [`REDACTED`], so a token
//! can be put in a `tracing` field or a config dump without leaking. The inner
//! value is zeroed on drop and must be read through [`Secret::expose`].
//!
//! ```
//! use fedauth_common_secret::SecretString;
//!
//! let token = SecretString::new("eyJhbGciOi...".to_string());
//! assert_eq!(format!("{token}"), "[REDACTED]");
//! assert_eq!(token.expose(), "eyJhbGciOi...");
//! ```

use std::fmt;
use zeroize::Zeroize;

/// Placeholder printed in place of any secret value.
pub const REDACTED: &str = "[REDACTED]";

/// Wraps a sensitive value. No `Deref`: callers opt in with [`Secret::expose`].
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct Secret<T>
where
	T: Zeroize,
{
	inner: T,
}

/// Secret bearer tokens.
pub type SecretString = Secret<String>;

impl<T> Secret<T>
where
	T: Zeroize,
{
	pub fn new(inner: T) -> Self {
		Self { inner }
	}

	pub fn expose(&self) -> &T {
		&self.inner
	}
}

impl SecretString {
	/// True when the token is empty or only whitespace.
	pub fn is_blank(&self) -> bool {
		self.inner.trim().is_empty()
	}
}

impl From<String> for SecretString {
	fn from(value: String) -> Self {
		Self::new(value)
	}
}

impl<T> Clone for Secret<T>
where
	T: Zeroize + Clone,
{
	fn clone(&self) -> Self {
		Self {
			inner: self.inner.clone(),
		}
	}
}

impl<T> fmt::Debug for Secret<T>
where
	T: Zeroize,
{
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("Secret").field(&REDACTED).finish()
	}
}

impl<T> fmt::Display for Secret<T>
where
	T: Zeroize,
{
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(REDACTED)
	}
}

impl<T> PartialEq for Secret<T>
where
	T: Zeroize + PartialEq,
{
	fn eq(&self, other: &Self) -> bool {
		self.inner == other.inner
	}
}

impl<T> Eq for Secret<T> where T: Zeroize + Eq {}

#[cfg(feature = "serde")]
mod serde_impl {
	use super::{Secret, REDACTED};
	use serde::{Deserialize, Deserializer, Serialize, Serializer};
	use zeroize::Zeroize;

	impl<T> Serialize for Secret<T>
	where
		T: Zeroize,
	{
		fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
		where
			S: Serializer,
		{
			serializer.serialize_str(REDACTED)
		}
	}

	impl<'de, T> Deserialize<'de> for Secret<T>
	where
		T: Deserialize<'de> + Zeroize,
	{
		fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
		where
			D: Deserializer<'de>,
		{
			T::deserialize(deserializer).map(Secret::new)
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	/// Purpose: a token put in a debug log line must not appear verbatim.
	#[test]
	fn debug_hides_token() {
		let token = SecretString::new("eyJhbGciOiJSUzI1NiJ9.payload.sig".to_string());
		let out = format!("{token:?}");
		assert_eq!(out, "Secret(\"[REDACTED]\")");
	}

	#[test]
	fn blank_detection() {
		assert!(SecretString::new("   ".to_string()).is_blank());
		assert!(SecretString::new(String::new()).is_blank());
		assert!(!SecretString::new("tok".to_string()).is_blank());
	}

	#[test]
	fn option_wrapper_still_redacts() {
		let token: Option<SecretString> = Some("abc123".to_string().into());
		assert!(!format!("{token:?}").contains("abc123"));
	}

	#[cfg(feature = "serde")]
	#[test]
	fn serialize_redacts_and_deserialize_keeps_value() {
		let token: SecretString = serde_json::from_str(r#""real-token""#).unwrap();
		assert_eq!(token.expose(), "real-token");
		assert_eq!(serde_json::to_string(&token).unwrap(), r#""[REDACTED]""#);
	}

	proptest! {
		#[test]
		fn display_never_leaks(inner in "[a-zA-Z0-9._-]{8,64}") {
			prop_assume!(!REDACTED.contains(&inner));
			let token = SecretString::new(inner.clone());
			let rendered = format!("{token}");
			prop_assert!(!rendered.contains(&inner));
		}
	}
}
