//
// Copyright 2021 The Sigstore Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Typed signing configuration (§9: "builder-with-typed-config").

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::trust::sigstore::constants;

/// A clock injection point so tests can fix "now" for freshness checks
/// without depending on the wall clock.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Configuration for a [`crate::sign::Signer`].
///
/// Construct via [`SigningConfig::sigstore_defaults`] for the well-known
/// public-good instance, or build one field at a time for a private
/// deployment.
#[derive(Clone)]
pub struct SigningConfig {
    pub tuf_metadata_base: String,
    pub tuf_target_base: String,
    pub oidc_issuer: String,
    pub oidc_client_id: String,
    pub fulcio_url: String,
    pub rekor_url: String,
    pub use_ambient_credentials: bool,
    pub http: reqwest::Client,
    pub clock: Clock,
    pub request_timeout: Duration,
}

impl SigningConfig {
    /// The well-known public-good instance values, TUF remote, OIDC
    /// issuer, CA, and transparency log, matching constants published by
    /// the public Sigstore deployment.
    pub fn sigstore_defaults() -> Self {
        Self {
            tuf_metadata_base: constants::SIGSTORE_METADATA_BASE.to_string(),
            tuf_target_base: constants::SIGSTORE_TARGET_BASE.to_string(),
            oidc_issuer: constants::OAUTH_ISSUER.to_string(),
            oidc_client_id: constants::OAUTH_CLIENT_ID.to_string(),
            fulcio_url: constants::FULCIO_URL.to_string(),
            rekor_url: constants::REKOR_URL.to_string(),
            use_ambient_credentials: false,
            http: default_http_client(),
            clock: Arc::new(Utc::now),
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_ambient_credentials(mut self, enabled: bool) -> Self {
        self.use_ambient_credentials = enabled;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }
}

fn default_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .expect("default reqwest client configuration is always valid")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sigstore_defaults_point_at_the_public_good_instance() {
        let config = SigningConfig::sigstore_defaults();
        assert!(config.fulcio_url.contains("fulcio"));
        assert!(config.rekor_url.contains("rekor"));
        assert!(!config.use_ambient_credentials);
    }

    #[test]
    fn clock_override_is_used_for_now() {
        let fixed = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let config = SigningConfig::sigstore_defaults().with_clock(Arc::new(move || fixed));
        assert_eq!(config.now(), fixed);
    }
}
