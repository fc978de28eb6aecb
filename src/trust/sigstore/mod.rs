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

//! Bootstraps and refreshes the Sigstore public-good trust root through
//! the TUF channel (§4.3), then parses the `trusted_root.json` target
//! into the [`model::TrustedRoot`] the rest of the crate consumes.
//!
//! # Example
//!
//! ```no_run
//! # use signet::trust::sigstore::SigstoreTrustRoot;
//! # use signet::errors::Result;
//! # #[tokio::main]
//! # async fn main() -> Result<()> {
//! let initial_root = std::fs::read("initial-root.json")?;
//! let trust_root = SigstoreTrustRoot::new(None, &initial_root).await?;
//! # let _ = trust_root;
//! # Ok(())
//! # }
//! ```

pub mod constants;

use std::path::PathBuf;

use sigstore_protobuf_specs::dev::sigstore::trustroot::v1::TrustedRoot as TrustedRootMessage;

use crate::errors::{Result, SigstoreError};
use crate::trust::model::TrustedRoot;
use crate::trust::tuf::{Limits, TufClient};
pub use crate::trust::TrustRoot;

/// Securely fetches the Sigstore trust root (Fulcio CAs, Rekor/CTFE logs)
/// from the public-good TUF repository.
pub struct SigstoreTrustRoot {
    trusted_root: TrustedRoot,
}

impl SigstoreTrustRoot {
    /// Bootstraps and refreshes a TUF client against the public-good
    /// instance, then fetches and parses `trusted_root.json`.
    ///
    /// `initial_root_json` is the out-of-band trust anchor every TUF
    /// client must be seeded with; it is only consulted the first time
    /// `checkout_dir` (or the default store location) has no cached root.
    pub async fn new(checkout_dir: Option<PathBuf>, initial_root_json: &[u8]) -> Result<Self> {
        let metadata_base = url::Url::parse(constants::SIGSTORE_METADATA_BASE)?;
        let target_base = url::Url::parse(constants::SIGSTORE_TARGET_BASE)?;
        let store_dir = checkout_dir.unwrap_or_else(default_store_dir);

        let http = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let mut tuf = TufClient::new(http, metadata_base, target_base, store_dir, Limits::default());
        tuf.bootstrap_trusted_root(initial_root_json).await?;
        tuf.update().await?;

        let data = tuf.get_target_bytes(constants::TRUSTED_ROOT_TARGET).await?;
        let message: TrustedRootMessage = serde_json::from_slice(&data)?;
        let trusted_root = TrustedRoot::from_message(message)?;

        Ok(Self { trusted_root })
    }
}

fn default_store_dir() -> PathBuf {
    dirs_next_cache_dir().join("signet").join("tuf")
}

/// Minimal stand-in for a user cache directory lookup; avoids pulling in
/// a platform-dirs crate for a single call site.
fn dirs_next_cache_dir() -> PathBuf {
    std::env::var_os("XDG_CACHE_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".cache")))
        .unwrap_or_else(std::env::temp_dir)
}

impl crate::trust::TrustRoot for SigstoreTrustRoot {
    fn model(&self) -> &TrustedRoot {
        &self.trusted_root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_store_dir_is_nonempty() {
        assert!(default_store_dir().to_string_lossy().contains("signet"));
    }
}
