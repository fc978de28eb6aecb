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

//! A keyless code-signing client: bootstrap a TUF-distributed trust root,
//! obtain a short-lived certificate from a certificate authority through
//! OIDC identity attestation with proof-of-possession, sign an artifact
//! digest, and anchor the signature in a transparency log.
//!
//! The entry point is [`sign::Signer`], built from a [`config::SigningConfig`],
//! a [`trust::TrustRoot`], and an [`oauth::OidcFlow`]:
//!
//! ```no_run
//! # async fn example(initial_root_json: &[u8]) -> signet::errors::Result<()> {
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! signet::crypto::install_crypto_provider();
//!
//! let config = signet::config::SigningConfig::sigstore_defaults();
//! let trust_root = Arc::new(
//!     signet::trust::sigstore::SigstoreTrustRoot::new(None, initial_root_json).await?,
//! );
//! let oidc = Arc::new(signet::oauth::browser::BrowserFlow::new(
//!     config.oidc_issuer.clone(),
//!     config.oidc_client_id.clone(),
//!     0,
//! ));
//! let signer = signet::sign::Signer::new(config, trust_root, oidc);
//!
//! let bundle = signer.sign_file("artifact.bin", Duration::from_secs(60)).await?;
//! println!("{}", bundle.digest);
//! # Ok(())
//! # }
//! ```

pub mod ca;
pub mod config;
pub mod crypto;
pub mod errors;
pub mod oauth;
pub mod rekor;
pub mod sign;
pub mod trust;

pub use errors::{Result, SigstoreError};
