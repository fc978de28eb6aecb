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

//! Crypto primitives: key parsing, digesting, ephemeral keypair generation
//! and signing/verification.

pub mod digest;
pub mod ephemeral;
pub mod keymaterial;

use std::sync::Once;

static PROVIDER_INIT: Once = Once::new();

/// Installs the process-wide default crypto provider for TLS.
///
/// Idempotent and thread-safe: call this once at program start, before
/// constructing any [`crate::sign::Signer`]. Calling it more than once is
/// harmless.
pub fn install_crypto_provider() {
    PROVIDER_INIT.call_once(|| {
        // Best-effort: a prior call from another crate in the same process
        // may have already installed a provider, which is not an error for
        // our purposes.
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

pub use digest::{Digest, DigestAlgorithm};
pub use ephemeral::EphemeralKeypair;
pub use keymaterial::{KeyMaterial, SignatureAlgorithm};
