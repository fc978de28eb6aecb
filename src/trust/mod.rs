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

//! Trust root construction and lookup.
//!
//! [`sigstore::SigstoreTrustRoot`] is the production path: it bootstraps
//! and refreshes a TUF-distributed trust root. [`ManualTrustRoot`] wraps an
//! already-parsed [`model::TrustedRoot`] for tests and air-gapped setups
//! that obtain trust roots outside the TUF channel.

pub mod model;
pub mod sigstore;
pub mod tuf;

use webpki::types::CertificateDer;

use crate::errors::SigstoreError;
use model::TrustedRoot;

/// Common surface every trust-root source exposes to the signing
/// orchestrator and CA/transparency-log clients.
pub trait TrustRoot {
    /// The underlying validated model.
    fn model(&self) -> &TrustedRoot;

    /// DER-encoded certificate chains for every CA, including expired ones
    /// (a certificate may have been active when it was used to sign, so
    /// expiry here is not disqualifying on its own).
    fn fulcio_certs(&self) -> Result<Vec<CertificateDer<'static>>, SigstoreError> {
        let certs: Vec<_> = self
            .model()
            .cas
            .iter()
            .flat_map(|ca| ca.cert_chain.iter())
            .map(|der| CertificateDer::from(der.clone()).into_owned())
            .collect();
        if certs.is_empty() {
            Err(SigstoreError::InvalidTrustRoot(
                "no certificate authorities found".into(),
            ))
        } else {
            Ok(certs)
        }
    }
}

/// A trust root that was parsed once (e.g. from a file or test fixture)
/// rather than bootstrapped and refreshed through TUF.
pub struct ManualTrustRoot {
    trusted_root: TrustedRoot,
}

impl ManualTrustRoot {
    pub fn new(trusted_root: TrustedRoot) -> Self {
        Self { trusted_root }
    }
}

impl TrustRoot for ManualTrustRoot {
    fn model(&self) -> &TrustedRoot {
        &self.trusted_root
    }
}
