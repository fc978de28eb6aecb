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

//! Builds a PKCS#10 certificate signing request over the ephemeral
//! signing key, using `rcgen`'s remote-keypair bridge so the CSR's
//! self-signature is itself the proof of possession Fulcio checks.

use p256::elliptic_curve::sec1::ToEncodedPoint;
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair, RemoteKeyPair};

use crate::crypto::EphemeralKeypair;
use crate::errors::CryptoError;

struct EphemeralRemoteKey<'a> {
    keypair: &'a EphemeralKeypair,
    public_point: Vec<u8>,
}

impl<'a> EphemeralRemoteKey<'a> {
    fn new(keypair: &'a EphemeralKeypair) -> Self {
        let public_point = keypair.verifying_key().to_encoded_point(false).as_bytes().to_vec();
        Self { keypair, public_point }
    }
}

impl RemoteKeyPair for EphemeralRemoteKey<'_> {
    fn public_key(&self) -> &[u8] {
        &self.public_point
    }

    fn sign(&self, msg: &[u8]) -> Result<Vec<u8>, rcgen::Error> {
        self.keypair
            .sign(msg)
            .map_err(|e| rcgen::Error::RemoteKeyError(Some(e.to_string())))
    }

    fn algorithm(&self) -> &'static rcgen::SignatureAlgorithm {
        &rcgen::PKCS_ECDSA_P256_SHA256
    }
}

/// Builds a self-signed CSR over `keypair`, DER-encoded.
///
/// `subject` becomes the CSR's common name; Fulcio does not trust it (the
/// issued certificate's SANs are filled in from the verified OIDC token
/// server-side), but it keeps the request self-descriptive for logging.
pub fn build_csr_der(keypair: &EphemeralKeypair, subject: &str) -> Result<Vec<u8>, CryptoError> {
    let remote = EphemeralRemoteKey::new(keypair);
    let rcgen_keypair = KeyPair::from_remote(Box::new(remote))
        .map_err(|e| CryptoError::InvalidKeySpec(format!("rcgen remote keypair setup failed: {e}")))?;

    let mut params = CertificateParams::new(Vec::<String>::new())
        .map_err(|e| CryptoError::InvalidKeySpec(format!("invalid CSR params: {e}")))?;
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, subject);
    params.distinguished_name = dn;

    let csr = params
        .serialize_request(&rcgen_keypair)
        .map_err(|e| CryptoError::InvalidKeySpec(format!("CSR serialization failed: {e}")))?;
    Ok(csr.der().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_nonempty_csr() {
        let keypair = EphemeralKeypair::generate_p256();
        let der = build_csr_der(&keypair, "sigstore").unwrap();
        assert!(!der.is_empty());
    }
}
