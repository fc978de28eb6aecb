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

//! An ephemeral signing keypair, generated fresh for one signing call and
//! never persisted. The private key is zeroized on drop so it does not
//! outlive the bundle it produced.

use p256::ecdsa::signature::Signer as _;
use p256::ecdsa::{SigningKey, VerifyingKey};
use zeroize::Zeroizing;

use crate::errors::CryptoError;

/// ECDSA P-256 keypair held only in memory for the lifetime of one signing.
///
/// `signing_key` is wrapped in [`Zeroizing`] so its bytes are overwritten
/// the moment the keypair is dropped, whether the drop happens on the
/// success path, an error path, or mid-flight cancellation.
pub struct EphemeralKeypair {
    signing_key: Zeroizing<SigningKey>,
    verifying_key: VerifyingKey,
}

// `p256::ecdsa::SigningKey` already implements `Zeroize`/`ZeroizeOnDrop`
// (it wraps a `NonZeroScalar`), so `Zeroizing<SigningKey>` zeroizes the
// secret scalar's memory the moment the keypair is dropped.

impl EphemeralKeypair {
    /// Generates a fresh ECDSA P-256 keypair, the default algorithm for
    /// ephemeral signing keys.
    pub fn generate_p256() -> Self {
        let signing_key = SigningKey::random(&mut rand_core::OsRng);
        let verifying_key = *signing_key.verifying_key();
        Self {
            signing_key: Zeroizing::new(signing_key),
            verifying_key,
        }
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying_key
    }

    /// DER-encodes the public key as a SubjectPublicKeyInfo, for embedding
    /// in a CSR or PEM-encoding for the transparency log entry.
    pub fn public_key_der(&self) -> Result<Vec<u8>, CryptoError> {
        use p256::pkcs8::EncodePublicKey;
        self.verifying_key
            .to_public_key_der()
            .map(|doc| doc.as_bytes().to_vec())
            .map_err(|e| CryptoError::InvalidKeySpec(e.to_string()))
    }

    pub fn public_key_pem(&self) -> Result<String, CryptoError> {
        use p256::pkcs8::EncodePublicKey;
        self.verifying_key
            .to_public_key_pem(p256::pkcs8::LineEnding::LF)
            .map_err(|e| CryptoError::InvalidKeySpec(e.to_string()))
    }

    /// Signs `message`, hashing it with SHA-256 internally per the ECDSA
    /// P-256 signing convention. Returns a DER-encoded signature.
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let sig: p256::ecdsa::Signature = self
            .signing_key
            .try_sign(message)
            .map_err(|e| CryptoError::SignatureFailure(e.to_string()))?;
        Ok(sig.to_der().as_bytes().to_vec())
    }

    /// Exposes the signing key for constructing a self-signed proof of
    /// possession (e.g. via `rcgen`'s remote keypair bridge). Callers must
    /// not retain the returned reference beyond the keypair's lifetime.
    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_roundtrip() {
        let keypair = EphemeralKeypair::generate_p256();
        let msg = b"artifact digest bytes";
        let sig = keypair.sign(msg).unwrap();
        let key = crate::crypto::KeyMaterial::EcdsaP256(*keypair.verifying_key());
        key.verify(msg, &sig).unwrap();
    }

    #[test]
    fn public_key_der_is_nonempty() {
        let keypair = EphemeralKeypair::generate_p256();
        let der = keypair.public_key_der().unwrap();
        assert!(!der.is_empty());
    }
}
