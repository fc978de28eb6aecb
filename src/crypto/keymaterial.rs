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

//! Public key parsing and verification, across the closed set of
//! algorithms this crate understands: RSA, ECDSA P-256, and Ed25519.

use ed25519_dalek::Verifier as _;
use p256::ecdsa::signature::Verifier as _;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey as _;
use serde::{Deserialize, Serialize};

use crate::errors::CryptoError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignatureAlgorithm {
    Ed25519,
    #[serde(rename = "ecdsa-sha2-nistp256")]
    EcdsaSha2NistP256,
}

/// A parsed public key, tagged by algorithm.
#[derive(Debug, Clone)]
pub enum KeyMaterial {
    Rsa(rsa::RsaPublicKey),
    EcdsaP256(p256::ecdsa::VerifyingKey),
    Ed25519(ed25519_dalek::VerifyingKey),
}

impl KeyMaterial {
    /// Parses a PEM-framed public key.
    ///
    /// Fails if more than one PEM section is present, the section is empty,
    /// or the key algorithm is not RSA, ECDSA, or Ed25519. The legacy
    /// PKCS#1 `RSA PUBLIC KEY` section is read as a raw (modulus, exponent)
    /// sequence; any other section is treated as an X.509 SubjectPublicKeyInfo.
    pub fn from_pem(pem_str: &str) -> Result<Self, CryptoError> {
        let sections: Vec<_> = pem::parse_many(pem_str)
            .map_err(|e| CryptoError::InvalidKeySpec(format!("malformed PEM: {e}")))?;

        if sections.len() != 1 {
            return Err(CryptoError::InvalidKeySpec(format!(
                "expected exactly one PEM section, found {}",
                sections.len()
            )));
        }
        let section = &sections[0];
        if section.contents().is_empty() {
            return Err(CryptoError::InvalidKeySpec("empty PEM section".into()));
        }

        if section.tag() == "RSA PUBLIC KEY" {
            let key = rsa::RsaPublicKey::from_pkcs1_der(section.contents())
                .map_err(|e| CryptoError::InvalidKeySpec(format!("invalid PKCS#1 RSA key: {e}")))?;
            return Ok(KeyMaterial::Rsa(key));
        }

        Self::from_der_spki(section.contents())
    }

    /// Parses a SubjectPublicKeyInfo (X.509) DER blob, inferring the
    /// algorithm from the embedded AlgorithmIdentifier.
    pub fn from_der_spki(der: &[u8]) -> Result<Self, CryptoError> {
        if let Ok(key) = p256::ecdsa::VerifyingKey::from_public_key_der(der) {
            return Ok(KeyMaterial::EcdsaP256(key));
        }
        if let Ok(key) = ed25519_dalek::VerifyingKey::from_public_key_der(der) {
            return Ok(KeyMaterial::Ed25519(key));
        }
        if let Ok(key) = rsa::RsaPublicKey::from_public_key_der(der) {
            return Ok(KeyMaterial::Rsa(key));
        }
        Err(CryptoError::InvalidKeySpec(
            "DER key is not a recognized RSA, ECDSA P-256, or Ed25519 SubjectPublicKeyInfo".into(),
        ))
    }

    /// Constructs a TUF-style key from raw bytes given a scheme name drawn
    /// from the closed set `{ed25519, ecdsa-sha2-nistp256}`.
    pub fn from_tuf_scheme(scheme: &str, raw: &[u8]) -> Result<Self, CryptoError> {
        match scheme {
            "ed25519" => {
                let bytes: [u8; 32] = raw.try_into().map_err(|_| {
                    CryptoError::InvalidKeySpec("ed25519 key must be 32 bytes".into())
                })?;
                let key = ed25519_dalek::VerifyingKey::from_bytes(&bytes)
                    .map_err(|e| CryptoError::InvalidKeySpec(e.to_string()))?;
                Ok(KeyMaterial::Ed25519(key))
            }
            "ecdsa-sha2-nistp256" => {
                let key = p256::ecdsa::VerifyingKey::from_sec1_bytes(raw)
                    .map_err(|e| CryptoError::InvalidKeySpec(e.to_string()))?;
                Ok(KeyMaterial::EcdsaP256(key))
            }
            other => Err(CryptoError::UnsupportedAlgorithm(other.to_string())),
        }
    }

    /// Verifies `signature` over `message` using this key.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
        match self {
            KeyMaterial::EcdsaP256(key) => {
                let sig = p256::ecdsa::Signature::from_der(signature)
                    .or_else(|_| p256::ecdsa::Signature::from_slice(signature))
                    .map_err(|e| CryptoError::SignatureFailure(e.to_string()))?;
                key.verify(message, &sig)
                    .map_err(|e| CryptoError::SignatureFailure(e.to_string()))
            }
            KeyMaterial::Ed25519(key) => {
                let sig = ed25519_dalek::Signature::from_slice(signature)
                    .map_err(|e| CryptoError::SignatureFailure(e.to_string()))?;
                key.verify(message, &sig)
                    .map_err(|e| CryptoError::SignatureFailure(e.to_string()))
            }
            KeyMaterial::Rsa(key) => {
                use rsa::pkcs1v15::VerifyingKey as RsaVerifyingKey;
                use rsa::signature::Verifier as _;
                let verifying_key = RsaVerifyingKey::<sha2::Sha256>::new(key.clone());
                let sig = rsa::pkcs1v15::Signature::try_from(signature)
                    .map_err(|e| CryptoError::SignatureFailure(e.to_string()))?;
                verifying_key
                    .verify(message, &sig)
                    .map_err(|e| CryptoError::SignatureFailure(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_multi_section_pem() {
        let two = "-----BEGIN PUBLIC KEY-----\nAA==\n-----END PUBLIC KEY-----\n-----BEGIN PUBLIC KEY-----\nAA==\n-----END PUBLIC KEY-----\n";
        let err = KeyMaterial::from_pem(two).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidKeySpec(_)));
    }

    #[test]
    fn rejects_empty_pem_section() {
        let empty = "-----BEGIN PUBLIC KEY-----\n-----END PUBLIC KEY-----\n";
        let err = KeyMaterial::from_pem(empty).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidKeySpec(_)));
    }

    #[test]
    fn tuf_scheme_rejects_unknown_scheme() {
        let err = KeyMaterial::from_tuf_scheme("rsa", &[0u8; 32]).unwrap_err();
        assert!(matches!(err, CryptoError::UnsupportedAlgorithm(_)));
    }

    #[test]
    fn ecdsa_roundtrip_sign_and_verify() {
        use crate::crypto::EphemeralKeypair;
        let keypair = EphemeralKeypair::generate_p256();
        let digest = crate::crypto::Digest::sha256(b"hello");
        let sig = keypair.sign(&digest.bytes).unwrap();
        let key = KeyMaterial::EcdsaP256(*keypair.verifying_key());
        key.verify(&digest.bytes, &sig).unwrap();
    }
}
