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

//! Fulcio-style certificate authority client: submits a CSR with an OIDC
//! identity token and proof-of-possession, then verifies the returned
//! chain (§4.5 step 4) before the certificate is trusted.

use std::time::{Duration, UNIX_EPOCH};

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use webpki::types::{CertificateDer, UnixTime};
use x509_cert::der::{Decode, Encode};

use crate::crypto::EphemeralKeypair;
use crate::errors::{CertificateError, Result, SigstoreError};
use crate::trust::TrustRoot;

use super::csr::build_csr_der;

#[derive(Serialize)]
struct SigningCertRequest {
    credentials: Credentials,
    #[serde(rename = "certificateSigningRequest")]
    certificate_signing_request: String,
}

#[derive(Serialize)]
struct Credentials {
    #[serde(rename = "oidcIdentityToken")]
    oidc_identity_token: String,
}

#[derive(Deserialize)]
struct SigningCertResponse {
    #[serde(rename = "signedCertificateEmbeddedSct")]
    signed_certificate_embedded_sct: Option<SignedCertificate>,
    #[serde(rename = "signedCertificateDetachedSct")]
    signed_certificate_detached_sct: Option<SignedCertificate>,
}

#[derive(Deserialize)]
struct SignedCertificate {
    chain: Chain,
}

#[derive(Deserialize)]
struct Chain {
    certificates: Vec<String>,
}

pub struct FulcioClient {
    http: reqwest::Client,
    base_url: String,
}

impl FulcioClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    /// Submits `keypair`'s public key as a CSR alongside `identity_token`,
    /// and returns the verified certificate chain (leaf first).
    pub async fn request_certificate(
        &self,
        identity_token: &str,
        subject: &str,
        keypair: &EphemeralKeypair,
        trust_root: &dyn TrustRoot,
        now: DateTime<Utc>,
    ) -> Result<Vec<CertificateDer<'static>>> {
        let csr_der = build_csr_der(keypair, subject)?;
        let csr_b64 = base64::engine::general_purpose::STANDARD.encode(csr_der);

        let request = SigningCertRequest {
            credentials: Credentials {
                oidc_identity_token: identity_token.to_string(),
            },
            certificate_signing_request: csr_b64,
        };

        let url = format!("{}/api/v2/signingCert", self.base_url.trim_end_matches('/'));
        let resp = self.http.post(&url).json(&request).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CertificateError::CAVerificationFailed(format!(
                "Fulcio returned {status}: {body}"
            ))
            .into());
        }

        let parsed: SigningCertResponse = resp.json().await?;
        let signed = parsed
            .signed_certificate_embedded_sct
            .or(parsed.signed_certificate_detached_sct)
            .ok_or_else(|| {
                CertificateError::CAVerificationFailed("Fulcio response carried no certificate chain".into())
            })?;

        let chain = parse_pem_chain(&signed.chain.certificates)?;
        verify_chain(&chain, keypair, trust_root, now)?;
        Ok(chain)
    }
}

fn parse_pem_chain(pems: &[String]) -> Result<Vec<CertificateDer<'static>>> {
    pems.iter()
        .map(|pem_str| {
            let parsed = pem::parse(pem_str)
                .map_err(|e| CertificateError::CAVerificationFailed(format!("malformed PEM certificate: {e}")))?;
            Ok(CertificateDer::from(parsed.contents().to_vec()))
        })
        .collect()
}

/// Verifies `chain` (leaf first) against one of the CAs in `trust_root`
/// whose validity window includes the current time, checks the leaf's
/// public key matches `keypair` bit-for-bit, and checks the leaf's
/// notBefore/notAfter covers the current time.
fn verify_chain(
    chain: &[CertificateDer<'static>],
    keypair: &EphemeralKeypair,
    trust_root: &dyn TrustRoot,
    now: DateTime<Utc>,
) -> Result<()> {
    let leaf_der = chain
        .first()
        .ok_or_else(|| CertificateError::CAVerificationFailed("empty certificate chain".into()))?;
    let intermediates = &chain[1..];

    let leaf_cert = x509_cert::Certificate::from_der(leaf_der)
        .map_err(|e| CertificateError::CAVerificationFailed(format!("leaf certificate is not valid DER: {e}")))?;

    let leaf_spki_der = leaf_cert
        .tbs_certificate
        .subject_public_key_info
        .to_der()
        .map_err(|e| CertificateError::CAVerificationFailed(format!("failed to re-encode leaf SPKI: {e}")))?;
    let expected_spki_der = keypair.public_key_der().map_err(SigstoreError::Crypto)?;
    if leaf_spki_der != expected_spki_der {
        return Err(CertificateError::PublicKeyMismatch.into());
    }

    let not_before = time_to_chrono(leaf_cert.tbs_certificate.validity.not_before.to_unix_duration());
    let not_after = time_to_chrono(leaf_cert.tbs_certificate.validity.not_after.to_unix_duration());
    if now < not_before {
        return Err(CertificateError::NotYetValid { not_before }.into());
    }
    if now > not_after {
        return Err(CertificateError::Expired { not_after }.into());
    }

    let candidate_cas = trust_root.model().cas_valid_at(now);
    if candidate_cas.is_empty() {
        return Err(CertificateError::CAVerificationFailed("no CA valid at the current time".into()).into());
    }

    let unix_time = UnixTime::since_unix_epoch(Duration::from_secs(now.timestamp().max(0) as u64));

    let mut last_error = None;
    for ca in candidate_cas {
        let Some(root_der) = ca.cert_chain.first() else {
            continue;
        };
        let root_der = CertificateDer::from(root_der.clone());
        let anchor = match webpki::anchor_from_trusted_cert(&root_der) {
            Ok(a) => a,
            Err(e) => {
                last_error = Some(e.to_string());
                continue;
            }
        };

        let end_entity = match webpki::EndEntityCert::try_from(leaf_der) {
            Ok(c) => c,
            Err(e) => {
                last_error = Some(e.to_string());
                continue;
            }
        };

        match end_entity.verify_for_usage(
            webpki::ALL_VERIFICATION_ALGS,
            &[anchor],
            intermediates,
            unix_time,
            code_signing_key_usage(),
            None,
        ) {
            Ok(_) => return Ok(()),
            Err(e) => last_error = Some(e.to_string()),
        }
    }

    Err(CertificateError::CAVerificationFailed(
        last_error.unwrap_or_else(|| "no candidate CA verified the chain".into()),
    )
    .into())
}

/// DER encoding of the `id-kp-codeSigning` extended key usage OID
/// (1.3.6.1.5.5.7.3.3), the EKU Fulcio embeds in every leaf it issues.
fn code_signing_key_usage() -> webpki::KeyUsage {
    webpki::KeyUsage::required(&[43, 6, 1, 5, 5, 7, 3, 3])
}

fn time_to_chrono(unix_duration: Duration) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(unix_duration.as_secs() as i64, unix_duration.subsec_nanos())
        .unwrap_or_else(|| DateTime::<Utc>::from(UNIX_EPOCH))
}
