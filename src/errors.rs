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

//! Crate-wide error taxonomy.
//!
//! Each top-level variant corresponds to one of the kinds in the error
//! handling design: trust root refresh, crypto, identity, certificate,
//! transparency log, and I/O. Subkinds are nested enums so callers can
//! match narrowly without string inspection.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SigstoreError>;

/// Reasons a TUF metadata refresh can be rejected.
#[derive(Error, Debug)]
pub enum TrustRootRefreshError {
    #[error("rollback detected for {role}: stored version {stored} > fetched version {fetched}")]
    RollbackDetected {
        role: &'static str,
        stored: u64,
        fetched: u64,
    },

    #[error("{role} metadata expired at {expires}")]
    ExpiredMetadata {
        role: &'static str,
        expires: chrono::DateTime<chrono::Utc>,
    },

    #[error("signature threshold not met for {role}: needed {threshold}, got {valid}")]
    SignatureThresholdNotMet {
        role: &'static str,
        threshold: u64,
        valid: u64,
    },

    #[error("version mismatch for {role}: expected {expected}, found {found}")]
    VersionMismatch {
        role: &'static str,
        expected: u64,
        found: u64,
    },

    #[error("target {0:?} missing from targets metadata")]
    TargetMissing(String),

    #[error("target {name:?} hash mismatch: expected {expected}, got {found}")]
    TargetHashMismatch {
        name: String,
        expected: String,
        found: String,
    },

    #[error("target {name:?} length mismatch: expected {expected}, got {found}")]
    TargetLengthMismatch {
        name: String,
        expected: u64,
        found: u64,
    },
}

/// Reasons a cryptographic operation can fail.
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("invalid key material: {0}")]
    InvalidKeySpec(String),

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("signature operation failed: {0}")]
    SignatureFailure(String),
}

/// OIDC identity-token acquisition failure.
#[derive(Error, Debug)]
#[error("identity flow failed: {0}")]
pub struct IdentityError(pub String);

/// Reasons a CA-issued certificate chain can be rejected.
#[derive(Error, Debug)]
pub enum CertificateError {
    #[error("certificate chain did not verify against any trusted CA: {0}")]
    CAVerificationFailed(String),

    #[error("leaf public key does not match the submitted ephemeral key")]
    PublicKeyMismatch,

    #[error("leaf certificate not yet valid (notBefore {not_before})")]
    NotYetValid {
        not_before: chrono::DateTime<chrono::Utc>,
    },

    #[error("leaf certificate expired (notAfter {not_after})")]
    Expired {
        not_after: chrono::DateTime<chrono::Utc>,
    },
}

/// Reasons a transparency-log submission or verification can fail.
#[derive(Error, Debug)]
pub enum TransparencyLogError {
    #[error("log entry submission failed (status {status:?}): {message}")]
    SubmissionFailed {
        status: Option<u16>,
        message: String,
    },

    #[error("malformed log response: {0}")]
    MalformedResponse(String),

    #[error("inclusion proof did not recompute to the declared checkpoint root")]
    InclusionProofInvalid,

    #[error("signed entry timestamp did not verify")]
    SETInvalid,
}

/// Umbrella error type returned by every public operation in this crate.
#[derive(Error, Debug)]
pub enum SigstoreError {
    #[error("trust root refresh error")]
    TrustRootRefresh(#[from] TrustRootRefreshError),

    #[error("crypto error")]
    Crypto(#[from] CryptoError),

    #[error("identity error")]
    Identity(#[from] IdentityError),

    #[error("certificate error")]
    Certificate(#[from] CertificateError),

    #[error("transparency log error")]
    TransparencyLog(#[from] TransparencyLogError),

    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: Option<PathBuf>,
        #[source]
        source: std::io::Error,
    },

    #[error("network error")]
    Network(#[from] reqwest::Error),

    #[error("malformed URL")]
    Url(#[from] url::ParseError),

    #[error("malformed JSON")]
    Json(#[from] serde_json::Error),

    #[error("TUF repository error: {0}")]
    Tuf(String),

    #[error("the trust root is structurally invalid: {0}")]
    InvalidTrustRoot(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,
}

impl From<std::io::Error> for SigstoreError {
    fn from(source: std::io::Error) -> Self {
        SigstoreError::Io { path: None, source }
    }
}

impl SigstoreError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SigstoreError::Io {
            path: Some(path.into()),
            source,
        }
    }

    /// Whether this error kind is safe to retry with backoff per the
    /// propagation policy (IO and 5xx submission failures only).
    pub fn is_retryable(&self) -> bool {
        match self {
            SigstoreError::Network(e) => e.is_timeout() || e.is_connect(),
            SigstoreError::Io { .. } => true,
            SigstoreError::TransparencyLog(TransparencyLogError::SubmissionFailed {
                status: Some(code),
                ..
            }) => (500..600).contains(code),
            _ => false,
        }
    }
}
