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

//! The in-memory trust-root model: CAs, transparency logs, and the
//! validity windows and lookup semantics that govern them.
//!
//! This is a flat-slice representation on purpose (see the design note on
//! avoiding cyclic references): a [`TrustedRoot`] is three `Vec`s, and every
//! lookup is a linear scan. The set of CAs/logs a real deployment carries is
//! a handful of entries, so this is the simple choice, not a shortcut.

use chrono::{DateTime, Utc};
use sigstore_protobuf_specs::dev::sigstore::{
    common::v1::{HashAlgorithm, PublicKeyDetails},
    trustroot::v1::TrustedRoot as TrustedRootMessage,
};
use subtle::ConstantTimeEq;

use crate::crypto::keymaterial::KeyMaterial;
use crate::errors::SigstoreError;

/// A pair `(start, optional end)`. Absent `end` means "current" / open-ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidityWindow {
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
}

impl ValidityWindow {
    pub fn new(start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    /// A window is "current" iff it has no end.
    pub fn is_current(&self) -> bool {
        self.end.is_none()
    }

    /// `t` matches iff `start <= t` and (`end` absent or `t <= end`).
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && self.end.map(|end| t <= end).unwrap_or(true)
    }
}

/// Opaque log identifier, typically SHA-256 of the log's DER-encoded public
/// key. Equality is constant-time to avoid leaking timing information about
/// which prefix bytes matched during log-id lookups.
#[derive(Debug, Clone)]
pub struct LogId(pub Vec<u8>);

impl PartialEq for LogId {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}
impl Eq for LogId {}

pub struct TrustedPublicKey {
    pub key: KeyMaterial,
    pub validity: ValidityWindow,
}

pub struct TransparencyLogInstance {
    pub log_id: LogId,
    pub base_url: String,
    pub public_key: TrustedPublicKey,
    pub hash_algorithm: HashAlgorithm,
    pub signature_algorithm: PublicKeyDetails,
}

pub struct CertificateAuthority {
    pub uri: String,
    /// DER-encoded X.509 chain, root + intermediates, in the order the
    /// trust-root message declared them.
    pub cert_chain: Vec<Vec<u8>>,
    pub validity: ValidityWindow,
}

/// The parsed, validated trust root: sets of CAs, binary-artifact
/// transparency logs ("TLogs"), and certificate-transparency logs
/// ("CTLogs").
pub struct TrustedRoot {
    pub cas: Vec<CertificateAuthority>,
    pub tlogs: Vec<TransparencyLogInstance>,
    pub ctlogs: Vec<TransparencyLogInstance>,
}

fn at_most_one_current<T>(items: &[T], is_current: impl Fn(&T) -> bool) -> bool {
    items.iter().filter(|i| is_current(i)).count() <= 1
}

impl TrustedRoot {
    /// Validates the structural invariant: at most one entry with no end
    /// ("current") per set.
    fn check_invariants(&self) -> Result<(), SigstoreError> {
        if !at_most_one_current(&self.cas, |ca| ca.validity.is_current()) {
            return Err(SigstoreError::InvalidTrustRoot(
                "more than one open-ended certificate authority".into(),
            ));
        }
        if !at_most_one_current(&self.tlogs, |t| t.public_key.validity.is_current()) {
            return Err(SigstoreError::InvalidTrustRoot(
                "more than one open-ended tlog".into(),
            ));
        }
        if !at_most_one_current(&self.ctlogs, |t| t.public_key.validity.is_current()) {
            return Err(SigstoreError::InvalidTrustRoot(
                "more than one open-ended ctlog".into(),
            ));
        }
        Ok(())
    }

    /// Parses and validates a `TrustedRoot` protobuf-JSON message (§6).
    /// Unknown fields in the wire message are ignored by construction,
    /// since `sigstore-protobuf-specs` deserializes with `serde` and we
    /// only read the fields we model here.
    pub fn from_message(msg: TrustedRootMessage) -> Result<Self, SigstoreError> {
        let cas = msg
            .certificate_authorities
            .into_iter()
            .map(|ca| -> Result<CertificateAuthority, SigstoreError> {
                let validity = parse_time_range(ca.valid_for)?;
                let cert_chain = ca
                    .cert_chain
                    .map(|chain| {
                        chain
                            .certificates
                            .into_iter()
                            .map(|c| c.raw_bytes)
                            .collect()
                    })
                    .unwrap_or_default();
                Ok(CertificateAuthority {
                    uri: ca.uri,
                    cert_chain,
                    validity,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let tlogs = msg
            .tlogs
            .into_iter()
            .map(parse_tlog)
            .collect::<Result<Vec<_>, _>>()?;
        let ctlogs = msg
            .ctlogs
            .into_iter()
            .map(parse_tlog)
            .collect::<Result<Vec<_>, _>>()?;

        let root = Self { cas, tlogs, ctlogs };
        root.check_invariants()?;
        Ok(root)
    }

    /// Lists CAs whose validity window includes `t`.
    pub fn cas_valid_at(&self, t: DateTime<Utc>) -> Vec<&CertificateAuthority> {
        self.cas.iter().filter(|ca| ca.validity.contains(t)).collect()
    }

    /// Finds a TLog by `(log_id, t)`, first match.
    pub fn find_tlog(&self, log_id: &LogId, t: DateTime<Utc>) -> Option<&TransparencyLogInstance> {
        self.tlogs
            .iter()
            .find(|tl| &tl.log_id == log_id && tl.public_key.validity.contains(t))
    }

    /// Finds a CTLog by `(log_id, t)`, first match.
    pub fn find_ctlog(&self, log_id: &LogId, t: DateTime<Utc>) -> Option<&TransparencyLogInstance> {
        self.ctlogs
            .iter()
            .find(|tl| &tl.log_id == log_id && tl.public_key.validity.contains(t))
    }

    /// The unique current (open-ended) CA. Fails loudly if count != 1.
    pub fn current_ca(&self) -> Result<&CertificateAuthority, SigstoreError> {
        let mut current = self.cas.iter().filter(|ca| ca.validity.is_current());
        let first = current
            .next()
            .ok_or_else(|| SigstoreError::InvalidTrustRoot("no current CA".into()))?;
        if current.next().is_some() {
            return Err(SigstoreError::InvalidTrustRoot(
                "more than one current CA".into(),
            ));
        }
        Ok(first)
    }

    /// The unique current TLog. Fails loudly if count != 1.
    pub fn current_tlog(&self) -> Result<&TransparencyLogInstance, SigstoreError> {
        let mut current = self.tlogs.iter().filter(|t| t.public_key.validity.is_current());
        let first = current
            .next()
            .ok_or_else(|| SigstoreError::InvalidTrustRoot("no current tlog".into()))?;
        if current.next().is_some() {
            return Err(SigstoreError::InvalidTrustRoot(
                "more than one current tlog".into(),
            ));
        }
        Ok(first)
    }

    /// The unique current CTLog. Fails loudly if count != 1.
    pub fn current_ctlog(&self) -> Result<&TransparencyLogInstance, SigstoreError> {
        let mut current = self.ctlogs.iter().filter(|t| t.public_key.validity.is_current());
        let first = current
            .next()
            .ok_or_else(|| SigstoreError::InvalidTrustRoot("no current ctlog".into()))?;
        if current.next().is_some() {
            return Err(SigstoreError::InvalidTrustRoot(
                "more than one current ctlog".into(),
            ));
        }
        Ok(first)
    }
}

fn parse_time_range(
    range: Option<sigstore_protobuf_specs::dev::sigstore::common::v1::TimeRange>,
) -> Result<ValidityWindow, SigstoreError> {
    let range = range.ok_or_else(|| {
        SigstoreError::InvalidTrustRoot("entry is missing a validity window".into())
    })?;
    let start = range
        .start
        .and_then(|t| DateTime::from_timestamp(t.seconds, 0))
        .ok_or_else(|| SigstoreError::InvalidTrustRoot("entry is missing validity start".into()))?;
    let end = range
        .end
        .and_then(|t| DateTime::from_timestamp(t.seconds, 0));
    Ok(ValidityWindow::new(start, end))
}

fn parse_tlog(
    tlog: sigstore_protobuf_specs::dev::sigstore::trustroot::v1::TransparencyLogInstance,
) -> Result<TransparencyLogInstance, SigstoreError> {
    let key_msg = tlog
        .public_key
        .ok_or_else(|| SigstoreError::InvalidTrustRoot("tlog is missing a public key".into()))?;
    let validity = parse_time_range(key_msg.valid_for)?;
    let raw = key_msg
        .raw_bytes
        .ok_or_else(|| SigstoreError::InvalidTrustRoot("tlog key has no raw bytes".into()))?;
    let key = KeyMaterial::from_der_spki(&raw).map_err(|e| {
        SigstoreError::InvalidTrustRoot(format!("tlog key did not parse: {e}"))
    })?;
    let log_id = tlog
        .log_id
        .map(|id| id.key_id)
        .unwrap_or_else(|| crate::crypto::Digest::sha256(&raw).bytes);

    Ok(TransparencyLogInstance {
        log_id: LogId(log_id),
        base_url: tlog.base_url,
        public_key: TrustedPublicKey { key, validity },
        hash_algorithm: HashAlgorithm::try_from(tlog.hash_algorithm).unwrap_or(HashAlgorithm::Sha2256),
        signature_algorithm: key_msg
            .key_details
            .try_into()
            .unwrap_or(PublicKeyDetails::PkixEcdsaP256Sha256),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn window(start_year: i32, end_year: Option<i32>) -> ValidityWindow {
        ValidityWindow::new(
            Utc.with_ymd_and_hms(start_year, 1, 1, 0, 0, 0).unwrap(),
            end_year.map(|y| Utc.with_ymd_and_hms(y, 1, 1, 0, 0, 0).unwrap()),
        )
    }

    #[test]
    fn window_contains_respects_bounds() {
        let w = window(2020, Some(2022));
        assert!(!w.contains(Utc.with_ymd_and_hms(2019, 6, 1, 0, 0, 0).unwrap()));
        assert!(w.contains(Utc.with_ymd_and_hms(2021, 6, 1, 0, 0, 0).unwrap()));
        assert!(!w.contains(Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap()));
    }

    #[test]
    fn open_ended_window_is_current_and_unbounded_above() {
        let w = window(2020, None);
        assert!(w.is_current());
        assert!(w.contains(Utc.with_ymd_and_hms(2099, 1, 1, 0, 0, 0).unwrap()));
    }

    #[test]
    fn current_ca_fails_loudly_when_zero_or_many() {
        let root = TrustedRoot {
            cas: vec![],
            tlogs: vec![],
            ctlogs: vec![],
        };
        assert!(root.current_ca().is_err());

        let root = TrustedRoot {
            cas: vec![
                CertificateAuthority {
                    uri: "https://a".into(),
                    cert_chain: vec![],
                    validity: window(2020, None),
                },
                CertificateAuthority {
                    uri: "https://b".into(),
                    cert_chain: vec![],
                    validity: window(2021, None),
                },
            ],
            tlogs: vec![],
            ctlogs: vec![],
        };
        assert!(root.current_ca().is_err());
    }

    #[test]
    fn log_id_equality_is_value_based() {
        let a = LogId(vec![1, 2, 3]);
        let b = LogId(vec![1, 2, 3]);
        let c = LogId(vec![1, 2, 4]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
