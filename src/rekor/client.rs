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

//! Transparency-log client (§4.6): submit a `hashedrekord` entry, treat a
//! 409 as idempotent success, then verify the inclusion proof and the
//! signed entry timestamp before the entry is trusted.
//!
//! Grounded in the teacher's generated `rekor::apis::entries_api`
//! (`create_log_entry`/`get_log_entry_by_uuid`, the `/api/v1/log/entries`
//! endpoints), generalized here to do the verification the generated
//! client left to its caller and to parse the dynamic-top-level-key
//! response through `serde_json::Value` rather than the teacher's
//! fixed-offset string slicing.

use std::collections::HashMap;

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::errors::{Result, SigstoreError, TransparencyLogError};
use crate::trust::model::LogId;
use crate::trust::TrustRoot;

use super::models::{LogEntry, ProposedEntry};

pub struct RekorClient {
    http: reqwest::Client,
    base_url: String,
}

/// A verified transparency-log entry, ready to be embedded in a signing
/// bundle.
#[derive(Debug, Clone)]
pub struct LogEntryRecord {
    pub uuid: String,
    pub log_index: i64,
    pub integrated_time: i64,
    pub body: String,
}

impl RekorClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    /// Uploads a `hashedrekord` entry for `digest`/`signature`/`leaf_pem`,
    /// then verifies the returned inclusion proof and SET against
    /// `trust_root`.
    pub async fn put_entry(
        &self,
        digest: &[u8],
        signature: &[u8],
        leaf_pem: &str,
        trust_root: &dyn TrustRoot,
    ) -> Result<LogEntryRecord> {
        let proposed = ProposedEntry::hashed_rekord(digest, signature, leaf_pem);
        let canonical_body = canonicalize(&proposed)?;
        let computed_uuid = hex::encode(Sha256::digest(&canonical_body));

        let (uuid, entry) = self.submit_or_fetch(&proposed, &computed_uuid).await?;
        verify_entry(&entry, &canonical_body, trust_root)?;

        Ok(LogEntryRecord {
            uuid,
            log_index: entry.log_index,
            integrated_time: entry.integrated_time,
            body: entry.body,
        })
    }

    async fn submit_or_fetch(
        &self,
        proposed: &ProposedEntry,
        computed_uuid: &str,
    ) -> Result<(String, LogEntry)> {
        let url = format!("{}/api/v1/log/entries", self.base_url.trim_end_matches('/'));
        let resp = self.http.post(&url).json(proposed).send().await?;
        let status = resp.status();

        if status.as_u16() == 409 {
            return self.get_entry_by_uuid(computed_uuid).await;
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TransparencyLogError::SubmissionFailed {
                status: Some(status.as_u16()),
                message: body,
            }
            .into());
        }

        let text = resp.text().await?;
        parse_entry_map(&text)
    }

    async fn get_entry_by_uuid(&self, uuid: &str) -> Result<(String, LogEntry)> {
        let url = format!(
            "{}/api/v1/log/entries/{uuid}",
            self.base_url.trim_end_matches('/')
        );
        let resp = self.http.get(&url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TransparencyLogError::SubmissionFailed {
                status: Some(status.as_u16()),
                message: body,
            }
            .into());
        }
        let text = resp.text().await?;
        parse_entry_map(&text)
    }
}

fn parse_entry_map(text: &str) -> Result<(String, LogEntry)> {
    let map: HashMap<String, LogEntry> = serde_json::from_str(text)
        .map_err(|e| TransparencyLogError::MalformedResponse(format!("{e}: {text}")))?;
    map.into_iter()
        .next()
        .ok_or_else(|| TransparencyLogError::MalformedResponse("response carried no entries".into()).into())
}

fn canonicalize<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, olpc_cjson::CanonicalFormatter::new());
    value
        .serialize(&mut ser)
        .map_err(|e| TransparencyLogError::MalformedResponse(format!("failed to canonicalize entry: {e}")))?;
    Ok(buf)
}

/// Per §4.6 steps 4-5: verify the SET over `(body, integratedTime,
/// logIndex, logID)`, then recompute the inclusion proof's root hash from
/// the entry's leaf hash and audit path.
fn verify_entry(entry: &LogEntry, canonical_body: &[u8], trust_root: &dyn TrustRoot) -> Result<()> {
    let integrated_at = DateTime::<Utc>::from_timestamp(entry.integrated_time, 0)
        .ok_or_else(|| TransparencyLogError::MalformedResponse("integratedTime out of range".into()))?;

    let log_id_bytes = hex::decode(&entry.log_i_d)
        .map_err(|e| TransparencyLogError::MalformedResponse(format!("logID is not hex: {e}")))?;
    let log_id = LogId(log_id_bytes);
    let tlog = trust_root
        .model()
        .find_tlog(&log_id, integrated_at)
        .ok_or_else(|| TransparencyLogError::MalformedResponse("no tlog in trust root matches logID/time".into()))?;

    #[derive(Serialize)]
    struct SetPayload<'a> {
        body: &'a str,
        #[serde(rename = "integratedTime")]
        integrated_time: i64,
        #[serde(rename = "logIndex")]
        log_index: i64,
        #[serde(rename = "logID")]
        log_id: &'a str,
    }
    let set_bytes = canonicalize(&SetPayload {
        body: &entry.body,
        integrated_time: entry.integrated_time,
        log_index: entry.log_index,
        log_id: &entry.log_i_d,
    })?;
    let set_sig = base64::engine::general_purpose::STANDARD
        .decode(&entry.verification.signed_entry_timestamp)
        .map_err(|e| TransparencyLogError::MalformedResponse(format!("SET is not base64: {e}")))?;
    tlog.public_key
        .key
        .verify(&set_bytes, &set_sig)
        .map_err(|_| TransparencyLogError::SETInvalid)?;

    let leaf_hash = rfc6962_leaf_hash(canonical_body);
    let proof = &entry.verification.inclusion_proof;
    let audit_path: Vec<[u8; 32]> = proof
        .hashes
        .iter()
        .map(|h| {
            let bytes = hex::decode(h)
                .map_err(|e| TransparencyLogError::MalformedResponse(format!("audit path hash is not hex: {e}")))?;
            bytes
                .try_into()
                .map_err(|_| TransparencyLogError::MalformedResponse("audit path hash is not 32 bytes".into()).into())
        })
        .collect::<Result<_>>()?;
    let expected_root = hex::decode(&proof.root_hash)
        .map_err(|e| TransparencyLogError::MalformedResponse(format!("root hash is not hex: {e}")))?;

    let recomputed = root_from_inclusion_proof(proof.log_index, proof.tree_size, leaf_hash, &audit_path);
    if recomputed.as_slice() != expected_root.as_slice() {
        return Err(TransparencyLogError::InclusionProofInvalid.into());
    }

    Ok(())
}

fn rfc6962_leaf_hash(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update([0x00]);
    hasher.update(data);
    hasher.finalize().into()
}

fn hash_children(left: &[u8], right: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update([0x01]);
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// Recomputes a Merkle tree root from a leaf's inclusion proof, following
/// the RFC 6962 audit-path verification algorithm (the same one the
/// reference transparency-log verifier uses).
fn root_from_inclusion_proof(leaf_index: i64, tree_size: i64, leaf_hash: [u8; 32], proof: &[[u8; 32]]) -> [u8; 32] {
    let mut node_index = leaf_index;
    let mut last_node = tree_size - 1;
    let mut hash = leaf_hash;

    for next in proof {
        if node_index % 2 == 1 || node_index == last_node {
            hash = if node_index % 2 == 1 {
                hash_children(next, &hash)
            } else {
                hash_children(&hash, next)
            };
            while node_index % 2 == 0 && node_index != 0 {
                node_index /= 2;
                last_node /= 2;
            }
        } else {
            hash = hash_children(&hash, next);
        }
        node_index /= 2;
        last_node /= 2;
    }

    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_hash_matches_rfc6962_prefix_convention() {
        let a = rfc6962_leaf_hash(b"hello");
        let b = rfc6962_leaf_hash(b"hello");
        assert_eq!(a, b);
        assert_ne!(a, rfc6962_leaf_hash(b"world"));
    }

    #[test]
    fn single_leaf_tree_root_equals_leaf_hash() {
        let leaf = rfc6962_leaf_hash(b"only entry");
        let root = root_from_inclusion_proof(0, 1, leaf, &[]);
        assert_eq!(root, leaf);
    }

    #[test]
    fn two_leaf_tree_root_matches_manual_combination() {
        let left = rfc6962_leaf_hash(b"left");
        let right = rfc6962_leaf_hash(b"right");
        let expected = hash_children(&left, &right);

        let root_for_left = root_from_inclusion_proof(0, 2, left, &[right]);
        assert_eq!(root_for_left, expected);

        let root_for_right = root_from_inclusion_proof(1, 2, right, &[left]);
        assert_eq!(root_for_right, expected);
    }

    #[test]
    fn parse_entry_map_rejects_empty_object() {
        let err = parse_entry_map("{}").unwrap_err();
        assert!(matches!(
            err,
            SigstoreError::TransparencyLog(TransparencyLogError::MalformedResponse(_))
        ));
    }
}
