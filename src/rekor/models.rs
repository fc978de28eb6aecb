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

//! Wire types for the transparency log's `hashedrekord` entry kind (§6
//! "Transparency-log API"). Adapted from the teacher's generated
//! `rekor::models` tree, trimmed to the single entry kind this client
//! submits.

use serde::{Deserialize, Serialize};

pub const HASHEDREKORD_API_VERSION: &str = "0.0.1";
pub const HASHEDREKORD_KIND: &str = "hashedrekord";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposedEntry {
    pub api_version: String,
    pub kind: String,
    pub spec: ProposedEntrySpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposedEntrySpec {
    pub data: EntryData,
    pub signature: EntrySignature,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryData {
    pub hash: EntryHash,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryHash {
    pub algorithm: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntrySignature {
    pub format: String,
    pub content: String,
    pub public_key: EntryPublicKey,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryPublicKey {
    pub content: String,
}

impl ProposedEntry {
    /// Builds the `hashedrekord` body for `digest` (raw SHA-256 bytes),
    /// `signature` (raw detached signature bytes), and `leaf_pem` (the
    /// PEM-encoded signing certificate).
    pub fn hashed_rekord(digest: &[u8], signature: &[u8], leaf_pem: &str) -> Self {
        ProposedEntry {
            api_version: HASHEDREKORD_API_VERSION.to_string(),
            kind: HASHEDREKORD_KIND.to_string(),
            spec: ProposedEntrySpec {
                data: EntryData {
                    hash: EntryHash {
                        algorithm: "sha256".to_string(),
                        value: hex::encode(digest),
                    },
                },
                signature: EntrySignature {
                    format: "x509".to_string(),
                    content: base64::Engine::encode(&base64::engine::general_purpose::STANDARD, signature),
                    public_key: EntryPublicKey {
                        content: base64::Engine::encode(
                            &base64::engine::general_purpose::STANDARD,
                            leaf_pem.as_bytes(),
                        ),
                    },
                },
            },
        }
    }
}

/// The verification material attached to a returned log entry: the
/// inclusion proof and the signed entry timestamp.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryVerification {
    pub inclusion_proof: InclusionProof,
    pub signed_entry_timestamp: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InclusionProof {
    pub log_index: i64,
    pub root_hash: String,
    pub tree_size: i64,
    pub hashes: Vec<String>,
    pub checkpoint: String,
}

/// One entry as returned by the log, keyed by its UUID in the response map.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub body: String,
    pub integrated_time: i64,
    pub log_i_d: String,
    pub log_index: i64,
    pub verification: EntryVerification,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashed_rekord_round_trips_through_json() {
        let entry = ProposedEntry::hashed_rekord(&[1, 2, 3], &[4, 5, 6], "-----BEGIN CERTIFICATE-----\n-----END CERTIFICATE-----\n");
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"hashedrekord\""));
        assert!(json.contains("\"algorithm\":\"sha256\""));
    }
}
