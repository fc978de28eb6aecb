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

//! Standard TUF 1.0 JSON role files (§6), and the role-key threshold
//! verification that every role fetch in [`super::client`] goes through.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::keymaterial::KeyMaterial;
use crate::errors::{SigstoreError, TrustRootRefreshError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoleType {
    Root,
    Timestamp,
    Snapshot,
    Targets,
}

impl RoleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleType::Root => "root",
            RoleType::Timestamp => "timestamp",
            RoleType::Snapshot => "snapshot",
            RoleType::Targets => "targets",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signature {
    pub keyid: String,
    pub sig: String,
}

/// A signed role file: the `signed` payload plus its detached signatures,
/// exactly as it appears on the wire (`{"signed": {...}, "signatures": [...]}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signed<T> {
    pub signed: T,
    pub signatures: Vec<Signature>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicKeyWire {
    pub keytype: String,
    pub scheme: String,
    pub keyval: KeyVal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyVal {
    pub public: String,
}

impl PublicKeyWire {
    pub fn to_key_material(&self) -> Result<KeyMaterial, SigstoreError> {
        let raw = hex::decode(&self.keyval.public)
            .or_else(|_| {
                use base64::Engine;
                base64::engine::general_purpose::STANDARD
                    .decode(&self.keyval.public)
                    .map_err(|_| hex::FromHexError::InvalidStringLength)
            })
            .map_err(|_| {
                SigstoreError::Tuf(format!("key {:?} has neither hex nor base64 keyval", self.scheme))
            })?;
        KeyMaterial::from_tuf_scheme(&self.scheme, &raw).map_err(SigstoreError::Crypto)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleKeys {
    pub keyids: Vec<String>,
    pub threshold: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootSigned {
    #[serde(rename = "_type")]
    pub typ: String,
    pub spec_version: String,
    pub version: u64,
    pub expires: DateTime<Utc>,
    pub consistent_snapshot: bool,
    pub keys: HashMap<String, PublicKeyWire>,
    pub roles: HashMap<String, RoleKeys>,
}

impl RootSigned {
    pub fn role_keys(&self, role: RoleType) -> Result<&RoleKeys, SigstoreError> {
        self.roles.get(role.as_str()).ok_or_else(|| {
            SigstoreError::Tuf(format!("root metadata has no {} role", role.as_str()))
        })
    }

    pub fn keys_for(&self, role: RoleType) -> impl Iterator<Item = &String> {
        self.roles
            .get(role.as_str())
            .map(|rk| rk.keyids.iter())
            .into_iter()
            .flatten()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hashes {
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaFile {
    pub version: u64,
    pub length: Option<u64>,
    pub hashes: Option<Hashes>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampSigned {
    #[serde(rename = "_type")]
    pub typ: String,
    pub spec_version: String,
    pub version: u64,
    pub expires: DateTime<Utc>,
    pub meta: HashMap<String, MetaFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotSigned {
    #[serde(rename = "_type")]
    pub typ: String,
    pub spec_version: String,
    pub version: u64,
    pub expires: DateTime<Utc>,
    pub meta: HashMap<String, MetaFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetFile {
    pub length: u64,
    pub hashes: Hashes,
    #[serde(default)]
    pub custom: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetsSigned {
    #[serde(rename = "_type")]
    pub typ: String,
    pub spec_version: String,
    pub version: u64,
    pub expires: DateTime<Utc>,
    pub targets: HashMap<String, TargetFile>,
}

/// Canonicalizes `signed` per §6 ("Signatures are JSON-canonical over the
/// `signed` object") and verifies it against a threshold of `role_keys`
/// drawn from `keys`.
pub fn verify_role_threshold<T: Serialize>(
    signed: &T,
    signatures: &[Signature],
    keys: &HashMap<String, PublicKeyWire>,
    role_keys: &RoleKeys,
    role: RoleType,
) -> Result<(), SigstoreError> {
    let mut canonical = Vec::new();
    {
        let mut ser = serde_json::Serializer::with_formatter(&mut canonical, olpc_cjson::CanonicalFormatter::new());
        signed
            .serialize(&mut ser)
            .map_err(|e| SigstoreError::Tuf(format!("failed to canonicalize {}: {e}", role.as_str())))?;
    }

    let mut valid = 0u64;
    let mut seen_keyids = std::collections::HashSet::new();
    for sig in signatures {
        if !role_keys.keyids.contains(&sig.keyid) {
            continue;
        }
        if !seen_keyids.insert(sig.keyid.clone()) {
            continue; // don't double-count duplicate signatures from the same key
        }
        let Some(key_wire) = keys.get(&sig.keyid) else {
            continue;
        };
        let Ok(key) = key_wire.to_key_material() else {
            continue;
        };
        let Ok(sig_bytes) = hex::decode(&sig.sig) else {
            continue;
        };
        if key.verify(&canonical, &sig_bytes).is_ok() {
            valid += 1;
        }
    }

    if valid >= role_keys.threshold {
        Ok(())
    } else {
        Err(TrustRootRefreshError::SignatureThresholdNotMet {
            role: role.as_str(),
            threshold: role_keys.threshold,
            valid,
        }
        .into())
    }
}
