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

//! The signing pipeline's output: digest, certificate chain, raw
//! signature, and the verified transparency-log entry (§3 "Signing
//! bundle").

use webpki::types::CertificateDer;

use crate::crypto::Digest;
use crate::rekor::LogEntryRecord;

#[derive(Debug, Clone)]
pub struct SigningBundle {
    pub digest: Digest,
    pub cert_chain: Vec<CertificateDer<'static>>,
    pub signature: Vec<u8>,
    pub log_entry: LogEntryRecord,
}
