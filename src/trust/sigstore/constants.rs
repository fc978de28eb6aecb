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

//! Well-known endpoints of the public-good Sigstore instance, used to fill
//! in [`crate::config::SigningConfig::sigstore_public_defaults`] (§5
//! "Builder pattern with heterogeneous defaults").

/// TUF metadata root for the public-good instance.
pub const SIGSTORE_METADATA_BASE: &str = "https://tuf-repo-cdn.sigstore.dev/";

/// TUF target file root for the public-good instance.
pub const SIGSTORE_TARGET_BASE: &str = "https://tuf-repo-cdn.sigstore.dev/targets/";

/// Fulcio certificate authority, public-good instance.
pub const FULCIO_URL: &str = "https://fulcio.sigstore.dev";

/// Rekor transparency log, public-good instance.
pub const REKOR_URL: &str = "https://rekor.sigstore.dev";

/// OIDC issuer used by the interactive browser and device-code flows
/// against the public-good instance.
pub const OAUTH_ISSUER: &str = "https://oauth2.sigstore.dev/auth";

/// OIDC client-id registered for the public-good instance's CLI flows.
pub const OAUTH_CLIENT_ID: &str = "sigstore";

/// Name of the trust-root bundle target inside the TUF repository.
pub const TRUSTED_ROOT_TARGET: &str = "trusted_root.json";
