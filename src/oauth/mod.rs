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

//! OIDC identity acquisition (§4.4): obtain an identity token via a
//! configured flow, and expose the subject claim the CA client binds a
//! certificate to.

pub mod ambient;
pub mod browser;
pub mod device;

use std::time::Duration;

use async_trait::async_trait;

use crate::errors::{IdentityError, Result};

/// A verified OIDC identity token, reduced to the fields the rest of the
/// signing pipeline needs.
#[derive(Debug, Clone)]
pub struct IdentityToken {
    /// The raw, still-encoded ID token, forwarded to the CA as-is.
    pub raw: String,
    /// The `sub` (or provider-specific identity) claim, embedded in the
    /// CSR's proof of possession.
    pub subject: String,
    pub issuer: String,
}

/// One way of obtaining an identity token. `BrowserFlow`, `DeviceCodeFlow`,
/// and `AmbientFlow` are the three configured implementations (§9 "ambient
/// identity providers").
#[async_trait]
pub trait OidcFlow: Send + Sync {
    async fn obtain_identity(&self, deadline: Duration) -> Result<IdentityToken>;
}

pub(crate) fn timeout_error(deadline: Duration) -> IdentityError {
    IdentityError(format!("identity flow did not complete within {deadline:?}"))
}
