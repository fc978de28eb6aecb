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

//! Ambient identity: read a pre-issued OIDC token from the environment a
//! CI runner already trusts, instead of running an interactive flow.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;

use crate::errors::{IdentityError, Result};

use super::{timeout_error, IdentityToken, OidcFlow};

/// The ambient token source to read from.
pub enum AmbientProvider {
    /// GitHub Actions' `ACTIONS_ID_TOKEN_REQUEST_URL` / `_TOKEN` env vars.
    GitHubActions { audience: String },
    /// The GCE/GKE metadata server's identity endpoint.
    Gcp { audience: String },
    /// A file containing a raw, already-issued ID token.
    File(PathBuf),
}

pub struct AmbientFlow {
    provider: AmbientProvider,
    http: reqwest::Client,
}

impl AmbientFlow {
    pub fn new(provider: AmbientProvider, http: reqwest::Client) -> Self {
        Self { provider, http }
    }
}

#[async_trait]
impl OidcFlow for AmbientFlow {
    async fn obtain_identity(&self, deadline: Duration) -> Result<IdentityToken> {
        tokio::time::timeout(deadline, self.run())
            .await
            .map_err(|_| timeout_error(deadline))?
    }
}

impl AmbientFlow {
    async fn run(&self) -> Result<IdentityToken> {
        let raw = match &self.provider {
            AmbientProvider::GitHubActions { audience } => self.github_actions_token(audience).await?,
            AmbientProvider::Gcp { audience } => self.gcp_metadata_token(audience).await?,
            AmbientProvider::File(path) => tokio::fs::read_to_string(path)
                .await
                .map_err(|e| IdentityError(format!("failed to read ambient token file: {e}")))?
                .trim()
                .to_string(),
        };
        parse_unverified(&raw)
    }

    async fn github_actions_token(&self, audience: &str) -> Result<String> {
        let request_url = std::env::var("ACTIONS_ID_TOKEN_REQUEST_URL")
            .map_err(|_| IdentityError("ACTIONS_ID_TOKEN_REQUEST_URL is not set".into()))?;
        let bearer = std::env::var("ACTIONS_ID_TOKEN_REQUEST_TOKEN")
            .map_err(|_| IdentityError("ACTIONS_ID_TOKEN_REQUEST_TOKEN is not set".into()))?;

        #[derive(Deserialize)]
        struct TokenResponse {
            value: String,
        }

        let resp: TokenResponse = self
            .http
            .get(request_url)
            .query(&[("audience", audience)])
            .bearer_auth(bearer)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| IdentityError(format!("GitHub Actions OIDC request failed: {e}")))?
            .json()
            .await
            .map_err(|e| IdentityError(format!("malformed GitHub Actions OIDC response: {e}")))?;

        Ok(resp.value)
    }

    async fn gcp_metadata_token(&self, audience: &str) -> Result<String> {
        let url = format!(
            "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/identity?audience={audience}&format=full"
        );
        let token = self
            .http
            .get(url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await?
            .error_for_status()
            .map_err(|e| IdentityError(format!("GCP metadata request failed: {e}")))?
            .text()
            .await
            .map_err(|e| IdentityError(format!("malformed GCP metadata response: {e}")))?;
        Ok(token)
    }
}

/// Extracts the `iss`/`sub` claims from the token's JWT payload without
/// verifying the signature: ambient tokens are trusted by construction (the
/// platform-internal channel they were fetched over *is* the trust
/// anchor), and the CA independently re-verifies the token against the
/// issuer's JWKS before it is ever used for certificate issuance.
fn parse_unverified(raw: &str) -> Result<IdentityToken> {
    #[derive(Deserialize)]
    struct Claims {
        iss: String,
        sub: String,
    }

    let payload_b64 = raw
        .split('.')
        .nth(1)
        .ok_or_else(|| IdentityError("ambient token is not a JWT".into()))?;
    let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|e| IdentityError(format!("ambient token payload is not base64url: {e}")))?;
    let claims: Claims = serde_json::from_slice(&payload)
        .map_err(|e| IdentityError(format!("ambient token payload is not valid JSON: {e}")))?;

    Ok(IdentityToken {
        raw: raw.to_string(),
        subject: claims.sub,
        issuer: claims.iss,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_jwt(iss: &str, sub: &str) -> String {
        let header = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(b"{\"alg\":\"none\"}");
        let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .encode(format!("{{\"iss\":\"{iss}\",\"sub\":\"{sub}\"}}"));
        format!("{header}.{payload}.")
    }

    #[test]
    fn parses_subject_and_issuer_from_jwt_payload() {
        let jwt = fake_jwt("https://token.actions.githubusercontent.com", "repo:acme/widgets");
        let identity = parse_unverified(&jwt).unwrap();
        assert_eq!(identity.subject, "repo:acme/widgets");
        assert_eq!(identity.issuer, "https://token.actions.githubusercontent.com");
    }

    #[test]
    fn rejects_non_jwt_input() {
        assert!(parse_unverified("not-a-jwt").is_err());
    }
}
