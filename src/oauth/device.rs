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

//! Device-authorization-grant flow, for headless environments (CI runners
//! without a browser) that can still display a verification URL to a human.

use std::time::Duration;

use async_trait::async_trait;
use openidconnect::core::{CoreClient, CoreIdTokenVerifier, CoreProviderMetadata};
use openidconnect::reqwest::async_http_client;
use openidconnect::{ClientId, ClientSecret, DeviceAuthorizationUrl, IssuerUrl, Nonce, Scope};

use crate::errors::{IdentityError, Result};

use super::{timeout_error, IdentityToken, OidcFlow};

pub struct DeviceCodeFlow {
    issuer: String,
    client_id: String,
    client_secret: Option<String>,
    device_authorization_endpoint: Option<String>,
}

impl DeviceCodeFlow {
    pub fn new(issuer: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            client_id: client_id.into(),
            client_secret: None,
            device_authorization_endpoint: None,
        }
    }

    /// Overrides the device-authorization endpoint when the provider's
    /// discovery document does not advertise one (Sigstore's public OIDC
    /// issuer requires this).
    pub fn with_device_authorization_endpoint(mut self, url: impl Into<String>) -> Self {
        self.device_authorization_endpoint = Some(url.into());
        self
    }

    async fn build_client(&self) -> Result<CoreClient> {
        let issuer = IssuerUrl::new(self.issuer.clone())
            .map_err(|e| IdentityError(format!("invalid OIDC issuer: {e}")))?;
        let metadata = CoreProviderMetadata::discover_async(issuer, async_http_client)
            .await
            .map_err(|e| IdentityError(format!("OIDC discovery failed: {e}")))?;

        let client_id = ClientId::new(self.client_id.clone());
        let client_secret = self.client_secret.clone().map(ClientSecret::new);
        let mut client = CoreClient::from_provider_metadata(metadata, client_id, client_secret);

        let device_endpoint = self
            .device_authorization_endpoint
            .clone()
            .ok_or_else(|| IdentityError("no device-authorization endpoint configured".into()))?;
        let device_url = DeviceAuthorizationUrl::new(device_endpoint)
            .map_err(|e| IdentityError(format!("invalid device-authorization endpoint: {e}")))?;
        client = client.set_device_authorization_url(device_url);

        Ok(client)
    }
}

#[async_trait]
impl OidcFlow for DeviceCodeFlow {
    async fn obtain_identity(&self, deadline: Duration) -> Result<IdentityToken> {
        tokio::time::timeout(deadline, self.run())
            .await
            .map_err(|_| timeout_error(deadline))?
    }
}

impl DeviceCodeFlow {
    async fn run(&self) -> Result<IdentityToken> {
        let client = self.build_client().await?;

        let details = client
            .exchange_device_code()
            .map_err(|e| IdentityError(format!("device code request failed: {e}")))?
            .add_scope(Scope::new("email".to_string()))
            .request_async(async_http_client)
            .await
            .map_err(|e| IdentityError(format!("device authorization failed: {e}")))?;

        tracing::info!(
            verification_uri = %details.verification_uri().as_str(),
            user_code = %details.user_code().secret(),
            "visit this URL and enter the code to authenticate"
        );

        let token_response = client
            .exchange_device_access_token(&details)
            .request_async(async_http_client, tokio::time::sleep, None)
            .await
            .map_err(|e| IdentityError(format!("device token polling failed: {e}")))?;

        let id_token = token_response
            .extra_fields()
            .id_token()
            .ok_or_else(|| IdentityError("provider did not return an id_token".into()))?;
        // The device-authorization grant never issues a nonce, so accept
        // whatever the id_token carries rather than matching against one.
        let verifier: CoreIdTokenVerifier = client.id_token_verifier();
        let claims = id_token
            .claims(&verifier, |_nonce: Option<&Nonce>| -> std::result::Result<(), String> { Ok(()) })
            .map_err(|e| IdentityError(format!("id_token claims verification failed: {e}")))?;

        Ok(IdentityToken {
            raw: id_token.to_string(),
            subject: claims.subject().as_str().to_string(),
            issuer: self.issuer.clone(),
        })
    }
}
