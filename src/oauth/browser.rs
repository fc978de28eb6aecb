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

//! Interactive browser flow: PKCE authorization-code grant with a
//! localhost redirect listener, generalized from the teacher's blocking
//! `oauth::openidflow` to run on `tokio::net::TcpListener` under a
//! caller-supplied deadline.

use std::time::Duration;

use async_trait::async_trait;
use openidconnect::core::{
    CoreClient, CoreIdTokenVerifier, CoreProviderMetadata, CoreResponseType,
};
use openidconnect::reqwest::async_http_client;
use openidconnect::{
    AuthenticationFlow, AuthorizationCode, ClientId, ClientSecret, CsrfToken, IssuerUrl, Nonce,
    PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, Scope,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use url::Url;

use crate::errors::{IdentityError, Result};

use super::{timeout_error, IdentityToken, OidcFlow};

const SUCCESS_PAGE: &str = "<html><title>Sign-in complete</title><body><h1>Sign-in successful</h1><p>You may now close this page.</p></body></html>";

pub struct BrowserFlow {
    issuer: String,
    client_id: String,
    client_secret: Option<String>,
    redirect_port: u16,
}

impl BrowserFlow {
    pub fn new(issuer: impl Into<String>, client_id: impl Into<String>, redirect_port: u16) -> Self {
        Self {
            issuer: issuer.into(),
            client_id: client_id.into(),
            client_secret: None,
            redirect_port,
        }
    }

    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    async fn build_client(&self, redirect_url: &str) -> Result<CoreClient> {
        let issuer = IssuerUrl::new(self.issuer.clone())
            .map_err(|e| IdentityError(format!("invalid OIDC issuer: {e}")))?;
        let metadata = CoreProviderMetadata::discover_async(issuer, async_http_client)
            .await
            .map_err(|e| IdentityError(format!("OIDC discovery failed: {e}")))?;

        let client_id = ClientId::new(self.client_id.clone());
        let client_secret = self.client_secret.clone().map(ClientSecret::new);
        let redirect_url = RedirectUrl::new(redirect_url.to_string())
            .map_err(|e| IdentityError(format!("invalid redirect URL: {e}")))?;

        Ok(CoreClient::from_provider_metadata(metadata, client_id, client_secret)
            .set_redirect_uri(redirect_url))
    }
}

#[async_trait]
impl OidcFlow for BrowserFlow {
    async fn obtain_identity(&self, deadline: Duration) -> Result<IdentityToken> {
        tokio::time::timeout(deadline, self.run())
            .await
            .map_err(|_| timeout_error(deadline))?
    }
}

impl BrowserFlow {
    async fn run(&self) -> Result<IdentityToken> {
        let listener = TcpListener::bind(("127.0.0.1", self.redirect_port))
            .await
            .map_err(|e| IdentityError(format!("failed to bind redirect listener: {e}")))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| IdentityError(format!("failed to read local address: {e}")))?;
        let redirect_url = format!("http://{local_addr}");

        let client = self.build_client(&redirect_url).await?;

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let (authorize_url, _csrf_token, nonce) = client
            .authorize_url(
                AuthenticationFlow::<CoreResponseType>::AuthorizationCode,
                CsrfToken::new_random,
                Nonce::new_random,
            )
            .add_scope(Scope::new("email".to_string()))
            .add_scope(Scope::new("profile".to_string()))
            .set_pkce_challenge(pkce_challenge)
            .url();

        tracing::info!(url = %authorize_url, "open this URL in a browser to authenticate");

        let (stream, _) = listener
            .accept()
            .await
            .map_err(|e| IdentityError(format!("redirect listener accept failed: {e}")))?;
        let code = read_authorization_code(stream).await?;

        let token_response = client
            .exchange_code(code)
            .set_pkce_verifier(pkce_verifier)
            .request_async(async_http_client)
            .await
            .map_err(|e| IdentityError(format!("token exchange failed: {e}")))?;

        extract_identity(&client, &token_response, &nonce, &self.issuer)
    }
}

async fn read_authorization_code(mut stream: tokio::net::TcpStream) -> Result<AuthorizationCode> {
    let (read_half, mut write_half) = stream.split();
    let mut reader = BufReader::new(read_half);
    let mut request_line = String::new();
    reader
        .read_line(&mut request_line)
        .await
        .map_err(|e| IdentityError(format!("failed to read redirect request: {e}")))?;

    let path = request_line
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| IdentityError("malformed redirect request line".into()))?;
    let url = Url::parse(&format!("http://localhost{path}"))
        .map_err(|e| IdentityError(format!("malformed redirect URL: {e}")))?;

    let code = url
        .query_pairs()
        .find(|(key, _)| key == "code")
        .map(|(_, value)| AuthorizationCode::new(value.into_owned()))
        .ok_or_else(|| IdentityError("redirect URL carried no authorization code".into()))?;

    let response = format!(
        "HTTP/1.1 200 OK\r\ncontent-length: {}\r\n\r\n{}",
        SUCCESS_PAGE.len(),
        SUCCESS_PAGE
    );
    write_half
        .write_all(response.as_bytes())
        .await
        .map_err(|e| IdentityError(format!("failed to write redirect response: {e}")))?;

    Ok(code)
}

fn extract_identity(
    client: &CoreClient,
    token_response: &openidconnect::core::CoreTokenResponse,
    nonce: &Nonce,
    issuer: &str,
) -> Result<IdentityToken> {
    let id_token = token_response
        .extra_fields()
        .id_token()
        .ok_or_else(|| IdentityError("provider did not return an id_token".into()))?;

    let verifier: CoreIdTokenVerifier = client.id_token_verifier();
    let claims = id_token
        .claims(&verifier, nonce)
        .map_err(|e| IdentityError(format!("id_token claims verification failed: {e}")))?;

    Ok(IdentityToken {
        raw: id_token.to_string(),
        subject: claims.subject().as_str().to_string(),
        issuer: issuer.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults_have_no_client_secret() {
        let flow = BrowserFlow::new("https://oauth2.sigstore.dev/auth", "sigstore", 0);
        assert!(flow.client_secret.is_none());
    }
}
