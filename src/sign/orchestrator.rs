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

//! The signing orchestrator (§4.7): composes OIDC, the CA client, and the
//! transparency-log client into single- and batch-artifact signing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use pem::Pem;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::ca::FulcioClient;
use crate::config::SigningConfig;
use crate::crypto::{Digest, EphemeralKeypair};
use crate::errors::{Result, SigstoreError};
use crate::oauth::OidcFlow;
use crate::rekor::RekorClient;
use crate::trust::TrustRoot;

use super::bundle::SigningBundle;

/// Ties a trust root, an OIDC flow, and a [`SigningConfig`] together into a
/// single signing entry point.
///
/// Safe for concurrent invocation of `sign*` by multiple tasks once
/// constructed, iff the configured `reqwest::Client` is (it is, by
/// design). The underlying trust root is immutable and freely shared; it
/// must be refreshed by the caller before being handed to a long-lived
/// `Signer`, since the TUF store itself is not concurrency-safe.
pub struct Signer {
    config: SigningConfig,
    trust_root: Arc<dyn TrustRoot + Send + Sync>,
    oidc_flow: Arc<dyn OidcFlow>,
}

impl Signer {
    pub fn new(
        config: SigningConfig,
        trust_root: Arc<dyn TrustRoot + Send + Sync>,
        oidc_flow: Arc<dyn OidcFlow>,
    ) -> Self {
        Self {
            config,
            trust_root,
            oidc_flow,
        }
    }

    /// Signs a single digest within `deadline`.
    pub async fn sign(&self, digest: &Digest, deadline: Duration) -> Result<SigningBundle> {
        let mut bundles = self.sign_many(&[digest.clone()], deadline).await?;
        Ok(bundles.remove(0))
    }

    /// Signs every digest in `digests`, reusing one OIDC identity token and
    /// one ephemeral keypair across all of them (§4.7). Results are
    /// index-aligned with the input regardless of any server-side
    /// log-assignment ordering (§8 scenario 6).
    pub async fn sign_many(&self, digests: &[Digest], deadline: Duration) -> Result<Vec<SigningBundle>> {
        self.sign_many_cancellable(digests, deadline, &CancellationToken::new())
            .await
    }

    /// As [`Signer::sign_many`], but checked against `cancel` at every
    /// suspension point. Cancellation mid-flight discards the in-progress
    /// bundle; the ephemeral key is zeroized on every exit path because it
    /// is only ever held by value on this function's stack.
    #[instrument(skip(self, digests, cancel), fields(digest_count = digests.len()))]
    pub async fn sign_many_cancellable(
        &self,
        digests: &[Digest],
        deadline: Duration,
        cancel: &CancellationToken,
    ) -> Result<Vec<SigningBundle>> {
        tokio::time::timeout(deadline, self.sign_many_inner(digests, cancel))
            .await
            .map_err(|_| SigstoreError::DeadlineExceeded)?
    }

    async fn sign_many_inner(&self, digests: &[Digest], cancel: &CancellationToken) -> Result<Vec<SigningBundle>> {
        if digests.is_empty() {
            return Ok(Vec::new());
        }

        let identity = race_cancel(cancel, self.oidc_flow.obtain_identity(self.config.request_timeout)).await?;
        info!(subject = %identity.subject, issuer = %identity.issuer, "obtained OIDC identity");

        let keypair = EphemeralKeypair::generate_p256();

        let fulcio = FulcioClient::new(self.config.http.clone(), self.config.fulcio_url.clone());
        let cert_chain = race_cancel(
            cancel,
            fulcio.request_certificate(
                &identity.raw,
                &identity.subject,
                &keypair,
                self.trust_root.as_ref(),
                self.config.now(),
            ),
        )
        .await?;
        info!(chain_len = cert_chain.len(), "fulcio issued certificate chain");

        let leaf_pem = pem::encode(&Pem::new("CERTIFICATE", cert_chain[0].as_ref().to_vec()));
        let rekor = RekorClient::new(self.config.http.clone(), self.config.rekor_url.clone());

        let mut bundles = Vec::with_capacity(digests.len());
        for digest in digests {
            if cancel.is_cancelled() {
                return Err(SigstoreError::Cancelled);
            }
            let signature = keypair.sign(&digest.bytes).map_err(SigstoreError::Crypto)?;
            let log_entry = race_cancel(
                cancel,
                rekor.put_entry(&digest.bytes, &signature, &leaf_pem, self.trust_root.as_ref()),
            )
            .await?;
            bundles.push(SigningBundle {
                digest: digest.clone(),
                cert_chain: cert_chain.clone(),
                signature,
                log_entry,
            });
        }

        Ok(bundles)
    }

    /// Reads `path`, digests it with SHA-256, and signs the digest.
    pub async fn sign_file(&self, path: impl AsRef<Path>, deadline: Duration) -> Result<SigningBundle> {
        let digest = digest_file(path.as_ref()).await?;
        self.sign(&digest, deadline).await
    }

    /// Digests and signs every distinct path in `paths`, keyed by path in
    /// the returned map. Duplicate input paths collapse to one signing;
    /// every distinct path still gets an entry in the result.
    pub async fn sign_files<P: AsRef<Path>>(
        &self,
        paths: &[P],
        deadline: Duration,
    ) -> Result<HashMap<PathBuf, SigningBundle>> {
        let mut unique_paths: Vec<PathBuf> = Vec::new();
        for p in paths {
            let p = p.as_ref().to_path_buf();
            if !unique_paths.contains(&p) {
                unique_paths.push(p);
            }
        }

        let mut digests = Vec::with_capacity(unique_paths.len());
        for path in &unique_paths {
            digests.push(digest_file(path).await?);
        }

        let bundles = self.sign_many(&digests, deadline).await?;
        Ok(unique_paths.into_iter().zip(bundles).collect())
    }
}

async fn race_cancel<F, T>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(SigstoreError::Cancelled),
        res = fut => res,
    }
}

async fn digest_file(path: &Path) -> Result<Digest> {
    let bytes = tokio::fs::read(path).await.map_err(|e| SigstoreError::io(path, e))?;
    Ok(Digest::sha256(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::errors::IdentityError;
    use crate::oauth::IdentityToken;

    struct StubOidc {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl OidcFlow for StubOidc {
        async fn obtain_identity(&self, _deadline: Duration) -> Result<IdentityToken> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(IdentityError("stub flow never succeeds".into()).into())
        }
    }

    #[tokio::test]
    async fn sign_many_with_no_digests_never_calls_oidc() {
        let config = SigningConfig::sigstore_defaults();
        let trust_root = Arc::new(crate::trust::ManualTrustRoot::new(crate::trust::model::TrustedRoot {
            cas: Vec::new(),
            tlogs: Vec::new(),
            ctlogs: Vec::new(),
        }));
        let oidc = Arc::new(StubOidc {
            calls: AtomicUsize::new(0),
        });
        let signer = Signer::new(config, trust_root, oidc.clone());

        let result = signer.sign_many(&[], Duration::from_secs(5)).await.unwrap();
        assert!(result.is_empty());
        assert_eq!(oidc.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn sign_propagates_oidc_failure() {
        let config = SigningConfig::sigstore_defaults();
        let trust_root = Arc::new(crate::trust::ManualTrustRoot::new(crate::trust::model::TrustedRoot {
            cas: Vec::new(),
            tlogs: Vec::new(),
            ctlogs: Vec::new(),
        }));
        let oidc = Arc::new(StubOidc {
            calls: AtomicUsize::new(0),
        });
        let signer = Signer::new(config, trust_root, oidc);

        let digest = Digest::sha256(b"hello");
        let err = signer.sign(&digest, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, SigstoreError::Identity(_)));
    }

    #[tokio::test]
    async fn sign_many_respects_pre_cancelled_token() {
        let config = SigningConfig::sigstore_defaults();
        let trust_root = Arc::new(crate::trust::ManualTrustRoot::new(crate::trust::model::TrustedRoot {
            cas: Vec::new(),
            tlogs: Vec::new(),
            ctlogs: Vec::new(),
        }));
        let oidc = Arc::new(StubOidc {
            calls: AtomicUsize::new(0),
        });
        let signer = Signer::new(config, trust_root, oidc);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let digest = Digest::sha256(b"hello");
        let err = signer
            .sign_many_cancellable(&[digest], Duration::from_secs(5), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, SigstoreError::Cancelled));
    }
}
