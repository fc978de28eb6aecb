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

//! The persistent local TUF store: one JSON file per role plus downloaded
//! targets under `targets/`, keyed by name (§6 "Persisted state").
//!
//! Every write goes through a temp-file-then-rename so a crash or
//! cancellation mid-update leaves the previously trusted state intact
//! (§5 "Cancellation & timeouts").

use std::path::{Path, PathBuf};

use fs4::tokio::AsyncFileExt;
use serde::{de::DeserializeOwned, Serialize};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::errors::SigstoreError;

/// A single-writer directory holding the most recently trusted TUF roles
/// and downloaded targets.
#[derive(Debug, Clone)]
pub struct LocalStore {
    dir: PathBuf,
}

/// Holds an advisory exclusive lock on the store directory's lockfile for
/// the duration of one `update()` call. Dropping the guard releases the
/// lock.
pub struct StoreLock {
    _file: File,
}

impl LocalStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn targets_dir(&self) -> PathBuf {
        self.dir.join("targets")
    }

    pub async fn ensure_dirs(&self) -> Result<(), SigstoreError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| SigstoreError::io(&self.dir, e))?;
        tokio::fs::create_dir_all(self.targets_dir())
            .await
            .map_err(|e| SigstoreError::io(self.targets_dir(), e))
    }

    /// Acquires the single-writer lock on this store. Held for the
    /// duration of one `update()`.
    pub async fn lock(&self) -> Result<StoreLock, SigstoreError> {
        self.ensure_dirs().await?;
        let lock_path = self.dir.join(".lock");
        let file = File::options()
            .create(true)
            .write(true)
            .open(&lock_path)
            .await
            .map_err(|e| SigstoreError::io(&lock_path, e))?;
        file.lock_exclusive()
            .map_err(|e| SigstoreError::io(&lock_path, e))?;
        Ok(StoreLock { _file: file })
    }

    fn role_path(&self, role: &str) -> PathBuf {
        self.dir.join(format!("{role}.json"))
    }

    pub async fn read_role<T: DeserializeOwned>(&self, role: &str) -> Option<T> {
        let path = self.role_path(role);
        let mut contents = Vec::new();
        let mut file = File::open(&path).await.ok()?;
        file.read_to_end(&mut contents).await.ok()?;
        serde_json::from_slice(&contents).ok()
    }

    /// Writes `value` to `{role}.json` via a temp file in the same
    /// directory, then renames it into place. The rename is atomic on the
    /// same filesystem, so a concurrent reader never observes a partial
    /// write.
    pub async fn write_role_atomic<T: Serialize>(
        &self,
        role: &str,
        value: &T,
    ) -> Result<(), SigstoreError> {
        self.ensure_dirs().await?;
        let final_path = self.role_path(role);
        let tmp_path = self.dir.join(format!(".{role}.json.tmp"));
        let bytes = serde_json::to_vec(value)?;
        {
            let mut tmp = File::create(&tmp_path)
                .await
                .map_err(|e| SigstoreError::io(&tmp_path, e))?;
            tmp.write_all(&bytes)
                .await
                .map_err(|e| SigstoreError::io(&tmp_path, e))?;
            tmp.sync_all().await.map_err(|e| SigstoreError::io(&tmp_path, e))?;
        }
        tokio::fs::rename(&tmp_path, &final_path)
            .await
            .map_err(|e| SigstoreError::io(&final_path, e))?;
        Ok(())
    }

    pub async fn remove_role(&self, role: &str) -> Result<(), SigstoreError> {
        let path = self.role_path(role);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SigstoreError::io(&path, e)),
        }
    }

    pub async fn read_target(&self, name: &str) -> Option<Vec<u8>> {
        let path = self.targets_dir().join(name);
        tokio::fs::read(&path).await.ok()
    }

    pub async fn write_target_atomic(&self, name: &str, bytes: &[u8]) -> Result<(), SigstoreError> {
        self.ensure_dirs().await?;
        let final_path = self.targets_dir().join(name);
        let tmp_path = self.targets_dir().join(format!(".{name}.tmp"));
        {
            let mut tmp = File::create(&tmp_path)
                .await
                .map_err(|e| SigstoreError::io(&tmp_path, e))?;
            tmp.write_all(bytes)
                .await
                .map_err(|e| SigstoreError::io(&tmp_path, e))?;
            tmp.sync_all().await.map_err(|e| SigstoreError::io(&tmp_path, e))?;
        }
        tokio::fs::rename(&tmp_path, &final_path)
            .await
            .map_err(|e| SigstoreError::io(&final_path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn write_then_read_role_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        store.write_role_atomic("timestamp", &json!({"version": 3})).await.unwrap();
        let value: serde_json::Value = store.read_role("timestamp").await.unwrap();
        assert_eq!(value["version"], 3);
    }

    #[tokio::test]
    async fn missing_role_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        let value: Option<serde_json::Value> = store.read_role("timestamp").await;
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn target_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        store.write_target_atomic("trusted_root.json", b"hello").await.unwrap();
        let bytes = store.read_target("trusted_root.json").await.unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[tokio::test]
    async fn lock_can_be_acquired_and_released() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        let guard = store.lock().await.unwrap();
        drop(guard);
        let _guard2 = store.lock().await.unwrap();
    }
}
