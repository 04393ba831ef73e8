// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::BTreeSet;
use std::sync::Arc;

use super::Bucket;
use crate::content::ContentStore;
use crate::episode::{Episode, INFRASTRUCTURE_KEYS, content_type};
use crate::error::{BucketError, ContentError, ListingError};

/// Difference between the expected and the remote key sets
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    /// Expected but not remote
    pub to_upload: BTreeSet<String>,
    /// Remote but not expected
    pub to_delete: BTreeSet<String>,
}

/// Infrastructure keys plus the published files of every episode
pub fn expected_keys(episodes: &[Episode]) -> BTreeSet<String> {
    INFRASTRUCTURE_KEYS
        .iter()
        .map(|key| key.to_string())
        .chain(
            episodes
                .iter()
                .flat_map(|episode| episode.episode_id.remote_keys()),
        )
        .collect()
}

pub fn plan(expected: &BTreeSet<String>, remote: &BTreeSet<String>) -> ReconcilePlan {
    ReconcilePlan {
        to_upload: expected.difference(remote).cloned().collect(),
        to_delete: remote.difference(expected).cloned().collect(),
    }
}

/// Applies reconciliation decisions to a bucket from the local content store
pub struct Reconciler {
    bucket: Arc<dyn Bucket>,
    content: ContentStore,
    verify_digests: bool,
}

impl Reconciler {
    pub fn new(bucket: Arc<dyn Bucket>, content: ContentStore, verify_digests: bool) -> Self {
        Self {
            bucket,
            content,
            verify_digests,
        }
    }

    pub fn bucket_name(&self) -> &str {
        self.bucket.name()
    }

    /// Snapshot of the remote keys; failure leaves nothing to reconcile against
    pub async fn list_remote(&self) -> Result<BTreeSet<String>, ListingError> {
        let remote = self.bucket.list_keys().await?;
        tracing::info!(bucket = %self.bucket.name(), keys = remote.len(), "Listed remote objects");
        Ok(remote)
    }

    /// Whether `key` has to be uploaded given the remote snapshot
    ///
    /// A missing key always does. A present key only does when digest
    /// verification is enabled, the file exists locally, and the recorded
    /// digest differs from the local one.
    pub async fn needs_upload(&self, key: &str, remote: &BTreeSet<String>) -> bool {
        if !remote.contains(key) {
            return true;
        }
        if !self.verify_digests || !self.content.exists(key) {
            return false;
        }
        self.is_stale(key).await
    }

    async fn is_stale(&self, key: &str) -> bool {
        let local = match self.content.digest(key).await {
            Ok(digest) => digest,
            Err(e) => {
                tracing::warn!(%key, error = %e, "Cannot digest local file, skipping verification");
                return false;
            }
        };

        match self.bucket.object_digest(key).await {
            Ok(Some(remote)) if remote == local => false,
            Ok(Some(remote)) => {
                tracing::info!(%key, %local, %remote, "Remote object differs from local file");
                true
            }
            Ok(None) => {
                tracing::info!(%key, "Remote object carries no digest");
                true
            }
            Err(e) => {
                tracing::warn!(%key, error = %e, "Cannot read remote digest, skipping verification");
                false
            }
        }
    }

    /// Upload a stored file under its own name
    pub async fn upload(&self, key: &str) -> Result<(), BucketError> {
        let content_type = content_type(key)
            .ok_or_else(|| ContentError::UnknownContentType(key.to_string()))?;
        let digest = self.content.digest(key).await?;
        let data = self.content.read(key).await?;
        let size = data.len();

        self.bucket
            .put_object(key, data, content_type, &digest)
            .await?;

        tracing::info!(%key, content_type, size, "Uploaded object");
        Ok(())
    }

    pub async fn delete(&self, keys: &[String]) -> Result<(), BucketError> {
        if keys.is_empty() {
            return Ok(());
        }
        self.bucket.delete_objects(keys).await?;
        tracing::info!(keys = %keys.join(","), "Deleted remote objects");
        Ok(())
    }
}
