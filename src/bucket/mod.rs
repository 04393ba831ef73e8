// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod reconcile;
mod s3;

use std::collections::BTreeSet;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{BucketError, ListingError};

pub use reconcile::{ReconcilePlan, Reconciler, expected_keys, plan};
pub use s3::{BucketConfig, S3Bucket};

/// User metadata key holding the hex SHA-256 of an uploaded object
pub const DIGEST_METADATA_KEY: &str = "sha256";

/// Remote object store holding the published files
#[async_trait]
pub trait Bucket: Send + Sync {
    /// Bucket name, used in logs and diagnoses
    fn name(&self) -> &str;

    /// Every key currently in the bucket
    async fn list_keys(&self) -> Result<BTreeSet<String>, ListingError>;

    /// Single PUT of a whole object
    async fn put_object(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        digest: &str,
    ) -> Result<(), BucketError>;

    /// Digest recorded on an object at upload time, if any
    async fn object_digest(&self, key: &str) -> Result<Option<String>, BucketError>;

    /// Batched delete
    async fn delete_objects(&self, keys: &[String]) -> Result<(), BucketError>;
}
