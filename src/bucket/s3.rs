// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::{
    Attribute, AttributeValue, Attributes, ClientOptions, GetOptions, ObjectStore, PutOptions,
};

use super::{Bucket, DIGEST_METADATA_KEY};
use crate::error::{BucketError, ListingError, ListingFailure};

/// Connection settings for an S3 compatible bucket
#[derive(Debug, Clone)]
pub struct BucketConfig {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint for S3 compatible services
    pub endpoint: Option<String>,
    /// Falls back to the standard AWS environment when unset
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub request_timeout: Duration,
}

/// [`Bucket`] backed by `object_store`'s Amazon S3 client
///
/// Objects are uploaded without an ACL; public read access is expected to
/// come from the bucket policy.
#[derive(Clone)]
pub struct S3Bucket {
    store: Arc<dyn ObjectStore>,
    name: String,
}

impl S3Bucket {
    pub fn new(config: &BucketConfig) -> Result<Self, BucketError> {
        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(&config.bucket)
            .with_region(&config.region)
            .with_client_options(ClientOptions::new().with_timeout(config.request_timeout));

        if let Some(endpoint) = &config.endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(endpoint.starts_with("http://"));
        }
        if let Some(access_key_id) = &config.access_key_id {
            builder = builder.with_access_key_id(access_key_id);
        }
        if let Some(secret_access_key) = &config.secret_access_key {
            builder = builder.with_secret_access_key(secret_access_key);
        }

        let store = builder.build().map_err(|e| BucketError::Config {
            bucket: config.bucket.clone(),
            source: Box::new(e),
        })?;

        Ok(Self::from_store(Arc::new(store), &config.bucket))
    }

    /// Wrap an existing store
    pub fn from_store(store: Arc<dyn ObjectStore>, name: &str) -> Self {
        Self {
            store,
            name: name.to_string(),
        }
    }
}

impl std::fmt::Debug for S3Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Bucket").field("name", &self.name).finish()
    }
}

#[async_trait]
impl Bucket for S3Bucket {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_keys(&self) -> Result<BTreeSet<String>, ListingError> {
        let objects: Vec<_> = self
            .store
            .list(None)
            .try_collect()
            .await
            .map_err(|e| ListingError {
                bucket: self.name.clone(),
                cause: ListingFailure::diagnose(&e.to_string()),
                source: Box::new(e),
            })?;

        Ok(objects
            .into_iter()
            .map(|meta| meta.location.to_string())
            .collect())
    }

    async fn put_object(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        digest: &str,
    ) -> Result<(), BucketError> {
        let mut attributes = Attributes::new();
        attributes.insert(
            Attribute::ContentType,
            AttributeValue::from(content_type.to_string()),
        );
        attributes.insert(
            Attribute::Metadata(DIGEST_METADATA_KEY.into()),
            AttributeValue::from(digest.to_string()),
        );

        let options = PutOptions {
            attributes,
            ..Default::default()
        };

        self.store
            .put_opts(&ObjectPath::from(key), data.into(), options)
            .await
            .map_err(|e| BucketError::UploadFailed {
                key: key.to_string(),
                source: Box::new(e),
            })?;
        Ok(())
    }

    async fn object_digest(&self, key: &str) -> Result<Option<String>, BucketError> {
        let options = GetOptions {
            head: true,
            ..Default::default()
        };

        match self.store.get_opts(&ObjectPath::from(key), options).await {
            Ok(result) => Ok(result
                .attributes
                .get(&Attribute::Metadata(DIGEST_METADATA_KEY.into()))
                .map(|value| value.to_string())),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(BucketError::HeadFailed {
                key: key.to_string(),
                source: Box::new(e),
            }),
        }
    }

    async fn delete_objects(&self, keys: &[String]) -> Result<(), BucketError> {
        if keys.is_empty() {
            return Ok(());
        }

        let locations = futures::stream::iter(
            keys.iter()
                .map(|key| Ok::<_, object_store::Error>(ObjectPath::from(key.as_str())))
                .collect::<Vec<_>>(),
        )
        .boxed();

        let mut deleted = BTreeSet::new();
        let mut first_error = None;
        let mut results = self.store.delete_stream(locations);
        while let Some(result) = results.next().await {
            match result {
                Ok(path) => {
                    deleted.insert(path.to_string());
                }
                // Already gone counts as deleted
                Err(object_store::Error::NotFound { path, .. }) => {
                    deleted.insert(path);
                }
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(BucketError::DeleteFailed {
                keys: keys
                    .iter()
                    .filter(|key| !deleted.contains(key.as_str()))
                    .cloned()
                    .collect(),
                source: Box::new(e),
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;

    fn memory_bucket() -> S3Bucket {
        S3Bucket::from_store(Arc::new(InMemory::new()), "test-bucket")
    }

    #[tokio::test]
    async fn put_then_list_and_read_digest() {
        let bucket = memory_bucket();

        bucket
            .put_object("m1.mp3", Bytes::from_static(b"mp3"), "audio/mpeg", "abc123")
            .await
            .unwrap();

        let keys = bucket.list_keys().await.unwrap();
        assert_eq!(keys, BTreeSet::from(["m1.mp3".to_string()]));
        assert_eq!(
            bucket.object_digest("m1.mp3").await.unwrap(),
            Some("abc123".to_string())
        );
    }

    #[tokio::test]
    async fn digest_of_missing_object_is_none() {
        let bucket = memory_bucket();
        assert_eq!(bucket.object_digest("nope.mp3").await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_objects_removes_keys() {
        let bucket = memory_bucket();
        for key in ["a.mp3", "a.jpg", "b.mp3"] {
            bucket
                .put_object(key, Bytes::from_static(b"x"), "audio/mpeg", "d")
                .await
                .unwrap();
        }

        bucket
            .delete_objects(&["a.mp3".to_string(), "a.jpg".to_string()])
            .await
            .unwrap();

        let keys = bucket.list_keys().await.unwrap();
        assert_eq!(keys, BTreeSet::from(["b.mp3".to_string()]));
    }
}
