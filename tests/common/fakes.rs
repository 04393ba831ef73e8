//! In-memory stand-ins for the external collaborators.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use podmirror::error::{
    BucketError, DownloadError, ListingError, ListingFailure, NotifyError, SourceError,
    TranscodeError,
};
use podmirror::{Bucket, EpisodeMetadata, MediaFetcher, MetadataSource, Notifier, Transcoder};

/// Last path segment of a URL, which is the episode id in the fixtures
fn last_segment(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default()
        .to_string()
}

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Bytes,
    pub content_type: String,
    pub digest: String,
}

/// Bucket kept in a map, with failure injection
#[derive(Default)]
pub struct MemoryBucket {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    list_failure: Mutex<Option<String>>,
    failing_uploads: Mutex<BTreeSet<String>>,
    fail_deletes: AtomicBool,
    pub puts: AtomicUsize,
    pub deletes: AtomicUsize,
}

impl MemoryBucket {
    pub fn with_keys(keys: &[&str]) -> Self {
        let bucket = Self::default();
        for key in keys {
            bucket.seed(key, b"existing", "stale-digest");
        }
        bucket
    }

    pub fn seed(&self, key: &str, data: &[u8], digest: &str) {
        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                data: Bytes::copy_from_slice(data),
                content_type: "application/octet-stream".to_string(),
                digest: digest.to_string(),
            },
        );
    }

    pub fn keys(&self) -> BTreeSet<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    /// Make listing fail with the given backend message
    pub fn fail_listing(&self, message: &str) {
        *self.list_failure.lock().unwrap() = Some(message.to_string());
    }

    pub fn fail_upload_of(&self, key: &str) {
        self.failing_uploads.lock().unwrap().insert(key.to_string());
    }

    pub fn heal_uploads(&self) {
        self.failing_uploads.lock().unwrap().clear();
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Bucket for MemoryBucket {
    fn name(&self) -> &str {
        "memory-bucket"
    }

    async fn list_keys(&self) -> Result<BTreeSet<String>, ListingError> {
        if let Some(message) = self.list_failure.lock().unwrap().clone() {
            return Err(ListingError {
                bucket: self.name().to_string(),
                cause: ListingFailure::diagnose(&message),
                source: message.into(),
            });
        }
        Ok(self.keys())
    }

    async fn put_object(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        digest: &str,
    ) -> Result<(), BucketError> {
        if self.failing_uploads.lock().unwrap().contains(key) {
            return Err(BucketError::UploadFailed {
                key: key.to_string(),
                source: "injected upload failure".into(),
            });
        }

        self.puts.fetch_add(1, Ordering::SeqCst);
        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.to_string(),
                digest: digest.to_string(),
            },
        );
        Ok(())
    }

    async fn object_digest(&self, key: &str) -> Result<Option<String>, BucketError> {
        Ok(self.object(key).map(|object| object.digest))
    }

    async fn delete_objects(&self, keys: &[String]) -> Result<(), BucketError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(BucketError::DeleteFailed {
                keys: keys.to_vec(),
                source: "injected delete failure".into(),
            });
        }

        self.deletes.fetch_add(1, Ordering::SeqCst);
        let mut objects = self.objects.lock().unwrap();
        for key in keys {
            objects.remove(key);
        }
        Ok(())
    }
}

/// Writes small fixed payloads instead of downloading
#[derive(Default)]
pub struct FakeFetcher {
    failing_ids: Mutex<BTreeSet<String>>,
    pub image_fetches: AtomicUsize,
    pub audio_fetches: AtomicUsize,
}

impl FakeFetcher {
    pub fn fail_audio_for(&self, episode_id: &str) {
        self.failing_ids
            .lock()
            .unwrap()
            .insert(episode_id.to_string());
    }

    pub fn heal(&self) {
        self.failing_ids.lock().unwrap().clear();
    }

    pub fn audio_fetch_count(&self) -> usize {
        self.audio_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaFetcher for FakeFetcher {
    async fn fetch_file(&self, url: &Url, dest: &Path) -> Result<u64, DownloadError> {
        self.image_fetches.fetch_add(1, Ordering::SeqCst);
        let data = format!("image from {url}");
        std::fs::write(dest, &data).unwrap();
        Ok(data.len() as u64)
    }

    async fn fetch_streaming_audio(&self, source: &Url, dest: &Path) -> Result<(), DownloadError> {
        self.audio_fetches.fetch_add(1, Ordering::SeqCst);
        if self.failing_ids.lock().unwrap().contains(&last_segment(source)) {
            return Err(DownloadError::ExtractorFailed {
                program: "yt-dlp".to_string(),
                url: source.to_string(),
                stderr: "ERROR: injected extraction failure".to_string(),
            });
        }
        std::fs::write(dest, format!("raw audio of {source}")).unwrap();
        Ok(())
    }
}

/// Produces deterministic output files with a fixed duration
#[derive(Default)]
pub struct FakeTranscoder {
    fail: AtomicBool,
    pub transcodes: AtomicUsize,
}

pub const FAKE_DURATION: u64 = 1800;

impl FakeTranscoder {
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn transcode_count(&self) -> usize {
        self.transcodes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn transcode(
        &self,
        src: &Path,
        dest: &Path,
        _cover: &Path,
        title: &str,
    ) -> Result<(), TranscodeError> {
        self.transcodes.fetch_add(1, Ordering::SeqCst);
        // A real encoder leaves a truncated file behind when it dies
        std::fs::write(dest, b"ID3 truncated").unwrap();
        if self.fail.load(Ordering::SeqCst) {
            return Err(TranscodeError::Failed {
                program: "ffmpeg".to_string(),
                path: src.to_path_buf(),
                status: "exit status: 1".to_string(),
                stderr: "injected encoder failure".to_string(),
            });
        }
        std::fs::write(dest, format!("mp3 of {title}")).unwrap();
        Ok(())
    }

    async fn duration_in_seconds(&self, _path: &Path) -> Result<u64, TranscodeError> {
        Ok(FAKE_DURATION)
    }
}

/// Records every ping
#[derive(Default)]
pub struct RecordingNotifier {
    pub pings: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn pings(&self) -> Vec<String> {
        self.pings.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, feed_url: &str) -> Result<(), NotifyError> {
        self.pings.lock().unwrap().push(feed_url.to_string());
        Ok(())
    }
}

/// Source with a fixed list of episodes
#[derive(Default)]
pub struct FakeSource {
    pub episodes: Vec<(Url, EpisodeMetadata)>,
    pub unreadable: BTreeSet<String>,
    pub list_fails: bool,
    pub fetches: AtomicUsize,
}

impl FakeSource {
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataSource for FakeSource {
    async fn list_episode_urls(&self, max_episodes: usize) -> Result<Vec<Url>, SourceError> {
        if self.list_fails {
            return Err(SourceError::ListReadFailed {
                path: "episodes.txt".into(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
            });
        }
        Ok(self
            .episodes
            .iter()
            .take(max_episodes)
            .map(|(url, _)| url.clone())
            .collect())
    }

    async fn fetch_metadata(&self, url: &Url) -> Result<EpisodeMetadata, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.unreadable.contains(&last_segment(url)) {
            return Err(SourceError::MetadataUnavailable {
                url: url.to_string(),
                reason: "no preloaded state".to_string(),
            });
        }
        self.episodes
            .iter()
            .find(|(candidate, _)| candidate == url)
            .map(|(_, metadata)| metadata.clone())
            .ok_or_else(|| SourceError::HttpStatus {
                url: url.to_string(),
                status: 404,
            })
    }
}
