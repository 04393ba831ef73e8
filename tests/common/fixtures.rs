//! A mirror wired to fakes, backed by a temporary directory.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;
use url::Url;

use podmirror::episode::LOGO_KEY;
use podmirror::{
    AcquisitionPipeline, Catalog, ContentStore, Episode, EpisodeId, EpisodeMetadata, FeedInfo,
    Measurements, NoopReporter, Orchestrator, Reconciler, SyncOptions,
};

use super::fakes::{FakeFetcher, FakeTranscoder, MemoryBucket, RecordingNotifier};

pub const PODCAST_URL: &str = "https://mirror.example.com";

pub fn episode_url(id: &str) -> Url {
    Url::parse(&format!("https://www.bbc.co.uk/sounds/play/{id}")).unwrap()
}

/// Publish time `day` days into January 2024
pub fn published(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, day, 9, 0, 0).unwrap()
}

pub fn metadata(id: &str, day: u32) -> EpisodeMetadata {
    EpisodeMetadata {
        title: format!("Show - Episode {id}"),
        description: Some(format!("All about {id}")),
        image_url: Url::parse(&format!("https://ichef.example.com/images/{id}.jpg")).unwrap(),
        published_at: published(day),
    }
}

pub fn episode(id: &str, day: u32) -> Episode {
    let url = episode_url(id);
    Episode::from_metadata(EpisodeId::from_url(&url).unwrap(), url, metadata(id, day))
}

pub fn measured(id: &str, day: u32) -> Episode {
    Episode {
        measurements: Some(Measurements {
            size_in_bytes: 1000,
            duration_in_seconds: 60,
        }),
        ..episode(id, day)
    }
}

pub struct Mirror {
    pub dir: TempDir,
    pub catalog: Catalog,
    pub content: ContentStore,
    pub bucket: Arc<MemoryBucket>,
    pub fetcher: Arc<FakeFetcher>,
    pub transcoder: Arc<FakeTranscoder>,
    pub notifier: Arc<RecordingNotifier>,
    pub verify_digests: bool,
}

impl Mirror {
    pub async fn new(bucket: MemoryBucket) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::open(&dir.path().join("catalog.db")).await.unwrap();
        let (content, _) = ContentStore::open(&dir.path().join("content")).unwrap();
        std::fs::write(dir.path().join("logo-source.png"), b"PNG logo").unwrap();

        Self {
            dir,
            catalog,
            content,
            bucket: Arc::new(bucket),
            fetcher: Arc::new(FakeFetcher::default()),
            transcoder: Arc::new(FakeTranscoder::default()),
            notifier: Arc::new(RecordingNotifier::default()),
            verify_digests: false,
        }
    }

    /// Record episodes directly in the catalog
    pub async fn seed(&self, episodes: &[Episode]) {
        for episode in episodes {
            self.catalog.insert(episode).await.unwrap();
        }
        self.catalog.commit().await.unwrap();
    }

    pub fn logo_source(&self) -> PathBuf {
        self.dir.path().join("logo-source.png")
    }

    pub fn local_file(&self, name: &str) -> PathBuf {
        self.content.path(name)
    }

    pub fn orchestrator(&self, max_episodes: usize) -> Orchestrator<'_> {
        let pipeline = AcquisitionPipeline::new(
            self.fetcher.clone(),
            self.transcoder.clone(),
            self.content.clone(),
        );
        let reconciler =
            Reconciler::new(self.bucket.clone(), self.content.clone(), self.verify_digests);

        let options = SyncOptions {
            max_episodes,
            podcast_url: PODCAST_URL.to_string(),
            logo_file: Some(self.logo_source()),
            feed: FeedInfo::default(),
        };

        Orchestrator::new(
            &self.catalog,
            pipeline,
            reconciler,
            self.notifier.clone(),
            options,
            NoopReporter::shared(),
        )
    }

    pub async fn catalog_entry(&self, id: &str) -> Episode {
        self.catalog
            .find_by_url(&episode_url(id))
            .await
            .unwrap()
            .unwrap_or_else(|| panic!("{id} is not in the catalog"))
    }

    pub fn feed_url(&self) -> String {
        format!("{PODCAST_URL}/podcast.xml")
    }

    pub fn logo_key(&self) -> &'static str {
        LOGO_KEY
    }
}

pub fn keys(items: &[&str]) -> std::collections::BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}
