// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use url::Url;

use crate::acquire::AcquisitionPipeline;
use crate::bucket::{Reconciler, expected_keys, plan};
use crate::catalog::Catalog;
use crate::episode::{Episode, EpisodeId, FEED_KEY, LOGO_KEY};
use crate::error::{BoxError, EpisodeError, SyncError};
use crate::feed::{FeedInfo, object_url, render};
use crate::notify::Notifier;
use crate::progress::{ProgressEvent, SharedProgressReporter};
use crate::source::MetadataSource;

/// Options for a sync run
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Size of the published window
    pub max_episodes: usize,
    /// Base URL the bucket is served from
    pub podcast_url: String,
    /// Logo file copied into the content store before each run
    pub logo_file: Option<PathBuf>,
    pub feed: FeedInfo,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            max_episodes: 20,
            podcast_url: String::new(),
            logo_file: None,
            feed: FeedInfo::default(),
        }
    }
}

/// Final state of an episode within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpisodeState {
    /// Both published files were already remote
    RemotePresent,
    /// Acquired, uploaded and removed locally
    LocalCleaned,
    /// Failed this run; retried on the next
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeOutcome {
    pub episode_id: String,
    pub title: String,
    pub state: EpisodeState,
    pub error: Option<String>,
}

/// Result of refreshing the catalog from the source
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshResult {
    /// URLs returned by the source
    pub listed: usize,
    /// Records created in this refresh
    pub added: usize,
    /// URLs already recorded
    pub cached: usize,
    /// URLs whose metadata could not be recorded
    pub failed: usize,
}

/// Result of a sync run
#[derive(Debug, Clone, Default)]
pub struct SyncResult {
    /// One entry per episode of the published window, newest first
    pub episodes: Vec<EpisodeOutcome>,
    pub uploaded: Vec<String>,
    pub deleted: Vec<String>,
    /// Whether any upload or delete happened
    pub changed: bool,
    pub feed_published: bool,
}

impl SyncResult {
    fn count(&self, state: EpisodeState) -> usize {
        self.episodes.iter().filter(|e| e.state == state).count()
    }

    pub fn synced(&self) -> usize {
        self.count(EpisodeState::LocalCleaned)
    }

    pub fn present(&self) -> usize {
        self.count(EpisodeState::RemotePresent)
    }

    pub fn failed(&self) -> usize {
        self.count(EpisodeState::Failed)
    }

    /// Failed episodes as (id, title, error)
    pub fn failed_episodes(&self) -> Vec<(String, String, String)> {
        self.episodes
            .iter()
            .filter(|e| e.state == EpisodeState::Failed)
            .map(|e| {
                (
                    e.episode_id.clone(),
                    e.title.clone(),
                    e.error.clone().unwrap_or_default(),
                )
            })
            .collect()
    }
}

/// Drives catalog refresh, acquisition and reconciliation
///
/// Episodes are handled one at a time, newest first. A failure of one episode
/// is logged and recorded; only a failed remote listing or catalog failure
/// outside an episode aborts the run.
pub struct Orchestrator<'a> {
    catalog: &'a Catalog,
    pipeline: AcquisitionPipeline,
    reconciler: Reconciler,
    notifier: Arc<dyn Notifier>,
    options: SyncOptions,
    reporter: SharedProgressReporter,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        catalog: &'a Catalog,
        pipeline: AcquisitionPipeline,
        reconciler: Reconciler,
        notifier: Arc<dyn Notifier>,
        options: SyncOptions,
        reporter: SharedProgressReporter,
    ) -> Self {
        Self {
            catalog,
            pipeline,
            reconciler,
            notifier,
            options,
            reporter,
        }
    }

    /// Record every listed URL that the catalog does not know yet
    ///
    /// Known URLs are not fetched again. A failing source listing leaves the
    /// catalog as it is.
    pub async fn refresh_catalog(
        &self,
        source: &dyn MetadataSource,
    ) -> Result<RefreshResult, SyncError> {
        let mut result = RefreshResult::default();

        let urls = match source.list_episode_urls(self.options.max_episodes).await {
            Ok(urls) => urls,
            Err(e) => {
                tracing::error!(error = %e, "Cannot list episodes, continuing with the catalog");
                return Ok(result);
            }
        };
        result.listed = urls.len();

        for url in &urls {
            match self.refresh_episode(source, url).await {
                Ok(true) => result.added += 1,
                Ok(false) => result.cached += 1,
                Err(e) => {
                    tracing::error!(%url, error = %e, "Cannot record episode");
                    result.failed += 1;
                }
            }
        }

        self.catalog.commit().await?;

        tracing::info!(
            listed = result.listed,
            added = result.added,
            failed = result.failed,
            "Refreshed catalog"
        );
        self.reporter.report(ProgressEvent::CatalogRefreshed {
            listed: result.listed,
            added: result.added,
            failed: result.failed,
        });

        Ok(result)
    }

    /// Returns whether a new record was created
    async fn refresh_episode(
        &self,
        source: &dyn MetadataSource,
        url: &Url,
    ) -> Result<bool, BoxError> {
        if let Some(existing) = self.catalog.find_by_url(url).await? {
            tracing::debug!(episode_id = %existing.episode_id, "Episode already in catalog");
            return Ok(false);
        }

        let episode_id =
            EpisodeId::from_url(url).ok_or_else(|| format!("no episode id in URL {url}"))?;
        let metadata = source.fetch_metadata(url).await?;
        let episode = Episode::from_metadata(episode_id, url.clone(), metadata);

        self.catalog.insert(&episode).await?;
        tracing::info!(
            episode_id = %episode.episode_id,
            title = %episode.title,
            "Added episode to catalog"
        );
        Ok(true)
    }

    /// Reconcile the bucket with the published window
    pub async fn run(&self) -> Result<SyncResult, SyncError> {
        let content = self.pipeline.content();
        if let Some(logo) = &self.options.logo_file {
            content.import(logo, LOGO_KEY).await?;
        }

        let mut episodes = self.catalog.most_recent(self.options.max_episodes).await?;

        let mut remote = self.reconciler.list_remote().await?;
        self.reporter.report(ProgressEvent::RemoteListed {
            bucket: self.reconciler.bucket_name().to_string(),
            keys: remote.len(),
        });

        let expected = expected_keys(&episodes);
        let reconcile_plan = plan(&expected, &remote);
        tracing::info!(
            episodes = episodes.len(),
            to_upload = reconcile_plan.to_upload.len(),
            to_delete = reconcile_plan.to_delete.len(),
            "Planned reconciliation"
        );
        self.reporter.report(ProgressEvent::EpisodesPlanned {
            total: episodes.len(),
            to_upload: reconcile_plan.to_upload.len(),
            to_delete: reconcile_plan.to_delete.len(),
        });

        let mut result = SyncResult::default();

        if self.reconciler.needs_upload(LOGO_KEY, &remote).await {
            self.upload_infrastructure(LOGO_KEY, &mut remote, &mut result)
                .await;
        }

        let total = episodes.len();
        for (index, episode) in episodes.iter_mut().enumerate() {
            self.reporter.report(ProgressEvent::EpisodeStarting {
                index,
                total,
                episode_id: episode.episode_id.to_string(),
                title: episode.title.clone(),
            });

            let outcome = self.sync_episode(episode, &mut remote, &mut result).await;
            result.episodes.push(outcome);
        }

        let orphans: Vec<String> = remote.difference(&expected).cloned().collect();
        if !orphans.is_empty() {
            match self.reconciler.delete(&orphans).await {
                Ok(()) => {
                    for key in &orphans {
                        remote.remove(key);
                    }
                    self.reporter.report(ProgressEvent::OrphansDeleted {
                        count: orphans.len(),
                    });
                    result.deleted.extend(orphans);
                    result.changed = true;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Cannot delete orphaned objects, retrying next run");
                }
            }
        }

        if !remote.contains(FEED_KEY) {
            result.changed = true;
        }

        if result.changed {
            self.publish_feed(&episodes, &mut remote, &mut result).await;
        } else {
            tracing::info!("Nothing changed, feed left as is");
        }

        self.reporter.report(ProgressEvent::SyncCompleted {
            synced_count: result.synced(),
            present_count: result.present(),
            failed_count: result.failed(),
            changed: result.changed,
        });

        Ok(result)
    }

    async fn sync_episode(
        &self,
        episode: &mut Episode,
        remote: &mut BTreeSet<String>,
        result: &mut SyncResult,
    ) -> EpisodeOutcome {
        let mut pending = Vec::new();
        for key in episode.episode_id.remote_keys() {
            if self.reconciler.needs_upload(&key, remote).await {
                pending.push(key);
            }
        }

        let episode_id = episode.episode_id.to_string();
        let title = episode.title.clone();

        if pending.is_empty() {
            tracing::debug!(%episode_id, "Episode already remote");
            self.reporter.report(ProgressEvent::EpisodeAlreadyPresent {
                episode_id: episode_id.clone(),
                title: title.clone(),
            });
            return EpisodeOutcome {
                episode_id,
                title,
                state: EpisodeState::RemotePresent,
                error: None,
            };
        }

        match self.acquire_and_upload(episode, &pending, remote, result).await {
            Ok(()) => {
                self.clean_up_local(episode).await;
                tracing::info!(%episode_id, %title, "Synced episode");
                self.reporter.report(ProgressEvent::EpisodeSynced {
                    episode_id: episode_id.clone(),
                    title: title.clone(),
                });
                EpisodeOutcome {
                    episode_id,
                    title,
                    state: EpisodeState::LocalCleaned,
                    error: None,
                }
            }
            Err(e) => {
                tracing::error!(%episode_id, %title, error = %e, "Failed to sync episode");
                self.reporter.report(ProgressEvent::EpisodeFailed {
                    episode_id: episode_id.clone(),
                    title: title.clone(),
                    error: e.to_string(),
                });
                EpisodeOutcome {
                    episode_id,
                    title,
                    state: EpisodeState::Failed,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn acquire_and_upload(
        &self,
        episode: &mut Episode,
        pending: &[String],
        remote: &mut BTreeSet<String>,
        result: &mut SyncResult,
    ) -> Result<(), EpisodeError> {
        let recorded = episode.measurements;
        self.pipeline.acquire_episode(episode).await?;

        // Measurements must be durable before anything referencing them is published
        if episode.measurements != recorded {
            self.catalog.update(episode).await?;
        }
        self.catalog.commit().await?;

        for key in pending {
            self.reconciler.upload(key).await?;
            remote.insert(key.clone());
            result.uploaded.push(key.clone());
            result.changed = true;
        }
        Ok(())
    }

    async fn clean_up_local(&self, episode: &Episode) {
        let id = &episode.episode_id;
        let content = self.pipeline.content();
        for name in [id.audio_filename(), id.output_filename(), id.image_filename()] {
            if let Err(e) = content.remove(&name).await {
                tracing::warn!(episode_id = %id, error = %e, "Cannot remove local file");
            }
        }
    }

    async fn upload_infrastructure(
        &self,
        key: &str,
        remote: &mut BTreeSet<String>,
        result: &mut SyncResult,
    ) -> bool {
        match self.reconciler.upload(key).await {
            Ok(()) => {
                remote.insert(key.to_string());
                result.uploaded.push(key.to_string());
                result.changed = true;
                true
            }
            Err(e) => {
                tracing::error!(%key, error = %e, "Cannot upload infrastructure object");
                false
            }
        }
    }

    async fn publish_feed(
        &self,
        episodes: &[Episode],
        remote: &mut BTreeSet<String>,
        result: &mut SyncResult,
    ) {
        // Only episodes whose files all made it into the bucket are listed
        let published: Vec<Episode> = episodes
            .iter()
            .filter(|episode| {
                episode
                    .episode_id
                    .remote_keys()
                    .iter()
                    .all(|key| remote.contains(key))
            })
            .cloned()
            .collect();

        let document = render(&published, &self.options.podcast_url, &self.options.feed);
        if let Err(e) = self.pipeline.content().write(FEED_KEY, &document).await {
            tracing::error!(error = %e, "Cannot write feed document");
            return;
        }

        if !self.upload_infrastructure(FEED_KEY, remote, result).await {
            return;
        }
        result.feed_published = true;

        let feed_url = object_url(&self.options.podcast_url, FEED_KEY);
        tracing::info!(url = %feed_url, "Published feed");
        self.reporter.report(ProgressEvent::FeedPublished {
            url: feed_url.clone(),
        });

        if let Err(e) = self.notifier.notify(&feed_url).await {
            tracing::warn!(error = %e, "Feed ping failed");
        }
    }
}
