// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Brings one episode from "metadata known" to "locally playable and measured"
//!
//! Every step checks whether its final file already exists before doing any
//! work, so re-running on a partially acquired episode only performs the
//! remaining steps. Downloads and transcodes land on the `.partial` path of
//! their target and are renamed into place only on success.

mod download;
mod transcode;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use crate::content::ContentStore;
use crate::episode::{Episode, Measurements};
use crate::error::{AcquireError, DownloadError, TranscodeError};

pub use download::{MediaDownloader, stream_to_file};
pub use transcode::{FfmpegTranscoder, OUTPUT_BITRATE};

/// Fetches remote media to local paths
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Plain file download; returns the number of bytes written
    async fn fetch_file(&self, url: &Url, dest: &Path) -> Result<u64, DownloadError>;

    /// Extract the audio behind a streaming page
    async fn fetch_streaming_audio(&self, source: &Url, dest: &Path) -> Result<(), DownloadError>;
}

/// Converts raw audio into the published format
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Must leave nothing usable at `dest` when it fails
    async fn transcode(
        &self,
        src: &Path,
        dest: &Path,
        cover: &Path,
        title: &str,
    ) -> Result<(), TranscodeError>;

    /// Duration of an audio file in whole seconds
    async fn duration_in_seconds(&self, path: &Path) -> Result<u64, TranscodeError>;
}

/// Outcome of a single acquisition step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// The target already existed; nothing was done
    AlreadyDone,
    /// The work was performed in this call
    Performed,
}

pub struct AcquisitionPipeline {
    fetcher: Arc<dyn MediaFetcher>,
    transcoder: Arc<dyn Transcoder>,
    content: ContentStore,
}

impl AcquisitionPipeline {
    pub fn new(
        fetcher: Arc<dyn MediaFetcher>,
        transcoder: Arc<dyn Transcoder>,
        content: ContentStore,
    ) -> Self {
        Self {
            fetcher,
            transcoder,
            content,
        }
    }

    pub fn content(&self) -> &ContentStore {
        &self.content
    }

    pub async fn acquire_image(&self, episode: &Episode) -> Result<Step, AcquireError> {
        let name = episode.episode_id.image_filename();
        if self.content.exists(&name) {
            tracing::debug!(episode_id = %episode.episode_id, "Image already present");
            return Ok(Step::AlreadyDone);
        }

        let partial = self.content.partial_path(&name);
        if let Err(e) = self.fetcher.fetch_file(&episode.image_url, &partial).await {
            self.content.discard_partial(&name).await;
            return Err(e.into());
        }
        self.content.promote(&name).await?;

        tracing::info!(episode_id = %episode.episode_id, "Downloaded image");
        Ok(Step::Performed)
    }

    pub async fn acquire_audio(&self, episode: &Episode) -> Result<Step, AcquireError> {
        let name = episode.episode_id.audio_filename();
        if self.content.exists(&name) {
            tracing::debug!(episode_id = %episode.episode_id, "Raw audio already present");
            return Ok(Step::AlreadyDone);
        }
        // Raw audio only feeds the transcoder
        if self.content.exists(&episode.episode_id.output_filename()) {
            tracing::debug!(episode_id = %episode.episode_id, "Output present, raw audio not needed");
            return Ok(Step::AlreadyDone);
        }

        let partial = self.content.partial_path(&name);
        if let Err(e) = self
            .fetcher
            .fetch_streaming_audio(&episode.url, &partial)
            .await
        {
            self.content.discard_partial(&name).await;
            return Err(e.into());
        }
        self.content.promote(&name).await?;

        tracing::info!(episode_id = %episode.episode_id, "Downloaded raw audio");
        Ok(Step::Performed)
    }

    /// Convert the raw audio, embedding the title and the cover image
    ///
    /// The output is written to the partial path and renamed into place only
    /// after the transcoder succeeds.
    pub async fn transcode(&self, episode: &Episode) -> Result<Step, AcquireError> {
        let id = &episode.episode_id;
        let name = id.output_filename();
        if self.content.exists(&name) {
            tracing::debug!(episode_id = %id, "Output already present");
            return Ok(Step::AlreadyDone);
        }

        for input in [id.audio_filename(), id.image_filename()] {
            if !self.content.exists(&input) {
                return Err(AcquireError::MissingInput {
                    episode_id: id.to_string(),
                    path: self.content.path(&input),
                });
            }
        }

        let partial = self.content.partial_path(&name);
        let result = self
            .transcoder
            .transcode(
                &self.content.path(&id.audio_filename()),
                &partial,
                &self.content.path(&id.image_filename()),
                &episode.title,
            )
            .await;

        if let Err(e) = result {
            self.content.discard_partial(&name).await;
            return Err(e.into());
        }
        self.content.promote(&name).await?;

        tracing::info!(episode_id = %id, "Transcoded episode");
        Ok(Step::Performed)
    }

    /// Fill in size and duration from the output file
    ///
    /// Measured episodes are left alone.
    pub async fn measure(&self, episode: &mut Episode) -> Result<Step, AcquireError> {
        if episode.is_measured() {
            return Ok(Step::AlreadyDone);
        }

        let name = episode.episode_id.output_filename();
        let size_in_bytes = self.content.size(&name).await?;
        let duration_in_seconds = self
            .transcoder
            .duration_in_seconds(&self.content.path(&name))
            .await?;

        episode.measurements = Some(Measurements {
            size_in_bytes,
            duration_in_seconds,
        });

        tracing::info!(
            episode_id = %episode.episode_id,
            size_in_bytes,
            duration_in_seconds,
            "Measured episode"
        );
        Ok(Step::Performed)
    }

    /// Run every step in order; returns whether any of them did work
    ///
    /// A fresh transcode invalidates earlier measurements, so the new output
    /// is always measured.
    pub async fn acquire_episode(&self, episode: &mut Episode) -> Result<bool, AcquireError> {
        let image = self.acquire_image(episode).await?;
        let audio = self.acquire_audio(episode).await?;
        let transcoded = self.transcode(episode).await?;
        if transcoded == Step::Performed {
            episode.measurements = None;
        }
        let measured = self.measure(episode).await?;

        Ok([image, audio, transcoded, measured].contains(&Step::Performed))
    }
}
