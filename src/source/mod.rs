// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod sounds;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use url::Url;

use crate::error::SourceError;

pub use sounds::{SoundsSource, parse_preloaded_state};

/// Descriptive metadata of one episode as published by the source site
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeMetadata {
    pub title: String,
    pub description: Option<String>,
    pub image_url: Url,
    pub published_at: DateTime<Utc>,
}

/// Where episodes come from
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Episode page URLs, newest first, at most `max_episodes` of them
    async fn list_episode_urls(&self, max_episodes: usize) -> Result<Vec<Url>, SourceError>;

    /// Fetch the metadata for one episode page
    async fn fetch_metadata(&self, url: &Url) -> Result<EpisodeMetadata, SourceError>;
}
