// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use chrono::{DateTime, Utc};
use url::Url;

use super::filename::EpisodeId;
use crate::source::EpisodeMetadata;

/// Attributes computed from the publishable file after acquisition
///
/// Both values are set together, and only once the output file exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Measurements {
    pub size_in_bytes: u64,
    pub duration_in_seconds: u64,
}

/// A single catalog entry
#[derive(Debug, Clone, PartialEq)]
pub struct Episode {
    pub episode_id: EpisodeId,
    pub url: Url,
    pub title: String,
    pub description: Option<String>,
    pub image_url: Url,
    pub published_at: DateTime<Utc>,
    /// `None` until the episode has been acquired and measured
    pub measurements: Option<Measurements>,
}

impl Episode {
    /// Build a not-yet-acquired episode from freshly fetched metadata
    pub fn from_metadata(episode_id: EpisodeId, url: Url, metadata: EpisodeMetadata) -> Self {
        Self {
            episode_id,
            url,
            title: metadata.title,
            description: metadata.description,
            image_url: metadata.image_url,
            published_at: metadata.published_at,
            measurements: None,
        }
    }

    pub fn is_measured(&self) -> bool {
        self.measurements.is_some()
    }
}
