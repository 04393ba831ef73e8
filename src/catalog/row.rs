// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use chrono::DateTime;
use url::Url;

use crate::episode::{Episode, EpisodeId, Measurements};
use crate::error::CatalogError;

/// Column layout of the `episodes` table
#[derive(Debug, Clone, sqlx::FromRow)]
pub(super) struct EpisodeRow {
    pub episode_id: String,
    pub url: String,
    pub title: String,
    pub description: Option<String>,
    pub image_url: String,
    /// Microseconds since the Unix epoch, UTC
    pub published_at: i64,
    pub size_in_bytes: Option<i64>,
    pub duration_in_seconds: Option<i64>,
}

impl From<&Episode> for EpisodeRow {
    fn from(episode: &Episode) -> Self {
        let (size_in_bytes, duration_in_seconds) = match episode.measurements {
            Some(m) => (
                Some(i64::try_from(m.size_in_bytes).unwrap_or(i64::MAX)),
                Some(i64::try_from(m.duration_in_seconds).unwrap_or(i64::MAX)),
            ),
            None => (None, None),
        };

        Self {
            episode_id: episode.episode_id.to_string(),
            url: episode.url.to_string(),
            title: episode.title.clone(),
            description: episode.description.clone(),
            image_url: episode.image_url.to_string(),
            published_at: episode.published_at.timestamp_micros(),
            size_in_bytes,
            duration_in_seconds,
        }
    }
}

impl TryFrom<EpisodeRow> for Episode {
    type Error = CatalogError;

    fn try_from(row: EpisodeRow) -> Result<Self, Self::Error> {
        let corrupt = |reason: String| CatalogError::CorruptRecord {
            episode_id: row.episode_id.clone(),
            reason,
        };

        let url = Url::parse(&row.url).map_err(|e| corrupt(format!("bad url: {e}")))?;
        let image_url =
            Url::parse(&row.image_url).map_err(|e| corrupt(format!("bad image url: {e}")))?;
        let published_at = DateTime::from_timestamp_micros(row.published_at)
            .ok_or_else(|| corrupt(format!("bad publish time {}", row.published_at)))?;

        // Both computed fields are written together; a half-set pair is not trusted
        let measurements = match (row.size_in_bytes, row.duration_in_seconds) {
            (Some(size), Some(duration)) => Some(Measurements {
                size_in_bytes: u64::try_from(size)
                    .map_err(|_| corrupt(format!("negative size {size}")))?,
                duration_in_seconds: u64::try_from(duration)
                    .map_err(|_| corrupt(format!("negative duration {duration}")))?,
            }),
            _ => None,
        };

        Ok(Episode {
            episode_id: EpisodeId::from_stored(row.episode_id),
            url,
            title: row.title,
            description: row.description,
            image_url,
            published_at,
            measurements,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn make_row() -> EpisodeRow {
        EpisodeRow {
            episode_id: "m1".to_string(),
            url: "https://example.com/play/m1".to_string(),
            title: "Title".to_string(),
            description: None,
            image_url: "https://example.com/m1.jpg".to_string(),
            published_at: 1_705_309_200_000_000,
            size_in_bytes: Some(100),
            duration_in_seconds: Some(60),
        }
    }

    #[test]
    fn row_converts_to_episode() {
        let episode = Episode::try_from(make_row()).unwrap();

        assert_eq!(episode.episode_id.as_str(), "m1");
        assert_eq!(episode.published_at.with_timezone(&Utc).timestamp(), 1_705_309_200);
        assert_eq!(
            episode.measurements,
            Some(Measurements {
                size_in_bytes: 100,
                duration_in_seconds: 60
            })
        );
    }

    #[test]
    fn half_set_measurements_are_ignored() {
        let row = EpisodeRow {
            duration_in_seconds: None,
            ..make_row()
        };
        assert!(Episode::try_from(row).unwrap().measurements.is_none());
    }

    #[test]
    fn bad_url_is_reported_as_corrupt() {
        let row = EpisodeRow {
            url: "not a url".to_string(),
            ..make_row()
        };
        assert!(matches!(
            Episode::try_from(row).unwrap_err(),
            CatalogError::CorruptRecord { .. }
        ));
    }
}
