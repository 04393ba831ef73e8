// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use url::Url;

use super::{EpisodeMetadata, MetadataSource};
use crate::error::SourceError;
use crate::http::HttpClient;

const PRELOADED_STATE_MARKER: &str = "window.__PRELOADED_STATE__";
const IMAGE_RECIPE: &str = "1600x1600";

#[derive(Debug, Deserialize)]
struct PreloadedState {
    programmes: Programmes,
}

#[derive(Debug, Deserialize)]
struct Programmes {
    current: Programme,
}

#[derive(Debug, Deserialize)]
struct Programme {
    titles: Titles,
    synopses: Synopses,
    image_url: String,
    availability: Availability,
}

#[derive(Debug, Deserialize)]
struct Titles {
    primary: String,
    secondary: Option<String>,
    tertiary: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Synopses {
    short: Option<String>,
    medium: Option<String>,
    long: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Availability {
    from: String,
}

/// Episode source backed by a URL list file and the public episode pages
///
/// The list file holds one episode page URL per line, newest first. Blank
/// lines and lines starting with `#` are ignored.
pub struct SoundsSource<C> {
    client: C,
    list_path: PathBuf,
}

impl<C: HttpClient> SoundsSource<C> {
    pub fn new(client: C, list_path: &Path) -> Self {
        Self {
            client,
            list_path: list_path.to_path_buf(),
        }
    }
}

#[async_trait]
impl<C: HttpClient> MetadataSource for SoundsSource<C> {
    async fn list_episode_urls(&self, max_episodes: usize) -> Result<Vec<Url>, SourceError> {
        let content = tokio::fs::read_to_string(&self.list_path)
            .await
            .map_err(|e| SourceError::ListReadFailed {
                path: self.list_path.clone(),
                source: e,
            })?;

        let mut urls = Vec::new();
        for line in content.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if urls.len() >= max_episodes {
                break;
            }

            match Url::parse(line) {
                Ok(url) => urls.push(url),
                Err(e) => {
                    let error = SourceError::InvalidUrl {
                        line: line.to_string(),
                        source: e,
                    };
                    tracing::warn!(%error, "Skipping episode list entry");
                }
            }
        }

        tracing::debug!(count = urls.len(), path = %self.list_path.display(), "Read episode list");
        Ok(urls)
    }

    async fn fetch_metadata(&self, url: &Url) -> Result<EpisodeMetadata, SourceError> {
        let page = self
            .client
            .get_stream(url.as_str())
            .await
            .map_err(|e| SourceError::FetchFailed {
                url: url.to_string(),
                source: e,
            })?;

        if page.status >= 400 {
            return Err(SourceError::HttpStatus {
                url: url.to_string(),
                status: page.status,
            });
        }

        let body = crate::http::collect_body(page.body)
            .await
            .map_err(|e| SourceError::FetchFailed {
                url: url.to_string(),
                source: e,
            })?;

        let html = String::from_utf8_lossy(&body);
        parse_preloaded_state(&html).map_err(|reason| SourceError::MetadataUnavailable {
            url: url.to_string(),
            reason,
        })
    }
}

/// Extract episode metadata from the state object embedded in an episode page
pub fn parse_preloaded_state(html: &str) -> Result<EpisodeMetadata, String> {
    let start = html
        .find(PRELOADED_STATE_MARKER)
        .ok_or_else(|| "page has no preloaded state".to_string())?;
    let rest = &html[start + PRELOADED_STATE_MARKER.len()..];
    let json_start = rest
        .find('{')
        .ok_or_else(|| "preloaded state is not an object".to_string())?;

    // The object is followed by `;</script>`; only read the first JSON value
    let state: PreloadedState = serde_json::Deserializer::from_str(&rest[json_start..])
        .into_iter::<PreloadedState>()
        .next()
        .ok_or_else(|| "preloaded state is empty".to_string())?
        .map_err(|e| format!("unexpected preloaded state structure: {e}"))?;

    let programme = state.programmes.current;

    let mut title = programme.titles.primary;
    for part in [programme.titles.secondary, programme.titles.tertiary]
        .into_iter()
        .flatten()
    {
        title.push_str(" - ");
        title.push_str(&part);
    }

    let description = programme
        .synopses
        .long
        .or(programme.synopses.medium)
        .or(programme.synopses.short);

    if description.is_none() {
        tracing::warn!(%title, "Did not find a description");
    }

    let image_url = Url::parse(&programme.image_url.replace("{recipe}", IMAGE_RECIPE))
        .map_err(|e| format!("invalid image url: {e}"))?;

    let published_at = DateTime::parse_from_rfc3339(&programme.availability.from)
        .map_err(|e| format!("invalid availability date: {e}"))?
        .with_timezone(&Utc);

    Ok(EpisodeMetadata {
        title,
        description,
        image_url,
        published_at,
    })
}
