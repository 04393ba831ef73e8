// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt;

use url::Url;

/// Remote key of the feed document
pub const FEED_KEY: &str = "podcast.xml";

/// Remote key of the podcast logo
pub const LOGO_KEY: &str = "logo.png";

/// Keys that always exist in the bucket and belong to no episode
pub const INFRASTRUCTURE_KEYS: [&str; 2] = [FEED_KEY, LOGO_KEY];

/// Stable identifier of an episode, derived from its source URL
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EpisodeId(String);

impl EpisodeId {
    /// Derive the id from the last non-empty path segment of the URL
    ///
    /// Returns `None` if nothing usable is left after sanitizing.
    pub fn from_url(url: &Url) -> Option<Self> {
        let segment = url
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).next_back())?;

        let sanitized = sanitize_segment(segment);
        if sanitized.is_empty() {
            None
        } else {
            Some(Self(sanitized))
        }
    }

    /// Wrap an id that was read back from the catalog
    pub(crate) fn from_stored(id: String) -> Self {
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Raw audio as fetched from the source
    pub fn audio_filename(&self) -> String {
        format!("{}.m4a", self.0)
    }

    /// Publishable audio
    pub fn output_filename(&self) -> String {
        format!("{}.mp3", self.0)
    }

    /// Episode cover image
    pub fn image_filename(&self) -> String {
        format!("{}.jpg", self.0)
    }

    /// The two remote keys this episode contributes to the bucket
    pub fn remote_keys(&self) -> [String; 2] {
        [self.output_filename(), self.image_filename()]
    }
}

impl fmt::Display for EpisodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Determine the MIME type of a key by its extension
///
/// Only the handful of file types the mirror publishes are known.
pub fn content_type(key: &str) -> Option<&'static str> {
    let (_, ext) = key.rsplit_once('.')?;

    match ext.to_ascii_lowercase().as_str() {
        "xml" => Some("application/rss+xml"),
        "mp3" => Some("audio/mpeg"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        _ => None,
    }
}

/// Check if a character may appear in an episode id (whitelist approach)
fn is_valid_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_')
}

/// Replace anything outside the whitelist with dashes, collapse runs, trim the ends
fn sanitize_segment(segment: &str) -> String {
    let mut result = String::with_capacity(segment.len());
    let mut last_was_dash = false;

    for c in segment.chars() {
        if is_valid_id_char(c) && c != '-' {
            result.push(c);
            last_was_dash = false;
        } else if !last_was_dash {
            result.push('-');
            last_was_dash = true;
        }
    }

    result.trim_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id_for(url: &str) -> Option<EpisodeId> {
        EpisodeId::from_url(&Url::parse(url).unwrap())
    }

    #[test]
    fn id_is_last_path_segment() {
        let id = id_for("https://www.bbc.co.uk/sounds/play/m001xyz1").unwrap();
        assert_eq!(id.as_str(), "m001xyz1");
    }

    #[test]
    fn id_ignores_trailing_slash_and_query() {
        let id = id_for("https://www.bbc.co.uk/sounds/play/m001xyz1/?from=home").unwrap();
        assert_eq!(id.as_str(), "m001xyz1");
    }

    #[test]
    fn id_is_stable_across_derivations() {
        let url = "https://example.com/play/p0abc";
        assert_eq!(id_for(url), id_for(url));
        assert_eq!(
            id_for(url).unwrap().output_filename(),
            id_for(url).unwrap().output_filename()
        );
    }

    #[test]
    fn id_replaces_unsafe_characters() {
        let id = id_for("https://example.com/play/a%20b..c").unwrap();
        assert_eq!(id.as_str(), "a-20b-c");
    }

    #[test]
    fn url_without_path_has_no_id() {
        assert!(id_for("https://example.com/").is_none());
        assert!(id_for("https://example.com/.../").is_none());
    }

    #[test]
    fn filenames_derive_from_id() {
        let id = id_for("https://example.com/play/m1").unwrap();
        assert_eq!(id.audio_filename(), "m1.m4a");
        assert_eq!(id.output_filename(), "m1.mp3");
        assert_eq!(id.image_filename(), "m1.jpg");
        assert_eq!(id.remote_keys(), ["m1.mp3".to_string(), "m1.jpg".to_string()]);
    }

    #[test]
    fn content_types_for_published_files() {
        assert_eq!(content_type(FEED_KEY), Some("application/rss+xml"));
        assert_eq!(content_type(LOGO_KEY), Some("image/png"));
        assert_eq!(content_type("m1.mp3"), Some("audio/mpeg"));
        assert_eq!(content_type("m1.JPG"), Some("image/jpeg"));
    }

    #[test]
    fn unknown_extensions_have_no_content_type() {
        assert_eq!(content_type("m1.m4a"), None);
        assert_eq!(content_type("README"), None);
    }

    #[test]
    fn sanitize_collapses_separators() {
        assert_eq!(sanitize_segment("a--b__c"), "a-b__c");
        assert_eq!(sanitize_segment("::a::"), "a");
        assert_eq!(sanitize_segment("Café"), "Caf");
    }
}
