// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Podcast feed document for the published episodes

use rss::extension::itunes::{
    ITunesCategoryBuilder, ITunesChannelExtensionBuilder, ITunesItemExtensionBuilder,
    ITunesOwnerBuilder,
};
use rss::{ChannelBuilder, EnclosureBuilder, GuidBuilder, Item, ItemBuilder};

use crate::episode::{Episode, FEED_KEY, LOGO_KEY};

/// Channel level information of the feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedInfo {
    pub title: String,
    pub description: String,
    pub author: String,
    pub language: String,
    pub owner_name: String,
    pub owner_email: String,
    pub categories: Vec<String>,
}

impl Default for FeedInfo {
    fn default() -> Self {
        Self {
            title: "BBC Sounds Subscriptions".to_string(),
            description: "Episodes of shows I have subscribed to on BBC Sounds".to_string(),
            author: "BBC Sounds".to_string(),
            language: "en".to_string(),
            owner_name: "BBC".to_string(),
            owner_email: "RadioMusic.Support@bbc.co.uk".to_string(),
            categories: ["Arts", "Comedy", "Music", "News", "Sports"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
        }
    }
}

/// URL of `key` below the published base URL
pub fn object_url(base_url: &str, key: &str) -> String {
    format!("{}/{key}", base_url.trim_end_matches('/'))
}

/// Render the feed document
///
/// Only measured episodes are listed, in the given order. The output depends
/// on nothing but the arguments.
pub fn render(episodes: &[Episode], base_url: &str, info: &FeedInfo) -> Vec<u8> {
    let logo_url = object_url(base_url, LOGO_KEY);

    let published: Vec<&Episode> = episodes.iter().filter(|e| e.is_measured()).collect();
    let publication_date = published
        .iter()
        .map(|e| e.published_at)
        .max()
        .map(|date| date.to_rfc2822());

    let categories = info
        .categories
        .iter()
        .map(|text| ITunesCategoryBuilder::default().text(text.as_str()).build())
        .collect::<Vec<_>>();

    let owner = ITunesOwnerBuilder::default()
        .name(Some(info.owner_name.clone()))
        .email(Some(info.owner_email.clone()))
        .build();

    let itunes = ITunesChannelExtensionBuilder::default()
        .author(Some(info.author.clone()))
        .block(Some("Yes".to_string()))
        .categories(categories)
        .explicit(Some("no".to_string()))
        .image(Some(logo_url.clone()))
        .owner(Some(owner))
        .build();

    let image = rss::ImageBuilder::default()
        .url(logo_url)
        .title(info.title.as_str())
        .link(object_url(base_url, FEED_KEY))
        .build();

    let items: Vec<Item> = published
        .iter()
        .map(|episode| render_item(episode, base_url, &info.author))
        .collect();

    let channel = ChannelBuilder::default()
        .title(info.title.as_str())
        .link(object_url(base_url, FEED_KEY))
        .description(info.description.as_str())
        .language(Some(info.language.clone()))
        .generator(Some(format!("podmirror {}", env!("CARGO_PKG_VERSION"))))
        .pub_date(publication_date.clone())
        .last_build_date(publication_date)
        .image(Some(image))
        .itunes_ext(Some(itunes))
        .items(items)
        .build();

    channel.to_string().into_bytes()
}

fn render_item(episode: &Episode, base_url: &str, author: &str) -> Item {
    let id = &episode.episode_id;
    let audio_url = object_url(base_url, &id.output_filename());
    let (length, duration) = episode
        .measurements
        .map(|m| (m.size_in_bytes, m.duration_in_seconds))
        .unwrap_or_default();

    let enclosure = EnclosureBuilder::default()
        .url(audio_url.as_str())
        .length(length.to_string())
        .mime_type("audio/mpeg")
        .build();

    let guid = GuidBuilder::default()
        .value(audio_url.as_str())
        .permalink(false)
        .build();

    let itunes = ITunesItemExtensionBuilder::default()
        .author(Some(author.to_string()))
        .duration(Some(duration.to_string()))
        .image(Some(object_url(base_url, &id.image_filename())))
        .build();

    ItemBuilder::default()
        .title(Some(episode.title.clone()))
        .link(Some(episode.url.to_string()))
        .description(episode.description.clone())
        .enclosure(Some(enclosure))
        .guid(Some(guid))
        .pub_date(Some(episode.published_at.to_rfc2822()))
        .itunes_ext(Some(itunes))
        .build()
}
