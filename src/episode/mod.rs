mod filename;
mod model;

pub use filename::{EpisodeId, FEED_KEY, INFRASTRUCTURE_KEYS, LOGO_KEY, content_type};
pub use model::{Episode, Measurements};
