// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use async_trait::async_trait;
use url::Url;

use crate::error::NotifyError;
use crate::http::HttpClient;

pub const OVERCAST_PING_URL: &str = "https://overcast.fm/ping";

/// Tells a podcast directory that the feed changed
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, feed_url: &str) -> Result<(), NotifyError>;
}

/// Notifier that does nothing, for when pinging is disabled
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _feed_url: &str) -> Result<(), NotifyError> {
        tracing::debug!("Feed ping is not enabled");
        Ok(())
    }
}

/// Pings Overcast with the feed URL prefix
pub struct OvercastPing<C> {
    client: C,
}

impl<C: HttpClient> OvercastPing<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    fn ping_url(&self, feed_url: &str) -> Result<Url, NotifyError> {
        Ok(Url::parse_with_params(
            OVERCAST_PING_URL,
            &[("urlprefix", feed_url)],
        )?)
    }
}

#[async_trait]
impl<C: HttpClient> Notifier for OvercastPing<C> {
    async fn notify(&self, feed_url: &str) -> Result<(), NotifyError> {
        let url = self.ping_url(feed_url)?;
        tracing::debug!(%url, "Pinging Overcast");

        let response = self
            .client
            .get_stream(url.as_str())
            .await
            .map_err(|e| NotifyError::RequestFailed {
                url: url.to_string(),
                source: e,
            })?;

        if response.status != 200 {
            return Err(NotifyError::HttpStatus {
                status: response.status,
            });
        }

        tracing::info!("Successfully pinged Overcast");
        Ok(())
    }
}
