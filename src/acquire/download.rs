// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use url::Url;

use super::MediaFetcher;
use crate::error::DownloadError;
use crate::http::HttpClient;

/// Fetches images over HTTP and extracts streaming audio with yt-dlp
pub struct MediaDownloader<C> {
    client: C,
    extractor: PathBuf,
    timeout: Duration,
}

impl<C: HttpClient> MediaDownloader<C> {
    /// `extractor` is the yt-dlp executable; `timeout` bounds one extraction
    pub fn new(client: C, extractor: &Path, timeout: Duration) -> Self {
        Self {
            client,
            extractor: extractor.to_path_buf(),
            timeout,
        }
    }
}

#[async_trait]
impl<C: HttpClient> MediaFetcher for MediaDownloader<C> {
    async fn fetch_file(&self, url: &Url, dest: &Path) -> Result<u64, DownloadError> {
        stream_to_file(&self.client, url.as_str(), dest).await
    }

    async fn fetch_streaming_audio(&self, source: &Url, dest: &Path) -> Result<(), DownloadError> {
        let program = self.extractor.display().to_string();

        let mut command = Command::new(&self.extractor);
        command
            .arg("--quiet")
            .arg("--no-progress")
            .arg("--no-part")
            .arg("--format")
            .arg("bestaudio[ext=m4a]")
            .arg("--output")
            .arg(dest)
            .arg(source.as_str())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| DownloadError::TimedOut {
                url: source.to_string(),
                seconds: self.timeout.as_secs(),
            })?
            .map_err(|e| DownloadError::SpawnFailed {
                program: program.clone(),
                source: e,
            })?;

        if !output.status.success() {
            return Err(DownloadError::ExtractorFailed {
                program,
                url: source.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        if !dest.is_file() {
            return Err(DownloadError::NothingExtracted {
                program,
                path: dest.to_path_buf(),
            });
        }

        tracing::info!(url = %source, path = %dest.display(), "Extracted streaming audio");
        Ok(())
    }
}

/// Stream a URL's body to `output_path`
///
/// Returns the number of bytes written.
pub async fn stream_to_file<C: HttpClient>(
    client: &C,
    url: &str,
    output_path: &Path,
) -> Result<u64, DownloadError> {
    let response = client
        .get_stream(url)
        .await
        .map_err(|e| DownloadError::HttpFailed {
            url: url.to_string(),
            source: e,
        })?;

    if response.status >= 400 {
        return Err(DownloadError::HttpStatus {
            url: url.to_string(),
            status: response.status,
        });
    }

    let mut file =
        File::create(output_path)
            .await
            .map_err(|e| DownloadError::FileCreateFailed {
                path: output_path.to_path_buf(),
                source: e,
            })?;

    let mut bytes_downloaded: u64 = 0;
    let mut stream = response.body;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| DownloadError::StreamFailed {
            url: url.to_string(),
            source: e,
        })?;

        file.write_all(&chunk)
            .await
            .map_err(|e| DownloadError::FileWriteFailed {
                path: output_path.to_path_buf(),
                source: e,
            })?;

        bytes_downloaded += chunk.len() as u64;
    }

    file.sync_all()
        .await
        .map_err(|e| DownloadError::FileWriteFailed {
            path: output_path.to_path_buf(),
            source: e,
        })?;

    tracing::info!(%url, path = %output_path.display(), bytes = bytes_downloaded, "Downloaded file");
    Ok(bytes_downloaded)
}
