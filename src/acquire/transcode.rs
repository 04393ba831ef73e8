// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::Transcoder;
use crate::error::TranscodeError;

/// Bitrate of the published MP3 files
pub const OUTPUT_BITRATE: &str = "128k";

/// Transcodes with ffmpeg and measures with ffprobe
pub struct FfmpegTranscoder {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    timeout: Duration,
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg: &Path, ffprobe: &Path, timeout: Duration) -> Self {
        Self {
            ffmpeg: ffmpeg.to_path_buf(),
            ffprobe: ffprobe.to_path_buf(),
            timeout,
        }
    }

    async fn run(
        &self,
        program: &Path,
        mut command: Command,
        path: &Path,
    ) -> Result<Output, TranscodeError> {
        let name = program.display().to_string();
        command.kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| TranscodeError::TimedOut {
                program: name.clone(),
                seconds: self.timeout.as_secs(),
            })?
            .map_err(|e| TranscodeError::SpawnFailed {
                program: name.clone(),
                source: e,
            })?;

        if !output.status.success() {
            return Err(TranscodeError::Failed {
                program: name,
                path: path.to_path_buf(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(output)
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(
        &self,
        src: &Path,
        dest: &Path,
        cover: &Path,
        title: &str,
    ) -> Result<(), TranscodeError> {
        let mut command = Command::new(&self.ffmpeg);
        command
            .args(["-nostdin", "-loglevel", "error", "-y", "-i"])
            .arg(src)
            .arg("-i")
            .arg(cover)
            .args(["-map", "0:a", "-map", "1:v"])
            .args(["-c:a", "libmp3lame", "-b:a", OUTPUT_BITRATE])
            .args(["-c:v", "copy", "-disposition:v", "attached_pic"])
            .args(["-id3v2_version", "3", "-metadata"])
            .arg(format!("title={title}"))
            .args(["-metadata:s:v", "title=Album cover"])
            .args(["-metadata:s:v", "comment=Cover (front)"])
            // No Xing header: some players read it as VBR and misreport duration
            .args(["-write_xing", "0", "-f", "mp3"])
            .arg(dest);

        self.run(&self.ffmpeg, command, src).await?;

        tracing::info!(
            src = %src.display(),
            dest = %dest.display(),
            "Converted to {OUTPUT_BITRATE} CBR MP3"
        );
        Ok(())
    }

    async fn duration_in_seconds(&self, path: &Path) -> Result<u64, TranscodeError> {
        let mut command = Command::new(&self.ffprobe);
        command
            .args(["-v", "error", "-show_entries", "format=duration"])
            .args(["-of", "default=noprint_wrappers=1:nokey=1"])
            .arg(path);

        let output = self.run(&self.ffprobe, command, path).await?;
        parse_probe_duration(&String::from_utf8_lossy(&output.stdout)).ok_or_else(|| {
            TranscodeError::MissingDuration {
                path: path.to_path_buf(),
            }
        })
    }
}

/// Whole seconds, rounded up, from ffprobe's duration output
fn parse_probe_duration(stdout: &str) -> Option<u64> {
    let seconds: f64 = stdout.lines().next()?.trim().parse().ok()?;
    if seconds.is_finite() && seconds >= 0.0 {
        Some(seconds.ceil() as u64)
    } else {
        None
    }
}
