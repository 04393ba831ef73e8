// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Boxed error used where a trait seam must stay backend agnostic
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by the episode catalog
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to create catalog directory {path}: {source}")]
    CreateDirectoryFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Catalog database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Episode id '{episode_id}' already belongs to {existing_url}, cannot insert {url}")]
    DuplicateKey {
        episode_id: String,
        existing_url: String,
        url: String,
    },

    #[error("Episode '{episode_id}' is not in the catalog")]
    NotFound { episode_id: String },

    #[error("Catalog record '{episode_id}' is corrupt: {reason}")]
    CorruptRecord { episode_id: String, reason: String },
}

/// Errors raised by the local content store
#[derive(Error, Debug)]
pub enum ContentError {
    #[error("Failed to create content directory {path}: {source}")]
    CreateDirectoryFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read directory {path}: {source}")]
    ReadDirectoryFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to move {from} into place at {to}: {source}")]
    RenameFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove {path}: {source}")]
    RemoveFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not determine content type for file '{0}'")]
    UnknownContentType(String),
}

/// Errors raised by the source metadata provider
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to read episode list {path}: {source}")]
    ListReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid episode URL '{line}': {source}")]
    InvalidUrl {
        line: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Failed to fetch episode page {url}: {source}")]
    FetchFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Metadata unavailable for {url}: {reason}")]
    MetadataUnavailable { url: String, reason: String },
}

/// Errors that can occur while fetching media files
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("HTTP request failed for {url}: {source}")]
    HttpFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Failed to create file {path}: {source}")]
    FileCreateFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write to file {path}: {source}")]
    FileWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Stream error while downloading {url}: {source}")]
    StreamFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to run {program}: {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} failed for {url}: {stderr}")]
    ExtractorFailed {
        program: String,
        url: String,
        stderr: String,
    },

    #[error("{program} produced no file at {path}")]
    NothingExtracted { program: String, path: PathBuf },

    #[error("Timed out after {seconds}s while fetching {url}")]
    TimedOut { url: String, seconds: u64 },
}

/// Errors raised by the transcoder
#[derive(Error, Debug)]
pub enum TranscodeError {
    #[error("Failed to run {program}: {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status} for {path}: {stderr}")]
    Failed {
        program: String,
        path: PathBuf,
        status: String,
        stderr: String,
    },

    #[error("No duration found for audio file {path}")]
    MissingDuration { path: PathBuf },

    #[error("Timed out after {seconds}s while running {program}")]
    TimedOut { program: String, seconds: u64 },
}

/// Errors from acquiring a single episode's assets
#[derive(Error, Debug)]
pub enum AcquireError {
    #[error("Download failed: {0}")]
    Download(#[from] DownloadError),

    #[error("Transcode failed: {0}")]
    Transcode(#[from] TranscodeError),

    #[error("Content store error: {0}")]
    Content(#[from] ContentError),

    #[error("Cannot transcode {episode_id}: missing input {path}")]
    MissingInput { episode_id: String, path: PathBuf },
}

/// Failure of one episode within a run; the run itself carries on
#[derive(Error, Debug)]
pub enum EpisodeError {
    #[error(transparent)]
    Acquire(#[from] AcquireError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Bucket(#[from] BucketError),
}

/// Per-object bucket operation errors; never fatal for a whole run
#[derive(Error, Debug)]
pub enum BucketError {
    #[error("Failed to configure bucket {bucket}: {source}")]
    Config {
        bucket: String,
        #[source]
        source: BoxError,
    },

    #[error("Failed to upload {key}: {source}")]
    UploadFailed {
        key: String,
        #[source]
        source: BoxError,
    },

    #[error("Failed to read attributes of {key}: {source}")]
    HeadFailed {
        key: String,
        #[source]
        source: BoxError,
    },

    #[error("Failed to delete {}: {source}", .keys.join(","))]
    DeleteFailed {
        keys: Vec<String>,
        #[source]
        source: BoxError,
    },

    #[error("Content store error: {0}")]
    Content(#[from] ContentError),
}

/// Why the remote listing could not be taken
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingFailure {
    Unauthenticated,
    PermissionDenied,
    MissingBucket,
    Unknown,
}

impl ListingFailure {
    /// Diagnose a listing failure from the backend's error text
    pub fn diagnose(message: &str) -> Self {
        let message = message.to_ascii_lowercase();

        if message.contains("nosuchbucket") || message.contains("bucket does not exist") {
            ListingFailure::MissingBucket
        } else if message.contains("invalidaccesskeyid")
            || message.contains("signaturedoesnotmatch")
            || message.contains("unauthenticated")
            || message.contains("status: 401")
            || message.contains("401 unauthorized")
        {
            ListingFailure::Unauthenticated
        } else if message.contains("accessdenied")
            || message.contains("permission denied")
            || message.contains("forbidden")
            || message.contains("status: 403")
        {
            ListingFailure::PermissionDenied
        } else {
            ListingFailure::Unknown
        }
    }
}

impl fmt::Display for ListingFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ListingFailure::Unauthenticated => {
                "the credentials were rejected; check the access key id and secret key"
            }
            ListingFailure::PermissionDenied => {
                "the credentials are valid but lack permission to list the bucket"
            }
            ListingFailure::MissingBucket => "the bucket does not exist; check the bucket name",
            ListingFailure::Unknown => "the cause could not be determined",
        };
        f.write_str(text)
    }
}

/// Fatal: the remote listing could not be taken, so nothing can be reconciled
#[derive(Error, Debug)]
#[error("Cannot list bucket {bucket}: {cause}")]
pub struct ListingError {
    pub bucket: String,
    pub cause: ListingFailure,
    #[source]
    pub source: BoxError,
}

/// Errors from the notification ping
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Invalid ping URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Ping request failed for {url}: {source}")]
    RequestFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Ping failed with status code {status}")]
    HttpStatus { status: u16 },
}

/// Top-level errors for a sync run; all of them abort the run
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Content store error: {0}")]
    Content(#[from] ContentError),

    #[error(transparent)]
    Listing(#[from] ListingError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnoses_missing_bucket() {
        let failure = ListingFailure::diagnose(
            "Generic S3 error: Error performing list request: NoSuchBucket: The specified bucket does not exist",
        );
        assert_eq!(failure, ListingFailure::MissingBucket);
    }

    #[test]
    fn diagnoses_bad_credentials() {
        assert_eq!(
            ListingFailure::diagnose("InvalidAccessKeyId: The AWS Access Key Id you provided does not exist"),
            ListingFailure::Unauthenticated
        );
        assert_eq!(
            ListingFailure::diagnose("SignatureDoesNotMatch"),
            ListingFailure::Unauthenticated
        );
    }

    #[test]
    fn diagnoses_permission_denied() {
        assert_eq!(
            ListingFailure::diagnose("AccessDenied: Access Denied"),
            ListingFailure::PermissionDenied
        );
    }

    #[test]
    fn unknown_causes_stay_unknown() {
        assert_eq!(
            ListingFailure::diagnose("connection reset by peer"),
            ListingFailure::Unknown
        );
    }

    #[test]
    fn listing_error_message_names_bucket_and_cause() {
        let err = ListingError {
            bucket: "my-podcast".to_string(),
            cause: ListingFailure::MissingBucket,
            source: "NoSuchBucket".into(),
        };

        let message = err.to_string();
        assert!(message.contains("my-podcast"));
        assert!(message.contains("does not exist"));
    }

    #[test]
    fn delete_error_lists_all_keys() {
        let err = BucketError::DeleteFailed {
            keys: vec!["a.mp3".to_string(), "a.jpg".to_string()],
            source: "boom".into(),
        };
        assert!(err.to_string().contains("a.mp3,a.jpg"));
    }
}
