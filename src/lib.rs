pub mod acquire;
pub mod bucket;
pub mod catalog;
pub mod content;
pub mod episode;
pub mod error;
pub mod feed;
pub mod http;
pub mod notify;
pub mod progress;
pub mod source;
pub mod sync;

// Re-export main types for convenience
pub use acquire::{AcquisitionPipeline, FfmpegTranscoder, MediaDownloader, MediaFetcher, Transcoder};
pub use bucket::{Bucket, BucketConfig, Reconciler, S3Bucket};
pub use catalog::Catalog;
pub use content::ContentStore;
pub use episode::{Episode, EpisodeId, Measurements};
pub use error::{
    AcquireError, BucketError, CatalogError, ContentError, DownloadError, ListingError,
    ListingFailure, NotifyError, SourceError, SyncError, TranscodeError,
};
pub use feed::FeedInfo;
pub use http::{HttpClient, HttpResponse, ReqwestClient};
pub use notify::{NoopNotifier, Notifier, OvercastPing};
pub use progress::{NoopReporter, ProgressEvent, ProgressReporter, SharedProgressReporter};
pub use source::{EpisodeMetadata, MetadataSource, SoundsSource};
pub use sync::{EpisodeOutcome, EpisodeState, Orchestrator, RefreshResult, SyncOptions, SyncResult};
