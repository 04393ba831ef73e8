// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::Arc;

/// Events emitted during a sync run for progress reporting
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Leftover partial files were removed when the content store was opened
    PartialFilesCleanedUp { count: usize },

    /// The catalog was refreshed from the source
    CatalogRefreshed {
        listed: usize,
        added: usize,
        failed: usize,
    },

    /// The remote listing was taken
    RemoteListed { bucket: String, keys: usize },

    /// The published window is known
    EpisodesPlanned {
        total: usize,
        to_upload: usize,
        to_delete: usize,
    },

    /// Work on an episode is starting
    EpisodeStarting {
        /// Position in the published window
        index: usize,
        total: usize,
        episode_id: String,
        title: String,
    },

    /// Both published files were already remote
    EpisodeAlreadyPresent { episode_id: String, title: String },

    /// The episode was acquired, uploaded and cleaned up locally
    EpisodeSynced { episode_id: String, title: String },

    /// The episode failed for this run
    EpisodeFailed {
        episode_id: String,
        title: String,
        error: String,
    },

    /// Remote objects outside the published window were deleted
    OrphansDeleted { count: usize },

    /// The feed document was uploaded
    FeedPublished { url: String },

    /// Sync run completed
    SyncCompleted {
        synced_count: usize,
        present_count: usize,
        failed_count: usize,
        changed: bool,
    },
}

/// Trait for reporting progress events during synchronization.
///
/// Implementations can use this to display progress bars, log messages,
/// or collect statistics.
pub trait ProgressReporter: Send + Sync {
    /// Report a progress event
    fn report(&self, event: ProgressEvent);
}

/// A shared reference to a progress reporter
pub type SharedProgressReporter = Arc<dyn ProgressReporter>;

/// A no-op progress reporter that silently ignores all events.
/// Useful for tests or quiet mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _event: ProgressEvent) {}
}

impl NoopReporter {
    /// Create a new NoopReporter wrapped in an Arc
    pub fn shared() -> SharedProgressReporter {
        Arc::new(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_reporter_handles_all_events() {
        let reporter = NoopReporter::shared();

        reporter.report(ProgressEvent::PartialFilesCleanedUp { count: 2 });
        reporter.report(ProgressEvent::CatalogRefreshed {
            listed: 20,
            added: 1,
            failed: 0,
        });
        reporter.report(ProgressEvent::RemoteListed {
            bucket: "mirror".to_string(),
            keys: 42,
        });
        reporter.report(ProgressEvent::EpisodeStarting {
            index: 0,
            total: 20,
            episode_id: "m0001".to_string(),
            title: "Episode 1".to_string(),
        });
        reporter.report(ProgressEvent::EpisodeFailed {
            episode_id: "m0001".to_string(),
            title: "Episode 1".to_string(),
            error: "Connection timeout".to_string(),
        });
        reporter.report(ProgressEvent::SyncCompleted {
            synced_count: 0,
            present_count: 19,
            failed_count: 1,
            changed: false,
        });
    }
}
