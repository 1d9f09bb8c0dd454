//! Polling pipeline: fetch every backend source, reconcile into a snapshot, publish.
//!
//! One cycle fans out five GETs (stats, agents, tasks, pipelines, logs), waits for all of
//! them to settle, and merges the outcomes into the previous [`Snapshot`]. A failing
//! source never takes the others down with it: its last good data is carried forward and
//! marked stale.

pub mod fetcher;
pub mod http;
pub mod reconcile;
pub mod scheduler;

pub use fetcher::{CycleResults, Fetcher};
pub use http::HttpBackend;
pub use reconcile::{reconcile, Freshness, Snapshot};
pub use scheduler::{PollState, Poller};

use serde::Serialize;
use std::fmt;
use std::future::Future;

/// The five read endpoints the dashboard consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Stats,
    Agents,
    Tasks,
    Pipelines,
    Logs,
}

impl Source {
    pub const ALL: [Source; 5] = [
        Source::Stats,
        Source::Agents,
        Source::Tasks,
        Source::Pipelines,
        Source::Logs,
    ];

    /// Path relative to the backend base address
    pub fn path(self) -> &'static str {
        match self {
            Source::Stats => "stats",
            Source::Agents => "agents",
            Source::Tasks => "tasks",
            Source::Pipelines => "pipelines",
            Source::Logs => "logs",
        }
    }

    /// Section title used by the UI
    pub fn display_name(self) -> &'static str {
        match self {
            Source::Stats => "Fleet",
            Source::Agents => "Agents",
            Source::Tasks => "Tasks",
            Source::Pipelines => "Pipelines",
            Source::Logs => "Logs",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Why a single source failed this cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FetchError {
    /// No response at all: connect failure, timeout, reset.
    #[error("network failure: {0}")]
    Network(String),

    /// The backend answered with a non-2xx status.
    #[error("http status {status}")]
    Http { status: u16 },

    /// The body did not parse into the expected shape or broke an invariant.
    #[error("schema error: {0}")]
    Schema(String),
}

/// Transport seam between the fetcher and whatever serves the five endpoints.
///
/// Implementations return the raw response body; decoding and validation happen in the
/// [`Fetcher`] so every transport reports schema problems the same way.
pub trait Backend: Send + Sync + 'static {
    fn get(&self, source: Source) -> impl Future<Output = Result<Vec<u8>, FetchError>> + Send;
}
