//! One fan-out/join-all round against the five backend sources.

use crate::model::{Agent, FleetStats, LogEntry, PipelineView, Task};
use crate::poll::{Backend, FetchError, Source};
use serde::de::DeserializeOwned;

/// Per-source outcome of a single cycle. Each field settles independently.
#[derive(Debug, Clone)]
pub struct CycleResults {
    pub stats: Result<FleetStats, FetchError>,
    pub agents: Result<Vec<Agent>, FetchError>,
    pub tasks: Result<Vec<Task>, FetchError>,
    pub pipelines: Result<PipelineView, FetchError>,
    pub logs: Result<Vec<LogEntry>, FetchError>,
}

impl CycleResults {
    /// The error for a source, if it failed this cycle
    pub fn error(&self, source: Source) -> Option<&FetchError> {
        match source {
            Source::Stats => self.stats.as_ref().err(),
            Source::Agents => self.agents.as_ref().err(),
            Source::Tasks => self.tasks.as_ref().err(),
            Source::Pipelines => self.pipelines.as_ref().err(),
            Source::Logs => self.logs.as_ref().err(),
        }
    }

    pub fn failed_sources(&self) -> Vec<Source> {
        Source::ALL
            .into_iter()
            .filter(|s| self.error(*s).is_some())
            .collect()
    }
}

/// Issues the five requests of a cycle. Holds no state between cycles.
pub struct Fetcher<B> {
    backend: B,
}

impl<B: Backend> Fetcher<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Run all five requests concurrently and wait until every one has settled.
    pub async fn fetch_all(&self) -> CycleResults {
        let (stats, agents, tasks, pipelines, logs) = tokio::join!(
            self.fetch::<FleetStats>(Source::Stats),
            self.fetch::<Vec<Agent>>(Source::Agents),
            self.fetch::<Vec<Task>>(Source::Tasks),
            self.fetch::<PipelineView>(Source::Pipelines),
            self.fetch::<Vec<LogEntry>>(Source::Logs),
        );

        CycleResults {
            stats: stats.and_then(|s| s.validate().map(|()| s).map_err(FetchError::Schema)),
            agents,
            tasks,
            pipelines: pipelines.and_then(|p| p.validate().map(|()| p).map_err(FetchError::Schema)),
            logs,
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, source: Source) -> Result<T, FetchError> {
        let body = self.backend.get(source).await?;
        decode(&body)
    }
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, FetchError> {
    serde_json::from_slice(body).map_err(|e| FetchError::Schema(e.to_string()))
}
