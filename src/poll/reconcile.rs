//! Merges one cycle's per-source results into the previous snapshot.

use crate::model::{Agent, FleetStats, LogEntry, PipelineView, Task};
use crate::poll::{CycleResults, FetchError, Source};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Whether a section's data came from this cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    /// No successful fetch yet; the section holds its empty default.
    #[default]
    Never,
    /// Refreshed by the most recent cycle.
    Fresh,
    /// Carried over from an earlier cycle because this one failed.
    Stale,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SourceStatus {
    pub freshness: Freshness,
    /// Wall-clock time of the last successful fetch
    pub last_success: Option<DateTime<Utc>>,
    /// Most recent failure, cleared on success
    pub last_error: Option<FetchError>,
    pub consecutive_failures: u32,
}

impl SourceStatus {
    fn succeeded(at: DateTime<Utc>) -> Self {
        Self {
            freshness: Freshness::Fresh,
            last_success: Some(at),
            last_error: None,
            consecutive_failures: 0,
        }
    }

    fn failed(&self, err: FetchError) -> Self {
        Self {
            freshness: match self.freshness {
                Freshness::Never => Freshness::Never,
                _ => Freshness::Stale,
            },
            last_success: self.last_success,
            last_error: Some(err),
            consecutive_failures: self.consecutive_failures.saturating_add(1),
        }
    }

    pub fn is_fresh(&self) -> bool {
        self.freshness == Freshness::Fresh
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SourceStatuses {
    pub stats: SourceStatus,
    pub agents: SourceStatus,
    pub tasks: SourceStatus,
    pub pipelines: SourceStatus,
    pub logs: SourceStatus,
}

impl SourceStatuses {
    pub fn get(&self, source: Source) -> &SourceStatus {
        match source {
            Source::Stats => &self.stats,
            Source::Agents => &self.agents,
            Source::Tasks => &self.tasks,
            Source::Pipelines => &self.pipelines,
            Source::Logs => &self.logs,
        }
    }
}

/// Everything the dashboard renders, reconciled across sources.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    pub stats: FleetStats,
    pub agents: Vec<Agent>,
    pub tasks: Vec<Task>,
    pub pipelines: PipelineView,
    /// In the order the backend sent them.
    pub logs: Vec<LogEntry>,
    pub sources: SourceStatuses,
    /// Number of cycles applied so far; 0 for the initial empty snapshot.
    pub cycle: u64,
    pub cycle_at: Option<DateTime<Utc>>,
}

impl Snapshot {
    /// The snapshot that exists before the first cycle: zeroed stats, empty sequences.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn status(&self, source: Source) -> &SourceStatus {
        self.sources.get(source)
    }

    pub fn all_stale(&self) -> bool {
        Source::ALL.iter().all(|s| !self.status(*s).is_fresh())
    }
}

/// Produce the next snapshot from the previous one and this cycle's results.
///
/// Each source is applied whole or not at all. A failed source keeps the previous data
/// untouched and records the error.
pub fn reconcile(prev: &Snapshot, results: CycleResults, now: DateTime<Utc>) -> Snapshot {
    let (stats, stats_status) = merge(&prev.stats, &prev.sources.stats, results.stats, now);
    let (agents, agents_status) = merge(&prev.agents, &prev.sources.agents, results.agents, now);
    let (tasks, tasks_status) = merge(&prev.tasks, &prev.sources.tasks, results.tasks, now);
    let (pipelines, pipelines_status) =
        merge(&prev.pipelines, &prev.sources.pipelines, results.pipelines, now);
    let (logs, logs_status) = merge(&prev.logs, &prev.sources.logs, results.logs, now);

    Snapshot {
        stats,
        agents,
        tasks,
        pipelines,
        logs,
        sources: SourceStatuses {
            stats: stats_status,
            agents: agents_status,
            tasks: tasks_status,
            pipelines: pipelines_status,
            logs: logs_status,
        },
        cycle: prev.cycle + 1,
        cycle_at: Some(now),
    }
}

fn merge<T: Clone>(
    prev: &T,
    prev_status: &SourceStatus,
    result: Result<T, FetchError>,
    now: DateTime<Utc>,
) -> (T, SourceStatus) {
    match result {
        Ok(fresh) => (fresh, SourceStatus::succeeded(now)),
        Err(err) => (prev.clone(), prev_status.failed(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AgentStatus, LogLevel};
    use chrono::Duration;

    fn task(id: &str, title: &str) -> Task {
        Task {
            id: id.into(),
            title: title.into(),
            priority: None,
            assignee: None,
            state: Default::default(),
        }
    }

    fn log(message: &str) -> LogEntry {
        LogEntry {
            agent: "scout".into(),
            level: LogLevel::Info,
            message: message.into(),
            timestamp: None,
        }
    }

    fn all_ok(live: u64, label: &str) -> CycleResults {
        CycleResults {
            stats: Ok(FleetStats {
                live_agents: live,
                running_agents: 1,
                ..FleetStats::default()
            }),
            agents: Ok(vec![Agent {
                id: format!("a-{label}"),
                name: label.into(),
                status: AgentStatus::Running,
                role: None,
                current_task: None,
            }]),
            tasks: Ok(vec![task(&format!("t-{label}"), label)]),
            pipelines: Ok(PipelineView {
                running: vec![task(&format!("t-{label}"), label)],
                ..PipelineView::default()
            }),
            logs: Ok(vec![log(label)]),
        }
    }

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn full_success_replaces_everything() {
        let first = reconcile(&Snapshot::empty(), all_ok(5, "one"), t0());
        let now = t0() + Duration::seconds(2);
        let second = reconcile(&first, all_ok(7, "two"), now);

        assert_eq!(second.stats.live_agents, 7);
        assert_eq!(second.agents[0].name, "two");
        assert_eq!(second.tasks[0].title, "two");
        assert_eq!(second.pipelines.running[0].title, "two");
        assert_eq!(second.logs, vec![log("two")]);
        for source in Source::ALL {
            let status = second.status(source);
            assert_eq!(status.freshness, Freshness::Fresh);
            assert_eq!(status.last_success, Some(now));
            assert!(status.last_error.is_none());
        }
        assert_eq!(second.cycle, 2);
        assert_eq!(second.cycle_at, Some(now));
    }

    #[test]
    fn failed_source_keeps_previous_data_and_goes_stale() {
        let first = reconcile(&Snapshot::empty(), all_ok(5, "one"), t0());
        let mut results = all_ok(7, "two");
        results.logs = Err(FetchError::Network("request timed out".into()));
        let now = t0() + Duration::seconds(2);
        let second = reconcile(&first, results, now);

        assert_eq!(second.logs, first.logs);
        let logs = second.status(Source::Logs);
        assert_eq!(logs.freshness, Freshness::Stale);
        assert_eq!(logs.last_success, Some(t0()));
        assert_eq!(logs.consecutive_failures, 1);
        assert!(matches!(logs.last_error, Some(FetchError::Network(_))));

        assert_eq!(second.stats.live_agents, 7);
        assert_eq!(second.agents[0].name, "two");
        assert_eq!(second.pipelines.running[0].title, "two");
        assert!(second.status(Source::Stats).is_fresh());
    }

    #[test]
    fn first_cycle_failure_yields_empty_defaults() {
        let results = CycleResults {
            stats: Err(FetchError::Http { status: 500 }),
            agents: Err(FetchError::Schema("bad".into())),
            tasks: Err(FetchError::Network("refused".into())),
            pipelines: Err(FetchError::Http { status: 404 }),
            logs: Err(FetchError::Network("refused".into())),
        };
        let snap = reconcile(&Snapshot::empty(), results, t0());

        assert_eq!(snap.stats, FleetStats::default());
        assert!(snap.agents.is_empty());
        assert!(snap.tasks.is_empty());
        assert!(snap.pipelines.is_empty());
        assert!(snap.logs.is_empty());
        assert!(snap.all_stale());
        for source in Source::ALL {
            assert_eq!(snap.status(source).freshness, Freshness::Never);
            assert!(snap.status(source).last_error.is_some());
        }
    }

    #[test]
    fn failures_accumulate_and_reset_on_success() {
        let mut snap = reconcile(&Snapshot::empty(), all_ok(5, "one"), t0());
        for i in 1..=3 {
            let mut results = all_ok(5, "x");
            results.agents = Err(FetchError::Http { status: 503 });
            snap = reconcile(&snap, results, t0() + Duration::seconds(2 * i));
        }
        assert_eq!(snap.status(Source::Agents).consecutive_failures, 3);
        assert_eq!(snap.agents[0].name, "one");

        snap = reconcile(&snap, all_ok(5, "back"), t0() + Duration::seconds(10));
        let agents = snap.status(Source::Agents);
        assert_eq!(agents.consecutive_failures, 0);
        assert!(agents.last_error.is_none());
        assert_eq!(snap.agents[0].name, "back");
    }

    #[test]
    fn total_outage_marks_every_section_stale_but_keeps_data() {
        let first = reconcile(&Snapshot::empty(), all_ok(5, "one"), t0());
        fn down<T>() -> Result<T, FetchError> {
            Err(FetchError::Network("refused".into()))
        }
        let results = CycleResults {
            stats: down(),
            agents: down(),
            tasks: down(),
            pipelines: down(),
            logs: down(),
        };
        let second = reconcile(&first, results, t0() + Duration::seconds(2));

        assert!(second.all_stale());
        assert_eq!(second.stats, first.stats);
        assert_eq!(second.pipelines, first.pipelines);
        assert_eq!(second.status(Source::Tasks).freshness, Freshness::Stale);
    }
}
