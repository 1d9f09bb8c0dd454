//! Read-only view over a published snapshot.
//!
//! Everything here is derived from the [`Snapshot`] plus explicit arguments (`now`, the
//! configured capacity), so the render path never holds hidden state.

use crate::model::{Agent, AgentStatus, LogEntry, Task};
use crate::poll::{Freshness, Snapshot, Source};
use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionHealth {
	Live,
	/// Showing data carried over from an earlier cycle.
	Stale { age_secs: i64 },
	NoData,
}

impl SectionHealth {
	pub fn label(self) -> String {
		match self {
			SectionHealth::Live => "live".to_string(),
			SectionHealth::Stale { age_secs } => format!("stale {}", format_age(age_secs)),
			SectionHealth::NoData => "no data".to_string(),
		}
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BucketCounts {
	pub running: usize,
	pub queued: usize,
	pub completed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AgentCounts {
	pub running: usize,
	pub idle: usize,
	pub error: usize,
	pub offline: usize,
	pub unknown: usize,
}

#[derive(Debug, Clone)]
pub struct ViewModel {
	snapshot: Arc<Snapshot>,
	/// Used when the backend does not report capacity.
	fallback_capacity: Option<u64>,
}

impl ViewModel {
	pub fn new(snapshot: Arc<Snapshot>, fallback_capacity: Option<u64>) -> Self {
		Self {
			snapshot,
			fallback_capacity,
		}
	}

	pub fn snapshot(&self) -> &Snapshot {
		&self.snapshot
	}

	/// Backend-reported capacity first, then the configured one. Zero counts as unknown.
	pub fn capacity(&self) -> Option<u64> {
		self.snapshot
			.stats
			.capacity
			.or(self.fallback_capacity)
			.filter(|c| *c > 0)
	}

	/// `live_agents / capacity` as a whole percentage, capped at 100.
	pub fn capacity_percent(&self) -> Option<u16> {
		let capacity = self.capacity()?;
		Some(percent(self.snapshot.stats.live_agents, capacity))
	}

	/// Share of live agents that are currently running.
	pub fn running_percent(&self) -> u16 {
		let stats = &self.snapshot.stats;
		if stats.live_agents == 0 {
			return 0;
		}
		percent(stats.running_agents, stats.live_agents)
	}

	pub fn bucket_counts(&self) -> BucketCounts {
		let p = &self.snapshot.pipelines;
		BucketCounts {
			running: p.running.len(),
			queued: p.queued.len(),
			completed: p.completed.len(),
		}
	}

	/// Titles of the running pipeline tasks, in backend order.
	pub fn active_initiatives(&self) -> Vec<&str> {
		self.snapshot
			.pipelines
			.running
			.iter()
			.map(|t| t.title.as_str())
			.collect()
	}

	/// Queued pipeline tasks, most urgent first; tasks without a priority go last.
	pub fn queued_by_priority(&self) -> Vec<&Task> {
		by_priority(&self.snapshot.pipelines.queued)
	}

	/// The `/tasks` list in the same order as the queue.
	pub fn tasks_by_priority(&self) -> Vec<&Task> {
		by_priority(&self.snapshot.tasks)
	}

	pub fn agent_counts(&self) -> AgentCounts {
		let mut counts = AgentCounts::default();
		for agent in &self.snapshot.agents {
			match agent.status {
				AgentStatus::Running => counts.running += 1,
				AgentStatus::Idle => counts.idle += 1,
				AgentStatus::Error => counts.error += 1,
				AgentStatus::Offline => counts.offline += 1,
				AgentStatus::Unknown => counts.unknown += 1,
			}
		}
		counts
	}

	pub fn agents(&self) -> &[Agent] {
		&self.snapshot.agents
	}

	/// Most recent first. Entries without a timestamp keep their received order and sort
	/// after timestamped ones.
	pub fn recent_logs(&self, limit: usize) -> Vec<&LogEntry> {
		let mut logs: Vec<&LogEntry> = self.snapshot.logs.iter().collect();
		logs.sort_by_key(|e| Reverse(e.timestamp));
		logs.truncate(limit);
		logs
	}

	pub fn section_health(&self, source: Source, now: DateTime<Utc>) -> SectionHealth {
		let status = self.snapshot.status(source);
		match status.freshness {
			Freshness::Fresh => SectionHealth::Live,
			Freshness::Never => SectionHealth::NoData,
			Freshness::Stale => SectionHealth::Stale {
				age_secs: status
					.last_success
					.map(|t| now.signed_duration_since(t).num_seconds().max(0))
					.unwrap_or(0),
			},
		}
	}

	pub fn all_stale(&self) -> bool {
		self.snapshot.all_stale()
	}
}

fn by_priority(tasks: &[Task]) -> Vec<&Task> {
	let mut sorted: Vec<&Task> = tasks.iter().collect();
	sorted.sort_by_key(|t| (t.priority.is_none(), t.priority));
	sorted
}

fn percent(part: u64, whole: u64) -> u16 {
	let pct = (part as f64 / whole as f64 * 100.0).round();
	pct.clamp(0.0, 100.0) as u16
}

/// Shorten a label to `max` characters, ending in `…` when cut.
pub fn truncate_label(label: &str, max: usize) -> String {
	let label = label.replace('\n', " ");
	if label.chars().count() <= max {
		return label;
	}
	if max == 0 {
		return String::new();
	}
	let kept: String = label.chars().take(max - 1).collect();
	format!("{kept}…")
}

pub fn format_age(secs: i64) -> String {
	if secs < 60 {
		format!("{secs}s")
	} else if secs < 3600 {
		format!("{}m", secs / 60)
	} else if secs < 86_400 {
		format!("{}h", secs / 3600)
	} else {
		format!("{}d", secs / 86_400)
	}
}

pub fn format_revenue(revenue: f64) -> String {
	let cents = (revenue * 100.0).round() as u64;
	let dollars = cents / 100;
	let digits = dollars.to_string();
	let mut grouped = String::new();
	for (i, ch) in digits.chars().enumerate() {
		if i > 0 && (digits.len() - i) % 3 == 0 {
			grouped.push(',');
		}
		grouped.push(ch);
	}
	format!("${grouped}.{:02}", cents % 100)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::model::{FleetStats, LogLevel, PipelineView};
	use crate::poll::{reconcile, CycleResults, FetchError};
	use chrono::Duration;

	fn task(id: &str, title: &str, priority: Option<i64>) -> Task {
		Task {
			id: id.into(),
			title: title.into(),
			priority,
			assignee: None,
			state: Default::default(),
		}
	}

	fn entry(message: &str, ts: Option<i64>) -> LogEntry {
		LogEntry {
			agent: "scout".into(),
			level: LogLevel::Info,
			message: message.into(),
			timestamp: ts.map(|s| DateTime::from_timestamp(s, 0).unwrap()),
		}
	}

	fn view(snapshot: Snapshot) -> ViewModel {
		ViewModel::new(Arc::new(snapshot), None)
	}

	#[test]
	fn reports_running_agents_and_active_initiatives() {
		let results = CycleResults {
			stats: Ok(FleetStats {
				live_agents: 100,
				running_agents: 12,
				..FleetStats::default()
			}),
			agents: Ok(vec![]),
			tasks: Ok(vec![]),
			pipelines: Ok(PipelineView {
				running: vec![task("t1", "Inspect Pump", None)],
				..PipelineView::default()
			}),
			logs: Ok(vec![]),
		};
		let vm = view(reconcile(&Snapshot::empty(), results, Utc::now()));

		assert_eq!(vm.snapshot().stats.running_agents, 12);
		assert_eq!(vm.active_initiatives(), vec!["Inspect Pump"]);
		assert_eq!(vm.running_percent(), 12);
		assert_eq!(
			vm.bucket_counts(),
			BucketCounts {
				running: 1,
				queued: 0,
				completed: 0
			}
		);
	}

	#[test]
	fn capacity_prefers_backend_value() {
		let mut snap = Snapshot::empty();
		snap.stats.live_agents = 30;
		let vm = ViewModel::new(Arc::new(snap.clone()), Some(120));
		assert_eq!(vm.capacity_percent(), Some(25));

		snap.stats.capacity = Some(60);
		let vm = ViewModel::new(Arc::new(snap.clone()), Some(120));
		assert_eq!(vm.capacity_percent(), Some(50));

		snap.stats.capacity = None;
		assert_eq!(view(snap).capacity_percent(), None);
	}

	#[test]
	fn capacity_percent_is_capped() {
		let mut snap = Snapshot::empty();
		snap.stats.live_agents = 500;
		let vm = ViewModel::new(Arc::new(snap), Some(100));
		assert_eq!(vm.capacity_percent(), Some(100));
	}

	#[test]
	fn empty_snapshot_derives_zeroes() {
		let vm = view(Snapshot::empty());
		assert_eq!(vm.running_percent(), 0);
		assert_eq!(vm.bucket_counts(), BucketCounts::default());
		assert!(vm.active_initiatives().is_empty());
		assert!(vm.all_stale());
		assert_eq!(vm.section_health(Source::Logs, Utc::now()), SectionHealth::NoData);
	}

	#[test]
	fn queued_sorted_by_priority_with_unset_last() {
		let mut snap = Snapshot::empty();
		snap.pipelines.queued = vec![
			task("a", "later", Some(5)),
			task("b", "whenever", None),
			task("c", "urgent", Some(1)),
		];
		let vm = view(snap);
		let titles: Vec<&str> = vm.queued_by_priority().iter().map(|t| t.title.as_str()).collect();
		assert_eq!(titles, vec!["urgent", "later", "whenever"]);
	}

	#[test]
	fn tasks_share_queue_ordering() {
		let mut snap = Snapshot::empty();
		snap.tasks = vec![
			task("x", "unranked", None),
			task("y", "second", Some(2)),
			task("z", "first", Some(0)),
		];
		let vm = view(snap);
		let titles: Vec<&str> = vm.tasks_by_priority().iter().map(|t| t.title.as_str()).collect();
		assert_eq!(titles, vec!["first", "second", "unranked"]);
	}

	#[test]
	fn logs_most_recent_first() {
		let mut snap = Snapshot::empty();
		snap.logs = vec![
			entry("middle", Some(200)),
			entry("untimed-1", None),
			entry("newest", Some(300)),
			entry("oldest", Some(100)),
			entry("untimed-2", None),
		];
		let vm = view(snap);
		let order: Vec<&str> = vm.recent_logs(10).iter().map(|e| e.message.as_str()).collect();
		assert_eq!(order, vec!["newest", "middle", "oldest", "untimed-1", "untimed-2"]);
		assert_eq!(vm.recent_logs(2).len(), 2);
	}

	#[test]
	fn stale_section_reports_age() {
		let t0 = Utc::now();
		let ok = || CycleResults {
			stats: Ok(FleetStats::default()),
			agents: Ok(vec![]),
			tasks: Ok(vec![]),
			pipelines: Ok(PipelineView::default()),
			logs: Ok(vec![]),
		};
		let first = reconcile(&Snapshot::empty(), ok(), t0);
		let mut failing = ok();
		failing.logs = Err(FetchError::Network("request timed out".into()));
		let second = reconcile(&first, failing, t0 + Duration::seconds(2));
		let vm = view(second);

		let now = t0 + Duration::seconds(75);
		assert_eq!(vm.section_health(Source::Stats, now), SectionHealth::Live);
		assert_eq!(vm.section_health(Source::Logs, now), SectionHealth::Stale { age_secs: 75 });
		assert_eq!(vm.section_health(Source::Logs, now).label(), "stale 1m");
	}

	#[test]
	fn agent_counts_by_status() {
		let mut snap = Snapshot::empty();
		snap.agents = ["running", "running", "idle", "error", "rebooting"]
			.iter()
			.enumerate()
			.map(|(i, s)| serde_json::from_str(&format!(r#"{{"id": {i}, "status": "{s}"}}"#)).unwrap())
			.collect();
		let counts = view(snap).agent_counts();
		assert_eq!(counts.running, 2);
		assert_eq!(counts.idle, 1);
		assert_eq!(counts.error, 1);
		assert_eq!(counts.unknown, 1);
	}

	#[test]
	fn labels_truncate_on_char_boundaries() {
		assert_eq!(truncate_label("Inspect Pump", 20), "Inspect Pump");
		assert_eq!(truncate_label("Inspect the primary pump", 10), "Inspect t…");
		assert_eq!(truncate_label("pompe à chaleur", 7), "pompe …");
		assert_eq!(truncate_label("abc", 0), "");
	}

	#[test]
	fn formats_revenue_and_age() {
		assert_eq!(format_revenue(1234567.891), "$1,234,567.89");
		assert_eq!(format_revenue(0.0), "$0.00");
		assert_eq!(format_revenue(999.5), "$999.50");
		assert_eq!(format_age(42), "42s");
		assert_eq!(format_age(7200), "2h");
	}
}
