use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FleetStats {
	#[serde(default, alias = "liveAgents")]
	pub live_agents: u64,
	#[serde(default, alias = "runningAgents")]
	pub running_agents: u64,
	#[serde(default)]
	pub revenue: f64,
	#[serde(default)]
	pub deploys: u64,
	#[serde(default, alias = "linesChanged")]
	pub lines_changed: u64,
	#[serde(default, alias = "queuedTasks")]
	pub queued_tasks: u64,
	/// Reported by some backends; the display config supplies it otherwise.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub capacity: Option<u64>,
}

impl FleetStats {
	pub fn validate(&self) -> Result<(), String> {
		if self.running_agents > self.live_agents {
			return Err(format!(
				"running_agents ({}) exceeds live_agents ({})",
				self.running_agents, self.live_agents
			));
		}
		if !self.revenue.is_finite() || self.revenue < 0.0 {
			return Err(format!("revenue must be a non-negative number, got {}", self.revenue));
		}
		Ok(())
	}
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
	Running,
	Idle,
	Error,
	Offline,
	#[default]
	#[serde(other)]
	Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
	#[serde(deserialize_with = "string_or_number")]
	pub id: String,
	#[serde(default)]
	pub name: String,
	#[serde(default)]
	pub status: AgentStatus,
	#[serde(default)]
	pub role: Option<String>,
	#[serde(default, alias = "currentTask")]
	pub current_task: Option<String>,
}

impl Agent {
	pub fn label(&self) -> &str {
		if self.name.is_empty() {
			&self.id
		} else {
			&self.name
		}
	}
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
	Queued,
	Running,
	Completed,
	Failed,
	#[default]
	#[serde(other)]
	Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
	#[serde(deserialize_with = "string_or_number")]
	pub id: String,
	#[serde(default)]
	pub title: String,
	/// Lower is more urgent.
	#[serde(default)]
	pub priority: Option<i64>,
	#[serde(default, alias = "assigned_to", alias = "assignedTo", alias = "agent_id")]
	pub assignee: Option<String>,
	#[serde(default, alias = "status")]
	pub state: TaskState,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineView {
	#[serde(default)]
	pub running: Vec<Task>,
	#[serde(default)]
	pub queued: Vec<Task>,
	#[serde(default)]
	pub completed: Vec<Task>,
}

impl PipelineView {
	/// Rejects a view where any task id shows up in more than one bucket.
	pub fn validate(&self) -> Result<(), String> {
		let mut seen = HashSet::new();
		for (bucket, tasks) in [
			("running", &self.running),
			("queued", &self.queued),
			("completed", &self.completed),
		] {
			for task in tasks {
				if !seen.insert(task.id.as_str()) {
					return Err(format!("task {:?} appears more than once (again in {bucket})", task.id));
				}
			}
		}
		Ok(())
	}

	pub fn len(&self) -> usize {
		self.running.len() + self.queued.len() + self.completed.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
	#[default]
	Info,
	#[serde(alias = "warning")]
	Warn,
	#[serde(alias = "err")]
	Error,
	#[serde(other)]
	Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
	#[serde(default, alias = "source", alias = "agent_name", alias = "agentName")]
	pub agent: String,
	#[serde(default, alias = "severity")]
	pub level: LogLevel,
	#[serde(default, alias = "msg")]
	pub message: String,
	#[serde(default, alias = "ts", alias = "time", deserialize_with = "flexible_timestamp")]
	pub timestamp: Option<DateTime<Utc>>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
	D: Deserializer<'de>,
{
	#[derive(Deserialize)]
	#[serde(untagged)]
	enum Id {
		Text(String),
		Int(i64),
	}

	Ok(match Id::deserialize(deserializer)? {
		Id::Text(s) => s,
		Id::Int(n) => n.to_string(),
	})
}

/// Accepts RFC 3339 strings or integer epoch milliseconds.
fn flexible_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
	D: Deserializer<'de>,
{
	#[derive(Deserialize)]
	#[serde(untagged)]
	enum Raw {
		Text(String),
		Millis(i64),
	}

	match Option::<Raw>::deserialize(deserializer)? {
		None => Ok(None),
		Some(Raw::Text(s)) => DateTime::parse_from_rfc3339(&s)
			.map(|dt| Some(dt.with_timezone(&Utc)))
			.map_err(|e| serde::de::Error::custom(format!("invalid timestamp {s:?}: {e}"))),
		Some(Raw::Millis(ms)) => Utc
			.timestamp_millis_opt(ms)
			.single()
			.map(Some)
			.ok_or_else(|| serde::de::Error::custom(format!("timestamp out of range: {ms}"))),
	}
}
