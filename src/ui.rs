use crate::model::{AgentStatus, LogLevel};
use crate::poll::scheduler::PollCounters;
use crate::poll::{PollState, Source};
use crate::view::{format_revenue, truncate_label, SectionHealth, ViewModel};
use chrono::{DateTime, Utc};
use ratatui::{
	prelude::*,
	text::{Line, Text},
	widgets::{Block, Borders, Gauge, List, ListItem, Paragraph, Wrap},
};

pub const STATUS_STYLES: [&str; 3] = ["unicode", "emoji", "text"];

/// Per-frame inputs that are not part of the snapshot.
pub struct Chrome<'a> {
	pub status_style: &'a str,
	pub label_width: usize,
	pub max_log_lines: usize,
	pub poll_state: PollState,
	pub counters: PollCounters,
	pub status_message: Option<&'a str>,
	pub now: DateTime<Utc>,
}

pub fn draw(f: &mut Frame, vm: &ViewModel, chrome: &Chrome) {
	let area = f.area();
	let vertical = Layout::default()
		.direction(Direction::Vertical)
		.constraints([
			Constraint::Length(3),
			Constraint::Length(3),
			Constraint::Min(6),
			Constraint::Length(3),
		])
		.split(area);

	draw_gauges(f, vertical[0], vm);
	draw_stats(f, vertical[1], vm, chrome);

	let body = Layout::default()
		.direction(Direction::Horizontal)
		.constraints([Constraint::Percentage(30), Constraint::Percentage(70)])
		.split(vertical[2]);
	let left = Layout::default()
		.direction(Direction::Vertical)
		.constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
		.split(body[0]);
	draw_agents(f, left[0], vm, chrome);
	draw_tasks(f, left[1], vm, chrome);

	let right = Layout::default()
		.direction(Direction::Vertical)
		.constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
		.split(body[1]);
	draw_pipelines(f, right[0], vm, chrome);
	draw_logs(f, right[1], vm, chrome);

	draw_footer(f, vertical[3], vm, chrome);
}

fn health_style(health: SectionHealth) -> Style {
	match health {
		SectionHealth::Live => Style::default().fg(Color::Green),
		SectionHealth::Stale { .. } => Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
		SectionHealth::NoData => Style::default().fg(Color::DarkGray),
	}
}

fn section_title(source: Source, vm: &ViewModel, now: DateTime<Utc>, extra: &str) -> Line<'static> {
	let health = vm.section_health(source, now);
	let style = health_style(health);
	Line::from(vec![
		Span::raw(format!(" {}{} ", source.display_name(), extra)),
		Span::styled(format!("[{}] ", health.label()), style),
	])
}

fn draw_gauges(f: &mut Frame, area: Rect, vm: &ViewModel) {
	let cols = Layout::default()
		.direction(Direction::Horizontal)
		.constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
		.split(area);
	let stats = &vm.snapshot().stats;

	let running = Gauge::default()
		.block(Block::default().borders(Borders::ALL).title(" Running "))
		.gauge_style(Style::default().fg(Color::Green))
		.percent(vm.running_percent())
		.label(format!("{} of {} live agents", stats.running_agents, stats.live_agents));
	f.render_widget(running, cols[0]);

	let (pct, label) = match (vm.capacity_percent(), vm.capacity()) {
		(Some(pct), Some(cap)) => (pct, format!("{} / {} capacity", stats.live_agents, cap)),
		_ => (0, format!("{} live (capacity unknown)", stats.live_agents)),
	};
	let capacity = Gauge::default()
		.block(Block::default().borders(Borders::ALL).title(" Capacity "))
		.gauge_style(Style::default().fg(Color::Cyan))
		.percent(pct)
		.label(label);
	f.render_widget(capacity, cols[1]);
}

fn draw_stats(f: &mut Frame, area: Rect, vm: &ViewModel, chrome: &Chrome) {
	let stats = &vm.snapshot().stats;
	let line = Line::from(vec![
		Span::styled("Revenue ", Style::default().add_modifier(Modifier::DIM)),
		Span::raw(format_revenue(stats.revenue)),
		Span::styled("  Deploys ", Style::default().add_modifier(Modifier::DIM)),
		Span::raw(stats.deploys.to_string()),
		Span::styled("  Lines changed ", Style::default().add_modifier(Modifier::DIM)),
		Span::raw(stats.lines_changed.to_string()),
		Span::styled("  Queued ", Style::default().add_modifier(Modifier::DIM)),
		Span::raw(stats.queued_tasks.to_string()),
	]);
	let block = Block::default()
		.borders(Borders::ALL)
		.title(section_title(Source::Stats, vm, chrome.now, ""));
	f.render_widget(Paragraph::new(line).block(block), area);
}

fn draw_agents(f: &mut Frame, area: Rect, vm: &ViewModel, chrome: &Chrome) {
	let counts = vm.agent_counts();
	let items: Vec<ListItem> = if vm.agents().is_empty() {
		vec![ListItem::new(Span::styled(
			"No agents",
			Style::default().add_modifier(Modifier::DIM),
		))]
	} else {
		vm.agents()
			.iter()
			.map(|a| {
				let (indicator, style) = status_indicator(a.status, chrome.status_style);
				let mut spans = vec![
					Span::styled(indicator, style),
					Span::raw(" "),
					Span::raw(truncate_label(a.label(), chrome.label_width)),
				];
				if let Some(role) = &a.role {
					spans.push(Span::styled(
						format!(" ({role})"),
						Style::default().add_modifier(Modifier::DIM),
					));
				}
				if let Some(task) = &a.current_task {
					spans.push(Span::styled(
						format!(" · {}", truncate_label(task, chrome.label_width)),
						Style::default().add_modifier(Modifier::DIM),
					));
				}
				ListItem::new(Line::from(spans))
			})
			.collect()
	};
	let extra = format!(
		" ({} running, {} idle, {} error, {} offline, {} other)",
		counts.running, counts.idle, counts.error, counts.offline, counts.unknown
	);
	let list = List::new(items).block(
		Block::default()
			.borders(Borders::ALL)
			.title(section_title(Source::Agents, vm, chrome.now, &extra)),
	);
	f.render_widget(list, area);
}

fn draw_tasks(f: &mut Frame, area: Rect, vm: &ViewModel, chrome: &Chrome) {
	let tasks = vm.tasks_by_priority();
	let items: Vec<ListItem> = if tasks.is_empty() {
		vec![ListItem::new(Span::styled(
			"No tasks",
			Style::default().add_modifier(Modifier::DIM),
		))]
	} else {
		tasks
			.into_iter()
			.map(|t| {
				let prio = t.priority.map(|p| format!("P{p} ")).unwrap_or_default();
				let mut spans = vec![Span::raw(format!(
					"{prio}{}",
					truncate_label(&t.title, chrome.label_width)
				))];
				if let Some(who) = &t.assignee {
					spans.push(Span::styled(
						format!(" @{who}"),
						Style::default().add_modifier(Modifier::DIM),
					));
				}
				ListItem::new(Line::from(spans))
			})
			.collect()
	};
	let extra = format!(" ({})", vm.snapshot().tasks.len());
	let list = List::new(items).block(
		Block::default()
			.borders(Borders::ALL)
			.title(section_title(Source::Tasks, vm, chrome.now, &extra)),
	);
	f.render_widget(list, area);
}

fn draw_pipelines(f: &mut Frame, area: Rect, vm: &ViewModel, chrome: &Chrome) {
	if vm.snapshot().pipelines.is_empty() {
		let block = Block::default()
			.borders(Borders::ALL)
			.title(section_title(Source::Pipelines, vm, chrome.now, ""));
		let empty = Paragraph::new(Span::styled(
			"No pipeline tasks",
			Style::default().add_modifier(Modifier::DIM),
		));
		f.render_widget(empty.block(block), area);
		return;
	}

	let counts = vm.bucket_counts();
	let cols = Layout::default()
		.direction(Direction::Horizontal)
		.constraints([
			Constraint::Percentage(40),
			Constraint::Percentage(35),
			Constraint::Percentage(25),
		])
		.split(area);
	let health = vm.section_health(Source::Pipelines, chrome.now).label();

	let active: Vec<ListItem> = vm
		.active_initiatives()
		.into_iter()
		.map(|title| {
			ListItem::new(Line::from(vec![
				Span::styled("▶ ", Style::default().fg(Color::Green)),
				Span::raw(truncate_label(title, chrome.label_width)),
			]))
		})
		.collect();
	f.render_widget(
		List::new(active).block(
			Block::default()
				.borders(Borders::ALL)
				.title(format!(" Active Initiatives ({}) [{health}] ", counts.running)),
		),
		cols[0],
	);

	let queued: Vec<ListItem> = vm
		.queued_by_priority()
		.into_iter()
		.map(|t| {
			let prio = t.priority.map(|p| format!("P{p} ")).unwrap_or_default();
			ListItem::new(format!("{prio}{}", truncate_label(&t.title, chrome.label_width)))
		})
		.collect();
	f.render_widget(
		List::new(queued).block(
			Block::default()
				.borders(Borders::ALL)
				.title(format!(" Queued ({}) ", counts.queued)),
		),
		cols[1],
	);

	let completed: Vec<ListItem> = vm
		.snapshot()
		.pipelines
		.completed
		.iter()
		.map(|t| {
			ListItem::new(Span::styled(
				format!("✓ {}", truncate_label(&t.title, chrome.label_width)),
				Style::default().fg(Color::Cyan),
			))
		})
		.collect();
	f.render_widget(
		List::new(completed).block(
			Block::default()
				.borders(Borders::ALL)
				.title(format!(" Completed ({}) ", counts.completed)),
		),
		cols[2],
	);
}

fn draw_logs(f: &mut Frame, area: Rect, vm: &ViewModel, chrome: &Chrome) {
	let lines: Vec<Line> = vm
		.recent_logs(chrome.max_log_lines)
		.into_iter()
		.map(|entry| {
			let (tag, style) = match entry.level {
				LogLevel::Info => ("INFO ", Style::default().fg(Color::Blue)),
				LogLevel::Warn => ("WARN ", Style::default().fg(Color::Yellow)),
				LogLevel::Error => (
					"ERROR",
					Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
				),
				LogLevel::Other => ("-    ", Style::default().fg(Color::DarkGray)),
			};
			let ts = entry
				.timestamp
				.map(|t| t.format("%H:%M:%S ").to_string())
				.unwrap_or_default();
			Line::from(vec![
				Span::styled(ts, Style::default().add_modifier(Modifier::DIM)),
				Span::styled(tag, style),
				Span::raw(" "),
				Span::styled(
					format!("{}: ", truncate_label(&entry.agent, 16)),
					Style::default().add_modifier(Modifier::BOLD),
				),
				Span::raw(entry.message.clone()),
			])
		})
		.collect();
	let text = if lines.is_empty() {
		Text::from("No log entries")
	} else {
		Text::from(lines)
	};
	let block = Block::default()
		.borders(Borders::ALL)
		.title(section_title(Source::Logs, vm, chrome.now, ""));
	f.render_widget(Paragraph::new(text).block(block).wrap(Wrap { trim: false }), area);
}

fn draw_footer(f: &mut Frame, area: Rect, vm: &ViewModel, chrome: &Chrome) {
	let mut spans = Vec::new();
	if vm.all_stale() && vm.snapshot().cycle > 0 {
		spans.push(Span::styled(
			" backend unreachable, showing last known data ",
			Style::default().fg(Color::White).bg(Color::Red).add_modifier(Modifier::BOLD),
		));
		spans.push(Span::raw(" "));
	}
	let state = match chrome.poll_state {
		PollState::Idle => "idle",
		PollState::Scheduled => "waiting",
		PollState::Polling { .. } => "polling…",
	};
	spans.push(Span::raw(format!(
		"cycle {} · {} · skipped {}",
		vm.snapshot().cycle,
		state,
		chrome.counters.ticks_skipped
	)));
	if let Some(msg) = chrome.status_message {
		spans.push(Span::styled(format!("  {msg}"), Style::default().fg(Color::Yellow)));
	}

	let mut health = Vec::new();
	for source in Source::ALL {
		let h = vm.section_health(source, chrome.now);
		if !health.is_empty() {
			health.push(Span::raw(" · "));
		}
		health.push(Span::raw(format!("{} ", source.display_name())));
		health.push(Span::styled(h.label(), health_style(h)));
	}

	let hints = Line::from(Span::styled(
		"q quit · r refresh · s style",
		Style::default().add_modifier(Modifier::DIM),
	));
	f.render_widget(
		Paragraph::new(vec![Line::from(spans), Line::from(health), hints]),
		area,
	);
}

pub fn status_indicator(status: AgentStatus, style: &str) -> (&'static str, Style) {
	match style {
		"emoji" => match status {
			AgentStatus::Running => ("🟢", Style::default()),
			AgentStatus::Idle => ("🟡", Style::default()),
			AgentStatus::Error => ("🔴", Style::default()),
			AgentStatus::Offline => ("⚫", Style::default().add_modifier(Modifier::DIM)),
			AgentStatus::Unknown => ("⚪", Style::default()),
		},
		"text" => match status {
			AgentStatus::Running => (
				"[RUN] ",
				Style::default()
					.fg(Color::Green)
					.add_modifier(Modifier::BOLD),
			),
			AgentStatus::Idle => ("[idle]", Style::default().fg(Color::Yellow)),
			AgentStatus::Error => (
				"[ERR] ",
				Style::default()
					.fg(Color::White)
					.bg(Color::Red)
					.add_modifier(Modifier::BOLD),
			),
			AgentStatus::Offline => ("[off] ", Style::default().fg(Color::DarkGray)),
			AgentStatus::Unknown => ("[ ? ] ", Style::default().fg(Color::DarkGray)),
		},
		// Unicode, also the fallback for unknown values
		_ => match status {
			AgentStatus::Running => (
				"▶",
				Style::default()
					.fg(Color::Green)
					.add_modifier(Modifier::BOLD),
			),
			AgentStatus::Idle => ("○", Style::default().fg(Color::Yellow)),
			AgentStatus::Error => (
				"●",
				Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
			),
			AgentStatus::Offline => ("·", Style::default().fg(Color::DarkGray)),
			AgentStatus::Unknown => ("?", Style::default().fg(Color::DarkGray)),
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::model::{FleetStats, PipelineView, Task};
	use crate::poll::{reconcile, CycleResults, FetchError, Snapshot};
	use ratatui::backend::TestBackend;
	use ratatui::Terminal;
	use std::sync::Arc;

	fn render(vm: &ViewModel) -> String {
		let mut terminal = Terminal::new(TestBackend::new(140, 40)).unwrap();
		let chrome = Chrome {
			status_style: "unicode",
			label_width: 32,
			max_log_lines: 50,
			poll_state: PollState::Scheduled,
			counters: PollCounters::default(),
			status_message: None,
			now: Utc::now(),
		};
		terminal.draw(|f| draw(f, vm, &chrome)).unwrap();
		terminal
			.backend()
			.buffer()
			.content
			.iter()
			.map(|c| c.symbol())
			.collect()
	}

	#[test]
	fn renders_active_initiatives_and_counts() {
		let results = CycleResults {
			stats: Ok(FleetStats {
				live_agents: 100,
				running_agents: 12,
				..FleetStats::default()
			}),
			agents: Ok(vec![]),
			tasks: Ok(vec![]),
			pipelines: Ok(PipelineView {
				running: vec![Task {
					id: "t1".into(),
					title: "Inspect Pump".into(),
					priority: None,
					assignee: None,
					state: Default::default(),
				}],
				..PipelineView::default()
			}),
			logs: Err(FetchError::Network("request timed out".into())),
		};
		let vm = ViewModel::new(Arc::new(reconcile(&Snapshot::empty(), results, Utc::now())), None);
		let screen = render(&vm);

		assert!(screen.contains("Inspect Pump"));
		assert!(screen.contains("Active Initiatives (1)"));
		assert!(screen.contains("12 of 100 live agents"));
		assert!(screen.contains("no data"));
	}

	#[test]
	fn renders_empty_snapshot() {
		let vm = ViewModel::new(Arc::new(Snapshot::empty()), Some(50));
		let screen = render(&vm);
		assert!(screen.contains("No agents"));
		assert!(screen.contains("No log entries"));
	}

	#[test]
	fn stale_tasks_keep_last_list_and_say_so() {
		let t0 = Utc::now();
		let ok = || CycleResults {
			stats: Ok(FleetStats::default()),
			agents: Ok(vec![serde_json::from_str(
				r#"{"id": "a1", "name": "scout", "status": "running", "role": "surveyor"}"#,
			)
			.unwrap()]),
			tasks: Ok(vec![Task {
				id: "t9".into(),
				title: "FlatOnlyTask".into(),
				priority: Some(2),
				assignee: Some("scout".into()),
				state: Default::default(),
			}]),
			pipelines: Ok(PipelineView::default()),
			logs: Ok(vec![]),
		};
		let first = reconcile(&Snapshot::empty(), ok(), t0);
		let mut failing = ok();
		failing.tasks = Err(FetchError::Http { status: 500 });
		let second = reconcile(&first, failing, t0);
		let screen = render(&ViewModel::new(Arc::new(second), None));

		assert!(screen.contains(" Tasks (1) [stale"));
		assert!(screen.contains("P2 FlatOnlyTask @scout"));
		assert!(screen.contains("(surveyor)"));
		assert!(screen.contains("No pipeline tasks"));
		assert!(screen.contains("Tasks stale"));
		assert!(screen.contains("Logs live"));
	}

	#[test]
	fn unknown_style_falls_back_to_unicode() {
		assert_eq!(status_indicator(AgentStatus::Running, "sparkles").0, "▶");
		assert_eq!(status_indicator(AgentStatus::Error, "text").0, "[ERR] ");
	}
}
