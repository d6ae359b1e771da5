//! Displayed lifecycle stage of runs, nodes and jobs.
//!
//! These are pure functions of a status record and the current time. Callers
//! pass `now` explicitly so that a running duration is recomputed on every
//! render rather than cached.

use std::fmt;

use chrono::{DateTime, Duration, Utc};

use crate::format::PLACEHOLDER;
use crate::models::{Job, JobState, NodeState, NodeStatus, Run, RunState, RunStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusLabel {
    Scheduled,
    Waiting,
    Running,
    Successful,
    Failed,
    Killed,
    Lost,
    Cancelled,
    CacheHit,
}

impl StatusLabel {
    /// Stable machine-readable key.
    pub fn as_str(self) -> &'static str {
        match self {
            StatusLabel::Scheduled => "scheduled",
            StatusLabel::Waiting => "waiting",
            StatusLabel::Running => "running",
            StatusLabel::Successful => "successful",
            StatusLabel::Failed => "failed",
            StatusLabel::Killed => "killed",
            StatusLabel::Lost => "lost",
            StatusLabel::Cancelled => "cancelled",
            StatusLabel::CacheHit => "cache_hit",
        }
    }
}

impl fmt::Display for StatusLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StatusLabel::Scheduled => "Scheduled",
            StatusLabel::Waiting => "Waiting",
            StatusLabel::Running => "Running",
            StatusLabel::Successful => "Successful",
            StatusLabel::Failed => "Failed",
            StatusLabel::Killed => "Killed",
            StatusLabel::Lost => "Lost",
            StatusLabel::Cancelled => "Cancelled",
            StatusLabel::CacheHit => "Cache hit",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Glyph {
    Ok,
    Remove,
    Refresh,
    Upload,
    Time,
    ExclamationSign,
}

impl Glyph {
    /// Terminal-friendly symbol.
    pub fn symbol(self) -> &'static str {
        match self {
            Glyph::Ok => "✓",
            Glyph::Remove => "✗",
            Glyph::Refresh => "↻",
            Glyph::Upload => "⇡",
            Glyph::Time => "⌛",
            Glyph::ExclamationSign => "!",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusDisplay {
    pub label: StatusLabel,
    pub glyph: Glyph,
    pub duration: Option<Duration>,
    pub successful: bool,
}

impl StatusDisplay {
    fn new(label: StatusLabel, glyph: Glyph, duration: Option<Duration>) -> Self {
        Self {
            label,
            glyph,
            duration,
            successful: label == StatusLabel::Successful,
        }
    }

    pub fn duration_text(&self) -> String {
        self.duration
            .map(humanize)
            .unwrap_or_else(|| PLACEHOLDER.to_string())
    }
}

/// Elapsed time of a lifecycle: `completed - started` once completed,
/// `now - started` while running.
fn elapsed(
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<Duration> {
    let started = started_at?;
    Some(completed_at.unwrap_or(now) - started)
}

pub fn describe_run(state: &RunState, now: DateTime<Utc>) -> StatusDisplay {
    let duration = elapsed(state.started_at, state.completed_at, now);
    if state.is_completed() {
        if state.is_successful() {
            StatusDisplay::new(StatusLabel::Successful, Glyph::Ok, duration)
        } else {
            StatusDisplay::new(StatusLabel::Failed, Glyph::Remove, duration)
        }
    } else if state.is_started() {
        StatusDisplay::new(StatusLabel::Running, Glyph::Refresh, duration)
    } else {
        StatusDisplay::new(StatusLabel::Scheduled, Glyph::Upload, None)
    }
}

pub fn describe_node(node: &NodeState, now: DateTime<Utc>) -> StatusDisplay {
    let duration = elapsed(node.started_at, node.completed_at, now);
    let is_completed = node.completed_at.is_some();
    let glyph = if is_completed {
        match node.status {
            NodeStatus::Success => Glyph::Ok,
            NodeStatus::Lost => Glyph::Time,
            NodeStatus::Killed => Glyph::ExclamationSign,
            _ => Glyph::Remove,
        }
    } else if node.started_at.is_some() {
        Glyph::Refresh
    } else {
        Glyph::Upload
    };

    if node.cache_hit {
        return StatusDisplay {
            label: StatusLabel::CacheHit,
            glyph,
            duration: None,
            successful: true,
        };
    }
    match node.status {
        NodeStatus::Cancelled => {
            return StatusDisplay::new(StatusLabel::Cancelled, Glyph::ExclamationSign, duration)
        }
        NodeStatus::Killed => {
            return StatusDisplay::new(StatusLabel::Killed, Glyph::ExclamationSign, duration)
        }
        _ => {}
    }

    let label = if is_completed {
        match node.status {
            NodeStatus::Success => StatusLabel::Successful,
            NodeStatus::Lost => StatusLabel::Lost,
            _ => StatusLabel::Failed,
        }
    } else if node.started_at.is_some() {
        StatusLabel::Running
    } else if node.status == NodeStatus::Waiting {
        StatusLabel::Waiting
    } else {
        StatusLabel::Scheduled
    };
    StatusDisplay::new(label, glyph, duration)
}

/// One-line summary shown next to a node, e.g. `Ran for 3 minutes`.
pub fn node_summary_text(node: &NodeState, now: DateTime<Utc>) -> String {
    let display = describe_node(node, now);
    match display.label {
        StatusLabel::Successful | StatusLabel::Failed | StatusLabel::Lost => {
            format!("Ran for {}", display.duration_text())
        }
        StatusLabel::Running => format!("Running for {}", display.duration_text()),
        label => label.to_string(),
    }
}

/// Whether logs can exist for a node.
pub fn node_has_logs(node: &NodeState) -> bool {
    !node.cache_hit && !matches!(node.status, NodeStatus::Waiting | NodeStatus::Scheduled)
}

/// What a child run is doing, as listed under its parent.
pub fn child_run_summary(run: &Run) -> Option<String> {
    let nodes = &run.state.nodes;
    let first_with = |status: NodeStatus| nodes.iter().find(|n| n.status == status);
    match run.state.status {
        RunStatus::Running => {
            let active: Vec<&str> = nodes
                .iter()
                .filter(|n| n.status == NodeStatus::Running)
                .map(|n| n.name.as_str())
                .collect();
            if !active.is_empty() {
                Some(format!("Running {}", active.join(", ")))
            } else {
                first_with(NodeStatus::Scheduled).map(|n| format!("Waiting for {}", n.name))
            }
        }
        RunStatus::Killed => Some("Cancelled".to_string()),
        RunStatus::Failed => first_with(NodeStatus::Failed)
            .map(|n| format!("Failed in {}", n.name))
            .or_else(|| first_with(NodeStatus::Lost).map(|n| format!("Lost {}", n.name))),
        _ => None,
    }
}

pub fn describe_job(job: &Job, now: DateTime<Utc>) -> StatusDisplay {
    let state = job.status.state;
    let started_at = job.started_at();
    let completed_at = state.is_completed().then_some(job.status.time);
    let duration = elapsed(started_at, completed_at, now);
    match state {
        JobState::Successful => StatusDisplay::new(StatusLabel::Successful, Glyph::Ok, duration),
        JobState::Failed => StatusDisplay::new(StatusLabel::Failed, Glyph::Remove, duration),
        JobState::Canceled => {
            StatusDisplay::new(StatusLabel::Cancelled, Glyph::ExclamationSign, duration)
        }
        JobState::Lost => StatusDisplay::new(StatusLabel::Lost, Glyph::Time, duration),
        JobState::Running => StatusDisplay::new(StatusLabel::Running, Glyph::Refresh, duration),
        JobState::Pending | JobState::Scheduled => {
            StatusDisplay::new(StatusLabel::Scheduled, Glyph::Upload, None)
        }
    }
}

/// Relative-time wording of a duration ("a few seconds", "3 hours", ...).
pub fn humanize(duration: Duration) -> String {
    let ms = duration.num_milliseconds().unsigned_abs() as f64;
    let seconds = (ms / 1_000.0).round();
    let minutes = (ms / 60_000.0).round();
    let hours = (ms / 3_600_000.0).round();
    let days_f = ms / 86_400_000.0;
    let days = days_f.round();
    let months = (days_f / 30.436875).round();
    let years = (days_f / 365.2425).round();

    if seconds < 45.0 {
        "a few seconds".to_string()
    } else if minutes <= 1.0 {
        "a minute".to_string()
    } else if minutes < 45.0 {
        format!("{} minutes", minutes)
    } else if hours <= 1.0 {
        "an hour".to_string()
    } else if hours < 22.0 {
        format!("{} hours", hours)
    } else if days <= 1.0 {
        "a day".to_string()
    } else if days < 26.0 {
        format!("{} days", days)
    } else if months <= 1.0 {
        "a month".to_string()
    } else if months < 11.0 {
        format!("{} months", months)
    } else if years <= 1.0 {
        "a year".to_string()
    } else {
        format!("{} years", years)
    }
}
