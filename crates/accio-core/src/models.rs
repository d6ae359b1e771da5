//! Data models for the Accio gateway API.
//!
//! Every payload the gateway returns is decoded into one of these types at the
//! transport boundary. Timestamps travel as epoch milliseconds.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{AccioError, Result};
use crate::format::{encode_uri_component, pretty_print_value};

// ─── Runs ────────────────────────────────────────────────────────────────────

/// Status of a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Scheduled,
    Running,
    Success,
    Failed,
    Killed,
    Lost,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Success | RunStatus::Failed | RunStatus::Killed | RunStatus::Lost
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Scheduled => "scheduled",
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
            RunStatus::Killed => "killed",
            RunStatus::Lost => "lost",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = AccioError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "scheduled" => Ok(RunStatus::Scheduled),
            "running" => Ok(RunStatus::Running),
            "success" => Ok(RunStatus::Success),
            "failed" => Ok(RunStatus::Failed),
            "killed" => Ok(RunStatus::Killed),
            "lost" => Ok(RunStatus::Lost),
            other => Err(AccioError::UnknownStatus(other.to_string())),
        }
    }
}

/// Status of a single node inside a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Waiting,
    Scheduled,
    Running,
    Success,
    Failed,
    Killed,
    Lost,
    Cancelled,
}

impl NodeStatus {
    pub fn is_terminal(self) -> bool {
        self.rank() == 2
    }

    /// Position in the node lifecycle. A node never moves to a lower rank.
    pub fn rank(self) -> u8 {
        match self {
            NodeStatus::Waiting | NodeStatus::Scheduled => 0,
            NodeStatus::Running => 1,
            _ => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeStatus::Waiting => "waiting",
            NodeStatus::Scheduled => "scheduled",
            NodeStatus::Running => "running",
            NodeStatus::Success => "success",
            NodeStatus::Failed => "failed",
            NodeStatus::Killed => "killed",
            NodeStatus::Lost => "lost",
            NodeStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error captured when a node failed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ErrorData {
    #[serde(default)]
    pub classifier: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub stacktrace: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct NodeResult {
    #[serde(default)]
    pub error: Option<ErrorData>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeState {
    pub name: String,
    pub status: NodeStatus,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub result: Option<NodeResult>,
    #[serde(default)]
    pub cache_hit: bool,
}

impl NodeState {
    pub fn error(&self) -> Option<&ErrorData> {
        self.result.as_ref().and_then(|r| r.error.as_ref())
    }

    /// Checks that moving from `self` to `next` does not go back in the lifecycle.
    pub fn check_progression(&self, next: &NodeState) -> Result<()> {
        if next.status.rank() < self.status.rank() {
            return Err(AccioError::NodeRegressed {
                node: self.name.clone(),
                from: self.status.to_string(),
                to: next.status.to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunState {
    pub status: RunStatus,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub nodes: Vec<NodeState>,
}

impl RunState {
    pub fn is_started(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }

    pub fn is_successful(&self) -> bool {
        self.status == RunStatus::Success
    }

    /// Nodes ordered by start time. Nodes that have not started come last,
    /// in their original order.
    pub fn nodes_by_start(&self) -> Vec<&NodeState> {
        let mut nodes: Vec<&NodeState> = self.nodes.iter().collect();
        nodes.sort_by_key(|n| (n.started_at.is_none(), n.started_at));
        nodes
    }

    pub fn node(&self, name: &str) -> Option<&NodeState> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Lifecycle violations of this state, if any.
    pub fn validate(&self, run_id: &str) -> Vec<AccioError> {
        let mut errors = vec![];
        let invalid = |reason: &str| AccioError::InvalidRunState {
            run: run_id.to_string(),
            reason: reason.to_string(),
        };
        if self.status.is_terminal() != self.completed_at.is_some() {
            errors.push(invalid(&format!(
                "status {} with completed_at {}",
                self.status,
                if self.completed_at.is_some() { "set" } else { "unset" }
            )));
        }
        if self.status != RunStatus::Scheduled && self.started_at.is_none() {
            errors.push(invalid(&format!("status {} without started_at", self.status)));
        }
        errors
    }

    /// Node regressions between a previous snapshot and this one.
    pub fn regressions_since(&self, previous: &RunState) -> Vec<AccioError> {
        previous
            .nodes
            .iter()
            .filter_map(|before| {
                let after = self.node(&before.name)?;
                before.check_progression(after).err()
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct User {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.email {
            Some(email) => write!(f, "{} <{}>", self.name, email),
            None => f.write_str(&self.name),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Package {
    pub workflow_id: String,
    #[serde(default)]
    pub workflow_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Run {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub owner: User,
    #[serde(default)]
    pub pkg: Package,
    #[serde(default)]
    pub seed: i64,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub params: BTreeMap<String, Value>,
    pub state: RunState,
    #[serde(default)]
    pub children: Vec<String>,
}

impl Run {
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => format!("Untitled run #{}", self.id),
        }
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }
}

/// A run together with a snapshot of its parent, fetched one level deep.
#[derive(Debug, Clone, PartialEq)]
pub struct RunDetail {
    pub run: Run,
    pub parent: Option<Box<Run>>,
}

impl RunDetail {
    /// Child runs inherit their notes from the parent.
    pub fn effective_notes(&self) -> Option<&str> {
        match &self.parent {
            Some(parent) => parent.notes.as_deref(),
            None => self.run.notes.as_deref(),
        }
    }

    pub fn effective_tags(&self) -> &[String] {
        match &self.parent {
            Some(parent) => &parent.tags,
            None => &self.run.tags,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RunList {
    #[serde(default)]
    pub results: Vec<Run>,
    #[serde(default)]
    pub total_count: u64,
}

/// Filter and page of a run listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunQuery {
    pub page: u32,
    pub per_page: u32,
    pub q: Option<String>,
    pub parent: Option<String>,
    pub workflow: Option<String>,
    pub owner: Option<String>,
}

impl Default for RunQuery {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 25,
            q: None,
            parent: None,
            workflow: None,
            owner: None,
        }
    }
}

impl RunQuery {
    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    pub fn to_query_string(&self) -> String {
        let mut out = format!("per_page={}&page={}", self.per_page, self.page);
        let filters = [
            ("q", &self.q),
            ("parent", &self.parent),
            ("workflow", &self.workflow),
            ("owner", &self.owner),
        ];
        for (key, value) in filters {
            if let Some(v) = value {
                out.push_str(&format!("&{}={}", key, encode_uri_component(v)));
            }
        }
        out
    }
}

/// Fields of a run that can be edited. Unset fields are left untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RunMetadataPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl RunMetadataPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.notes.is_none() && self.tags.is_none()
    }

    pub fn apply(&self, run: &mut Run) {
        if let Some(name) = &self.name {
            run.name = Some(name.clone());
        }
        if let Some(notes) = &self.notes {
            run.notes = Some(notes.clone());
        }
        if let Some(tags) = &self.tags {
            run.tags = tags.clone();
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogLine {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub classifier: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Artifact {
    pub name: String,
    pub value: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Metric {
    pub name: String,
    pub value: f64,
}

// ─── Values and workflows ────────────────────────────────────────────────────

/// Type of a value, e.g. `list(int)` is `{base: "list", args: ["int"]}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DataType {
    pub base: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// A typed value: parameter, default value or artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Value {
    pub kind: DataType,
    pub payload: serde_json::Value,
}

impl Value {
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&pretty_print_value(&self.payload, &self.kind))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParamDef {
    pub name: String,
    pub kind: DataType,
    #[serde(default)]
    pub default_value: Option<Value>,
    #[serde(default)]
    pub is_optional: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reference {
    pub node: String,
    pub port: String,
}

/// Where a node input comes from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Input {
    Value(Value),
    Param(String),
    Reference(Reference),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphNode {
    pub name: String,
    pub op: String,
    #[serde(default)]
    pub inputs: BTreeMap<String, Input>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Workflow {
    pub id: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub owner: User,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub params: Vec<ParamDef>,
    #[serde(default)]
    pub graph: Vec<GraphNode>,
}

/// Vertex of the graph handed to a layout library.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GraphVertex {
    pub name: String,
    pub op: String,
    /// `in:<port>` to literal value or `$param`.
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub port: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Default)]
pub struct Graph {
    pub nodes: Vec<GraphVertex>,
    pub edges: Vec<GraphEdge>,
}

impl Workflow {
    /// `{nodes, edges}` view of the operator graph.
    pub fn adjacency(&self) -> Graph {
        let mut graph = Graph::default();
        for node in &self.graph {
            let mut attributes = BTreeMap::new();
            for (port, input) in &node.inputs {
                match input {
                    Input::Value(value) => {
                        attributes.insert(format!("in:{port}"), value.to_string());
                    }
                    Input::Param(param) => {
                        attributes.insert(format!("in:{port}"), format!("${param}"));
                    }
                    Input::Reference(reference) => graph.edges.push(GraphEdge {
                        source: reference.node.clone(),
                        target: node.name.clone(),
                        port: reference.port.clone(),
                    }),
                }
            }
            graph.nodes.push(GraphVertex {
                name: node.name.clone(),
                op: node.op.clone(),
                attributes,
            });
        }
        graph
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct WorkflowList {
    #[serde(default)]
    pub results: Vec<Workflow>,
    #[serde(default)]
    pub total_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArgDef {
    pub name: String,
    pub kind: DataType,
    #[serde(default)]
    pub help: Option<String>,
    #[serde(default)]
    pub is_optional: bool,
    #[serde(default)]
    pub default_value: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Operator {
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub inputs: Vec<ArgDef>,
    #[serde(default)]
    pub outputs: Vec<ArgDef>,
    #[serde(default)]
    pub deprecation: Option<String>,
}

// ─── Jobs ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum JobState {
    Pending,
    Scheduled,
    Running,
    Successful,
    Failed,
    Canceled,
    Lost,
}

impl JobState {
    pub const FAILED: [JobState; 3] = [JobState::Lost, JobState::Failed, JobState::Canceled];
    pub const SUCCESSFUL: [JobState; 1] = [JobState::Successful];
    pub const RUNNING: [JobState; 1] = [JobState::Running];

    pub fn is_failed(self) -> bool {
        Self::FAILED.contains(&self)
    }

    pub fn is_successful(self) -> bool {
        Self::SUCCESSFUL.contains(&self)
    }

    pub fn is_running(self) -> bool {
        Self::RUNNING.contains(&self)
    }

    pub fn is_completed(self) -> bool {
        self.is_failed() || self.is_successful()
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Pending => "Pending",
            JobState::Scheduled => "Scheduled",
            JobState::Running => "Running",
            JobState::Successful => "Successful",
            JobState::Failed => "Failed",
            JobState::Canceled => "Canceled",
            JobState::Lost => "Lost",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobStatus {
    pub state: JobState,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    pub status: JobStatus,
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub history: Vec<JobStatus>,
}

impl Job {
    pub fn is_completed(&self) -> bool {
        self.status.state.is_completed()
    }

    /// Time the job first entered `Running`, taken from its history.
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.history
            .iter()
            .chain(std::iter::once(&self.status))
            .find(|s| s.state == JobState::Running)
            .map(|s| s.time)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct JobList {
    #[serde(default)]
    pub jobs: Vec<Job>,
    #[serde(default, rename = "totalCount")]
    pub total_count: u64,
}
