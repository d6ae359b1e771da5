//! Ready-made mounts for each gateway view.

use std::time::Duration;

use serde::Serialize;
use tracing::warn;

use accio_core::models::{
    Artifact, LogLine, Metric, Run, RunDetail, RunList, RunQuery, RunState, Workflow,
};
use accio_core::AccioError;

use crate::api::Classifier;
use crate::mount::{Mount, Refresh};
use crate::transport::Client;

/// Run detail together with its parent. Loaded once per id.
pub fn run_view(client: &Client, id: impl Into<String>) -> Mount<String, RunDetail> {
    let client = client.clone();
    Mount::spawn(
        id.into(),
        "run",
        move |id: &String, _: Option<&RunDetail>| client.get_run_detail(id),
        Refresh::Once,
    )
}

/// Inconsistencies of a polled run, plus node status regressions since the
/// previous poll.
pub fn run_problems(run: &Run, previous: Option<&RunState>) -> Vec<AccioError> {
    let mut problems = run.state.validate(&run.id);
    if let Some(previous) = previous {
        problems.extend(run.state.regressions_since(previous));
    }
    problems
}

/// Polls a run until it completes. Problems found by [`run_problems`] are
/// logged.
pub fn run_watch(client: &Client, id: impl Into<String>, period: Duration) -> Mount<String, Run> {
    let client = client.clone();
    Mount::spawn(
        id.into(),
        "run",
        move |id: &String, previous: Option<&Run>| {
            let previous = previous.map(|run| run.state.clone());
            client.get_run(id).then(move |run| {
                for problem in run_problems(&run, previous.as_ref()) {
                    warn!(run = %run.id, "{problem}");
                }
                run
            })
        },
        Refresh::every_until(period, |_: &String, run: &Run| run.state.is_completed()),
    )
}

/// Which log stream to tail.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LogTarget {
    pub run_id: String,
    pub node: String,
    pub classifier: Classifier,
    /// Keep polling for new lines.
    pub stream: bool,
}

impl LogTarget {
    /// Whether the node can still write lines: neither it nor its run has
    /// completed.
    pub fn is_live(&self, run: &Run) -> bool {
        !run.state.is_completed()
            && run
                .state
                .node(&self.node)
                .map_or(true, |node| node.completed_at.is_none())
    }
}

/// Accumulated log lines. Each poll only asks for lines after the last one
/// received.
pub fn log_tail(client: &Client, target: LogTarget, period: Duration) -> Mount<LogTarget, Vec<LogLine>> {
    let client = client.clone();
    Mount::spawn(
        target,
        "logs",
        move |target: &LogTarget, previous: Option<&Vec<LogLine>>| {
            let lines = previous.cloned().unwrap_or_default();
            let since = lines.last().map(|line| line.created_at);
            client
                .run_logs(&target.run_id, &target.node, target.classifier, since)
                .then(move |fresh| {
                    let mut lines = lines;
                    lines.extend(fresh);
                    lines
                })
        },
        Refresh::every_until(period, |target: &LogTarget, _: &Vec<LogLine>| !target.stream),
    )
}

/// One page of the run listing. Re-issued whenever the query changes.
pub fn run_list(client: &Client, query: RunQuery) -> Mount<RunQuery, RunList> {
    let client = client.clone();
    Mount::spawn(
        query,
        "runs",
        move |query: &RunQuery, _: Option<&RunList>| client.list_runs(query),
        Refresh::Once,
    )
}

pub fn children(client: &Client, run_id: impl Into<String>) -> Mount<String, Vec<Run>> {
    let client = client.clone();
    Mount::spawn(
        run_id.into(),
        "child runs",
        move |id: &String, _: Option<&Vec<Run>>| client.list_child_runs(id),
        Refresh::Once,
    )
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowView {
    pub workflow: Workflow,
    pub last_runs: Vec<Run>,
}

/// Identity of a workflow view: id and optional version.
pub type WorkflowKey = (String, Option<String>);

pub fn workflow_view(
    client: &Client,
    id: impl Into<String>,
    version: Option<String>,
) -> Mount<WorkflowKey, WorkflowView> {
    let client = client.clone();
    Mount::spawn(
        (id.into(), version),
        "workflow",
        move |(id, version): &WorkflowKey, _: Option<&WorkflowView>| {
            let runs_client = client.clone();
            let id_for_runs = id.clone();
            client
                .get_workflow(id, version.as_deref())
                .and_then(move |workflow| {
                    runs_client
                        .workflow_runs(&id_for_runs)
                        .then(move |last_runs| WorkflowView { workflow, last_runs })
                })
        },
        Refresh::Once,
    )
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeOutputs {
    pub artifacts: Vec<Artifact>,
    pub metrics: Vec<Metric>,
}

/// Identity of a node view: run id and node name.
pub type NodeKey = (String, String);

pub fn node_outputs(
    client: &Client,
    run_id: impl Into<String>,
    node: impl Into<String>,
) -> Mount<NodeKey, NodeOutputs> {
    let client = client.clone();
    Mount::spawn(
        (run_id.into(), node.into()),
        "outputs",
        move |(run_id, node): &NodeKey, _: Option<&NodeOutputs>| {
            let metrics_client = client.clone();
            let (run_id_m, node_m) = (run_id.clone(), node.clone());
            client.artifacts(run_id, node).and_then(move |artifacts| {
                metrics_client
                    .metrics(&run_id_m, &node_m)
                    .then(move |metrics| NodeOutputs { artifacts, metrics })
            })
        },
        Refresh::Once,
    )
}
