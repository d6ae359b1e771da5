//! Terminal rendering of gateway entities.

use chrono::{DateTime, Local, Utc};
use comfy_table::{presets::UTF8_FULL, Table};

use accio::format::{format_timestamp, page_count, pretty_print_kind, progress_percent, PLACEHOLDER};
use accio::models::{
    Artifact, Job, LogLine, Metric, NodeState, Operator, Run, RunDetail, Workflow,
};
use accio::status::{child_run_summary, node_summary_text, StatusDisplay};
use accio::{describe_job, describe_node, describe_run};

fn table<const N: usize>(header: [&str; N]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(header);
    table
}

pub fn status_cell(display: &StatusDisplay) -> String {
    format!("{} {}", display.glyph.symbol(), display.label)
}

fn or_placeholder(value: Option<&str>) -> &str {
    value.filter(|v| !v.is_empty()).unwrap_or(PLACEHOLDER)
}

pub fn pagination(page: u32, total_count: u64, per_page: u32) -> String {
    let pages = page_count(total_count, per_page).max(1);
    format!("Page {page} of {pages} ({total_count} total)")
}

// ─── Runs ─────────────────────────────────────────────────────────────────────

pub fn runs_table(runs: &[Run], now: DateTime<Utc>) -> Table {
    let mut t = table(["Id", "Name", "Workflow", "Owner", "Created", "Status", "Duration"]);
    for run in runs {
        let display = describe_run(&run.state, now);
        t.add_row([
            run.id.clone(),
            run.display_name(),
            run.pkg.workflow_id.clone(),
            run.owner.name.clone(),
            format_timestamp(Some(run.created_at)),
            status_cell(&display),
            display.duration_text(),
        ]);
    }
    t
}

pub fn run_summary(detail: &RunDetail, now: DateTime<Utc>) -> String {
    let run = &detail.run;
    let display = describe_run(&run.state, now);
    let mut out = String::new();
    out += &format!("Run: {}\n", run.display_name());
    out += &format!("Id: {}\n", run.id);
    if let Some(parent) = &detail.parent {
        out += &format!("Parent: {} ({})\n", parent.display_name(), parent.id);
    }
    out += &format!(
        "Workflow: {} (version {})\n",
        run.pkg.workflow_id, run.pkg.workflow_version
    );
    out += &format!("Owner: {}\n", run.owner);
    out += &format!("Created: {}\n", format_timestamp(Some(run.created_at)));
    out += &format!("Seed: {}\n", run.seed);
    let tags = detail.effective_tags();
    out += &format!(
        "Tags: {}\n",
        if tags.is_empty() { PLACEHOLDER.to_string() } else { tags.join(", ") }
    );
    out += &format!("Notes: {}\n", or_placeholder(detail.effective_notes()));
    out += &format!(
        "Status: {}  {}%  {}\n",
        status_cell(&display),
        progress_percent(run.state.progress),
        display.duration_text()
    );
    out
}

pub fn params_table(run: &Run) -> Table {
    let mut t = table(["Parameter", "Type", "Value"]);
    for (name, value) in &run.params {
        t.add_row([name.clone(), pretty_print_kind(&value.kind), value.to_string()]);
    }
    t
}

pub fn nodes_table(nodes: &[&NodeState], now: DateTime<Utc>) -> Table {
    let mut t = table(["Node", "Status", "Started", "Completed", "Summary"]);
    for node in nodes {
        let display = describe_node(node, now);
        t.add_row([
            node.name.clone(),
            status_cell(&display),
            format_timestamp(node.started_at),
            format_timestamp(node.completed_at),
            node_summary_text(node, now),
        ]);
    }
    t
}

/// Error details of failed nodes, one block per node.
pub fn node_errors(nodes: &[&NodeState]) -> String {
    let mut out = String::new();
    for node in nodes {
        if let Some(error) = node.error() {
            out += &format!("── {} failed ──\n{}: {}\n", node.name, error.classifier, error.message);
            for frame in &error.stacktrace {
                out += &format!("    {frame}\n");
            }
        }
    }
    out
}

pub fn children_table(children: &[Run], now: DateTime<Utc>) -> Table {
    let mut t = table(["Id", "Name", "Status", "Duration", "Details"]);
    for child in children {
        let display = describe_run(&child.state, now);
        t.add_row([
            child.id.clone(),
            child.display_name(),
            status_cell(&display),
            display.duration_text(),
            child_run_summary(child).unwrap_or_default(),
        ]);
    }
    t
}

pub fn log_line(line: &LogLine) -> String {
    let local: DateTime<Local> = line.created_at.into();
    format!("{} {}", local.format("%H:%M:%S%.3f"), line.message)
}

pub fn artifacts_table(artifacts: &[Artifact]) -> Table {
    let mut t = table(["Artifact", "Type", "Value"]);
    for artifact in artifacts {
        t.add_row([
            artifact.name.clone(),
            pretty_print_kind(&artifact.value.kind),
            artifact.value.to_string(),
        ]);
    }
    t
}

pub fn metrics_table(metrics: &[Metric]) -> Table {
    let mut t = table(["Metric", "Value"]);
    for metric in metrics {
        t.add_row([metric.name.clone(), metric.value.to_string()]);
    }
    t
}

// ─── Workflows ────────────────────────────────────────────────────────────────

pub fn workflow_summary(workflow: &Workflow) -> String {
    format!(
        "Workflow: {}\nId: {}\nVersion: {}\nOwner: {}\nCreated: {}\n",
        or_placeholder(workflow.name.as_deref()),
        workflow.id,
        workflow.version,
        workflow.owner,
        format_timestamp(Some(workflow.created_at)),
    )
}

pub fn workflow_params_table(workflow: &Workflow) -> Table {
    let mut t = table(["Parameter", "Type", "Default"]);
    for param in &workflow.params {
        let default = match &param.default_value {
            Some(value) => value.to_string(),
            None if param.is_optional => "(optional)".to_string(),
            None => PLACEHOLDER.to_string(),
        };
        t.add_row([param.name.clone(), pretty_print_kind(&param.kind), default]);
    }
    t
}

pub fn workflows_table(workflows: &[Workflow]) -> Table {
    let mut t = table(["Id", "Name", "Version", "Owner", "Created", "Nodes"]);
    for workflow in workflows {
        t.add_row([
            workflow.id.clone(),
            or_placeholder(workflow.name.as_deref()).to_string(),
            workflow.version.clone(),
            workflow.owner.name.clone(),
            format_timestamp(Some(workflow.created_at)),
            workflow.graph.len().to_string(),
        ]);
    }
    t
}

/// Edges of the workflow graph, one per line.
pub fn workflow_graph(workflow: &Workflow) -> String {
    let graph = workflow.adjacency();
    let mut out = String::new();
    for node in &graph.nodes {
        out += &format!("[{}] {}\n", node.op, node.name);
    }
    for edge in &graph.edges {
        out += &format!("{} -> {}:{}\n", edge.source, edge.target, edge.port);
    }
    out
}

pub fn operators_table(operators: &[Operator]) -> Table {
    let mut t = table(["Operator", "Category", "Inputs", "Outputs", "Description"]);
    for op in operators {
        let names = |args: &[accio::models::ArgDef]| {
            args.iter().map(|a| a.name.as_str()).collect::<Vec<_>>().join(", ")
        };
        let mut description = op.description.clone().unwrap_or_default();
        if let Some(deprecation) = &op.deprecation {
            description = format!("[deprecated: {deprecation}] {description}");
        }
        t.add_row([
            op.name.clone(),
            op.category.clone(),
            names(&op.inputs),
            names(&op.outputs),
            description,
        ]);
    }
    t
}

// ─── Jobs ─────────────────────────────────────────────────────────────────────

fn labels_text(job: &Job) -> String {
    job.labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn jobs_table(jobs: &[&Job], now: DateTime<Utc>) -> Table {
    let mut t = table(["Job", "Status", "Started", "Duration", "Progress", "Labels"]);
    for job in jobs {
        let display = describe_job(job, now);
        t.add_row([
            job.name.clone(),
            status_cell(&display),
            format_timestamp(job.started_at()),
            display.duration_text(),
            format!("{}%", progress_percent(job.progress)),
            labels_text(job),
        ]);
    }
    t
}

pub fn job_summary(job: &Job, now: DateTime<Utc>) -> String {
    let display = describe_job(job, now);
    let mut out = format!(
        "Job: {}\nStatus: {}  {}%  {}\nLabels: {}\n",
        job.name,
        status_cell(&display),
        progress_percent(job.progress),
        display.duration_text(),
        or_placeholder(Some(labels_text(job).as_str())),
    );
    if let Some(message) = &job.status.message {
        out += &format!("Message: {message}\n");
    }
    out
}

pub fn job_history_table(job: &Job) -> Table {
    let mut t = table(["Time", "State", "Message"]);
    for status in &job.history {
        t.add_row([
            format_timestamp(Some(status.time)),
            status.state.to_string(),
            status.message.clone().unwrap_or_default(),
        ]);
    }
    t
}
