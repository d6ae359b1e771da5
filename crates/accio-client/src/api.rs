//! Typed gateway endpoints under `/api/v1`.

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Method;

use accio_core::format::encode_uri_component as enc;
use accio_core::models::{
    Artifact, Job, JobList, LogLine, Metric, Operator, Run, RunDetail, RunList, RunMetadataPatch,
    RunQuery, Workflow, WorkflowList,
};

use crate::pending::Pending;
use crate::transport::{Client, Payload, RequestOptions};

pub const API_PREFIX: &str = "/api/v1";

/// Children of a run are listed in a single page of this size.
pub const CHILDREN_PER_PAGE: u32 = 50;
/// Recent runs shown alongside a workflow.
pub const WORKFLOW_RUNS_PER_PAGE: u32 = 15;
/// Page size of the workflow listing.
pub const WORKFLOWS_PER_PAGE: u32 = 25;

/// Output stream of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classifier {
    Stdout,
    Stderr,
}

impl Classifier {
    pub fn as_str(self) -> &'static str {
        match self {
            Classifier::Stdout => "stdout",
            Classifier::Stderr => "stderr",
        }
    }
}

impl std::fmt::Display for Classifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `/api/v1/jobs?page=P&perPage=N[&labels=S]`. The selector is passed
/// through verbatim.
pub fn jobs_path(page: u32, per_page: u32, label_selector: Option<&str>) -> String {
    let mut path = format!("{API_PREFIX}/jobs?page={page}&perPage={per_page}");
    if let Some(labels) = label_selector {
        path.push_str("&labels=");
        path.push_str(labels);
    }
    path
}

fn logs_path(run_id: &str, node: &str, classifier: Classifier) -> String {
    format!(
        "{API_PREFIX}/run/{}/logs/{}/{}",
        enc(run_id),
        enc(node),
        classifier
    )
}

/// Job endpoints, the seam used by the store thunks.
pub trait JobsApi: Send + Sync {
    fn list_jobs(&self, page: u32, label_selector: Option<&str>) -> Pending<JobList>;
    fn get_job(&self, name: &str) -> Pending<Job>;
}

impl Client {
    // ─── Runs ────────────────────────────────────────────────────────────────

    pub fn list_runs(&self, query: &RunQuery) -> Pending<RunList> {
        self.get_json(&format!("{API_PREFIX}/run?{}", query.to_query_string()))
    }

    pub fn get_run(&self, id: &str) -> Pending<Run> {
        self.get_json(&format!("{API_PREFIX}/run/{}", enc(id)))
    }

    /// Fetches a run and, when it has one, its parent. Only one level of
    /// ancestry is resolved.
    pub fn get_run_detail(&self, id: &str) -> Pending<RunDetail> {
        let client = self.clone();
        self.get_run(id).and_then(move |run| match run.parent.clone() {
            Some(parent) => client.get_run(&parent).then(move |parent| RunDetail {
                run,
                parent: Some(Box::new(parent)),
            }),
            None => Pending::ready(Ok(RunDetail { run, parent: None })),
        })
    }

    /// Sends a metadata patch. The response body is not interpreted.
    pub fn update_run(&self, id: &str, patch: &RunMetadataPatch) -> Pending<()> {
        match RequestOptions::method(Method::POST).json(patch) {
            Ok(options) => self
                .xhr(&format!("{API_PREFIX}/run/{}", enc(id)), options.blob())
                .then(|_| ()),
            Err(e) => Pending::ready(Err(e)),
        }
    }

    pub fn kill_run(&self, id: &str) -> Pending<()> {
        self.xhr(
            &format!("{API_PREFIX}/run/{}/kill", enc(id)),
            RequestOptions::method(Method::POST).blob(),
        )
        .then(|_| ())
    }

    /// Direct children of `id`, in one page.
    pub fn list_child_runs(&self, id: &str) -> Pending<Vec<Run>> {
        self.get_json::<RunList>(&format!(
            "{API_PREFIX}/run?per_page={CHILDREN_PER_PAGE}&parent={}",
            enc(id)
        ))
        .then(|list| list.results)
    }

    /// Log lines of a node, restricted to those after `since` when given.
    pub fn run_logs(
        &self,
        run_id: &str,
        node: &str,
        classifier: Classifier,
        since: Option<DateTime<Utc>>,
    ) -> Pending<Vec<LogLine>> {
        let mut path = logs_path(run_id, node, classifier);
        if let Some(since) = since {
            path.push_str("?since=");
            path.push_str(&enc(&since.to_rfc3339_opts(SecondsFormat::Millis, true)));
        }
        self.get_json(&path)
    }

    /// Raw log file of a node.
    pub fn download_logs(&self, run_id: &str, node: &str, classifier: Classifier) -> Pending<Vec<u8>> {
        let path = format!("{}?download=true", logs_path(run_id, node, classifier));
        self.xhr(&path, RequestOptions::default().blob())
            .then(Payload::into_bytes)
    }

    /// Raw JSON export of a run.
    pub fn download_run(&self, id: &str) -> Pending<Vec<u8>> {
        self.xhr(
            &format!("{API_PREFIX}/run/{}?download=true", enc(id)),
            RequestOptions::default().blob(),
        )
        .then(Payload::into_bytes)
    }

    pub fn artifacts(&self, run_id: &str, node: &str) -> Pending<Vec<Artifact>> {
        self.get_json(&format!(
            "{API_PREFIX}/run/{}/artifacts/{}",
            enc(run_id),
            enc(node)
        ))
    }

    pub fn metrics(&self, run_id: &str, node: &str) -> Pending<Vec<Metric>> {
        self.get_json(&format!(
            "{API_PREFIX}/run/{}/metrics/{}",
            enc(run_id),
            enc(node)
        ))
    }

    // ─── Workflows ───────────────────────────────────────────────────────────

    pub fn get_workflow(&self, id: &str, version: Option<&str>) -> Pending<Workflow> {
        let mut path = format!("{API_PREFIX}/workflow/{}", enc(id));
        if let Some(version) = version {
            path.push_str("?version=");
            path.push_str(&enc(version));
        }
        self.get_json(&path)
    }

    pub fn list_workflows(&self, q: Option<&str>, page: u32) -> Pending<WorkflowList> {
        self.get_json(&format!(
            "{API_PREFIX}/workflow?q={}&page={page}&per_page={WORKFLOWS_PER_PAGE}",
            enc(q.unwrap_or_default())
        ))
    }

    /// Most recent runs of a workflow.
    pub fn workflow_runs(&self, id: &str) -> Pending<Vec<Run>> {
        self.get_json::<RunList>(&format!(
            "{API_PREFIX}/run?per_page={WORKFLOW_RUNS_PER_PAGE}&workflow={}",
            enc(id)
        ))
        .then(|list| list.results)
    }

    pub fn list_operators(&self) -> Pending<Vec<Operator>> {
        self.get_json(&format!("{API_PREFIX}/operator"))
    }

    // ─── Jobs ────────────────────────────────────────────────────────────────

    pub fn list_jobs(&self, page: u32, per_page: u32, label_selector: Option<&str>) -> Pending<JobList> {
        self.get_json(&jobs_path(page, per_page, label_selector))
    }

    pub fn get_job(&self, name: &str) -> Pending<Job> {
        self.get_json(&format!("{API_PREFIX}/jobs/{}", enc(name)))
    }
}

impl JobsApi for Client {
    fn list_jobs(&self, page: u32, label_selector: Option<&str>) -> Pending<JobList> {
        Client::list_jobs(self, page, self.per_page(), label_selector)
    }

    fn get_job(&self, name: &str) -> Pending<Job> {
        Client::get_job(self, name)
    }
}
