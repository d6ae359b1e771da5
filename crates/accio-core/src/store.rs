//! Normalized cache of jobs plus the paginated job list.
//!
//! State is only mutated by [`reduce`], driven by dispatched [`Action`]s. The
//! list slice stores job names; rows are resolved through the entity cache so
//! that a single job update is visible to every view that references it.

use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;

use crate::models::Job;

/// Number of jobs requested per page.
pub const JOBS_PER_PAGE: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadStatus {
    Pending,
    Loading,
    Loaded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobListState {
    pub status: LoadStatus,
    pub total_count: u64,
    pub page: u32,
    pub label_selector: Option<String>,
    pub ids: Vec<String>,
}

impl JobListState {
    /// Whether a response for `page` and `label_selector` answers the latest
    /// list request.
    pub fn is_current(&self, page: u32, label_selector: Option<&str>) -> bool {
        self.page == page && self.label_selector.as_deref() == label_selector
    }
}

impl Default for JobListState {
    fn default() -> Self {
        Self {
            status: LoadStatus::Pending,
            total_count: 0,
            page: 1,
            label_selector: None,
            ids: vec![],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct JobsState {
    pub status: HashMap<String, LoadStatus>,
    pub entities: HashMap<String, Job>,
    pub list: JobListState,
}

impl JobsState {
    /// Jobs of the current page, in list order.
    pub fn rows(&self) -> Vec<&Job> {
        self.list
            .ids
            .iter()
            .filter_map(|name| self.entities.get(name))
            .collect()
    }

    pub fn job(&self, name: &str) -> Option<&Job> {
        self.entities.get(name)
    }

    pub fn job_status(&self, name: &str) -> Option<LoadStatus> {
        self.status.get(name).copied()
    }

    /// A loaded job in a completed state will never change again.
    pub fn is_cached_terminal(&self, name: &str) -> bool {
        self.job_status(name) == Some(LoadStatus::Loaded)
            && self.entities.get(name).is_some_and(Job::is_completed)
    }

    fn set_status(&mut self, name: &str, status: LoadStatus) {
        self.status.insert(name.to_string(), status);
    }

    fn merge(&mut self, jobs: &[Job]) {
        for job in jobs {
            self.set_status(&job.name, LoadStatus::Loaded);
            self.entities.insert(job.name.clone(), job.clone());
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    FetchJobsRequest {
        page: u32,
        label_selector: Option<String>,
    },
    FetchJobsSuccess {
        page: u32,
        label_selector: Option<String>,
        jobs: Vec<Job>,
        total_count: u64,
    },
    FetchJobsFailed {
        page: u32,
        label_selector: Option<String>,
    },
    GetJobRequest {
        name: String,
    },
    GetJobSuccess {
        job: Job,
    },
    GetJobFailed {
        name: String,
    },
}

impl Action {
    pub fn kind(&self) -> &'static str {
        match self {
            Action::FetchJobsRequest { .. } => "FETCH_JOBS_REQUEST",
            Action::FetchJobsSuccess { .. } => "FETCH_JOBS_SUCCESS",
            Action::FetchJobsFailed { .. } => "FETCH_JOBS_FAILED",
            Action::GetJobRequest { .. } => "GET_JOB_REQUEST",
            Action::GetJobSuccess { .. } => "GET_JOB_SUCCESS",
            Action::GetJobFailed { .. } => "GET_JOB_FAILED",
        }
    }
}

pub fn reduce(state: &mut JobsState, action: Action) {
    match action {
        Action::GetJobRequest { name } => state.set_status(&name, LoadStatus::Loading),
        Action::GetJobSuccess { job } => state.merge(std::slice::from_ref(&job)),
        Action::GetJobFailed { name } => state.set_status(&name, LoadStatus::Failed),
        Action::FetchJobsRequest {
            page,
            label_selector,
        } => {
            state.list.status = LoadStatus::Loading;
            state.list.page = page;
            state.list.label_selector = label_selector;
        }
        Action::FetchJobsSuccess {
            page,
            label_selector,
            jobs,
            total_count,
        } => {
            state.merge(&jobs);
            if !state.list.is_current(page, label_selector.as_deref()) {
                debug!(page, "dropping superseded job list");
                return;
            }
            state.list.total_count = total_count;
            state.list.status = LoadStatus::Loaded;
            state.list.ids = jobs.into_iter().map(|job| job.name).collect();
        }
        Action::FetchJobsFailed {
            page,
            label_selector,
        } => {
            if state.list.is_current(page, label_selector.as_deref()) {
                state.list.status = LoadStatus::Failed;
            }
        }
    }
}

/// Holder of the job state. Every dispatch is logged.
#[derive(Debug, Default)]
pub struct Store {
    state: JobsState,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: JobsState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &JobsState {
        &self.state
    }

    pub fn dispatch(&mut self, action: Action) {
        let kind = action.kind();
        reduce(&mut self.state, action);
        debug!(
            action = kind,
            list_status = ?self.state.list.status,
            entities = self.state.entities.len(),
            "dispatched"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{JobState, JobStatus};
    use chrono::Utc;

    fn job(name: &str, state: JobState) -> Job {
        Job {
            name: name.to_string(),
            labels: Default::default(),
            status: JobStatus {
                state,
                time: Utc::now(),
                message: None,
            },
            progress: 0.0,
            history: vec![],
        }
    }

    #[test]
    fn test_fetch_jobs_cycle() {
        let mut store = Store::new();
        assert_eq!(store.state().list.status, LoadStatus::Pending);

        store.dispatch(Action::FetchJobsRequest {
            page: 2,
            label_selector: Some("env=prod".to_string()),
        });
        assert_eq!(store.state().list.status, LoadStatus::Loading);
        assert_eq!(store.state().list.page, 2);

        store.dispatch(Action::FetchJobsSuccess {
            page: 2,
            label_selector: Some("env=prod".to_string()),
            jobs: vec![job("b", JobState::Running), job("a", JobState::Successful)],
            total_count: 42,
        });
        let state = store.state();
        assert_eq!(state.list.ids, vec!["b", "a"]);
        assert_eq!(state.list.total_count, 42);
        assert_eq!(state.list.label_selector.as_deref(), Some("env=prod"));
        assert_eq!(state.job_status("a"), Some(LoadStatus::Loaded));
        let names: Vec<&str> = state.rows().iter().map(|j| j.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn test_entity_update_visible_through_list() {
        let mut store = Store::new();
        store.dispatch(Action::FetchJobsSuccess {
            page: 1,
            label_selector: None,
            jobs: vec![job("a", JobState::Running)],
            total_count: 1,
        });
        store.dispatch(Action::GetJobSuccess {
            job: job("a", JobState::Failed),
        });
        assert_eq!(store.state().rows()[0].status.state, JobState::Failed);
        assert!(store.state().is_cached_terminal("a"));
    }

    #[test]
    fn test_failures_keep_entities() {
        let mut store = Store::new();
        store.dispatch(Action::GetJobSuccess {
            job: job("a", JobState::Successful),
        });
        store.dispatch(Action::GetJobRequest {
            name: "a".to_string(),
        });
        assert!(!store.state().is_cached_terminal("a"));
        store.dispatch(Action::GetJobFailed {
            name: "a".to_string(),
        });
        assert_eq!(store.state().job_status("a"), Some(LoadStatus::Failed));
        assert!(store.state().job("a").is_some());

        store.dispatch(Action::FetchJobsFailed {
            page: 1,
            label_selector: None,
        });
        assert_eq!(store.state().list.status, LoadStatus::Failed);
    }

    #[test]
    fn test_superseded_page_does_not_replace_list() {
        let mut store = Store::new();
        store.dispatch(Action::FetchJobsRequest {
            page: 1,
            label_selector: None,
        });
        store.dispatch(Action::FetchJobsRequest {
            page: 2,
            label_selector: None,
        });
        store.dispatch(Action::FetchJobsSuccess {
            page: 2,
            label_selector: None,
            jobs: vec![job("p2", JobState::Running)],
            total_count: 31,
        });
        store.dispatch(Action::FetchJobsSuccess {
            page: 1,
            label_selector: None,
            jobs: vec![job("p1", JobState::Running)],
            total_count: 30,
        });
        store.dispatch(Action::FetchJobsFailed {
            page: 1,
            label_selector: None,
        });

        let state = store.state();
        assert_eq!(state.list.page, 2);
        assert_eq!(state.list.ids, vec!["p2"]);
        assert_eq!(state.list.total_count, 31);
        assert_eq!(state.list.status, LoadStatus::Loaded);
        assert!(state.job("p1").is_some());
    }

    #[test]
    fn test_label_change_supersedes_same_page() {
        let mut store = Store::new();
        store.dispatch(Action::FetchJobsRequest {
            page: 1,
            label_selector: Some("env=prod".to_string()),
        });
        store.dispatch(Action::FetchJobsSuccess {
            page: 1,
            label_selector: None,
            jobs: vec![job("a", JobState::Running)],
            total_count: 1,
        });
        assert_eq!(store.state().list.status, LoadStatus::Loading);
        assert!(store.state().list.ids.is_empty());
    }

    #[test]
    fn test_running_job_is_not_cached_terminal() {
        let mut store = Store::new();
        store.dispatch(Action::GetJobSuccess {
            job: job("a", JobState::Running),
        });
        assert!(!store.state().is_cached_terminal("a"));
        assert!(!store.state().is_cached_terminal("missing"));
    }
}
