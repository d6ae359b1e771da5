//! Async actions that drive the job [`Store`] from the gateway.

use std::sync::{Mutex, MutexGuard};

use tracing::{debug, error};

use accio_core::container::FailureNotice;
use accio_core::store::{Action, LoadStatus, Store};

use crate::api::JobsApi;
use crate::error::ClientError;

fn lock(store: &Mutex<Store>) -> MutexGuard<'_, Store> {
    store.lock().unwrap_or_else(|e| e.into_inner())
}

fn failure(outcome: Option<&ClientError>, what: &str) -> FailureNotice {
    match outcome {
        Some(e) => e.notice(what),
        None => FailureNotice::new(None, FailureNotice::title(what)),
    }
}

/// Loads one page of jobs into the store and returns the resulting list
/// status, which stays `Loading` when a newer request superseded this one.
pub async fn fetch_jobs<A>(
    api: &A,
    store: &Mutex<Store>,
    page: u32,
    label_selector: Option<String>,
) -> Result<LoadStatus, FailureNotice>
where
    A: JobsApi + ?Sized,
{
    lock(store).dispatch(Action::FetchJobsRequest {
        page,
        label_selector: label_selector.clone(),
    });
    let outcome = api.list_jobs(page, label_selector.as_deref()).await;

    let mut store = lock(store);
    match outcome {
        Some(Ok(list)) => {
            store.dispatch(Action::FetchJobsSuccess {
                page,
                label_selector,
                jobs: list.jobs,
                total_count: list.total_count,
            });
            Ok(store.state().list.status)
        }
        other => {
            let error = other.and_then(Result::err);
            if let Some(e) = &error {
                error!(page, error = %e, "failed to fetch jobs");
            }
            store.dispatch(Action::FetchJobsFailed {
                page,
                label_selector,
            });
            Err(failure(error.as_ref(), "jobs"))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GetJob {
    /// Served from the cache without a request.
    Cached,
    Fetched,
    Failed(FailureNotice),
}

/// Loads a single job unless a completed copy is already cached.
pub async fn get_job<A>(api: &A, store: &Mutex<Store>, name: &str) -> GetJob
where
    A: JobsApi + ?Sized,
{
    {
        let mut store = lock(store);
        if store.state().is_cached_terminal(name) {
            debug!(job = name, "job is completed, using cached copy");
            return GetJob::Cached;
        }
        store.dispatch(Action::GetJobRequest {
            name: name.to_string(),
        });
    }

    let outcome = api.get_job(name).await;
    let mut store = lock(store);
    match outcome {
        Some(Ok(job)) => {
            store.dispatch(Action::GetJobSuccess { job });
            GetJob::Fetched
        }
        other => {
            let error = other.and_then(Result::err);
            if let Some(e) = &error {
                error!(job = name, error = %e, "failed to fetch job");
            }
            store.dispatch(Action::GetJobFailed {
                name: name.to_string(),
            });
            GetJob::Failed(failure(error.as_ref(), "job"))
        }
    }
}
