//! Cancellable request handle.
//!
//! A [`Pending`] wraps a request spawned on the tokio runtime. Cancelling it
//! never aborts the network exchange; it only guarantees that neither the
//! result nor any chained continuation is observed afterwards. Awaiting a
//! cancelled `Pending` yields `None`.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use crate::error::{ClientError, Result};

type Settle<T> = Pin<Box<dyn Future<Output = Option<Result<T>>> + Send>>;

/// Shared cancellation flag. Cloning yields a handle to the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[must_use = "a Pending does nothing observable unless awaited"]
pub struct Pending<T> {
    settle: Settle<T>,
    cancel: CancelHandle,
}

impl<T: Send + 'static> Pending<T> {
    /// Spawns `request` and returns a handle to its outcome.
    pub fn spawn<F>(request: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let cancel = CancelHandle::default();
        let task = tokio::spawn(request);
        let flag = cancel.clone();
        let settle = async move {
            let settled = match task.await {
                Ok(result) => result,
                Err(e) => Err(ClientError::Task(e.to_string())),
            };
            (!flag.is_cancelled()).then_some(settled)
        };
        Self {
            settle: Box::pin(settle),
            cancel,
        }
    }

    /// Already-settled outcome; still subject to cancellation.
    pub fn ready(result: Result<T>) -> Self {
        let cancel = CancelHandle::default();
        let flag = cancel.clone();
        let settle = async move { (!flag.is_cancelled()).then_some(result) };
        Self {
            settle: Box::pin(settle),
            cancel,
        }
    }

    /// Maps a successful outcome. `f` is skipped once cancelled.
    pub fn then<U, F>(self, f: F) -> Pending<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.then_try(move |value| Ok(f(value)))
    }

    /// Like [`Pending::then`] but `f` may fail.
    pub fn then_try<U, F>(self, f: F) -> Pending<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Result<U> + Send + 'static,
    {
        let Pending { settle, cancel } = self;
        let flag = cancel.clone();
        let settle = async move {
            let settled = settle.await?;
            if flag.is_cancelled() {
                return None;
            }
            Some(settled.and_then(f))
        };
        Pending {
            settle: Box::pin(settle),
            cancel,
        }
    }

    /// Chains a dependent request issued from the successful outcome.
    pub fn and_then<U, F>(self, f: F) -> Pending<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Pending<U> + Send + 'static,
    {
        let Pending { settle, cancel } = self;
        let flag = cancel.clone();
        let settle = async move {
            let value = match settle.await? {
                Ok(value) => value,
                Err(e) => return Some(Err(e)),
            };
            if flag.is_cancelled() {
                return None;
            }
            let next = f(value).await?;
            (!flag.is_cancelled()).then_some(next)
        };
        Pending {
            settle: Box::pin(settle),
            cancel,
        }
    }

    /// Recovers from a failed outcome. `f` is skipped once cancelled.
    pub fn catch<F>(self, f: F) -> Pending<T>
    where
        F: FnOnce(ClientError) -> Result<T> + Send + 'static,
    {
        let Pending { settle, cancel } = self;
        let flag = cancel.clone();
        let settle = async move {
            let settled = settle.await?;
            if flag.is_cancelled() {
                return None;
            }
            Some(settled.or_else(f))
        };
        Pending {
            settle: Box::pin(settle),
            cancel,
        }
    }
}

impl<T> Pending<T> {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl<T> Future for Pending<T> {
    type Output = Option<Result<T>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.get_mut().settle.as_mut().poll(cx)
    }
}

impl<T> std::fmt::Debug for Pending<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pending")
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}
