//! Driver that keeps a [`Container`] in sync with the gateway.
//!
//! A [`Mount`] runs one background task per identity. Changing the identity
//! (or forcing a reload) cancels the in-flight request and the poll timer
//! before the next request is issued, and the container's generation ticket
//! rejects any response that still slips through. Once unmounted, nothing is
//! published anymore.

use std::fmt::Debug;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use accio_core::{Container, LoadState, Resolution, Ticket};

use crate::pending::Pending;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

type Fetcher<K, T> = Arc<dyn Fn(&K, Option<&T>) -> Pending<T> + Send + Sync>;
type Until<K, T> = Arc<dyn Fn(&K, &T) -> bool + Send + Sync>;

/// When to fetch again after a response was applied.
pub enum Refresh<K, T> {
    /// Fetch once per identity.
    Once,
    /// Poll every `period` until `until` reports the data as final. Failures
    /// keep polling.
    Every {
        period: Duration,
        until: Option<Until<K, T>>,
    },
}

impl<K, T> Refresh<K, T> {
    pub fn every(period: Duration) -> Self {
        Refresh::Every {
            period,
            until: None,
        }
    }

    pub fn every_until<F>(period: Duration, until: F) -> Self
    where
        F: Fn(&K, &T) -> bool + Send + Sync + 'static,
    {
        Refresh::Every {
            period,
            until: Some(Arc::new(until)),
        }
    }

    fn period(&self) -> Option<Duration> {
        match self {
            Refresh::Once => None,
            Refresh::Every { period, .. } => Some(*period),
        }
    }

    fn is_final(&self, identity: &K, data: &T) -> bool {
        match self {
            Refresh::Once => true,
            Refresh::Every { until, .. } => until.as_ref().is_some_and(|f| f(identity, data)),
        }
    }
}

impl<K, T> Clone for Refresh<K, T> {
    fn clone(&self) -> Self {
        match self {
            Refresh::Once => Refresh::Once,
            Refresh::Every { period, until } => Refresh::Every {
                period: *period,
                until: until.clone(),
            },
        }
    }
}

struct Shared<K, T> {
    container: Mutex<Container<K, T>>,
    tx: watch::Sender<LoadState<T>>,
}

impl<K: PartialEq, T: Clone> Shared<K, T> {
    fn lock(&self) -> MutexGuard<'_, Container<K, T>> {
        self.container.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, container: &Container<K, T>) {
        self.tx.send_replace(container.state().clone());
    }
}

struct Task {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct Mount<K, T> {
    what: &'static str,
    shared: Arc<Shared<K, T>>,
    rx: watch::Receiver<LoadState<T>>,
    fetcher: Fetcher<K, T>,
    refresh: Refresh<K, T>,
    identity: K,
    task: Option<Task>,
}

impl<K, T> Mount<K, T>
where
    K: Clone + PartialEq + Debug + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// Starts loading `identity`. `what` names the content in failure notices.
    pub fn spawn<F>(identity: K, what: &'static str, fetcher: F, refresh: Refresh<K, T>) -> Self
    where
        F: Fn(&K, Option<&T>) -> Pending<T> + Send + Sync + 'static,
    {
        let (tx, rx) = watch::channel(LoadState::Idle);
        let mut mount = Self {
            what,
            shared: Arc::new(Shared {
                container: Mutex::new(Container::new()),
                tx,
            }),
            rx,
            fetcher: Arc::new(fetcher),
            refresh,
            identity,
            task: None,
        };
        mount.restart();
        mount
    }

    pub fn identity(&self) -> &K {
        &self.identity
    }

    pub fn state(&self) -> LoadState<T> {
        self.rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<LoadState<T>> {
        self.rx.clone()
    }

    /// Every published state, starting with the current one.
    pub fn changes(&self) -> WatchStream<LoadState<T>> {
        WatchStream::new(self.rx.clone())
    }

    /// Waits until the current load has settled.
    pub async fn settled(&self) -> LoadState<T> {
        let mut rx = self.rx.clone();
        let outcome = rx
            .wait_for(|s| matches!(s, LoadState::Loaded(_) | LoadState::Failed(_)))
            .await
            .map(|s| s.clone());
        match outcome {
            Ok(state) => state,
            Err(_) => self.state(),
        }
    }

    /// Whether the background task has stopped on its own.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |t| t.handle.is_finished())
    }

    /// Switches to `identity`; a no-op when it is already loaded.
    pub fn set_identity(&mut self, identity: K) {
        if identity == self.identity {
            return;
        }
        self.identity = identity;
        self.restart();
    }

    /// Discards the current load and fetches the same identity again.
    pub fn reload(&mut self) {
        self.restart();
    }

    /// Stops polling and waits for the background task to exit.
    pub async fn unmount(mut self) {
        if let Some(task) = self.stop() {
            if let Err(e) = task.handle.await {
                warn!(what = self.what, error = %e, "mount task ended abnormally");
            }
        }
    }

    fn stop(&mut self) -> Option<Task> {
        let task = self.task.take();
        if let Some(task) = &task {
            task.token.cancel();
        }
        self.shared.lock().teardown();
        task
    }

    fn restart(&mut self) {
        if let Some(previous) = self.task.take() {
            previous.token.cancel();
        }
        let ticket = {
            let mut container = self.shared.lock();
            let ticket = container.request(self.identity.clone());
            self.shared.publish(&container);
            ticket
        };
        debug!(what = self.what, identity = ?self.identity, "loading");

        let token = CancellationToken::new();
        let handle = tokio::spawn(drive(
            Driver {
                what: self.what,
                identity: self.identity.clone(),
                shared: self.shared.clone(),
                fetcher: self.fetcher.clone(),
                refresh: self.refresh.clone(),
                token: token.clone(),
            },
            ticket,
        ));
        self.task = Some(Task { token, handle });
    }
}

impl<K, T> Drop for Mount<K, T> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.token.cancel();
        }
    }
}

struct Driver<K, T> {
    what: &'static str,
    identity: K,
    shared: Arc<Shared<K, T>>,
    fetcher: Fetcher<K, T>,
    refresh: Refresh<K, T>,
    token: CancellationToken,
}

async fn drive<K, T>(driver: Driver<K, T>, first: Ticket)
where
    K: Clone + PartialEq + Debug + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    let Driver {
        what,
        identity,
        shared,
        fetcher,
        refresh,
        token,
    } = driver;
    let mut previous: Option<T> = None;
    let mut ticket = first;

    loop {
        let pending = fetcher(&identity, previous.as_ref());
        let cancel = pending.cancel_handle();
        let settled = tokio::select! {
            _ = token.cancelled() => {
                cancel.cancel();
                return;
            }
            settled = pending => settled,
        };
        let Some(result) = settled else {
            return;
        };

        let is_final = match &result {
            Ok(data) => refresh.is_final(&identity, data),
            Err(_) => refresh.period().is_none(),
        };
        let result = match result {
            Ok(data) => {
                previous = Some(data.clone());
                Ok(data)
            }
            Err(e) => {
                warn!(what, identity = ?identity, error = %e, "load failed");
                Err(e.notice(what))
            }
        };

        {
            let mut container = shared.lock();
            if token.is_cancelled() {
                return;
            }
            match container.resolve(ticket, result) {
                Resolution::Applied => shared.publish(&container),
                Resolution::Stale | Resolution::TornDown => return,
            }
        }

        let Some(period) = refresh.period().filter(|_| !is_final) else {
            debug!(what, identity = ?identity, "load complete");
            return;
        };
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(period) => {}
        }

        let mut container = shared.lock();
        if token.is_cancelled() || container.is_torn_down() {
            return;
        }
        ticket = container.request(identity.clone());
        shared.publish(&container);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn delayed<T: Send + 'static>(value: T, ms: u64) -> Pending<T> {
        Pending::spawn(async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(value)
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_once_loads_and_stops() {
        let mount = Mount::spawn(
            7u32,
            "run",
            |id: &u32, _: Option<&String>| delayed(format!("run {id}"), 10),
            Refresh::Once,
        );
        assert!(mount.state().is_loading());
        assert_eq!(mount.settled().await.data().map(String::as_str), Some("run 7"));
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(mount.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_response_for_old_identity_is_dropped() {
        let mut mount = Mount::spawn(
            42u32,
            "run",
            |id: &u32, _: Option<&String>| {
                let ms = if *id == 42 { 500 } else { 10 };
                delayed(format!("run {id}"), ms)
            },
            Refresh::Once,
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
        mount.set_identity(43);
        assert_eq!(mount.settled().await.data().map(String::as_str), Some("run 43"));

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(mount.state().data().map(String::as_str), Some("run 43"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_identity_is_not_refetched() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let mut mount = Mount::spawn(
            1u32,
            "run",
            move |_: &u32, _: Option<&u32>| {
                seen.fetch_add(1, Ordering::SeqCst);
                delayed(1, 1)
            },
            Refresh::Once,
        );
        mount.settled().await;
        mount.set_identity(1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        mount.reload();
        mount.settled().await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_accumulates_until_final() {
        let mount = Mount::spawn(
            "logs".to_string(),
            "logs",
            |_: &String, previous: Option<&Vec<u32>>| {
                let mut lines = previous.cloned().unwrap_or_default();
                lines.push(lines.len() as u32);
                delayed(lines, 1)
            },
            Refresh::every_until(Duration::from_secs(10), |_: &String, lines: &Vec<u32>| {
                lines.len() >= 3
            }),
        );
        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(mount.state().data(), Some(&vec![0, 1, 2]));
        assert!(mount.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_survives_failures() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let mount = Mount::spawn(
            0u8,
            "run",
            move |_: &u8, _: Option<&usize>| {
                let n = seen.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    Pending::ready(Err(ClientError::Http {
                        status: 503,
                        message: "Service Unavailable".into(),
                    }))
                } else {
                    Pending::ready(Ok(n))
                }
            },
            Refresh::every(Duration::from_secs(10)),
        );
        let failed = mount.settled().await;
        let notice = failed.failure().unwrap();
        assert_eq!(notice.status, Some(503));
        assert_eq!(notice.message, "An error occurred while loading run.");

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(mount.state().data(), Some(&1));
        assert!(!mount.is_finished());
        mount.unmount().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmount_stops_updates() {
        let mount = Mount::spawn(
            0u8,
            "run",
            |_: &u8, _: Option<&u8>| delayed(1, 100),
            Refresh::Once,
        );
        let rx = mount.subscribe();
        mount.unmount().await;
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(rx.borrow().is_loading());
    }
}
