//! Load-state machine owned by a single view.
//!
//! A container moves `Idle -> Loading -> Loaded | Failed` and back to
//! `Loading` whenever its identity (id, filter, page) changes or a poll
//! fires. Every request gets a [`Ticket`]; a response is applied only if its
//! ticket is still the latest one and the container is still mounted, so a
//! slow response for an old identity can never overwrite fresher state.

use serde::Serialize;

/// Error shown to the user in place of the content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureNotice {
    /// HTTP status of the failed response, when there was one.
    pub status: Option<u16>,
    pub message: String,
}

impl FailureNotice {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Static notice displayed for a failed load of `what`.
    pub fn title(what: &str) -> String {
        format!("An error occurred while loading {what}.")
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum LoadState<T> {
    #[default]
    Idle,
    Loading,
    Loaded(T),
    Failed(FailureNotice),
}

impl<T> LoadState<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, LoadState::Loading)
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            LoadState::Loaded(data) => Some(data),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&FailureNotice> {
        match self {
            LoadState::Failed(notice) => Some(notice),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LoadState::Idle => "idle",
            LoadState::Loading => "loading",
            LoadState::Loaded(_) => "loaded",
            LoadState::Failed(_) => "failed",
        }
    }
}

/// Proof that a request was issued by a container at a given generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Applied,
    /// A newer request was issued since this ticket.
    Stale,
    /// The container was torn down.
    TornDown,
}

#[derive(Debug)]
pub struct Container<K, T> {
    identity: Option<K>,
    generation: u64,
    state: LoadState<T>,
    torn_down: bool,
}

impl<K, T> Default for Container<K, T> {
    fn default() -> Self {
        Self {
            identity: None,
            generation: 0,
            state: LoadState::Idle,
            torn_down: false,
        }
    }
}

impl<K: PartialEq, T> Container<K, T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &LoadState<T> {
        &self.state
    }

    pub fn identity(&self) -> Option<&K> {
        self.identity.as_ref()
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Whether `identity` differs from the one currently loaded.
    pub fn needs_reload(&self, identity: &K) -> bool {
        self.identity.as_ref() != Some(identity)
    }

    /// Starts a request for `identity`; any previously issued ticket is
    /// invalidated.
    pub fn request(&mut self, identity: K) -> Ticket {
        self.generation += 1;
        self.identity = Some(identity);
        if !self.torn_down {
            self.state = LoadState::Loading;
        }
        Ticket {
            generation: self.generation,
        }
    }

    pub fn resolve(&mut self, ticket: Ticket, result: Result<T, FailureNotice>) -> Resolution {
        if self.torn_down {
            return Resolution::TornDown;
        }
        if ticket.generation != self.generation {
            return Resolution::Stale;
        }
        self.state = match result {
            Ok(data) => LoadState::Loaded(data),
            Err(notice) => LoadState::Failed(notice),
        };
        Resolution::Applied
    }

    pub fn teardown(&mut self) {
        self.torn_down = true;
    }
}
