//! accio-core: data model and client-side state for the Accio gateway.
//!
//! Nothing in this crate touches the network. It holds the typed entities the
//! gateway returns, the pure functions that derive a displayed status from
//! them, the load-state machine each view owns, and the normalized job store.

pub mod container;
pub mod error;
pub mod format;
pub mod models;
pub mod status;
pub mod store;

pub use container::{Container, FailureNotice, LoadState, Resolution, Ticket};
pub use error::AccioError;
pub use models::{Job, JobState, NodeState, NodeStatus, Run, RunDetail, RunState, RunStatus, Workflow};
pub use status::{describe_job, describe_node, describe_run, StatusDisplay, StatusLabel};
pub use store::{Action, JobsState, LoadStatus, Store};
