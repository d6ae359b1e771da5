//! accio-client: talks to the Accio gateway.
//!
//! [`Client`] issues requests and hands back cancellable [`Pending`] results.
//! [`Mount`] keeps a view's load state in sync with the gateway, and
//! [`thunks`] feed the job store.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod mount;
pub mod pending;
pub mod thunks;
pub mod transport;
pub mod views;

pub use api::{Classifier, JobsApi};
pub use auth::TokenStore;
pub use config::ClientConfig;
pub use error::ClientError;
pub use mount::{Mount, Refresh};
pub use pending::{CancelHandle, Pending};
pub use transport::{Client, Credentials, Payload, RequestOptions};
pub use views::LogTarget;
