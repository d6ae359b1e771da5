#![doc = include_str!("../../../README.md")]
//!
//! This crate bundles the data model and the gateway client under one name.

pub use accio_core::*;
pub use accio_client as client;
pub use accio_client::{
    views, Classifier, Client, ClientConfig, ClientError, LogTarget, Mount, Pending, Refresh,
};
