//! Core domain types and utilities for switchboard.
//!
//! This crate provides the catalogue of known services, strongly-typed
//! identifiers, and the shared `Result` alias used by the other crates.

pub mod error;
pub mod id;
pub mod service;

pub use error::Result;
pub use id::{FetchId, FlowId, ParseIdError};
pub use service::{ParseServiceError, Service};
