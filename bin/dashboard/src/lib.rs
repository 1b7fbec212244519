//! switchboard dashboard.
//!
//! Command-line front end over `switchboard-integration`: lists the known
//! integrations, runs the connect/disconnect actions, completes OAuth
//! redirects, and prints fetched items.

pub mod cli;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod render;

pub use dashboard::{AuthStatus, ConnectAction, Dashboard, PageLoad};
