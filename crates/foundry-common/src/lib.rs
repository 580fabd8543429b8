//! Common types for Foundry: errors, label schema, authorization interfaces,
//! configuration, and retry/telemetry utilities
//!
//! Foundry tracks the cluster-native resources (pods) backing logical compute
//! jobs and drives the build-then-run lifecycle that turns a job spec into a
//! running workload. This crate holds everything the runtime and builder
//! crates share.

#![deny(missing_docs)]

pub mod auth;
pub mod config;
pub mod error;
pub mod labels;
pub mod retry;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Project scope sentinel matching every project, including resources that
/// carry no project label at all
pub const PROJECT_WILDCARD: &str = "*";

/// Project key under which resources lacking a project label are grouped
pub const NON_PROJECT_KEY: &str = "";
