//! Build/deploy lifecycle for Foundry jobs
//!
//! Turns a job specification into a runnable container image and a running
//! pod:
//!
//! - [`state`] - the build state machine and its pure transition function
//! - [`job`] - the job model and build-option merging
//! - [`machine`] - the build driver: deploy, watch loop, builder status
//! - [`podspec`] - pure translation of a job spec into a cluster pod spec
//!
//! The per-job build state is the only entity this crate authoritatively
//! advances; runtime resources are observed, never owned.

pub mod job;
pub mod machine;
pub mod podspec;
pub mod state;

pub use job::{BuildOptions, Job, JobMetadata, JobSpec, JobStatus};
pub use machine::{
    BuildDriver, BuildRequest, BuildResult, DeployOpts, DeployOutcome, ImageBuilder, JobStore,
    LaunchOutcome, RemoteBuildResponse, RemoteBuilder, WatchOutcome,
};
pub use podspec::{build_pod, build_pod_spec};
pub use state::{BuildState, Transition};
