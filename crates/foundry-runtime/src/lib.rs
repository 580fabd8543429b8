//! Runtime resource aggregation for Foundry
//!
//! Reconciles live cluster state (labeled pods) against logical ownership
//! (projects, jobs, kinds) under partial-permission visibility:
//!
//! - [`cluster`] - cluster API boundary (trait + kube-backed implementation)
//! - [`resources`] - point-in-time resource snapshots and their groupings
//! - [`handler`] - per-kind capability interface over execution substrates
//! - [`collector`] - label-selector reads grouped by project and kind
//! - [`filter`] - authorization filtering of observed projects
//! - [`aggregator`] - list/delete orchestration with group-by shaping
//!
//! Every request re-derives current truth: there is no cache between the
//! aggregator and either the cluster or the permission service.

pub mod aggregator;
pub mod cluster;
pub mod collector;
pub mod filter;
pub mod handler;
pub mod resources;

pub use aggregator::RuntimeResourceAggregator;
pub use cluster::{ClusterApi, KubeClusterApi, PodPhase, PodRecord};
pub use collector::RuntimeResourceCollector;
pub use filter::{AllowedProjectsSnapshot, AuthorizationFilter};
pub use handler::RuntimeHandler;
pub use resources::{
    GroupBy, GroupedByJobOutput, GroupedByProjectOutput, KindRuntimeResources, ListOutput,
    RuntimeResource,
};
