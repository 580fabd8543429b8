//! Cluster API boundary
//!
//! The aggregation and build paths consume the cluster through [`ClusterApi`]
//! only. [`KubeClusterApi`] is the production implementation over kube-rs;
//! tests substitute hand-written fakes.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, DeleteParams, ListParams, LogParams, PostParams};
use kube::{Client, ResourceExt};
use tracing::{debug, info, warn};

use foundry_common::config::FoundryConfig;
use foundry_common::{Error, Result};

/// Pod phase as reported by the cluster
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PodPhase {
    /// Scheduled but not yet running
    Pending,
    /// At least one container is running
    Running,
    /// All containers terminated successfully
    Succeeded,
    /// At least one container terminated in failure
    Failed,
    /// Phase could not be obtained or was not recognized
    Unknown,
}

impl PodPhase {
    /// Parse the cluster's phase string, case-insensitively
    pub fn parse(phase: &str) -> Self {
        match phase.to_ascii_lowercase().as_str() {
            "pending" => PodPhase::Pending,
            "running" => PodPhase::Running,
            "succeeded" => PodPhase::Succeeded,
            "failed" => PodPhase::Failed,
            _ => PodPhase::Unknown,
        }
    }

    /// True for phases no pod ever leaves
    pub fn is_terminal(&self) -> bool {
        matches!(self, PodPhase::Succeeded | PodPhase::Failed)
    }
}

/// Raw pod observation returned by a cluster read
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PodRecord {
    /// Pod name
    pub name: String,
    /// Pod labels
    pub labels: BTreeMap<String, String>,
    /// Pod phase string, when reported
    pub phase: Option<String>,
    /// Whether the pod already has a deletion timestamp
    pub terminating: bool,
}

/// Low-level cluster operations consumed by the collector, aggregator, and
/// build driver
///
/// Reads are single point-in-time enumerations; no state is retained across
/// calls. Transport faults surface as retryable [`Error::Cluster`] values and
/// are never retried here - retry policy belongs to the caller.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Enumerate pods matching a label selector
    async fn list_pods(&self, selector: &str) -> Result<Vec<PodRecord>>;

    /// Delete pods matching a label selector, best-effort per pod
    ///
    /// Pods already gone or already terminating are skipped silently. Without
    /// `force`, pods still in a non-terminal phase are left alone (deletion is
    /// cleanup of finished work unless forced). A transport fault aborts the
    /// remainder of the call; already-issued deletions are not rolled back.
    /// Returns the number of deletions issued.
    async fn delete_pods(&self, selector: &str, force: bool, grace_period: u32) -> Result<usize>;

    /// Create a pod, returning its name
    async fn create_pod(&self, pod: Pod) -> Result<String>;

    /// Read a single pod's phase
    async fn pod_phase(&self, name: &str) -> Result<PodPhase>;

    /// Follow a pod until it reaches a terminal phase
    async fn watch_pod(&self, name: &str) -> Result<PodPhase>;

    /// Fetch a pod's log text
    async fn pod_logs(&self, name: &str) -> Result<String>;
}

/// Production [`ClusterApi`] over kube-rs, scoped to one namespace
#[derive(Clone)]
pub struct KubeClusterApi {
    client: Client,
    namespace: String,
    phase_poll_interval: Duration,
}

impl KubeClusterApi {
    /// Create a cluster API bound to the configured namespace
    pub fn new(client: Client, config: &FoundryConfig) -> Self {
        Self {
            client,
            namespace: config.namespace.clone(),
            phase_poll_interval: config.phase_poll_interval,
        }
    }

    fn pods(&self) -> Api<Pod> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn list_params(selector: &str) -> ListParams {
        if selector.is_empty() {
            ListParams::default()
        } else {
            ListParams::default().labels(selector)
        }
    }
}

fn record_from_pod(pod: &Pod) -> PodRecord {
    PodRecord {
        name: pod.name_any(),
        labels: pod.metadata.labels.clone().unwrap_or_default(),
        phase: pod.status.as_ref().and_then(|s| s.phase.clone()),
        terminating: pod.metadata.deletion_timestamp.is_some(),
    }
}

#[async_trait]
impl ClusterApi for KubeClusterApi {
    async fn list_pods(&self, selector: &str) -> Result<Vec<PodRecord>> {
        let pods = self.pods().list(&Self::list_params(selector)).await?;
        debug!(selector = %selector, count = pods.items.len(), "listed runtime pods");
        Ok(pods.items.iter().map(record_from_pod).collect())
    }

    async fn delete_pods(&self, selector: &str, force: bool, grace_period: u32) -> Result<usize> {
        let api = self.pods();
        let pods = api.list(&Self::list_params(selector)).await?;
        let params = DeleteParams {
            grace_period_seconds: Some(grace_period),
            ..Default::default()
        };

        let mut deleted = 0usize;
        for pod in &pods.items {
            let record = record_from_pod(pod);
            if record.terminating {
                continue;
            }
            let phase = record
                .phase
                .as_deref()
                .map(PodPhase::parse)
                .unwrap_or(PodPhase::Unknown);
            if !force && !phase.is_terminal() {
                continue;
            }
            match api.delete(&record.name, &params).await {
                Ok(_) => deleted += 1,
                // Already gone between the list and the delete
                Err(kube::Error::Api(ae)) if ae.code == 404 => {
                    debug!(pod = %record.name, "pod vanished before deletion");
                }
                Err(e) => {
                    warn!(pod = %record.name, error = %e, "pod deletion aborted");
                    return Err(e.into());
                }
            }
        }
        info!(selector = %selector, deleted, "deleted runtime pods");
        Ok(deleted)
    }

    async fn create_pod(&self, pod: Pod) -> Result<String> {
        let created = self.pods().create(&PostParams::default(), &pod).await?;
        Ok(created.name_any())
    }

    async fn pod_phase(&self, name: &str) -> Result<PodPhase> {
        match self.pods().get(name).await {
            Ok(pod) => Ok(pod
                .status
                .and_then(|s| s.phase)
                .map(|p| PodPhase::parse(&p))
                .unwrap_or(PodPhase::Unknown)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                Err(Error::not_found(format!("pod {} not found", name)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn watch_pod(&self, name: &str) -> Result<PodPhase> {
        loop {
            let phase = self.pod_phase(name).await?;
            if phase.is_terminal() {
                return Ok(phase);
            }
            tokio::time::sleep(self.phase_poll_interval).await;
        }
    }

    async fn pod_logs(&self, name: &str) -> Result<String> {
        Ok(self.pods().logs(name, &LogParams::default()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_parsing_is_case_insensitive() {
        assert_eq!(PodPhase::parse("Succeeded"), PodPhase::Succeeded);
        assert_eq!(PodPhase::parse("failed"), PodPhase::Failed);
        assert_eq!(PodPhase::parse("RUNNING"), PodPhase::Running);
        assert_eq!(PodPhase::parse("ContainerCreating"), PodPhase::Unknown);
    }

    #[test]
    fn only_succeeded_and_failed_are_terminal() {
        assert!(PodPhase::Succeeded.is_terminal());
        assert!(PodPhase::Failed.is_terminal());
        assert!(!PodPhase::Pending.is_terminal());
        assert!(!PodPhase::Running.is_terminal());
        assert!(!PodPhase::Unknown.is_terminal());
    }
}
