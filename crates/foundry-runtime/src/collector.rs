//! Runtime resource collection
//!
//! One collector call is one fresh cluster snapshot: build the label selector
//! conjunction, enumerate matching pods, group by project and kind. No
//! pagination state, no cache, no internal retry.

use std::sync::Arc;

use tracing::debug;

use foundry_common::config::FoundryConfig;
use foundry_common::labels::{Selector, KIND_LABEL, PROJECT_LABEL, UID_LABEL};
use foundry_common::{Error, Result, PROJECT_WILDCARD};

use crate::cluster::ClusterApi;
use crate::handler::handler_for_kind;
use crate::resources::{group_by_project, GroupedByProjectOutput, RuntimeResource};

/// Queries the cluster for resources matching a selector and groups the raw
/// list by project and kind
pub struct RuntimeResourceCollector {
    cluster: Arc<dyn ClusterApi>,
    config: FoundryConfig,
}

impl RuntimeResourceCollector {
    /// Create a collector over the given cluster API
    pub fn new(cluster: Arc<dyn ClusterApi>, config: FoundryConfig) -> Self {
        Self { cluster, config }
    }

    /// Build the selector conjunction for a read or deletion scope
    ///
    /// An absent filter component contributes no clause. The wildcard project
    /// sentinel adds no project clause, admitting non-project resources.
    pub(crate) fn selector(
        &self,
        project: &str,
        kind: Option<&str>,
        object_id: Option<&str>,
        extra_selector: Option<&str>,
    ) -> Result<Selector> {
        let mut selector = Selector::new().raw(self.config.base_selector.clone());

        match kind {
            Some(kind) => {
                let handler = handler_for_kind(kind).ok_or_else(|| {
                    Error::invalid_request(format!("unknown runtime kind: {}", kind))
                })?;
                selector = selector.eq(KIND_LABEL, handler.kind());
                if let Some(object_id) = object_id {
                    selector = selector.raw(handler.object_selector(object_id));
                }
            }
            None => {
                if let Some(object_id) = object_id {
                    selector = selector.eq(UID_LABEL, object_id);
                }
            }
        }

        if let Some(extra) = extra_selector {
            selector = selector.raw(extra);
        }
        if project != PROJECT_WILDCARD {
            selector = selector.eq(PROJECT_LABEL, project);
        }
        Ok(selector)
    }

    /// Take one point-in-time snapshot of matching resources, grouped by
    /// project and kind
    pub async fn list(
        &self,
        project: &str,
        kind: Option<&str>,
        object_id: Option<&str>,
        extra_selector: Option<&str>,
    ) -> Result<GroupedByProjectOutput> {
        let selector = self.selector(project, kind, object_id, extra_selector)?;
        let records = self.cluster.list_pods(&selector.to_string()).await?;
        debug!(
            selector = %selector,
            count = records.len(),
            "collected runtime resources"
        );

        let resources = records
            .into_iter()
            .map(|record| {
                let resolved_kind = record
                    .labels
                    .get(KIND_LABEL)
                    .map(String::as_str)
                    .or(kind)
                    .unwrap_or("unknown")
                    .to_string();
                RuntimeResource {
                    name: record.name,
                    kind: resolved_kind,
                    labels: record.labels,
                    status: record.phase,
                }
            })
            .collect();
        Ok(group_by_project(resources))
    }
}
