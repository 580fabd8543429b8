//! List/delete orchestration over collector and authorization filter
//!
//! The aggregator answers the two read/delete operations of the produced
//! interface. Disallowed projects are silently excluded from list responses
//! (their existence must not leak), while a delete that would touch any
//! disallowed project fails outright: either the caller's whole matching
//! scope is actionable, or nothing is deleted.

use std::sync::Arc;

use tracing::info;

use foundry_common::auth::{AuthAction, Caller, PermissionDecider};
use foundry_common::config::FoundryConfig;
use foundry_common::labels::project_scope_clause;
use foundry_common::{Error, Result, PROJECT_WILDCARD};

use crate::cluster::ClusterApi;
use crate::collector::RuntimeResourceCollector;
use crate::filter::{AllowedProjectsSnapshot, AuthorizationFilter};
use crate::resources::{restrict_to_projects, shape_output, GroupBy, GroupedByProjectOutput, ListOutput};

/// Parameters of a delete operation beyond its filter scope
#[derive(Clone, Copy, Debug, Default)]
pub struct DeleteOptions {
    /// Delete pods in non-terminal phases too
    pub force: bool,
    /// Grace period override (seconds); the configured default applies when
    /// absent
    pub grace_period: Option<u32>,
    /// Return the pre-delete grouped-by-project view of the acted-upon scope
    pub want_body: bool,
}

/// Orchestrates collector reads and authorization filtering for list and
/// delete requests
pub struct RuntimeResourceAggregator {
    collector: RuntimeResourceCollector,
    filter: AuthorizationFilter,
    cluster: Arc<dyn ClusterApi>,
    decider: Arc<dyn PermissionDecider>,
    config: FoundryConfig,
}

impl RuntimeResourceAggregator {
    /// Create an aggregator over the given cluster API and permission decider
    pub fn new(
        cluster: Arc<dyn ClusterApi>,
        decider: Arc<dyn PermissionDecider>,
        config: FoundryConfig,
    ) -> Self {
        Self {
            collector: RuntimeResourceCollector::new(cluster.clone(), config.clone()),
            filter: AuthorizationFilter::new(decider.clone()),
            cluster,
            decider,
            config,
        }
    }

    /// List runtime resources, shaped by the requested grouping
    ///
    /// A concrete project scope is gated on read access before any cluster
    /// read. Disallowed projects are silently excluded; non-project resources
    /// are included whenever present, independent of project permissions.
    pub async fn list(
        &self,
        caller: &Caller,
        project: &str,
        extra_selector: Option<&str>,
        kind: Option<&str>,
        object_id: Option<&str>,
        group_by: Option<GroupBy>,
    ) -> Result<ListOutput> {
        let snapshot = self
            .allowed_projects(caller, project, extra_selector, kind, object_id, AuthAction::Read)
            .await?;
        Ok(shape_output(
            &snapshot.grouped,
            &snapshot.included_projects(),
            group_by,
        ))
    }

    /// Delete runtime resources matching the filter scope
    ///
    /// All-or-nothing across projects: if any project the caller cannot
    /// delete from would match, nothing is deleted and the request fails with
    /// AccessDenied. The two deletion calls (project-scoped, then
    /// non-project) are not transactional; a fault in the second does not
    /// roll back the first.
    pub async fn delete(
        &self,
        caller: &Caller,
        project: &str,
        extra_selector: Option<&str>,
        kind: Option<&str>,
        object_id: Option<&str>,
        options: DeleteOptions,
    ) -> Result<Option<GroupedByProjectOutput>> {
        let snapshot = self
            .allowed_projects(caller, project, extra_selector, kind, object_id, AuthAction::Delete)
            .await?;

        if snapshot.not_allowed_projects_exist {
            // Failing the whole request both avoids leaking the existence of
            // unseen projects and forbids partial bulk deletion.
            return Err(Error::access_denied(
                "access denied to one or more runtime resources",
            ));
        }

        let grace_period = options
            .grace_period
            .unwrap_or(self.config.deletion_grace_period);

        if !snapshot.allowed.is_empty() {
            let selector = self
                .collector
                .selector(PROJECT_WILDCARD, kind, object_id, extra_selector)?
                .raw(project_scope_clause(&snapshot.allowed));
            let deleted = self
                .cluster
                .delete_pods(&selector.to_string(), options.force, grace_period)
                .await?;
            info!(
                caller = %caller.user,
                projects = snapshot.allowed.len(),
                deleted,
                "deleted project-scoped runtime resources"
            );
        }

        if snapshot.non_project_resources_exist {
            // Second pass without the project restriction picks up resources
            // that carry no project label at all.
            let selector = self
                .collector
                .selector(PROJECT_WILDCARD, kind, object_id, extra_selector)?;
            let deleted = self
                .cluster
                .delete_pods(&selector.to_string(), options.force, grace_period)
                .await?;
            info!(caller = %caller.user, deleted, "deleted non-project runtime resources");
        }

        if options.want_body {
            Ok(Some(restrict_to_projects(
                &snapshot.grouped,
                &snapshot.included_projects(),
            )))
        } else {
            Ok(None)
        }
    }

    /// Gate a concrete project scope, read the cluster, and filter the
    /// observed projects for the given action
    async fn allowed_projects(
        &self,
        caller: &Caller,
        project: &str,
        extra_selector: Option<&str>,
        kind: Option<&str>,
        object_id: Option<&str>,
        action: AuthAction,
    ) -> Result<AllowedProjectsSnapshot> {
        if project != PROJECT_WILDCARD {
            // Read access to the named project as a whole, checked before any
            // cluster read; the per-action decision happens in the filter.
            let allowed = self
                .decider
                .check_project(project, AuthAction::Read, caller)
                .await?;
            if !allowed {
                return Err(Error::access_denied("access denied to the requested project"));
            }
        }

        let grouped = self
            .collector
            .list(project, kind, object_id, extra_selector)
            .await?;
        self.filter.allowed_projects(grouped, action, caller).await
    }
}

// Scenario coverage for the aggregator lives in tests/aggregator.rs, driven
// through hand-written cluster and decider fakes.
