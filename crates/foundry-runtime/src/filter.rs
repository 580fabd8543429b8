//! Authorization filtering of observed projects
//!
//! Partitions the projects seen in one collector read into allowed and not
//! allowed for a given caller and action. Computed fresh per request and never
//! cached: authorization and cluster state can both change between calls.

use std::sync::Arc;

use tracing::debug;

use foundry_common::auth::{AuthAction, Caller, PermissionDecider};
use foundry_common::{Result, NON_PROJECT_KEY};

use crate::resources::GroupedByProjectOutput;

/// Authorization view over one grouped cluster read
#[derive(Clone, Debug)]
pub struct AllowedProjectsSnapshot {
    /// Projects the caller may act on (subset of the observed projects)
    pub allowed: Vec<String>,
    /// The full grouped-by-project read the decision was made against
    pub grouped: GroupedByProjectOutput,
    /// Whether resources without any project owner were observed
    pub non_project_resources_exist: bool,
    /// Whether at least one observed project was denied
    pub not_allowed_projects_exist: bool,
}

impl AllowedProjectsSnapshot {
    /// Projects actually acted upon: the allowed set, plus the empty-string
    /// key when non-project resources were observed
    ///
    /// Non-project resources are not subject to the project-permission check;
    /// once visibility is established they are always included.
    pub fn included_projects(&self) -> Vec<String> {
        let mut included = self.allowed.clone();
        if self.non_project_resources_exist {
            included.push(NON_PROJECT_KEY.to_string());
        }
        included
    }
}

/// Partitions observed projects by the external permission decision
pub struct AuthorizationFilter {
    decider: Arc<dyn PermissionDecider>,
}

impl AuthorizationFilter {
    /// Create a filter over the given permission decider
    pub fn new(decider: Arc<dyn PermissionDecider>) -> Self {
        Self { decider }
    }

    /// Compute the authorization view of one grouped read
    ///
    /// The decider only ever sees the distinct projects that actually own
    /// matched resources - never a namespace-wide project catalog.
    pub async fn allowed_projects(
        &self,
        grouped: GroupedByProjectOutput,
        action: AuthAction,
        caller: &Caller,
    ) -> Result<AllowedProjectsSnapshot> {
        let mut projects = Vec::new();
        let mut non_project_resources_exist = false;
        for project in grouped.keys() {
            if project.is_empty() {
                non_project_resources_exist = true;
            } else {
                projects.push(project.clone());
            }
        }

        let allowed = self
            .decider
            .filter_projects(projects.clone(), action, caller)
            .await?;
        let not_allowed_projects_exist = allowed.len() != projects.len();

        debug!(
            caller = %caller.user,
            action = action.as_str(),
            observed = projects.len(),
            allowed = allowed.len(),
            non_project = non_project_resources_exist,
            "filtered observed projects"
        );

        Ok(AllowedProjectsSnapshot {
            allowed,
            grouped,
            non_project_resources_exist,
            not_allowed_projects_exist,
        })
    }
}
