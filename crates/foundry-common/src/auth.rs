//! Authorization collaborator interfaces
//!
//! Permission decisions are made by an external service; this module defines
//! only the consuming interface. The filter input is always the set of
//! projects actually observed in a cluster read - never a namespace-wide
//! project catalog.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Identity of the caller on whose behalf an operation runs
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Caller {
    /// Username as authenticated by the transport layer
    pub user: String,
    /// Opaque session token forwarded to the permission service, if any
    pub session: Option<String>,
}

impl Caller {
    /// Create a caller identity without a session token
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            session: None,
        }
    }

    /// Attach a session token
    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }
}

/// Action a caller is attempting against a project's runtime resources
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthAction {
    /// List/inspect resources
    Read,
    /// Remove resources
    Delete,
}

impl AuthAction {
    /// Action name as the permission service expects it
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthAction::Read => "read",
            AuthAction::Delete => "delete",
        }
    }
}

/// External permission-decision service
///
/// Answers allow/deny per (project, action, caller), potentially batched.
/// Decisions are never cached by Foundry: authorization and cluster state can
/// both change between calls, so every request re-derives current truth.
#[async_trait]
pub trait PermissionDecider: Send + Sync {
    /// Decide whether the caller may perform `action` on a single project
    async fn check_project(&self, project: &str, action: AuthAction, caller: &Caller)
        -> Result<bool>;

    /// Partition the observed projects into the allowed subset
    ///
    /// Returns a subset of `projects`; no ordering guarantee beyond that.
    async fn filter_projects(
        &self,
        projects: Vec<String>,
        action: AuthAction,
        caller: &Caller,
    ) -> Result<Vec<String>>;
}
