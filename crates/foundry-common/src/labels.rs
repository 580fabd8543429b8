//! Label schema and selector algebra
//!
//! Logical identity (project, job kind, job uid) maps onto pod labels, and
//! pod labels map back onto logical identity. Everything Foundry creates is
//! stamped with a management label so a single base selector scopes every
//! cluster read to resources this system owns.

use std::collections::BTreeMap;
use std::fmt;

/// Label key carrying the owning project name
pub const PROJECT_LABEL: &str = "foundry.dev/project";

/// Label key carrying the owning run/job uid
pub const UID_LABEL: &str = "foundry.dev/uid";

/// Label key carrying the job kind tag
pub const KIND_LABEL: &str = "foundry.dev/kind";

/// Label key carrying the job name
pub const NAME_LABEL: &str = "foundry.dev/name";

/// Standard Kubernetes managed-by label key
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Managed-by value for resources created by Foundry
pub const MANAGED_BY_VALUE: &str = "foundry";

/// Label selector matching every resource managed by Foundry
pub const MANAGED_SELECTOR: &str = "app.kubernetes.io/managed-by=foundry";

/// Conjunction of label selector clauses
///
/// Clauses are joined with `,` (logical AND in Kubernetes selector syntax).
/// An absent filter component contributes no clause - never a wildcard
/// match clause.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Selector {
    clauses: Vec<String>,
}

impl Selector {
    /// Create an empty selector (matches everything)
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a selector scoped to Foundry-managed resources
    pub fn managed() -> Self {
        Self {
            clauses: vec![MANAGED_SELECTOR.to_string()],
        }
    }

    /// Add an equality clause (`key=value`)
    pub fn eq(mut self, key: &str, value: &str) -> Self {
        self.clauses.push(format!("{}={}", key, value));
        self
    }

    /// Add a set-membership clause (`key in (a, b)`)
    ///
    /// An empty value set contributes no clause.
    pub fn in_set(mut self, key: &str, values: &[String]) -> Self {
        if !values.is_empty() {
            self.clauses.push(format!("{} in ({})", key, values.join(", ")));
        }
        self
    }

    /// Add a caller-supplied raw clause, verbatim
    ///
    /// Empty input contributes no clause.
    pub fn raw(mut self, clause: impl Into<String>) -> Self {
        let clause = clause.into();
        if !clause.is_empty() {
            self.clauses.push(clause);
        }
        self
    }

    /// True when no clause has been added
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.clauses.join(","))
    }
}

/// Build the selector clause restricting an operation to the given projects
///
/// This is the scope restriction appended to bulk deletions once the allowed
/// project set is known: `foundry.dev/project in (a, b)`.
pub fn project_scope_clause(projects: &[String]) -> String {
    format!("{} in ({})", PROJECT_LABEL, projects.join(", "))
}

/// Logical identity extracted from a resource's labels
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceIdentity {
    /// Owning project; empty string when the resource carries no project label
    pub project: String,
    /// Owning run/job uid, when the resource is coupled to a run
    pub uid: Option<String>,
    /// Job kind tag, when present
    pub kind: Option<String>,
}

/// Extract logical identity from a pod's labels
pub fn identity_from_labels(labels: &BTreeMap<String, String>) -> ResourceIdentity {
    ResourceIdentity {
        project: labels.get(PROJECT_LABEL).cloned().unwrap_or_default(),
        uid: labels.get(UID_LABEL).cloned(),
        kind: labels.get(KIND_LABEL).cloned(),
    }
}

/// Standard labels stamped on every resource Foundry creates for a job
pub fn job_labels(
    project: &str,
    name: &str,
    uid: Option<&str>,
    kind: &str,
) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string());
    labels.insert(PROJECT_LABEL.to_string(), project.to_string());
    labels.insert(NAME_LABEL.to_string(), name.to_string());
    labels.insert(KIND_LABEL.to_string(), kind.to_string());
    if let Some(uid) = uid {
        labels.insert(UID_LABEL.to_string(), uid.to_string());
    }
    labels
}
