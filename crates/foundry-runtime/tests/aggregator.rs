//! Aggregator scenarios: authorization-filtered list/delete over a fake
//! cluster and permission decider

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;

use foundry_common::auth::{AuthAction, Caller, PermissionDecider};
use foundry_common::config::FoundryConfig;
use foundry_common::labels::job_labels;
use foundry_common::{Error, Result};
use foundry_runtime::aggregator::DeleteOptions;
use foundry_runtime::cluster::{ClusterApi, PodPhase, PodRecord};
use foundry_runtime::resources::{GroupBy, ListOutput};
use foundry_runtime::RuntimeResourceAggregator;

// ============================================================================
// Fakes
// ============================================================================

/// Split a selector into clauses on commas outside `in (...)` value lists
fn split_clauses(selector: &str) -> Vec<String> {
    let mut clauses = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for ch in selector.chars() {
        match ch {
            '(' => {
                depth += 1;
                current.push(ch);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            ',' if depth == 0 => {
                clauses.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    if !current.trim().is_empty() {
        clauses.push(current.trim().to_string());
    }
    clauses
}

/// Evaluate a selector conjunction against a label map
fn selector_matches(labels: &BTreeMap<String, String>, selector: &str) -> bool {
    split_clauses(selector).iter().all(|clause| {
        if let Some((key, rest)) = clause.split_once(" in (") {
            let values: Vec<&str> = rest
                .trim_end_matches(')')
                .split(',')
                .map(str::trim)
                .collect();
            labels
                .get(key.trim())
                .is_some_and(|v| values.contains(&v.as_str()))
        } else if let Some((key, value)) = clause.split_once("!=") {
            labels.get(key) != Some(&value.to_string())
        } else if let Some((key, value)) = clause.split_once('=') {
            labels.get(key) == Some(&value.to_string())
        } else {
            labels.contains_key(clause.as_str())
        }
    })
}

#[derive(Clone, Debug)]
struct DeleteCall {
    selector: String,
    force: bool,
    grace_period: u32,
}

/// In-memory cluster that honors label selectors on list and delete
#[derive(Default)]
struct FakeCluster {
    pods: Mutex<Vec<PodRecord>>,
    list_calls: AtomicUsize,
    deletes: Mutex<Vec<DeleteCall>>,
}

impl FakeCluster {
    fn with_pods(pods: Vec<PodRecord>) -> Arc<Self> {
        Arc::new(Self {
            pods: Mutex::new(pods),
            ..Default::default()
        })
    }

    fn delete_calls(&self) -> Vec<DeleteCall> {
        self.deletes.lock().unwrap().clone()
    }

    fn remaining(&self) -> usize {
        self.pods.lock().unwrap().len()
    }
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn list_pods(&self, selector: &str) -> Result<Vec<PodRecord>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .pods
            .lock()
            .unwrap()
            .iter()
            .filter(|p| selector_matches(&p.labels, selector))
            .cloned()
            .collect())
    }

    async fn delete_pods(&self, selector: &str, force: bool, grace_period: u32) -> Result<usize> {
        self.deletes.lock().unwrap().push(DeleteCall {
            selector: selector.to_string(),
            force,
            grace_period,
        });
        let mut pods = self.pods.lock().unwrap();
        let before = pods.len();
        pods.retain(|p| !selector_matches(&p.labels, selector));
        Ok(before - pods.len())
    }

    async fn create_pod(&self, _: Pod) -> Result<String> {
        unimplemented!("not used by aggregator scenarios")
    }

    async fn pod_phase(&self, _: &str) -> Result<PodPhase> {
        unimplemented!("not used by aggregator scenarios")
    }

    async fn watch_pod(&self, _: &str) -> Result<PodPhase> {
        unimplemented!("not used by aggregator scenarios")
    }

    async fn pod_logs(&self, _: &str) -> Result<String> {
        unimplemented!("not used by aggregator scenarios")
    }
}

/// Decider allowing exactly the projects named at construction
struct AllowList {
    allowed: Vec<String>,
    single_checks: AtomicUsize,
}

impl AllowList {
    fn new(allowed: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            allowed: allowed.iter().map(|s| s.to_string()).collect(),
            single_checks: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl PermissionDecider for AllowList {
    async fn check_project(&self, project: &str, _: AuthAction, _: &Caller) -> Result<bool> {
        self.single_checks.fetch_add(1, Ordering::SeqCst);
        Ok(self.allowed.iter().any(|p| p == project))
    }

    async fn filter_projects(
        &self,
        projects: Vec<String>,
        _: AuthAction,
        _: &Caller,
    ) -> Result<Vec<String>> {
        Ok(projects
            .into_iter()
            .filter(|p| self.allowed.iter().any(|a| a == p))
            .collect())
    }
}

// ============================================================================
// Fixtures
// ============================================================================

fn run_pod(name: &str, project: &str, uid: &str) -> PodRecord {
    PodRecord {
        name: name.to_string(),
        labels: job_labels(project, name, Some(uid), "job"),
        phase: Some("Running".to_string()),
        terminating: false,
    }
}

fn non_project_pod(name: &str) -> PodRecord {
    // A builder pod: managed by us, no project or uid labels
    let mut labels = job_labels("", name, None, "job");
    labels.remove(foundry_common::labels::PROJECT_LABEL);
    PodRecord {
        name: name.to_string(),
        labels,
        phase: Some("Succeeded".to_string()),
        terminating: false,
    }
}

fn two_project_cluster() -> Arc<FakeCluster> {
    FakeCluster::with_pods(vec![
        run_pod("iris-train-1", "iris", "u-1"),
        run_pod("iris-train-2", "iris", "u-2"),
        run_pod("churn-train-1", "churn", "u-3"),
    ])
}

fn aggregator(
    cluster: Arc<FakeCluster>,
    decider: Arc<AllowList>,
) -> RuntimeResourceAggregator {
    RuntimeResourceAggregator::new(cluster, decider, FoundryConfig::default())
}

fn names_of(output: &ListOutput) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    match output {
        ListOutput::Flat(kinds) => {
            for bucket in kinds {
                names.extend(bucket.resources.iter().map(|r| r.name.clone()));
            }
        }
        ListOutput::ByJob(grouped) | ListOutput::ByProject(grouped) => {
            for kinds in grouped.values() {
                for bucket in kinds.values() {
                    names.extend(bucket.resources.iter().map(|r| r.name.clone()));
                }
            }
        }
    }
    names
}

const DELETE_ALL: DeleteOptions = DeleteOptions {
    force: true,
    grace_period: None,
    want_body: false,
};

// ============================================================================
// Scenarios
// ============================================================================

/// A bulk delete spanning a project the caller cannot access deletes nothing:
/// no partial deletion, and no hint that the denied project exists.
#[tokio::test]
async fn delete_spanning_a_denied_project_deletes_nothing() {
    let cluster = two_project_cluster();
    let agg = aggregator(cluster.clone(), AllowList::new(&["iris"]));
    let caller = Caller::new("dana");

    let err = agg
        .delete(&caller, "*", None, None, None, DELETE_ALL)
        .await
        .unwrap_err();

    match err {
        Error::AccessDenied(msg) => assert!(!msg.contains("churn")),
        other => panic!("expected AccessDenied, got {:?}", other),
    }
    assert!(cluster.delete_calls().is_empty());
    assert_eq!(cluster.remaining(), 3);
}

/// A named project scope the caller cannot read fails before any cluster
/// read is issued.
#[tokio::test]
async fn named_scope_is_gated_before_any_cluster_read() {
    let cluster = two_project_cluster();
    let agg = aggregator(cluster.clone(), AllowList::new(&["iris"]));
    let caller = Caller::new("dana");

    let err = agg
        .list(&caller, "vault", None, None, None, None)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::AccessDenied(_)));
    assert_eq!(cluster.list_calls.load(Ordering::SeqCst), 0);
}

/// group_by only reshapes: the union of returned resources is identical
/// across all shapes of the same underlying read.
#[tokio::test]
async fn group_by_reshapes_without_filtering() {
    let cluster = two_project_cluster();
    let agg = aggregator(cluster, AllowList::new(&["iris", "churn"]));
    let caller = Caller::new("dana");

    let flat = agg
        .list(&caller, "*", None, None, None, None)
        .await
        .unwrap();
    let by_job = agg
        .list(&caller, "*", None, None, None, Some(GroupBy::Job))
        .await
        .unwrap();
    let by_project = agg
        .list(&caller, "*", None, None, None, Some(GroupBy::Project))
        .await
        .unwrap();

    assert_eq!(names_of(&flat), names_of(&by_job));
    assert_eq!(names_of(&by_job), names_of(&by_project));
    assert_eq!(names_of(&flat).len(), 3);
}

/// Deleting an already-empty scope is not an error, no matter how many times
/// it is repeated.
#[tokio::test]
async fn empty_scope_delete_is_idempotent() {
    let cluster = two_project_cluster();
    let agg = aggregator(cluster.clone(), AllowList::new(&["iris", "churn"]));
    let caller = Caller::new("dana");

    agg.delete(&caller, "*", None, None, None, DELETE_ALL)
        .await
        .unwrap();
    assert_eq!(cluster.remaining(), 0);

    // Second call matches zero resources: still success
    agg.delete(&caller, "*", None, None, None, DELETE_ALL)
        .await
        .unwrap();
}

/// Wildcard list with {iris: 2 pods, non-project: 1 pod} and a caller allowed
/// only on iris: iris's pods are returned in every shape, the denied
/// project's pods never are, and the non-project pod is always visible - it
/// is not subject to the project-permission check.
#[tokio::test]
async fn non_project_pods_are_visible_regardless_of_permissions() {
    let cluster = FakeCluster::with_pods(vec![
        run_pod("iris-train-1", "iris", "u-1"),
        run_pod("iris-train-2", "iris", "u-2"),
        run_pod("churn-train-1", "churn", "u-3"),
        non_project_pod("builder-1"),
    ]);
    let agg = aggregator(cluster, AllowList::new(&["iris"]));
    let caller = Caller::new("dana");

    let flat = agg
        .list(&caller, "*", None, None, None, None)
        .await
        .unwrap();
    assert!(names_of(&flat).contains("iris-train-1"));
    assert!(names_of(&flat).contains("iris-train-2"));
    assert!(names_of(&flat).contains("builder-1"));
    assert!(!names_of(&flat).contains("churn-train-1"));

    let by_project = agg
        .list(&caller, "*", None, None, None, Some(GroupBy::Project))
        .await
        .unwrap();
    match &by_project {
        ListOutput::ByProject(grouped) => {
            assert!(grouped.contains_key(""));
            assert!(grouped.contains_key("iris"));
            assert!(!grouped.contains_key("churn"));
        }
        other => panic!("expected by-project output, got {:?}", other),
    }
    assert!(names_of(&by_project).contains("builder-1"));
}

/// Within one delete call the project-scoped deletion is issued before the
/// unrestricted non-project deletion.
#[tokio::test]
async fn delete_issues_project_scoped_call_first() {
    let cluster = FakeCluster::with_pods(vec![
        run_pod("iris-train-1", "iris", "u-1"),
        non_project_pod("builder-1"),
    ]);
    let agg = aggregator(cluster.clone(), AllowList::new(&["iris"]));
    let caller = Caller::new("dana");

    agg.delete(&caller, "*", None, None, None, DELETE_ALL)
        .await
        .unwrap();

    let calls = cluster.delete_calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[0].selector.contains("foundry.dev/project in (iris)"));
    assert!(!calls[1].selector.contains("foundry.dev/project"));
    assert_eq!(cluster.remaining(), 0);
}

/// When a caller is denied on every observed project, the presence of
/// non-project resources does not soften the all-or-nothing rule.
#[tokio::test]
async fn denied_everywhere_still_fails_despite_non_project_resources() {
    let cluster = FakeCluster::with_pods(vec![
        run_pod("iris-train-1", "iris", "u-1"),
        non_project_pod("builder-1"),
    ]);
    let agg = aggregator(cluster.clone(), AllowList::new(&[]));
    let caller = Caller::new("mallory");

    let err = agg
        .delete(&caller, "*", None, None, None, DELETE_ALL)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AccessDenied(_)));
    assert!(cluster.delete_calls().is_empty());
}

/// The optional delete response mirrors the pre-delete view of exactly the
/// scope acted upon: allowed projects plus the non-project bucket.
#[tokio::test]
async fn delete_body_mirrors_the_acted_upon_scope() {
    let cluster = FakeCluster::with_pods(vec![
        run_pod("iris-train-1", "iris", "u-1"),
        non_project_pod("builder-1"),
    ]);
    let agg = aggregator(cluster, AllowList::new(&["iris"]));
    let caller = Caller::new("dana");

    let body = agg
        .delete(
            &caller,
            "*",
            None,
            None,
            None,
            DeleteOptions {
                force: true,
                grace_period: None,
                want_body: true,
            },
        )
        .await
        .unwrap()
        .expect("body requested");

    let projects: Vec<&str> = body.keys().map(String::as_str).collect();
    assert_eq!(projects, vec!["", "iris"]);
    assert_eq!(body["iris"]["job"].resources[0].name, "iris-train-1");
}

/// A grace period override flows through to the cluster deletion call;
/// otherwise the configured default applies.
#[tokio::test]
async fn grace_period_defaults_from_config() {
    let cluster = FakeCluster::with_pods(vec![run_pod("iris-train-1", "iris", "u-1")]);
    let agg = aggregator(cluster.clone(), AllowList::new(&["iris"]));
    let caller = Caller::new("dana");

    agg.delete(&caller, "*", None, None, None, DELETE_ALL)
        .await
        .unwrap();
    assert_eq!(cluster.delete_calls()[0].grace_period, 10);

    let cluster2 = FakeCluster::with_pods(vec![run_pod("iris-train-1", "iris", "u-1")]);
    let agg2 = aggregator(cluster2.clone(), AllowList::new(&["iris"]));
    agg2.delete(
        &caller,
        "*",
        None,
        None,
        None,
        DeleteOptions {
            force: true,
            grace_period: Some(0),
            want_body: false,
        },
    )
    .await
    .unwrap();
    assert_eq!(cluster2.delete_calls()[0].grace_period, 0);
}

/// A kind filter narrows both the read and the deletion scope.
#[tokio::test]
async fn kind_filter_scopes_the_deletion_selector() {
    let cluster = FakeCluster::with_pods(vec![
        run_pod("iris-train-1", "iris", "u-1"),
        PodRecord {
            name: "iris-serve".to_string(),
            labels: job_labels("iris", "iris-serve", Some("u-9"), "service"),
            phase: Some("Running".to_string()),
            terminating: false,
        },
    ]);
    let agg = aggregator(cluster.clone(), AllowList::new(&["iris"]));
    let caller = Caller::new("dana");

    agg.delete(&caller, "*", None, Some("job"), None, DELETE_ALL)
        .await
        .unwrap();

    assert!(cluster.delete_calls()[0]
        .selector
        .contains("foundry.dev/kind=job"));
    // The serving pod was outside the deletion scope
    assert_eq!(cluster.remaining(), 1);
}
