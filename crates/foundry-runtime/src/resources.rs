//! Point-in-time runtime resource snapshots and their groupings
//!
//! A `RuntimeResource` is one observed cluster unit (a pod) backing a logical
//! job. Resources are never mutated here - they are reads of external cluster
//! truth. Grouping reshapes a read; it never filters (filtering is exclusively
//! the authorization step).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use foundry_common::labels::{identity_from_labels, UID_LABEL};
use foundry_common::NON_PROJECT_KEY;

/// One cluster-native unit (a pod) backing a logical job's execution
///
/// Immutable snapshot of a point-in-time cluster read.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeResource {
    /// Pod name
    pub name: String,
    /// Job kind tag
    pub kind: String,
    /// Pod labels, including project and uid where present
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Pod phase at read time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// A kind paired with the resources under it
///
/// Invariant: all members share `kind`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct KindRuntimeResources {
    /// The shared kind tag
    pub kind: String,
    /// Resources of that kind
    pub resources: Vec<RuntimeResource>,
}

/// Project name -> kind -> resources; empty-string project key holds
/// non-project resources
pub type GroupedByProjectOutput = BTreeMap<String, BTreeMap<String, KindRuntimeResources>>;

/// Project name -> job uid -> resources; uid-less resources (builder pods)
/// land under the empty-string uid key
pub type GroupedByJobOutput = BTreeMap<String, BTreeMap<String, KindRuntimeResources>>;

/// Requested response grouping; absent means a flat per-kind list
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GroupBy {
    /// Re-key by owning job uid
    Job,
    /// Keep the project-keyed structure
    Project,
}

/// Response shape of a list operation
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ListOutput {
    /// One entry per kind across the whole included scope
    Flat(Vec<KindRuntimeResources>),
    /// Project -> job uid -> resources
    ByJob(GroupedByJobOutput),
    /// Project -> kind -> resources
    ByProject(GroupedByProjectOutput),
}

/// Group raw resources by project, then by kind
///
/// Deterministic for a given input set: a resource lacking a project label is
/// bucketed under the empty-string project. Every resource appears in exactly
/// one (project, kind) bucket.
pub fn group_by_project(resources: Vec<RuntimeResource>) -> GroupedByProjectOutput {
    let mut grouped: GroupedByProjectOutput = BTreeMap::new();
    for resource in resources {
        let project = identity_from_labels(&resource.labels).project;
        let kind = resource.kind.clone();
        grouped
            .entry(project)
            .or_default()
            .entry(kind.clone())
            .or_insert_with(|| KindRuntimeResources {
                kind,
                resources: Vec::new(),
            })
            .resources
            .push(resource);
    }
    grouped
}

/// Restrict a grouped read to the given projects, keeping the by-project shape
pub fn restrict_to_projects(
    grouped: &GroupedByProjectOutput,
    included_projects: &[String],
) -> GroupedByProjectOutput {
    grouped
        .iter()
        .filter(|(project, _)| included_projects.contains(*project))
        .map(|(project, kinds)| (project.clone(), kinds.clone()))
        .collect()
}

/// Shape a grouped cluster read into the requested response form
///
/// Only projects in `included_projects` contribute (pass the empty-string key
/// to include non-project resources). Reshaping never drops resources within
/// the included scope: the union of resources is identical across all three
/// shapes.
pub fn shape_output(
    grouped: &GroupedByProjectOutput,
    included_projects: &[String],
    group_by: Option<GroupBy>,
) -> ListOutput {
    match group_by {
        None => {
            let mut by_kind: BTreeMap<String, KindRuntimeResources> = BTreeMap::new();
            for (_, kinds) in grouped
                .iter()
                .filter(|(project, _)| included_projects.contains(*project))
            {
                for (kind, bucket) in kinds {
                    by_kind
                        .entry(kind.clone())
                        .or_insert_with(|| KindRuntimeResources {
                            kind: kind.clone(),
                            resources: Vec::new(),
                        })
                        .resources
                        .extend(bucket.resources.iter().cloned());
                }
            }
            ListOutput::Flat(by_kind.into_values().collect())
        }
        Some(GroupBy::Project) => {
            ListOutput::ByProject(restrict_to_projects(grouped, included_projects))
        }
        Some(GroupBy::Job) => {
            let mut by_job: GroupedByJobOutput = BTreeMap::new();
            for (project, kinds) in grouped
                .iter()
                .filter(|(project, _)| included_projects.contains(*project))
            {
                for bucket in kinds.values() {
                    for resource in &bucket.resources {
                        let uid = resource
                            .labels
                            .get(UID_LABEL)
                            .cloned()
                            .unwrap_or_else(|| NON_PROJECT_KEY.to_string());
                        by_job
                            .entry(project.clone())
                            .or_default()
                            .entry(uid)
                            .or_insert_with(|| KindRuntimeResources {
                                kind: bucket.kind.clone(),
                                resources: Vec::new(),
                            })
                            .resources
                            .push(resource.clone());
                    }
                }
            }
            ListOutput::ByJob(by_job)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use foundry_common::labels::job_labels;
    use std::collections::BTreeSet;

    fn resource(name: &str, project: &str, uid: Option<&str>, kind: &str) -> RuntimeResource {
        RuntimeResource {
            name: name.to_string(),
            kind: kind.to_string(),
            labels: job_labels(project, name, uid, kind),
            status: Some("Running".to_string()),
        }
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

    fn sample_grouped() -> GroupedByProjectOutput {
        group_by_project(vec![
            resource("iris-train-1", "iris", Some("u-1"), "job"),
            resource("iris-train-2", "iris", Some("u-2"), "job"),
            resource("iris-serve", "iris", None, "service"),
            resource("churn-train", "churn", Some("u-3"), "job"),
        ])
    }

    #[test]
    fn every_resource_lands_in_exactly_one_bucket() {
        let grouped = sample_grouped();
        let total: usize = grouped
            .values()
            .flat_map(|kinds| kinds.values())
            .map(|bucket| bucket.resources.len())
            .sum();
        assert_eq!(total, 4);
        assert_eq!(grouped["iris"]["job"].resources.len(), 2);
        assert_eq!(grouped["iris"]["service"].resources.len(), 1);
        assert_eq!(grouped["churn"]["job"].resources.len(), 1);
    }

    #[test]
    fn kind_buckets_share_their_kind() {
        let grouped = sample_grouped();
        for kinds in grouped.values() {
            for (kind, bucket) in kinds {
                assert_eq!(&bucket.kind, kind);
                assert!(bucket.resources.iter().all(|r| &r.kind == kind));
            }
        }
    }

    #[test]
    fn reshaping_never_filters() {
        let grouped = sample_grouped();
        let included = vec!["iris".to_string(), "churn".to_string()];

        let flat = shape_output(&grouped, &included, None);
        let by_job = shape_output(&grouped, &included, Some(GroupBy::Job));
        let by_project = shape_output(&grouped, &included, Some(GroupBy::Project));

        assert_eq!(names_of(&flat), names_of(&by_job));
        assert_eq!(names_of(&by_job), names_of(&by_project));
        assert_eq!(names_of(&flat).len(), 4);
    }

    #[test]
    fn excluded_projects_do_not_contribute_to_any_shape() {
        let grouped = sample_grouped();
        let included = vec!["iris".to_string()];

        for group_by in [None, Some(GroupBy::Job), Some(GroupBy::Project)] {
            let output = shape_output(&grouped, &included, group_by);
            assert!(!names_of(&output).contains("churn-train"));
        }
    }

    #[test]
    fn by_job_keys_resources_by_uid() {
        let grouped = sample_grouped();
        let included = vec!["iris".to_string()];
        match shape_output(&grouped, &included, Some(GroupBy::Job)) {
            ListOutput::ByJob(by_job) => {
                let iris = &by_job["iris"];
                assert!(iris.contains_key("u-1"));
                assert!(iris.contains_key("u-2"));
                // The serving pod is not coupled to a run: empty uid key
                assert_eq!(iris[""].resources[0].name, "iris-serve");
            }
            other => panic!("expected by-job output, got {:?}", other),
        }
    }

    #[test]
    fn non_project_resources_group_under_the_empty_key() {
        let mut builder_pod = resource("builder-xyz", "", None, "job");
        builder_pod.labels.remove(foundry_common::labels::PROJECT_LABEL);
        let grouped = group_by_project(vec![builder_pod]);
        assert!(grouped.contains_key(""));
        assert_eq!(grouped[""]["job"].resources[0].name, "builder-xyz");
    }
}
