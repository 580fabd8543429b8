//! Pure translation of a job spec into a cluster pod spec
//!
//! Deterministic, no hidden defaults beyond: a missing pull secret omits the
//! pull-secret field entirely rather than emitting an empty placeholder.

use k8s_openapi::api::core::v1::{Container, EnvVar, LocalObjectReference, Pod, PodSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use foundry_common::labels::job_labels;
use foundry_common::{Error, Result};

use crate::job::{Job, JobSpec};

/// Mount point under which relative job workdirs are anchored
pub const JOB_ROOT_MOUNT: &str = "/foundry";

/// Name of the single job container
const MAIN_CONTAINER: &str = "base";

/// Resolve the container working directory
///
/// When the source archive is pulled at run time the workdir applies after
/// the clone, so it is left unset here. A relative workdir is anchored under
/// the job root mount.
fn resolve_workdir(spec: &JobSpec) -> Option<String> {
    if spec.build.source.is_some() && spec.build.load_source_at_runtime {
        return None;
    }
    spec.workdir.as_ref().map(|workdir| {
        if workdir.starts_with('/') {
            workdir.clone()
        } else {
            format!("{}/{}", JOB_ROOT_MOUNT, workdir)
        }
    })
}

/// Build the pod spec for running a job with the given resolved image
///
/// `extra_env` is prepended to the job's own environment (run-scoped
/// variables injected by the launcher).
pub fn build_pod_spec(job: &Job, image: &str, extra_env: &[EnvVar]) -> Result<PodSpec> {
    if image.is_empty() {
        return Err(Error::invalid_request("empty image reference"));
    }

    let env: Vec<EnvVar> = extra_env
        .iter()
        .cloned()
        .chain(job.spec.env.iter().cloned())
        .collect();

    let container = Container {
        name: MAIN_CONTAINER.to_string(),
        image: Some(image.to_string()),
        image_pull_policy: job.spec.image_pull_policy.clone(),
        command: job.spec.command.clone().map(|command| vec![command]),
        args: job.spec.args.clone(),
        working_dir: resolve_workdir(&job.spec),
        env: (!env.is_empty()).then_some(env),
        resources: job.spec.resources.clone(),
        volume_mounts: (!job.spec.volume_mounts.is_empty())
            .then(|| job.spec.volume_mounts.clone()),
        ..Default::default()
    };

    let mut pod_spec = PodSpec {
        containers: vec![container],
        restart_policy: Some("Never".to_string()),
        volumes: (!job.spec.volumes.is_empty()).then(|| job.spec.volumes.clone()),
        ..Default::default()
    };

    if let Some(secret) = &job.spec.image_pull_secret {
        pod_spec.image_pull_secrets = Some(vec![LocalObjectReference {
            name: secret.clone(),
        }]);
    }

    Ok(pod_spec)
}

/// Build a complete run pod for a job, labeled with its logical identity
pub fn build_pod(job: &Job, run_uid: &str, namespace: &str) -> Result<Pod> {
    let spec = build_pod_spec(job, &job.spec.image, &[])?;

    let mut labels = job.metadata.labels.clone();
    labels.extend(job_labels(
        &job.metadata.project,
        &job.metadata.name,
        Some(run_uid),
        "job",
    ));

    Ok(Pod {
        metadata: ObjectMeta {
            generate_name: Some(format!("{}-", job.metadata.name)),
            namespace: Some(namespace.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        spec: Some(spec),
        ..Default::default()
    })
}
