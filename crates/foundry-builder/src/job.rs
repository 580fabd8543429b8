//! Job model and build-option merging
//!
//! A `Job` is the persisted record the build driver advances. Build options
//! are assembled once per deploy call and are immutable during its execution;
//! `configure_build` implements the merge-vs-overwrite policy for repeated
//! configuration calls.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{EnvVar, ResourceRequirements, Volume, VolumeMount};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::state::BuildState;

/// Builder configuration for the deploy operation
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BuildOptions {
    /// Target image name/path to build
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,
    /// Base image to build from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_image: Option<String>,
    /// Source archive reference (git/tar/zip) to load code from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Build commands run in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<String>,
    /// Packages installed into the image
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requirements: Vec<String>,
    /// Extra build-file lines appended verbatim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<String>,
    /// Registry credentials secret name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    /// Add the runtime package to the image; defaults from the base image
    /// when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub with_runtime: Option<bool>,
    /// Load the source archive into the container at run time instead of
    /// baking it in at build time
    #[serde(default)]
    pub load_source_at_runtime: bool,
    /// Build automatically on first run if the job requires a build
    #[serde(default)]
    pub auto_build: bool,
}

/// Identity of a job
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobMetadata {
    /// Job name
    pub name: String,
    /// Owning project
    pub project: String,
    /// Extra labels propagated to created pods
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

/// Execution spec of a job
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobSpec {
    /// Resolved container image; empty until deployed
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,
    /// Builder configuration
    #[serde(default)]
    pub build: BuildOptions,
    /// Container entrypoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Entrypoint arguments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    /// Working directory, absolute or relative to the job root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workdir: Option<String>,
    /// Environment variables
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
    /// Resource requests/limits
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
    /// Pod volumes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Volume>,
    /// Container volume mounts
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<VolumeMount>,
    /// Image pull policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,
    /// Image pull secret name; omitted from pod specs entirely when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_secret: Option<String>,
}

/// Mutable status advanced by the build driver
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    /// Current build state
    #[serde(default)]
    pub state: BuildState,
    /// Builder pod backing an in-flight build, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_pod: Option<String>,
}

/// A logical compute job: identity, execution spec, and build status
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Identity
    pub metadata: JobMetadata,
    /// Execution spec
    pub spec: JobSpec,
    /// Build status
    #[serde(default)]
    pub status: JobStatus,
}

/// Append new entries, skipping ones already present
fn merge_list(existing: &mut Vec<String>, new: &[String]) {
    for entry in new {
        if !existing.contains(entry) {
            existing.push(entry.clone());
        }
    }
}

impl Job {
    /// Create a job with identity only
    pub fn new(name: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            metadata: JobMetadata {
                name: name.into(),
                project: project.into(),
                labels: BTreeMap::new(),
            },
            ..Default::default()
        }
    }

    /// Whether an image is already assigned
    pub fn has_image(&self) -> bool {
        !self.spec.image.is_empty()
    }

    /// Apply builder configuration
    ///
    /// With `overwrite`, the existing command and requirement lists are
    /// cleared before the new ones are applied; otherwise new entries are
    /// merged onto the existing ones. Scalar fields are replaced whenever the
    /// patch carries them and left alone otherwise.
    pub fn configure_build(&mut self, patch: BuildOptions, overwrite: bool) {
        let build = &mut self.spec.build;
        if !patch.image.is_empty() {
            build.image = patch.image;
        }
        if patch.base_image.is_some() {
            build.base_image = patch.base_image;
        }
        if overwrite && (!patch.commands.is_empty() || !patch.requirements.is_empty()) {
            build.commands.clear();
            build.requirements.clear();
        }
        merge_list(&mut build.requirements, &patch.requirements);
        merge_list(&mut build.commands, &patch.commands);
        if patch.extra.is_some() {
            build.extra = patch.extra;
        }
        if patch.secret.is_some() {
            build.secret = patch.secret;
        }
        if patch.source.is_some() {
            build.source = patch.source;
        }
        if patch.load_source_at_runtime {
            build.load_source_at_runtime = true;
        }
        if patch.with_runtime.is_some() {
            build.with_runtime = patch.with_runtime;
        }
        if patch.auto_build {
            build.auto_build = true;
        }
    }

    /// Point the job at a source archive, loaded at run time or build time
    ///
    /// When pulling at runtime with a base image and no build commands there
    /// is nothing to bake: the base image is promoted to the run image and no
    /// build is needed. When baking the source in, the run image is cleared
    /// so the next deploy does not skip the build.
    pub fn with_source_archive(
        &mut self,
        source: impl Into<String>,
        workdir: Option<&str>,
        pull_at_runtime: bool,
    ) {
        let source = source.into();
        if source.ends_with(".zip") && !pull_at_runtime {
            warn!(
                source = %source,
                "zip archives are not extracted natively during builds, prefer tar.gz"
            );
        }
        self.spec.build.source = Some(source);
        if let Some(workdir) = workdir {
            self.spec.workdir = Some(workdir.to_string());
        }
        self.spec.build.load_source_at_runtime = pull_at_runtime;

        if pull_at_runtime
            && self.spec.build.base_image.is_some()
            && self.spec.build.commands.is_empty()
            && self.spec.image.is_empty()
        {
            // Source comes from the archive and no build steps exist: run
            // directly on the base image
            self.spec.image = self.spec.build.base_image.clone().unwrap_or_default();
        } else if !pull_at_runtime {
            if self.spec.build.base_image.is_none() && !self.spec.image.is_empty() {
                self.spec.build.base_image = Some(self.spec.image.clone());
            }
            self.spec.image.clear();
        }
    }
}
