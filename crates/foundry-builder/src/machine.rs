//! Build/deploy driver
//!
//! Owns every build-state transition for a job. A deploy either drives a
//! local in-process build through the image-build collaborator or delegates
//! to a remote builder, then optionally watches the build to a terminal
//! state with incremental log retrieval.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info};

use foundry_common::config::FoundryConfig;
use foundry_common::retry::{retry_with_backoff, RetryConfig};
use foundry_common::{Error, Result};
use foundry_runtime::cluster::{ClusterApi, PodPhase};

use crate::job::{BuildOptions, Job};
use crate::podspec::build_pod;
use crate::state::{BuildState, Transition};

/// A build request: job identity plus the options the build runs with
///
/// Assembled once per deploy call and immutable during its execution.
#[derive(Clone, Debug, PartialEq)]
pub struct BuildRequest {
    /// Job name
    pub job_name: String,
    /// Owning project
    pub project: String,
    /// Builder configuration snapshot
    pub options: BuildOptions,
    /// Whether the runtime package is added to the image
    pub with_runtime: bool,
    /// Skip the build when an image is already deployed
    pub skip_deployed: bool,
}

impl BuildRequest {
    /// Snapshot a job's build configuration
    ///
    /// When `with_runtime` is unset it defaults to true exactly when a base
    /// image is configured that does not already carry the runtime package.
    pub fn assemble(job: &Job, skip_deployed: bool) -> Self {
        let build = &job.spec.build;
        let with_runtime = build.with_runtime.unwrap_or_else(|| {
            build
                .base_image
                .as_deref()
                .map(|base| !(base.starts_with("foundry/") || base.contains("/foundry/")))
                .unwrap_or(false)
        });
        Self {
            job_name: job.metadata.name.clone(),
            project: job.metadata.project.clone(),
            options: build.clone(),
            with_runtime,
            skip_deployed,
        }
    }
}

/// Result of driving a local build
#[derive(Clone, Debug)]
pub struct BuildResult {
    /// Whether the image is ready
    pub ready: bool,
    /// Resolved image, when the build produced or resolved one
    pub image: Option<String>,
    /// Builder pod backing an unfinished build
    pub build_pod: Option<String>,
    /// State to record on the job
    pub state: BuildState,
}

/// Response of a remote build submission
#[derive(Clone, Debug)]
pub struct RemoteBuildResponse {
    /// Whether the image was already ready (no build started)
    pub ready: bool,
    /// State reported by the remote builder
    pub state: BuildState,
    /// Resolved image, when known
    pub image: Option<String>,
    /// Base image resolved remotely, when the request left it unset
    pub base_image: Option<String>,
}

/// Local image-build collaborator
///
/// Constructs the image for a build request. With `watch`, drives the build
/// to completion before returning; otherwise starts it and reports the
/// builder pod for later status polling.
#[async_trait]
pub trait ImageBuilder: Send + Sync {
    /// Run (or start) a build
    async fn build(&self, request: &BuildRequest, watch: bool) -> Result<BuildResult>;
}

/// Remote build delegate
#[async_trait]
pub trait RemoteBuilder: Send + Sync {
    /// Submit a build request
    async fn submit(&self, request: &BuildRequest) -> Result<RemoteBuildResponse>;

    /// Poll build status, fetching log text from `offset` when `want_logs`
    ///
    /// The returned text is the log suffix starting at `offset`, measured in
    /// characters; the backing log is append-only and stable below the
    /// previously fetched offset.
    async fn poll_status(
        &self,
        job: &Job,
        offset: usize,
        want_logs: bool,
    ) -> Result<(String, BuildState)>;
}

/// Persistent job store
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist the job record
    async fn save(&self, job: &Job) -> Result<()>;

    /// Load a job record by name
    async fn load(&self, job_id: &str) -> Result<Job>;
}

/// Options of one deploy call
#[derive(Clone, Copy, Debug)]
pub struct DeployOpts {
    /// Block until the build reaches a terminal state
    pub watch: bool,
    /// No-op when an image is already deployed
    pub skip_deployed: bool,
    /// Suppress log output during the run; surface the full log only on
    /// failure
    pub show_on_failure: bool,
}

impl Default for DeployOpts {
    fn default() -> Self {
        Self {
            watch: true,
            skip_deployed: false,
            show_on_failure: false,
        }
    }
}

/// Outcome of a deploy call
#[derive(Clone, Debug, PartialEq)]
pub struct DeployOutcome {
    /// Whether the job is ready to run
    pub ready: bool,
    /// Resolved image
    pub image: String,
    /// Final recorded state
    pub state: BuildState,
}

/// Outcome of a watch session
#[derive(Clone, Debug, PartialEq)]
pub struct WatchOutcome {
    /// State the watch ended on
    pub state: BuildState,
    /// Full failure log, when the state is `Error` and log surfacing on
    /// failure was requested
    pub failure_log: Option<String>,
}

/// Outcome of launching a run pod
#[derive(Clone, Debug, PartialEq)]
pub struct LaunchOutcome {
    /// Created pod name
    pub pod_name: String,
    /// Terminal phase, when the launch was watched
    pub phase: Option<PodPhase>,
}

/// Per-watch-session log offset bookkeeping
///
/// The offset advances by exactly the number of characters returned by each
/// fetch, so no log text is duplicated or skipped across polls. Fetches
/// within one session are strictly sequential.
#[derive(Debug, Default)]
struct WatchSession {
    offset: usize,
}

impl WatchSession {
    fn consume(&mut self, text: &str) {
        if !text.is_empty() {
            self.offset += text.chars().count();
            debug!(chunk_chars = text.chars().count(), "build output\n{}", text);
        }
    }
}

/// Drives the build/deploy state machine for jobs
///
/// Holds the collaborators behind trait objects; with a remote builder
/// configured, deploys delegate to it, otherwise the local image builder
/// runs in-process.
pub struct BuildDriver {
    store: Arc<dyn JobStore>,
    cluster: Arc<dyn ClusterApi>,
    builder: Arc<dyn ImageBuilder>,
    remote: Option<Arc<dyn RemoteBuilder>>,
    config: FoundryConfig,
}

impl BuildDriver {
    /// Create a driver that builds locally
    pub fn new(
        store: Arc<dyn JobStore>,
        cluster: Arc<dyn ClusterApi>,
        builder: Arc<dyn ImageBuilder>,
        config: FoundryConfig,
    ) -> Self {
        Self {
            store,
            cluster,
            builder,
            remote: None,
            config,
        }
    }

    /// Delegate builds to a remote builder
    pub fn with_remote(mut self, remote: Arc<dyn RemoteBuilder>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Whether the job already has a usable image
    ///
    /// True if an image is assigned or a prior build reached `ready`. On the
    /// remote path the recorded state is refreshed best-effort first; a
    /// failed refresh leaves it as-is.
    pub async fn is_deployed(&self, job: &mut Job) -> bool {
        if job.has_image() {
            return true;
        }
        if let Some(remote) = &self.remote {
            if let Ok((_, state)) = remote.poll_status(job, 0, false).await {
                job.status.state = state;
            }
        }
        job.has_image() || job.status.state == BuildState::Ready
    }

    /// Deploy a job: build its container image, optionally watching the
    /// build to a terminal state
    ///
    /// Fails with [`Error::BuildFailed`] when a watched build terminates
    /// without reaching `ready`.
    pub async fn deploy(&self, job: &mut Job, opts: DeployOpts) -> Result<DeployOutcome> {
        if opts.skip_deployed && self.is_deployed(job).await {
            info!(job = %job.metadata.name, "image already deployed, skipping build");
            return Ok(DeployOutcome {
                ready: true,
                image: job.spec.image.clone(),
                state: job.status.state,
            });
        }

        let request = BuildRequest::assemble(job, opts.skip_deployed);
        if request.with_runtime
            && request.options.source.is_none()
            && request.options.commands.is_empty()
            && request.options.extra.is_none()
        {
            info!(
                job = %job.metadata.name,
                "building only to add the runtime package; set with_runtime=false to skip if the image already carries it"
            );
        }

        job.status.state = BuildState::Unbuilt;
        if job.spec.build.base_image.is_some() {
            // A base image means a build is wanted: clear the run image so
            // the build is not skipped
            job.spec.image.clear();
        }

        let mut ready;
        match &self.remote {
            Some(remote) => {
                let response = remote.submit(&request).await?;
                job.status.state = response.state;
                if let Some(image) = response.image {
                    job.spec.image = image;
                }
                if job.spec.build.base_image.is_none() {
                    job.spec.build.base_image = response.base_image;
                }
                ready = response.ready;
                if !ready {
                    info!(
                        job = %job.metadata.name,
                        image = %request.options.image,
                        "started building image"
                    );
                    if opts.watch {
                        let outcome = self.watch_build(job, true, opts.show_on_failure).await?;
                        ready = outcome.state == BuildState::Ready;
                        if !ready {
                            return Err(match outcome.failure_log {
                                Some(log) => Error::build_failed_with_log("deploy failed", log),
                                None => Error::build_failed("deploy failed"),
                            });
                        }
                    }
                }
            }
            None => {
                // Persist before and after the attempt so a crash mid-build
                // is observable as a resumable non-terminal state
                self.store.save(job).await?;
                let result = self.builder.build(&request, opts.watch).await?;
                job.status.state = result.state;
                job.status.build_pod = result.build_pod;
                if let Some(image) = result.image {
                    job.spec.image = image;
                }
                ready = result.ready;
                self.store.save(job).await?;
            }
        }

        if opts.watch && !ready {
            return Err(Error::build_failed("deploy failed"));
        }
        Ok(DeployOutcome {
            ready,
            image: job.spec.image.clone(),
            state: job.status.state,
        })
    }

    /// Watch a remote build until it reaches a terminal state
    ///
    /// Cooperative polling, not busy-spinning: sleeps between polls, fetching
    /// incremental log output from the previously consumed offset. With
    /// `show_on_failure`, log fetching is suppressed during the run and one
    /// full fetch from offset zero surfaces the complete trace if the build
    /// ends in `error`. The loop exits immediately on `ready` or `error`;
    /// cancellation mid-sleep records no state at all.
    pub async fn watch_build(
        &self,
        job: &mut Job,
        watch: bool,
        show_on_failure: bool,
    ) -> Result<WatchOutcome> {
        let remote = self
            .remote
            .as_ref()
            .ok_or_else(|| Error::invalid_request("no remote builder configured"))?;

        let mut session = WatchSession::default();
        let mut failure_log = None;

        let (text, state) = remote
            .poll_status(job, 0, !show_on_failure)
            .await
            .map_err(|e| match e {
                Error::NotFound(_) | Error::Store(_) => {
                    Error::not_found("job or build process not found")
                }
                other => other,
            })?;
        job.status.state = state;
        session.consume(&text);

        if watch {
            let retry = RetryConfig::with_max_attempts(3);
            while job.status.state.in_progress() {
                tokio::time::sleep(self.config.watch_poll_interval).await;
                if show_on_failure {
                    let (_, state) = retry_with_backoff(
                        &retry,
                        "poll_build_status",
                        Error::is_retryable,
                        || remote.poll_status(job, 0, false),
                    )
                    .await?;
                    job.status.state = state;
                    if state == BuildState::Error {
                        let (full, _) = remote.poll_status(job, 0, true).await?;
                        failure_log = Some(full);
                    }
                } else {
                    let (text, state) = retry_with_backoff(
                        &retry,
                        "poll_build_status",
                        Error::is_retryable,
                        || remote.poll_status(job, session.offset, true),
                    )
                    .await?;
                    job.status.state = state;
                    session.consume(&text);
                }
            }
        }

        Ok(WatchOutcome {
            state: job.status.state,
            failure_log,
        })
    }

    /// Inspect the state of a job's build
    ///
    /// On the remote path this delegates to the watch loop. Locally it reads
    /// the builder pod's phase directly: `succeeded` records `ready` and
    /// drops the pod reference for good, `failed` records `error`, anything
    /// else leaves the recorded state untouched and returns `None` - still
    /// in progress, poll again later.
    pub async fn builder_status(
        &self,
        job: &mut Job,
        watch: bool,
        want_logs: bool,
    ) -> Result<Option<BuildState>> {
        if self.remote.is_some() {
            let outcome = self.watch_build(job, watch, false).await?;
            return Ok(Some(outcome.state));
        }

        if job.status.state != BuildState::Ready {
            if let Some(pod) = job.status.build_pod.clone() {
                let mut phase = self.cluster.pod_phase(&pod).await?;
                if want_logs {
                    if watch {
                        phase = self.cluster.watch_pod(&pod).await?;
                    } else if let Ok(text) = self.cluster.pod_logs(&pod).await {
                        debug!(pod = %pod, "builder pod logs\n{}", text);
                    }
                }
                return match Transition::from_pod_phase(phase) {
                    Some(transition) => {
                        transition.apply(&mut job.status);
                        match job.status.state {
                            BuildState::Ready => {
                                info!(job = %job.metadata.name, "build completed successfully");
                            }
                            _ => {
                                error!(pod = %pod, "build failed, check the builder pod logs");
                            }
                        }
                        Ok(Some(job.status.state))
                    }
                    None => {
                        info!(phase = ?phase, "builder still in progress, poll again later");
                        Ok(None)
                    }
                };
            }
        }
        Ok(None)
    }

    /// Launch a run pod for a deployed job
    ///
    /// With `watch`, blocks until the pod reaches a terminal phase and fails
    /// on a failure phase; otherwise the pod runs in the background.
    pub async fn launch(&self, job: &Job, run_uid: &str, watch: bool) -> Result<LaunchOutcome> {
        if !job.has_image() {
            return Err(Error::invalid_request("job has no image, deploy it first"));
        }
        let pod = build_pod(job, run_uid, &self.config.namespace)?;
        let pod_name = self.cluster.create_pod(pod).await?;

        if watch {
            let phase = self.cluster.watch_pod(&pod_name).await?;
            if phase == PodPhase::Failed {
                return Err(Error::run_failed(format!(
                    "pod {} exited with a failure phase, check its logs",
                    pod_name
                )));
            }
            Ok(LaunchOutcome {
                pod_name,
                phase: Some(phase),
            })
        } else {
            info!(pod = %pod_name, "job is running in the background");
            Ok(LaunchOutcome {
                pod_name,
                phase: None,
            })
        }
    }
}
