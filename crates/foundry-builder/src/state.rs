//! Build state machine
//!
//! States progress `unbuilt -> pending -> running -> ready | error`; `ready`
//! and `error` are terminal. Transitions are computed by pure functions that
//! take an observation and return the next state plus its side effects -
//! status objects are never mutated in place from multiple call sites.

use std::fmt;

use serde::{Deserialize, Serialize};

use foundry_runtime::cluster::PodPhase;

use crate::job::JobStatus;

/// Build/deploy state recorded on a job's status
///
/// Serialized as `""`/`pending`/`running`/`ready`/`error`; the empty string
/// (unbuilt) keeps status records readable by callers that predate the
/// explicit state tag.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildState {
    /// No build attempted yet
    #[default]
    #[serde(rename = "")]
    Unbuilt,
    /// Build accepted, builder pod not yet running
    Pending,
    /// Builder running
    Running,
    /// Image built and assigned - terminal
    Ready,
    /// Build failed - terminal
    Error,
}

impl BuildState {
    /// Wire representation of the state
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildState::Unbuilt => "",
            BuildState::Pending => "pending",
            BuildState::Running => "running",
            BuildState::Ready => "ready",
            BuildState::Error => "error",
        }
    }

    /// True for states no build ever leaves
    pub fn is_terminal(&self) -> bool {
        matches!(self, BuildState::Ready | BuildState::Error)
    }

    /// True while a watch loop should keep polling
    pub fn in_progress(&self) -> bool {
        matches!(self, BuildState::Pending | BuildState::Running)
    }
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Next state plus the side effects of reaching it
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    /// State to record
    pub next: BuildState,
    /// Drop the build-pod reference - a one-way step taken on success; the
    /// pod reference is never reused afterwards
    pub clear_build_pod: bool,
}

impl Transition {
    /// Derive a transition from a builder pod phase observation
    ///
    /// Returns `None` while the build is still in progress: the recorded
    /// state stays untouched and the caller should poll again later.
    pub fn from_pod_phase(phase: PodPhase) -> Option<Self> {
        match phase {
            PodPhase::Succeeded => Some(Self {
                next: BuildState::Ready,
                clear_build_pod: true,
            }),
            PodPhase::Failed => Some(Self {
                next: BuildState::Error,
                clear_build_pod: false,
            }),
            PodPhase::Pending | PodPhase::Running | PodPhase::Unknown => None,
        }
    }

    /// Record the transition on a job status
    pub fn apply(&self, status: &mut JobStatus) {
        status.state = self.next;
        if self.clear_build_pod {
            status.build_pod = None;
        }
    }
}
