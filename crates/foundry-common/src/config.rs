//! Operation configuration
//!
//! All defaults that used to be ambient (grace period, base selector, poll
//! cadence) are threaded explicitly through constructors. Nothing in Foundry
//! reads process-wide configuration.

use std::time::Duration;

use crate::labels::MANAGED_SELECTOR;

/// Configuration threaded through every Foundry operation
#[derive(Clone, Debug)]
pub struct FoundryConfig {
    /// Namespace holding the runtime resources
    pub namespace: String,
    /// Base label selector scoping every cluster read to Foundry-managed pods
    pub base_selector: String,
    /// Grace period (seconds) passed to pod deletions unless the request
    /// overrides it
    pub deletion_grace_period: u32,
    /// Sleep between build watch-loop polls
    pub watch_poll_interval: Duration,
    /// Sleep between pod phase polls when watching a pod to completion
    pub phase_poll_interval: Duration,
}

impl Default for FoundryConfig {
    fn default() -> Self {
        Self {
            namespace: "foundry".to_string(),
            base_selector: MANAGED_SELECTOR.to_string(),
            deletion_grace_period: 10,
            watch_poll_interval: Duration::from_secs(2),
            phase_poll_interval: Duration::from_secs(2),
        }
    }
}

impl FoundryConfig {
    /// Create a config for the given namespace, defaults elsewhere
    pub fn for_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    /// Override the watch-loop poll interval
    pub fn with_watch_poll_interval(mut self, interval: Duration) -> Self {
        self.watch_poll_interval = interval;
        self
    }

    /// Override the deletion grace period
    pub fn with_deletion_grace_period(mut self, seconds: u32) -> Self {
        self.deletion_grace_period = seconds;
        self
    }
}
