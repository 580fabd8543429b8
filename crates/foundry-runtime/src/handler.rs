//! Per-kind capability interface over execution substrates
//!
//! Different job kinds run on different backing substrates but share one
//! resource-lifecycle contract. The collector and aggregator are written
//! against [`RuntimeHandler`] only; adding a kind means adding an
//! implementation here, nothing else.

use foundry_common::labels::UID_LABEL;

/// Capability interface for one job kind
pub trait RuntimeHandler: Send + Sync {
    /// Kind tag as it appears in the kind label
    fn kind(&self) -> &'static str;

    /// Selector clause identifying the resources of one logical object
    fn object_selector(&self, object_id: &str) -> String {
        format!("{}={}", UID_LABEL, object_id)
    }

    /// Whether every resource of this kind carries the uid label
    ///
    /// Builder pods are handled as part of the batch kind but are not coupled
    /// to a run object, so they carry no uid.
    fn expects_uid_in_labels(&self) -> bool {
        true
    }

    /// Whether resources of this kind are coupled to a run object
    fn resources_coupled_to_run(&self) -> bool;
}

/// Batch jobs: run pods plus the builder pods that produce their images
pub struct BatchHandler;

impl RuntimeHandler for BatchHandler {
    fn kind(&self) -> &'static str {
        "job"
    }

    fn expects_uid_in_labels(&self) -> bool {
        false
    }

    fn resources_coupled_to_run(&self) -> bool {
        true
    }
}

/// Long-lived serving workloads, not coupled to any single run
pub struct ServiceHandler;

impl RuntimeHandler for ServiceHandler {
    fn kind(&self) -> &'static str {
        "service"
    }

    fn resources_coupled_to_run(&self) -> bool {
        false
    }
}

static BATCH: BatchHandler = BatchHandler;
static SERVICE: ServiceHandler = ServiceHandler;

/// All registered handlers
pub fn all_handlers() -> [&'static dyn RuntimeHandler; 2] {
    [&BATCH, &SERVICE]
}

/// Resolve the handler for a kind tag
pub fn handler_for_kind(kind: &str) -> Option<&'static dyn RuntimeHandler> {
    all_handlers().into_iter().find(|h| h.kind() == kind)
}
