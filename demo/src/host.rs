//! Minimal host-side collaborators: plugins that own attachments and a
//! per-player operator flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bastion_core::traits::{AttachmentOwner, OperatorStatus};

pub struct Plugin {
    name: String,
    enabled: AtomicBool,
}

impl Plugin {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            enabled: AtomicBool::new(true),
        })
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }
}

impl AttachmentOwner for Plugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

/// Operator status as a server's ops list would store it.
#[derive(Default)]
pub struct OperatorFlag(AtomicBool);

impl OperatorFlag {
    pub fn new(is_operator: bool) -> Arc<Self> {
        Arc::new(Self(AtomicBool::new(is_operator)))
    }
}

impl OperatorStatus for OperatorFlag {
    fn is_operator(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn set_operator(&self, value: bool) {
        self.0.store(value, Ordering::SeqCst);
    }
}
