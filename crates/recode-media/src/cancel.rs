// crates/recode-media/src/cancel.rs
//
// Cooperative cancellation token. The queue (or any front end) sets it; the
// job worker polls it at suspension points — per packet read and per flush
// step. The worker still writes the trailer after observing a cancel so the
// partial output file stays syntactically closed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
