use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::stop::StopSignal;

/// Hands out iteration sequence numbers to workers.
///
/// Every sequence number is claimed by exactly one worker. Once the stop signal fires
/// no further number is handed out.
#[derive(Debug)]
pub struct IterationGate {
    counter: AtomicU64,
    iterations: Option<u64>,
    stop: Arc<StopSignal>,
}

impl IterationGate {
    pub fn new(iterations: Option<u64>, stop: Arc<StopSignal>) -> Self {
        Self {
            counter: AtomicU64::new(0),
            iterations,
            stop,
        }
    }

    pub fn next(&self) -> Option<u64> {
        if self.stop.is_stopped() {
            return None;
        }

        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        match self.iterations {
            Some(total) if seq >= total => None,
            _ => Some(seq),
        }
    }
}
