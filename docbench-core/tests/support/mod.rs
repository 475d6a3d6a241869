#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use docbench_core::runner::{Harness, RunConfig};
use docbench_memstore::MemStore;

pub fn store() -> Arc<MemStore> {
    Arc::new(MemStore::new())
}

pub fn config(iterations: u64) -> RunConfig {
    RunConfig {
        iterations: Some(iterations),
        error_backoff: Duration::from_millis(100),
        ..RunConfig::default()
    }
}

pub fn harness(iterations: u64) -> Harness {
    Harness::new(config(iterations))
}
