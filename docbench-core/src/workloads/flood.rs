use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use docbench_value::{DateTimeMillis, Document};

use crate::executor::{ExecError, Executor, Target, WriteCounts};
use crate::runner::{Completed, Operation};

pub const DEFAULT_DATABASE: &str = "admission_test_db";
pub const DEFAULT_COLLECTION: &str = "requests";
pub const DEFAULT_PAYLOAD_REPEAT: usize = 100;

#[derive(Debug, Clone)]
pub struct FloodOptions {
    pub target: Target,
    /// How many times the per-request payload fragment is repeated.
    pub payload_repeat: usize,
}

impl Default for FloodOptions {
    fn default() -> Self {
        Self {
            target: Target::new(DEFAULT_DATABASE, DEFAULT_COLLECTION),
            payload_repeat: DEFAULT_PAYLOAD_REPEAT,
        }
    }
}

/// Single-document inserts as fast as the executor accepts them.
pub struct InsertFlood<E> {
    executor: Arc<E>,
    options: FloodOptions,
}

impl<E: Executor> InsertFlood<E> {
    pub fn new(executor: Arc<E>, options: FloodOptions) -> Self {
        Self { executor, options }
    }

    pub fn target(&self) -> &Target {
        &self.options.target
    }
}

/// Builds the request document for iteration `seq`.
pub fn flood_document(seq: u64, payload_repeat: usize) -> Document {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let fragment = format!("data-for-request-{seq}-{}", rand::random::<f64>());

    Document::with_capacity(3)
        .with("requestId", format!("req-{nanos}"))
        .with("payload", fragment.repeat(payload_repeat))
        .with("timestamp", DateTimeMillis::now())
}

impl<E: Executor> Operation for InsertFlood<E> {
    type Request = Document;

    fn name(&self) -> &str {
        "insert_flood"
    }

    async fn preflight(&self) -> Result<(), ExecError> {
        self.executor.ping().await
    }

    fn prepare(&self, seq: u64) -> Document {
        flood_document(seq, self.options.payload_repeat)
    }

    async fn execute(&self, doc: Document) -> Result<Completed, ExecError> {
        self.executor.insert_one(&self.options.target, doc).await?;
        Ok(Completed::applied(WriteCounts::inserted(1)))
    }
}

#[cfg(test)]
mod tests {
    use docbench_value::Value;

    use super::*;

    #[test]
    fn document_carries_repeated_payload() {
        let doc = flood_document(7, 3);

        let payload = doc
            .get("payload")
            .and_then(Value::as_str)
            .unwrap_or_else(|| panic!("payload missing"));
        let fragment_len = payload.len() / 3;
        assert!(payload.starts_with("data-for-request-7-"));
        assert_eq!(payload[..fragment_len].repeat(3), payload);

        let request_id = doc
            .get("requestId")
            .and_then(Value::as_str)
            .unwrap_or_else(|| panic!("requestId missing"));
        assert!(request_id.starts_with("req-"));
        assert!(matches!(doc.get("timestamp"), Some(Value::DateTime(_))));
    }

    #[test]
    fn default_target_matches_admission_test() {
        let options = FloodOptions::default();
        assert_eq!(options.target.to_string(), "admission_test_db.requests");
        assert_eq!(options.payload_repeat, 100);
    }
}
