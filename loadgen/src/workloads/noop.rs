//! Baseline workload measuring raw scheduler overhead.

use loadgen_core::{OperationOutcome, TaskError, WorkloadUnit};

/// A unit whose tasks complete instantly and always succeed.
#[derive(Debug)]
pub struct Noop;

#[async_trait::async_trait]
impl WorkloadUnit for Noop {
    async fn execute(&self, _index: u64) -> Result<OperationOutcome, TaskError> {
        Ok(OperationOutcome::new("noop"))
    }
}
