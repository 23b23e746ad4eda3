//! Directory tree generator exercising the metadata path of a storage node.

use std::io::ErrorKind;
use std::path::PathBuf;

use loadgen_core::{OperationOutcome, SetupError, TaskError, TeardownError, WorkloadUnit};

use crate::config::DirTreeConfig;

/// Creates one nested directory chain per task.
///
/// The chain for a task is derived from its index interpreted as base-`span`
/// digits, so concurrent tasks spread across the tree instead of contending
/// on a single parent.
#[derive(Debug)]
pub struct DirTree {
    root: PathBuf,
    depth: u32,
    span: u64,
}

impl DirTree {
    pub(crate) fn new(root: PathBuf, config: &DirTreeConfig) -> Self {
        Self {
            root,
            depth: config.depth.max(1),
            span: u64::from(config.span.max(1)),
        }
    }

    fn leaf_path(&self, index: u64) -> PathBuf {
        let mut path = self.root.clone();
        let mut rest = index;
        for level in 0..self.depth {
            path.push(format!("dir-{level}-{}", rest % self.span));
            rest /= self.span;
        }
        path
    }
}

#[async_trait::async_trait]
impl WorkloadUnit for DirTree {
    async fn prepare(&mut self) -> Result<(), SetupError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(SetupError::new)
    }

    async fn execute(&self, index: u64) -> Result<OperationOutcome, TaskError> {
        tokio::fs::create_dir_all(self.leaf_path(index))
            .await
            .map_err(|err| TaskError::new("mkdir", err))?;
        Ok(OperationOutcome::new("mkdir"))
    }

    async fn cleanup(&mut self) -> Result<(), TeardownError> {
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(TeardownError::new(err)),
        }
    }
}
