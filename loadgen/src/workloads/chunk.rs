//! Chunk writer exercising the filesystem write path of a storage node.

use std::io::ErrorKind;
use std::path::PathBuf;

use tokio::fs::OpenOptions;
use tokio::io::{AsyncWriteExt, BufWriter};

use loadgen_core::{OperationOutcome, SetupError, TaskError, TeardownError, WorkloadUnit};

use crate::workloads::payload::PayloadSpec;

/// Writes chunks of log-normal distributed size into the target directory.
///
/// Chunk contents are derived from the task index, so they are reproducible
/// across runs with the same payload configuration.
#[derive(Debug)]
pub struct ChunkWrite {
    root: PathBuf,
    payloads: PayloadSpec,
}

impl ChunkWrite {
    pub(crate) fn new(root: PathBuf, payloads: PayloadSpec) -> Self {
        Self { root, payloads }
    }
}

#[async_trait::async_trait]
impl WorkloadUnit for ChunkWrite {
    async fn prepare(&mut self) -> Result<(), SetupError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(SetupError::new)
    }

    async fn execute(&self, index: u64) -> Result<OperationOutcome, TaskError> {
        let path = self.root.join(format!("chunk-{index}"));
        let payload = self.payloads.payload(index);
        let bytes = payload.len() as u64;

        let write = async {
            let file = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await?;
            let mut writer = BufWriter::new(file);
            writer.write_all(&payload).await?;
            writer.flush().await?;
            writer.into_inner().sync_data().await?;
            std::io::Result::Ok(())
        };
        write.await.map_err(|err| TaskError::new("write", err))?;

        Ok(OperationOutcome::new("write").with_bytes(bytes))
    }

    async fn cleanup(&mut self) -> Result<(), TeardownError> {
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(TeardownError::new(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::PayloadConfig;

    use super::*;

    fn unit(root: PathBuf) -> ChunkWrite {
        let payloads = PayloadSpec::new(&PayloadConfig::default()).unwrap();
        ChunkWrite::new(root, payloads)
    }

    #[tokio::test]
    async fn writes_and_cleans_up_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("chunks");
        let mut unit = unit(root.clone());

        unit.prepare().await.unwrap();
        let outcome = unit.execute(0).await.unwrap();
        assert_eq!(outcome.operation, "write");

        let written = std::fs::read(root.join("chunk-0")).unwrap();
        assert_eq!(written.len() as u64, outcome.bytes);

        unit.execute(1).await.unwrap();
        unit.cleanup().await.unwrap();
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn duplicate_indices_fail_instead_of_overwriting() {
        let dir = tempfile::tempdir().unwrap();
        let mut unit = unit(dir.path().join("chunks"));

        unit.prepare().await.unwrap();
        unit.execute(7).await.unwrap();
        assert!(unit.execute(7).await.is_err());
    }

    #[tokio::test]
    async fn cleanup_tolerates_a_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let mut unit = unit(dir.path().join("never-created"));
        unit.cleanup().await.unwrap();
    }
}
