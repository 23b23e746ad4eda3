//! HTTP uploader driving a remote storage endpoint.

use loadgen_core::{OperationOutcome, SetupError, TaskError, WorkloadUnit};

use crate::workloads::payload::PayloadSpec;

/// Uploads random payloads to the remote storage endpoint over HTTP.
#[derive(Debug)]
pub struct HttpPut {
    client: reqwest::Client,
    remote: String,
    payloads: PayloadSpec,
}

impl HttpPut {
    pub(crate) fn new(remote: String, payloads: PayloadSpec) -> Self {
        Self {
            client: reqwest::Client::new(),
            remote: remote.trim_end_matches('/').to_owned(),
            payloads,
        }
    }

    fn object_url(&self, index: u64) -> String {
        format!("{}/loadgen/chunk-{index}", self.remote)
    }
}

#[async_trait::async_trait]
impl WorkloadUnit for HttpPut {
    async fn prepare(&mut self) -> Result<(), SetupError> {
        // Fail fast when the remote is unreachable instead of failing every
        // single task. Any HTTP status counts as reachable.
        self.client
            .get(&self.remote)
            .send()
            .await
            .map_err(SetupError::new)?;
        Ok(())
    }

    async fn execute(&self, index: u64) -> Result<OperationOutcome, TaskError> {
        let payload = self.payloads.payload(index);
        let bytes = payload.len() as u64;

        self.client
            .put(self.object_url(index))
            .body(payload)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| TaskError::new("put", err))?;

        Ok(OperationOutcome::new("put").with_bytes(bytes))
    }
}

#[cfg(test)]
mod tests {
    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::put;
    use bytes::Bytes;

    use crate::config::PayloadConfig;

    use super::*;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn payloads() -> PayloadSpec {
        PayloadSpec::new(&PayloadConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn uploads_payloads() {
        let app = Router::new().route(
            "/loadgen/{key}",
            put(|body: Bytes| async move {
                assert!(!body.is_empty());
                StatusCode::CREATED
            }),
        );
        let remote = serve(app).await;

        let mut unit = HttpPut::new(remote, payloads());
        unit.prepare().await.unwrap();

        let outcome = unit.execute(3).await.unwrap();
        assert_eq!(outcome.operation, "put");
        assert!(outcome.bytes > 0);
    }

    #[tokio::test]
    async fn server_errors_fail_the_task() {
        let app = Router::new().route(
            "/loadgen/{key}",
            put(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        );
        let remote = serve(app).await;

        let unit = HttpPut::new(remote, payloads());
        assert!(unit.execute(0).await.is_err());
    }

    #[tokio::test]
    async fn unreachable_remote_fails_preparation() {
        // Nothing listens on this port.
        let mut unit = HttpPut::new("http://127.0.0.1:1".to_owned(), payloads());
        assert!(unit.prepare().await.is_err());
    }
}
