//! Built-in workload units.
//!
//! Each unit exercises a different part of the target system through the
//! same [`WorkloadUnit`] contract and is registered by name; `loadgen list`
//! prints this catalog.

use anyhow::Context;

use loadgen_core::{WorkloadRegistry, WorkloadUnit};

use crate::config::Config;

mod chunk;
mod dir_tree;
mod noop;
mod payload;
mod remote;

use self::payload::PayloadSpec;

/// The registry of all built-in workload units.
pub fn builtin() -> WorkloadRegistry<Config> {
    let mut registry = WorkloadRegistry::new();

    registry.register(
        "noop",
        "instantly succeeding tasks measuring raw scheduler overhead",
        |_config: &Config| Ok(Box::new(noop::Noop) as Box<dyn WorkloadUnit>),
    );

    registry.register(
        "chunk-write",
        "write random chunks into the target directory",
        |config| {
            let payloads = PayloadSpec::new(&config.payload)?;
            let root = config.target.path.join("chunks");
            Ok(Box::new(chunk::ChunkWrite::new(root, payloads)) as Box<dyn WorkloadUnit>)
        },
    );

    registry.register(
        "dir-tree",
        "create nested directory trees under the target path",
        |config| {
            let root = config.target.path.join("tree");
            Ok(Box::new(dir_tree::DirTree::new(root, &config.dir_tree)) as Box<dyn WorkloadUnit>)
        },
    );

    registry.register(
        "http-put",
        "upload random payloads to the remote storage endpoint",
        |config| {
            let remote = config
                .target
                .remote
                .clone()
                .context("http-put requires target.remote to be configured")?;
            let payloads = PayloadSpec::new(&config.payload)?;
            Ok(Box::new(remote::HttpPut::new(remote, payloads)) as Box<dyn WorkloadUnit>)
        },
    );

    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builtin_units_resolve() {
        let registry = builtin();
        let config = Config::default();

        assert!(registry.resolve("noop", &config).is_ok());
        assert!(registry.resolve("chunk-write", &config).is_ok());
        assert!(registry.resolve("dir-tree", &config).is_ok());
        assert!(registry.resolve("nope", &config).is_err());
    }

    #[tokio::test]
    async fn http_put_requires_a_remote() {
        let registry = builtin();
        let mut config = Config::default();
        assert!(registry.resolve("http-put", &config).is_err());

        config.target.remote = Some("http://localhost:8888".to_owned());
        assert!(registry.resolve("http-put", &config).is_ok());
    }
}
