//! The contract implemented by every workload generator.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use anyhow::anyhow;

use crate::error::{SetupError, TaskError, TeardownError};

/// A pluggable unit of benchmark work.
///
/// Implementations are stateless between lifecycle calls: `prepare` runs once
/// before any task is dispatched, `execute` is called concurrently from
/// multiple workers with distinct task indices, and `cleanup` runs once after
/// the run reached a terminal state.
#[async_trait::async_trait]
pub trait WorkloadUnit: fmt::Debug + Send + Sync + 'static {
    /// Called once before any tasks are dispatched.
    async fn prepare(&mut self) -> Result<(), SetupError> {
        Ok(())
    }

    /// Executes the task with the given index.
    async fn execute(&self, index: u64) -> Result<OperationOutcome, TaskError>;

    /// Called once after the run reached a terminal state.
    async fn cleanup(&mut self) -> Result<(), TeardownError> {
        Ok(())
    }
}

/// Result of one successfully executed task.
#[derive(Clone, Debug)]
pub struct OperationOutcome {
    /// Operation name the task is recorded under.
    pub operation: Cow<'static, str>,
    /// Bytes moved by the operation, for throughput accounting.
    pub bytes: u64,
}

impl OperationOutcome {
    /// Creates an outcome for the named operation.
    pub fn new(operation: impl Into<Cow<'static, str>>) -> Self {
        Self {
            operation: operation.into(),
            bytes: 0,
        }
    }

    /// Attaches the number of bytes moved by the operation.
    pub fn with_bytes(mut self, bytes: u64) -> Self {
        self.bytes = bytes;
        self
    }
}

/// Factory constructing a workload unit from the host context, typically the
/// process configuration.
pub type WorkloadFactory<C> =
    Box<dyn Fn(&C) -> anyhow::Result<Box<dyn WorkloadUnit>> + Send + Sync>;

/// Maps workload names to unit factories.
///
/// Units are independent of each other and share nothing but the
/// [`WorkloadUnit`] contract, so the registry is a flat name lookup rather
/// than any kind of hierarchy.
pub struct WorkloadRegistry<C> {
    entries: BTreeMap<&'static str, RegistryEntry<C>>,
}

struct RegistryEntry<C> {
    description: &'static str,
    factory: WorkloadFactory<C>,
}

impl<C> WorkloadRegistry<C> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Registers a unit factory under the given name.
    pub fn register<F>(&mut self, name: &'static str, description: &'static str, factory: F)
    where
        F: Fn(&C) -> anyhow::Result<Box<dyn WorkloadUnit>> + Send + Sync + 'static,
    {
        self.entries.insert(
            name,
            RegistryEntry {
                description,
                factory: Box::new(factory),
            },
        );
    }

    /// Constructs the unit registered under `name`.
    pub fn resolve(&self, name: &str, ctx: &C) -> anyhow::Result<Box<dyn WorkloadUnit>> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| anyhow!("unknown workload `{name}`"))?;
        (entry.factory)(ctx)
    }

    /// Iterates registered `(name, description)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
        self.entries
            .iter()
            .map(|(name, entry)| (*name, entry.description))
    }
}

impl<C> Default for WorkloadRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for WorkloadRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkloadRegistry")
            .field("workloads", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}
