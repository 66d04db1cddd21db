//! Sending mechanisms and the table that selects them.

use crate::connection::Connection;
use crate::negotiation::NegotiationContext;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A way of moving bytes once negotiation has agreed on it.
///
/// From the moment `execute` is called the executor is the only writer of
/// progress, error and done for the context's transfer, and is expected to
/// watch the context's cancel signal at its own suspension points.
#[async_trait]
pub trait TransferExecutor: Send + Sync {
    /// Run the transfer described by `ctx` over `conn`
    async fn execute(&self, conn: Arc<dyn Connection>, ctx: NegotiationContext);
}

/// Immutable mechanism id to executor table
#[derive(Clone, Default)]
pub struct MechanismRegistry {
    mechanisms: BTreeMap<String, Arc<dyn TransferExecutor>>,
}

impl fmt::Debug for MechanismRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MechanismRegistry")
            .field("mechanisms", &self.mechanisms.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl MechanismRegistry {
    /// Start building a registry
    pub fn builder() -> MechanismRegistryBuilder {
        MechanismRegistryBuilder::default()
    }

    /// Executor registered for `mechanism`
    pub fn dispatch(&self, mechanism: &str) -> Option<Arc<dyn TransferExecutor>> {
        self.mechanisms.get(mechanism).cloned()
    }

    /// Registered mechanism ids, in the order they are offered
    pub fn mechanisms(&self) -> impl Iterator<Item = &str> {
        self.mechanisms.keys().map(String::as_str)
    }

    /// Number of registered mechanisms
    pub fn len(&self) -> usize {
        self.mechanisms.len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.mechanisms.is_empty()
    }
}

/// Builder for [`MechanismRegistry`]
#[derive(Default)]
pub struct MechanismRegistryBuilder {
    mechanisms: BTreeMap<String, Arc<dyn TransferExecutor>>,
}

impl MechanismRegistryBuilder {
    /// Register `executor` under `mechanism`, replacing any earlier entry
    pub fn register(
        mut self,
        mechanism: impl Into<String>,
        executor: Arc<dyn TransferExecutor>,
    ) -> Self {
        self.mechanisms.insert(mechanism.into(), executor);
        self
    }

    /// Freeze the table
    pub fn build(self) -> MechanismRegistry {
        MechanismRegistry {
            mechanisms: self.mechanisms,
        }
    }
}
