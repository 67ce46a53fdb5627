//! Late-injected downstream clients.
//!
//! Clients cannot be dialled until the in-process server is up, so
//! controllers are constructed with empty slots and the daemon injects
//! the clients after the loopback starts. A call through an unwired slot
//! maps to `UNAVAILABLE`.

use std::sync::OnceLock;

use stigmer_pipeline::PipelineError;

/// A downstream client slot, set exactly once during bring-up.
pub struct Downstream<T> {
    name: &'static str,
    slot: OnceLock<T>,
}

impl<T: Clone> Downstream<T> {
    /// Create an empty slot; `name` identifies the target domain in
    /// error messages.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            slot: OnceLock::new(),
        }
    }

    /// Inject the client. Later calls are ignored; injection happens
    /// once during wiring.
    pub fn set(&self, client: T) {
        let _ = self.slot.set(client);
    }

    /// Clone the injected client, or fail with `UNAVAILABLE`.
    pub fn get(&self) -> Result<T, PipelineError> {
        self.slot.get().cloned().ok_or_else(|| {
            PipelineError::unavailable(format!(
                "{} downstream client is not wired",
                self.name
            ))
        })
    }
}

impl<T> std::fmt::Debug for Downstream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Downstream")
            .field("name", &self.name)
            .field("wired", &self.slot.get().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwired_slot_is_unavailable() {
        let slot: Downstream<u32> = Downstream::new("agent-instance");
        let err = slot.get().unwrap_err();
        assert_eq!(err.kind, stigmer_core::ErrorKind::Unavailable);
        assert!(err.message.contains("agent-instance"));
    }

    #[test]
    fn set_then_get() {
        let slot: Downstream<u32> = Downstream::new("environment");
        slot.set(7);
        assert_eq!(slot.get().unwrap(), 7);
        // Second set is a no-op.
        slot.set(9);
        assert_eq!(slot.get().unwrap(), 7);
    }
}
