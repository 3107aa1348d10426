//! Engine tunables.

use nbkernel_transport::TransportConfig;

use crate::scheduler::DEFAULT_QUEUE_CAPACITY;

/// Configuration for a [`crate::KernelServer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Execute requests that may wait before `push` applies backpressure.
    pub queue_capacity: usize,
    pub transport: TransportConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            transport: TransportConfig::default(),
        }
    }
}
