//! Request scheduling and dispatch for notebook kernels.
//!
//! Provides:
//! - `Scheduler` - Serialized execute queue with stop-on-error and interrupt
//! - `StatusPublisher` - Busy/idle brackets on the broadcast channel
//! - `KernelDispatcher` - Routing of shell and control requests
//! - `KernelServer` - Every channel wired to one lifetime token

pub mod completeness;
pub mod config;
pub mod dispatch;
pub mod scheduler;
pub mod server;
pub mod status;

#[cfg(test)]
mod testing;

pub use config::EngineConfig;
pub use dispatch::KernelDispatcher;
pub use scheduler::{QueueItem, Scheduler, SchedulerError, SchedulerHandle};
pub use server::KernelServer;
pub use status::StatusPublisher;
