//! Execution context for the execute request currently running.

use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;

/// Cancellable context bound to one running execute request.
///
/// Handlers must poll [`ExecutionContext::is_cancelled`] or select on
/// [`ExecutionContext::cancelled`] and return promptly once it fires.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    token: CancellationToken,
    execution_count: u32,
}

impl ExecutionContext {
    /// Create a context around `token`.
    #[must_use]
    pub const fn new(token: CancellationToken, execution_count: u32) -> Self {
        Self {
            token,
            execution_count,
        }
    }

    /// Whether the request was interrupted or the kernel is shutting down.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the request is interrupted or the kernel shuts down.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// Execution counter the scheduler assigned to this request.
    #[must_use]
    pub const fn execution_count(&self) -> u32 {
        self.execution_count
    }
}

type Slot = Arc<Mutex<Option<CancellationToken>>>;

/// Single-writer slot holding the running request's cancellation token.
///
/// Only the owner can begin and finish executions; read access for
/// cancellation is published through [`InterruptHandle`].
#[derive(Debug, Default)]
pub struct ExecutionSlot {
    current: Slot,
}

impl ExecutionSlot {
    /// Empty slot with nothing running.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle that can cancel whatever is running.
    #[must_use]
    pub fn interrupt_handle(&self) -> InterruptHandle {
        InterruptHandle {
            current: Arc::clone(&self.current),
        }
    }

    /// Publish a new context derived from `parent`.
    ///
    /// The context is cancelled and cleared when the guard drops.
    pub fn begin(&mut self, parent: &CancellationToken, execution_count: u32) -> ExecutionGuard<'_> {
        let token = parent.child_token();
        *lock(&self.current) = Some(token.clone());
        ExecutionGuard {
            slot: self,
            context: ExecutionContext::new(token, execution_count),
        }
    }

    /// Whether an execution is in progress.
    #[must_use]
    pub fn is_running(&self) -> bool {
        lock(&self.current).is_some()
    }
}

/// Live execution; clears the slot on drop.
#[derive(Debug)]
pub struct ExecutionGuard<'a> {
    slot: &'a ExecutionSlot,
    context: ExecutionContext,
}

impl ExecutionGuard<'_> {
    /// Context to hand to the handler.
    #[must_use]
    pub const fn context(&self) -> &ExecutionContext {
        &self.context
    }
}

impl Drop for ExecutionGuard<'_> {
    fn drop(&mut self) {
        self.context.token.cancel();
        lock(&self.slot.current).take();
    }
}

/// Cancels the running execution, if any.
///
/// Racing with completion is harmless: cancelling a finished context is a
/// no-op.
#[derive(Debug, Clone)]
pub struct InterruptHandle {
    current: Slot,
}

impl InterruptHandle {
    /// Returns whether a running execution was cancelled.
    pub fn interrupt(&self) -> bool {
        lock(&self.current).as_ref().is_some_and(|token| {
            token.cancel();
            true
        })
    }

    /// Whether an execution is in progress.
    #[must_use]
    pub fn is_running(&self) -> bool {
        lock(&self.current).is_some()
    }
}

fn lock(slot: &Mutex<Option<CancellationToken>>) -> std::sync::MutexGuard<'_, Option<CancellationToken>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}
