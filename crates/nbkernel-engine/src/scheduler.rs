//! Serialized execution of execute requests.
//!
//! Request channels accept messages concurrently, but clients send
//! successive execute requests without waiting for earlier replies, and
//! handler state is not safe for concurrent mutation. Every execute request
//! therefore goes through one bounded queue drained by a single loop, which
//! also aborts queued work when a request fails with `stop_on_error` or the
//! kernel shuts down.

use std::{fmt, sync::Arc};

use nbkernel_core::{
    Content, ExecuteInput, ExecuteOutput, ExecuteReply, ExecuteRequest, ExecutionSlot,
    InterruptHandle, Message, MessageSink, RequestHandler,
};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::status::StatusPublisher;

/// Default number of execute requests that may wait in the queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1 << 8;

/// A pending execute request and the connection its reply goes to.
pub struct QueueItem {
    request: Message,
    execute: ExecuteRequest,
    reply: Arc<dyn MessageSink>,
}

impl QueueItem {
    /// Wrap `request`; returns `None` unless it carries an execute request.
    #[must_use]
    pub fn new(request: Message, reply: Arc<dyn MessageSink>) -> Option<Self> {
        let Content::ExecuteRequest(execute) = &request.content else {
            return None;
        };
        let execute = execute.clone();
        Some(Self {
            request,
            execute,
            reply,
        })
    }

    /// The queued execute request.
    #[must_use]
    pub const fn request(&self) -> &Message {
        &self.request
    }

    /// Send `reply` to the originating connection.
    ///
    /// Delivery is at-most-once: a failure is logged and the item discarded.
    pub fn respond(&self, reply: ExecuteReply) {
        let msg = Message::with_parent(&self.request, Content::ExecuteReply(reply));
        if let Err(e) = self.reply.send(msg) {
            tracing::error!(
                "Failed to send execute_reply for {}: {e}",
                self.request.msg_id()
            );
        }
    }
}

impl fmt::Debug for QueueItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueItem")
            .field("msg_id", &self.request.msg_id())
            .field("code", &self.execute.code)
            .finish_non_exhaustive()
    }
}

/// Scheduler error.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The scheduler has stopped; the item is handed back.
    #[error("execute queue closed")]
    QueueClosed(QueueItem),
}

/// Handle for submitting execute requests and interrupting the running one.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<QueueItem>,
    interrupt: InterruptHandle,
}

impl SchedulerHandle {
    /// Enqueue an item, waiting while the queue is full.
    ///
    /// # Errors
    /// Returns [`SchedulerError::QueueClosed`] once the scheduler has stopped.
    pub async fn push(&self, item: QueueItem) -> Result<(), SchedulerError> {
        self.tx
            .send(item)
            .await
            .map_err(|e| SchedulerError::QueueClosed(e.0))
    }

    /// Cancel the running request's context; queued items are unaffected.
    ///
    /// Returns whether anything was running.
    pub fn interrupt(&self) -> bool {
        self.interrupt.interrupt()
    }

    /// Whether an execute request is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.interrupt.is_running()
    }
}

/// Single consumer of the execute queue.
pub struct Scheduler {
    rx: mpsc::Receiver<QueueItem>,
    handler: Arc<dyn RequestHandler>,
    status: StatusPublisher,
    slot: ExecutionSlot,
    shutdown: CancellationToken,
    execution_count: u32,
}

impl Scheduler {
    /// Create a scheduler (call [`Scheduler::run`] to start it) and its handle.
    #[must_use]
    pub fn new(
        capacity: usize,
        handler: Arc<dyn RequestHandler>,
        status: StatusPublisher,
        shutdown: CancellationToken,
    ) -> (Self, SchedulerHandle) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let slot = ExecutionSlot::new();
        let handle = SchedulerHandle {
            tx,
            interrupt: slot.interrupt_handle(),
        };
        let scheduler = Self {
            rx,
            handler,
            status,
            slot,
            shutdown,
            execution_count: 0,
        };
        (scheduler, handle)
    }

    /// Execute queued requests in FIFO order until shutdown or until every
    /// handle is dropped, then abort whatever is still queued.
    pub async fn run(mut self) {
        loop {
            let item = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break,
                item = self.rx.recv() => match item {
                    Some(item) => item,
                    None => break,
                },
            };

            let failed = self.execute(&item).await;
            if failed && item.execute.stop_on_error {
                let aborted = self.abort_queued().await;
                if aborted > 0 {
                    tracing::debug!(
                        "{} failed with stop_on_error, aborted {aborted} queued requests",
                        item.request.msg_id()
                    );
                }
            }
        }

        self.rx.close();
        let aborted = self.abort_queued().await;
        tracing::debug!("Scheduler stopped, aborted {aborted} queued requests");
    }

    /// Run one item; returns whether it failed without being cancelled.
    async fn execute(&mut self, item: &QueueItem) -> bool {
        if !item.execute.silent {
            self.execution_count += 1;
        }
        let count = self.execution_count;
        let silent = item.execute.silent;

        let handler = &self.handler;
        let status = &self.status;
        let shutdown = &self.shutdown;
        let slot = &mut self.slot;

        let (reply, cancelled) = status
            .with_busy_bracket(&item.request, move || async move {
                let guard = slot.begin(shutdown, count);
                if !silent {
                    status.publish(
                        &item.request,
                        Content::ExecuteInput(ExecuteInput {
                            code: item.execute.code.clone(),
                            execution_count: count,
                        }),
                    );
                }
                let output = ExecuteOutput::new(&item.request, status.sink());
                let reply = handler.execute(guard.context(), &item.execute, &output).await;
                (reply, guard.context().is_cancelled())
            })
            .await;

        let failed = reply.is_error();
        item.respond(reply);
        failed && !cancelled
    }

    /// Abort every item currently queued; returns how many.
    async fn abort_queued(&mut self) -> usize {
        let mut aborted = 0;
        while let Ok(item) = self.rx.try_recv() {
            let item = &item;
            self.status
                .with_busy_bracket(&item.request, move || async move {
                    item.respond(ExecuteReply::abort());
                })
                .await;
            aborted += 1;
        }
        aborted
    }
}
