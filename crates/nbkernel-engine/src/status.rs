//! Busy/idle brackets on the broadcast channel.

use std::{future::Future, sync::Arc};

use nbkernel_core::{Channel, Content, ExecutionState, Message, MessageSink};

/// Publishes status and other events parented to a request.
#[derive(Clone)]
pub struct StatusPublisher {
    sink: Arc<dyn MessageSink>,
}

impl StatusPublisher {
    #[must_use]
    pub fn new(sink: Arc<dyn MessageSink>) -> Self {
        Self { sink }
    }

    /// Broadcast sink the events go to.
    #[must_use]
    pub fn sink(&self) -> &dyn MessageSink {
        self.sink.as_ref()
    }

    /// Broadcast `content` parented to `request`.
    pub fn publish(&self, request: &Message, content: Content) {
        let msg_type = content.msg_type();
        let event = Message::with_parent(request, content).on(Channel::IoPub);
        if let Err(e) = self.sink.send(event) {
            tracing::error!("Failed to publish {msg_type}: {e}");
        }
    }

    /// Run `work` between a `busy` and an `idle` event parented to `request`.
    ///
    /// `idle` is published whatever `work` returns, and its output is handed
    /// back unchanged. Callers must not nest brackets.
    pub async fn with_busy_bracket<F, Fut, T>(&self, request: &Message, work: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.publish(request, Content::status(ExecutionState::Busy));
        let out = work().await;
        self.publish(request, Content::status(ExecutionState::Idle));
        out
    }
}
