//! Core traits: the request handler capability and outbound message sinks.

use async_trait::async_trait;
use thiserror::Error;

use crate::content::{
    CompleteReply, CompleteRequest, Content, DisplayData, ExecuteReply, ExecuteRequest,
    InspectReply, InspectRequest, IsCompleteReply, IsCompleteRequest, KernelInfo, Stream,
};
use crate::context::ExecutionContext;
use crate::message::{Channel, Message};

/// Outbound send failure.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("{0} sink closed")]
    Closed(Channel),
}

/// Destination for outgoing messages.
///
/// Implemented by a connection's writer queue (replies) and by the broadcast
/// fan-out (events). Delivery is at-most-once; callers log failures and move
/// on.
pub trait MessageSink: Send + Sync {
    /// Queue `msg` for delivery.
    ///
    /// # Errors
    /// Returns [`SendError::Closed`] if the destination is gone.
    fn send(&self, msg: Message) -> Result<(), SendError>;
}

/// Side-channel output for one execute request.
///
/// Every event is parented to the request being executed and goes out on
/// the broadcast channel. Borrowed for the duration of
/// [`RequestHandler::execute`] only.
pub struct ExecuteOutput<'a> {
    request: &'a Message,
    sink: &'a dyn MessageSink,
}

impl<'a> ExecuteOutput<'a> {
    #[must_use]
    pub const fn new(request: &'a Message, sink: &'a dyn MessageSink) -> Self {
        Self { request, sink }
    }

    /// Write `text` to the stream called `name` (`stdout`, `stderr`).
    pub fn stream(&self, name: &str, text: &str) {
        self.emit(Content::Stream(Stream {
            name: name.to_string(),
            text: text.to_string(),
        }));
    }

    /// Emit rich output; `update` replaces a previous display with the same
    /// `display_id`.
    pub fn display(&self, data: DisplayData, update: bool) {
        self.emit(if update {
            Content::UpdateDisplayData(data)
        } else {
            Content::DisplayData(data)
        });
    }

    fn emit(&self, content: Content) {
        let msg_type = content.msg_type();
        let event = Message::with_parent(self.request, content).on(Channel::IoPub);
        if let Err(e) = self.sink.send(event) {
            tracing::error!("Failed to send {msg_type}: {e}");
        }
    }
}

/// Capability set the engine dispatches requests to.
///
/// Exactly one implementation is bound at startup. `execute` calls are
/// strictly serialized by the engine; the other operations may run
/// concurrently with an execution and must be read-only.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Static kernel descriptor.
    fn kernel_info(&self) -> KernelInfo;

    /// Run one request.
    ///
    /// An error is a result value, not a fault: return a reply with
    /// `status: error`. Must return promptly once `ctx` is cancelled.
    async fn execute(
        &self,
        ctx: &ExecutionContext,
        request: &ExecuteRequest,
        output: &ExecuteOutput<'_>,
    ) -> ExecuteReply;

    /// Completion candidates at the cursor.
    fn complete(&self, request: &CompleteRequest) -> CompleteReply;

    /// Documentation for the token at the cursor.
    fn inspect(&self, request: &InspectRequest) -> InspectReply;

    /// Whether the input is ready to run; `None` defers to the engine's
    /// generic heuristic.
    fn is_complete(&self, request: &IsCompleteRequest) -> Option<IsCompleteReply>;
}
