//! Routing of decoded requests to the handler or the execute queue.

use std::sync::Arc;

use async_trait::async_trait;
use nbkernel_core::{
    Channel, Content, ExecuteReply, Message, MessageSink, ReplyStatus, RequestHandler,
    ShutdownReply, StatusReply,
};
use nbkernel_transport::Dispatcher;
use tokio_util::sync::CancellationToken;

use crate::{
    completeness,
    scheduler::{QueueItem, SchedulerError, SchedulerHandle},
};

/// [`Dispatcher`] shared by the shell, control and stdin channels.
///
/// Execute requests go through the scheduler; everything else is answered
/// inline on the connection it arrived on.
pub struct KernelDispatcher {
    handler: Arc<dyn RequestHandler>,
    scheduler: SchedulerHandle,
    shutdown: CancellationToken,
}

impl KernelDispatcher {
    #[must_use]
    pub fn new(
        handler: Arc<dyn RequestHandler>,
        scheduler: SchedulerHandle,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            handler,
            scheduler,
            shutdown,
        }
    }

    async fn enqueue(&self, msg: Message, reply: Arc<dyn MessageSink>) {
        let Some(item) = QueueItem::new(msg, reply) else {
            return;
        };
        if let Err(SchedulerError::QueueClosed(item)) = self.scheduler.push(item).await {
            tracing::warn!(
                "Execute queue closed, aborting {}",
                item.request().msg_id()
            );
            item.respond(ExecuteReply::abort());
        }
    }

    /// Reply content for a request answered inline, if it is routed here.
    fn answer(&self, msg: &Message) -> Option<Content> {
        let content = match (msg.channel, &msg.content) {
            (Channel::Shell | Channel::Control, Content::KernelInfoRequest) => {
                Content::KernelInfoReply(self.handler.kernel_info())
            }
            (Channel::Shell, Content::CompleteRequest(request)) => {
                Content::CompleteReply(self.handler.complete(request))
            }
            (Channel::Shell, Content::InspectRequest(request)) => {
                Content::InspectReply(self.handler.inspect(request))
            }
            (Channel::Shell, Content::IsCompleteRequest(request)) => Content::IsCompleteReply(
                self.handler
                    .is_complete(request)
                    .unwrap_or_else(|| completeness::check(&request.code)),
            ),
            (Channel::Control, Content::InterruptRequest) => {
                let interrupted = self.scheduler.interrupt();
                tracing::debug!("Interrupt requested, running execution cancelled: {interrupted}");
                Content::InterruptReply(StatusReply::default())
            }
            (Channel::Control, Content::ShutdownRequest(request)) => {
                Content::ShutdownReply(ShutdownReply {
                    status: ReplyStatus::Ok,
                    restart: request.restart,
                })
            }
            _ => return None,
        };
        Some(content)
    }
}

#[async_trait]
impl Dispatcher for KernelDispatcher {
    async fn dispatch(&self, msg: Message, reply: Arc<dyn MessageSink>) {
        if msg.channel == Channel::Shell && matches!(msg.content, Content::ExecuteRequest(_)) {
            self.enqueue(msg, reply).await;
            return;
        }

        let Some(content) = self.answer(&msg) else {
            tracing::warn!("Ignoring {} on {}", msg.msg_type(), msg.channel);
            return;
        };

        let shutdown = matches!(content, Content::ShutdownReply(_));
        let msg_type = content.msg_type();
        if let Err(e) = reply.send(Message::with_parent(&msg, content)) {
            tracing::error!("Failed to send {msg_type}: {e}");
        }
        if shutdown {
            tracing::info!("Shutdown requested");
            self.shutdown.cancel();
        }
    }
}
