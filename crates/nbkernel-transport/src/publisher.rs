//! Broadcast fan-out for the iopub channel.

use futures::StreamExt;
use nbkernel_core::{Channel, Message, MessageSink, SendError};
use tokio::sync::broadcast;
use tokio_stream::wrappers::{BroadcastStream, errors::BroadcastStreamRecvError};

/// Broadcast sender shared by every producer of iopub events.
///
/// Sending never blocks: with no subscribers events are dropped, and a slow
/// subscriber loses its oldest events.
#[derive(Debug, Clone)]
pub struct Publisher {
    sender: broadcast::Sender<Message>,
}

impl Default for Publisher {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl Publisher {
    /// Create a publisher buffering `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Get a receiver for live events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.sender.subscribe()
    }

    /// Stream of live events; lagged gaps are logged and skipped.
    #[must_use]
    pub fn stream(&self) -> futures::stream::BoxStream<'static, Message> {
        BroadcastStream::new(self.subscribe())
            .filter_map(|res| async move {
                match res {
                    Ok(msg) => Some(msg),
                    Err(BroadcastStreamRecvError::Lagged(n)) => {
                        tracing::warn!("iopub subscriber lagged, dropped {n} events");
                        None
                    }
                }
            })
            .boxed()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl MessageSink for Publisher {
    fn send(&self, msg: Message) -> Result<(), SendError> {
        // No subscribers is not a failure for a broadcast.
        let _ = self.sender.send(msg.on(Channel::IoPub));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use nbkernel_core::{Content, ExecutionState};

    use super::*;

    #[tokio::test]
    async fn test_fan_out_to_all_subscribers() {
        let publisher = Publisher::new(8);
        let mut a = publisher.stream();
        let mut b = publisher.stream();
        assert_eq!(publisher.subscriber_count(), 2);

        let msg = Message::new(Channel::Shell, "s", Content::status(ExecutionState::Busy));
        publisher.send(msg).unwrap();

        let got_a = a.next().await.unwrap();
        let got_b = b.next().await.unwrap();
        assert_eq!(got_a.channel, Channel::IoPub);
        assert_eq!(got_a, got_b);
    }

    #[test]
    fn test_send_without_subscribers() {
        let publisher = Publisher::default();
        let msg = Message::new(Channel::IoPub, "s", Content::status(ExecutionState::Idle));
        tokio_test::assert_ok!(publisher.send(msg));
    }

    #[tokio::test]
    async fn test_lagging_subscriber_skips() {
        let publisher = Publisher::new(1);
        let stream = publisher.stream();
        for state in [ExecutionState::Busy, ExecutionState::Idle] {
            publisher
                .send(Message::new(Channel::IoPub, "s", Content::status(state)))
                .unwrap();
        }
        drop(publisher);

        let received: Vec<_> = stream.collect().await;
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].content, Content::status(ExecutionState::Idle));
    }
}
