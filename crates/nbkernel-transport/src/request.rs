//! Request/reply channels: shell, control and stdin.

use std::sync::Arc;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use nbkernel_core::{Channel, Message, MessageSink, SendError, Signer};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::mpsc,
};
use tokio_util::{codec::Framed, sync::CancellationToken};

use crate::codec::MultipartCodec;

/// Receives decoded requests from a request channel.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Handle `msg`, sending any reply through `reply`.
    ///
    /// The connection reads its next message only after this returns, so a
    /// slow dispatch applies backpressure to that connection alone.
    async fn dispatch(&self, msg: Message, reply: Arc<dyn MessageSink>);
}

/// Send path of one connection.
///
/// Replies are queued to the connection's writer task, which stays alive
/// until every handle is dropped.
#[derive(Debug, Clone)]
pub struct Replier {
    channel: Channel,
    tx: mpsc::UnboundedSender<Message>,
}

impl MessageSink for Replier {
    fn send(&self, msg: Message) -> Result<(), SendError> {
        self.tx
            .send(msg.on(self.channel))
            .map_err(|_| SendError::Closed(self.channel))
    }
}

/// Accept loop and per-connection receive loop for one request channel.
#[derive(Clone)]
pub struct RequestChannel {
    channel: Channel,
    signer: Signer,
    codec: MultipartCodec,
    dispatcher: Arc<dyn Dispatcher>,
}

impl RequestChannel {
    #[must_use]
    pub fn new(
        channel: Channel,
        signer: Signer,
        codec: MultipartCodec,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        Self {
            channel,
            signer,
            codec,
            dispatcher,
        }
    }

    /// Accept connections until `token` is cancelled.
    pub async fn serve(self, listener: TcpListener, token: CancellationToken) {
        loop {
            tokio::select! {
                () = token.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tracing::debug!("{} connection from {peer}", self.channel);
                        tokio::spawn(self.clone().handle_connection(stream, token.clone()));
                    }
                    Err(e) => tracing::error!("{} accept failed: {e}", self.channel),
                },
            }
        }
        tracing::debug!("{} channel stopped", self.channel);
    }

    async fn handle_connection(self, stream: TcpStream, token: CancellationToken) {
        let (mut sink, mut frames) = Framed::new(stream, self.codec).split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        let replier: Arc<dyn MessageSink> = Arc::new(Replier {
            channel: self.channel,
            tx,
        });

        let signer = self.signer.clone();
        let channel = self.channel;
        let writer = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                let frames = msg.encode(&signer);
                if let Err(e) = sink.send(frames).await {
                    tracing::error!("Failed to send {} on {channel}: {e}", msg.msg_type());
                    break;
                }
            }
        });

        loop {
            let next = tokio::select! {
                () = token.cancelled() => break,
                next = frames.next() => next,
            };
            match next {
                Some(Ok(parts)) => match Message::decode(parts, self.channel, &self.signer) {
                    Ok(msg) => {
                        self.dispatcher.dispatch(msg, Arc::clone(&replier)).await;
                    }
                    Err(e) => {
                        tracing::warn!("Dropping malformed message on {}: {e}", self.channel);
                    }
                },
                Some(Err(e)) => {
                    // The stream cannot resynchronise after a framing error.
                    tracing::warn!("Closing {} connection: {e}", self.channel);
                    break;
                }
                None => break,
            }
        }

        drop(replier);
        if let Err(e) = writer.await {
            tracing::error!("{} writer task failed: {e}", self.channel);
        }
    }
}
