//! Broadcast channel: forwards every published event to every subscriber.

use futures::{SinkExt, StreamExt, stream::BoxStream};
use nbkernel_core::{Message, Signer};
use tokio::{
    io::AsyncReadExt,
    net::{TcpListener, TcpStream},
};
use tokio_util::{codec::FramedWrite, sync::CancellationToken};

use crate::{codec::MultipartCodec, publisher::Publisher};

/// Accept loop for iopub subscribers.
pub struct BroadcastChannel {
    signer: Signer,
    codec: MultipartCodec,
    publisher: Publisher,
}

impl BroadcastChannel {
    #[must_use]
    pub const fn new(signer: Signer, codec: MultipartCodec, publisher: Publisher) -> Self {
        Self {
            signer,
            codec,
            publisher,
        }
    }

    /// Accept subscribers until `token` is cancelled.
    ///
    /// Subscriber connections outlive the accept loop: each one keeps
    /// forwarding until every publisher is dropped, so events emitted while
    /// the kernel shuts down still reach clients.
    pub async fn serve(self, listener: TcpListener, token: CancellationToken) {
        loop {
            tokio::select! {
                () = token.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tracing::debug!("iopub subscriber {peer}");
                        let events = self.publisher.stream();
                        tokio::spawn(forward(events, stream, self.signer.clone(), self.codec));
                    }
                    Err(e) => tracing::error!("iopub accept failed: {e}"),
                },
            }
        }
        tracing::debug!("iopub channel stopped");
    }
}

async fn forward(
    mut events: BoxStream<'static, Message>,
    stream: TcpStream,
    signer: Signer,
    codec: MultipartCodec,
) {
    let (mut reader, writer) = stream.into_split();
    let mut sink = FramedWrite::new(writer, codec);
    let mut scratch = [0u8; 256];

    loop {
        tokio::select! {
            event = events.next() => {
                let Some(msg) = event else { break };
                if let Err(e) = sink.send(msg.encode(&signer)).await {
                    tracing::error!("Failed to send {} on iopub: {e}", msg.msg_type());
                    break;
                }
            }
            // Subscribers never send anything meaningful; EOF means gone.
            read = reader.read(&mut scratch) => match read {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            },
        }
    }
}
