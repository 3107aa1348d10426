//! Liveness channel: echoes every byte back.

use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

/// Echo every connection until `token` is cancelled.
pub async fn serve_heartbeat(listener: TcpListener, token: CancellationToken) {
    loop {
        tokio::select! {
            () = token.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    tokio::spawn(echo(stream, token.clone()));
                }
                Err(e) => tracing::error!("hb accept failed: {e}"),
            },
        }
    }
}

async fn echo(mut stream: TcpStream, token: CancellationToken) {
    let (mut reader, mut writer) = stream.split();
    tokio::select! {
        () = token.cancelled() => {}
        copied = tokio::io::copy(&mut reader, &mut writer) => {
            if let Err(e) = copied {
                tracing::debug!("hb connection closed: {e}");
            }
        }
    }
}
