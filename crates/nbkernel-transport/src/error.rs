//! Transport error.

use nbkernel_core::Channel;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Failed to bind {channel} on port {port}: {source}")]
    Bind {
        channel: Channel,
        port: u16,
        #[source]
        source: std::io::Error,
    },
    #[error("Message of {size} bytes exceeds limit of {max}")]
    MessageTooLarge { size: usize, max: usize },
    #[error("Unsupported transport: {0}")]
    UnsupportedTransport(String),
    #[error("Unsupported signature scheme: {0}")]
    UnsupportedSignatureScheme(String),
}
