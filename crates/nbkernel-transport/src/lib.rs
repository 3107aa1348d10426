//! TCP transport channels for notebook kernels.
//!
//! Provides:
//! - Multipart framing codec
//! - Connection configuration
//! - Request/reply channels (shell, control, stdin)
//! - Broadcast channel (iopub) and its publisher
//! - Liveness echo (heartbeat)

pub mod codec;
pub mod config;
mod error;
pub mod heartbeat;
pub mod iopub;
pub mod listeners;
pub mod publisher;
pub mod request;

pub use codec::MultipartCodec;
pub use config::{ConnectionInfo, TransportConfig};
pub use error::TransportError;
pub use heartbeat::serve_heartbeat;
pub use iopub::BroadcastChannel;
pub use listeners::Listeners;
pub use publisher::Publisher;
pub use request::{Dispatcher, Replier, RequestChannel};
