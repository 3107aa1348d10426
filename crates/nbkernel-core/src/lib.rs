//! Core abstractions for notebook kernels.
//!
//! This crate provides the fundamental building blocks:
//! - `Message` - Wire message with header/parent-header correlation
//! - `Content` - Closed set of typed payloads
//! - `Signer` - Multipart encoding with HMAC signing
//! - `ExecutionSlot` - The cancellable context of the running request
//! - `RequestHandler` and `MessageSink` traits

pub mod content;
pub mod context;
pub mod message;
pub mod traits;
pub mod wire;

pub use content::{
    CompleteReply, CompleteRequest, Completeness, Content, DisplayData, ExecuteInput,
    ExecuteReply, ExecuteRequest, ExecutionState, InspectReply, InspectRequest, IsCompleteReply,
    IsCompleteRequest, KernelInfo, LanguageInfo, ReplyStatus, ShutdownReply, ShutdownRequest,
    StatusReply,
};
pub use context::{ExecutionContext, ExecutionGuard, ExecutionSlot, InterruptHandle};
pub use message::{Channel, Header, Message, PROTOCOL_VERSION};
pub use traits::{ExecuteOutput, MessageSink, RequestHandler, SendError};
pub use wire::{MessageError, Signer};
