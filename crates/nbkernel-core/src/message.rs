//! Wire message representation and parent-header correlation.

use std::fmt;

use bytes::Bytes;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::content::Content;

/// Protocol version stamped on every header the kernel creates.
pub const PROTOCOL_VERSION: &str = "5.3";

const KERNEL_USERNAME: &str = "kernel";

/// Transport a message arrived on or must be sent on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Request/reply channel for user requests.
    Shell,
    /// Request/reply channel for interrupts and shutdown.
    Control,
    /// Broadcast channel for status, stream and display events.
    IoPub,
    /// Input-request channel.
    Stdin,
    /// Liveness echo.
    Heartbeat,
}

impl Channel {
    /// Short name used in logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Shell => "shell",
            Self::Control => "control",
            Self::IoPub => "iopub",
            Self::Stdin => "stdin",
            Self::Heartbeat => "hb",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Message header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Unique id; replies and events name it in their parent header.
    pub msg_id: String,
    /// Wire message kind, e.g. `execute_request`.
    pub msg_type: String,
    /// Client session the message belongs to.
    pub session: String,
    #[serde(default)]
    pub username: String,
    /// RFC 3339 creation time.
    #[serde(default)]
    pub date: String,
    /// Protocol version.
    #[serde(default)]
    pub version: String,
}

impl Header {
    /// Fresh header with a random id and the current time.
    #[must_use]
    pub fn new(msg_type: impl Into<String>, session: impl Into<String>) -> Self {
        Self {
            msg_id: Uuid::new_v4().to_string(),
            msg_type: msg_type.into(),
            session: session.into(),
            username: KERNEL_USERNAME.to_string(),
            date: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            version: PROTOCOL_VERSION.to_string(),
        }
    }
}

/// A decoded kernel message.
///
/// `channel` and `identities` are routing metadata: they are not part of the
/// signed payload but decide where a reply goes.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub channel: Channel,
    /// Routing prefix copied onto replies.
    pub identities: Vec<Bytes>,
    pub header: Header,
    /// Header of the request that triggered this message.
    pub parent_header: Option<Header>,
    pub metadata: Map<String, Value>,
    pub content: Content,
    /// Raw binary frames after the content.
    pub buffers: Vec<Bytes>,
}

impl Message {
    /// Create a message that answers or reports on nothing.
    #[must_use]
    pub fn new(channel: Channel, session: impl Into<String>, content: Content) -> Self {
        Self {
            channel,
            identities: Vec::new(),
            header: Header::new(content.msg_type(), session),
            parent_header: None,
            metadata: Map::new(),
            content,
            buffers: Vec::new(),
        }
    }

    /// Create a message triggered by `parent`.
    ///
    /// The parent's header becomes this message's parent header, and its
    /// session, identities and channel are inherited so a reply routes back
    /// to the originator. Use [`Message::on`] to redirect to another channel.
    #[must_use]
    pub fn with_parent(parent: &Self, content: Content) -> Self {
        Self {
            channel: parent.channel,
            identities: parent.identities.clone(),
            header: Header::new(content.msg_type(), parent.header.session.clone()),
            parent_header: Some(parent.header.clone()),
            metadata: Map::new(),
            content,
            buffers: Vec::new(),
        }
    }

    /// Retarget the message to `channel`.
    #[must_use]
    pub const fn on(mut self, channel: Channel) -> Self {
        self.channel = channel;
        self
    }

    /// Wire message kind from the header.
    #[must_use]
    pub fn msg_type(&self) -> &str {
        &self.header.msg_type
    }

    /// Unique id from the header.
    #[must_use]
    pub fn msg_id(&self) -> &str {
        &self.header.msg_id
    }

    /// Whether this message was triggered by `request`.
    #[must_use]
    pub fn is_child_of(&self, request: &Self) -> bool {
        self.parent_header
            .as_ref()
            .is_some_and(|p| p.msg_id == request.header.msg_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{ExecuteReply, ExecuteRequest};

    #[test]
    fn test_with_parent_correlates() {
        let request = Message::new(
            Channel::Shell,
            "session-1",
            Content::ExecuteRequest(ExecuteRequest::new("1 + 1")),
        );
        let mut request = request;
        request.identities.push(Bytes::from_static(b"client-a"));

        let reply = Message::with_parent(&request, Content::ExecuteReply(ExecuteReply::ok(1)));

        assert_eq!(reply.parent_header.as_ref(), Some(&request.header));
        assert_eq!(reply.header.session, "session-1");
        assert_eq!(reply.msg_type(), "execute_reply");
        assert_eq!(reply.identities, request.identities);
        assert_eq!(reply.channel, Channel::Shell);
        assert_ne!(reply.msg_id(), request.msg_id());
        assert!(reply.is_child_of(&request));
        assert!(!request.is_child_of(&reply));
    }

    #[test]
    fn test_on_retargets_channel() {
        let request = Message::new(Channel::Shell, "s", Content::KernelInfoRequest);
        let event = Message::with_parent(&request, Content::status(crate::ExecutionState::Idle))
            .on(Channel::IoPub);
        assert_eq!(event.channel, Channel::IoPub);
        assert!(event.is_child_of(&request));
    }

    #[test]
    fn test_header_defaults() {
        let header = Header::new("status", "s");
        assert_eq!(header.version, PROTOCOL_VERSION);
        assert_eq!(header.username, "kernel");
        assert!(header.date.ends_with('Z'));
    }
}
