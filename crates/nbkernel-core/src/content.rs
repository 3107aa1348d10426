//! Typed content payloads, one per message kind.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

use crate::wire::MessageError;

/// Status carried by every `*_reply`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyStatus {
    /// Request handled successfully.
    #[default]
    Ok,
    /// Request ran and failed.
    Error,
    /// Request was discarded without running.
    Abort,
}

/// Kernel activity reported on the broadcast channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    Starting,
    Busy,
    Idle,
}

/// Verdict of an `is_complete_request`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completeness {
    Complete,
    Incomplete,
    Invalid,
    Unknown,
}

/// Language the kernel speaks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageInfo {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub mimetype: String,
    #[serde(default)]
    pub file_extension: String,
}

/// Static kernel descriptor returned for `kernel_info_request`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelInfo {
    #[serde(default)]
    pub status: ReplyStatus,
    pub protocol_version: String,
    pub implementation: String,
    pub implementation_version: String,
    pub language_info: LanguageInfo,
    #[serde(default)]
    pub banner: String,
}

const fn default_true() -> bool {
    true
}

/// Run a unit of code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub code: String,
    #[serde(default)]
    pub silent: bool,
    #[serde(default = "default_true")]
    pub store_history: bool,
    #[serde(default)]
    pub user_expressions: Map<String, Value>,
    #[serde(default)]
    pub allow_stdin: bool,
    /// Abort every other queued execute request if this one fails.
    ///
    /// Opt-in: a request without the field never aborts the queue.
    #[serde(default)]
    pub stop_on_error: bool,
}

impl ExecuteRequest {
    /// Create a request for `code` with protocol defaults.
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            silent: false,
            store_history: true,
            user_expressions: Map::new(),
            allow_stdin: false,
            stop_on_error: false,
        }
    }

    /// Override the stop-on-error flag.
    #[must_use]
    pub const fn stop_on_error(mut self, stop_on_error: bool) -> Self {
        self.stop_on_error = stop_on_error;
        self
    }
}

/// Result of an execute request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteReply {
    pub status: ReplyStatus,
    #[serde(default)]
    pub execution_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evalue: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub traceback: Vec<String>,
}

impl ExecuteReply {
    /// Successful execution.
    #[must_use]
    pub fn ok(execution_count: u32) -> Self {
        Self {
            status: ReplyStatus::Ok,
            execution_count,
            ..Self::default()
        }
    }

    /// Failed execution.
    #[must_use]
    pub fn error(
        execution_count: u32,
        ename: impl Into<String>,
        evalue: impl Into<String>,
    ) -> Self {
        Self {
            status: ReplyStatus::Error,
            execution_count,
            ename: Some(ename.into()),
            evalue: Some(evalue.into()),
            traceback: Vec::new(),
        }
    }

    /// Request discarded without running.
    #[must_use]
    pub fn abort() -> Self {
        Self {
            status: ReplyStatus::Abort,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.status == ReplyStatus::Error
    }
}

/// Broadcast of the code about to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteInput {
    pub code: String,
    pub execution_count: u32,
}

/// Ask for completion candidates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteRequest {
    pub code: String,
    /// Cursor offset into `code`.
    pub cursor_pos: usize,
}

/// Completion candidates and the span they replace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompleteReply {
    pub status: ReplyStatus,
    pub matches: Vec<String>,
    /// Start of the replaced span.
    pub cursor_start: usize,
    /// End of the replaced span.
    pub cursor_end: usize,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl CompleteReply {
    /// No candidates, empty span at `cursor_pos`.
    #[must_use]
    pub fn empty(cursor_pos: usize) -> Self {
        Self {
            status: ReplyStatus::Ok,
            matches: Vec::new(),
            cursor_start: cursor_pos,
            cursor_end: cursor_pos,
            metadata: Map::new(),
        }
    }
}

/// Ask for documentation on the token at the cursor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectRequest {
    pub code: String,
    /// Cursor offset into `code`.
    pub cursor_pos: usize,
    /// `0` for a summary, `1` for more detail.
    #[serde(default)]
    pub detail_level: u8,
}

/// Documentation for an inspected token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InspectReply {
    pub status: ReplyStatus,
    pub found: bool,
    /// Documentation keyed by MIME type.
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl InspectReply {
    /// Nothing known about the token.
    #[must_use]
    pub fn not_found() -> Self {
        Self {
            status: ReplyStatus::Ok,
            found: false,
            data: Map::new(),
            metadata: Map::new(),
        }
    }
}

/// Ask whether input is ready to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsCompleteRequest {
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsCompleteReply {
    pub status: Completeness,
    /// Suggested indent for the next line when incomplete.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub indent: String,
}

impl IsCompleteReply {
    #[must_use]
    pub const fn new(status: Completeness) -> Self {
        Self {
            status,
            indent: String::new(),
        }
    }
}

/// Bare status reply (`interrupt_reply`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReply {
    pub status: ReplyStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownRequest {
    #[serde(default)]
    pub restart: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownReply {
    pub status: ReplyStatus,
    #[serde(default)]
    pub restart: bool,
}

/// Busy/idle lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub execution_state: ExecutionState,
}

/// Text written to a named stream (`stdout`, `stderr`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stream {
    pub name: String,
    pub text: String,
}

/// Rich output keyed by MIME type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisplayData {
    pub data: Map<String, Value>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub transient: Map<String, Value>,
}

impl DisplayData {
    /// Single-representation display, e.g. `("text/html", "<b>hi</b>")`.
    #[must_use]
    pub fn single(mime: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut data = Map::new();
        data.insert(mime.into(), value.into());
        Self {
            data,
            ..Self::default()
        }
    }
}

/// Closed set of payloads the kernel sends or understands.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    KernelInfoRequest,
    KernelInfoReply(KernelInfo),
    ExecuteRequest(ExecuteRequest),
    ExecuteReply(ExecuteReply),
    ExecuteInput(ExecuteInput),
    CompleteRequest(CompleteRequest),
    CompleteReply(CompleteReply),
    InspectRequest(InspectRequest),
    InspectReply(InspectReply),
    IsCompleteRequest(IsCompleteRequest),
    IsCompleteReply(IsCompleteReply),
    InterruptRequest,
    InterruptReply(StatusReply),
    ShutdownRequest(ShutdownRequest),
    ShutdownReply(ShutdownReply),
    Status(Status),
    Stream(Stream),
    DisplayData(DisplayData),
    UpdateDisplayData(DisplayData),
}

impl Content {
    /// Wire `msg_type` for this payload.
    #[must_use]
    pub const fn msg_type(&self) -> &'static str {
        match self {
            Self::KernelInfoRequest => "kernel_info_request",
            Self::KernelInfoReply(_) => "kernel_info_reply",
            Self::ExecuteRequest(_) => "execute_request",
            Self::ExecuteReply(_) => "execute_reply",
            Self::ExecuteInput(_) => "execute_input",
            Self::CompleteRequest(_) => "complete_request",
            Self::CompleteReply(_) => "complete_reply",
            Self::InspectRequest(_) => "inspect_request",
            Self::InspectReply(_) => "inspect_reply",
            Self::IsCompleteRequest(_) => "is_complete_request",
            Self::IsCompleteReply(_) => "is_complete_reply",
            Self::InterruptRequest => "interrupt_request",
            Self::InterruptReply(_) => "interrupt_reply",
            Self::ShutdownRequest(_) => "shutdown_request",
            Self::ShutdownReply(_) => "shutdown_reply",
            Self::Status(_) => "status",
            Self::Stream(_) => "stream",
            Self::DisplayData(_) => "display_data",
            Self::UpdateDisplayData(_) => "update_display_data",
        }
    }

    /// Busy/idle status event.
    #[must_use]
    pub const fn status(execution_state: ExecutionState) -> Self {
        Self::Status(Status { execution_state })
    }

    /// JSON body of the `content` frame.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::KernelInfoRequest | Self::InterruptRequest => Value::Object(Map::new()),
            Self::KernelInfoReply(c) => to_json(c),
            Self::ExecuteRequest(c) => to_json(c),
            Self::ExecuteReply(c) => to_json(c),
            Self::ExecuteInput(c) => to_json(c),
            Self::CompleteRequest(c) => to_json(c),
            Self::CompleteReply(c) => to_json(c),
            Self::InspectRequest(c) => to_json(c),
            Self::InspectReply(c) => to_json(c),
            Self::IsCompleteRequest(c) => to_json(c),
            Self::IsCompleteReply(c) => to_json(c),
            Self::InterruptReply(c) => to_json(c),
            Self::ShutdownRequest(c) => to_json(c),
            Self::ShutdownReply(c) => to_json(c),
            Self::Status(c) => to_json(c),
            Self::Stream(c) => to_json(c),
            Self::DisplayData(c) | Self::UpdateDisplayData(c) => to_json(c),
        }
    }

    /// Decode a `content` frame according to its header's `msg_type`.
    ///
    /// # Errors
    /// Returns [`MessageError::UnknownMessageType`] for kinds outside the
    /// closed set and [`MessageError::InvalidJson`] for malformed bodies.
    pub fn from_parts(msg_type: &str, value: Value) -> Result<Self, MessageError> {
        Ok(match msg_type {
            "kernel_info_request" => Self::KernelInfoRequest,
            "kernel_info_reply" => Self::KernelInfoReply(from_json(value)?),
            "execute_request" => Self::ExecuteRequest(from_json(value)?),
            "execute_reply" => Self::ExecuteReply(from_json(value)?),
            "execute_input" => Self::ExecuteInput(from_json(value)?),
            "complete_request" => Self::CompleteRequest(from_json(value)?),
            "complete_reply" => Self::CompleteReply(from_json(value)?),
            "inspect_request" => Self::InspectRequest(from_json(value)?),
            "inspect_reply" => Self::InspectReply(from_json(value)?),
            "is_complete_request" => Self::IsCompleteRequest(from_json(value)?),
            "is_complete_reply" => Self::IsCompleteReply(from_json(value)?),
            "interrupt_request" => Self::InterruptRequest,
            "interrupt_reply" => Self::InterruptReply(from_json(value)?),
            "shutdown_request" => Self::ShutdownRequest(from_json(value)?),
            "shutdown_reply" => Self::ShutdownReply(from_json(value)?),
            "status" => Self::Status(from_json(value)?),
            "stream" => Self::Stream(from_json(value)?),
            "display_data" => Self::DisplayData(from_json(value)?),
            "update_display_data" => Self::UpdateDisplayData(from_json(value)?),
            other => return Err(MessageError::UnknownMessageType(other.to_string())),
        })
    }
}

// Payloads are plain structs with string keys, so serialization cannot fail.
fn to_json<T: Serialize>(content: &T) -> Value {
    serde_json::to_value(content).unwrap_or_else(|_| Value::Object(Map::new()))
}

fn from_json<T: DeserializeOwned>(value: Value) -> Result<T, MessageError> {
    serde_json::from_value(value).map_err(|source| MessageError::InvalidJson {
        frame: "content",
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execute_request_defaults() {
        let content =
            Content::from_parts("execute_request", serde_json::json!({"code": "up"})).unwrap();
        let Content::ExecuteRequest(req) = content else {
            panic!("Wrong content type");
        };
        assert_eq!(req.code, "up");
        assert!(!req.stop_on_error);
        assert!(req.store_history);
        assert!(!req.silent);
    }

    #[test]
    fn test_stop_on_error_opt_in() {
        let content = Content::from_parts(
            "execute_request",
            serde_json::json!({"code": "up", "stop_on_error": true}),
        )
        .unwrap();
        let Content::ExecuteRequest(req) = content else {
            panic!("Wrong content type");
        };
        assert!(req.stop_on_error);
        assert!(!ExecuteRequest::new("up").stop_on_error);
    }

    #[test]
    fn test_abort_reply_serialization() {
        let json = Content::ExecuteReply(ExecuteReply::abort()).to_value();
        assert_eq!(json["status"], "abort");
        assert!(json.get("ename").is_none());
    }

    #[test]
    fn test_unknown_type_rejected() {
        let err = Content::from_parts("comm_open", serde_json::json!({})).unwrap_err();
        assert!(matches!(err, MessageError::UnknownMessageType(t) if t == "comm_open"));
    }

    #[test]
    fn test_missing_field_rejected() {
        let err = Content::from_parts("complete_request", serde_json::json!({"code": "x"}))
            .unwrap_err();
        assert!(matches!(err, MessageError::InvalidJson { frame: "content", .. }));
    }

    #[test]
    fn test_status_event() {
        let json = Content::status(ExecutionState::Busy).to_value();
        assert_eq!(json, serde_json::json!({"execution_state": "busy"}));
    }
}
