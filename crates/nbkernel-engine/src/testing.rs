//! Recording sinks and a scripted handler for engine tests.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use nbkernel_core::{
    CompleteReply, CompleteRequest, Completeness, Content, DisplayData, ExecuteOutput,
    ExecuteReply, ExecuteRequest, ExecutionContext, ExecutionState, InspectReply, InspectRequest,
    IsCompleteReply, IsCompleteRequest, KernelInfo, LanguageInfo, Message, MessageSink,
    RequestHandler, SendError,
};
use tokio::sync::Notify;

/// Single ordered log of everything sent to any sink it hands out.
#[derive(Clone, Default)]
pub struct Recorder {
    log: Arc<Mutex<Vec<Message>>>,
}

impl MessageSink for Recorder {
    fn send(&self, msg: Message) -> Result<(), SendError> {
        self.log.lock().unwrap().push(msg);
        Ok(())
    }
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sink(&self) -> Arc<dyn MessageSink> {
        Arc::new(self.clone())
    }

    pub fn messages(&self) -> Vec<Message> {
        self.log.lock().unwrap().clone()
    }

    pub fn states(&self) -> Vec<&'static str> {
        self.messages()
            .iter()
            .filter_map(|m| match &m.content {
                Content::Status(s) => Some(state_name(s.execution_state)),
                _ => None,
            })
            .collect()
    }

    /// Execute replies in the order they were sent.
    pub fn replies(&self) -> Vec<(String, ExecuteReply)> {
        self.messages()
            .into_iter()
            .filter_map(|m| match m.content {
                Content::ExecuteReply(r) => {
                    Some((m.parent_header.map(|p| p.msg_id).unwrap_or_default(), r))
                }
                _ => None,
            })
            .collect()
    }

    /// Log rendered as `"<label> <event>"`, labelled by triggering request.
    pub fn trace(&self, requests: &[(&str, &Message)]) -> Vec<String> {
        self.messages()
            .iter()
            .map(|m| {
                let label = requests
                    .iter()
                    .find(|(_, r)| m.is_child_of(r))
                    .map_or("?", |(label, _)| label);
                let event = match &m.content {
                    Content::Status(s) => state_name(s.execution_state).to_string(),
                    Content::ExecuteReply(r) => format!("reply:{}", status_name(r)),
                    other => other.msg_type().to_string(),
                };
                format!("{label} {event}")
            })
            .collect()
    }
}

const fn state_name(state: ExecutionState) -> &'static str {
    match state {
        ExecutionState::Starting => "starting",
        ExecutionState::Busy => "busy",
        ExecutionState::Idle => "idle",
    }
}

fn status_name(reply: &ExecuteReply) -> &'static str {
    match reply.status {
        nbkernel_core::ReplyStatus::Ok => "ok",
        nbkernel_core::ReplyStatus::Error => "error",
        nbkernel_core::ReplyStatus::Abort => "abort",
    }
}

/// Handler whose behaviour is chosen by the code it receives.
///
/// - `fail ...` streams to stderr and returns an error
/// - `sleep` waits until cancelled, then returns an error
/// - `print <text>` streams `<text>` to stdout
/// - `show` emits a display
/// - anything else succeeds silently
#[derive(Default)]
pub struct ScriptedHandler {
    pub executed: Mutex<Vec<String>>,
    pub started: Notify,
}

impl ScriptedHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl RequestHandler for ScriptedHandler {
    fn kernel_info(&self) -> KernelInfo {
        KernelInfo {
            protocol_version: nbkernel_core::PROTOCOL_VERSION.to_string(),
            implementation: "scripted".to_string(),
            implementation_version: "0.0.1".to_string(),
            language_info: LanguageInfo {
                name: "script".to_string(),
                ..LanguageInfo::default()
            },
            ..KernelInfo::default()
        }
    }

    async fn execute(
        &self,
        ctx: &ExecutionContext,
        request: &ExecuteRequest,
        output: &ExecuteOutput<'_>,
    ) -> ExecuteReply {
        self.executed.lock().unwrap().push(request.code.clone());
        self.started.notify_one();
        let count = ctx.execution_count();

        if request.code.starts_with("fail") {
            output.stream("stderr", "failed");
            return ExecuteReply::error(count, "ScriptError", "requested failure");
        }
        if request.code == "sleep" {
            tokio::select! {
                () = ctx.cancelled() => {
                    return ExecuteReply::error(count, "Interrupted", "cancelled");
                }
                () = tokio::time::sleep(Duration::from_secs(30)) => {}
            }
        }
        if let Some(text) = request.code.strip_prefix("print ") {
            output.stream("stdout", text);
        }
        if request.code == "show" {
            output.display(DisplayData::single("text/plain", "shown"), false);
        }
        ExecuteReply::ok(count)
    }

    fn complete(&self, request: &CompleteRequest) -> CompleteReply {
        let prefix = request.code.get(..request.cursor_pos).unwrap_or_default();
        let mut reply = CompleteReply::empty(request.cursor_pos);
        reply.matches = ["up", "rate"]
            .iter()
            .filter(|m| m.starts_with(prefix))
            .map(ToString::to_string)
            .collect();
        reply.cursor_start = 0;
        reply
    }

    fn inspect(&self, request: &InspectRequest) -> InspectReply {
        let mut reply = InspectReply::not_found();
        if request.code == "up" {
            reply.found = true;
            reply.data.insert("text/plain".into(), "1 if the target is up".into());
        }
        reply
    }

    fn is_complete(&self, request: &IsCompleteRequest) -> Option<IsCompleteReply> {
        (request.code == "?").then(|| IsCompleteReply::new(Completeness::Unknown))
    }
}
