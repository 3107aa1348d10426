//! End-to-end tests over loopback TCP.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use nbkernel_core::{
    Channel, CompleteReply, CompleteRequest, Content, ExecuteOutput, ExecuteReply, ExecuteRequest,
    ExecutionContext, InspectReply, InspectRequest, IsCompleteReply, IsCompleteRequest,
    KernelInfo, Message, ReplyStatus, RequestHandler, ShutdownRequest, Signer,
};
use nbkernel_engine::{EngineConfig, KernelServer};
use nbkernel_transport::{ConnectionInfo, MultipartCodec};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    task::JoinHandle,
};
use tokio_test::assert_ok;
use tokio_util::{codec::Framed, sync::CancellationToken};

const TIMEOUT: Duration = Duration::from_secs(5);

struct TestKernel;

#[async_trait]
impl RequestHandler for TestKernel {
    fn kernel_info(&self) -> KernelInfo {
        KernelInfo {
            implementation: "test".to_string(),
            ..KernelInfo::default()
        }
    }

    async fn execute(
        &self,
        ctx: &ExecutionContext,
        request: &ExecuteRequest,
        output: &ExecuteOutput<'_>,
    ) -> ExecuteReply {
        let count = ctx.execution_count();
        if request.code == "sleep" {
            tokio::select! {
                () = ctx.cancelled() => return ExecuteReply::error(count, "Interrupted", ""),
                () = tokio::time::sleep(Duration::from_secs(30)) => {}
            }
        }
        if let Some(text) = request.code.strip_prefix("print ") {
            output.stream("stdout", text);
        }
        ExecuteReply::ok(count)
    }

    fn complete(&self, request: &CompleteRequest) -> CompleteReply {
        CompleteReply::empty(request.cursor_pos)
    }

    fn inspect(&self, _request: &InspectRequest) -> InspectReply {
        InspectReply::not_found()
    }

    fn is_complete(&self, _request: &IsCompleteRequest) -> Option<IsCompleteReply> {
        None
    }
}

struct Kernel {
    info: ConnectionInfo,
    signer: Signer,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl Kernel {
    async fn start() -> Self {
        let info = ConnectionInfo {
            key: "secret".to_string(),
            signature_scheme: "hmac-sha256".to_string(),
            ..ConnectionInfo::loopback()
        };
        let token = CancellationToken::new();
        let server = assert_ok!(
            KernelServer::bind(
                &info,
                EngineConfig::default(),
                Arc::new(TestKernel),
                token.clone()
            )
            .await
        );
        let info = server.connection_info().clone();
        let task = tokio::spawn(server.run());
        Self {
            signer: info.signer(),
            info,
            token,
            task,
        }
    }

    fn addr(&self, port: u16) -> SocketAddr {
        SocketAddr::new(self.info.ip, port)
    }

    async fn connect(&self, channel: Channel) -> Client {
        let port = match channel {
            Channel::Shell => self.info.shell_port,
            Channel::Control => self.info.control_port,
            Channel::IoPub => self.info.iopub_port,
            Channel::Stdin => self.info.stdin_port,
            Channel::Heartbeat => self.info.hb_port,
        };
        let stream = assert_ok!(TcpStream::connect(self.addr(port)).await);
        Client {
            channel,
            signer: self.signer.clone(),
            framed: Framed::new(stream, MultipartCodec::default()),
        }
    }

    async fn stop(self) {
        self.token.cancel();
        assert_ok!(tokio::time::timeout(TIMEOUT, self.task).await).unwrap();
    }
}

struct Client {
    channel: Channel,
    signer: Signer,
    framed: Framed<TcpStream, MultipartCodec>,
}

impl Client {
    async fn send(&mut self, content: Content) -> Message {
        let msg = Message::new(self.channel, "client", content);
        assert_ok!(self.framed.send(msg.encode(&self.signer)).await);
        msg
    }

    async fn recv(&mut self) -> Message {
        let frames = tokio::time::timeout(TIMEOUT, self.framed.next())
            .await
            .expect("timed out waiting for a message")
            .expect("connection closed")
            .unwrap();
        assert_ok!(Message::decode(frames, self.channel, &self.signer))
    }
}

fn execute(code: &str) -> Content {
    Content::ExecuteRequest(ExecuteRequest::new(code))
}

fn execute_reply(msg: &Message) -> &ExecuteReply {
    match &msg.content {
        Content::ExecuteReply(reply) => reply,
        other => panic!("expected execute_reply, got {other:?}"),
    }
}

#[tokio::test]
async fn test_kernel_info_while_executing() {
    let kernel = Kernel::start().await;
    let mut shell = kernel.connect(Channel::Shell).await;
    let mut control = kernel.connect(Channel::Control).await;

    let running = shell.send(execute("sleep")).await;
    // Let the scheduler pick the request up before interrupting it.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let request = control.send(Content::KernelInfoRequest).await;
    let reply = control.recv().await;
    assert!(reply.is_child_of(&request));
    assert!(matches!(reply.content, Content::KernelInfoReply(ref info) if info.implementation == "test"));

    control.send(Content::InterruptRequest).await;
    assert_eq!(control.recv().await.msg_type(), "interrupt_reply");

    let reply = shell.recv().await;
    assert!(reply.is_child_of(&running));
    assert_eq!(execute_reply(&reply).ename.as_deref(), Some("Interrupted"));

    kernel.stop().await;
}

#[tokio::test]
async fn test_heartbeat_echo() {
    let kernel = Kernel::start().await;
    let mut hb = assert_ok!(TcpStream::connect(kernel.addr(kernel.info.hb_port)).await);

    assert_ok!(hb.write_all(b"ping").await);
    let mut buf = [0u8; 4];
    assert_ok!(tokio::time::timeout(TIMEOUT, hb.read_exact(&mut buf)).await).unwrap();
    assert_eq!(&buf, b"ping");

    kernel.stop().await;
}

#[tokio::test]
async fn test_execute_replies_in_order() {
    let kernel = Kernel::start().await;
    let mut shell = kernel.connect(Channel::Shell).await;

    let mut requests = Vec::new();
    for i in 0..5 {
        requests.push(shell.send(execute(&format!("print {i}"))).await);
    }
    for request in &requests {
        let reply = shell.recv().await;
        assert!(reply.is_child_of(request));
        assert_eq!(execute_reply(&reply).status, ReplyStatus::Ok);
    }

    kernel.stop().await;
}

#[tokio::test]
async fn test_iopub_brackets_execution() {
    let kernel = Kernel::start().await;
    let mut iopub = kernel.connect(Channel::IoPub).await;
    let mut shell = kernel.connect(Channel::Shell).await;
    // The subscription is registered on accept.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let request = shell.send(execute("print hi")).await;
    let mut events = Vec::new();
    loop {
        let event = iopub.recv().await;
        assert!(event.is_child_of(&request));
        let idle = matches!(
            &event.content,
            Content::Status(s) if s.execution_state == nbkernel_core::ExecutionState::Idle
        );
        events.push(event.msg_type().to_string());
        if idle {
            break;
        }
    }
    assert_eq!(events, ["status", "execute_input", "stream", "status"]);
    assert_eq!(execute_reply(&shell.recv().await).status, ReplyStatus::Ok);

    kernel.stop().await;
}

#[tokio::test]
async fn test_shutdown_request_stops_kernel() {
    let kernel = Kernel::start().await;
    let mut control = kernel.connect(Channel::Control).await;

    control
        .send(Content::ShutdownRequest(ShutdownRequest { restart: false }))
        .await;
    assert_eq!(control.recv().await.msg_type(), "shutdown_reply");

    assert_ok!(tokio::time::timeout(TIMEOUT, kernel.task).await).unwrap();
    assert!(kernel.token.is_cancelled());
}
