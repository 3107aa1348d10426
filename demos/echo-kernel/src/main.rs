//! Notebook kernel that echoes its input.
//!
//! Run with: cargo run -p echo-kernel -- --connection-file kernel.json
//!
//! Code starting with `error` fails, `sleep <ms>` waits (interruptible) and
//! `display <html>` renders HTML. Anything else is echoed to stdout.

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use nbkernel_core::{
    CompleteReply, CompleteRequest, DisplayData, ExecuteOutput, ExecuteReply, ExecuteRequest,
    ExecutionContext, InspectReply, InspectRequest, IsCompleteReply, IsCompleteRequest,
    KernelInfo, LanguageInfo, PROTOCOL_VERSION, RequestHandler,
};
use nbkernel_engine::{EngineConfig, KernelServer};
use nbkernel_transport::ConnectionInfo;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Connection file written by the notebook frontend.
    #[arg(long)]
    connection_file: PathBuf,
}

struct EchoKernel;

#[async_trait]
impl RequestHandler for EchoKernel {
    fn kernel_info(&self) -> KernelInfo {
        KernelInfo {
            protocol_version: PROTOCOL_VERSION.to_string(),
            implementation: env!("CARGO_PKG_NAME").to_string(),
            implementation_version: env!("CARGO_PKG_VERSION").to_string(),
            language_info: LanguageInfo {
                name: "echo".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                mimetype: "text/plain".to_string(),
                file_extension: ".txt".to_string(),
            },
            banner: "Echo kernel".to_string(),
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
        let code = request.code.trim();

        if code.starts_with("error") {
            output.stream("stderr", code);
            return ExecuteReply::error(count, "EchoError", code);
        }
        if let Some(ms) = code.strip_prefix("sleep ") {
            let Ok(ms) = ms.trim().parse::<u64>() else {
                return ExecuteReply::error(count, "ValueError", "sleep takes milliseconds");
            };
            tokio::select! {
                () = ctx.cancelled() => {
                    return ExecuteReply::error(count, "KeyboardInterrupt", "interrupted");
                }
                () = tokio::time::sleep(Duration::from_millis(ms)) => {}
            }
            return ExecuteReply::ok(count);
        }
        if let Some(html) = code.strip_prefix("display ") {
            output.display(DisplayData::single("text/html", html), false);
            return ExecuteReply::ok(count);
        }

        if !request.silent {
            output.stream("stdout", &request.code);
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

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let info = ConnectionInfo::from_file(&args.connection_file).with_context(|| {
        format!(
            "failed to load connection file {}",
            args.connection_file.display()
        )
    })?;

    let token = CancellationToken::new();
    let server = KernelServer::bind(
        &info,
        EngineConfig::default(),
        Arc::new(EchoKernel),
        token.clone(),
    )
    .await
    .context("failed to bind kernel sockets")?;

    let ctrl_c = token.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {e}");
            return;
        }
        tracing::info!("Received ctrl-c, shutting down");
        ctrl_c.cancel();
    });

    server.run().await;
    Ok(())
}
