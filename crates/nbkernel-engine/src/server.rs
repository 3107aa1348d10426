//! Wiring of channels, scheduler and handler under one lifetime token.

use std::sync::Arc;

use nbkernel_core::{Channel, RequestHandler};
use nbkernel_transport::{
    BroadcastChannel, ConnectionInfo, Dispatcher, Listeners, MultipartCodec, Publisher,
    RequestChannel, TransportError, serve_heartbeat,
};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::{
    config::EngineConfig, dispatch::KernelDispatcher, scheduler::Scheduler,
    status::StatusPublisher,
};

/// A kernel bound to its five sockets, ready to run.
pub struct KernelServer {
    info: ConnectionInfo,
    listeners: Listeners,
    config: EngineConfig,
    handler: Arc<dyn RequestHandler>,
    token: CancellationToken,
}

impl KernelServer {
    /// Bind every channel in `info`.
    ///
    /// Cancelling `token` (or a `shutdown_request`) stops the server.
    ///
    /// # Errors
    /// Returns error if any socket fails to bind.
    pub async fn bind(
        info: &ConnectionInfo,
        config: EngineConfig,
        handler: Arc<dyn RequestHandler>,
        token: CancellationToken,
    ) -> Result<Self, TransportError> {
        let listeners = Listeners::bind(info).await?;
        let info = listeners.bound_info(info)?;
        Ok(Self {
            info,
            listeners,
            config,
            handler,
            token,
        })
    }

    /// Connection info with the ports actually bound.
    #[must_use]
    pub const fn connection_info(&self) -> &ConnectionInfo {
        &self.info
    }

    /// Serve until the lifetime token is cancelled and every task has stopped.
    pub async fn run(self) {
        let Self {
            info,
            listeners,
            config,
            handler,
            token,
        } = self;

        let signer = info.signer();
        let codec = MultipartCodec::new(config.transport.max_message_bytes);
        let publisher = Publisher::new(config.transport.broadcast_capacity);

        let (scheduler, handle) = Scheduler::new(
            config.queue_capacity,
            Arc::clone(&handler),
            StatusPublisher::new(Arc::new(publisher.clone())),
            token.clone(),
        );
        let dispatcher: Arc<dyn Dispatcher> =
            Arc::new(KernelDispatcher::new(handler, handle, token.clone()));
        let request_channel = |channel| {
            RequestChannel::new(channel, signer.clone(), codec, Arc::clone(&dispatcher))
        };

        let mut tasks = JoinSet::new();
        tasks.spawn(request_channel(Channel::Shell).serve(listeners.shell, token.clone()));
        tasks.spawn(request_channel(Channel::Control).serve(listeners.control, token.clone()));
        tasks.spawn(request_channel(Channel::Stdin).serve(listeners.stdin, token.clone()));
        tasks.spawn(
            BroadcastChannel::new(signer.clone(), codec, publisher)
                .serve(listeners.iopub, token.clone()),
        );
        tasks.spawn(serve_heartbeat(listeners.heartbeat, token.clone()));
        tasks.spawn(scheduler.run());

        tracing::info!(
            "Kernel listening on {} (shell {}, control {}, iopub {}, stdin {}, hb {})",
            info.ip,
            info.shell_port,
            info.control_port,
            info.iopub_port,
            info.stdin_port,
            info.hb_port
        );

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!("Kernel task failed: {e}");
            }
        }
        tracing::info!("Kernel stopped");
    }
}
