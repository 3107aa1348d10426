//! Binding the five channel sockets.

use std::net::IpAddr;

use nbkernel_core::Channel;
use tokio::net::TcpListener;

use crate::{TransportError, config::ConnectionInfo};

/// One bound listener per channel.
#[derive(Debug)]
pub struct Listeners {
    pub shell: TcpListener,
    pub control: TcpListener,
    pub iopub: TcpListener,
    pub stdin: TcpListener,
    pub heartbeat: TcpListener,
}

impl Listeners {
    /// Bind every port in `info`; port `0` picks an ephemeral port.
    ///
    /// # Errors
    /// Returns [`TransportError::Bind`] naming the first channel that failed.
    pub async fn bind(info: &ConnectionInfo) -> Result<Self, TransportError> {
        Ok(Self {
            shell: bind(info.ip, info.shell_port, Channel::Shell).await?,
            control: bind(info.ip, info.control_port, Channel::Control).await?,
            iopub: bind(info.ip, info.iopub_port, Channel::IoPub).await?,
            stdin: bind(info.ip, info.stdin_port, Channel::Stdin).await?,
            heartbeat: bind(info.ip, info.hb_port, Channel::Heartbeat).await?,
        })
    }

    /// `info` with the ports actually bound.
    ///
    /// # Errors
    /// Returns error if a listener's local address cannot be read.
    pub fn bound_info(&self, info: &ConnectionInfo) -> Result<ConnectionInfo, TransportError> {
        Ok(ConnectionInfo {
            shell_port: self.shell.local_addr()?.port(),
            control_port: self.control.local_addr()?.port(),
            iopub_port: self.iopub.local_addr()?.port(),
            stdin_port: self.stdin.local_addr()?.port(),
            hb_port: self.heartbeat.local_addr()?.port(),
            ..info.clone()
        })
    }
}

async fn bind(ip: IpAddr, port: u16, channel: Channel) -> Result<TcpListener, TransportError> {
    TcpListener::bind((ip, port))
        .await
        .map_err(|source| TransportError::Bind {
            channel,
            port,
            source,
        })
}
