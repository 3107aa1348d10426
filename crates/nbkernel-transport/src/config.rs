//! Connection configuration.

use std::{net::IpAddr, path::Path};

use nbkernel_core::Signer;
use serde::{Deserialize, Serialize};

use crate::{TransportError, codec::DEFAULT_MAX_MESSAGE_BYTES};

const HMAC_SHA256: &str = "hmac-sha256";

/// Addresses and signing key, in the shape of a connection file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub ip: IpAddr,
    #[serde(default = "default_transport")]
    pub transport: String,
    pub shell_port: u16,
    pub control_port: u16,
    pub iopub_port: u16,
    pub stdin_port: u16,
    pub hb_port: u16,
    #[serde(default)]
    pub signature_scheme: String,
    #[serde(default)]
    pub key: String,
}

fn default_transport() -> String {
    "tcp".to_string()
}

impl ConnectionInfo {
    /// Loopback connection on ephemeral ports, unsigned.
    #[must_use]
    pub fn loopback() -> Self {
        Self {
            ip: IpAddr::from([127, 0, 0, 1]),
            transport: default_transport(),
            shell_port: 0,
            control_port: 0,
            iopub_port: 0,
            stdin_port: 0,
            hb_port: 0,
            signature_scheme: String::new(),
            key: String::new(),
        }
    }

    /// Load and validate a JSON connection file.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed, or names an
    /// unsupported transport or signature scheme.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TransportError> {
        let raw = std::fs::read(path)?;
        Self::from_json(&raw)
    }

    /// Parse and validate connection JSON.
    ///
    /// # Errors
    /// See [`ConnectionInfo::from_file`].
    pub fn from_json(raw: &[u8]) -> Result<Self, TransportError> {
        let info: Self = serde_json::from_slice(raw)?;
        info.validate()?;
        Ok(info)
    }

    fn validate(&self) -> Result<(), TransportError> {
        if self.transport != "tcp" {
            return Err(TransportError::UnsupportedTransport(self.transport.clone()));
        }
        if !self.key.is_empty() && self.signature_scheme != HMAC_SHA256 {
            return Err(TransportError::UnsupportedSignatureScheme(
                self.signature_scheme.clone(),
            ));
        }
        Ok(())
    }

    /// Signer for this connection's key.
    #[must_use]
    pub fn signer(&self) -> Signer {
        Signer::new(self.key.as_bytes())
    }
}

/// Tunables shared by every channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportConfig {
    /// Upper bound on one encoded multipart message.
    pub max_message_bytes: usize,
    /// Broadcast events buffered per subscriber before it starts lagging.
    pub broadcast_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            broadcast_capacity: 1024,
        }
    }
}
