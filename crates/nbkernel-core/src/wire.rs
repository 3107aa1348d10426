//! Multipart wire layout and message signing.
//!
//! A message on the wire is a list of frames:
//!
//! ```text
//! [identities...] <IDS|MSG> signature header parent_header metadata content [buffers...]
//! ```
//!
//! The signature is the hex HMAC-SHA256 of the four JSON frames, empty when
//! the connection key is empty.

use bytes::Bytes;
use hmac::{Hmac, Mac};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use sha2::Sha256;
use thiserror::Error;

use crate::content::Content;
use crate::message::{Channel, Header, Message};

/// Frame separating routing identities from the message body.
pub const DELIMITER: &[u8] = b"<IDS|MSG>";

/// Signature, header, parent header, metadata, content.
const BODY_FRAMES: usize = 5;

type HmacSha256 = Hmac<Sha256>;

/// Malformed inbound message.
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("missing <IDS|MSG> delimiter")]
    MissingDelimiter,
    #[error("expected {expected} frames after delimiter, found {found}")]
    MissingFrames { expected: usize, found: usize },
    #[error("signature mismatch")]
    InvalidSignature,
    #[error("invalid {frame} frame: {source}")]
    InvalidJson {
        frame: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),
}

/// Signs outbound and verifies inbound messages.
#[derive(Clone, Default)]
pub struct Signer {
    mac: Option<HmacSha256>,
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("signed", &self.mac.is_some())
            .finish()
    }
}

impl Signer {
    /// Signer for `key`; an empty key disables signing.
    #[must_use]
    pub fn new(key: &[u8]) -> Self {
        if key.is_empty() {
            return Self::unsigned();
        }
        // HMAC accepts keys of any length.
        Self {
            mac: HmacSha256::new_from_slice(key).ok(),
        }
    }

    #[must_use]
    pub const fn unsigned() -> Self {
        Self { mac: None }
    }

    fn sign(&self, parts: &[&[u8]]) -> String {
        self.mac.as_ref().map_or_else(String::new, |mac| {
            let mut mac = mac.clone();
            for part in parts {
                mac.update(part);
            }
            hex::encode(mac.finalize().into_bytes())
        })
    }

    fn verify(&self, parts: &[&[u8]], signature: &[u8]) -> Result<(), MessageError> {
        let Some(mac) = &self.mac else {
            return Ok(());
        };
        let expected = hex::decode(signature).map_err(|_| MessageError::InvalidSignature)?;
        let mut mac = mac.clone();
        for part in parts {
            mac.update(part);
        }
        mac.verify_slice(&expected)
            .map_err(|_| MessageError::InvalidSignature)
    }
}

impl Message {
    /// Encode into wire frames.
    #[must_use]
    pub fn encode(&self, signer: &Signer) -> Vec<Bytes> {
        let header = json_bytes(&serde_json::to_value(&self.header).unwrap_or_default());
        let parent = json_bytes(&self.parent_header.as_ref().map_or_else(
            || Value::Object(Map::new()),
            |p| serde_json::to_value(p).unwrap_or_default(),
        ));
        let metadata = json_bytes(&Value::Object(self.metadata.clone()));
        let content = json_bytes(&self.content.to_value());
        let signature = signer.sign(&[&header, &parent, &metadata, &content]);

        let mut frames =
            Vec::with_capacity(self.identities.len() + 1 + BODY_FRAMES + self.buffers.len());
        frames.extend(self.identities.iter().cloned());
        frames.push(Bytes::from_static(DELIMITER));
        frames.push(Bytes::from(signature));
        frames.extend([header, parent, metadata, content]);
        frames.extend(self.buffers.iter().cloned());
        frames
    }

    /// Decode wire frames received on `channel`.
    ///
    /// # Errors
    /// Returns [`MessageError`] when the delimiter or body frames are missing,
    /// the signature does not verify, or a JSON frame is invalid.
    pub fn decode(
        frames: Vec<Bytes>,
        channel: Channel,
        signer: &Signer,
    ) -> Result<Self, MessageError> {
        let split = frames
            .iter()
            .position(|f| f.as_ref() == DELIMITER)
            .ok_or(MessageError::MissingDelimiter)?;

        let mut frames = frames;
        let mut body = frames.split_off(split + 1);
        frames.pop();
        let identities = frames;

        if body.len() < BODY_FRAMES {
            return Err(MessageError::MissingFrames {
                expected: BODY_FRAMES,
                found: body.len(),
            });
        }
        let buffers = body.split_off(BODY_FRAMES);
        let [signature, header, parent, metadata, content] =
            <[Bytes; BODY_FRAMES]>::try_from(body).map_err(|b| MessageError::MissingFrames {
                expected: BODY_FRAMES,
                found: b.len(),
            })?;

        signer.verify(&[&header, &parent, &metadata, &content], &signature)?;

        let header: Header = parse_frame("header", &header)?;
        let parent: Map<String, Value> = parse_frame("parent_header", &parent)?;
        let parent_header = if parent.is_empty() {
            None
        } else {
            Some(
                serde_json::from_value(Value::Object(parent)).map_err(|source| {
                    MessageError::InvalidJson {
                        frame: "parent_header",
                        source,
                    }
                })?,
            )
        };
        let metadata: Map<String, Value> = parse_frame("metadata", &metadata)?;
        let content = Content::from_parts(&header.msg_type, parse_frame("content", &content)?)?;

        Ok(Self {
            channel,
            identities,
            header,
            parent_header,
            metadata,
            content,
            buffers,
        })
    }
}

fn json_bytes(value: &Value) -> Bytes {
    Bytes::from(value.to_string())
}

fn parse_frame<T: DeserializeOwned>(frame: &'static str, bytes: &[u8]) -> Result<T, MessageError> {
    serde_json::from_slice(bytes).map_err(|source| MessageError::InvalidJson { frame, source })
}
