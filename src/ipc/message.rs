//! Outbound wire messages.
//!
//! Each message is one ASCII line: `<tag>:<payload>\n`.

use bytes::{BufMut, Bytes, BytesMut};

use crate::data::Reading;

/// Tag identifying what a message carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MessageTag {
    ObjectTemperature,
    AmbientTemperature,
}

impl MessageTag {
    /// Tag as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ObjectTemperature => "object_temperature",
            Self::AmbientTemperature => "ambient_temperature",
        }
    }
}

impl std::fmt::Display for MessageTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tagged message fanned out to every connected client.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BroadcastMessage {
    /// What the payload is.
    pub tag: MessageTag,
    /// ASCII decimal payload.
    pub payload: String,
}

impl BroadcastMessage {
    /// Create a new message.
    pub fn new(tag: MessageTag, payload: impl Into<String>) -> Self {
        Self {
            tag,
            payload: payload.into(),
        }
    }

    /// The two messages a reading is forwarded as, object first.
    pub fn from_reading(reading: &Reading) -> [Self; 2] {
        [
            Self::new(MessageTag::ObjectTemperature, reading.object_payload()),
            Self::new(MessageTag::AmbientTemperature, reading.ambient_payload()),
        ]
    }

    /// Encode as a wire frame.
    pub fn encode(&self) -> Bytes {
        let tag = self.tag.as_str();
        let mut buf = BytesMut::with_capacity(tag.len() + self.payload.len() + 2);
        buf.put_slice(tag.as_bytes());
        buf.put_u8(b':');
        buf.put_slice(self.payload.as_bytes());
        buf.put_u8(b'\n');
        buf.freeze()
    }
}
