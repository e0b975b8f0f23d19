//! Wire envelope for channel traffic
//!
//! Every frame is a UTF-8 JSON object carrying a `type` string. The relay
//! classifies frames into the types it knows about, but always forwards the
//! original bytes; a frame it cannot model is kept as a passthrough.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RelayError, Result};

/// Informational role a member declares for itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Controller,
    Teleprompter,
}

/// Legacy single-value mirror setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MirrorMode {
    None,
    Horizontal,
    Vertical,
    Both,
}

/// Older clients sent either a mode name or a plain on/off flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LegacyMirror {
    Mode(MirrorMode),
    Flag(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Forward,
    Backward,
}

/// Messages exchanged between controllers and teleprompters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Move to another channel; handled by the relay, never forwarded
    #[serde(rename = "join")]
    Join {
        channel: String,
        #[serde(default)]
        role: Option<Role>,
    },

    /// Declare this member's role
    #[serde(rename = "mode")]
    Mode { mode: Role },

    /// Full script replacement
    #[serde(rename = "text")]
    Text {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
    },

    #[serde(rename = "start")]
    Start,

    #[serde(rename = "pause")]
    Pause,

    #[serde(rename = "reset")]
    Reset,

    #[serde(rename = "fastforward")]
    FastForward,

    #[serde(rename = "rewind")]
    Rewind,

    /// Scroll rate, 1 to 10
    #[serde(rename = "speed")]
    Speed { value: f64 },

    /// Text column width percent, 30 to 100
    #[serde(rename = "width")]
    Width { value: f64 },

    /// Font size in em, 1 to 8
    #[serde(rename = "fontsize")]
    FontSize { value: f64 },

    #[serde(rename = "mirror")]
    Mirror {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        horizontal: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        vertical: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<LegacyMirror>,
    },

    /// Relative scroll by a number of lines
    #[serde(rename = "scroll_lines")]
    ScrollLines {
        direction: ScrollDirection,
        lines: u32,
        #[serde(default)]
        smooth: bool,
    },

    #[serde(rename = "go_to_beginning")]
    GoToBeginning,

    #[serde(rename = "go_to_end")]
    GoToEnd,

    /// Ask the relay for the channel's member count
    #[serde(rename = "request_connection_info")]
    RequestConnectionInfo,

    /// Normally relay-originated; relayed untouched if a client sends one
    #[serde(rename = "connection_update")]
    ConnectionUpdate { connection_count: usize },
}

impl ClientMessage {
    /// The wire `type` of this message
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::Mode { .. } => "mode",
            Self::Text { .. } => "text",
            Self::Start => "start",
            Self::Pause => "pause",
            Self::Reset => "reset",
            Self::FastForward => "fastforward",
            Self::Rewind => "rewind",
            Self::Speed { .. } => "speed",
            Self::Width { .. } => "width",
            Self::FontSize { .. } => "fontsize",
            Self::Mirror { .. } => "mirror",
            Self::ScrollLines { .. } => "scroll_lines",
            Self::GoToBeginning => "go_to_beginning",
            Self::GoToEnd => "go_to_end",
            Self::RequestConnectionInfo => "request_connection_info",
            Self::ConnectionUpdate { .. } => "connection_update",
        }
    }

    /// Script carried by a `text` message, under either field name
    pub fn script(&self) -> Option<&str> {
        match self {
            Self::Text { text, content } => text.as_deref().or(content.as_deref()),
            _ => None,
        }
    }

    /// Serialize for sending
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Messages the relay itself produces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "connection_update")]
    ConnectionUpdate { connection_count: usize },
}

impl ServerMessage {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Classification of an inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Known(ClientMessage),
    /// Unmodelled type, or a known type whose payload did not fit its shape
    Passthrough { kind: String },
}

/// A parsed inbound frame together with its original text
#[derive(Debug, Clone)]
pub struct Envelope {
    pub raw: String,
    pub inbound: Inbound,
}

impl Envelope {
    /// Parse a text frame. Fails only if the frame is not a JSON object with
    /// a string `type` field.
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        let value: Value = serde_json::from_str(&raw)
            .map_err(|e| RelayError::MessageParseError(e.to_string()))?;

        let kind = match value.get("type") {
            Some(Value::String(kind)) => kind.clone(),
            Some(_) => {
                return Err(RelayError::MessageParseError(
                    "'type' field is not a string".to_string(),
                ))
            }
            None => {
                return Err(RelayError::MessageParseError(
                    "missing 'type' field".to_string(),
                ))
            }
        };

        let inbound = match serde_json::from_value::<ClientMessage>(value) {
            Ok(message) => Inbound::Known(message),
            Err(_) => Inbound::Passthrough { kind },
        };

        Ok(Self { raw, inbound })
    }

    /// The wire `type` of the frame
    pub fn kind(&self) -> &str {
        match &self.inbound {
            Inbound::Known(message) => message.kind(),
            Inbound::Passthrough { kind } => kind,
        }
    }
}
