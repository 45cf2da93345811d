//! Streaming protocol messages.
//!
//! Client frames are decoded once, at the boundary, into [`ClientMessage`].
//! Server messages are JSON text frames.

use crate::error::{LivescribeError, Result};
use serde::{Deserialize, Serialize};

/// Literal text command that finalizes a session (case-insensitive).
pub const STOP_COMMAND: &str = "STOP";

/// A raw frame as delivered by the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Binary(Vec<u8>),
    Text(String),
}

/// Transcription mode negotiated by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Plain,
    Diarize,
}

#[derive(Debug, Deserialize)]
struct ModeRequest {
    mode: Mode,
}

/// Decoded client intent.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// 16-bit LE mono PCM chunk.
    Audio(Vec<u8>),
    SetMode(Mode),
    Finalize,
}

impl ClientMessage {
    /// Decode a transport frame.
    ///
    /// Unknown text frames are protocol errors the session survives.
    pub fn decode(frame: Frame) -> Result<Self> {
        match frame {
            Frame::Binary(bytes) => Ok(Self::Audio(bytes)),
            Frame::Text(text) => {
                let trimmed = text.trim();
                if trimmed.eq_ignore_ascii_case(STOP_COMMAND) {
                    return Ok(Self::Finalize);
                }
                serde_json::from_str::<ModeRequest>(trimmed)
                    .map(|req| Self::SetMode(req.mode))
                    .map_err(|e| LivescribeError::Protocol {
                        message: format!("unrecognized control message: {e}"),
                    })
            }
        }
    }
}

/// Messages sent to the client as JSON text frames.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ServerMessage {
    /// `{"text": .., "is_final": false}`
    Partial { text: String, is_final: bool },
    /// `{"status": "diarize_enabled" | "plain_enabled"}`
    ModeAck { status: String },
    /// `{"text": .., "diarized_text": ..|null, "is_final": true}`
    Final {
        text: String,
        diarized_text: Option<String>,
        is_final: bool,
    },
    /// `{"error": .., "code"?: ..}`
    Error {
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<u16>,
    },
}

impl ServerMessage {
    pub fn partial(text: impl Into<String>) -> Self {
        Self::Partial {
            text: text.into(),
            is_final: false,
        }
    }

    pub fn mode_ack(mode: Mode) -> Self {
        let status = match mode {
            Mode::Plain => "plain_enabled",
            Mode::Diarize => "diarize_enabled",
        };
        Self::ModeAck {
            status: status.to_string(),
        }
    }

    pub fn final_result(text: impl Into<String>, diarized_text: Option<String>) -> Self {
        Self::Final {
            text: text.into(),
            diarized_text,
            is_final: true,
        }
    }

    pub fn error(message: impl Into<String>, code: Option<u16>) -> Self {
        Self::Error {
            error: message.into(),
            code,
        }
    }

    /// Error message carrying the error's numeric code.
    pub fn from_error(error: &LivescribeError) -> Self {
        Self::error(error.to_string(), Some(error.message_code()))
    }

    pub fn is_final(&self) -> bool {
        matches!(self, Self::Final { .. })
    }

    /// Serialize message to JSON string.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn text(s: &str) -> Frame {
        Frame::Text(s.to_string())
    }

    fn as_value(message: &ServerMessage) -> Value {
        serde_json::from_str(&message.to_json().unwrap()).unwrap()
    }

    #[test]
    fn binary_frames_are_audio() {
        assert_eq!(
            ClientMessage::decode(Frame::Binary(vec![1, 2])).unwrap(),
            ClientMessage::Audio(vec![1, 2])
        );
    }

    #[test]
    fn stop_is_case_insensitive_and_trimmed() {
        for s in ["STOP", "stop", " Stop\n"] {
            assert_eq!(ClientMessage::decode(text(s)).unwrap(), ClientMessage::Finalize);
        }
    }

    #[test]
    fn mode_requests_decode() {
        assert_eq!(
            ClientMessage::decode(text(r#"{"mode":"diarize"}"#)).unwrap(),
            ClientMessage::SetMode(Mode::Diarize)
        );
        assert_eq!(
            ClientMessage::decode(text(r#"{"mode": "plain"}"#)).unwrap(),
            ClientMessage::SetMode(Mode::Plain)
        );
    }

    #[test]
    fn unknown_text_is_protocol_error() {
        for s in ["hello", r#"{"mode":"karaoke"}"#, "{}", "STOPP"] {
            let err = ClientMessage::decode(text(s)).unwrap_err();
            assert!(matches!(err, LivescribeError::Protocol { .. }), "{s}");
            assert_eq!(err.message_code(), 400);
        }
    }

    #[test]
    fn partial_json_shape() {
        assert_eq!(
            as_value(&ServerMessage::partial("Dzień dobry.")),
            json!({"text": "Dzień dobry.", "is_final": false})
        );
    }

    #[test]
    fn final_json_carries_null_diarized_text() {
        assert_eq!(
            as_value(&ServerMessage::final_result("", None)),
            json!({"text": "", "diarized_text": null, "is_final": true})
        );
        assert_eq!(
            as_value(&ServerMessage::final_result("A.", Some("[Mówca 1] A.".into()))),
            json!({"text": "A.", "diarized_text": "[Mówca 1] A.", "is_final": true})
        );
    }

    #[test]
    fn mode_ack_json_shape() {
        assert_eq!(
            as_value(&ServerMessage::mode_ack(Mode::Diarize)),
            json!({"status": "diarize_enabled"})
        );
        assert_eq!(
            as_value(&ServerMessage::mode_ack(Mode::Plain)),
            json!({"status": "plain_enabled"})
        );
    }

    #[test]
    fn error_code_is_optional() {
        assert_eq!(
            as_value(&ServerMessage::error("boom", None)),
            json!({"error": "boom"})
        );
        let err = LivescribeError::Unauthorized {
            message: "missing token".into(),
        };
        assert_eq!(
            as_value(&ServerMessage::from_error(&err)),
            json!({"error": "Unauthorized: missing token", "code": 4001})
        );
    }
}
