//! Session wire protocol.
//!
//! Every message is a JSON object tagged by `type`. All server messages
//! except `pong` and `session_cleared` carry the id of the request they
//! belong to; the client uses it to drop responses to superseded requests.

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Message sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start a new composition, or extend the previous one when `refine` is set.
    Compose {
        prompt: String,
        id: String,
        model: String,
        provider: String,
        #[serde(rename = "maxTokens")]
        max_tokens: u32,
        refine: bool,
        /// Requested bank, `None` lets the generator pick.
        #[serde(rename = "bankId", default, skip_serializing_if = "Option::is_none")]
        bank_id: Option<String>,
    },
    /// Abort the request with this id.
    Cancel { id: String },
    /// Forget the server-side conversation.
    ClearSession,
    /// Keepalive.
    Ping,
}

impl ClientMessage {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Message received from the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The request was accepted.
    Start {
        #[serde(default)]
        id: String,
    },
    /// Intermediate reasoning text; informational only.
    Thinking {
        #[serde(default)]
        id: String,
        #[serde(default)]
        data: String,
    },
    /// A fragment of the composition stream.
    Chunk {
        #[serde(default)]
        id: String,
        #[serde(default)]
        data: String,
    },
    /// The stream completed. Carries the bank in effect, if any.
    Done {
        #[serde(default)]
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bank: Option<String>,
    },
    /// The request was cancelled server-side.
    Cancelled {
        #[serde(default)]
        id: String,
    },
    /// Generation failed.
    Error {
        #[serde(default)]
        id: String,
        #[serde(default)]
        message: String,
    },
    Pong,
    SessionCleared,
    /// Any message type this client does not know.
    #[serde(other)]
    Unknown,
}

impl ServerMessage {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Id of the request this message belongs to, if it carries one.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            ServerMessage::Start { id }
            | ServerMessage::Thinking { id, .. }
            | ServerMessage::Chunk { id, .. }
            | ServerMessage::Done { id, .. }
            | ServerMessage::Cancelled { id }
            | ServerMessage::Error { id, .. } => Some(id),
            ServerMessage::Pong | ServerMessage::SessionCleared | ServerMessage::Unknown => None,
        }
    }

    /// Re-tag the message for another request. No-op for untagged messages.
    pub fn set_request_id(&mut self, new_id: &str) {
        match self {
            ServerMessage::Start { id }
            | ServerMessage::Thinking { id, .. }
            | ServerMessage::Chunk { id, .. }
            | ServerMessage::Done { id, .. }
            | ServerMessage::Cancelled { id }
            | ServerMessage::Error { id, .. } => {
                id.clear();
                id.push_str(new_id);
            }
            ServerMessage::Pong | ServerMessage::SessionCleared | ServerMessage::Unknown => {}
        }
    }

    /// Short name of the message type, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Start { .. } => "start",
            ServerMessage::Thinking { .. } => "thinking",
            ServerMessage::Chunk { .. } => "chunk",
            ServerMessage::Done { .. } => "done",
            ServerMessage::Cancelled { .. } => "cancelled",
            ServerMessage::Error { .. } => "error",
            ServerMessage::Pong => "pong",
            ServerMessage::SessionCleared => "session_cleared",
            ServerMessage::Unknown => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_compose_wire_format() {
        let msg = ClientMessage::Compose {
            prompt: "lofi beat".to_string(),
            id: "abc".to_string(),
            model: "gpt-oss:20b".to_string(),
            provider: "ollama".to_string(),
            max_tokens: 100_000,
            refine: false,
            bank_id: None,
        };
        let value: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "compose",
                "prompt": "lofi beat",
                "id": "abc",
                "model": "gpt-oss:20b",
                "provider": "ollama",
                "maxTokens": 100000,
                "refine": false,
            })
        );
    }

    #[test]
    fn test_unit_client_messages() {
        assert_eq!(ClientMessage::Ping.to_json().unwrap(), r#"{"type":"ping"}"#);
        assert_eq!(
            ClientMessage::ClearSession.to_json().unwrap(),
            r#"{"type":"clear_session"}"#
        );
        assert_eq!(
            ClientMessage::Cancel { id: "x".into() }.to_json().unwrap(),
            r#"{"type":"cancel","id":"x"}"#
        );
    }

    #[test]
    fn test_parse_server_messages() {
        let chunk = ServerMessage::from_json(r#"{"type":"chunk","id":"r1","data":"{\"t\":0"}"#).unwrap();
        assert_eq!(
            chunk,
            ServerMessage::Chunk {
                id: "r1".into(),
                data: r#"{"t":0"#.into()
            }
        );
        assert_eq!(chunk.request_id(), Some("r1"));

        let done = ServerMessage::from_json(r#"{"type":"done","id":"r1","bank":"retro"}"#).unwrap();
        assert_eq!(
            done,
            ServerMessage::Done {
                id: "r1".into(),
                bank: Some("retro".into())
            }
        );

        assert_eq!(ServerMessage::from_json(r#"{"type":"pong"}"#).unwrap(), ServerMessage::Pong);
        assert_eq!(
            ServerMessage::from_json(r#"{"type":"session_cleared"}"#).unwrap().request_id(),
            None
        );
        assert_eq!(
            ServerMessage::from_json(r#"{"type":"progress","pct":5}"#).unwrap(),
            ServerMessage::Unknown
        );
        assert!(ServerMessage::from_json("not json").is_err());
    }

    #[test]
    fn test_retag() {
        let mut msg = ServerMessage::Error {
            id: "old".into(),
            message: "boom".into(),
        };
        msg.set_request_id("new");
        assert_eq!(msg.request_id(), Some("new"));
        assert_eq!(msg.kind(), "error");

        let mut pong = ServerMessage::Pong;
        pong.set_request_id("new");
        assert_eq!(pong, ServerMessage::Pong);
    }
}
