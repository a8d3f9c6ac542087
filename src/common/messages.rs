//! # Message Protocol
//!
//! The three messages exchanged between peers during leader election. Every message is
//! fire-and-acknowledge: the receiver answers with an empty JSON object on success and
//! nothing else is carried back.
//!
//! On the wire each message is a `POST` to its own endpoint with a JSON body:
//! ```text
//! Ping               -> POST {address}/ping            {}
//! ElectionRequest    -> POST {address}/electation      {}
//! LeaderAnnouncement -> POST {address}/leader-elected  {"leaderID": "node-04"}
//! ```

use serde_json::{json, Value};

use super::error::ProtocolError;

/// Wire name of the leader field in announcements.
pub const LEADER_ID_FIELD: &str = "leaderID";

/// Messages understood by every node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Liveness check. Used by bootstrap and by the heartbeat monitor.
    Ping,

    /// "I am holding an election; if you outrank me, answer and take over."
    ElectionRequest,

    /// Broadcast by the winner of an election.
    LeaderAnnouncement { leader_id: String },
}

/// Successful acknowledgment. Carries no payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack;

impl Message {
    /// Endpoint path this message is posted to, relative to a peer's address.
    pub fn endpoint(&self) -> &'static str {
        match self {
            Message::Ping => "ping",
            Message::ElectionRequest => "electation",
            Message::LeaderAnnouncement { .. } => "leader-elected",
        }
    }

    /// JSON body sent with this message.
    pub fn body(&self) -> Value {
        match self {
            Message::Ping | Message::ElectionRequest => json!({}),
            Message::LeaderAnnouncement { leader_id } => json!({ LEADER_ID_FIELD: leader_id }),
        }
    }

    /// Full URL of this message's endpoint on a peer.
    pub fn url(&self, address: &str) -> String {
        format!("{}/{}", address.trim_end_matches('/'), self.endpoint())
    }
}

/// Extract the leader id from a `leader-elected` body.
///
/// Anything other than a JSON object holding a string `leaderID` is a protocol error.
pub fn parse_announcement(body: &[u8]) -> Result<String, ProtocolError> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| ProtocolError::InvalidBody(e.to_string()))?;

    match value.get(LEADER_ID_FIELD) {
        Some(Value::String(leader_id)) if !leader_id.is_empty() => Ok(leader_id.clone()),
        _ => Err(ProtocolError::MissingLeaderId),
    }
}
