//! Gateway frame encoding.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::domain::SessionId;

pub const OP_DISPATCH: u8 = 0;
pub const OP_HEARTBEAT: u8 = 1;
pub const OP_IDENTIFY: u8 = 2;
pub const OP_RESUME: u8 = 6;
pub const OP_RECONNECT: u8 = 7;
pub const OP_INVALID_SESSION: u8 = 9;
pub const OP_HELLO: u8 = 10;
pub const OP_HEARTBEAT_ACK: u8 = 11;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub op: u8,
    #[serde(default)]
    pub d: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

impl Frame {
    fn op(op: u8, d: Value) -> Self {
        Self {
            op,
            d,
            s: None,
            t: None,
        }
    }

    pub fn heartbeat(seq: Option<u64>) -> Self {
        Self::op(OP_HEARTBEAT, json!(seq))
    }

    pub fn identify(token: &str, intents: u64) -> Self {
        Self::op(
            OP_IDENTIFY,
            json!({
                "token": token,
                "intents": intents,
                "properties": {
                    "$os": std::env::consts::OS,
                    "$browser": "kettu",
                    "$device": "kettu",
                },
            }),
        )
    }

    pub fn resume(token: &str, session_id: &SessionId, seq: Option<u64>) -> Self {
        Self::op(
            OP_RESUME,
            json!({
                "token": token,
                "session_id": session_id.0,
                "seq": seq,
            }),
        )
    }

    /// `heartbeat_interval` of a Hello frame, in milliseconds.
    pub fn heartbeat_interval_ms(&self) -> Option<u64> {
        self.d.get("heartbeat_interval").and_then(Value::as_u64)
    }
}
