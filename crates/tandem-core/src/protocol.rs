//! Wire protocol for the sync relay.
//!
//! Tagged JSON text frames. Store bytes (snapshots and incremental updates)
//! travel base64-encoded inside `data`/`snapshot` fields; presence records are
//! relayed as plain JSON and never touch the store.

use crate::presence::{PresenceRecord, UserDescriptor};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// Messages sent by a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Introduce this connection. Must be the first frame.
    Hello { user: UserDescriptor },
    /// Store update bytes (base64) since the sender's last send.
    Sync { data: String },
    /// The sender's full presence record.
    Presence { record: PresenceRecord },
    /// Orderly goodbye; closing the socket works too.
    Bye,
}

/// Messages sent by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Reply to `hello`: the connection's id, the room, a full store
    /// snapshot (base64) and everyone already present.
    Welcome {
        connection_id: String,
        room: String,
        snapshot: String,
        peers: Vec<PeerInfo>,
    },
    /// Update bytes from another connection.
    Sync { from: String, data: String },
    /// Presence record from another connection.
    Presence {
        from: String,
        record: PresenceRecord,
    },
    PeerJoined {
        connection_id: String,
        user: UserDescriptor,
    },
    PeerLeft { connection_id: String },
    Error { message: String },
}

/// One connection as listed in `welcome`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerInfo {
    pub connection_id: String,
    pub user: UserDescriptor,
}

pub fn encode_update(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn decode_update(data: &str) -> Option<Vec<u8>> {
    STANDARD.decode(data).ok()
}
