use std::sync::{Arc, Mutex};

use rdpflow_graph::{GraphError, GraphResult};

/// Mutable record shared by the handshake elements over the lifetime of
/// one connection. Earlier stages fill fields in, later stages read and
/// validate against them.
#[derive(Debug)]
pub struct ConnectionState {
    /// User channel id assigned by the attach-user confirm.
    pub server_user_channel_id: Option<u16>,
    /// Channel carrying the session I/O stream.
    pub io_channel_id: u16,
    /// Server-side originator id, learned from the demand-active PDU
    /// source and echoed in client share control headers.
    pub server_channel_id: Option<u16>,
    /// Share id learned at demand-active time; every subsequent data PDU
    /// must carry it.
    pub share_id: Option<u32>,
    /// The channel whose join request is in flight, if any.
    pub pending_join: Option<u16>,
    pub joined_channels: Vec<u16>,
}

pub type SharedConnectionState = Arc<Mutex<ConnectionState>>;

impl ConnectionState {
    pub fn new(io_channel_id: u16) -> SharedConnectionState {
        Arc::new(Mutex::new(Self {
            server_user_channel_id: None,
            io_channel_id,
            server_channel_id: None,
            share_id: None,
            pending_join: None,
            joined_channels: Vec::new(),
        }))
    }

    pub fn user_channel_id(&self) -> GraphResult<u16> {
        self.server_user_channel_id.ok_or_else(|| {
            GraphError::protocol(
                "connection state",
                "user channel id used before attach-user confirm",
            )
        })
    }

    pub fn share_id(&self) -> GraphResult<u32> {
        self.share_id.ok_or_else(|| {
            GraphError::protocol("connection state", "share id used before demand-active")
        })
    }
}
