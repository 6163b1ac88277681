//! The RDP connection sequence and steady-state routing, built as graph
//! elements over `rdpflow-graph`.
//!
//! The inbound chain de-frames TPKT and X224, then walks a row of one-time
//! handshake elements, each of which answers one fixed exchange and then
//! splices itself out of the graph:
//!
//! ```not_rust
//! socket ─ tpkt ─ x224-connect ─ x224-data ─ mcs-attach ─ channel-join ─
//!     client-info ─ demand-active ─ synchronize ─ router ─ orders/bitmap/palette
//! ```
//!
//! One-shot requests travel through each element's dedicated one-time pad
//! straight to the socket sink.

mod activation;
mod client;
mod connect;
mod framing;
mod mcs_connect;
mod router;
mod state;
mod wire;

pub use activation::{ClientInfoLogic, DemandActiveLogic, SynchronizeLogic};
pub use client::RdpClient;
pub use connect::X224ConnectLogic;
pub use framing::{TpktFramer, X224DataFramer};
pub use mcs_connect::{ChannelJoinLogic, McsAttachLogic};
pub use router::ServerIoChannelRouter;
pub use state::{ConnectionState, SharedConnectionState};

use std::sync::Arc;

use rdpflow_pdu::rdp::client_info::PerformanceFlags;

/// MCS channel the I/O stream of a session is carried on.
pub const DEFAULT_IO_CHANNEL_ID: u16 = 1003;

/// Pixel format and desktop geometry sink; the embedding renderer
/// implements this and receives the values negotiated at demand-active
/// time.
pub trait ScreenDescription: Send {
    fn set_desktop_size(&mut self, width: u16, height: u16);
    fn set_pixel_format(&mut self, bits_per_pixel: u16);
}

pub type SharedScreen = Arc<std::sync::Mutex<dyn ScreenDescription>>;

/// Per-connection configuration, owned by the caller and injected at
/// pipeline construction.
#[derive(Clone)]
pub struct ConnectionConfig {
    pub username: String,
    pub password: String,
    pub domain: Option<String>,
    /// Host name presented during the TLS upgrade and in the connection
    /// request cookie.
    pub server_name: String,
    pub client_address: String,
    pub client_dir: String,
    pub performance_flags: PerformanceFlags,
    /// Static channels to join in addition to the I/O channel.
    pub static_channels: Vec<u16>,
    /// When set, the transport is upgraded to TLS after the X224
    /// connection confirm. Certificate trust policy lives entirely in
    /// this caller-supplied config.
    pub tls: Option<Arc<rustls::ClientConfig>>,
}

impl ConnectionConfig {
    pub fn new(server_name: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: String::new(),
            domain: None,
            server_name: server_name.into(),
            client_address: "192.168.0.100".to_owned(),
            client_dir: "C:\\Windows\\System32\\mstscax.dll".to_owned(),
            performance_flags: PerformanceFlags::DISABLE_WALLPAPER
                | PerformanceFlags::DISABLE_FULLWINDOWDRAG
                | PerformanceFlags::DISABLE_MENUANIMATIONS,
            static_channels: Vec::new(),
            tls: None,
        }
    }
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The password stays out of logs.
        f.debug_struct("ConnectionConfig")
            .field("username", &self.username)
            .field("domain", &self.domain)
            .field("server_name", &self.server_name)
            .field("static_channels", &self.static_channels)
            .field("tls", &self.tls.is_some())
            .finish_non_exhaustive()
    }
}
