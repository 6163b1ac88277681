//! RDP connection-sequence and share PDUs carried inside the MCS
//! send-data envelope.

pub mod capability_sets;
pub mod client_info;
pub mod finalization;
pub mod headers;
