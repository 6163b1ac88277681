//! RDP PDU encoding and decoding.
//!
//! Every client→server and server→client message is wrapped in three
//! nested framing layers, outermost first: TPKT, X224 data TPDU, MCS
//! send-data request/indication. Decoding unwraps them in order; encoding
//! wraps in reverse order with exact length fields recomputed at each
//! layer (see [`frame`]).

pub mod frame;
pub mod mcs;
pub mod rdp;
pub mod tpkt;
pub mod x224;

mod per;
