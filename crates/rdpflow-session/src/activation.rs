use rdpflow_core::{Buffer, Encode as _};
use rdpflow_graph::{GraphError, GraphResult, OneTimeLogic, SwitchCtx};
use rdpflow_pdu::mcs::SendDataIndication;
use rdpflow_pdu::rdp::capability_sets::{
    BitmapCapability, BitmapDrawingFlags, CapabilitySet, ClientConfirmActive, DemandActive,
    ServerDemandActive,
};
use rdpflow_pdu::rdp::client_info::{
    AddressFamily, ClientInfo, ClientInfoFlags, Credentials, ExtendedClientInfo, TimezoneInfo,
};
use rdpflow_pdu::rdp::finalization::SynchronizePdu;
use rdpflow_pdu::rdp::headers::{
    write_share_control_header, write_share_data_header, BasicSecurityHeader,
    BasicSecurityHeaderFlags, ShareControlHeader, ShareControlPduType, ShareDataPduType, StreamId,
};
use tracing::debug;

use crate::state::SharedConnectionState;
use crate::wire::{send_data_body, send_data_frame};
use crate::{ConnectionConfig, SharedScreen};

/// Sends the client info PDU once the channel joins are complete. Pure
/// send: it switches off immediately after firing.
pub struct ClientInfoLogic {
    state: SharedConnectionState,
    config: ConnectionConfig,
}

impl ClientInfoLogic {
    pub fn new(state: SharedConnectionState, config: ConnectionConfig) -> Self {
        Self { state, config }
    }

    fn build_info(&self) -> ClientInfo {
        ClientInfo {
            credentials: Credentials {
                username: self.config.username.clone(),
                password: self.config.password.clone(),
                domain: self.config.domain.clone(),
            },
            code_page: 0,
            flags: ClientInfoFlags::MOUSE
                | ClientInfoFlags::DISABLE_CTRL_ALT_DEL
                | ClientInfoFlags::UNICODE
                | ClientInfoFlags::MAXIMIZE_SHELL
                | ClientInfoFlags::ENABLE_WINDOWS_KEY,
            alternate_shell: String::new(),
            work_dir: String::new(),
            extra: ExtendedClientInfo {
                address_family: AddressFamily::INet,
                address: self.config.client_address.clone(),
                dir: self.config.client_dir.clone(),
                timezone: TimezoneInfo::default(),
                session_id: 0,
                performance_flags: self.config.performance_flags,
            },
        }
    }
}

impl OneTimeLogic for ClientInfoLogic {
    fn on_start(&mut self, ctx: &mut SwitchCtx<'_>) -> GraphResult<()> {
        let info = self.build_info();
        let (user_channel_id, io_channel_id) = {
            let state = self.state.lock().expect("connection state");
            (state.user_channel_id()?, state.io_channel_id)
        };

        let mut body = send_data_body(4 + info.size());
        BasicSecurityHeader {
            flags: BasicSecurityHeaderFlags::INFO_PKT,
        }
        .encode(&mut body);
        info.encode(&mut body)?;

        debug!(message = ?info, "Send");
        ctx.send_one_time(send_data_frame(body, user_channel_id, io_channel_id)?)?;
        ctx.switch_off();
        Ok(())
    }

    fn handle_one_time_data(&mut self, _buf: Buffer, _ctx: &mut SwitchCtx<'_>) -> GraphResult<()> {
        Err(GraphError::protocol(
            "ClientInfo",
            "no server response is expected before the demand-active",
        ))
    }
}

/// Parses the server demand-active, publishes the negotiated pixel format
/// and desktop size, and answers with the client confirm-active.
pub struct DemandActiveLogic {
    state: SharedConnectionState,
    screen: SharedScreen,
}

impl DemandActiveLogic {
    pub fn new(state: SharedConnectionState, screen: SharedScreen) -> Self {
        Self { state, screen }
    }

    fn client_capability_sets(bitmap: BitmapCapability) -> Vec<CapabilitySet> {
        vec![
            CapabilitySet::Other {
                set_type: 0x0001, // general
                payload: Buffer::from_static(&GENERAL_CAPABILITY),
            },
            CapabilitySet::Bitmap(bitmap),
            CapabilitySet::Other {
                set_type: 0x0003, // order
                payload: Buffer::from_static(&ORDER_CAPABILITY),
            },
            CapabilitySet::Other {
                set_type: 0x0008, // pointer
                payload: Buffer::from_static(&POINTER_CAPABILITY),
            },
            CapabilitySet::Other {
                set_type: 0x000d, // input
                payload: Buffer::from_static(&INPUT_CAPABILITY),
            },
            CapabilitySet::Other {
                set_type: 0x0014, // virtual channel
                payload: Buffer::from_static(&VIRTUAL_CHANNEL_CAPABILITY),
            },
        ]
    }
}

impl OneTimeLogic for DemandActiveLogic {
    fn handle_one_time_data(&mut self, mut buf: Buffer, ctx: &mut SwitchCtx<'_>) -> GraphResult<()> {
        let indication = SendDataIndication::decode(&mut buf)?;
        let mut user_data = indication.user_data;

        let header = ShareControlHeader::decode(&mut user_data)?;
        if header.pdu_type != ShareControlPduType::DemandActive {
            return Err(GraphError::protocol(
                "DemandActive",
                format!("expected a demand-active PDU, got {:?}", header.pdu_type),
            ));
        }

        let demand_active = ServerDemandActive::decode(&mut user_data)?;
        debug!(share_id = header.share_id, source = header.pdu_source, "Received demand-active");

        let bitmap = demand_active.pdu.bitmap_capability().ok_or_else(|| {
            GraphError::protocol("DemandActive", "server offered no bitmap capability")
        })?;

        {
            let mut screen = self.screen.lock().expect("screen description");
            screen.set_desktop_size(bitmap.desktop_width, bitmap.desktop_height);
            screen.set_pixel_format(bitmap.pref_bits_per_pix);
        }

        let (user_channel_id, io_channel_id) = {
            let mut state = self.state.lock().expect("connection state");
            state.share_id = Some(header.share_id);
            state.server_channel_id = Some(header.pdu_source);
            (state.user_channel_id()?, state.io_channel_id)
        };

        let confirm = ClientConfirmActive {
            originator_id: header.pdu_source,
            pdu: DemandActive {
                source_descriptor: "rdpflow".to_owned(),
                capability_sets: Self::client_capability_sets(BitmapCapability {
                    pref_bits_per_pix: bitmap.pref_bits_per_pix,
                    desktop_width: bitmap.desktop_width,
                    desktop_height: bitmap.desktop_height,
                    desktop_resize_flag: false,
                    drawing_flags: BitmapDrawingFlags::empty(),
                }),
            },
        };

        let mut body = send_data_body(10 + confirm.size());
        write_share_control_header(
            &mut body,
            ShareControlPduType::ConfirmActive,
            user_channel_id,
            header.share_id,
            confirm.size(),
        )?;
        confirm.encode(&mut body)?;

        debug!("Send confirm-active");
        ctx.send_one_time(send_data_frame(body, user_channel_id, io_channel_id)?)?;
        ctx.switch_off();
        Ok(())
    }
}

/// Sends the client synchronize PDU, the last client-driven handshake
/// step before steady-state routing.
pub struct SynchronizeLogic {
    state: SharedConnectionState,
}

impl SynchronizeLogic {
    pub fn new(state: SharedConnectionState) -> Self {
        Self { state }
    }
}

impl OneTimeLogic for SynchronizeLogic {
    fn on_start(&mut self, ctx: &mut SwitchCtx<'_>) -> GraphResult<()> {
        let (user_channel_id, io_channel_id, share_id, target) = {
            let state = self.state.lock().expect("connection state");
            (
                state.user_channel_id()?,
                state.io_channel_id,
                state.share_id()?,
                state.server_channel_id.unwrap_or(1002),
            )
        };

        let sync = SynchronizePdu {
            target_user_id: target,
        };

        let mut body = send_data_body(10 + 8 + sync.size());
        write_share_control_header(
            &mut body,
            ShareControlPduType::Data,
            user_channel_id,
            share_id,
            8 + sync.size(),
        )?;
        write_share_data_header(&mut body, StreamId::Low, ShareDataPduType::Synchronize, sync.size())?;
        sync.encode(&mut body)?;

        debug!(message = ?sync, "Send");
        ctx.send_one_time(send_data_frame(body, user_channel_id, io_channel_id)?)?;
        ctx.switch_off();
        Ok(())
    }

    fn handle_one_time_data(&mut self, _buf: Buffer, _ctx: &mut SwitchCtx<'_>) -> GraphResult<()> {
        Err(GraphError::protocol(
            "Synchronize",
            "no inbound data is routed through the synchronize stage",
        ))
    }
}

/// TS_GENERAL_CAPABILITYSET body: OS unspecified, capability protocol
/// version 0x0200, no compression, no extra flags.
const GENERAL_CAPABILITY: [u8; 20] = [
    0x00, 0x00, // osMajorType
    0x00, 0x00, // osMinorType
    0x00, 0x02, // protocolVersion
    0x00, 0x00, // pad
    0x00, 0x00, // compressionTypes
    0x00, 0x00, // extraFlags
    0x00, 0x00, // updateCapabilityFlag
    0x00, 0x00, // remoteUnshareFlag
    0x00, 0x00, // compressionLevel
    0x00, // refreshRectSupport
    0x00, // suppressOutputSupport
];

/// TS_ORDER_CAPABILITYSET body: no drawing orders negotiated, every
/// update arrives as bitmap data.
const ORDER_CAPABILITY: [u8; 84] = {
    let mut body = [0u8; 84];
    // orderFlags: NEGOTIATEORDERSUPPORT | ZEROBOUNDSDELTASSUPPORT
    body[20] = 0x0a;
    // desktopSaveSize: 480 * 480
    body[48] = 0x00;
    body[49] = 0x84;
    body[50] = 0x03;
    body
};

/// TS_POINTER_CAPABILITYSET body: color pointers, modest cache.
const POINTER_CAPABILITY: [u8; 6] = [
    0x01, 0x00, // colorPointerFlag
    0x14, 0x00, // colorPointerCacheSize
    0x14, 0x00, // pointerCacheSize
];

/// TS_INPUT_CAPABILITYSET body: scancodes only, IME file name zeroed.
const INPUT_CAPABILITY: [u8; 84] = {
    let mut body = [0u8; 84];
    body[0] = 0x01; // INPUT_FLAG_SCANCODES
    body
};

/// TS_VIRTUALCHANNEL_CAPABILITYSET body: no virtual channel compression.
const VIRTUAL_CHANNEL_CAPABILITY: [u8; 8] = [0; 8];
