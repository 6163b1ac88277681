//! Shared fixtures and harness elements for the integration tests.

use std::sync::{Arc, Mutex};

use lazy_static::lazy_static;
use rdpflow_core::{Buffer, BufferMut, Encode as _};
use rdpflow_graph::{
    element_ref, link_elements, Direction, Element, ElementCore, ElementRef, Event, GraphResult,
    Link, LinkRef, OneTimeLogic, OneTimeSwitch, DEFAULT_SINK_PAD, DEFAULT_SRC_PAD, ONE_TIME_PAD,
};
use rdpflow_pdu::rdp::capability_sets::{
    BitmapCapability, BitmapDrawingFlags, CapabilitySet, DemandActive,
};
use rdpflow_pdu::rdp::headers::{write_share_control_header, ShareControlPduType};
use rdpflow_session::ScreenDescription;

pub type Received = Arc<Mutex<Vec<Buffer>>>;
pub type Seen = Arc<Mutex<Vec<(Event, Direction)>>>;

/// Terminal sink recording everything it receives.
pub struct Collector {
    core: ElementCore,
    received: Received,
    events: Seen,
}

pub fn collector(id: &str) -> (ElementRef, Received, Seen) {
    let received = Received::default();
    let events = Seen::default();
    let element = element_ref(Collector {
        core: ElementCore::new(id),
        received: Arc::clone(&received),
        events: Arc::clone(&events),
    });
    (element, received, events)
}

impl Element for Collector {
    fn core(&self) -> &ElementCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ElementCore {
        &mut self.core
    }

    fn handle_data(&mut self, buf: Buffer, _link: &LinkRef) -> GraphResult<()> {
        self.received.lock().expect("collector").push(buf);
        Ok(())
    }

    fn handle_event(&mut self, event: Event, direction: Direction) -> GraphResult<()> {
        self.events.lock().expect("collector").push((event, direction));
        self.core.forward_event(event, direction)
    }
}

/// A one-time handshake element wired the way the client pipeline wires
/// it: a feed link upstream, a downstream collector on the main output,
/// and a request collector on the one-time pad.
pub struct SwitchHarness {
    pub switch: ElementRef,
    pub feed: LinkRef,
    pub requests: Received,
    pub downstream: Received,
    pub downstream_events: Seen,
    // Links keep only weak endpoint refs, so the collector elements must be
    // retained here to stay alive for the lifetime of the harness.
    pub _downstream_sink: ElementRef,
    pub _request_sink: ElementRef,
}

pub fn switch_harness<L: OneTimeLogic + 'static>(id: &str, logic: L) -> SwitchHarness {
    let switch = element_ref(OneTimeSwitch::new(id, logic));
    let (downstream, downstream_data, downstream_events) = collector("downstream");
    let (request_sink, requests, _) = collector("requests");

    let feed = Link::new("feed");
    feed.set_sink(&switch, DEFAULT_SINK_PAD);
    switch
        .lock()
        .expect("switch")
        .set_link(DEFAULT_SINK_PAD, LinkRef::clone(&feed), Direction::In);
    link_elements("switch:down", &switch, DEFAULT_SRC_PAD, &downstream, DEFAULT_SINK_PAD);
    link_elements("switch:requests", &switch, ONE_TIME_PAD, &request_sink, DEFAULT_SINK_PAD);

    SwitchHarness {
        switch,
        feed,
        requests,
        downstream: downstream_data,
        downstream_events,
        _downstream_sink: downstream,
        _request_sink: request_sink,
    }
}

impl SwitchHarness {
    pub fn start(&self) -> GraphResult<()> {
        self.switch
            .lock()
            .expect("switch")
            .handle_event(Event::StreamStart, Direction::Out)
    }

    pub fn feed(&self, bytes: &[u8]) -> GraphResult<()> {
        self.feed.send_data(Buffer::from_vec(bytes.to_vec()))
    }
}

/// Screen description recording what the handshake negotiated.
#[derive(Debug, Default)]
pub struct RecordingScreen {
    pub width: u16,
    pub height: u16,
    pub bits_per_pixel: u16,
}

impl ScreenDescription for RecordingScreen {
    fn set_desktop_size(&mut self, width: u16, height: u16) {
        self.width = width;
        self.height = height;
    }

    fn set_pixel_format(&mut self, bits_per_pixel: u16) {
        self.bits_per_pixel = bits_per_pixel;
    }
}

/// MCS attach-user confirm assigning user channel 1004.
pub const ATTACH_USER_CONFIRM: [u8; 4] = [0x2e, 0x00, 0x00, 0x03];

/// Builds the MCS body of a server demand-active (as the demand-active
/// stage receives it, TPKT and X224 already stripped).
pub fn demand_active_body(share_id: u32, width: u16, height: u16, bpp: u16) -> Vec<u8> {
    let pdu = DemandActive {
        source_descriptor: "RDP".to_owned(),
        capability_sets: vec![
            CapabilitySet::Other {
                set_type: 0x0001, // general, opaque to the client
                payload: Buffer::from_static(&[0u8; 20]),
            },
            CapabilitySet::Bitmap(BitmapCapability {
                pref_bits_per_pix: bpp,
                desktop_width: width,
                desktop_height: height,
                desktop_resize_flag: false,
                drawing_flags: BitmapDrawingFlags::empty(),
            }),
            CapabilitySet::Other {
                set_type: 0x000e, // font, skipped by declared length
                payload: Buffer::from_static(&[0u8; 4]),
            },
        ],
    };

    let mut inner = BufferMut::with_capacity(64);
    write_share_control_header(
        &mut inner,
        ShareControlPduType::DemandActive,
        1002,
        share_id,
        pdu.size() + 4,
    )
    .expect("share control header");
    pdu.encode(&mut inner).expect("demand active body");
    inner.write_u32(0); // sessionId
    let inner = inner.freeze();

    // MCS send-data indication envelope.
    let mut body = Vec::new();
    body.push(0x68);
    body.extend_from_slice(&3u16.to_be_bytes()); // initiator 1004
    body.extend_from_slice(&1003u16.to_be_bytes());
    body.push(0x70);
    let length = u16::try_from(inner.len()).expect("body fits");
    if length > 0x7f {
        body.extend_from_slice(&(length | 0x8000).to_be_bytes());
    } else {
        body.push(length.to_le_bytes()[0]);
    }
    body.extend_from_slice(inner.as_slice());
    body
}

// The documented client-info reference packet for user "vlisivka" with
// empty domain and password: 343 bytes of TPKT + X224 + MCS send-data
// request + security header + TS_INFO_PACKET.
const CLIENT_INFO_FRAMING: [u8; 15] = [
    0x03, 0x00, 0x01, 0x57, // TPKT, total length 343
    0x02, 0xf0, 0x80, // X224 data TPDU
    0x64, 0x00, 0x03, 0x03, 0xeb, 0x70, // send-data request, user 1004, channel 1003
    0x81, 0x48, // user data length 328
];

const CLIENT_INFO_SECURITY: [u8; 4] = [0x40, 0x00, 0x00, 0x00]; // SEC_INFO_PKT

const CLIENT_INFO_FIXED: [u8; 18] = [
    0x00, 0x00, 0x00, 0x00, // codePage
    0x33, 0x01, 0x00, 0x00, // flags: mouse, no ctrl-alt-del, unicode, maximize shell, windows key
    0x00, 0x00, // cbDomain
    0x10, 0x00, // cbUserName
    0x00, 0x00, // cbPassword
    0x00, 0x00, // cbAlternateShell
    0x00, 0x00, // cbWorkingDir
];

const CLIENT_INFO_STRINGS: [u8; 26] = [
    0x00, 0x00, // domain terminator
    0x76, 0x00, 0x6c, 0x00, 0x69, 0x00, 0x73, 0x00, // "vlis"
    0x69, 0x00, 0x76, 0x00, 0x6b, 0x00, 0x61, 0x00, // "ivka"
    0x00, 0x00, // username terminator
    0x00, 0x00, // password terminator
    0x00, 0x00, // alternate shell terminator
    0x00, 0x00, // working dir terminator
];

const CLIENT_INFO_ADDRESS: [u8; 32] = [
    0x02, 0x00, // AF_INET
    0x1c, 0x00, // cbClientAddress
    0x31, 0x00, 0x39, 0x00, 0x32, 0x00, 0x2e, 0x00, // "192."
    0x31, 0x00, 0x36, 0x00, 0x38, 0x00, 0x2e, 0x00, // "168."
    0x30, 0x00, 0x2e, 0x00, 0x31, 0x00, 0x30, 0x00, // "0.10"
    0x30, 0x00, // "0"
    0x00, 0x00, // terminator
];

const CLIENT_INFO_DIR: [u8; 66] = [
    0x40, 0x00, // cbClientDir
    0x43, 0x00, 0x3a, 0x00, 0x5c, 0x00, 0x57, 0x00, // "C:\W"
    0x69, 0x00, 0x6e, 0x00, 0x64, 0x00, 0x6f, 0x00, // "indo"
    0x77, 0x00, 0x73, 0x00, 0x5c, 0x00, 0x53, 0x00, // "ws\S"
    0x79, 0x00, 0x73, 0x00, 0x74, 0x00, 0x65, 0x00, // "yste"
    0x6d, 0x00, 0x33, 0x00, 0x32, 0x00, 0x5c, 0x00, // "m32\"
    0x6d, 0x00, 0x73, 0x00, 0x74, 0x00, 0x73, 0x00, // "msts"
    0x63, 0x00, 0x61, 0x00, 0x78, 0x00, 0x2e, 0x00, // "cax."
    0x64, 0x00, 0x6c, 0x00, 0x6c, 0x00, // "dll"
    0x00, 0x00, // terminator
];

const CLIENT_INFO_TRAILER: [u8; 10] = [
    0x00, 0x00, 0x00, 0x00, // clientSessionId
    0x07, 0x00, 0x00, 0x00, // performance flags: no wallpaper, drag or animations
    0x00, 0x00, // cbAutoReconnectLen
];

lazy_static! {
    /// The full 343-byte reference packet.
    pub static ref CLIENT_INFO_PACKET: Vec<u8> = {
        let mut packet = Vec::with_capacity(343);
        packet.extend_from_slice(&CLIENT_INFO_FRAMING);
        packet.extend_from_slice(&CLIENT_INFO_SECURITY);
        packet.extend_from_slice(&CLIENT_INFO_FIXED);
        packet.extend_from_slice(&CLIENT_INFO_STRINGS);
        packet.extend_from_slice(&CLIENT_INFO_ADDRESS);
        packet.extend_from_slice(&CLIENT_INFO_DIR);
        packet.extend_from_slice(&[0u8; 172]); // timezone block, all zeroed
        packet.extend_from_slice(&CLIENT_INFO_TRAILER);
        assert_eq!(packet.len(), 343);
        packet
    };
}
