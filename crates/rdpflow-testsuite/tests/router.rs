use rdpflow_core::{Buffer, BufferMut, Encode as _};
use rdpflow_graph::{link_elements, element_ref, Element, Link, DEFAULT_SINK_PAD};
use rdpflow_pdu::rdp::finalization::SynchronizePdu;
use rdpflow_pdu::rdp::headers::{
    write_share_control_header, write_share_data_header, ShareControlPduType, ShareDataPduType,
    StreamId,
};
use rdpflow_session::{ConnectionState, ServerIoChannelRouter, SharedConnectionState, DEFAULT_IO_CHANNEL_ID};
use rdpflow_testsuite::{collector, Received};
use rstest::rstest;

const SHARE_ID: u32 = 0x0001_000e;

struct RouterHarness {
    feed: rdpflow_graph::LinkRef,
    orders: Received,
    bitmap: Received,
    palette: Received,
    // Links hold only weak endpoint refs, so the router and its sink
    // elements must be kept alive here for the lifetime of the harness.
    _router: rdpflow_graph::ElementRef,
    _sinks: [rdpflow_graph::ElementRef; 3],
}

fn router_harness() -> RouterHarness {
    let state = ConnectionState::new(DEFAULT_IO_CHANNEL_ID);
    {
        let mut state = state.lock().unwrap();
        state.server_user_channel_id = Some(1004);
        state.share_id = Some(SHARE_ID);
    }

    let router = element_ref(ServerIoChannelRouter::new(
        "router",
        SharedConnectionState::clone(&state),
    ));
    let (orders_sink, orders, _) = collector("orders-sink");
    let (bitmap_sink, bitmap, _) = collector("bitmap-sink");
    let (palette_sink, palette, _) = collector("palette-sink");

    let feed = Link::new("feed");
    feed.set_sink(&router, DEFAULT_SINK_PAD);
    router
        .lock()
        .unwrap()
        .set_link(DEFAULT_SINK_PAD, rdpflow_graph::LinkRef::clone(&feed), rdpflow_graph::Direction::In);

    link_elements("router:orders", &router, "orders", &orders_sink, DEFAULT_SINK_PAD);
    link_elements("router:bitmap", &router, "bitmap", &bitmap_sink, DEFAULT_SINK_PAD);
    link_elements("router:palette", &router, "palette", &palette_sink, DEFAULT_SINK_PAD);

    RouterHarness {
        feed,
        orders,
        bitmap,
        palette,
        _router: router,
        _sinks: [orders_sink, bitmap_sink, palette_sink],
    }
}

/// Wraps share-layer bytes in an MCS send-data indication for `channel`.
fn send_data_indication(channel: u16, inner: &[u8]) -> Vec<u8> {
    let mut body = vec![0x68, 0x00, 0x03];
    body.extend_from_slice(&channel.to_be_bytes());
    body.push(0x70);
    let length = u16::try_from(inner.len()).unwrap();
    if length > 0x7f {
        body.extend_from_slice(&(length | 0x8000).to_be_bytes());
    } else {
        body.push(length.to_le_bytes()[0]);
    }
    body.extend_from_slice(inner);
    body
}

fn update_pdu(share_id: u32, update_type: u16, payload: &[u8]) -> Vec<u8> {
    let body_size = 2 + payload.len();
    let mut inner = BufferMut::with_capacity(32);
    write_share_control_header(
        &mut inner,
        ShareControlPduType::Data,
        1002,
        share_id,
        8 + body_size,
    )
    .unwrap();
    write_share_data_header(&mut inner, StreamId::Medium, ShareDataPduType::Update, body_size)
        .unwrap();
    inner.write_u16(update_type);
    inner.write_slice(payload);
    inner.freeze().as_slice().to_vec()
}

#[rstest]
#[case::orders(0, &[0x01, 0x00, 0xaa])]
#[case::bitmap(1, &[0x02, 0x00, 0xbb, 0xcc])]
#[case::palette(2, &[0x03, 0x00])]
fn updates_reach_their_named_pad(#[case] update_type: u16, #[case] payload: &[u8]) {
    let harness = router_harness();
    let pdu = send_data_indication(1003, &update_pdu(SHARE_ID, update_type, payload));
    harness.feed.send_data(Buffer::from_vec(pdu)).unwrap();

    let expectations: [(&Received, bool); 3] = [
        (&harness.orders, update_type == 0),
        (&harness.bitmap, update_type == 1),
        (&harness.palette, update_type == 2),
    ];
    for (received, expected) in expectations {
        let received = received.lock().unwrap();
        if expected {
            assert_eq!(received.len(), 1);
            assert_eq!(received[0].as_slice(), payload);
        } else {
            assert!(received.is_empty());
        }
    }
}

#[test]
fn mismatched_share_id_is_fatal() {
    let harness = router_harness();
    let pdu = send_data_indication(1003, &update_pdu(0xdead_beef, 1, &[0x00]));
    assert!(harness.feed.send_data(Buffer::from_vec(pdu)).is_err());
}

#[test]
fn other_channels_are_ignored() {
    let harness = router_harness();
    let pdu = send_data_indication(1007, &update_pdu(SHARE_ID, 1, &[0x00]));
    harness.feed.send_data(Buffer::from_vec(pdu)).unwrap();
    assert!(harness.bitmap.lock().unwrap().is_empty());
}

#[test]
fn unhandled_data_pdus_are_discarded() {
    let harness = router_harness();

    // A synchronize data PDU: valid, but nothing downstream acts on it.
    let mut inner = BufferMut::with_capacity(32);
    let sync = SynchronizePdu { target_user_id: 1002 };
    write_share_control_header(&mut inner, ShareControlPduType::Data, 1002, SHARE_ID, 8 + sync.size())
        .unwrap();
    write_share_data_header(&mut inner, StreamId::Low, ShareDataPduType::Synchronize, sync.size())
        .unwrap();
    sync.encode(&mut inner).unwrap();

    let pdu = send_data_indication(1003, inner.freeze().as_slice());
    harness.feed.send_data(Buffer::from_vec(pdu)).unwrap();

    assert!(harness.orders.lock().unwrap().is_empty());
    assert!(harness.bitmap.lock().unwrap().is_empty());
    assert!(harness.palette.lock().unwrap().is_empty());
}

#[test]
fn server_redirect_is_fatal() {
    let harness = router_harness();

    let mut inner = BufferMut::with_capacity(16);
    write_share_control_header(&mut inner, ShareControlPduType::ServerRedirect, 1002, SHARE_ID, 0)
        .unwrap();

    let pdu = send_data_indication(1003, inner.freeze().as_slice());
    assert!(harness.feed.send_data(Buffer::from_vec(pdu)).is_err());
}
