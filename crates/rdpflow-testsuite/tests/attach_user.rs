use rdpflow_session::{ConnectionState, McsAttachLogic, DEFAULT_IO_CHANNEL_ID};
use rdpflow_testsuite::{switch_harness, ATTACH_USER_CONFIRM};

#[test]
fn attach_stage_sends_erect_domain_then_attach_user() {
    let state = ConnectionState::new(DEFAULT_IO_CHANNEL_ID);
    let harness = switch_harness("mcs-attach", McsAttachLogic::new(state));

    harness.start().unwrap();

    let requests = harness.requests.lock().unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(
        requests[0].as_slice(),
        &[0x03, 0x00, 0x00, 0x0c, 0x02, 0xf0, 0x80, 0x04, 0x01, 0x00, 0x01, 0x00],
        "erect domain request"
    );
    assert_eq!(
        requests[1].as_slice(),
        &[0x03, 0x00, 0x00, 0x08, 0x02, 0xf0, 0x80, 0x28],
        "attach user request"
    );
}

#[test]
fn attach_user_confirm_yields_channel_1004() {
    let state = ConnectionState::new(DEFAULT_IO_CHANNEL_ID);
    let harness = switch_harness(
        "mcs-attach",
        McsAttachLogic::new(rdpflow_session::SharedConnectionState::clone(&state)),
    );

    harness.start().unwrap();
    harness.feed(&ATTACH_USER_CONFIRM).unwrap();

    assert_eq!(
        state.lock().unwrap().server_user_channel_id,
        Some(1004),
        "initiator 3 + base 1001"
    );
    // The stage spliced itself out and woke the next one.
    assert!(!harness.downstream_events.lock().unwrap().is_empty());
}

#[test]
fn refused_attach_is_fatal() {
    let state = ConnectionState::new(DEFAULT_IO_CHANNEL_ID);
    let harness = switch_harness("mcs-attach", McsAttachLogic::new(state));

    harness.start().unwrap();
    // Result 2: rt-domain-not-hierarchical.
    assert!(harness.feed(&[0x2e, 0x02, 0x00, 0x03]).is_err());
}
