use rdpflow_core::Buffer;
use rdpflow_graph::{
    Element, ElementCore, GraphResult, LinkRef, DEFAULT_SINK_PAD, DEFAULT_SRC_PAD,
};
use rdpflow_pdu::tpkt::TpktHeader;
use rdpflow_pdu::x224;
use tracing::trace;

/// De-frames the transport byte stream into one buffer per TPKT,
/// stripping the header. Partial packets wait in the link cache via the
/// expected-size mechanism; surplus bytes are pushed back for the next
/// round.
pub struct TpktFramer {
    core: ElementCore,
}

impl TpktFramer {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            core: ElementCore::new(id).require_pads(&[DEFAULT_SINK_PAD], &[DEFAULT_SRC_PAD]),
        }
    }
}

impl Element for TpktFramer {
    fn core(&self) -> &ElementCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ElementCore {
        &mut self.core
    }

    fn handle_data(&mut self, mut buf: Buffer, link: &LinkRef) -> GraphResult<()> {
        if buf.len() < TpktHeader::SIZE {
            link.push_back(buf, Some(TpktHeader::SIZE));
            return Ok(());
        }

        let header = TpktHeader::decode(&mut buf)?;
        let total = header.packet_length();
        if buf.len() < total {
            link.push_back(buf, Some(total));
            return Ok(());
        }

        let tpdu = buf.read_slice(total - TpktHeader::SIZE)?;
        trace!(element = self.core.id(), len = tpdu.len(), "tpkt de-framed");
        self.core.send_out(DEFAULT_SRC_PAD, tpdu)?;

        if buf.remaining() > 0 {
            link.push_back(buf.read_remaining(), Some(TpktHeader::SIZE));
        }
        Ok(())
    }
}

/// Strips the X.224 data TPDU header, leaving the MCS body.
pub struct X224DataFramer {
    core: ElementCore,
}

impl X224DataFramer {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            core: ElementCore::new(id).require_pads(&[DEFAULT_SINK_PAD], &[DEFAULT_SRC_PAD]),
        }
    }
}

impl Element for X224DataFramer {
    fn core(&self) -> &ElementCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ElementCore {
        &mut self.core
    }

    fn handle_data(&mut self, mut buf: Buffer, _link: &LinkRef) -> GraphResult<()> {
        x224::read_data_header(&mut buf)?;
        let body = buf.read_remaining();
        self.core.send_out(DEFAULT_SRC_PAD, body)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use rdpflow_graph::{element_ref, link_elements, Link};

    use super::*;

    struct Probe {
        core: ElementCore,
        received: Arc<Mutex<Vec<Buffer>>>,
    }

    impl Element for Probe {
        fn core(&self) -> &ElementCore {
            &self.core
        }

        fn core_mut(&mut self) -> &mut ElementCore {
            &mut self.core
        }

        fn handle_data(&mut self, buf: Buffer, _link: &LinkRef) -> GraphResult<()> {
            self.received.lock().unwrap().push(buf);
            Ok(())
        }
    }

    fn probe() -> (rdpflow_graph::ElementRef, Arc<Mutex<Vec<Buffer>>>) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let element = element_ref(Probe {
            core: ElementCore::new("probe"),
            received: Arc::clone(&received),
        });
        (element, received)
    }

    #[test]
    fn tpkt_framer_reassembles_and_splits() {
        let framer = element_ref(TpktFramer::new("tpkt"));
        let (sink, received) = probe();
        let feed = Link::new("feed");
        feed.set_sink(&framer, DEFAULT_SINK_PAD);
        link_elements("tpkt:probe", &framer, DEFAULT_SRC_PAD, &sink, DEFAULT_SINK_PAD);

        // Two TPKTs, split mid-packet across three pushes.
        let first = [0x03, 0x00, 0x00, 0x07, 0xaa, 0xbb, 0xcc];
        let second = [0x03, 0x00, 0x00, 0x06, 0x11, 0x22];

        feed.send_data(Buffer::from_vec(first[..2].to_vec())).unwrap();
        assert!(received.lock().unwrap().is_empty());
        feed.send_data(Buffer::from_vec([&first[2..], &second[..3]].concat()))
            .unwrap();
        feed.send_data(Buffer::from_vec(second[3..].to_vec())).unwrap();

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 2);
        assert_eq!(received[0].as_slice(), &[0xaa, 0xbb, 0xcc]);
        assert_eq!(received[1].as_slice(), &[0x11, 0x22]);
    }

    #[test]
    fn x224_data_framer_strips_header() {
        let framer = element_ref(X224DataFramer::new("x224"));
        let (sink, received) = probe();
        let feed = Link::new("feed");
        feed.set_sink(&framer, DEFAULT_SINK_PAD);
        link_elements("x224:probe", &framer, DEFAULT_SRC_PAD, &sink, DEFAULT_SINK_PAD);

        feed.send_data(Buffer::from_static(&[0x02, 0xf0, 0x80, 0x64, 0x00]))
            .unwrap();

        let received = received.lock().unwrap();
        assert_eq!(received[0].as_slice(), &[0x64, 0x00]);
    }

    #[test]
    fn x224_data_framer_rejects_non_data_tpdu() {
        let framer = element_ref(X224DataFramer::new("x224"));
        let (sink, _) = probe();
        let feed = Link::new("feed");
        feed.set_sink(&framer, DEFAULT_SINK_PAD);
        link_elements("x224:probe", &framer, DEFAULT_SRC_PAD, &sink, DEFAULT_SINK_PAD);

        assert!(feed
            .send_data(Buffer::from_static(&[0x06, 0xe0, 0x00, 0x00, 0x00]))
            .is_err());
    }
}
