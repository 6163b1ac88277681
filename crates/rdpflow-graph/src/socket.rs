use std::io::{Read as _, Write as _};
use std::net::{Shutdown, TcpStream};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rdpflow_core::{Buffer, BufferPool};
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, StreamOwned};
use tracing::{debug, warn};

use crate::element::{ElementCore, DEFAULT_SRC_PAD};
use crate::link::LinkRef;
use crate::{element_ref, lock, Direction, Element, ElementRef, Event, GraphError, GraphResult};

/// How long a blocking read may hold the stream lock before letting the
/// writer in. The inbound loop simply retries, so this bounds writer
/// latency without busy-waiting.
const READ_SLICE: Duration = Duration::from_millis(50);

/// Size of the transport read chunks handed to the inbound chain.
const READ_CHUNK: usize = 16 * 1024;

enum SocketStream {
    Plain(TcpStream),
    Tls(Box<StreamOwned<ClientConnection, TcpStream>>),
    Closed,
}

enum ReadOutcome {
    Data(Buffer),
    TimedOut,
    Eof,
}

/// Shared handle over the transport socket, supporting an in-place
/// upgrade to TLS between reads.
///
/// Reads and writes are serialized by a mutex; reads use a short receive
/// timeout so a blocked reader never starves the writer.
pub struct SocketStreamHandle {
    inner: Mutex<SocketStream>,
    pool: BufferPool,
}

impl SocketStreamHandle {
    fn new(stream: TcpStream) -> GraphResult<Self> {
        stream
            .set_read_timeout(Some(READ_SLICE))
            .map_err(|e| GraphError::io("socket configuration", e))?;
        Ok(Self {
            inner: Mutex::new(SocketStream::Plain(stream)),
            pool: BufferPool::new(),
        })
    }

    fn read_chunk(&self) -> GraphResult<ReadOutcome> {
        let mut chunk = self.pool.take(READ_CHUNK);
        chunk.write_padding(READ_CHUNK);
        let mut inner = lock(&self.inner);
        let result = match &mut *inner {
            SocketStream::Plain(stream) => stream.read(chunk.as_mut_slice()),
            SocketStream::Tls(stream) => stream.read(chunk.as_mut_slice()),
            SocketStream::Closed => return Ok(ReadOutcome::Eof),
        };
        match result {
            Ok(0) => {
                *inner = SocketStream::Closed;
                Ok(ReadOutcome::Eof)
            }
            Ok(n) => {
                chunk.truncate(n);
                Ok(ReadOutcome::Data(chunk.freeze()))
            }
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                Ok(ReadOutcome::TimedOut)
            }
            Err(e) => {
                *inner = SocketStream::Closed;
                Err(GraphError::io("socket read", e))
            }
        }
    }

    fn write_all(&self, data: &[u8]) -> GraphResult<()> {
        let mut inner = lock(&self.inner);
        let result = match &mut *inner {
            SocketStream::Plain(stream) => stream.write_all(data),
            SocketStream::Tls(stream) => stream.write_all(data),
            SocketStream::Closed => {
                return Err(GraphError::io(
                    "socket write",
                    std::io::Error::new(std::io::ErrorKind::NotConnected, "stream closed"),
                ))
            }
        };
        result.map_err(|e| {
            *inner = SocketStream::Closed;
            GraphError::io("socket write", e)
        })
    }

    /// Replaces the plain stream with a TLS session over the same socket,
    /// running the handshake on the calling thread. Must be called
    /// between protocol messages, i.e. from the inbound chain itself.
    pub fn upgrade_to_tls(
        &self,
        config: Arc<ClientConfig>,
        server_name: &str,
    ) -> GraphResult<()> {
        let name = ServerName::try_from(server_name.to_owned())
            .map_err(|_| GraphError::protocol("tls upgrade", "invalid server name"))?;

        let mut inner = lock(&self.inner);
        let stream = match std::mem::replace(&mut *inner, SocketStream::Closed) {
            SocketStream::Plain(stream) => stream,
            other => {
                *inner = other;
                return Err(GraphError::protocol(
                    "tls upgrade",
                    "stream is not in the plain state",
                ));
            }
        };

        // The handshake wants real blocking reads; restore the read slice
        // once the session is up.
        stream
            .set_read_timeout(None)
            .map_err(|e| GraphError::io("tls upgrade", e))?;

        let mut connection = ClientConnection::new(config, name)
            .map_err(|e| GraphError::Tls {
                context: "tls client setup",
                source: e,
            })?;

        let mut stream = stream;
        while connection.is_handshaking() {
            connection
                .complete_io(&mut stream)
                .map_err(|e| GraphError::io("tls handshake", e))?;
        }

        stream
            .set_read_timeout(Some(READ_SLICE))
            .map_err(|e| GraphError::io("tls upgrade", e))?;

        debug!("transport upgraded to TLS");
        *inner = SocketStream::Tls(Box::new(StreamOwned::new(connection, stream)));
        Ok(())
    }

    /// Shuts the transport down; subsequent reads report end-of-stream.
    pub fn shutdown(&self) {
        let mut inner = lock(&self.inner);
        match std::mem::replace(&mut *inner, SocketStream::Closed) {
            SocketStream::Plain(stream) => {
                let _ = stream.shutdown(Shutdown::Both);
            }
            SocketStream::Tls(stream) => {
                let _ = stream.sock.shutdown(Shutdown::Both);
            }
            SocketStream::Closed => {}
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(*lock(&self.inner), SocketStream::Closed)
    }
}

/// Byte-stream source element: reads transport chunks and pushes them into
/// its output link.
pub struct SocketSource {
    core: ElementCore,
    stream: Arc<SocketStreamHandle>,
    closed: bool,
}

impl Element for SocketSource {
    fn core(&self) -> &ElementCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ElementCore {
        &mut self.core
    }

    fn handle_data(&mut self, _buf: Buffer, _link: &LinkRef) -> GraphResult<()> {
        Err(GraphError::protocol(
            "socket source",
            "a stream source has no input pads",
        ))
    }

    fn handle_event(&mut self, event: Event, direction: Direction) -> GraphResult<()> {
        if event == Event::StreamClose {
            self.closed = true;
            self.stream.shutdown();
        }
        self.core.forward_event(event, direction)
    }

    fn poll(&mut self, block: bool) -> GraphResult<()> {
        loop {
            if self.closed {
                return Ok(());
            }
            match self.stream.read_chunk()? {
                ReadOutcome::Data(buf) => return self.core.send_out(DEFAULT_SRC_PAD, buf),
                ReadOutcome::TimedOut => {
                    if !block {
                        return Ok(());
                    }
                }
                ReadOutcome::Eof => {
                    debug!(element = self.core.id(), "transport reached end of stream");
                    self.closed = true;
                    return self.core.forward_event(Event::StreamClose, Direction::Out);
                }
            }
        }
    }
}

/// Byte-stream sink element: writes every delivered buffer to the
/// transport.
pub struct SocketSink {
    core: ElementCore,
    stream: Arc<SocketStreamHandle>,
}

impl Element for SocketSink {
    fn core(&self) -> &ElementCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ElementCore {
        &mut self.core
    }

    fn handle_data(&mut self, buf: Buffer, _link: &LinkRef) -> GraphResult<()> {
        self.stream.write_all(buf.as_slice()).inspect_err(|error| {
            // Transport failures are terminal for this direction; the
            // error unwinds to whichever loop pushed the data.
            warn!(element = self.core.id(), %error, "transport write failed");
        })
    }

    fn handle_event(&mut self, event: Event, _direction: Direction) -> GraphResult<()> {
        if event == Event::StreamClose {
            self.stream.shutdown();
        }
        // The sink is the end of its chain; nothing to forward to.
        Ok(())
    }
}

/// Bridges a transport socket to a source element (inbound bytes) and a
/// sink element (outbound bytes) sharing one upgradeable stream.
pub struct SocketWrapper {
    stream: Arc<SocketStreamHandle>,
    source: ElementRef,
    sink: ElementRef,
}

impl SocketWrapper {
    pub fn new(id: &str, stream: TcpStream) -> GraphResult<Self> {
        let stream = Arc::new(SocketStreamHandle::new(stream)?);
        let source = element_ref(SocketSource {
            core: ElementCore::new(format!("{id}-src")).require_pads(&[], &[DEFAULT_SRC_PAD]),
            stream: Arc::clone(&stream),
            closed: false,
        });
        let sink = element_ref(SocketSink {
            core: ElementCore::new(format!("{id}-sink")),
            stream: Arc::clone(&stream),
        });
        Ok(Self {
            stream,
            source,
            sink,
        })
    }

    pub fn stream(&self) -> Arc<SocketStreamHandle> {
        Arc::clone(&self.stream)
    }

    pub fn source(&self) -> &ElementRef {
        &self.source
    }

    pub fn sink(&self) -> &ElementRef {
        &self.sink
    }

    /// Drives the inbound direction on the calling thread until the
    /// transport closes or a stage fails.
    pub fn run_inbound(&self) -> GraphResult<()> {
        loop {
            if self.stream.is_closed() {
                return Ok(());
            }
            lock(&self.source).poll(true)?;
        }
    }
}
