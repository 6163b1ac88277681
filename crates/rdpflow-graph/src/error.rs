use rdpflow_core::{DecodeError, EncodeError};
use thiserror::Error;

pub type GraphResult<T> = Result<T, GraphError>;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GraphError {
    #[error("mandatory pad `{pad}` of element `{element}` is not connected")]
    PadNotConnected { element: String, pad: String },
    #[error("element `{element}` has no link on pad `{pad}`")]
    NoSuchPad { element: String, pad: String },
    #[error("link `{0}` is closed")]
    LinkClosed(String),
    #[error("link `{link}` has no {end} endpoint")]
    MissingEndpoint { link: String, end: &'static str },
    #[error("unknown element `{0}`")]
    UnknownElement(String),
    #[error("bad link syntax: `{0}`")]
    BadLinkSyntax(String),
    #[error("I/O failure in {context}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("TLS failure in {context}")]
    Tls {
        context: &'static str,
        #[source]
        source: rustls::Error,
    },
    /// A peer broke the protocol. Fatal to the connection: the stream
    /// cannot be resynchronized, so callers tear down instead of retrying.
    #[error("protocol violation in {context}: {reason}")]
    Protocol { context: &'static str, reason: String },
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

impl GraphError {
    pub fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    pub fn protocol(context: &'static str, reason: impl Into<String>) -> Self {
        Self::Protocol {
            context,
            reason: reason.into(),
        }
    }

    /// True for errors after which the connection must be torn down.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::LinkClosed(_))
    }
}
