// Debugger transports
//
// A transport opens the client endpoint at a URI. Opening can produce an
// endpoint, nothing (no client is listening) or a veto.

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use thiserror::Error;

/// Well-known URI of the debugger client endpoint
pub const DEBUG_SERVER_URI: &str = "tala://debugger";

pub const DEFAULT_TCP_ADDRESS: &str = "127.0.0.1:7878";

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection to {uri} was vetoed: {reason}")]
    Vetoed { uri: String, reason: String },

    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed debugger message: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("debugger connection closed")]
    Closed,
}

/// One end of a text message connection
pub trait MessageEndpoint: Send + Sync {
    fn send_text(&self, text: &str) -> Result<(), TransportError>;

    /// Block for the next message; `None` once the peer has gone
    fn recv_text(&self) -> Result<Option<String>, TransportError>;
}

pub trait MessageTransport {
    fn open(&self, uri: &str) -> Result<Option<Arc<dyn MessageEndpoint>>, TransportError>;
}

// ==================== In-process channels ====================

pub struct ChannelEndpoint {
    outgoing: Sender<String>,
    incoming: Receiver<String>,
}

impl ChannelEndpoint {
    /// Two connected endpoints
    pub fn pair() -> (ChannelEndpoint, ChannelEndpoint) {
        let (a_tx, a_rx) = unbounded();
        let (b_tx, b_rx) = unbounded();
        (
            ChannelEndpoint {
                outgoing: a_tx,
                incoming: b_rx,
            },
            ChannelEndpoint {
                outgoing: b_tx,
                incoming: a_rx,
            },
        )
    }
}

impl MessageEndpoint for ChannelEndpoint {
    fn send_text(&self, text: &str) -> Result<(), TransportError> {
        self.outgoing
            .send(text.to_string())
            .map_err(|_| TransportError::Closed)
    }

    fn recv_text(&self) -> Result<Option<String>, TransportError> {
        Ok(self.incoming.recv().ok())
    }
}

enum ChannelPolicy {
    Connected(Mutex<Option<Arc<dyn MessageEndpoint>>>),
    Vetoed(String),
    Detached,
}

/// In-process transport, mostly for embedding and tests
pub struct ChannelTransport {
    policy: ChannelPolicy,
}

impl ChannelTransport {
    /// A transport whose client end is returned alongside it
    pub fn connected() -> (Self, ChannelEndpoint) {
        let (server, client) = ChannelEndpoint::pair();
        let server: Arc<dyn MessageEndpoint> = Arc::new(server);
        (
            Self {
                policy: ChannelPolicy::Connected(Mutex::new(Some(server))),
            },
            client,
        )
    }

    /// Every open attempt is vetoed with `reason`
    pub fn vetoed(reason: impl Into<String>) -> Self {
        Self {
            policy: ChannelPolicy::Vetoed(reason.into()),
        }
    }

    /// No client is listening
    pub fn detached() -> Self {
        Self {
            policy: ChannelPolicy::Detached,
        }
    }
}

impl MessageTransport for ChannelTransport {
    fn open(&self, uri: &str) -> Result<Option<Arc<dyn MessageEndpoint>>, TransportError> {
        match &self.policy {
            // A connected transport hands out its endpoint once
            ChannelPolicy::Connected(endpoint) => Ok(endpoint.lock().take()),
            ChannelPolicy::Vetoed(reason) => Err(TransportError::Vetoed {
                uri: uri.to_string(),
                reason: reason.clone(),
            }),
            ChannelPolicy::Detached => Ok(None),
        }
    }
}

// ==================== TCP ====================

/// Line-delimited text over a TCP stream
pub struct TcpEndpoint {
    reader: Mutex<BufReader<TcpStream>>,
    writer: Mutex<TcpStream>,
}

impl TcpEndpoint {
    pub fn new(stream: TcpStream) -> std::io::Result<Self> {
        let reader = BufReader::new(stream.try_clone()?);
        Ok(Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(stream),
        })
    }

    /// Wait for one debugger process to connect to `listener`
    pub fn accept(listener: &TcpListener) -> std::io::Result<Self> {
        let (stream, peer) = listener.accept()?;
        tracing::info!(%peer, "debugger connected");
        Self::new(stream)
    }
}

impl MessageEndpoint for TcpEndpoint {
    fn send_text(&self, text: &str) -> Result<(), TransportError> {
        let mut writer = self.writer.lock();
        writer.write_all(text.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    fn recv_text(&self) -> Result<Option<String>, TransportError> {
        let mut line = String::new();
        let read = self.reader.lock().read_line(&mut line)?;
        if read == 0 {
            return Ok(None);
        }
        let trimmed = line.trim_end_matches(['\r', '\n']);
        Ok(Some(trimmed.to_string()))
    }
}

/// Connects to a debugger listening at `address`
pub struct TcpTransport {
    address: String,
}

impl TcpTransport {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new(DEFAULT_TCP_ADDRESS)
    }
}

impl MessageTransport for TcpTransport {
    /// An address that cannot be resolved or reached means no client
    fn open(&self, uri: &str) -> Result<Option<Arc<dyn MessageEndpoint>>, TransportError> {
        let addrs = match self.address.to_socket_addrs() {
            Ok(addrs) => addrs,
            Err(e) => {
                tracing::warn!(
                    %uri,
                    address = %self.address,
                    error = %e,
                    "cannot resolve debugger address"
                );
                return Ok(None);
            }
        };
        for addr in addrs {
            match TcpStream::connect(addr) {
                Ok(stream) => {
                    tracing::debug!(%uri, %addr, "connected to debugger");
                    let endpoint: Arc<dyn MessageEndpoint> = Arc::new(TcpEndpoint::new(stream)?);
                    return Ok(Some(endpoint));
                }
                Err(e) => {
                    tracing::warn!(%uri, %addr, error = %e, "cannot connect to debugger");
                }
            }
        }
        Ok(None)
    }
}
