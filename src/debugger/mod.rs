// Tala Debugger Module
// Interactive REPL sessions at halt points, served to a client over a
// message transport

mod client;
pub mod protocol;
mod remote;
mod server;
mod session;
pub mod transport;

#[cfg(test)]
mod tests;

pub use client::{DebugClient, Evaluation, SessionInfo};
pub use protocol::{ClientMessage, ObjectHandle, ServerMessage};
pub use remote::RemoteClient;
pub use server::{DebugServer, SessionManager};
pub use session::{ReplSession, SessionId, SessionState};
pub use transport::{
    ChannelEndpoint, ChannelTransport, MessageEndpoint, MessageTransport, TcpEndpoint,
    TcpTransport, TransportError, DEBUG_SERVER_URI, DEFAULT_TCP_ADDRESS,
};
