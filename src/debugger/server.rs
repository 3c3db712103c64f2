// Debug session server
//
// Holds at most one client. Each time execution reaches a halt point the
// server either hands a fresh session to the client or, with no client,
// exits the session at once so the program carries on.

use crate::debugger::remote::RemoteClient;
use crate::debugger::session::ReplSession;
use crate::debugger::transport::{MessageTransport, TransportError, DEBUG_SERVER_URI};
use crate::instrument::{
    EventContext, ExecutionEventNode, Instrumenter, SourceFilter, Tags, Unwind,
};
use crate::ast::Node;
use parking_lot::RwLock;
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Drives a session until it exits
pub trait SessionManager: Send + Sync {
    fn start_session(&self, session: ReplSession<'_>) -> Result<Infallible, Unwind>;
}

impl<F> SessionManager for F
where
    F: for<'a> Fn(ReplSession<'a>) -> Result<Infallible, Unwind> + Send + Sync,
{
    fn start_session(&self, session: ReplSession<'_>) -> Result<Infallible, Unwind> {
        self(session)
    }
}

pub struct DebugServer {
    client: RwLock<Option<Arc<dyn SessionManager>>>,
    warned: AtomicBool,
}

impl DebugServer {
    /// A server with no client: every halt resumes immediately
    pub fn detached() -> Arc<Self> {
        Arc::new(Self {
            client: RwLock::new(None),
            warned: AtomicBool::new(false),
        })
    }

    pub fn with_manager(manager: impl SessionManager + 'static) -> Arc<Self> {
        let server = Self::detached();
        server.set_client(Arc::new(manager));
        server
    }

    /// Open the client endpoint at the well-known URI. A missing or vetoed
    /// client is not an error: the server starts detached and says so.
    pub fn start(transport: &dyn MessageTransport) -> Result<Arc<Self>, TransportError> {
        let server = Self::detached();
        match transport.open(DEBUG_SERVER_URI) {
            Ok(Some(endpoint)) => {
                tracing::info!(uri = DEBUG_SERVER_URI, "debugger client connected");
                server.set_client(Arc::new(RemoteClient::new(endpoint)));
            }
            Ok(None) => {
                tracing::warn!(uri = DEBUG_SERVER_URI, "no client connected, halts will resume");
            }
            Err(TransportError::Vetoed { uri, reason }) => {
                tracing::warn!(%uri, %reason, "client connection has been vetoed");
            }
            Err(e) => return Err(e),
        }
        Ok(server)
    }

    pub fn set_client(&self, manager: Arc<dyn SessionManager>) {
        *self.client.write() = Some(manager);
        self.warned.store(false, Ordering::Relaxed);
    }

    pub fn has_client(&self) -> bool {
        self.client.read().is_some()
    }

    /// Detach the client. Halts after this resume immediately.
    pub fn shutdown(&self) {
        if self.client.write().take().is_some() {
            tracing::info!("debug server shut down");
        }
    }

    pub(crate) fn install(self: &Arc<Self>, instrumenter: &mut Instrumenter) {
        let server = self.clone();
        let factory = move |node: &Node| -> Option<Arc<dyn ExecutionEventNode>> {
            node.is_breakpoint().then(|| {
                Arc::new(ReplProbe {
                    server: server.clone(),
                }) as Arc<dyn ExecutionEventNode>
            })
        };
        instrumenter.attach_execution_event_factory(
            SourceFilter::tag_is(Tags::ALWAYS_HALT),
            Arc::new(factory),
        );
    }

    fn start_session(&self, session: ReplSession<'_>) -> Result<Infallible, Unwind> {
        // Clone out so the lock is not held while the session runs
        let client = self.client.read().clone();
        match client {
            Some(manager) => {
                tracing::debug!(session = %session.id(), file = session.file(), "session started");
                manager.start_session(session)
            }
            None => {
                if !self.warned.swap(true, Ordering::Relaxed) {
                    tracing::warn!("halt point reached with no debugger client, resuming");
                } else {
                    tracing::debug!(session = %session.id(), "no debugger client, resuming");
                }
                session.exit()
            }
        }
    }
}

/// Probe attached to every halt point while the debugger is enabled
struct ReplProbe {
    server: Arc<DebugServer>,
}

impl ExecutionEventNode for ReplProbe {
    fn on_enter(&self, event: &EventContext<'_>) -> Result<(), Unwind> {
        let Some(session) = ReplSession::start(event) else {
            return Ok(());
        };
        match self.server.start_session(session) {
            Ok(never) => match never {},
            Err(unwind) => Err(unwind),
        }
    }
}
