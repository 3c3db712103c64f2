// Remote session driver
//
// Serves sessions to a client over a message endpoint. Several threads may
// be halted at once and all share the one connection: whichever waiting
// session holds the reader lock reads the wire and routes messages for other
// sessions to their mailboxes, the rest wait on their own mailbox.

use crate::debugger::protocol::{recv_message, send_message, ClientMessage, ServerMessage};
use crate::debugger::server::SessionManager;
use crate::debugger::session::{ReplSession, SessionId};
use crate::debugger::transport::{MessageEndpoint, TransportError};
use crate::instrument::Unwind;
use crate::vm::value::Value;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const FOLLOWER_POLL: Duration = Duration::from_millis(20);

pub struct RemoteClient {
    endpoint: Arc<dyn MessageEndpoint>,
    reader: Mutex<()>,
    mailboxes: Mutex<FxHashMap<SessionId, Sender<ClientMessage>>>,
    closed: AtomicBool,
}

/// Removes a session's mailbox when the session ends
struct Mailbox<'a> {
    client: &'a RemoteClient,
    session: SessionId,
    receiver: Receiver<ClientMessage>,
}

impl Drop for Mailbox<'_> {
    fn drop(&mut self) {
        self.client.mailboxes.lock().remove(&self.session);
    }
}

impl RemoteClient {
    pub fn new(endpoint: Arc<dyn MessageEndpoint>) -> Self {
        Self {
            endpoint,
            reader: Mutex::new(()),
            mailboxes: Mutex::new(FxHashMap::default()),
            closed: AtomicBool::new(false),
        }
    }

    fn open_mailbox(&self, session: SessionId) -> Mailbox<'_> {
        let (sender, receiver) = unbounded();
        self.mailboxes.lock().insert(session, sender);
        Mailbox {
            client: self,
            session,
            receiver,
        }
    }

    fn send(&self, message: &ServerMessage) -> Result<(), TransportError> {
        send_message(self.endpoint.as_ref(), message)
    }

    /// Next request for `mailbox`'s session, `None` once the connection is gone
    fn next_request(&self, mailbox: &Mailbox<'_>) -> Option<ClientMessage> {
        loop {
            if let Ok(message) = mailbox.receiver.try_recv() {
                return Some(message);
            }
            if self.closed.load(Ordering::SeqCst) {
                return None;
            }

            let Some(_leader) = self.reader.try_lock() else {
                match mailbox.receiver.recv_timeout(FOLLOWER_POLL) {
                    Ok(message) => return Some(message),
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => return None,
                }
            };

            // Routed to us between the mailbox check and taking the lock
            if let Ok(message) = mailbox.receiver.try_recv() {
                return Some(message);
            }

            match recv_message::<ClientMessage>(self.endpoint.as_ref()) {
                Ok(Some(message)) if message.session() == mailbox.session => return Some(message),
                Ok(Some(message)) => self.route(message),
                Ok(None) => {
                    self.closed.store(true, Ordering::SeqCst);
                    return None;
                }
                Err(TransportError::Codec(e)) => {
                    tracing::warn!(error = %e, "dropping malformed debugger message");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "debugger connection failed");
                    self.closed.store(true, Ordering::SeqCst);
                    return None;
                }
            }
        }
    }

    fn route(&self, message: ClientMessage) {
        let session = message.session();
        let mailboxes = self.mailboxes.lock();
        match mailboxes.get(&session) {
            Some(sender) => {
                if sender.send(message).is_err() {
                    tracing::debug!(%session, "session ended before its message arrived");
                }
            }
            None => tracing::warn!(%session, "message for unknown debugger session"),
        }
    }

    fn serve(
        &self,
        session: &mut ReplSession<'_>,
        mailbox: &Mailbox<'_>,
    ) -> Result<(), TransportError> {
        let id = session.id();
        let location = session.location();
        self.send(&ServerMessage::SessionStarted {
            session: id,
            file: session.file().to_string(),
            line: location.start.line,
        })?;

        let mut objects: Vec<Value> = Vec::new();
        loop {
            let Some(request) = self.next_request(mailbox) else {
                return Err(TransportError::Closed);
            };

            let reply = match request {
                ClientMessage::ListBindings { .. } => {
                    let bindings = session
                        .list_bindings()
                        .into_iter()
                        .map(|(name, value)| {
                            let shown = session.show(&value).unwrap_or_else(|e| e.summary());
                            (name, shown)
                        })
                        .collect();
                    ServerMessage::Bindings {
                        session: id,
                        bindings,
                    }
                }
                ClientMessage::Evaluate { expression, .. } => match session.evaluate(&expression) {
                    Ok(value) => {
                        let result = session.show(&value).unwrap_or_else(|e| e.summary());
                        objects.push(value);
                        ServerMessage::EvaluationSuccess {
                            session: id,
                            result,
                            handle: objects.len() - 1,
                        }
                    }
                    Err(error) => ServerMessage::EvaluationFailure {
                        session: id,
                        error: error.summary(),
                        trace: error.trace_lines(),
                    },
                },
                ClientMessage::ShowObject { handle, .. } => match objects.get(handle) {
                    Some(value) => match session.show(value) {
                        Ok(representation) => ServerMessage::ObjectRepresentation {
                            session: id,
                            representation,
                        },
                        Err(error) => ServerMessage::ShowFailure {
                            session: id,
                            error: error.summary(),
                        },
                    },
                    None => ServerMessage::ShowFailure {
                        session: id,
                        error: format!("unknown object handle {}", handle),
                    },
                },
                ClientMessage::Exit { .. } => return Ok(()),
            };
            self.send(&reply)?;
        }
    }
}

impl SessionManager for RemoteClient {
    fn start_session(&self, mut session: ReplSession<'_>) -> Result<Infallible, Unwind> {
        let mailbox = self.open_mailbox(session.id());
        if let Err(e) = self.serve(&mut session, &mailbox) {
            tracing::warn!(session = %session.id(), error = %e, "debugger client lost, resuming");
        }
        drop(mailbox);
        session.exit()
    }
}
