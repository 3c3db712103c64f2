// Debugger client
// The other end of the wire: waits for sessions and issues requests.
// Callers on several threads share the connection the same way halted
// sessions do on the server side: one leader reads and parks messages for
// the others in the backlog, the rest poll the backlog.

use crate::debugger::protocol::{
    recv_message, send_message, ClientMessage, ObjectHandle, ServerMessage,
};
use crate::debugger::session::SessionId;
use crate::debugger::transport::{MessageEndpoint, TransportError};
use parking_lot::{Condvar, Mutex};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const FOLLOWER_POLL: Duration = Duration::from_millis(20);

/// Outcome of a remote evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    Success { result: String, handle: ObjectHandle },
    Failure { error: String, trace: Vec<String> },
}

/// A started session as announced by the server
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    pub id: SessionId,
    pub file: String,
    pub line: usize,
}

pub struct DebugClient<E: MessageEndpoint> {
    endpoint: E,
    reader: Mutex<()>,
    /// Messages read while waiting for something else
    backlog: Mutex<VecDeque<ServerMessage>>,
    arrived: Condvar,
    closed: AtomicBool,
}

impl<E: MessageEndpoint> DebugClient<E> {
    pub fn new(endpoint: E) -> Self {
        Self {
            endpoint,
            reader: Mutex::new(()),
            backlog: Mutex::new(VecDeque::new()),
            arrived: Condvar::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Block until the next halt opens a session
    pub fn wait_session(&self) -> Result<SessionInfo, TransportError> {
        let message = self.next_matching(|m| matches!(m, ServerMessage::SessionStarted { .. }))?;
        match message {
            ServerMessage::SessionStarted {
                session,
                file,
                line,
            } => Ok(SessionInfo {
                id: session,
                file,
                line,
            }),
            _ => Err(TransportError::Closed),
        }
    }

    pub fn list_bindings(
        &self,
        session: SessionId,
    ) -> Result<BTreeMap<String, String>, TransportError> {
        self.send(&ClientMessage::ListBindings { session })?;
        match self.reply(session)? {
            ServerMessage::Bindings { bindings, .. } => Ok(bindings),
            _ => Err(TransportError::Closed),
        }
    }

    pub fn evaluate(
        &self,
        session: SessionId,
        expression: &str,
    ) -> Result<Evaluation, TransportError> {
        self.send(&ClientMessage::Evaluate {
            session,
            expression: expression.to_string(),
        })?;
        match self.reply(session)? {
            ServerMessage::EvaluationSuccess { result, handle, .. } => {
                Ok(Evaluation::Success { result, handle })
            }
            ServerMessage::EvaluationFailure { error, trace, .. } => {
                Ok(Evaluation::Failure { error, trace })
            }
            _ => Err(TransportError::Closed),
        }
    }

    /// Representation of an earlier evaluation result, or the show error
    pub fn show_object(
        &self,
        session: SessionId,
        handle: ObjectHandle,
    ) -> Result<Result<String, String>, TransportError> {
        self.send(&ClientMessage::ShowObject { session, handle })?;
        match self.reply(session)? {
            ServerMessage::ObjectRepresentation { representation, .. } => Ok(Ok(representation)),
            ServerMessage::ShowFailure { error, .. } => Ok(Err(error)),
            _ => Err(TransportError::Closed),
        }
    }

    /// Resume the halted program. There is no reply.
    pub fn exit(&self, session: SessionId) -> Result<(), TransportError> {
        self.send(&ClientMessage::Exit { session })
    }

    fn send(&self, message: &ClientMessage) -> Result<(), TransportError> {
        send_message(&self.endpoint, message)
    }

    fn reply(&self, session: SessionId) -> Result<ServerMessage, TransportError> {
        self.next_matching(|m| {
            m.session() == session && !matches!(m, ServerMessage::SessionStarted { .. })
        })
    }

    fn take_from_backlog<F>(
        backlog: &mut VecDeque<ServerMessage>,
        accept: &F,
    ) -> Option<ServerMessage>
    where
        F: Fn(&ServerMessage) -> bool,
    {
        let index = backlog.iter().position(accept)?;
        backlog.remove(index)
    }

    fn next_matching<F>(&self, accept: F) -> Result<ServerMessage, TransportError>
    where
        F: Fn(&ServerMessage) -> bool,
    {
        loop {
            {
                let mut backlog = self.backlog.lock();
                if let Some(message) = Self::take_from_backlog(&mut backlog, &accept) {
                    return Ok(message);
                }
                if self.closed.load(Ordering::SeqCst) {
                    return Err(TransportError::Closed);
                }
            }

            let Some(_leader) = self.reader.try_lock() else {
                let mut backlog = self.backlog.lock();
                if let Some(message) = Self::take_from_backlog(&mut backlog, &accept) {
                    return Ok(message);
                }
                self.arrived.wait_for(&mut backlog, FOLLOWER_POLL);
                continue;
            };

            // Parked by the previous leader after our backlog check
            if let Some(message) = Self::take_from_backlog(&mut self.backlog.lock(), &accept) {
                return Ok(message);
            }

            let message = match recv_message::<ServerMessage>(&self.endpoint) {
                Ok(Some(message)) => message,
                Ok(None) => {
                    self.close();
                    return Err(TransportError::Closed);
                }
                Err(e @ TransportError::Codec(_)) => return Err(e),
                Err(e) => {
                    self.close();
                    return Err(e);
                }
            };
            if accept(&message) {
                return Ok(message);
            }
            self.backlog.lock().push_back(message);
            self.arrived.notify_all();
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.arrived.notify_all();
    }
}
