// Debugger wire protocol
// One JSON object per message, tagged by `type`. Every message names the
// session it belongs to.

use crate::debugger::session::SessionId;
use crate::debugger::transport::{MessageEndpoint, TransportError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Index into a session's table of evaluated values
pub type ObjectHandle = usize;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    SessionStarted {
        session: SessionId,
        file: String,
        line: usize,
    },
    Bindings {
        session: SessionId,
        bindings: BTreeMap<String, String>,
    },
    EvaluationSuccess {
        session: SessionId,
        result: String,
        handle: ObjectHandle,
    },
    EvaluationFailure {
        session: SessionId,
        error: String,
        trace: Vec<String>,
    },
    ObjectRepresentation {
        session: SessionId,
        representation: String,
    },
    ShowFailure {
        session: SessionId,
        error: String,
    },
}

impl ServerMessage {
    pub fn session(&self) -> SessionId {
        match self {
            ServerMessage::SessionStarted { session, .. }
            | ServerMessage::Bindings { session, .. }
            | ServerMessage::EvaluationSuccess { session, .. }
            | ServerMessage::EvaluationFailure { session, .. }
            | ServerMessage::ObjectRepresentation { session, .. }
            | ServerMessage::ShowFailure { session, .. } => *session,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    ListBindings { session: SessionId },
    Evaluate { session: SessionId, expression: String },
    ShowObject { session: SessionId, handle: ObjectHandle },
    Exit { session: SessionId },
}

impl ClientMessage {
    pub fn session(&self) -> SessionId {
        match self {
            ClientMessage::ListBindings { session }
            | ClientMessage::Evaluate { session, .. }
            | ClientMessage::ShowObject { session, .. }
            | ClientMessage::Exit { session } => *session,
        }
    }
}

pub fn send_message<M: Serialize>(
    endpoint: &dyn MessageEndpoint,
    message: &M,
) -> Result<(), TransportError> {
    let text = serde_json::to_string(message)?;
    endpoint.send_text(&text)
}

/// Next message, `None` once the connection has closed
pub fn recv_message<M: DeserializeOwned>(
    endpoint: &dyn MessageEndpoint,
) -> Result<Option<M>, TransportError> {
    match endpoint.recv_text()? {
        Some(text) => Ok(Some(serde_json::from_str(&text)?)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn client_messages_use_snake_case_tags() {
        let message: ClientMessage =
            serde_json::from_value(json!({"type": "evaluate", "session": 3, "expression": "1 + 1"}))
                .unwrap();
        match message {
            ClientMessage::Evaluate { session, expression } => {
                assert_eq!(session.as_u64(), 3);
                assert_eq!(expression, "1 + 1");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn server_messages_carry_the_session() {
        let message: ServerMessage = serde_json::from_value(json!({
            "type": "evaluation_failure",
            "session": 9,
            "error": "NameError: Undefined variable 'y' at <repl>:1:1",
            "trace": [],
        }))
        .unwrap();
        assert_eq!(message.session().as_u64(), 9);
        let encoded = serde_json::to_value(&message).unwrap();
        assert_eq!(encoded["type"], "evaluation_failure");
    }
}
