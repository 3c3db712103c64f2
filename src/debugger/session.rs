// REPL session at a halt point
//
// A session owns the (return value, state, caller scope) triple of one halt.
// `evaluate` replaces the whole triple on success and leaves it untouched on
// failure. `exit` consumes the session and yields the unwind that resumes
// the halted node.

use crate::error::{Span, TalaError, TalaResult};
use crate::instrument::{EventContext, HaltId, Unwind};
use crate::vm::scope::CallerInfo;
use crate::vm::value::{Stateful, Value};
use crate::vm::{Control, REPL_FILE};
use std::collections::BTreeMap;
use std::convert::Infallible;

pub type SessionId = HaltId;

/// The triple a session works on
#[derive(Clone, Debug)]
pub struct SessionState {
    pub last_return: Value,
    pub last_state: Value,
    pub last_scope: CallerInfo,
}

impl PartialEq for SessionState {
    /// Identity, not language equality: same values, same frame, same scope
    fn eq(&self, other: &Self) -> bool {
        self.last_return.identical(&other.last_return)
            && self.last_state.identical(&other.last_state)
            && self.last_scope.same_as(&other.last_scope)
    }
}

pub struct ReplSession<'a> {
    event: &'a EventContext<'a>,
    state: SessionState,
}

impl<'a> ReplSession<'a> {
    /// Capture the halt's scope and state, with `Nothing` as the return
    /// value. `None` when the halted node carries no scope.
    pub(crate) fn start(event: &'a EventContext<'a>) -> Option<Self> {
        let caller = event.caller_info()?;
        Some(Self {
            event,
            state: SessionState {
                last_return: Value::Nothing,
                last_state: event.state().clone(),
                last_scope: caller,
            },
        })
    }

    pub fn id(&self) -> SessionId {
        self.event.halt_id()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Source file the halt point is in
    pub fn file(&self) -> &str {
        self.event.file()
    }

    pub fn location(&self) -> Span {
        self.event.node().span
    }

    /// Every binding visible from the current scope
    pub fn list_bindings(&self) -> BTreeMap<String, Value> {
        self.state.last_scope.bindings().into_iter().collect()
    }

    /// Run `expression` in the current scope. On success its result, the
    /// state it produced and the scope it ran in become the session's
    /// triple, so its `let` bindings stay visible to later evaluations.
    pub fn evaluate(&mut self, expression: &str) -> TalaResult<Value> {
        let interpreter = self.event.interpreter();
        let state = self.state.last_state.clone();
        match interpreter.eval_in_scope(expression, &self.state.last_scope, state) {
            Ok((Stateful { state, value }, scope)) => {
                self.state = SessionState {
                    last_return: value.clone(),
                    last_state: state,
                    last_scope: scope,
                };
                Ok(value)
            }
            Err(Control::Error(error)) => {
                tracing::debug!(
                    session = %self.id(),
                    error = %error.summary(),
                    "evaluation failed"
                );
                Err(*error)
            }
            Err(Control::Unwind(unwind)) => {
                tracing::error!(
                    session = %self.id(),
                    halt = %unwind.halt_id(),
                    "unwind escaped a debugger evaluation"
                );
                Err(TalaError::internal_error(
                    format!("unwind for halt {} escaped evaluation", unwind.halt_id()),
                    Span::default(),
                    REPL_FILE,
                ))
            }
        }
    }

    /// Render `value` for display. Guest objects are rendered by their engine.
    pub fn show(&self, value: &Value) -> TalaResult<String> {
        match value {
            Value::Polyglot(object) => object
                .display()
                .map_err(|error| error.into_tala(Span::default(), REPL_FILE)),
            other => Ok(other.to_string()),
        }
    }

    /// Leave the session. The halted node resumes with the last returned
    /// value under the last state.
    pub fn exit(self) -> Result<Infallible, Unwind> {
        tracing::debug!(session = %self.id(), "exiting session");
        Err(self.event.create_unwind(Stateful::new(
            self.state.last_state,
            self.state.last_return,
        )))
    }
}
