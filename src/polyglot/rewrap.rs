// Marshaling across the context boundary

use crate::polyglot::context::InnerContext;
use crate::polyglot::dialect::CallConvention;
use crate::polyglot::engine::{
    EngineFailure, GuestEngine, GuestException, GuestObject, GuestValue, HostRef,
};
use crate::polyglot::{ForeignError, Language};
use crate::vm::value::Value;
use std::fmt;
use std::sync::Arc;

/// Host -> guest
pub(crate) fn to_guest(value: &Value, context: &InnerContext) -> GuestValue {
    match value {
        Value::Nothing => GuestValue::Null,
        Value::Boolean(b) => GuestValue::Boolean(*b),
        Value::Integer(n) => GuestValue::Integer(*n),
        Value::Number(n) => GuestValue::Number(*n),
        Value::Text(s) => GuestValue::Text(s.clone()),
        Value::Array(items) => {
            GuestValue::Array(items.iter().map(|item| to_guest(item, context)).collect())
        }
        // Guest objects going home are unwrapped
        Value::Polyglot(object) if object.context.id() == context.id() => {
            GuestValue::Object(object.object.clone())
        }
        other => GuestValue::Host(HostRef(other.clone())),
    }
}

/// Guest -> host
pub(crate) fn to_host(
    value: GuestValue,
    context: &Arc<InnerContext>,
    engine: &Arc<dyn GuestEngine>,
    language: Language,
) -> Value {
    match value {
        GuestValue::Null => Value::Nothing,
        GuestValue::Boolean(b) => Value::Boolean(b),
        GuestValue::Integer(n) => Value::Integer(n),
        GuestValue::Number(n) => Value::Number(n),
        GuestValue::Text(s) => Value::Text(s),
        GuestValue::Array(items) => Value::array(
            items
                .into_iter()
                .map(|item| to_host(item, context, engine, language))
                .collect(),
        ),
        GuestValue::Object(object) => Value::Polyglot(PolyglotObject {
            context: context.clone(),
            engine: engine.clone(),
            language,
            object,
        }),
        GuestValue::Host(host) => host.0,
    }
}

pub(crate) fn rewrap_exception(language: Language, exception: GuestException) -> ForeignError {
    ForeignError::Guest {
        language,
        message: exception.message,
    }
}

pub(crate) fn rewrap_failure(language: Language, failure: EngineFailure) -> ForeignError {
    match failure {
        EngineFailure::Exception(exception) => rewrap_exception(language, exception),
        EngineFailure::Fault(fault) => ForeignError::Internal(fault),
    }
}

/// A guest object seen from the host, bound to the context it lives in
#[derive(Clone)]
pub struct PolyglotObject {
    context: Arc<InnerContext>,
    engine: Arc<dyn GuestEngine>,
    language: Language,
    object: GuestObject,
}

impl PolyglotObject {
    pub(crate) fn new(
        context: Arc<InnerContext>,
        engine: Arc<dyn GuestEngine>,
        language: Language,
        object: GuestObject,
    ) -> Self {
        Self {
            context,
            engine,
            language,
            object,
        }
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn is_callable(&self) -> bool {
        self.engine.is_callable(&self.object)
    }

    pub fn ptr_eq(&self, other: &PolyglotObject) -> bool {
        self.object.ptr_eq(&other.object)
    }

    /// Call the object inside its context
    pub fn call(&self, receiver: Option<&Value>, args: &[Value]) -> Result<Value, ForeignError> {
        let cx = self.context.enter();
        let receiver = receiver.map(|r| to_guest(r, &self.context));
        let args = args.iter().map(|a| to_guest(a, &self.context)).collect();
        let result = self
            .engine
            .call(&cx, &self.object, receiver, args)
            .map_err(|failure| rewrap_failure(self.language, failure))?;
        Ok(to_host(result, &self.context, &self.engine, self.language))
    }

    /// Rendering produced by the owning engine
    pub fn display(&self) -> Result<String, ForeignError> {
        let cx = self.context.enter();
        self.engine
            .display(&cx, &self.object)
            .map_err(|failure| rewrap_failure(self.language, failure))
    }
}

impl fmt::Debug for PolyglotObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PolyglotObject({})", self.language)
    }
}

/// Compiled foreign callable: the guest function plus how to call it
pub struct ForeignFunction {
    target: PolyglotObject,
    convention: CallConvention,
    arity: usize,
}

impl ForeignFunction {
    pub(crate) fn new(target: PolyglotObject, convention: CallConvention, arity: usize) -> Self {
        Self {
            target,
            convention,
            arity,
        }
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn invoke(&self, args: &[Value]) -> Result<Value, ForeignError> {
        if args.len() != self.arity {
            return Err(ForeignError::Arity {
                expected: self.arity,
                got: args.len(),
            });
        }
        match (self.convention, args.split_first()) {
            (CallConvention::Receiver, Some((receiver, rest))) => {
                self.target.call(Some(receiver), rest)
            }
            _ => self.target.call(None, args),
        }
    }
}
