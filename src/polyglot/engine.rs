use crate::polyglot::context::ContextGuard;
use crate::vm::value::Value;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Value crossing the context boundary
#[derive(Clone)]
pub enum GuestValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Number(f64),
    Text(Arc<str>),
    Array(Vec<GuestValue>),
    /// Engine-owned object, opaque to everything but its engine
    Object(GuestObject),
    /// Host value with no guest counterpart
    Host(HostRef),
}

impl GuestValue {
    pub fn text(s: &str) -> Self {
        GuestValue::Text(Arc::from(s))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            GuestValue::Null => "null",
            GuestValue::Boolean(_) => "boolean",
            GuestValue::Integer(_) | GuestValue::Number(_) => "number",
            GuestValue::Text(_) => "string",
            GuestValue::Array(_) => "array",
            GuestValue::Object(_) => "object",
            GuestValue::Host(_) => "host",
        }
    }
}

impl fmt::Debug for GuestValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuestValue::Null => write!(f, "null"),
            GuestValue::Boolean(b) => write!(f, "{}", b),
            GuestValue::Integer(n) => write!(f, "{}", n),
            GuestValue::Number(n) => write!(f, "{}", n),
            GuestValue::Text(s) => write!(f, "{:?}", s),
            GuestValue::Array(items) => f.debug_list().entries(items).finish(),
            GuestValue::Object(_) => write!(f, "<object>"),
            GuestValue::Host(host) => write!(f, "<host {}>", host.0.type_name()),
        }
    }
}

#[derive(Clone)]
pub struct GuestObject(Arc<dyn Any + Send + Sync>);

impl GuestObject {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        GuestObject(Arc::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    pub fn ptr_eq(&self, other: &GuestObject) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Opaque handle on a host value passed into guest code
#[derive(Clone)]
pub struct HostRef(pub(crate) Value);

impl HostRef {
    pub fn type_name(&self) -> &'static str {
        self.0.type_name()
    }
}

/// Exception raised by guest code
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct GuestException {
    pub message: String,
}

impl GuestException {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum EngineFailure {
    /// Recognized language-level failure: syntax error, thrown value, ...
    #[error(transparent)]
    Exception(#[from] GuestException),
    /// Anything else. Never cached and never rewrapped.
    #[error("{0}")]
    Fault(String),
}

/// A guest language implementation plugged into the bridge.
///
/// Every method that touches guest state takes the active context guard, so
/// it can only be called between an enter and its matching leave.
pub trait GuestEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Evaluate a complete source unit and return its completion value
    fn eval(&self, cx: &ContextGuard<'_>, source: &str) -> Result<GuestValue, EngineFailure>;

    /// Look up a symbol exported from previously evaluated code
    fn import_symbol(
        &self,
        cx: &ContextGuard<'_>,
        name: &str,
    ) -> Result<GuestValue, EngineFailure> {
        cx.context().import(name).ok_or_else(|| {
            EngineFailure::Exception(GuestException::new(format!(
                "no exported symbol named '{}'",
                name
            )))
        })
    }

    fn call(
        &self,
        cx: &ContextGuard<'_>,
        callee: &GuestObject,
        receiver: Option<GuestValue>,
        args: Vec<GuestValue>,
    ) -> Result<GuestValue, EngineFailure>;

    fn is_callable(&self, object: &GuestObject) -> bool;

    /// Human-readable rendering of an object this engine created
    fn display(&self, cx: &ContextGuard<'_>, object: &GuestObject) -> Result<String, EngineFailure>;
}
