// Foreign call site
//
// Compiles its guest fragment on first use, under the site's own lock, and
// keeps either the compiled function or the guest exception that stopped the
// compile. Internal faults are returned without touching the cache.

use crate::polyglot::engine::{EngineFailure, GuestValue};
use crate::polyglot::rewrap::{rewrap_exception, ForeignFunction, PolyglotObject};
use crate::polyglot::source::ForeignSource;
use crate::polyglot::{ForeignError, PolyglotContext};
use crate::vm::value::Value;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

enum Compiled {
    Ready(ForeignFunction),
    /// Sticky: every later invocation reports this error
    Failed(ForeignError),
}

pub struct CallSite {
    source: ForeignSource,
    polyglot: Arc<PolyglotContext>,
    outcome: OnceLock<Compiled>,
    compile_lock: Mutex<()>,
    compilations: AtomicUsize,
}

impl CallSite {
    pub(crate) fn new(source: ForeignSource, polyglot: Arc<PolyglotContext>) -> Self {
        Self {
            source,
            polyglot,
            outcome: OnceLock::new(),
            compile_lock: Mutex::new(()),
            compilations: AtomicUsize::new(0),
        }
    }

    pub fn source(&self) -> &ForeignSource {
        &self.source
    }

    pub fn invoke(&self, args: &[Value]) -> Result<Value, ForeignError> {
        match self.compiled()? {
            Compiled::Ready(function) => function.invoke(args),
            Compiled::Failed(error) => Err(error.clone()),
        }
    }

    pub fn is_compiled(&self) -> bool {
        self.outcome.get().is_some()
    }

    /// Number of compile attempts that reached the engine
    pub fn compilations(&self) -> usize {
        self.compilations.load(Ordering::SeqCst)
    }

    pub fn sticky_error(&self) -> Option<&ForeignError> {
        match self.outcome.get() {
            Some(Compiled::Failed(error)) => Some(error),
            _ => None,
        }
    }

    fn compiled(&self) -> Result<&Compiled, ForeignError> {
        if let Some(outcome) = self.outcome.get() {
            return Ok(outcome);
        }

        let _lock = self.compile_lock.lock();
        if let Some(outcome) = self.outcome.get() {
            return Ok(outcome);
        }

        let outcome = self.compile()?;
        Ok(self.outcome.get_or_init(|| outcome))
    }

    fn compile(&self) -> Result<Compiled, ForeignError> {
        let language = self.source.language();
        let engine = self.polyglot.engine(language)?;
        let dialect = language.dialect();
        let context = self.polyglot.inner_context();

        self.compilations.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(
            language = %language,
            params = self.source.params().len(),
            "compiling foreign source"
        );

        let cx = context.enter();
        let shell = dialect.shell(&self.source);
        let result = dialect.compile(engine.as_ref(), &cx, &shell);

        let outcome = match result {
            Ok(GuestValue::Object(object)) if engine.is_callable(&object) => {
                let target = PolyglotObject::new(context.clone(), engine.clone(), language, object);
                Compiled::Ready(ForeignFunction::new(
                    target,
                    dialect.convention(),
                    self.source.params().len(),
                ))
            }
            Ok(other) => {
                return Err(ForeignError::Internal(format!(
                    "{} shell produced a non-callable {}",
                    language,
                    other.type_name()
                )))
            }
            Err(EngineFailure::Exception(exception)) => {
                tracing::warn!(
                    language = %language,
                    error = %exception,
                    "foreign source failed to compile"
                );
                Compiled::Failed(rewrap_exception(language, exception))
            }
            Err(EngineFailure::Fault(fault)) => return Err(ForeignError::Internal(fault)),
        };
        drop(cx);
        Ok(outcome)
    }
}

impl fmt::Debug for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallSite")
            .field("language", &self.source.language())
            .field("compiled", &self.is_compiled())
            .finish()
    }
}
