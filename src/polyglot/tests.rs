use super::*;
use crate::builtins::Builtin;
use crate::polyglot::context::{active_context, ContextId};
use crate::polyglot::dialect::EXPORTED_SYMBOL;
use crate::vm::value::Value;
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    Ok,
    Throw,
    /// Fault on the next compile, then behave
    FaultOnce,
    Panic,
    /// Compile succeeds after a pause
    Slow,
}

/// Callable produced by a successful compile
struct EchoFn;

/// Non-callable object returned by a zero-argument call
struct Marker;

/// Records what the bridge asks of it. Calls echo `[receiver, args...]`.
struct FakeEngine {
    mode: Mutex<Mode>,
    /// Publish the function as a module export instead of returning it
    exports: bool,
    evals: AtomicUsize,
    shells: Mutex<Vec<String>>,
    call_contexts: Mutex<Vec<ContextId>>,
}

impl FakeEngine {
    fn new(mode: Mode) -> Arc<Self> {
        Arc::new(Self {
            mode: Mutex::new(mode),
            exports: false,
            evals: AtomicUsize::new(0),
            shells: Mutex::new(Vec::new()),
            call_contexts: Mutex::new(Vec::new()),
        })
    }

    fn exporting() -> Arc<Self> {
        Arc::new(Self {
            mode: Mutex::new(Mode::Ok),
            exports: true,
            evals: AtomicUsize::new(0),
            shells: Mutex::new(Vec::new()),
            call_contexts: Mutex::new(Vec::new()),
        })
    }

    fn set_mode(&self, mode: Mode) {
        *self.mode.lock() = mode;
    }
}

impl GuestEngine for FakeEngine {
    fn name(&self) -> &str {
        "fake"
    }

    fn eval(&self, cx: &ContextGuard<'_>, source: &str) -> Result<GuestValue, EngineFailure> {
        self.evals.fetch_add(1, Ordering::SeqCst);
        self.shells.lock().push(source.to_string());
        let mode = *self.mode.lock();
        match mode {
            Mode::Throw => Err(GuestException::new("SyntaxError: unexpected token").into()),
            Mode::FaultOnce => {
                self.set_mode(Mode::Ok);
                Err(EngineFailure::Fault("engine crashed".to_string()))
            }
            Mode::Panic => panic!("engine blew up"),
            Mode::Ok | Mode::Slow => {
                if mode == Mode::Slow {
                    std::thread::sleep(Duration::from_millis(30));
                }
                let function = GuestValue::Object(GuestObject::new(EchoFn));
                if self.exports {
                    cx.context().export(EXPORTED_SYMBOL, function);
                    Ok(GuestValue::Null)
                } else {
                    Ok(function)
                }
            }
        }
    }

    fn call(
        &self,
        _cx: &ContextGuard<'_>,
        _callee: &GuestObject,
        receiver: Option<GuestValue>,
        args: Vec<GuestValue>,
    ) -> Result<GuestValue, EngineFailure> {
        self.call_contexts.lock().push(active_context());
        if args.is_empty() && receiver.is_none() {
            return Ok(GuestValue::Object(GuestObject::new(Marker)));
        }
        let mut echoed = vec![receiver.unwrap_or(GuestValue::Null)];
        echoed.extend(args);
        Ok(GuestValue::Array(echoed))
    }

    fn is_callable(&self, object: &GuestObject) -> bool {
        object.downcast_ref::<EchoFn>().is_some()
    }

    fn display(
        &self,
        _cx: &ContextGuard<'_>,
        object: &GuestObject,
    ) -> Result<String, EngineFailure> {
        if object.downcast_ref::<Marker>().is_some() {
            Ok("<marker>".to_string())
        } else {
            Ok("<echo>".to_string())
        }
    }
}

fn context_with(language: Language, engine: Arc<FakeEngine>) -> Arc<PolyglotContext> {
    let mut polyglot = PolyglotContext::new();
    polyglot.register(language, engine);
    Arc::new(polyglot)
}

fn params(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

fn items(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => (*items).clone(),
        other => panic!("expected an array, got {:?}", other),
    }
}

#[test]
fn concurrent_first_invocations_compile_once() {
    let engine = FakeEngine::new(Mode::Slow);
    let polyglot = context_with(Language::R, engine.clone());
    let site = polyglot
        .build_call_site("r", "x", params(&["x"]))
        .unwrap();
    assert!(!site.is_compiled());

    let barrier = Barrier::new(8);
    std::thread::scope(|scope| {
        for n in 0..8 {
            let site = &site;
            let barrier = &barrier;
            scope.spawn(move || {
                barrier.wait();
                let result = site.invoke(&[Value::Integer(n)]).unwrap();
                assert_eq!(items(result), vec![Value::Nothing, Value::Integer(n)]);
            });
        }
    });

    assert_eq!(site.compilations(), 1);
    assert_eq!(engine.evals.load(Ordering::SeqCst), 1);
    assert!(site.is_compiled());
}

#[test]
fn guest_exceptions_are_sticky() {
    let engine = FakeEngine::new(Mode::Throw);
    let polyglot = context_with(Language::R, engine.clone());
    let site = polyglot.build_call_site("r", "x +", params(&["x"])).unwrap();

    let first = site.invoke(&[Value::Integer(1)]).unwrap_err();
    assert!(matches!(
        first,
        ForeignError::Guest { language: Language::R, ref message }
            if message.contains("SyntaxError")
    ));
    assert_eq!(first.kind(), crate::error::ErrorKind::ForeignError);

    // Fixing the engine does not matter: the failure is cached
    engine.set_mode(Mode::Ok);
    let second = site.invoke(&[Value::Integer(1)]).unwrap_err();
    assert_eq!(first, second);
    assert_eq!(site.compilations(), 1);
    assert_eq!(site.sticky_error(), Some(&first));

    let inner = polyglot.inner_context();
    assert_eq!(inner.enter_count(), 1);
    assert_eq!(inner.leave_count(), 1);
    assert_eq!(active_context(), ContextId::HOST);
}

#[test]
fn internal_faults_are_not_cached() {
    let engine = FakeEngine::new(Mode::FaultOnce);
    let polyglot = context_with(Language::R, engine.clone());
    let site = polyglot.build_call_site("r", "x", params(&["x"])).unwrap();

    let err = site.invoke(&[Value::Integer(1)]).unwrap_err();
    assert!(matches!(err, ForeignError::Internal(_)));
    assert!(!site.is_compiled());
    assert!(site.sticky_error().is_none());

    let result = site.invoke(&[Value::Integer(2)]).unwrap();
    assert_eq!(items(result), vec![Value::Nothing, Value::Integer(2)]);
    assert_eq!(site.compilations(), 2);

    let inner = polyglot.inner_context();
    assert_eq!(inner.enter_count(), inner.leave_count());
    assert_eq!(active_context(), ContextId::HOST);
}

#[test]
fn panicking_compile_leaves_the_context() {
    let engine = FakeEngine::new(Mode::Panic);
    let polyglot = context_with(Language::R, engine.clone());
    let site = polyglot.build_call_site("r", "x", params(&["x"])).unwrap();
    let inner = polyglot.inner_context().clone();

    let outcome = catch_unwind(AssertUnwindSafe(|| site.invoke(&[Value::Integer(1)])));
    assert!(outcome.is_err());
    assert_eq!(inner.enter_count(), 1);
    assert_eq!(inner.leave_count(), 1);
    assert_eq!(active_context(), ContextId::HOST);
    assert!(!site.is_compiled());

    // The compile lock is usable again
    engine.set_mode(Mode::Ok);
    assert!(site.invoke(&[Value::Integer(1)]).is_ok());
}

#[test]
fn guest_code_runs_inside_the_inner_context() {
    let engine = FakeEngine::new(Mode::Ok);
    let polyglot = context_with(Language::R, engine.clone());
    let site = polyglot.build_call_site("r", "x", params(&["x"])).unwrap();

    site.invoke(&[Value::Integer(1)]).unwrap();
    site.invoke(&[Value::Integer(2)]).unwrap();

    let id = polyglot.inner_context().id();
    assert_eq!(*engine.call_contexts.lock(), vec![id, id]);
    assert_eq!(active_context(), ContextId::HOST);
    let inner = polyglot.inner_context();
    assert_eq!(inner.enter_count(), inner.leave_count());
}

#[test]
fn script_shell_passes_first_argument_as_receiver() {
    let engine = FakeEngine::new(Mode::Ok);
    let polyglot = context_with(Language::Js, engine.clone());
    let site = polyglot
        .build_call_site("js", "return a + b;", params(&["self", "a", "b"]))
        .unwrap();

    let result = site
        .invoke(&[Value::Integer(1), Value::Integer(2), Value::Integer(3)])
        .unwrap();
    assert_eq!(
        items(result),
        vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]
    );
    assert_eq!(
        engine.shells.lock()[0],
        "var poly_tala_eval=function(a,b){\nreturn a + b;\n};poly_tala_eval"
    );
}

#[test]
fn exported_module_is_fetched_by_symbol() {
    let engine = FakeEngine::exporting();
    let polyglot = context_with(Language::Python, engine.clone());
    let site = polyglot
        .build_call_site("python", "total = a + b\nreturn total", params(&["a", "b"]))
        .unwrap();

    let result = site.invoke(&[Value::Integer(4), Value::Integer(5)]).unwrap();
    assert_eq!(
        items(result),
        vec![Value::Nothing, Value::Integer(4), Value::Integer(5)]
    );
    assert_eq!(
        engine.shells.lock()[0],
        "import polyglot\n@polyglot.export_value\n\
         def polyglot_tala_python_eval(a,b):\n    total = a + b\n    return total\n"
    );
}

/// Exports a function that answers with the module source it came from
struct ModuleEngine;

struct ModuleFn(String);

impl GuestEngine for ModuleEngine {
    fn name(&self) -> &str {
        "module"
    }

    fn eval(&self, cx: &ContextGuard<'_>, source: &str) -> Result<GuestValue, EngineFailure> {
        let function = GuestObject::new(ModuleFn(source.to_string()));
        cx.context().export(EXPORTED_SYMBOL, GuestValue::Object(function));
        // Room for another module to overwrite the export
        std::thread::sleep(Duration::from_millis(20));
        Ok(GuestValue::Null)
    }

    fn call(
        &self,
        _cx: &ContextGuard<'_>,
        callee: &GuestObject,
        _receiver: Option<GuestValue>,
        _args: Vec<GuestValue>,
    ) -> Result<GuestValue, EngineFailure> {
        match callee.downcast_ref::<ModuleFn>() {
            Some(ModuleFn(source)) => Ok(GuestValue::text(source)),
            None => Err(EngineFailure::Fault("not a module function".to_string())),
        }
    }

    fn is_callable(&self, object: &GuestObject) -> bool {
        object.downcast_ref::<ModuleFn>().is_some()
    }

    fn display(
        &self,
        _cx: &ContextGuard<'_>,
        _object: &GuestObject,
    ) -> Result<String, EngineFailure> {
        Ok("<module fn>".to_string())
    }
}

#[test]
fn concurrent_module_compiles_keep_their_own_export() {
    let mut polyglot = PolyglotContext::new();
    polyglot.register(Language::Python, Arc::new(ModuleEngine));
    let polyglot = Arc::new(polyglot);
    let first = polyglot.build_call_site("python", "return 'A'", params(&[])).unwrap();
    let second = polyglot.build_call_site("python", "return 'B'", params(&[])).unwrap();

    let barrier = Barrier::new(2);
    let (a, b) = std::thread::scope(|scope| {
        let a = scope.spawn(|| {
            barrier.wait();
            first.invoke(&[]).unwrap()
        });
        let b = scope.spawn(|| {
            barrier.wait();
            second.invoke(&[]).unwrap()
        });
        (a.join().unwrap(), b.join().unwrap())
    });

    let source = |value: Value| match value {
        Value::Text(text) => text.to_string(),
        other => panic!("expected text, got {:?}", other),
    };
    assert!(source(a).contains("return 'A'"));
    assert!(source(b).contains("return 'B'"));
    // The shared name is free again once each import is done
    assert!(polyglot.inner_context().import(EXPORTED_SYMBOL).is_none());
}

#[test]
fn missing_export_is_a_sticky_guest_error() {
    // A plain engine never exports the symbol the module dialect looks for
    let engine = FakeEngine::new(Mode::Ok);
    let polyglot = context_with(Language::Python, engine);
    let site = polyglot.build_call_site("python", "return 1", params(&[])).unwrap();

    let err = site.invoke(&[]).unwrap_err();
    assert!(matches!(err, ForeignError::Guest { language: Language::Python, .. }));
    assert!(site.sticky_error().is_some());
}

#[test]
fn function_literal_dialect_is_positional() {
    let engine = FakeEngine::new(Mode::Ok);
    let polyglot = context_with(Language::R, engine.clone());
    let site = polyglot.build_call_site("r", "a * b", params(&["a", "b"])).unwrap();

    let result = site.invoke(&[Value::Integer(6), Value::Integer(7)]).unwrap();
    assert_eq!(
        items(result),
        vec![Value::Nothing, Value::Integer(6), Value::Integer(7)]
    );
    assert_eq!(engine.shells.lock()[0], "function(a,b){\na * b\n}");
}

#[test]
fn arity_errors_are_not_sticky() {
    let engine = FakeEngine::new(Mode::Ok);
    let polyglot = context_with(Language::R, engine);
    let site = polyglot.build_call_site("r", "a", params(&["a", "b"])).unwrap();

    let err = site.invoke(&[Value::Integer(1)]).unwrap_err();
    assert_eq!(err, ForeignError::Arity { expected: 2, got: 1 });
    assert!(site.is_compiled());
    assert!(site.sticky_error().is_none());
    assert!(site.invoke(&[Value::Integer(1), Value::Integer(2)]).is_ok());
}

#[test]
fn call_site_construction_rejects_bad_configuration() {
    let polyglot = context_with(Language::R, FakeEngine::new(Mode::Ok));

    let err = polyglot.build_call_site("cobol", "x", params(&[])).unwrap_err();
    assert!(matches!(err, ForeignError::UnsupportedLanguage(_)));
    assert!(err.is_configuration());

    let err = polyglot.build_call_site("python", "x", params(&[])).unwrap_err();
    assert_eq!(err, ForeignError::MissingEngine(Language::Python));
    assert!(err.is_configuration());

    let err = polyglot.build_call_site("r", "x", params(&["1x"])).unwrap_err();
    assert!(matches!(err, ForeignError::InvalidParameter(_)));
}

#[test]
fn guest_objects_round_trip_by_identity() {
    let engine = FakeEngine::new(Mode::Ok);
    let polyglot = context_with(Language::R, engine);
    let make = polyglot.build_call_site("r", "marker()", params(&[])).unwrap();
    let echo = polyglot.build_call_site("r", "x", params(&["x"])).unwrap();

    let marker = match make.invoke(&[]).unwrap() {
        Value::Polyglot(object) => object,
        other => panic!("expected a guest object, got {:?}", other),
    };
    assert!(!marker.is_callable());
    assert_eq!(marker.display().unwrap(), "<marker>");

    let echoed = items(echo.invoke(&[Value::Polyglot(marker.clone())]).unwrap());
    match &echoed[1] {
        Value::Polyglot(object) => assert!(object.ptr_eq(&marker)),
        other => panic!("expected a guest object, got {:?}", other),
    }
}

#[test]
fn host_values_pass_through_guest_code_unchanged() {
    let engine = FakeEngine::new(Mode::Ok);
    let polyglot = context_with(Language::R, engine);
    let echo = polyglot.build_call_site("r", "x", params(&["x"])).unwrap();

    let echoed = items(echo.invoke(&[Value::Builtin(Builtin::Print)]).unwrap());
    assert!(matches!(echoed[1], Value::Builtin(Builtin::Print)));

    let nested = Value::array(vec![Value::text("a"), Value::Number(1.5)]);
    let echoed = items(echo.invoke(&[nested.clone()]).unwrap());
    assert_eq!(echoed[1], nested);
}

#[test]
fn language_tags_follow_registered_engines() {
    let polyglot = PolyglotContext::with_builtin_engines();
    assert_eq!(polyglot.language_tags(), vec!["js"]);
    assert!(polyglot.engine(Language::R).is_err());
}
