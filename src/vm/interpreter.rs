// Tala Interpreter
// Tree-walking evaluator over the AST arena. Threads the interpreter-state
// token through every evaluation and runs probes around instrumented nodes.

use crate::ast::{Ast, LogicalOp, Node, NodeId, NodeKind};
use crate::config::Options;
use crate::debugger::DebugServer;
use crate::error::{ErrorKind, Span, StackFrame, TalaError, TalaResult};
use crate::instrument::{
    EventContext, ExecutionEventFactory, ExecutionEventNode, Instrumenter, SourceFilter, Unwind,
};
use crate::parser;
use crate::polyglot::{GuestEngine, Language, PolyglotContext};
use crate::vm::arith::{self, ArithError};
use crate::vm::scope::{CallerInfo, Frame, LocalScope};
use crate::vm::value::{Closure, Stateful, Value};
use smallvec::SmallVec;
use std::cell::Cell;
use std::sync::Arc;

/// File name reported for debugger-evaluated code
pub const REPL_FILE: &str = "<repl>";

type Args = SmallVec<[Value; 4]>;

thread_local! {
    static CALL_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// One level of host call nesting on this thread. Debugger evaluations run
/// on the halted thread and keep counting from the depth of the halt.
struct CallDepth;

impl CallDepth {
    fn enter(limit: usize) -> Option<Self> {
        CALL_DEPTH.with(|depth| {
            if depth.get() >= limit {
                return None;
            }
            depth.set(depth.get() + 1);
            Some(CallDepth)
        })
    }
}

impl Drop for CallDepth {
    fn drop(&mut self) {
        CALL_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Why evaluation stopped early
#[derive(Debug)]
pub(crate) enum Control {
    Error(Box<TalaError>),
    /// Non-local exit travelling to the probe that created it
    Unwind(Unwind),
}

impl From<TalaError> for Control {
    fn from(error: TalaError) -> Self {
        Control::Error(Box::new(error))
    }
}

impl Control {
    /// Collapse at a boundary no unwind may cross
    pub(crate) fn into_error(self) -> TalaError {
        match self {
            Control::Error(error) => *error,
            Control::Unwind(unwind) => {
                tracing::error!(halt = %unwind.halt_id(), "unwind escaped its handler");
                TalaError::internal_error(
                    format!("unwind for halt {} escaped its handler", unwind.halt_id()),
                    Span::default(),
                    "<internal>",
                )
            }
        }
    }
}

/// A parsed and instrumented top-level program
pub struct Program {
    ast: Arc<Ast>,
}

impl Program {
    pub fn ast(&self) -> &Arc<Ast> {
        &self.ast
    }
}

/// Where a call happened, for error reporting
struct Site<'a> {
    span: Span,
    ast: Option<&'a Ast>,
}

impl Site<'_> {
    fn file(&self) -> &str {
        self.ast.map(Ast::file).unwrap_or("<host>")
    }

    fn error(&self, kind: ErrorKind, message: impl Into<String>) -> TalaError {
        let error = TalaError::new(kind, message, self.span, self.file());
        match self.ast {
            Some(ast) => error.with_source(ast.source()),
            None => error,
        }
    }
}

pub struct Interpreter {
    options: Options,
    polyglot: Arc<PolyglotContext>,
    instrumenter: Instrumenter,
    debug_server: Option<Arc<DebugServer>>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> InterpreterBuilder {
        InterpreterBuilder::new()
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn polyglot(&self) -> &Arc<PolyglotContext> {
        &self.polyglot
    }

    /// The debug server the halt probes report to, when the debugger is enabled
    pub fn debug_server(&self) -> Option<&Arc<DebugServer>> {
        self.debug_server.as_ref()
    }

    pub fn compile(&self, source: &str, file: &str) -> TalaResult<Program> {
        let ast = self.parse(source, file, LocalScope::root())?;
        Ok(Program { ast })
    }

    pub fn run(&self, program: &Program, state: Value) -> TalaResult<Stateful> {
        let frame = Frame::root();
        let mut state = state;
        let value = self
            .eval_root(&program.ast, &frame, &mut state)
            .map_err(Control::into_error)?;
        Ok(Stateful::new(state, value))
    }

    pub fn run_source(&self, source: &str, file: &str, state: Value) -> TalaResult<Stateful> {
        let program = self.compile(source, file)?;
        self.run(&program, state)
    }

    /// Call a host function value from embedding code
    pub fn call(&self, function: &Value, args: &[Value], state: Value) -> TalaResult<Stateful> {
        let mut state = state;
        let site = Site {
            span: Span::default(),
            ast: None,
        };
        let value = self
            .call_value(function, args.iter().cloned().collect(), &mut state, &site)
            .map_err(Control::into_error)?;
        Ok(Stateful::new(state, value))
    }

    /// Wrap a `<tag>#<source>` fragment from an external front end as a
    /// callable value. The fragment is compiled on its first call.
    pub fn foreign_function(&self, code: &str, params: Vec<String>) -> TalaResult<Value> {
        let site = self
            .polyglot
            .build_tagged_call_site(code, params)
            .map_err(|e| e.into_tala(Span::default(), "<host>"))?;
        Ok(Value::Foreign(site))
    }

    /// Run `expression` as if it were written at the point `caller` describes.
    /// Returns the result, the new state and the scope the expression ran in.
    pub(crate) fn eval_in_scope(
        &self,
        expression: &str,
        caller: &CallerInfo,
        state: Value,
    ) -> Result<(Stateful, CallerInfo), Control> {
        let scope = caller.scope.child();
        let ast = self.parse(expression, REPL_FILE, scope.clone())?;
        let frame = Frame::with_parent(caller.frame.clone(), Vec::new());
        let mut state = state;
        let value = self.eval_root(&ast, &frame, &mut state)?;
        Ok((Stateful::new(state, value), CallerInfo::new(frame, scope)))
    }

    fn parse(&self, source: &str, file: &str, scope: Arc<LocalScope>) -> TalaResult<Arc<Ast>> {
        let mut ast = parser::parse_source(source, file, scope, self.polyglot.clone())?;
        self.instrumenter.instrument(&mut ast);
        Ok(Arc::new(ast))
    }

    fn eval_root(
        &self,
        ast: &Arc<Ast>,
        frame: &Arc<Frame>,
        state: &mut Value,
    ) -> Result<Value, Control> {
        match ast.root() {
            Some(root) => self.eval(ast, root, frame, state),
            None => Ok(Value::Nothing),
        }
    }

    pub(crate) fn eval(
        &self,
        ast: &Arc<Ast>,
        id: NodeId,
        frame: &Arc<Frame>,
        state: &mut Value,
    ) -> Result<Value, Control> {
        match ast.probe(id) {
            Some(probe) => self.eval_probed(probe, ast, id, frame, state),
            None => self.eval_node(ast, id, frame, state),
        }
    }

    /// Run `probe` around the node. An unwind created by this very event is
    /// caught here and turned into the node's result.
    fn eval_probed(
        &self,
        probe: &Arc<dyn ExecutionEventNode>,
        ast: &Arc<Ast>,
        id: NodeId,
        frame: &Arc<Frame>,
        state: &mut Value,
    ) -> Result<Value, Control> {
        let node = ast.node(id);
        let event = EventContext::new(self, node, ast.file(), frame.clone(), state.clone());

        let result = match probe.on_enter(&event) {
            Ok(()) => self.eval_node(ast, id, frame, state),
            Err(unwind) => Err(Control::Unwind(unwind)),
        };

        match result {
            Ok(value) => {
                probe.on_return(&event, &value);
                Ok(value)
            }
            Err(Control::Unwind(unwind)) if unwind.halt_id() == event.halt_id() => {
                let resumed = probe.on_unwind(&event, unwind.into_payload());
                *state = resumed.state;
                Ok(resumed.value)
            }
            Err(other) => Err(other),
        }
    }

    fn eval_node(
        &self,
        ast: &Arc<Ast>,
        id: NodeId,
        frame: &Arc<Frame>,
        state: &mut Value,
    ) -> Result<Value, Control> {
        let node = ast.node(id);
        match &node.kind {
            NodeKind::Literal(value) => Ok(value.clone()),

            NodeKind::Read { name, pointer } => frame.read(*pointer).ok_or_else(|| {
                let message = format!("'{}' used before it was assigned", name);
                fail(ast, node, ErrorKind::NameError, message)
                    .with_help("Move the use after the 'let' that assigns it")
                    .into()
            }),

            NodeKind::Builtin(builtin) => Ok(Value::Builtin(*builtin)),

            NodeKind::Let { slot, value, .. } => {
                let value = self.eval(ast, *value, frame, state)?;
                frame.set_local(*slot, value);
                Ok(Value::Nothing)
            }

            NodeKind::Block(statements) => {
                let mut last = Value::Nothing;
                for statement in statements {
                    last = self.eval(ast, *statement, frame, state)?;
                }
                Ok(last)
            }

            NodeKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.eval(ast, *condition, frame, state)?.is_truthy() {
                    self.eval(ast, *then_branch, frame, state)
                } else if let Some(else_branch) = else_branch {
                    self.eval(ast, *else_branch, frame, state)
                } else {
                    Ok(Value::Nothing)
                }
            }

            NodeKind::Binary { op, left, right } => {
                let left = self.eval(ast, *left, frame, state)?;
                let right = self.eval(ast, *right, frame, state)?;
                arith::binary(*op, &left, &right).map_err(|e| arith_error(ast, node, e))
            }

            NodeKind::Logical { op, left, right } => {
                let left = self.eval(ast, *left, frame, state)?.is_truthy();
                let result = match op {
                    LogicalOp::And if !left => false,
                    LogicalOp::Or if left => true,
                    _ => self.eval(ast, *right, frame, state)?.is_truthy(),
                };
                Ok(Value::Boolean(result))
            }

            NodeKind::Unary { op, operand } => {
                let operand = self.eval(ast, *operand, frame, state)?;
                arith::unary(*op, &operand).map_err(|e| arith_error(ast, node, e))
            }

            NodeKind::Call { callee, args } => {
                let callee = self.eval(ast, *callee, frame, state)?;
                let mut values = Args::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(ast, *arg, frame, state)?);
                }
                let site = Site {
                    span: node.span,
                    ast: Some(ast),
                };
                self.call_value(&callee, values, state, &site)
            }

            NodeKind::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(ast, *item, frame, state)?);
                }
                Ok(Value::array(values))
            }

            NodeKind::Function {
                name,
                arity,
                body,
                scope,
            } => Ok(Value::Function(Arc::new(Closure {
                name: name.clone().unwrap_or_else(|| "<anonymous>".to_string()),
                arity: *arity,
                body: *body,
                ast: ast.clone(),
                scope: scope.clone(),
                captured: frame.clone(),
            }))),

            NodeKind::Foreign(site) => Ok(Value::Foreign(site.clone())),

            // Without a probe a halt point is a no-op
            NodeKind::Breakpoint { .. } => Ok(Value::Nothing),
        }
    }

    fn call_value(
        &self,
        callee: &Value,
        args: Args,
        state: &mut Value,
        site: &Site<'_>,
    ) -> Result<Value, Control> {
        match callee {
            Value::Function(closure) => {
                if args.len() != closure.arity {
                    return Err(site
                        .error(
                            ErrorKind::ArgumentError,
                            format!(
                                "Function '{}' expects {} argument{} but got {}",
                                closure.name,
                                closure.arity,
                                if closure.arity == 1 { "" } else { "s" },
                                args.len()
                            ),
                        )
                        .into());
                }
                let limit = self.options.runtime.max_call_depth;
                let Some(_depth) = CallDepth::enter(limit) else {
                    return Err(site
                        .error(
                            ErrorKind::RuntimeError,
                            format!("Stack overflow (more than {} nested calls)", limit),
                        )
                        .with_help("Check for recursion without a base case")
                        .into());
                };
                let frame = Frame::with_parent(closure.captured.clone(), args.into_vec());
                self.eval(&closure.ast, closure.body, &frame, state)
                    .map_err(|control| match control {
                        Control::Error(mut error) => {
                            error.push_frame(StackFrame::new(
                                &closure.name,
                                site.file(),
                                site.span.start.line,
                                site.span.start.column,
                            ));
                            Control::Error(error)
                        }
                        unwind => unwind,
                    })
            }
            Value::Builtin(builtin) => builtin
                .call(&args, state)
                .map_err(|message| site.error(ErrorKind::RuntimeError, message).into()),
            Value::Foreign(call_site) => call_site.invoke(&args).map_err(|error| {
                let kind = error.kind();
                site.error(kind, error.to_string()).into()
            }),
            Value::Polyglot(object) if object.is_callable() => {
                object.call(None, &args).map_err(|error| {
                    let kind = error.kind();
                    site.error(kind, error.to_string()).into()
                })
            }
            other => Err(site
                .error(
                    ErrorKind::TypeError,
                    format!("Can only call functions, got {}", other.type_name()),
                )
                .into()),
        }
    }
}

fn fail(ast: &Ast, node: &Node, kind: ErrorKind, message: impl Into<String>) -> TalaError {
    TalaError::new(kind, message, node.span, ast.file()).with_source(ast.source())
}

fn arith_error(ast: &Ast, node: &Node, error: ArithError) -> Control {
    let error = match error {
        ArithError::Type(message) => fail(ast, node, ErrorKind::TypeError, message),
        ArithError::DivisionByZero => {
            TalaError::division_by_zero(node.span, ast.file()).with_source(ast.source())
        }
    };
    error.into()
}

pub struct InterpreterBuilder {
    options: Options,
    polyglot: PolyglotContext,
    debug_server: Option<Arc<DebugServer>>,
    factories: Vec<(SourceFilter, Arc<dyn ExecutionEventFactory>)>,
}

impl Default for InterpreterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl InterpreterBuilder {
    /// Starts with the built-in script engine registered for `js`
    pub fn new() -> Self {
        Self {
            options: Options::default(),
            polyglot: PolyglotContext::with_builtin_engines(),
            debug_server: None,
            factories: Vec::new(),
        }
    }

    pub fn options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn engine(mut self, language: Language, engine: Arc<dyn GuestEngine>) -> Self {
        self.polyglot.register(language, engine);
        self
    }

    /// Server the halt probes report to. Only used when the REPL debugger
    /// option is enabled; without one, halts auto-resume.
    pub fn debug_server(mut self, server: Arc<DebugServer>) -> Self {
        self.debug_server = Some(server);
        self
    }

    pub fn instrument(
        mut self,
        filter: SourceFilter,
        factory: Arc<dyn ExecutionEventFactory>,
    ) -> Self {
        self.factories.push((filter, factory));
        self
    }

    pub fn build(self) -> Interpreter {
        let mut instrumenter = Instrumenter::new();
        let debug_server = if self.options.repl_debugger_enabled() {
            let server = self.debug_server.unwrap_or_else(DebugServer::detached);
            server.install(&mut instrumenter);
            tracing::info!(attached = server.has_client(), "REPL debugger instrumentation enabled");
            Some(server)
        } else {
            if self.debug_server.is_some() {
                tracing::debug!("REPL debugger disabled, ignoring debug server");
            }
            None
        };
        for (filter, factory) in self.factories {
            instrumenter.attach_execution_event_factory(filter, factory);
        }

        Interpreter {
            options: self.options,
            polyglot: Arc::new(self.polyglot),
            instrumenter,
            debug_server,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::Tags;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn run(source: &str) -> TalaResult<Value> {
        Interpreter::new()
            .run_source(source, "test.tala", Value::Nothing)
            .map(|result| result.value)
    }

    #[test]
    fn closures_and_recursion() {
        let source = "let fact = fn(n) { if n <= 1 { 1 } else { n * fact(n - 1) } }\nfact(10)";
        assert_eq!(run(source).unwrap(), Value::Integer(3628800));
    }

    #[test]
    fn runaway_recursion_is_a_runtime_error() {
        let source = "let f = fn(n) { if n == 0 { 0 } else { 1 + f(n - 1) } }\nf(100)";
        // Same stack as the CLI main thread
        let err = std::thread::Builder::new()
            .stack_size(8 << 20)
            .spawn(move || run(source))
            .unwrap()
            .join()
            .unwrap()
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::RuntimeError);
        assert!(err.message.contains("Stack overflow"));
        assert_eq!(err.stack_trace.len(), crate::config::DEFAULT_MAX_CALL_DEPTH);
    }

    #[test]
    fn call_depth_is_released_after_overflow() {
        let interpreter = Interpreter::builder()
            .options(Options::default().max_call_depth(8))
            .build();
        let source = "let f = fn(n) { if n == 0 { 0 } else { 1 + f(n - 1) } }\nf(N)";
        let run = |n: i64| {
            interpreter
                .run_source(&source.replace('N', &n.to_string()), "t", Value::Nothing)
                .map(|result| result.value)
        };
        assert!(run(20).is_err());
        assert_eq!(run(7).unwrap(), Value::Integer(7));
        assert!(run(8).is_err());
    }

    #[test]
    fn closures_capture_their_frame() {
        let source = "let make = fn(n) { fn(x) { x + n } }\nlet add2 = make(2)\nadd2(40)";
        assert_eq!(run(source).unwrap(), Value::Integer(42));
    }

    #[test]
    fn state_token_threads_through_builtins() {
        let result = Interpreter::new()
            .run_source("put_state(get_state() + 1)\n get_state()", "t", Value::Integer(41))
            .unwrap();
        assert_eq!(result.state, Value::Integer(42));
        assert_eq!(result.value, Value::Integer(42));
    }

    #[test]
    fn errors_carry_a_stack_trace() {
        let source = "let inner = fn() { 1 / 0 }\nlet outer = fn() { inner() }\nouter()";
        let err = run(source).unwrap_err();
        assert_eq!(err.kind, ErrorKind::DivisionByZero);
        let names: Vec<&str> = err
            .stack_trace
            .iter()
            .map(|frame| frame.function_name.as_str())
            .collect();
        assert_eq!(names, ["inner", "outer"]);
    }

    #[test]
    fn arity_mismatch_is_an_argument_error() {
        let err = run("let f = fn(a) { a }\nf(1, 2)").unwrap_err();
        assert_eq!(err.kind, ErrorKind::ArgumentError);
    }

    #[test]
    fn foreign_js_functions_are_callable() {
        let source =
            "let add = foreign js(self, a, b) \"\"\"return this + a + b;\"\"\"\nadd(1, 2, 3)";
        assert_eq!(run(source).unwrap(), Value::Integer(6));
    }

    #[test]
    fn tagged_fragments_become_host_callables() {
        let interpreter = Interpreter::new();
        let double = interpreter
            .foreign_function("js#return a * 2;", vec!["self".into(), "a".into()])
            .unwrap();
        let result = interpreter
            .call(&double, &[Value::Nothing, Value::Integer(21)], Value::Nothing)
            .unwrap();
        assert_eq!(result.value, Value::Integer(42));

        let err = interpreter.foreign_function("no tag", vec![]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ConfigurationError);
    }

    #[test]
    fn breakpoints_are_no_ops_without_debugger() {
        assert_eq!(run("let x = 1\nbreakpoint()\nx + 1").unwrap(), Value::Integer(2));
    }

    #[test]
    fn custom_probes_observe_matching_nodes() {
        struct Count(Arc<AtomicUsize>);
        impl ExecutionEventNode for Count {
            fn on_enter(&self, _event: &EventContext<'_>) -> Result<(), Unwind> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let factory = move |_: &Node| -> Option<Arc<dyn ExecutionEventNode>> {
            Some(Arc::new(Count(counter.clone())))
        };
        let interpreter = Interpreter::builder()
            .instrument(SourceFilter::tag_is(Tags::CALL), Arc::new(factory))
            .build();
        interpreter
            .run_source("let f = fn(x) { x }\nf(f(1))", "t", Value::Nothing)
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn host_functions_callable_from_embedding_code() {
        let interpreter = Interpreter::new();
        let program = interpreter.compile("fn(a, b) { a * b }", "t").unwrap();
        let function = interpreter.run(&program, Value::Nothing).unwrap().value;
        let result = interpreter
            .call(&function, &[Value::Integer(6), Value::Integer(7)], Value::Nothing)
            .unwrap();
        assert_eq!(result.value, Value::Integer(42));
    }
}
