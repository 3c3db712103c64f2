use super::syntax::{Expr, FunctionDecl, Stmt};
use crate::ast::{BinaryOp, UnaryOp};
use crate::polyglot::context::ContextGuard;
use crate::polyglot::engine::{EngineFailure, GuestException, GuestObject, GuestValue};
use crate::vm::arith::{self, ArithError};
use crate::vm::value::Value;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;

const MAX_CALL_DEPTH: usize = 64;

type Exec<T> = Result<T, EngineFailure>;

/// Variable environment. Functions get a fresh child; blocks share their
/// function's environment.
#[derive(Default)]
pub(crate) struct Env {
    vars: Mutex<FxHashMap<String, GuestValue>>,
    parent: Option<Arc<Env>>,
}

impl Env {
    fn child(parent: Arc<Env>) -> Arc<Env> {
        Arc::new(Env {
            vars: Mutex::new(FxHashMap::default()),
            parent: Some(parent),
        })
    }

    fn define(&self, name: &str, value: GuestValue) {
        self.vars.lock().insert(name.to_string(), value);
    }

    fn lookup(&self, name: &str) -> Option<GuestValue> {
        if let Some(value) = self.vars.lock().get(name) {
            return Some(value.clone());
        }
        self.parent.as_ref()?.lookup(name)
    }

    fn assign(&self, name: &str, value: GuestValue) -> bool {
        {
            let mut vars = self.vars.lock();
            if let Some(slot) = vars.get_mut(name) {
                *slot = value;
                return true;
            }
        }
        match &self.parent {
            Some(parent) => parent.assign(name, value),
            None => false,
        }
    }
}

/// A script function object
pub(crate) struct ScriptFunction {
    pub decl: Arc<FunctionDecl>,
    pub closure: Arc<Env>,
}

enum Flow {
    Normal,
    Return(GuestValue),
}

fn throw<T>(message: impl Into<String>) -> Exec<T> {
    Err(EngineFailure::Exception(GuestException::new(message)))
}

pub(crate) struct Evaluator<'a, 'g> {
    cx: &'a ContextGuard<'g>,
    depth: usize,
}

impl<'a, 'g> Evaluator<'a, 'g> {
    pub fn new(cx: &'a ContextGuard<'g>) -> Self {
        Self { cx, depth: 0 }
    }

    /// Run top-level statements; the result is the last expression
    /// statement's value
    pub fn run_program(&mut self, program: &[Stmt], globals: &Arc<Env>) -> Exec<GuestValue> {
        let mut completion = GuestValue::Null;
        for stmt in program {
            if let Stmt::Expr(expr) = stmt {
                completion = self.eval(expr, globals)?;
                continue;
            }
            if let Flow::Return(_) = self.exec(stmt, globals)? {
                return throw("SyntaxError: return outside of a function");
            }
        }
        Ok(completion)
    }

    pub fn call_function(
        &mut self,
        function: &ScriptFunction,
        receiver: Option<GuestValue>,
        args: Vec<GuestValue>,
    ) -> Exec<GuestValue> {
        if self.depth >= MAX_CALL_DEPTH {
            return throw("RangeError: maximum call stack size exceeded");
        }
        let env = Env::child(function.closure.clone());
        env.define("this", receiver.unwrap_or(GuestValue::Null));
        let mut args = args.into_iter();
        for param in &function.decl.params {
            env.define(param, args.next().unwrap_or(GuestValue::Null));
        }

        self.depth += 1;
        let flow = self.exec_block(&function.decl.body, &env);
        self.depth -= 1;

        match flow? {
            Flow::Return(value) => Ok(value),
            Flow::Normal => Ok(GuestValue::Null),
        }
    }

    fn exec_block(&mut self, statements: &[Stmt], env: &Arc<Env>) -> Exec<Flow> {
        for stmt in statements {
            if let Flow::Return(value) = self.exec(stmt, env)? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, stmt: &Stmt, env: &Arc<Env>) -> Exec<Flow> {
        match stmt {
            Stmt::Var { name, init } => {
                let value = match init {
                    Some(expr) => self.eval(expr, env)?,
                    None => GuestValue::Null,
                };
                env.define(name, value);
                Ok(Flow::Normal)
            }
            Stmt::Expr(expr) => {
                self.eval(expr, env)?;
                Ok(Flow::Normal)
            }
            Stmt::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.eval(expr, env)?,
                    None => GuestValue::Null,
                };
                Ok(Flow::Return(value))
            }
            Stmt::Throw(expr) => {
                let value = self.eval(expr, env)?;
                throw(render(&value))
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if truthy(&self.eval(condition, env)?) {
                    self.exec_block(then_branch, env)
                } else if let Some(else_branch) = else_branch {
                    self.exec_block(else_branch, env)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::Block(statements) => self.exec_block(statements, env),
            Stmt::Export { name, value } => {
                let value = self.eval(value, env)?;
                env.define(name, value.clone());
                self.cx.context().export(name.clone(), value);
                Ok(Flow::Normal)
            }
        }
    }

    fn eval(&mut self, expr: &Expr, env: &Arc<Env>) -> Exec<GuestValue> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Ident(name) => match env.lookup(name) {
                Some(value) => Ok(value),
                None => throw(format!("ReferenceError: {} is not defined", name)),
            },
            Expr::This => Ok(env.lookup("this").unwrap_or(GuestValue::Null)),
            Expr::Assign { name, value } => {
                let value = self.eval(value, env)?;
                if !env.assign(name, value.clone()) {
                    return throw(format!("ReferenceError: {} is not defined", name));
                }
                Ok(value)
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(left, env)?;
                let right = self.eval(right, env)?;
                binary(*op, &left, &right)
            }
            Expr::Logical { and, left, right } => {
                let left = self.eval(left, env)?;
                if truthy(&left) == *and {
                    self.eval(right, env)
                } else {
                    Ok(left)
                }
            }
            Expr::Not(operand) => Ok(GuestValue::Boolean(!truthy(&self.eval(operand, env)?))),
            Expr::Negate(operand) => {
                let operand = self.eval(operand, env)?;
                let value = to_primitive(&operand)?;
                from_arith(arith::unary(UnaryOp::Negate, &value))
            }
            Expr::Call { callee, args } => {
                let callee = self.eval(callee, env)?;
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg, env)?);
                }
                match &callee {
                    GuestValue::Object(object) => match object.downcast_ref::<ScriptFunction>() {
                        Some(function) => self.call_function(function, None, values),
                        None => throw("TypeError: object is not a function"),
                    },
                    other => throw(format!("TypeError: {} is not a function", other.type_name())),
                }
            }
            Expr::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item, env)?);
                }
                Ok(GuestValue::Array(values))
            }
            Expr::Function(decl) => Ok(GuestValue::Object(GuestObject::new(ScriptFunction {
                decl: decl.clone(),
                closure: env.clone(),
            }))),
        }
    }
}

pub(crate) fn truthy(value: &GuestValue) -> bool {
    match value {
        GuestValue::Null => false,
        GuestValue::Boolean(b) => *b,
        GuestValue::Integer(n) => *n != 0,
        GuestValue::Number(n) => *n != 0.0 && !n.is_nan(),
        GuestValue::Text(s) => !s.is_empty(),
        _ => true,
    }
}

pub(crate) fn render(value: &GuestValue) -> String {
    match value {
        GuestValue::Null => "null".to_string(),
        GuestValue::Text(s) => s.to_string(),
        GuestValue::Array(items) => items.iter().map(render).collect::<Vec<_>>().join(","),
        GuestValue::Object(_) => "[object]".to_string(),
        GuestValue::Host(host) => format!("[host {}]", host.type_name()),
        other => match to_primitive(other) {
            Ok(value) => value.to_string(),
            Err(_) => other.type_name().to_string(),
        },
    }
}

fn binary(op: BinaryOp, left: &GuestValue, right: &GuestValue) -> Exec<GuestValue> {
    match (op, left, right) {
        (BinaryOp::Equal, GuestValue::Object(a), GuestValue::Object(b)) => {
            Ok(GuestValue::Boolean(a.ptr_eq(b)))
        }
        (BinaryOp::NotEqual, GuestValue::Object(a), GuestValue::Object(b)) => {
            Ok(GuestValue::Boolean(!a.ptr_eq(b)))
        }
        (BinaryOp::Add, GuestValue::Text(_), _) | (BinaryOp::Add, _, GuestValue::Text(_)) => {
            Ok(GuestValue::text(&format!("{}{}", render(left), render(right))))
        }
        _ => {
            let left = to_primitive(left)?;
            let right = to_primitive(right)?;
            from_arith(arith::binary(op, &left, &right))
        }
    }
}

fn to_primitive(value: &GuestValue) -> Exec<Value> {
    match value {
        GuestValue::Null => Ok(Value::Nothing),
        GuestValue::Boolean(b) => Ok(Value::Boolean(*b)),
        GuestValue::Integer(n) => Ok(Value::Integer(*n)),
        GuestValue::Number(n) => Ok(Value::Number(*n)),
        GuestValue::Text(s) => Ok(Value::Text(s.clone())),
        other => throw(format!(
            "TypeError: cannot use {} as an operand",
            other.type_name()
        )),
    }
}

fn from_arith(result: Result<Value, ArithError>) -> Exec<GuestValue> {
    match result {
        Ok(Value::Boolean(b)) => Ok(GuestValue::Boolean(b)),
        Ok(Value::Integer(n)) => Ok(GuestValue::Integer(n)),
        Ok(Value::Number(n)) => Ok(GuestValue::Number(n)),
        Ok(Value::Text(s)) => Ok(GuestValue::Text(s)),
        Ok(Value::Nothing) => Ok(GuestValue::Null),
        Ok(other) => Err(EngineFailure::Fault(format!(
            "arithmetic produced a {}",
            other.type_name()
        ))),
        Err(ArithError::Type(message)) => throw(format!("TypeError: {}", message)),
        Err(ArithError::DivisionByZero) => throw("RangeError: division by zero"),
    }
}
