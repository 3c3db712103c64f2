// Built-in script engine
// A compact JavaScript-flavoured guest language serving the `js` tag

mod eval;
mod syntax;

use crate::polyglot::context::ContextGuard;
use crate::polyglot::engine::{EngineFailure, GuestEngine, GuestObject, GuestValue};
use eval::{Env, Evaluator, ScriptFunction};
use std::sync::Arc;

/// Script globals, one set per inner context
#[derive(Default)]
struct Globals {
    env: Arc<Env>,
}

#[derive(Debug, Default)]
pub struct ScriptEngine;

impl ScriptEngine {
    pub fn new() -> Self {
        ScriptEngine
    }
}

impl GuestEngine for ScriptEngine {
    fn name(&self) -> &str {
        "tala-script"
    }

    fn eval(&self, cx: &ContextGuard<'_>, source: &str) -> Result<GuestValue, EngineFailure> {
        let program = syntax::parse(source)?;
        let globals = cx.context().engine_state::<Globals>();
        Evaluator::new(cx).run_program(&program, &globals.env)
    }

    fn call(
        &self,
        cx: &ContextGuard<'_>,
        callee: &GuestObject,
        receiver: Option<GuestValue>,
        args: Vec<GuestValue>,
    ) -> Result<GuestValue, EngineFailure> {
        let function = callee
            .downcast_ref::<ScriptFunction>()
            .ok_or_else(|| EngineFailure::Fault("object is not a script function".into()))?;
        Evaluator::new(cx).call_function(function, receiver, args)
    }

    fn is_callable(&self, object: &GuestObject) -> bool {
        object.downcast_ref::<ScriptFunction>().is_some()
    }

    fn display(
        &self,
        _cx: &ContextGuard<'_>,
        object: &GuestObject,
    ) -> Result<String, EngineFailure> {
        match object.downcast_ref::<ScriptFunction>() {
            Some(function) => Ok(format!(
                "function {}({}) {{ [code] }}",
                function.decl.name.as_deref().unwrap_or(""),
                function.decl.params.join(", ")
            )),
            None => Err(EngineFailure::Fault("object was not created by this engine".into())),
        }
    }
}
