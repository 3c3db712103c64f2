// Per-language compile strategies
//
// A dialect knows how to wrap a fragment into something its engine can
// evaluate to a function, how to get hold of that function, and how
// arguments are passed to it.

use crate::polyglot::context::ContextGuard;
use crate::polyglot::engine::{EngineFailure, GuestEngine, GuestValue};
use crate::polyglot::source::ForeignSource;

/// How host arguments map onto a guest call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallConvention {
    /// First argument is the receiver (`this`), the rest are positional
    Receiver,
    Positional,
}

pub trait Dialect: Send + Sync {
    /// Source text that evaluates to (or exports) the guest function
    fn shell(&self, source: &ForeignSource) -> String;

    /// Evaluate the shell and hand back the guest function
    fn compile(
        &self,
        engine: &dyn GuestEngine,
        cx: &ContextGuard<'_>,
        shell: &str,
    ) -> Result<GuestValue, EngineFailure> {
        engine.eval(cx, shell)
    }

    fn convention(&self) -> CallConvention;
}

/// `js`: an anonymous function expression bound to a variable, with the
/// variable as the script's completion value. The first declared parameter
/// is the receiver, so it does not appear in the signature.
pub struct ScriptShell;

pub const SCRIPT_SHELL_NAME: &str = "poly_tala_eval";

impl Dialect for ScriptShell {
    fn shell(&self, source: &ForeignSource) -> String {
        let params: Vec<&str> = source.params().iter().skip(1).map(String::as_str).collect();
        format!(
            "var {name}=function({params}){{\n{body}\n}};{name}",
            name = SCRIPT_SHELL_NAME,
            params = params.join(","),
            body = source.text()
        )
    }

    fn convention(&self) -> CallConvention {
        CallConvention::Receiver
    }
}

/// `python`: a module that exports a fixed-name function, fetched by symbol
/// import once the module has run.
pub struct ExportedModule;

pub const EXPORTED_SYMBOL: &str = "polyglot_tala_python_eval";

impl Dialect for ExportedModule {
    fn shell(&self, source: &ForeignSource) -> String {
        let mut shell = format!(
            "import polyglot\n@polyglot.export_value\ndef {}({}):\n",
            EXPORTED_SYMBOL,
            source.params().join(",")
        );
        for line in source.text().lines() {
            shell.push_str("    ");
            shell.push_str(line);
            shell.push('\n');
        }
        shell
    }

    /// Every module exports under the same name, so the evaluation and its
    /// import run under the context's publish lock and the export is
    /// cleared before the lock is released.
    fn compile(
        &self,
        engine: &dyn GuestEngine,
        cx: &ContextGuard<'_>,
        shell: &str,
    ) -> Result<GuestValue, EngineFailure> {
        let context = cx.context();
        let _publishing = context.lock_publish();
        let function = engine
            .eval(cx, shell)
            .and_then(|_| engine.import_symbol(cx, EXPORTED_SYMBOL));
        context.remove_export(EXPORTED_SYMBOL);
        function
    }

    fn convention(&self) -> CallConvention {
        CallConvention::Positional
    }
}

/// `r`: a bare function literal
pub struct FunctionLiteral;

impl Dialect for FunctionLiteral {
    fn shell(&self, source: &ForeignSource) -> String {
        format!("function({}){{\n{}\n}}", source.params().join(","), source.text())
    }

    fn convention(&self) -> CallConvention {
        CallConvention::Positional
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(tag: &str, text: &str, params: &[&str]) -> ForeignSource {
        ForeignSource::new(tag, text, params.iter().map(|p| p.to_string()).collect()).unwrap()
    }

    #[test]
    fn script_shell_drops_the_receiver() {
        let shell = ScriptShell.shell(&source("js", "return this + a;", &["self", "a", "b"]));
        assert_eq!(
            shell,
            "var poly_tala_eval=function(a,b){\nreturn this + a;\n};poly_tala_eval"
        );
    }

    #[test]
    fn exported_module_indents_every_line() {
        let shell = ExportedModule.shell(&source("python", "x = a\nreturn x", &["a"]));
        assert_eq!(
            shell,
            "import polyglot\n@polyglot.export_value\n\
             def polyglot_tala_python_eval(a):\n    x = a\n    return x\n"
        );
    }

    #[test]
    fn function_literal_keeps_all_params() {
        let shell = FunctionLiteral.shell(&source("r", "a + b", &["a", "b"]));
        assert_eq!(shell, "function(a,b){\na + b\n}");
    }
}
