use crate::polyglot::dialect::{Dialect, ExportedModule, FunctionLiteral, ScriptShell};
use std::fmt;

/// Guest languages the bridge knows how to wrap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Js,
    Python,
    R,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::Js, Language::Python, Language::R];

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "js" => Some(Language::Js),
            "python" => Some(Language::Python),
            "r" => Some(Language::R),
            _ => None,
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            Language::Js => "js",
            Language::Python => "python",
            Language::R => "r",
        }
    }

    pub fn dialect(self) -> &'static dyn Dialect {
        match self {
            Language::Js => &ScriptShell,
            Language::Python => &ExportedModule,
            Language::R => &FunctionLiteral,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}
