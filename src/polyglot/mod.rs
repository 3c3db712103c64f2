// Tala Polyglot Module
// Foreign call bridge: embeds guest-language code in host programs

mod call_site;
pub mod context;
pub mod dialect;
pub mod engine;
mod error;
mod language;
mod rewrap;
pub mod script;
mod source;

#[cfg(test)]
mod tests;

pub use call_site::CallSite;
pub use context::{ContextGuard, InnerContext};
pub use engine::{EngineFailure, GuestEngine, GuestException, GuestObject, GuestValue};
pub use error::ForeignError;
pub use language::Language;
pub use rewrap::{ForeignFunction, PolyglotObject};
pub use source::ForeignSource;

use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Registered guest engines and the inner context they run in
pub struct PolyglotContext {
    engines: FxHashMap<Language, Arc<dyn GuestEngine>>,
    inner: Arc<InnerContext>,
}

impl Default for PolyglotContext {
    fn default() -> Self {
        Self::new()
    }
}

impl PolyglotContext {
    /// A context with no engines registered
    pub fn new() -> Self {
        Self {
            engines: FxHashMap::default(),
            inner: InnerContext::new(),
        }
    }

    /// A context with the built-in script engine serving `js`
    pub fn with_builtin_engines() -> Self {
        let mut polyglot = Self::new();
        polyglot.register(Language::Js, Arc::new(script::ScriptEngine::new()));
        polyglot
    }

    pub fn register(&mut self, language: Language, engine: Arc<dyn GuestEngine>) {
        tracing::debug!(language = %language, engine = engine.name(), "registered guest engine");
        self.engines.insert(language, engine);
    }

    pub fn engine(&self, language: Language) -> Result<Arc<dyn GuestEngine>, ForeignError> {
        self.engines
            .get(&language)
            .cloned()
            .ok_or(ForeignError::MissingEngine(language))
    }

    pub fn inner_context(&self) -> &Arc<InnerContext> {
        &self.inner
    }

    /// Tags of the languages that have an engine
    pub fn language_tags(&self) -> Vec<&'static str> {
        Language::ALL
            .into_iter()
            .filter(|language| self.engines.contains_key(language))
            .map(Language::tag)
            .collect()
    }

    /// Build an uncompiled call site. Fails only on configuration problems:
    /// an unknown tag, a language without an engine, or a bad parameter name.
    pub fn build_call_site(
        self: &Arc<Self>,
        tag: &str,
        text: &str,
        params: Vec<String>,
    ) -> Result<Arc<CallSite>, ForeignError> {
        self.call_site_for(ForeignSource::new(tag, text, params)?)
    }

    /// Same as `build_call_site` for a fragment in `<tag>#<source>` form
    pub fn build_tagged_call_site(
        self: &Arc<Self>,
        code: &str,
        params: Vec<String>,
    ) -> Result<Arc<CallSite>, ForeignError> {
        self.call_site_for(ForeignSource::parse_tagged(code, params)?)
    }

    fn call_site_for(
        self: &Arc<Self>,
        source: ForeignSource,
    ) -> Result<Arc<CallSite>, ForeignError> {
        self.engine(source.language())?;
        Ok(Arc::new(CallSite::new(source, self.clone())))
    }
}
