use crate::polyglot::{ForeignError, Language};
use regex::Regex;
use std::sync::OnceLock;

static PARAMETER_NAME: OnceLock<Regex> = OnceLock::new();

fn parameter_name() -> &'static Regex {
    PARAMETER_NAME
        .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("constant pattern"))
}

/// Guest code embedded in a host program
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignSource {
    language: Language,
    text: String,
    params: Vec<String>,
}

impl ForeignSource {
    pub fn new(
        tag: &str,
        text: impl Into<String>,
        params: Vec<String>,
    ) -> Result<Self, ForeignError> {
        let language = Language::from_tag(tag)
            .ok_or_else(|| ForeignError::UnsupportedLanguage(tag.to_string()))?;
        if let Some(bad) = params.iter().find(|p| !parameter_name().is_match(p)) {
            return Err(ForeignError::InvalidParameter(bad.clone()));
        }
        Ok(Self {
            language,
            text: text.into(),
            params,
        })
    }

    /// Parse the `<tag>#<source>` form, splitting at the first `#`
    pub fn parse_tagged(code: &str, params: Vec<String>) -> Result<Self, ForeignError> {
        let (tag, text) = code.split_once('#').ok_or_else(|| {
            ForeignError::MalformedSource("missing `#` after language tag".into())
        })?;
        Self::new(tag.trim(), text, params)
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }
}
