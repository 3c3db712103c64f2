use crate::error::{ErrorKind, Span, TalaError};
use crate::polyglot::Language;
use thiserror::Error;

/// Failure crossing the foreign call boundary
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ForeignError {
    /// A guest-language exception, rewrapped for the host
    #[error("{language} exception: {message}")]
    Guest { language: Language, message: String },

    #[error("unsupported foreign language `{0}`")]
    UnsupportedLanguage(String),

    #[error("no engine registered for foreign language `{0}`")]
    MissingEngine(Language),

    #[error("invalid foreign parameter name `{0}`")]
    InvalidParameter(String),

    #[error("malformed foreign source: {0}")]
    MalformedSource(String),

    #[error("foreign function expects {expected} arguments, got {got}")]
    Arity { expected: usize, got: usize },

    /// Anything the engine did not report as a guest exception
    #[error("internal fault in foreign engine: {0}")]
    Internal(String),
}

impl ForeignError {
    /// Deployment defects rather than user input
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ForeignError::UnsupportedLanguage(_)
                | ForeignError::MissingEngine(_)
                | ForeignError::InvalidParameter(_)
                | ForeignError::MalformedSource(_)
        )
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ForeignError::Guest { .. } => ErrorKind::ForeignError,
            ForeignError::Arity { .. } => ErrorKind::ArgumentError,
            ForeignError::Internal(_) => ErrorKind::InternalError,
            _ => ErrorKind::ConfigurationError,
        }
    }

    pub fn into_tala(self, span: Span, file: &str) -> TalaError {
        TalaError::new(self.kind(), self.to_string(), span, file)
    }
}
