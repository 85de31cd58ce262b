use std::fmt;

/// Errors raised by the engine outside of a single dispatch.
///
/// Transport problems are not represented here: they are carried by
/// [`crate::http::client::TransportError`] and always end up normalized into a
/// failed [`crate::http::response::ResponseRecord`].
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    InvalidBody { message: String },
    NotFound { what: &'static str, id: String },
    AlreadyRunning { id: String },
    Backend { context: String, message: String },
    Storage { context: String, message: String },
    Config { message: String },
}

impl EngineError {
    pub fn backend(context: impl Into<String>, message: impl fmt::Display) -> Self {
        EngineError::Backend {
            context: context.into(),
            message: message.to_string(),
        }
    }

    pub fn storage(context: impl Into<String>, message: impl fmt::Display) -> Self {
        EngineError::Storage {
            context: context.into(),
            message: message.to_string(),
        }
    }

    pub fn not_found(what: &'static str, id: impl Into<String>) -> Self {
        EngineError::NotFound { what, id: id.into() }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::InvalidBody { message } => write!(f, "Invalid JSON body: {message}"),
            EngineError::NotFound { what, id } => write!(f, "{what} '{id}' not found"),
            EngineError::AlreadyRunning { id } => {
                write!(f, "A request for '{id}' is already in flight")
            }
            EngineError::Backend { context, message } => {
                write!(f, "Backend error while {context}: {message}")
            }
            EngineError::Storage { context, message } => {
                write!(f, "Storage error while {context}: {message}")
            }
            EngineError::Config { message } => write!(f, "Configuration error: {message}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        EngineError::storage("querying SQLite", err)
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
