use crate::dates::DateError;

#[derive(Debug)]
pub enum EngineError {
    InvalidInput { field: String, reason: String },
    InvalidDate { field: String, source: DateError },
    NotFound { kind: &'static str, id: String },
    Forbidden { tour_id: String },
    LimitExceeded(&'static str),
    WalError(String),
}

impl EngineError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        EngineError::NotFound { kind, id: id.into() }
    }

    /// Offending request field, for 400 responses.
    pub fn field(&self) -> Option<&str> {
        match self {
            EngineError::InvalidInput { field, .. } | EngineError::InvalidDate { field, .. } => Some(field),
            _ => None,
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidInput { field, reason } => write!(f, "invalid {field}: {reason}"),
            EngineError::InvalidDate { field, source } => write!(f, "invalid {field}: {source}"),
            EngineError::NotFound { kind, id } => write!(f, "{kind} not found: {id}"),
            EngineError::Forbidden { tour_id } => {
                write!(f, "tour {tour_id} belongs to another agency")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
