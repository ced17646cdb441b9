use thiserror::Error;

/// Failure raised by a transformer script while it runs
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScriptError {
    #[error("Unknown script '{0}'")]
    UnknownScript(String),

    #[error("Malformed script: {0}")]
    Malformed(String),

    #[error("Unknown operation '{op}' (known operations: {known})")]
    UnknownOperation { op: String, known: String },

    #[error("Operation '{op}' is missing argument '{arg}'")]
    MissingArgument { op: String, arg: String },

    #[error("Variable '{0}' is not bound")]
    Unbound(String),

    #[error("Variable '{0}' does not refer to a content node")]
    NotANode(String),

    #[error("Script raised an error: {0}")]
    Raised(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    /// The `rts` field exists but cannot be read as a transformer list
    #[error("Invalid representation transformer metadata: {0}")]
    InvalidMetadata(String),

    #[error("Representation transformer failed: {0}")]
    Script(#[from] ScriptError),
}

impl TransformError {
    pub fn invalid(message: impl Into<String>) -> Self {
        TransformError::InvalidMetadata(message.into())
    }
}
