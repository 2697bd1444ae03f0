use thiserror::Error;

/// Boxed error produced by argument converters.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// An argument token could not be converted to the parameter's type.
#[derive(Debug, Error)]
#[error("cannot convert '{token}' to {target}")]
pub struct ConversionError {
    pub target: String,
    pub token: String,
    #[source]
    pub source: BoxError,
}

/// Errors raised by the command engine itself.
#[derive(Debug, Error)]
pub enum CommandError {
    /// No constructor of a handler type had all its dependencies available.
    #[error("no constructor of handler `{handler}` could be satisfied (unresolved: {})", .missing.join(", "))]
    HandlerResolution { handler: String, missing: Vec<String> },

    /// A command parameter has no way of being filled.
    #[error("parameter `{parameter}` ({ty}) of command `{command}` cannot be resolved")]
    UnsupportedParameter {
        command: String,
        parameter: String,
        ty: String,
    },

    #[error("invalid trigger for command `{command}`: {source}")]
    InvalidTrigger {
        command: String,
        #[source]
        source: regex::Error,
    },

    #[error("handler instance is not a `{expected}`")]
    HandlerTypeMismatch { expected: &'static str },

    #[error("argument {index} is not available as `{expected}`")]
    Argument { index: usize, expected: &'static str },

    #[error("command execution was cancelled")]
    Cancelled,

    #[error("commands service has not been started")]
    NotStarted,

    #[error("commands service has been disposed")]
    Disposed,
}

impl CommandError {
    /// True when `err` is, or wraps, a cancellation.
    pub fn is_cancellation(err: &anyhow::Error) -> bool {
        matches!(err.downcast_ref::<CommandError>(), Some(CommandError::Cancelled))
    }
}
