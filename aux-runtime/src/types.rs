//! Error types for the runtime.

/// Error raised by a script while it runs.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScriptError {
    /// The script exhausted its energy budget. Always fatal.
    #[error("Ran out of energy")]
    RanOutOfEnergy,

    /// Any other error thrown by a script
    #[error("{message}")]
    Thrown {
        /// Error message
        message: String,
        /// Bot the script belongs to
        bot_id: Option<String>,
        /// Tag the script was compiled from
        tag: Option<String>,
    },
}

impl ScriptError {
    /// Create an error thrown by a script.
    pub fn thrown(message: impl Into<String>) -> Self {
        Self::Thrown {
            message: message.into(),
            bot_id: None,
            tag: None,
        }
    }

    /// Attribute the error to a bot and tag.
    pub fn in_tag(self, bot_id: impl Into<String>, tag: impl Into<String>) -> Self {
        match self {
            Self::Thrown { message, .. } => Self::Thrown {
                message,
                bot_id: Some(bot_id.into()),
                tag: Some(tag.into()),
            },
            other => other,
        }
    }

    /// Whether this error must abort the current execution.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::RanOutOfEnergy)
    }
}

/// Error types for the runtime.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Fatal script error
    #[error(transparent)]
    Script(#[from] ScriptError),

    /// A bot was asked to replace itself
    #[error("Cannot replace bot {0} with itself")]
    SelfReplacement(String),

    /// A bot with the same ID is already in the context
    #[error("Bot already exists in the context: {0}")]
    DuplicateBot(String),

    /// Mocks exist for the function but none match the arguments
    #[error("No mock data matching the given arguments for {0}")]
    NoMatchingMockInput(String),

    /// Every queued mock value has been used
    #[error("No more mock values for {0}")]
    MockValuesExhausted(String),

    /// Nothing was mocked for the function
    #[error("No mock data configured for {0}")]
    NoMockData(String),

    /// A platform timer was requested outside of a tokio runtime
    #[error("Timers require a running tokio runtime")]
    NoTimerRuntime,

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
