use thiserror::Error;

/// Everything that can go wrong while parsing or evaluating user code.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExprError {
    #[error("syntax error at offset {pos}: {message}")]
    Syntax { pos: usize, message: String },

    #[error("ReferenceError: {0} is not defined")]
    Reference(String),

    #[error("TypeError: {0}")]
    Type(String),

    /// A `throw` that nobody caught. Holds the thrown message.
    #[error("Uncaught {0}")]
    Thrown(String),

    #[error("evaluation budget of {0} steps exhausted")]
    Budget(u64),

    #[error("maximum call depth ({0}) exceeded")]
    Depth(usize),

    /// An array or object would nest deeper than the value limit.
    #[error("value nested deeper than {0} levels")]
    Nesting(usize),
}

impl ExprError {
    pub(crate) fn syntax(pos: usize, message: impl Into<String>) -> Self {
        ExprError::Syntax {
            pos,
            message: message.into(),
        }
    }

    pub(crate) fn type_error(message: impl Into<String>) -> Self {
        ExprError::Type(message.into())
    }

    /// Errors a script may intercept with `try/catch`.
    pub(crate) fn is_catchable(&self) -> bool {
        !matches!(
            self,
            ExprError::Budget(_) | ExprError::Depth(_) | ExprError::Nesting(_)
        )
    }
}
