use std::fmt;
use std::io;

/// Errors produced while evaluating a single condition.
///
/// A [`Parse`](ConditionError::Parse) error means the condition parameter
/// itself is malformed, [`Io`](ConditionError::Io) means a host fact could
/// not be read, and [`Unsupported`](ConditionError::Unsupported) means the
/// check cannot be carried out on this system at all. Policy decisions
/// (skip-pass on absent facilities, "assume an update is needed", ...) are
/// folded into the boolean outcome by the individual checks and never
/// surface here.
#[derive(Debug, thiserror::Error)]
pub enum ConditionError {
    /// The condition parameter could not be parsed.
    #[error("cannot parse condition parameter `{parameter}`: {reason}")]
    Parse {
        /// The offending parameter text.
        parameter: String,
        /// What went wrong.
        reason: String,
    },

    /// A host fact could not be read.
    #[error("failed to read {context}: {source}")]
    Io {
        /// The file or facility that failed.
        context: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The check is not meaningful on this system.
    #[error("cannot test condition on this system: {0}")]
    Unsupported(String),
}

impl ConditionError {
    pub(crate) fn parse(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        ConditionError::Parse {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn io(context: impl fmt::Display, source: io::Error) -> Self {
        ConditionError::Io {
            context: context.to_string(),
            source,
        }
    }
}
