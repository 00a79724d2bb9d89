//! Error types for rampart.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for rampart operations.
///
/// Configuration errors surface while rules are built and added; evaluation
/// never returns them. Host-facing errors (buffer limits, I/O) surface from
/// the transaction API.
#[derive(Debug, Error)]
pub enum Error {
    /// Error compiling a regex pattern.
    #[error("invalid regex pattern '{pattern}': {source}")]
    RegexCompile {
        /// The pattern that failed to compile.
        pattern: String,
        /// Underlying regex error.
        #[source]
        source: regex::Error,
    },

    /// Error compiling an Aho-Corasick pattern set.
    #[error("invalid pattern set: {message}")]
    PatternSet {
        /// Error message.
        message: String,
    },

    /// Error parsing an IP address or network.
    #[error("invalid IP address or network '{value}': {message}")]
    InvalidIp {
        /// The value that failed to parse.
        value: String,
        /// Error message.
        message: String,
    },

    /// Unknown variable name.
    #[error("unknown variable: {name}")]
    UnknownVariable {
        /// The unknown variable name.
        name: String,
    },

    /// Unknown operator name.
    #[error("unknown operator: @{name}")]
    UnknownOperator {
        /// The unknown operator name.
        name: String,
    },

    /// Unknown transformation name.
    #[error("unknown transformation: t:{name}")]
    UnknownTransformation {
        /// The unknown transformation name.
        name: String,
    },

    /// Unknown action name.
    #[error("unknown action: {name}")]
    UnknownAction {
        /// The unknown action name.
        name: String,
    },

    /// Named dataset was not provided to the operator.
    #[error("dataset not found: {name}")]
    DatasetNotFound {
        /// The missing dataset name.
        name: String,
    },

    /// Invalid action argument.
    #[error("invalid argument for action '{action}': {message}")]
    InvalidActionArgument {
        /// The action name.
        action: String,
        /// Error message.
        message: String,
    },

    /// Invalid operator argument.
    #[error("invalid argument for operator @{operator}: {message}")]
    InvalidOperatorArgument {
        /// The operator name.
        operator: String,
        /// Error message.
        message: String,
    },

    /// Error compiling an expansion template.
    #[error("invalid macro '{template}': {message}")]
    MacroSyntax {
        /// The template that failed to compile.
        template: String,
        /// Error message.
        message: String,
    },

    /// Duplicate rule ID.
    #[error("duplicate rule id: {id}")]
    DuplicateRuleId {
        /// The duplicate ID.
        id: u32,
    },

    /// Error loading an operator data file.
    #[error("failed to load data file {path}: {source}")]
    FileLoad {
        /// Path to the file that failed to load.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A body write would exceed the configured hard limit.
    #[error("body limit reached: {limit} bytes")]
    BodyLimitReached {
        /// The configured limit.
        limit: u64,
    },

    /// A body write would exceed the in-memory limit and no filesystem
    /// spill directory is available.
    #[error("body memory limit reached: {limit} bytes")]
    BodyMemoryLimitReached {
        /// The configured in-memory limit.
        limit: u64,
    },

    /// A body write would overflow the 64-bit length counter.
    #[error("body size counter overflow")]
    BodySizeOverflow,

    /// One or more failures while releasing buffer resources.
    /// Resources are released as far as possible before this is returned.
    #[error("buffer release failed: {}", messages.join("; "))]
    BufferRelease {
        /// Individual failure messages, in the order they occurred.
        messages: Vec<String>,
    },

    /// A host call arrived in an order the transaction cannot honour,
    /// e.g. a body write after the body phase already ran.
    #[error("transaction state error: {message}")]
    TransactionState {
        /// What the host did wrong.
        message: String,
    },

    /// I/O error from a body buffer or reader.
    #[error("body I/O error: {source}")]
    Io {
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config {
        /// Error message.
        message: String,
    },
}

impl Error {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a transaction-state error.
    pub fn state(message: impl Into<String>) -> Self {
        Self::TransactionState {
            message: message.into(),
        }
    }

    /// Create an invalid-action-argument error.
    pub fn action_argument(action: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidActionArgument {
            action: action.into(),
            message: message.into(),
        }
    }

    /// Create an invalid-operator-argument error.
    pub fn operator_argument(operator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidOperatorArgument {
            operator: operator.into(),
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Self::Io { source }
    }
}
