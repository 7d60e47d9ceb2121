//! Error types for SqlMapper operations.

use std::fmt;

/// The primary error type for all SqlMapper operations.
#[derive(Debug)]
pub enum Error {
    /// Executor usage errors (operating on a closed executor, bad call sequences)
    Executor(ExecutorError),
    /// Cache coordination errors (lock timeout, unheld release, adapter failures)
    Cache(CacheError),
    /// Dynamic SQL evaluation errors
    Script(ScriptError),
    /// Configuration-shape errors
    Config(ConfigError),
    /// Type conversion errors
    Type(TypeError),
    /// Backing-store failures
    Store(StoreError),
    /// Transaction resource errors
    Transaction(TransactionError),
    /// Custom error with message
    Custom(String),
}

#[derive(Debug)]
pub struct ExecutorError {
    pub kind: ExecutorErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorErrorKind {
    /// The executor has been closed; all operations fail fast
    Closed,
    /// A call violated the executor contract
    Usage,
}

#[derive(Debug)]
pub struct CacheError {
    pub kind: CacheErrorKind,
    pub cache_id: String,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheErrorKind {
    /// Waiting for a per-key lock exceeded the configured bound
    LockTimeout,
    /// A key lock was released without having been acquired
    UnheldRelease,
    /// The underlying cache adapter misbehaved
    Adapter,
}

#[derive(Debug)]
pub struct ScriptError {
    pub kind: ScriptErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptErrorKind {
    /// A conditional test did not evaluate to a boolean
    NotBoolean,
    /// An iteration subject did not evaluate to a collection
    NotIterable,
    /// A fragment reference names an unregistered fragment
    UnknownFragment,
    /// Registering a fragment would create a reference cycle
    FragmentCycle,
    /// A placeholder token is malformed
    Placeholder,
    /// A property path could not be applied to the target value
    Property,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

/// Conversion failure between a [`crate::Value`] and an expected shape.
#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

#[derive(Debug)]
pub struct StoreError {
    /// Statement id being executed when the store failed, if known
    pub statement: Option<String>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug)]
pub struct TransactionError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Usage error for an operation on a closed executor.
    pub fn closed(what: &str) -> Self {
        Error::Executor(ExecutorError {
            kind: ExecutorErrorKind::Closed,
            message: format!("executor was closed: {what}"),
        })
    }

    /// Generic executor contract violation.
    pub fn usage(message: impl Into<String>) -> Self {
        Error::Executor(ExecutorError {
            kind: ExecutorErrorKind::Usage,
            message: message.into(),
        })
    }

    /// Configuration-shape error.
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(ConfigError {
            message: message.into(),
            source: None,
        })
    }

    /// Backing-store failure for the given statement.
    pub fn store(statement: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Store(StoreError {
            statement: Some(statement.into()),
            message: message.into(),
            source: None,
        })
    }

    /// Is this a blocking-cache lock timeout?
    ///
    /// Lock timeouts are a distinct, catchable condition: the caller may
    /// retry while the lock stays with whichever party completes first.
    pub fn is_lock_timeout(&self) -> bool {
        matches!(
            self,
            Error::Cache(c) if c.kind == CacheErrorKind::LockTimeout
        )
    }

    /// Is this a fatal usage error (closed executor, unheld lock release)?
    pub fn is_usage(&self) -> bool {
        match self {
            Error::Executor(_) => true,
            Error::Cache(c) => c.kind == CacheErrorKind::UnheldRelease,
            _ => false,
        }
    }
}

impl ScriptError {
    pub fn new(kind: ScriptErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Executor(e) => write!(f, "Executor error: {}", e.message),
            Error::Cache(e) => write!(f, "Cache error [{}]: {}", e.cache_id, e.message),
            Error::Script(e) => write!(f, "Script error: {}", e.message),
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Type(e) => {
                if let Some(col) = &e.column {
                    write!(
                        f,
                        "Type error in column '{}': expected {}, found {}",
                        col, e.expected, e.actual
                    )
                } else {
                    write!(f, "Type error: expected {}, found {}", e.expected, e.actual)
                }
            }
            Error::Store(e) => {
                if let Some(stmt) = &e.statement {
                    write!(f, "Store error executing '{}': {}", stmt, e.message)
                } else {
                    write!(f, "Store error: {}", e.message)
                }
            }
            Error::Transaction(e) => write!(f, "Transaction error: {}", e.message),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Cache(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Store(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Transaction(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl fmt::Display for ExecutorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for TransactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<ExecutorError> for Error {
    fn from(err: ExecutorError) -> Self {
        Error::Executor(err)
    }
}

impl From<CacheError> for Error {
    fn from(err: CacheError) -> Self {
        Error::Cache(err)
    }
}

impl From<ScriptError> for Error {
    fn from(err: ScriptError) -> Self {
        Error::Script(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        Error::Store(err)
    }
}

impl From<TransactionError> for Error {
    fn from(err: TransactionError) -> Self {
        Error::Transaction(err)
    }
}

/// Result type alias for SqlMapper operations.
pub type Result<T> = std::result::Result<T, Error>;
