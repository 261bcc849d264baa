use thiserror::Error;

/// Convenience alias for `Result<T, EsgError>`.
pub type EsgResult<T> = Result<T, EsgError>;

/// Error classification. Decides whether the per-record insert fallback keeps
/// going after a failure, and is reported alongside voided pages.
///
/// - `UserError`: bad input such as a malformed tuple, a constraint violation or bad config
/// - `Transient`: connection loss, timeout or remote 5xx; a later run may succeed
/// - `InternalBug`: should never happen, e.g. using a closed store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UserError,
    Transient,
    InternalBug,
}

/// Top-level error type that all crate-specific errors convert into.
#[derive(Error, Debug)]
pub enum EsgError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Scorer error: {0}")]
    Scorer(#[from] ScorerError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Dump tuple parsing and record mapping failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("expected at least {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },

    #[error("field {position} ({column}): cannot convert '{value}' to a timestamp")]
    InvalidTimestamp {
        position: usize,
        column: &'static str,
        value: String,
    },
}

/// Store read/write failures.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("duplicate id {0}")]
    DuplicateId(i64),

    #[error("record has no usable id")]
    MissingId,

    #[error("query failed: {0}")]
    Query(String),

    #[error("store is closed")]
    Closed,
}

/// External scorer failures.
#[derive(Error, Debug, Clone)]
pub enum ScorerError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("scorer returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed scorer response: {0}")]
    Decode(String),
}

/// Ledger confirmation failures (distinct from a clean "not confirmed").
///
/// `Rpc` covers transport errors, non-2xx replies and JSON-RPC error objects;
/// confirmation polling retries it until its deadline.
#[derive(Error, Debug, Clone)]
pub enum LedgerError {
    #[error("invalid transaction handle '{0}'")]
    InvalidHandle(String),

    #[error("rpc request failed: {0}")]
    Rpc(String),

    #[error("malformed rpc response: {0}")]
    Decode(String),
}

impl EsgError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EsgError::Parse(_) => ErrorKind::UserError,
            EsgError::Config(_) => ErrorKind::UserError,
            EsgError::Store(StoreError::DuplicateId(_)) => ErrorKind::UserError,
            EsgError::Store(StoreError::MissingId) => ErrorKind::UserError,
            EsgError::Store(StoreError::Connection(_)) => ErrorKind::Transient,
            EsgError::Store(StoreError::Query(_)) => ErrorKind::Transient,
            EsgError::Store(StoreError::Closed) => ErrorKind::InternalBug,
            EsgError::Scorer(ScorerError::Status { status, .. }) if *status < 500 => {
                ErrorKind::UserError
            }
            EsgError::Scorer(_) => ErrorKind::Transient,
            EsgError::Ledger(LedgerError::InvalidHandle(_)) => ErrorKind::UserError,
            EsgError::Ledger(_) => ErrorKind::Transient,
            EsgError::Io(_) => ErrorKind::Transient,
        }
    }
}
