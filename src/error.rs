use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQL parsing error: {0}")]
    SqlParse(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Lock timeout")]
    LockTimeout,

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Deadlock detected")]
    Deadlock,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Backup error: {0}")]
    BackupError(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Replication error: {0}")]
    Replication(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    #[error("Transaction error: {0}")]
    TransactionError(String),

    #[error("Limit exceeded: {0}")]
    LimitExceeded(String),

    #[error("IO error: {0}")]
    IOError(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Cluster error: {0}")]
    Cluster(String),

    #[error("Buffer error: {0}")]
    Buffer(String),

    #[error("SIMD error: {0}")]
    Simd(String),

    #[error("Concurrent operation error: {0}")]
    Concurrent(String),

    #[error("Circuit breaker open: {0}")]
    CircuitBreakerOpen(String),

    #[error("Bulkhead full: {0}")]
    BulkheadFull(String),

    #[error("Security error: {0}")]
    Security(String),

    #[error("Injection attempt detected: {0}")]
    InjectionAttempt(String),

    #[error("Invalid request")]
    InvalidRequest,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Page not found: {0}")]
    PageNotFound(String),

    #[error("Other error: {0}")]
    Other(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Authorization error: {0}")]
    Authorization(String),

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("Recovery error: {0}")]
    Recovery(String),

    #[error("Memory error: {0}")]
    Memory(String),

    #[error("Corruption error: {0}")]
    CorruptionError(String),

    #[error("Deadlock detected: {0}")]
    DeadlockDetected(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    // --- cluster control-plane error kinds (see SPEC_FULL.md §7) ---
    #[error("programmer error: {0}")]
    ProgrammerError(String),

    #[error("prerequisite check failed ({code:?}): {0}", code = .0 .0)]
    OpPrereqError(PrereqCode, String),

    #[error("operation failed during execution: {0}")]
    OpExecError(String),

    #[error("opcode retry requested: {0}")]
    OpRetryError(String),

    #[error("unknown opcode: {0}")]
    OpCodeUnknown(String),

    #[error("hooks aborted: {0} failure(s)")]
    HooksAbort(Vec<HookFailure>),

    #[error("hooks communication failure: {0}")]
    HooksFailure(String),

    #[error("lock manager error: {0}")]
    GanetiLockError(String),

    #[error("job queue full (limit {0})")]
    JobQueueFull(usize),

    #[error("job queue is draining")]
    JobQueueDrainError,

    #[error("job queue error: {0}")]
    JobQueueError(String),

    #[error("job {0} lost")]
    JobLost(u64),

    #[error("hypervisor error: {0}")]
    HypervisorError(String),

    #[error("block device error: {0}")]
    BlockDeviceError(String),

    #[error("address pool error: {0}")]
    AddressPoolError(String),

    #[error("resolver error: {0}")]
    ResolverError(String),

    #[error("tag error: {0}")]
    TagError(String),

    #[error("unit parse error: {0}")]
    UnitParseError(String),

    #[error("signature error: {0}")]
    SignatureError(String),

    #[error("confd magic mismatch")]
    ConfdMagicError,

    #[error("quit: {0}")]
    QuitGanetiException(String),
}

/// `OpPrereqError` error codes, carried alongside the message so the
/// client side can switch on them without parsing strings (mirrors
/// ECODE_* in the original sources).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PrereqCode {
    Inval,
    NoEnt,
    Exists,
    State,
    Environ,
    NoRes,
    Resolver,
    Fault,
    NotUnique,
}

/// One hook script's outcome, attached to a `HooksAbort`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct HookFailure {
    pub node: String,
    pub script: String,
    pub output: String,
}

impl DbError {
    pub fn prereq(code: PrereqCode, msg: impl Into<String>) -> Self {
        DbError::OpPrereqError(code, msg.into())
    }
}

/// Wire shape for re-raising a `DbError` across LUXI/RAPI/RPC boundaries
/// as `(class-name, args)`, the way the original re-instantiates a
/// `GenericError` subclass on the client side from its encoded form.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EncodedError {
    pub class: String,
    pub args: serde_json::Value,
}

impl DbError {
    pub fn encode(&self) -> EncodedError {
        let (class, args) = match self {
            DbError::ProgrammerError(m) => ("ProgrammerError", serde_json::json!([m])),
            DbError::Configuration(m) => ("ConfigurationError", serde_json::json!([m])),
            DbError::OpPrereqError(code, m) => {
                ("OpPrereqError", serde_json::json!([m, code]))
            }
            DbError::OpExecError(m) => ("OpExecError", serde_json::json!([m])),
            DbError::OpRetryError(m) => ("OpRetryError", serde_json::json!([m])),
            DbError::HooksAbort(fails) => ("HooksAbort", serde_json::json!([fails])),
            DbError::HooksFailure(m) => ("HooksFailure", serde_json::json!([m])),
            DbError::GanetiLockError(m) => ("LockError", serde_json::json!([m])),
            DbError::JobQueueFull(n) => ("JobQueueFull", serde_json::json!([n])),
            DbError::JobQueueDrainError => ("JobQueueDrainError", serde_json::json!([])),
            DbError::JobQueueError(m) => ("JobQueueError", serde_json::json!([m])),
            DbError::HypervisorError(m) => ("HypervisorError", serde_json::json!([m])),
            DbError::BlockDeviceError(m) => ("BlockDeviceError", serde_json::json!([m])),
            DbError::AddressPoolError(m) => ("AddressPoolError", serde_json::json!([m])),
            DbError::ResolverError(m) => ("ResolverError", serde_json::json!([m])),
            DbError::TagError(m) => ("TagError", serde_json::json!([m])),
            DbError::UnitParseError(m) => ("UnitParseError", serde_json::json!([m])),
            DbError::SignatureError(m) => ("SignatureError", serde_json::json!([m])),
            DbError::ConfdMagicError => ("ConfdMagicError", serde_json::json!([])),
            DbError::QuitGanetiException(m) => ("QuitGanetiException", serde_json::json!([m])),
            other => ("GenericError", serde_json::json!([other.to_string()])),
        };
        EncodedError { class: class.to_string(), args }
    }
}

impl DbError {
    pub(crate) fn not_supported(p0: String) -> DbError {
        DbError::NotImplemented(p0)
    }
}

impl Clone for DbError {
    fn clone(&self) -> Self {
        match self {
            DbError::Io(e) => DbError::IoError(e.to_string()),
            DbError::SqlParse(s) => DbError::SqlParse(s.clone()),
            DbError::Transaction(s) => DbError::Transaction(s.clone()),
            DbError::Storage(s) => DbError::Storage(s.clone()),
            DbError::Catalog(s) => DbError::Catalog(s.clone()),
            DbError::Index(s) => DbError::Index(s.clone()),
            DbError::Execution(s) => DbError::Execution(s.clone()),
            DbError::Network(s) => DbError::Network(s.clone()),
            DbError::Serialization(s) => DbError::Serialization(s.clone()),
            DbError::LockTimeout => DbError::LockTimeout,
            DbError::LockError(s) => DbError::LockError(s.clone()),
            DbError::Unavailable(s) => DbError::Unavailable(s.clone()),
            DbError::Deadlock => DbError::Deadlock,
            DbError::NotFound(s) => DbError::NotFound(s.clone()),
            DbError::AlreadyExists(s) => DbError::AlreadyExists(s.clone()),
            DbError::InvalidInput(s) => DbError::InvalidInput(s.clone()),
            DbError::InvalidOperation(s) => DbError::InvalidOperation(s.clone()),
            DbError::NotImplemented(s) => DbError::NotImplemented(s.clone()),
            DbError::Internal(s) => DbError::Internal(s.clone()),
            DbError::Validation(s) => DbError::Validation(s.clone()),
            DbError::BackupError(s) => DbError::BackupError(s.clone()),
            DbError::Runtime(s) => DbError::Runtime(s.clone()),
            DbError::Replication(s) => DbError::Replication(s.clone()),
            DbError::InvalidArgument(s) => DbError::InvalidArgument(s.clone()),
            DbError::ResourceExhausted(s) => DbError::ResourceExhausted(s.clone()),
            DbError::SerializationError(s) => DbError::SerializationError(s.clone()),
            DbError::Encryption(s) => DbError::Encryption(s.clone()),
            DbError::IoError(s) => DbError::IoError(s.clone()),
            DbError::OutOfMemory(s) => DbError::OutOfMemory(s.clone()),
            DbError::TransactionError(s) => DbError::TransactionError(s.clone()),
            DbError::LimitExceeded(s) => DbError::LimitExceeded(s.clone()),
            DbError::IOError(s) => DbError::IOError(s.clone()),
            DbError::Configuration(s) => DbError::Configuration(s.clone()),
            DbError::PermissionDenied(s) => DbError::PermissionDenied(s.clone()),
            DbError::Timeout(s) => DbError::Timeout(s.clone()),
            DbError::Cluster(s) => DbError::Cluster(s.clone()),
            DbError::Buffer(s) => DbError::Buffer(s.clone()),
            DbError::Simd(s) => DbError::Simd(s.clone()),
            DbError::Concurrent(s) => DbError::Concurrent(s.clone()),
            DbError::CircuitBreakerOpen(s) => DbError::CircuitBreakerOpen(s.clone()),
            DbError::BulkheadFull(s) => DbError::BulkheadFull(s.clone()),
            DbError::Security(s) => DbError::Security(s.clone()),
            DbError::InjectionAttempt(s) => DbError::InjectionAttempt(s.clone()),
            DbError::InvalidRequest => DbError::InvalidRequest,
            DbError::InvalidState(s) => DbError::InvalidState(s.clone()),
            DbError::QuotaExceeded(s) => DbError::QuotaExceeded(s.clone()),
            DbError::PageNotFound(s) => DbError::PageNotFound(s.clone()),
            DbError::Other(s) => DbError::Other(s.clone()),
            DbError::Authentication(s) => DbError::Authentication(s.clone()),
            DbError::Authorization(s) => DbError::Authorization(s.clone()),
            DbError::Compression(s) => DbError::Compression(s.clone()),
            DbError::Recovery(s) => DbError::Recovery(s.clone()),
            DbError::Memory(s) => DbError::Memory(s.clone()),
            DbError::CorruptionError(s) => DbError::CorruptionError(s.clone()),
            DbError::DeadlockDetected(s) => DbError::DeadlockDetected(s.clone()),
            DbError::Conflict(s) => DbError::Conflict(s.clone()),
            DbError::ConstraintViolation(s) => DbError::ConstraintViolation(s.clone()),
            DbError::ParseError(s) => DbError::ParseError(s.clone()),
            DbError::ProgrammerError(s) => DbError::ProgrammerError(s.clone()),
            DbError::OpPrereqError(c, s) => DbError::OpPrereqError(*c, s.clone()),
            DbError::OpExecError(s) => DbError::OpExecError(s.clone()),
            DbError::OpRetryError(s) => DbError::OpRetryError(s.clone()),
            DbError::OpCodeUnknown(s) => DbError::OpCodeUnknown(s.clone()),
            DbError::HooksAbort(v) => DbError::HooksAbort(v.clone()),
            DbError::HooksFailure(s) => DbError::HooksFailure(s.clone()),
            DbError::GanetiLockError(s) => DbError::GanetiLockError(s.clone()),
            DbError::JobQueueFull(n) => DbError::JobQueueFull(*n),
            DbError::JobQueueDrainError => DbError::JobQueueDrainError,
            DbError::JobQueueError(s) => DbError::JobQueueError(s.clone()),
            DbError::JobLost(id) => DbError::JobLost(*id),
            DbError::HypervisorError(s) => DbError::HypervisorError(s.clone()),
            DbError::BlockDeviceError(s) => DbError::BlockDeviceError(s.clone()),
            DbError::AddressPoolError(s) => DbError::AddressPoolError(s.clone()),
            DbError::ResolverError(s) => DbError::ResolverError(s.clone()),
            DbError::TagError(s) => DbError::TagError(s.clone()),
            DbError::UnitParseError(s) => DbError::UnitParseError(s.clone()),
            DbError::SignatureError(s) => DbError::SignatureError(s.clone()),
            DbError::ConfdMagicError => DbError::ConfdMagicError,
            DbError::QuitGanetiException(s) => DbError::QuitGanetiException(s.clone()),
        }
    }
}

pub type Result<T> = std::result::Result<T, DbError>;

// Error conversions for common error types

impl From<serde_json::Error> for DbError {
    fn from(e: serde_json::Error) -> Self {
        DbError::Serialization(e.to_string())
    }
}

// Note: bson serde features not enabled, removed conversions
// impl From<bson::ser::Error> for DbError {
//     fn from(e: bson::ser::Error) -> Self {
//         DbError::Serialization(e.to_string())
//     }
// }

// impl From<bson::de::Error> for DbError {
//     fn from(e: bson::de::Error) -> Self {
//         DbError::Serialization(e.to_string())
//     }
// }
