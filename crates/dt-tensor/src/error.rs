use thiserror::Error;

#[derive(Error, Debug)]
pub enum TensorError {
    /// A caller broke a precondition of this layer (shape mismatch on cast,
    /// reshape of a non-contiguous tensor, unsupported dtype/device pairing).
    #[error("contract violation: {0}")]
    ContractViolation(String),
    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch { expected: Vec<usize>, got: Vec<usize> },
    #[error("cannot broadcast shapes {a:?} and {b:?}")]
    BroadcastError { a: Vec<usize>, b: Vec<usize> },
    #[error("allocation of {nbytes} bytes on {device} failed: {reason}")]
    AllocationFailed {
        nbytes: usize,
        device: String,
        reason: String,
    },
    #[error("copy failed: {0}")]
    CopyFailed(String),
    #[error("unknown buffer handle {0}")]
    InvalidHandle(u64),
    #[error("backend rejected instruction {instruction}: {reason}")]
    Backend { instruction: String, reason: String },
    #[error("{0}")]
    Other(String),
}

impl TensorError {
    /// True for errors that signal a caller bug rather than an environment failure.
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, TensorError::ContractViolation(_))
    }
}

pub type Result<T> = std::result::Result<T, TensorError>;
