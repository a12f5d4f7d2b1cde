use thiserror::Error;

/// Errors surfaced to callers. Absent data is never an error: those cases
/// come back as `None` or a non-resolved [`crate::Lookup`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("invalid storage path: {path:?}")]
    InvalidPath { path: String },

    #[error("{operation} failed on {path} (os error {code})")]
    Os {
        operation: &'static str,
        code: u32,
        path: String,
    },

    #[error("control code {control_code:#010x} on {path} still short of buffer at {size} bytes")]
    BufferLimit {
        control_code: u32,
        size: usize,
        path: String,
    },

    #[error("{structure} from {path} is truncated: needed {needed} bytes, got {got}")]
    Truncated {
        structure: &'static str,
        needed: usize,
        got: usize,
        path: String,
    },
}

impl Error {
    /// The raw OS status code, when the error came from the OS.
    pub fn os_code(&self) -> Option<u32> {
        match self {
            Error::Os { code, .. } => Some(*code),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
