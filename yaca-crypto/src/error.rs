#![forbid(unsafe_code)]

use thiserror::Error;

/// Convenient Result alias for this crate.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Coarse classification every engine failure maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad argument, unsupported combination or misuse of a context.
    InvalidParameter,
    /// An allocation could not be satisfied.
    OutOfMemory,
    /// Unexpected failure inside a primitive.
    Internal,
    /// Password missing, superfluous or wrong while decoding a key.
    InvalidPassword,
    /// Authentication or integrity check failed.
    DataMismatch,
}

/// Error type for every engine operation.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid parameter: {0}")]
    /// Bad argument or unsupported combination
    InvalidParameter(String),
    #[error("out of memory")]
    /// Allocation failure
    OutOfMemory,
    #[error("internal error: {0}")]
    /// Primitive failed unexpectedly
    Internal(String),
    #[error("invalid password")]
    /// Wrong or missing password for an encrypted key blob
    InvalidPassword,
    #[error("data mismatch: {0}")]
    /// Tag, padding or signature verification failed
    DataMismatch(String),
    #[error("config: {0}")]
    /// Engine configuration could not be loaded or validated
    Config(String),
}

impl Error {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
    pub fn mismatch(msg: impl Into<String>) -> Self {
        Self::DataMismatch(msg.into())
    }
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Classification of this error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidParameter(_) | Self::Config(_) => ErrorKind::InvalidParameter,
            Self::OutOfMemory => ErrorKind::OutOfMemory,
            Self::Internal(_) => ErrorKind::Internal,
            Self::InvalidPassword => ErrorKind::InvalidPassword,
            Self::DataMismatch(_) => ErrorKind::DataMismatch,
        }
    }
}

impl From<std::collections::TryReserveError> for Error {
    fn from(_: std::collections::TryReserveError) -> Self {
        Self::OutOfMemory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_classify_as_invalid_parameter() {
        assert_eq!(Error::config("bad").kind(), ErrorKind::InvalidParameter);
        assert_eq!(Error::mismatch("tag").kind(), ErrorKind::DataMismatch);
    }

    #[test]
    fn reserve_failure_maps_to_out_of_memory() {
        let mut v: Vec<u8> = Vec::new();
        let err = v.try_reserve(usize::MAX).map_err(Error::from);
        assert!(matches!(err, Err(Error::OutOfMemory)));
    }
}
