use std::path::PathBuf;
use thiserror::Error;

use crate::server::ApiError;

/// Why a transfer did not produce a complete file
#[derive(Error, Debug)]
pub enum TransferError {
    /// Request could not be sent or the server refused it
    #[error(transparent)]
    Request(#[from] ApiError),

    /// Connection dropped or timed out while reading the body
    #[error("Failed to read response body: {0}")]
    Body(String),

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Body ended before the declared length was received
    #[error("Transfer ended after {received} of {expected} bytes")]
    Incomplete { received: u64, expected: u64 },
}

impl TransferError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = TransferError::from(ApiError::from_status(500, "boom".to_string()));
        assert_eq!(err.to_string(), "Server error: boom (status: 500)");

        let err = TransferError::Incomplete {
            received: 10,
            expected: 20,
        };
        assert_eq!(err.to_string(), "Transfer ended after 10 of 20 bytes");
    }
}
