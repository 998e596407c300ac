//! Error types for index construction and document traversal

/// Failure while reading a document.
///
/// Every variant carries the byte offset where decoding stopped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("unexpected end of input at offset {offset}")]
    UnexpectedEof { offset: usize },

    #[error("unexpected byte {found:?} at offset {offset}, expected {expected}")]
    UnexpectedByte {
        offset: usize,
        found: char,
        expected: &'static str,
    },

    #[error("mismatched closing {found:?} at offset {offset}")]
    MismatchedClose { offset: usize, found: char },

    #[error("invalid number at offset {offset}")]
    InvalidNumber { offset: usize },

    #[error("invalid string at offset {offset}: {reason}")]
    InvalidString { offset: usize, reason: String },

    #[error("document at offset {offset} is not an object")]
    NotAnObject { offset: usize },

    #[error("nesting deeper than {limit} at offset {offset}")]
    NestingTooDeep { offset: usize, limit: usize },
}

impl DecodeError {
    /// Byte offset into the document where the error was detected
    pub fn offset(&self) -> usize {
        match self {
            DecodeError::UnexpectedEof { offset }
            | DecodeError::UnexpectedByte { offset, .. }
            | DecodeError::MismatchedClose { offset, .. }
            | DecodeError::InvalidNumber { offset }
            | DecodeError::InvalidString { offset, .. }
            | DecodeError::NotAnObject { offset }
            | DecodeError::NestingTooDeep { offset, .. } => *offset,
        }
    }
}

/// Error type for jsift operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A path could not be registered. Raised only while building an index.
    #[error("malformed path {path:?}: {reason}")]
    MalformedPath { path: String, reason: &'static str },

    /// The document does not conform to JSON. Raised only while flattening.
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl Error {
    pub(crate) fn malformed_path(path: &[u8], reason: &'static str) -> Self {
        Error::MalformedPath {
            path: String::from_utf8_lossy(path).into_owned(),
            reason,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
