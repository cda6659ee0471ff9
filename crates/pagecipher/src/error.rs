//! Error types for page-level cryptography.

use thiserror::Error;

/// Errors produced while opening or decrypting page-encrypted databases.
///
/// Validation APIs never return these: a key that does not authenticate is a
/// plain `false`, not an error. `BadAuth` is reserved for *decryption* of a
/// page that was expected to authenticate.
#[derive(Error, Debug)]
pub enum CipherError {
    /// HMAC verification failed on a page under decryption.
    #[error("page {page_no} failed HMAC verification")]
    BadAuth { page_no: u32 },

    /// Input to the block cipher had an impossible shape.
    #[error("bad cipher input: {0}")]
    BadCipherInput(String),

    /// The file ended before a whole first page could be read.
    #[error("short file '{path}': got {got} bytes, need {need}")]
    ShortFile {
        path: String,
        got: usize,
        need: usize,
    },

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CipherError {
    /// Create a BadAuth error for the given 1-based page number.
    pub fn bad_auth(page_no: u32) -> Self {
        CipherError::BadAuth { page_no }
    }

    /// Create a BadCipherInput error.
    pub fn bad_input(msg: impl Into<String>) -> Self {
        CipherError::BadCipherInput(msg.into())
    }

    /// Create a ShortFile error.
    pub fn short_file(path: impl Into<String>, got: usize, need: usize) -> Self {
        CipherError::ShortFile {
            path: path.into(),
            got,
            need,
        }
    }
}

/// Result type for page cipher operations.
pub type CipherResult<T> = Result<T, CipherError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_auth_display() {
        let err = CipherError::bad_auth(7);
        assert!(err.to_string().contains("page 7"));
    }

    #[test]
    fn test_short_file_display() {
        let err = CipherError::short_file("/tmp/x.db", 100, 4096);
        assert!(err.to_string().contains("100"));
        assert!(err.to_string().contains("4096"));
    }
}
