//! Error types surfaced by extraction and decryption.

use pagecipher::CipherError;
use thiserror::Error;

/// Errors that can occur while extracting keys or decrypting databases.
///
/// Key *validation* never produces these: a candidate that does not
/// authenticate is a plain `false` inside the search loop.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// The target client process is not running.
    #[error("target process is not running")]
    ProcessOffline,

    /// Memory reads are blocked by OS integrity protection.
    #[error("host integrity protection is enabled; memory of the target process cannot be read")]
    HostIntegrityEnabled,

    /// The search engine was started without a validator.
    #[error("no validator configured for key search")]
    ValidatorNotSet,

    /// The search ran to completion without a confirmed key.
    #[error("memory search finished without a valid key")]
    NoValidKey,

    /// Extraction patterns exist only for version 4 clients.
    #[error("key extraction is not supported for version {0} clients; supply data_key instead")]
    UnsupportedProfile(u8),

    /// A required configuration value was absent.
    #[error("missing required configuration: {0}")]
    MissingConfig(&'static str),

    /// A configuration value did not parse.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A key string did not parse as hex or as a derived-key list.
    #[error("malformed key string: {0}")]
    MalformedKey(String),

    /// The pipeline was cancelled before a result was produced.
    #[error("search cancelled")]
    Cancelled,

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Page-cipher failure bubbled up from decryption.
    #[error(transparent)]
    Cipher(#[from] CipherError),
}

/// Result type for extraction operations.
pub type ExtractResult<T> = Result<T, ExtractError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cipher_error_converts() {
        let err: ExtractError = CipherError::bad_auth(1).into();
        assert!(matches!(err, ExtractError::Cipher(CipherError::BadAuth { page_no: 1 })));
    }

    #[test]
    fn test_unsupported_profile_display() {
        let err = ExtractError::UnsupportedProfile(3);
        assert!(err.to_string().contains("version 3"));
    }
}
