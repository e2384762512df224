//! Codec error types.
//!
//! Errors fall into two categories. Configuration errors come only from
//! construction and mean the cipher or digest name is wrong; the caller must
//! fix its settings. Data errors come from `process`/`flush` and mean the
//! stream itself is not something we can decode.

use thiserror::Error;

/// Error category, see [`CipherError::kind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Data,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CipherError {
    /// Cipher name did not resolve (an empty name never does).
    #[error("unable to load cipher '{0}'")]
    UnknownCipher(String),

    /// Digest name did not resolve.
    #[error("unable to load digest '{0}'")]
    UnknownDigest(String),

    /// Decipher input does not start with `Salted__`.
    #[error("cipher header missing")]
    HeaderMissing,

    /// The engine could not be initialized or rejected an update.
    #[error("unable to process")]
    Process,

    /// Finalization failed: bad padding, corrupted or truncated ciphertext.
    #[error("unable to flush")]
    Flush,
}

impl CipherError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CipherError::UnknownCipher(_) | CipherError::UnknownDigest(_) => ErrorKind::Config,
            CipherError::HeaderMissing | CipherError::Process | CipherError::Flush => {
                ErrorKind::Data
            }
        }
    }

    pub fn is_config(&self) -> bool {
        self.kind() == ErrorKind::Config
    }
}
