//! sbk-crypto: streaming block cipher for sbk repositories
//!
//! Output is byte-compatible with `openssl enc -salt`:
//! ```text
//! offset 0   8 bytes   magic "Salted__"
//! offset 8   8 bytes   random salt
//! offset 16  N bytes   CBC ciphertext, PKCS#7 padded
//! ```
//!
//! Key and IV come from the legacy `EVP_BytesToKey` scheme (one iteration,
//! SHA-1 unless another digest is configured), which is what the openssl
//! command-line tool uses without `-pbkdf2`.
//!
//! Pipeline: caller chunk → [`CipherBlock::process`] → ... → [`CipherBlock::flush`]

pub mod backend;
pub mod block;
pub mod engine;
pub mod error;
pub mod io;
pub mod kdf;
pub mod random;

pub use backend::{backend, Backend, CipherSpec, DigestSpec};
pub use block::{CipherBlock, CipherMode};
pub use error::{CipherError, ErrorKind};
pub use io::{cipher_copy, CipherIoError, CipherWriter, CopyStats};
pub use kdf::{bytes_to_key, DerivedKey};
pub use random::{random_bytes, OsRandom, RandomSource};

/// Magic prefix written by `openssl enc` when a salt is used
pub const MAGIC: &[u8; MAGIC_SIZE] = b"Salted__";

/// Size of the magic prefix in bytes
pub const MAGIC_SIZE: usize = 8;

/// Size of the salt in bytes (PKCS5_SALT_LEN)
pub const SALT_SIZE: usize = 8;

/// Total header size: magic + salt
pub const HEADER_SIZE: usize = MAGIC_SIZE + SALT_SIZE;

/// Largest block size of any supported cipher (EVP_MAX_BLOCK_LENGTH)
pub const MAX_BLOCK_LEN: usize = 32;
