//! Key derivation: passphrase + salt → cipher key and IV
//!
//! This is OpenSSL's `EVP_BytesToKey` with an iteration count of one:
//!
//! ```text
//! D_1 = H(key || salt)
//! D_i = H(D_{i-1} || key || salt)
//! key || iv = D_1 || D_2 || ...   (truncated)
//! ```
//!
//! It is weak by modern standards but it is what `openssl enc` without
//! `-pbkdf2` uses, so existing repositories can only be read with it.

use zeroize::Zeroizing;

use crate::backend::{CipherSpec, DigestSpec};

/// Cipher key and IV derived from a passphrase. Zeroized on drop.
pub struct DerivedKey {
    pub key: Zeroizing<Vec<u8>>,
    pub iv: Zeroizing<Vec<u8>>,
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("key", &"[REDACTED]")
            .field("iv", &"[REDACTED]")
            .finish()
    }
}

/// Derive the key and IV for `cipher` from `key` and `salt` using `digest`.
pub fn bytes_to_key(
    cipher: &CipherSpec,
    digest: &DigestSpec,
    salt: &[u8],
    key: &[u8],
) -> DerivedKey {
    let needed = cipher.key_len + cipher.iv_len;
    let mut material = Zeroizing::new(Vec::with_capacity(needed + digest.output_len));
    let mut hasher = digest.hasher();
    let mut prev: Zeroizing<Box<[u8]>> = Zeroizing::new(Box::default());

    while material.len() < needed {
        hasher.update(&prev);
        hasher.update(key);
        hasher.update(salt);
        prev = Zeroizing::new(hasher.finalize_reset());
        material.extend_from_slice(&prev);
    }

    DerivedKey {
        key: Zeroizing::new(material[..cipher.key_len].to_vec()),
        iv: Zeroizing::new(material[cipher.key_len..needed].to_vec()),
    }
}
