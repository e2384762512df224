//! Cipher and digest name resolution
//!
//! Names follow the openssl command-line tool, so whatever is accepted as
//! `openssl enc -<cipher> -md <digest>` is what a repository is configured
//! with. Lookup is case-insensitive.
//!
//! The tables are built once, lazily, on first lookup, and are never torn
//! down: they live for the rest of the process and are read-only after
//! construction, so concurrent lookups need no locking.

use std::collections::HashMap;
use std::sync::OnceLock;

use digest::DynDigest;

use crate::block::CipherMode;
use crate::engine::{cbc_engine, CipherEngine, EngineError};

pub(crate) type EngineInit = fn(CipherMode, &[u8], &[u8]) -> Result<Box<dyn CipherEngine>, EngineError>;

/// A block cipher the codec can run.
pub struct CipherSpec {
    pub name: &'static str,
    pub key_len: usize,
    pub iv_len: usize,
    pub block_size: usize,
    pub(crate) init: EngineInit,
}

impl CipherSpec {
    /// Initialize an engine with a derived key and IV.
    pub fn engine(
        &self,
        mode: CipherMode,
        key: &[u8],
        iv: &[u8],
    ) -> Result<Box<dyn CipherEngine>, EngineError> {
        (self.init)(mode, key, iv)
    }
}

impl std::fmt::Debug for CipherSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherSpec")
            .field("name", &self.name)
            .field("key_len", &self.key_len)
            .field("iv_len", &self.iv_len)
            .field("block_size", &self.block_size)
            .finish()
    }
}

/// A message digest usable for key derivation.
pub struct DigestSpec {
    pub name: &'static str,
    pub output_len: usize,
    new: fn() -> Box<dyn DynDigest>,
}

impl DigestSpec {
    /// Fresh hasher state.
    pub fn hasher(&self) -> Box<dyn DynDigest> {
        (self.new)()
    }
}

impl std::fmt::Debug for DigestSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DigestSpec")
            .field("name", &self.name)
            .field("output_len", &self.output_len)
            .finish()
    }
}

static CIPHERS: [CipherSpec; 3] = [
    CipherSpec {
        name: "aes-128-cbc",
        key_len: 16,
        iv_len: 16,
        block_size: 16,
        init: cbc_engine::<aes::Aes128>,
    },
    CipherSpec {
        name: "aes-192-cbc",
        key_len: 24,
        iv_len: 16,
        block_size: 16,
        init: cbc_engine::<aes::Aes192>,
    },
    CipherSpec {
        name: "aes-256-cbc",
        key_len: 32,
        iv_len: 16,
        block_size: 16,
        init: cbc_engine::<aes::Aes256>,
    },
];

// openssl aliases: `openssl enc -aes256` is aes-256-cbc
const CIPHER_ALIASES: [(&str, &str); 3] = [
    ("aes128", "aes-128-cbc"),
    ("aes192", "aes-192-cbc"),
    ("aes256", "aes-256-cbc"),
];

fn boxed<D: DynDigest + Default + 'static>() -> Box<dyn DynDigest> {
    Box::new(D::default())
}

static DIGESTS: [DigestSpec; 6] = [
    DigestSpec {
        name: "md5",
        output_len: 16,
        new: boxed::<md5::Md5>,
    },
    DigestSpec {
        name: "sha1",
        output_len: 20,
        new: boxed::<sha1::Sha1>,
    },
    DigestSpec {
        name: "sha224",
        output_len: 28,
        new: boxed::<sha2::Sha224>,
    },
    DigestSpec {
        name: "sha256",
        output_len: 32,
        new: boxed::<sha2::Sha256>,
    },
    DigestSpec {
        name: "sha384",
        output_len: 48,
        new: boxed::<sha2::Sha384>,
    },
    DigestSpec {
        name: "sha512",
        output_len: 64,
        new: boxed::<sha2::Sha512>,
    },
];

/// Digest used when none is configured, matching `openssl enc` before 1.1.0.
pub const DEFAULT_DIGEST: &str = "sha1";

/// Name tables for the supported ciphers and digests.
#[derive(Debug)]
pub struct Backend {
    ciphers: HashMap<String, &'static CipherSpec>,
    digests: HashMap<String, &'static DigestSpec>,
}

static BACKEND: OnceLock<Backend> = OnceLock::new();

/// The process-wide backend, built on first use.
pub fn backend() -> &'static Backend {
    BACKEND.get_or_init(Backend::load)
}

impl Backend {
    fn load() -> Self {
        let mut ciphers: HashMap<String, &'static CipherSpec> =
            CIPHERS.iter().map(|c| (c.name.to_string(), c)).collect();
        for (alias, target) in CIPHER_ALIASES {
            if let Some(spec) = ciphers.get(target).copied() {
                ciphers.insert(alias.to_string(), spec);
            }
        }

        let digests = DIGESTS.iter().map(|d| (d.name.to_string(), d)).collect();

        tracing::debug!(
            ciphers = CIPHERS.len(),
            digests = DIGESTS.len(),
            "cipher backend initialized"
        );

        Self { ciphers, digests }
    }

    /// Look up a cipher by its openssl name.
    pub fn cipher(&self, name: &str) -> Option<&'static CipherSpec> {
        self.ciphers.get(&name.to_ascii_lowercase()).copied()
    }

    /// Look up a digest by its openssl name.
    pub fn digest(&self, name: &str) -> Option<&'static DigestSpec> {
        self.digests.get(&name.to_ascii_lowercase()).copied()
    }

    /// Canonical cipher names, sorted.
    pub fn cipher_names(&self) -> Vec<&'static str> {
        CIPHERS.iter().map(|c| c.name).collect()
    }

    /// Canonical digest names, sorted.
    pub fn digest_names(&self) -> Vec<&'static str> {
        DIGESTS.iter().map(|d| d.name).collect()
    }
}
