//! Block cipher codec: encipher/decipher a stream in caller-sized chunks
//!
//! One [`CipherBlock`] handles one stream in one direction. Feed it every
//! chunk in order with [`CipherBlock::process`], call [`CipherBlock::flush`]
//! once at the end, then drop it.
//!
//! The salt and the cipher engine are set up lazily by the first call that
//! carries data. On encipher that call also writes the header; on decipher
//! the header is collected from however many calls it takes to arrive.

use zeroize::Zeroizing;

use crate::backend::{backend, CipherSpec, DigestSpec, DEFAULT_DIGEST};
use crate::engine::CipherEngine;
use crate::error::CipherError;
use crate::kdf::bytes_to_key;
use crate::random::{OsRandom, RandomSource};
use crate::{HEADER_SIZE, MAGIC, MAGIC_SIZE, MAX_BLOCK_LEN, SALT_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherMode {
    Encipher,
    Decipher,
}

/// Partially received decipher header.
#[derive(Debug, Default)]
struct HeaderBuffer {
    bytes: [u8; HEADER_SIZE],
    filled: usize,
}

impl HeaderBuffer {
    /// Copy as much of `source` as still fits, returning how many bytes were taken.
    fn fill_from(&mut self, source: &[u8]) -> usize {
        let take = source.len().min(HEADER_SIZE - self.filled);
        self.bytes[self.filled..self.filled + take].copy_from_slice(&source[..take]);
        self.filled += take;
        take
    }

    fn is_complete(&self) -> bool {
        self.filled == HEADER_SIZE
    }

    /// False once all of the magic has arrived and does not match.
    fn magic_ok(&self) -> bool {
        self.filled < MAGIC_SIZE || self.bytes[..MAGIC_SIZE] == MAGIC[..]
    }

    fn salt(&self) -> &[u8] {
        &self.bytes[MAGIC_SIZE..]
    }
}

pub struct CipherBlock {
    mode: CipherMode,
    cipher: &'static CipherSpec,
    digest: &'static DigestSpec,
    key: Zeroizing<Vec<u8>>,
    salt_done: bool,
    process_done: bool,
    header: HeaderBuffer,
    // Some iff salt_done
    engine: Option<Box<dyn CipherEngine>>,
    random: Box<dyn RandomSource>,
}

impl CipherBlock {
    /// Create a codec for one stream.
    ///
    /// `cipher_name` and `digest_name` are openssl names such as
    /// `aes-256-cbc` and `sha256`; the digest defaults to SHA-1. Fails with a
    /// configuration error when either name is unknown.
    pub fn new(
        mode: CipherMode,
        cipher_name: &str,
        key: &[u8],
        digest_name: Option<&str>,
    ) -> Result<Self, CipherError> {
        Self::with_random(mode, cipher_name, key, digest_name, Box::new(OsRandom))
    }

    /// Like [`CipherBlock::new`] but drawing the salt from `random`.
    pub fn with_random(
        mode: CipherMode,
        cipher_name: &str,
        key: &[u8],
        digest_name: Option<&str>,
        random: Box<dyn RandomSource>,
    ) -> Result<Self, CipherError> {
        let cipher = backend()
            .cipher(cipher_name)
            .ok_or_else(|| CipherError::UnknownCipher(cipher_name.to_string()))?;

        let digest_name = digest_name.unwrap_or(DEFAULT_DIGEST);
        let digest = backend()
            .digest(digest_name)
            .ok_or_else(|| CipherError::UnknownDigest(digest_name.to_string()))?;

        Ok(Self {
            mode,
            cipher,
            digest,
            key: Zeroizing::new(key.to_vec()),
            salt_done: false,
            process_done: false,
            header: HeaderBuffer::default(),
            engine: None,
            random,
        })
    }

    /// Upper bound on the output of a `process` call fed `source_len` bytes.
    ///
    /// Holds for every call, not just the first, so a buffer sized once
    /// with this can be reused for the whole stream.
    pub fn process_size(&self, source_len: usize) -> usize {
        source_len + MAX_BLOCK_LEN + HEADER_SIZE
    }

    /// Encipher/decipher `source`, appending the result to `destination`.
    ///
    /// Returns the number of bytes appended, which may be zero: the engine
    /// buffers partial blocks, and on decipher the header is consumed
    /// without producing output.
    pub fn process(
        &mut self,
        mut source: &[u8],
        destination: &mut Vec<u8>,
    ) -> Result<usize, CipherError> {
        if source.is_empty() {
            return Ok(0);
        }

        let start = destination.len();

        if !self.salt_done {
            let mut salt = [0u8; SALT_SIZE];

            match self.mode {
                CipherMode::Encipher => self.random.fill_random(&mut salt),
                CipherMode::Decipher => {
                    // Stage a copy so a bad magic leaves the buffer untouched
                    let mut header = HeaderBuffer {
                        bytes: self.header.bytes,
                        filled: self.header.filled,
                    };
                    let taken = header.fill_from(source);

                    if !header.magic_ok() {
                        return Err(CipherError::HeaderMissing);
                    }

                    self.header = header;
                    source = &source[taken..];

                    if !self.header.is_complete() {
                        return Ok(0);
                    }
                    salt.copy_from_slice(self.header.salt());
                }
            }

            self.start_engine(&salt)?;

            if self.mode == CipherMode::Encipher {
                destination.extend_from_slice(MAGIC);
                destination.extend_from_slice(&salt);
            }
        }

        if !source.is_empty() {
            let engine = self.engine.as_mut().ok_or(CipherError::Process)?;
            engine
                .update(source, destination)
                .map_err(|_| CipherError::Process)?;
            self.process_done = true;
        }

        let produced = destination.len() - start;
        tracing::trace!(
            mode = ?self.mode,
            source = source.len(),
            produced,
            "cipher block processed"
        );

        Ok(produced)
    }

    /// Finish the stream, appending the final block to `destination`.
    ///
    /// Nothing is emitted, and no error raised, when no data ever reached
    /// the engine. A decipher stream that carried only a header therefore
    /// decodes to empty output.
    pub fn flush(&mut self, destination: &mut Vec<u8>) -> Result<usize, CipherError> {
        if !self.process_done {
            return Ok(0);
        }

        let start = destination.len();
        let engine = self.engine.as_mut().ok_or(CipherError::Flush)?;
        engine.finalize(destination).map_err(|e| {
            tracing::debug!(mode = ?self.mode, error = %e, "cipher block flush failed");
            CipherError::Flush
        })?;

        Ok(destination.len() - start)
    }

    fn start_engine(&mut self, salt: &[u8; SALT_SIZE]) -> Result<(), CipherError> {
        let derived = bytes_to_key(self.cipher, self.digest, salt, &self.key);
        let engine = self
            .cipher
            .engine(self.mode, &derived.key, &derived.iv)
            .map_err(|_| CipherError::Process)?;

        self.engine = Some(engine);
        self.salt_done = true;

        tracing::debug!(
            mode = ?self.mode,
            cipher = self.cipher.name,
            digest = self.digest.name,
            "cipher key established"
        );
        Ok(())
    }

    pub fn mode(&self) -> CipherMode {
        self.mode
    }

    pub fn cipher_name(&self) -> &'static str {
        self.cipher.name
    }

    pub fn digest_name(&self) -> &'static str {
        self.digest.name
    }

    pub fn block_size(&self) -> usize {
        self.cipher.block_size
    }

    pub fn is_salt_done(&self) -> bool {
        self.salt_done
    }

    pub fn is_process_done(&self) -> bool {
        self.process_done
    }

    /// Header bytes collected so far on decipher.
    pub fn header_filled(&self) -> usize {
        self.header.filled
    }
}

impl std::fmt::Debug for CipherBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherBlock")
            .field("mode", &self.mode)
            .field("cipher", &self.cipher.name)
            .field("digest", &self.digest.name)
            .field("key", &"[REDACTED]")
            .field("salt_done", &self.salt_done)
            .field("process_done", &self.process_done)
            .field("header_filled", &self.header.filled)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_CIPHER: &str = "aes-256-cbc";
    const TEST_KEY: &[u8] = b"reallybadkey";
    const TEST_PLAINTEXT: &[u8] = b"plaintext";

    fn encipher() -> CipherBlock {
        CipherBlock::new(CipherMode::Encipher, TEST_CIPHER, TEST_KEY, None).unwrap()
    }

    fn decipher() -> CipherBlock {
        CipherBlock::new(CipherMode::Decipher, TEST_CIPHER, TEST_KEY, None).unwrap()
    }

    /// "plaintext" twice, enciphered as two process calls plus flush.
    fn enciphered() -> Vec<u8> {
        let mut block = encipher();
        let mut out = Vec::new();
        block.process(TEST_PLAINTEXT, &mut out).unwrap();
        block.process(TEST_PLAINTEXT, &mut out).unwrap();
        block.flush(&mut out).unwrap();
        out
    }

    #[test]
    fn test_new_rejects_unknown_names() {
        assert_eq!(
            CipherBlock::new(CipherMode::Encipher, "BOGUS", TEST_KEY, None).unwrap_err(),
            CipherError::UnknownCipher("BOGUS".into())
        );
        assert_eq!(
            CipherBlock::new(CipherMode::Encipher, "", TEST_KEY, None).unwrap_err(),
            CipherError::UnknownCipher(String::new())
        );
        let err = CipherBlock::new(CipherMode::Encipher, TEST_CIPHER, TEST_KEY, Some("BOGUS"))
            .unwrap_err();
        assert_eq!(err, CipherError::UnknownDigest("BOGUS".into()));
        assert!(err.is_config());
    }

    #[test]
    fn test_new_initial_state() {
        let block = encipher();
        assert_eq!(block.mode(), CipherMode::Encipher);
        assert_eq!(block.cipher_name(), "aes-256-cbc");
        assert_eq!(block.digest_name(), "sha1");
        assert_eq!(&*block.key, TEST_KEY);
        assert!(!block.is_salt_done());
        assert!(!block.is_process_done());
        assert_eq!(block.header_filled(), 0);
        assert!(block.engine.is_none());
    }

    #[test]
    fn test_empty_source_is_noop() {
        let mut block = encipher();
        let mut out = Vec::new();
        assert_eq!(block.process(b"", &mut out).unwrap(), 0);
        assert!(out.is_empty());
        assert!(!block.is_salt_done());
        assert_eq!(block.flush(&mut out).unwrap(), 0);
    }

    #[test]
    fn test_encipher_sizes() {
        let mut block = encipher();
        let mut out = Vec::new();

        assert_eq!(block.process(TEST_PLAINTEXT, &mut out).unwrap(), HEADER_SIZE);
        assert!(block.is_salt_done());
        assert!(block.is_process_done());
        assert_eq!(block.header_filled(), 0);
        assert_eq!(&out[..MAGIC_SIZE], MAGIC);

        assert_eq!(
            block.process_size(TEST_PLAINTEXT.len()),
            TEST_PLAINTEXT.len() + MAX_BLOCK_LEN + HEADER_SIZE
        );

        assert_eq!(block.process(TEST_PLAINTEXT, &mut out).unwrap(), 16);
        assert_eq!(out.len(), HEADER_SIZE + block.block_size());

        assert_eq!(block.flush(&mut out).unwrap(), 16);
        assert_eq!(out.len(), HEADER_SIZE + block.block_size() * 2);
    }

    #[test]
    fn test_decipher_in_one_call() {
        let ciphertext = enciphered();
        let mut block = decipher();
        let mut out = Vec::new();

        assert_eq!(block.process(&ciphertext, &mut out).unwrap(), 16);
        assert_eq!(block.flush(&mut out).unwrap(), 2);
        assert_eq!(out, b"plaintextplaintext");
    }

    #[test]
    fn test_decipher_header_split() {
        let ciphertext = enciphered();
        let mut block = decipher();
        let mut out = Vec::new();

        assert_eq!(block.process(&ciphertext[..MAGIC_SIZE], &mut out).unwrap(), 0);
        assert!(!block.is_salt_done());
        assert!(!block.is_process_done());
        assert_eq!(block.header_filled(), MAGIC_SIZE);
        assert_eq!(&block.header.bytes[..MAGIC_SIZE], MAGIC);

        assert_eq!(
            block
                .process(&ciphertext[MAGIC_SIZE..HEADER_SIZE], &mut out)
                .unwrap(),
            0
        );
        assert!(block.is_salt_done());
        assert!(!block.is_process_done());
        assert_eq!(block.header_filled(), HEADER_SIZE);
        assert_eq!(block.header.salt(), &ciphertext[MAGIC_SIZE..HEADER_SIZE]);

        assert_eq!(block.process(&ciphertext[HEADER_SIZE..], &mut out).unwrap(), 16);
        block.flush(&mut out).unwrap();
        assert_eq!(out, b"plaintextplaintext");
    }

    #[test]
    fn test_decipher_header_only() {
        let ciphertext = enciphered();
        let mut block = decipher();
        let mut out = Vec::new();

        assert_eq!(block.process(&ciphertext[..HEADER_SIZE], &mut out).unwrap(), 0);
        assert!(block.is_salt_done());
        assert_eq!(block.flush(&mut out).unwrap(), 0);
        assert!(out.is_empty());
    }

    #[test]
    fn test_decipher_bad_magic() {
        let mut block = decipher();
        let mut out = Vec::new();

        assert_eq!(
            block.process(b"1234567890123456", &mut out).unwrap_err(),
            CipherError::HeaderMissing
        );
        assert!(!block.is_salt_done());
        assert_eq!(block.header_filled(), 0);
        assert!(block.engine.is_none());

        // The codec is still usable with a valid header
        assert_eq!(block.process(b"Salted__12345678", &mut out).unwrap(), 0);
        assert!(block.is_salt_done());
        assert_eq!(block.process(b"1234567890123456", &mut out).unwrap(), 0);
        assert_eq!(block.flush(&mut out).unwrap_err(), CipherError::Flush);
        assert!(out.is_empty());
    }

    #[test]
    fn test_decipher_short_prefix_is_buffered() {
        let mut block = decipher();
        let mut out = Vec::new();

        assert_eq!(block.process(b"1", &mut out).unwrap(), 0);
        assert_eq!(block.process(b"234567", &mut out).unwrap(), 0);
        assert_eq!(block.header_filled(), 7);
        assert!(out.is_empty());
    }

    #[test]
    fn test_decipher_bad_magic_detected_at_eight_bytes() {
        let mut block = decipher();
        let mut out = Vec::new();

        assert_eq!(block.process(b"1234", &mut out).unwrap(), 0);
        let err = block.process(b"5678", &mut out).unwrap_err();
        assert_eq!(err, CipherError::HeaderMissing);
        assert_eq!(err.kind(), crate::ErrorKind::Data);
        assert_eq!(block.header_filled(), 4);
    }

    #[test]
    fn test_decipher_garbage_fails_on_flush() {
        let mut block = decipher();
        let mut out = Vec::new();

        block.process(b"Salted__12345678", &mut out).unwrap();
        assert_eq!(block.process(b"1234567890123456", &mut out).unwrap(), 0);
        assert_eq!(block.flush(&mut out).unwrap_err(), CipherError::Flush);
    }

    #[test]
    fn test_decipher_partial_block_fails_on_flush() {
        let mut block = decipher();
        let mut out = Vec::new();

        block.process(b"Salted__12345678", &mut out).unwrap();
        assert_eq!(block.process(b"1234567890123456789", &mut out).unwrap(), 16);
        assert_eq!(block.flush(&mut out).unwrap_err(), CipherError::Flush);
    }

    #[test]
    fn test_encipher_engine_failure_writes_no_header() {
        static SHORT_KEY: CipherSpec = CipherSpec {
            name: "aes-256-cbc",
            key_len: 8,
            iv_len: 16,
            block_size: 16,
            init: crate::engine::cbc_engine::<aes::Aes256>,
        };

        let mut block = encipher();
        block.cipher = &SHORT_KEY;
        let mut out = Vec::new();

        assert_eq!(
            block.process(TEST_PLAINTEXT, &mut out).unwrap_err(),
            CipherError::Process
        );
        assert!(out.is_empty());
        assert!(!block.is_salt_done());
        assert!(block.engine.is_none());
    }

    #[test]
    fn test_wrong_key_fails_or_differs() {
        let ciphertext = enciphered();
        let mut block =
            CipherBlock::new(CipherMode::Decipher, TEST_CIPHER, b"otherkey", None).unwrap();
        let mut out = Vec::new();

        block.process(&ciphertext, &mut out).unwrap();
        match block.flush(&mut out) {
            Err(e) => assert_eq!(e, CipherError::Flush),
            Ok(_) => assert_ne!(out, b"plaintextplaintext"),
        }
    }

    #[test]
    fn test_debug_redacts_key() {
        let block = encipher();
        let dbg = format!("{block:?}");
        assert!(dbg.contains("[REDACTED]"));
        assert!(!dbg.contains("reallybadkey"));
    }
}
