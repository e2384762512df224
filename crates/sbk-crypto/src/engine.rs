//! Stateful block cipher engine with OpenSSL `EVP_CipherUpdate`/`EVP_CipherFinal` semantics
//!
//! Encrypt emits every complete block as soon as it is available and adds
//! PKCS#7 padding on finalize. Decrypt always holds back the last complete
//! block, because it may carry the padding that finalize has to strip.

use cipher::block_padding::{Padding, Pkcs7};
use cipher::{BlockCipher, BlockDecryptMut, BlockEncryptMut, KeyInit, KeyIvInit};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::block::CipherMode;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("invalid key or IV length")]
    InvalidLength,

    #[error("ciphertext is not a whole number of blocks")]
    Truncated,

    #[error("bad padding")]
    BadPadding,
}

/// An initialized cipher context. Dropping it releases the context and
/// wipes any buffered data.
pub trait CipherEngine: Send {
    /// Feed `input`, appending whatever output is ready to `output`.
    fn update(&mut self, input: &[u8], output: &mut Vec<u8>) -> Result<(), EngineError>;

    /// Finish the stream, appending the final block (if any) to `output`.
    fn finalize(&mut self, output: &mut Vec<u8>) -> Result<(), EngineError>;
}

/// Build a CBC engine for block cipher `C` in the given direction.
pub fn cbc_engine<C>(
    mode: CipherMode,
    key: &[u8],
    iv: &[u8],
) -> Result<Box<dyn CipherEngine>, EngineError>
where
    C: BlockCipher + BlockEncryptMut + BlockDecryptMut + KeyInit + Send + 'static,
{
    Ok(match mode {
        CipherMode::Encipher => Box::new(Encryptor {
            mode: cbc::Encryptor::<C>::new_from_slices(key, iv)
                .map_err(|_| EngineError::InvalidLength)?,
            pending: Zeroizing::new(Vec::new()),
        }),
        CipherMode::Decipher => Box::new(Decryptor {
            mode: cbc::Decryptor::<C>::new_from_slices(key, iv)
                .map_err(|_| EngineError::InvalidLength)?,
            pending: Zeroizing::new(Vec::new()),
        }),
    })
}

struct Encryptor<M> {
    mode: M,
    // Always shorter than one block between calls
    pending: Zeroizing<Vec<u8>>,
}

impl<M: BlockEncryptMut + Send> CipherEngine for Encryptor<M> {
    fn update(&mut self, input: &[u8], output: &mut Vec<u8>) -> Result<(), EngineError> {
        let block_size = M::block_size();
        self.pending.extend_from_slice(input);

        let ready = self.pending.len() / block_size * block_size;
        for block in self.pending[..ready].chunks_exact_mut(block_size) {
            self.mode
                .encrypt_block_mut(cipher::Block::<M>::from_mut_slice(block));
        }
        output.extend_from_slice(&self.pending[..ready]);
        self.pending.drain(..ready);

        Ok(())
    }

    fn finalize(&mut self, output: &mut Vec<u8>) -> Result<(), EngineError> {
        let pos = self.pending.len();
        self.pending.resize(M::block_size(), 0);

        let block = cipher::Block::<M>::from_mut_slice(&mut self.pending[..]);
        Pkcs7::pad(block, pos);
        self.mode.encrypt_block_mut(block);
        output.extend_from_slice(&self.pending);
        self.pending.clear();

        Ok(())
    }
}

struct Decryptor<M> {
    mode: M,
    // Between calls holds 1..=block_size bytes once any input has arrived
    pending: Zeroizing<Vec<u8>>,
}

impl<M: BlockDecryptMut + Send> CipherEngine for Decryptor<M> {
    fn update(&mut self, input: &[u8], output: &mut Vec<u8>) -> Result<(), EngineError> {
        let block_size = M::block_size();
        self.pending.extend_from_slice(input);

        if self.pending.len() <= block_size {
            return Ok(());
        }

        let ready = (self.pending.len() - 1) / block_size * block_size;
        for block in self.pending[..ready].chunks_exact_mut(block_size) {
            self.mode
                .decrypt_block_mut(cipher::Block::<M>::from_mut_slice(block));
        }
        output.extend_from_slice(&self.pending[..ready]);
        self.pending.drain(..ready);

        Ok(())
    }

    fn finalize(&mut self, output: &mut Vec<u8>) -> Result<(), EngineError> {
        let block_size = M::block_size();
        if self.pending.len() != block_size {
            return Err(EngineError::Truncated);
        }

        let block = cipher::Block::<M>::from_mut_slice(&mut self.pending[..]);
        self.mode.decrypt_block_mut(block);

        let plaintext = Pkcs7::unpad(&*block).map_err(|_| EngineError::BadPadding)?;
        output.extend_from_slice(plaintext);
        self.pending.clear();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 32] = [0x11; 32];
    const IV: [u8; 16] = [0x22; 16];

    fn encrypt_all(chunks: &[&[u8]]) -> Vec<u8> {
        let mut engine = cbc_engine::<aes::Aes256>(CipherMode::Encipher, &KEY, &IV).unwrap();
        let mut out = Vec::new();
        for chunk in chunks {
            engine.update(chunk, &mut out).unwrap();
        }
        engine.finalize(&mut out).unwrap();
        out
    }

    fn decrypt_all(data: &[u8]) -> Result<Vec<u8>, EngineError> {
        let mut engine = cbc_engine::<aes::Aes256>(CipherMode::Decipher, &KEY, &IV).unwrap();
        let mut out = Vec::new();
        engine.update(data, &mut out)?;
        engine.finalize(&mut out)?;
        Ok(out)
    }

    #[test]
    fn test_encrypt_emits_only_full_blocks() {
        let mut engine = cbc_engine::<aes::Aes256>(CipherMode::Encipher, &KEY, &IV).unwrap();
        let mut out = Vec::new();

        engine.update(b"plaintext", &mut out).unwrap();
        assert_eq!(out.len(), 0);

        engine.update(b"plaintext", &mut out).unwrap();
        assert_eq!(out.len(), 16);

        engine.finalize(&mut out).unwrap();
        assert_eq!(out.len(), 32);
    }

    #[test]
    fn test_block_aligned_input_gets_full_padding_block() {
        let out = encrypt_all(&[&[7u8; 32]]);
        assert_eq!(out.len(), 48);
        assert_eq!(decrypt_all(&out).unwrap(), [7u8; 32]);
    }

    #[test]
    fn test_decrypt_holds_back_last_block() {
        let ciphertext = encrypt_all(&[b"plaintextplaintext"]);
        assert_eq!(ciphertext.len(), 32);

        let mut engine = cbc_engine::<aes::Aes256>(CipherMode::Decipher, &KEY, &IV).unwrap();
        let mut out = Vec::new();

        engine.update(&ciphertext[..16], &mut out).unwrap();
        assert_eq!(out.len(), 0, "a single block may be the padding block");

        engine.update(&ciphertext[16..], &mut out).unwrap();
        assert_eq!(out.len(), 16);

        engine.finalize(&mut out).unwrap();
        assert_eq!(out, b"plaintextplaintext");
    }

    #[test]
    fn test_chunking_does_not_change_ciphertext() {
        let data: Vec<u8> = (0u8..=255).cycle().take(1000).collect();
        let whole = encrypt_all(&[&data]);
        let pieces: Vec<&[u8]> = data.chunks(7).collect();
        assert_eq!(whole, encrypt_all(&pieces));
        assert_eq!(decrypt_all(&whole).unwrap(), data);
    }

    #[test]
    fn test_decrypt_truncated() {
        let ciphertext = encrypt_all(&[b"some plaintext that spans blocks"]);
        assert_eq!(
            decrypt_all(&ciphertext[..ciphertext.len() - 1]),
            Err(EngineError::Truncated)
        );
    }

    #[test]
    fn test_decrypt_bad_padding() {
        // A flipped byte in the first block flips the same byte of the last
        // plaintext block, which holds the padding
        let mut ciphertext = encrypt_all(&[b"0123456789abcdef0123"]);
        ciphertext[15] ^= 0x5A;
        assert_eq!(decrypt_all(&ciphertext), Err(EngineError::BadPadding));
    }

    #[test]
    fn test_invalid_key_length() {
        assert!(matches!(
            cbc_engine::<aes::Aes256>(CipherMode::Encipher, &KEY[..16], &IV),
            Err(EngineError::InvalidLength)
        ));
    }
}
