//! Random byte source used for salt generation

use rand::rngs::OsRng;
use rand::RngCore;

/// Supplier of cryptographically secure random bytes.
///
/// Failure of the OS generator is treated as unrecoverable, so there is no
/// error path here.
pub trait RandomSource: Send {
    fn fill_random(&mut self, buf: &mut [u8]);
}

/// Random source backed by the operating system generator.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn fill_random(&mut self, buf: &mut [u8]) {
        OsRng.fill_bytes(buf);
    }
}

/// Fill `buf` from the OS generator.
pub fn random_bytes(buf: &mut [u8]) {
    OsRandom.fill_random(buf);
}
