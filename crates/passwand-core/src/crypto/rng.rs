//! Random byte generation.
//!
//! Salts, IVs, padding and generated passwords all draw from the operating
//! system's entropy source via `ring`, never from a userspace PRNG.

use ring::rand::{SecureRandom, SystemRandom};

use crate::Error;

/// Fill `buffer` with cryptographically strong random bytes.
///
/// Filling an empty buffer succeeds without touching the entropy source.
/// Safe to call from any number of threads.
pub fn fill(buffer: &mut [u8]) -> Result<(), Error> {
    if buffer.is_empty() {
        return Ok(());
    }
    SystemRandom::new()
        .fill(buffer)
        .map_err(|_| Error::Io(std::io::Error::other("system entropy source failed")))
}
