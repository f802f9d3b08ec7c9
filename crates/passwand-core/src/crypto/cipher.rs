//! AES-128-CTR over packed plaintext.
//!
//! AES-128 is used deliberately: it has a better-designed key schedule
//! than AES-256, and CTR mode needs no implementation padding as long as
//! callers only feed it block-aligned packed buffers.

use aes::cipher::{KeyIvInit, StreamCipher};

use crate::secure::SecBuf;
use crate::Error;

/// AES block length in bytes.
pub const BLOCK_SIZE: usize = 16;
/// AES-128 key length in bytes.
pub const KEY_SIZE: usize = 16;
/// CTR initialisation vector length in bytes.
pub const IV_SIZE: usize = 16;

/// AES-128-CTR with the conventional big-endian block counter.
type Aes128Ctr = ctr::Ctr128BE<aes::Aes128>;

/// Encrypt a packed buffer. Output length equals input length.
///
/// Requires a 16-byte key and block-aligned input.
pub fn encrypt(key: &[u8], iv: &[u8; IV_SIZE], packed: &[u8]) -> Result<Vec<u8>, Error> {
    let key: &[u8; KEY_SIZE] = key.try_into().map_err(|_| Error::BadKeySize)?;
    if packed.len() % BLOCK_SIZE != 0 {
        return Err(Error::Unaligned);
    }

    let mut cipher = Aes128Ctr::new(key.into(), iv.into());
    let mut ciphertext = vec![0u8; packed.len()];
    cipher
        .apply_keystream_b2b(packed, &mut ciphertext)
        .map_err(|_| Error::Crypto)?;
    Ok(ciphertext)
}

/// Decrypt a ciphertext produced by [`encrypt`].
///
/// The output transiently holds plaintext, so it is allocated from the
/// locked heap.
pub fn decrypt(key: &[u8], iv: &[u8; IV_SIZE], ciphertext: &[u8]) -> Result<SecBuf, Error> {
    let key: &[u8; KEY_SIZE] = key.try_into().map_err(|_| Error::BadKeySize)?;

    let mut packed = SecBuf::new(ciphertext.len())?;
    let mut cipher = Aes128Ctr::new(key.into(), iv.into());
    cipher
        .apply_keystream_b2b(ciphertext, &mut packed)
        .map_err(|_| Error::Crypto)?;
    Ok(packed)
}
