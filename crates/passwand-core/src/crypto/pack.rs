//! Canonical framing of plaintext ahead of encryption.
//!
//! A packed buffer has the layout
//!
//! ```text
//! | 8 bytes    | 8 bytes      | 16 bytes | 1..=16 bytes | n bytes   |
//! | "oprime01" | n (LE u64)   | IV       | random pad   | plaintext |
//! ```
//!
//! The random padding brings the total to a multiple of the AES block
//! size, so CTR encryption needs no padding of its own; it always exists
//! (a block-aligned payload gets a full block of padding). The embedded IV
//! gives decryption a cheap sanity check before the plaintext is trusted,
//! and the header lets us detect format drift.

use crate::crypto::cipher::{BLOCK_SIZE, IV_SIZE};
use crate::crypto::rng;
use crate::secure::SecBuf;
use crate::Error;

/// Magic bytes at the start of every packed buffer.
const HEADER: &[u8; 8] = b"oprime01";

/// Width of the encoded plaintext length.
const LENGTH_SIZE: usize = size_of::<u64>();

/// Frame `plaintext` under `iv`.
///
/// The result transiently holds plaintext and therefore lives in locked
/// memory. Its length is always a positive multiple of [`BLOCK_SIZE`].
pub fn pack(plaintext: &[u8], iv: &[u8; IV_SIZE]) -> Result<SecBuf, Error> {
    let unpadded = HEADER
        .len()
        .checked_add(LENGTH_SIZE)
        .and_then(|n| n.checked_add(IV_SIZE))
        .and_then(|n| n.checked_add(plaintext.len()))
        .ok_or(Error::Overflow)?;
    // always 1..=16, so the plaintext length is not recoverable from the
    // packed length alone
    let padding = BLOCK_SIZE - unpadded % BLOCK_SIZE;
    let total = unpadded.checked_add(padding).ok_or(Error::Overflow)?;

    let length = u64::try_from(plaintext.len()).map_err(|_| Error::Overflow)?;

    let mut packed = SecBuf::new(total)?;
    let mut offset = 0;

    packed[offset..offset + HEADER.len()].copy_from_slice(HEADER);
    offset += HEADER.len();

    packed[offset..offset + LENGTH_SIZE].copy_from_slice(&length.to_le_bytes());
    offset += LENGTH_SIZE;

    packed[offset..offset + IV_SIZE].copy_from_slice(iv);
    offset += IV_SIZE;

    rng::fill(&mut packed[offset..offset + padding])?;
    offset += padding;

    packed[offset..].copy_from_slice(plaintext);

    debug_assert_eq!(packed.len() % BLOCK_SIZE, 0);
    Ok(packed)
}

/// Recover the plaintext from a buffer produced by [`pack`].
///
/// Verifies the header byte-for-byte and checks that the embedded IV
/// matches `iv` before anything else is believed.
pub fn unpack(packed: &[u8], iv: &[u8; IV_SIZE]) -> Result<SecBuf, Error> {
    if packed.len() % BLOCK_SIZE != 0 {
        return Err(Error::Unaligned);
    }

    let mut rest = packed;

    if rest.len() < HEADER.len() || &rest[..HEADER.len()] != HEADER {
        return Err(Error::HeaderMismatch);
    }
    rest = &rest[HEADER.len()..];

    if rest.len() < LENGTH_SIZE {
        return Err(Error::Truncated);
    }
    let length_bytes: [u8; LENGTH_SIZE] = rest[..LENGTH_SIZE].try_into().expect("sized above");
    let length = usize::try_from(u64::from_le_bytes(length_bytes)).map_err(|_| Error::Overflow)?;
    rest = &rest[LENGTH_SIZE..];

    if rest.len() < IV_SIZE {
        return Err(Error::Truncated);
    }
    if &rest[..IV_SIZE] != iv {
        return Err(Error::IvMismatch);
    }
    rest = &rest[IV_SIZE..];

    if rest.len() < length {
        return Err(Error::Truncated);
    }
    if rest.len() - length > BLOCK_SIZE {
        return Err(Error::BadPadding);
    }

    SecBuf::from_slice(&rest[rest.len() - length..])
}
