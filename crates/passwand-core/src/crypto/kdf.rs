//! scrypt key derivation.
//!
//! One derivation produces a 32-byte block that is split into two disjoint
//! halves: the first 16 bytes key AES, the second 16 bytes key the HMAC.
//! The block never leaves locked memory.

use std::fmt;

use crate::secure::{Passphrase, SecBuf};
use crate::Error;

/// Length of each derived key half.
pub const KEY_SIZE: usize = 16;

/// scrypt block size parameter.
const SCRYPT_R: u32 = 8;
/// scrypt parallelisation parameter.
const SCRYPT_P: u32 = 1;

/// Base-2 logarithm of the scrypt cost parameter.
///
/// Valid values are `10..=31`; the default is 14 (N = 16384).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkFactor(u8);

impl WorkFactor {
    pub const MIN: u8 = 10;
    pub const MAX: u8 = 31;
    pub const DEFAULT: WorkFactor = WorkFactor(14);

    pub fn new(log2_n: u8) -> Result<Self, Error> {
        if (Self::MIN..=Self::MAX).contains(&log2_n) {
            Ok(WorkFactor(log2_n))
        } else {
            Err(Error::BadWorkFactor)
        }
    }

    pub fn log2_n(self) -> u8 {
        self.0
    }
}

impl Default for WorkFactor {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for WorkFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The derived key material for one entry: AES half plus HMAC half, backed
/// by locked memory and wiped on drop.
pub struct DerivedKeys {
    material: SecBuf,
}

impl DerivedKeys {
    /// The AES-128 encryption key (first half).
    pub fn aes_key(&self) -> &[u8] {
        &self.material[..KEY_SIZE]
    }

    /// The HMAC key (second half, disjoint from the AES key).
    pub fn mac_key(&self) -> &[u8] {
        &self.material[KEY_SIZE..]
    }
}

impl fmt::Debug for DerivedKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DerivedKeys([REDACTED])")
    }
}

/// Derive the key block for `(main, salt, work_factor)`.
///
/// Deterministic: equal inputs always produce equal output. Cost scales as
/// `N = 2^work_factor` with `r = 8, p = 1`.
pub fn derive(
    main: &Passphrase,
    salt: &[u8],
    work_factor: WorkFactor,
) -> Result<DerivedKeys, Error> {
    let params = scrypt::Params::new(work_factor.log2_n(), SCRYPT_R, SCRYPT_P, 2 * KEY_SIZE)
        .map_err(|_| Error::Crypto)?;

    let mut material = SecBuf::new(2 * KEY_SIZE)?;
    scrypt::scrypt(main.as_bytes(), salt, &params, &mut material).map_err(|_| Error::Crypto)?;

    Ok(DerivedKeys { material })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> WorkFactor {
        WorkFactor::new(10).unwrap()
    }

    #[test]
    fn work_factor_bounds() {
        assert!(WorkFactor::new(9).is_err());
        assert!(WorkFactor::new(32).is_err());
        assert!(WorkFactor::new(10).is_ok());
        assert!(WorkFactor::new(31).is_ok());
        assert_eq!(WorkFactor::default().log2_n(), 14);
    }

    #[test]
    fn derivation_is_deterministic() {
        let main = Passphrase::new("hello world").unwrap();
        let a = derive(&main, b"\x01\x02\x03\x04\x05\x06\x07\x08", fast()).unwrap();
        let b = derive(&main, b"\x01\x02\x03\x04\x05\x06\x07\x08", fast()).unwrap();
        assert_eq!(a.aes_key(), b.aes_key());
        assert_eq!(a.mac_key(), b.mac_key());
    }

    #[test]
    fn halves_are_distinct_and_sized() {
        let main = Passphrase::new("hello world").unwrap();
        let keys = derive(&main, b"salty!!!", fast()).unwrap();
        assert_eq!(keys.aes_key().len(), KEY_SIZE);
        assert_eq!(keys.mac_key().len(), KEY_SIZE);
        assert_ne!(keys.aes_key(), keys.mac_key());
    }

    #[test]
    fn salt_changes_the_output() {
        let main = Passphrase::new("hello world").unwrap();
        let a = derive(&main, b"salt one", fast()).unwrap();
        let b = derive(&main, b"salt two", fast()).unwrap();
        assert_ne!(a.aes_key(), b.aes_key());
    }
}
