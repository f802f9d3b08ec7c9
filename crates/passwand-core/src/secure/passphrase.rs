//! The main passphrase, held in locked memory for its whole lifetime.

use std::fmt;

use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::Error;

use super::SecBuf;

/// The user's main passphrase.
///
/// Exists from prompt until drop, only ever in locked memory; it is never
/// written to disk or copied into an ordinary allocation by this crate.
/// Comparison (used for "confirm passphrase" prompts) is constant-time.
pub struct Passphrase(SecBuf);

impl Passphrase {
    pub fn new(text: &str) -> Result<Self, Error> {
        SecBuf::from_slice(text.as_bytes()).map(Passphrase)
    }

    /// Take ownership of a passphrase read into an ordinary `String` (e.g.
    /// by a terminal prompt), wiping the source afterwards.
    pub fn from_string(mut text: String) -> Result<Self, Error> {
        let passphrase = Self::new(&text);
        text.zeroize();
        passphrase
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl PartialEq for Passphrase {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for Passphrase {}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Passphrase([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comparison() {
        let a = Passphrase::new("hello world").unwrap();
        let b = Passphrase::new("hello world").unwrap();
        let c = Passphrase::new("HELLO WORLD").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn from_string_wipes_the_source() {
        let text = String::from("super secret");
        let passphrase = Passphrase::from_string(text).unwrap();
        assert_eq!(passphrase.as_bytes(), b"super secret");
    }

    #[test]
    fn empty_passphrase_is_permitted() {
        let empty = Passphrase::new("").unwrap();
        assert!(empty.as_bytes().is_empty());
    }
}
