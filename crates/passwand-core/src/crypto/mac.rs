//! HMAC-SHA512 authentication.

use ring::hmac;

use crate::crypto::kdf::{self, WorkFactor};
use crate::secure::Passphrase;
use crate::Error;

/// Length of an authentication tag in bytes (SHA-512 output).
pub const MAC_SIZE: usize = 64;

/// Compute `HMAC-SHA512(mac_key, data)` where `mac_key` is the second half
/// of the key block derived from `(main, salt, work_factor)`.
///
/// The derivation cost makes each tag as expensive to forge as a key
/// guess; the tag itself is public material.
pub fn authenticate(
    main: &Passphrase,
    data: &[u8],
    salt: &[u8],
    work_factor: WorkFactor,
) -> Result<Vec<u8>, Error> {
    let keys = kdf::derive(main, salt, work_factor)?;
    let key = hmac::Key::new(hmac::HMAC_SHA512, keys.mac_key());
    Ok(hmac::sign(&key, data).as_ref().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> WorkFactor {
        WorkFactor::new(10).unwrap()
    }

    #[test]
    fn tag_is_sha512_sized_and_deterministic() {
        let main = Passphrase::new("hello world").unwrap();
        let a = authenticate(&main, b"some data", b"salty!!!", fast()).unwrap();
        let b = authenticate(&main, b"some data", b"salty!!!", fast()).unwrap();
        assert_eq!(a.len(), MAC_SIZE);
        assert_eq!(a, b);
    }

    #[test]
    fn tag_depends_on_every_input() {
        let main = Passphrase::new("hello world").unwrap();
        let other = Passphrase::new("HELLO WORLD").unwrap();
        let base = authenticate(&main, b"some data", b"salty!!!", fast()).unwrap();

        assert_ne!(
            base,
            authenticate(&other, b"some data", b"salty!!!", fast()).unwrap()
        );
        assert_ne!(
            base,
            authenticate(&main, b"other data", b"salty!!!", fast()).unwrap()
        );
        assert_ne!(
            base,
            authenticate(&main, b"some data", b"pepper!!", fast()).unwrap()
        );
        assert_ne!(
            base,
            authenticate(&main, b"some data", b"salty!!!", WorkFactor::new(11).unwrap()).unwrap()
        );
    }
}
