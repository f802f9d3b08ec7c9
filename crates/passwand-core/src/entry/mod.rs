//! The persisted unit of the vault: one `(space, key, value)` triple and
//! its cryptographic envelope.
//!
//! The three plaintexts are individually packed and AES-CTR encrypted
//! under a key derived from the main passphrase and a per-entry salt. The
//! encryption IVs form a little-endian counter sequence: the persisted IV
//! encrypts `space`, IV+1 encrypts `key`, IV+2 encrypts `value`. A
//! separate HMAC-SHA512 (under independently derived key material) binds
//! the ciphertext fields together and to the salt and IV.

use subtle::ConstantTimeEq;
use tracing::debug;

use crate::crypto::cipher::{self, IV_SIZE};
use crate::crypto::kdf::{self, DerivedKeys, WorkFactor};
use crate::crypto::{mac, pack, rng};
use crate::secure::{Passphrase, SecBuf};
use crate::Error;

/// Length of the per-entry scrypt salts.
pub const SALT_SIZE: usize = 8;

/// One vault entry. All fields other than `work_factor` are raw bytes;
/// `space`, `key` and `value` are ciphertext, never plaintext.
#[derive(Debug, Clone)]
pub struct Entry {
    pub space: Vec<u8>,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub hmac: Vec<u8>,
    pub hmac_salt: Vec<u8>,
    pub salt: Vec<u8>,
    pub iv: Vec<u8>,
    /// Not persisted; callers set it from their configuration after import.
    pub work_factor: WorkFactor,
}

fn encrypt_field(keys: &DerivedKeys, counter: u128, plaintext: &[u8]) -> Result<Vec<u8>, Error> {
    let iv = counter.to_le_bytes();
    let packed = pack::pack(plaintext, &iv)?;
    cipher::encrypt(keys.aes_key(), &iv, &packed)
}

fn decrypt_field(keys: &DerivedKeys, counter: u128, ciphertext: &[u8]) -> Result<SecBuf, Error> {
    let iv = counter.to_le_bytes();
    let packed = cipher::decrypt(keys.aes_key(), &iv, ciphertext)?;
    pack::unpack(&packed, &iv)
}

impl Entry {
    /// Encrypt a new entry.
    ///
    /// The result carries no authentication tag yet; callers invoke
    /// [`Entry::set_mac`] before exporting it.
    pub fn new(
        main: &Passphrase,
        space: &[u8],
        key: &[u8],
        value: &[u8],
        work_factor: WorkFactor,
    ) -> Result<Entry, Error> {
        let mut salt = [0u8; SALT_SIZE];
        rng::fill(&mut salt)?;

        let keys = kdf::derive(main, &salt, work_factor)?;

        // The IV doubles as a counter across the three fields, so draw it
        // once and persist the value before any increments.
        let mut seed = [0u8; IV_SIZE];
        rng::fill(&mut seed)?;
        let counter = u128::from_le_bytes(seed);

        let space_ct = encrypt_field(&keys, counter, space)?;
        let key_ct = encrypt_field(&keys, counter.wrapping_add(1), key)?;
        let value_ct = encrypt_field(&keys, counter.wrapping_add(2), value)?;

        Ok(Entry {
            space: space_ct,
            key: key_ct,
            value: value_ct,
            hmac: Vec::new(),
            hmac_salt: Vec::new(),
            salt: salt.to_vec(),
            iv: seed.to_vec(),
            work_factor,
        })
    }

    /// The bytes the authentication tag covers: ciphertext fields in fixed
    /// order, then the salt and IV.
    fn mac_data(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(
            self.space.len() + self.key.len() + self.value.len() + self.salt.len() + self.iv.len(),
        );
        data.extend_from_slice(&self.space);
        data.extend_from_slice(&self.key);
        data.extend_from_slice(&self.value);
        data.extend_from_slice(&self.salt);
        data.extend_from_slice(&self.iv);
        data
    }

    /// Authenticate the entry under a fresh salt, writing `hmac` and
    /// `hmac_salt`.
    pub fn set_mac(&mut self, main: &Passphrase) -> Result<(), Error> {
        let mut hmac_salt = [0u8; SALT_SIZE];
        rng::fill(&mut hmac_salt)?;

        self.hmac = mac::authenticate(main, &self.mac_data(), &hmac_salt, self.work_factor)?;
        self.hmac_salt = hmac_salt.to_vec();
        Ok(())
    }

    /// Recompute and compare the authentication tag, in constant time.
    ///
    /// Failure means a wrong main passphrase or a tampered entry; the two
    /// cannot be told apart and both surface as [`Error::BadMac`].
    pub fn check_mac(&self, main: &Passphrase) -> Result<(), Error> {
        let expected = mac::authenticate(main, &self.mac_data(), &self.hmac_salt, self.work_factor)?;
        if expected.ct_eq(&self.hmac).into() {
            Ok(())
        } else {
            Err(Error::BadMac)
        }
    }

    /// Decrypt the entry and hand the plaintext triple to `body`.
    ///
    /// The tag is verified before any decryption happens; `body` only runs
    /// on authenticated data. The plaintext buffers live in locked memory
    /// and are wiped as soon as `body` returns, so the callback must not
    /// stash references to them.
    pub fn with_plaintext<F>(&self, main: &Passphrase, mut body: F) -> Result<(), Error>
    where
        F: FnMut(&[u8], &[u8], &[u8]),
    {
        self.check_mac(main)?;

        let keys = kdf::derive(main, &self.salt, self.work_factor)?;

        let seed: [u8; IV_SIZE] = self.iv.as_slice().try_into().map_err(|_| Error::BadIvSize)?;
        let counter = u128::from_le_bytes(seed);

        let space = decrypt_field(&keys, counter, &self.space)?;
        let key = decrypt_field(&keys, counter.wrapping_add(1), &self.key)?;
        let value = decrypt_field(&keys, counter.wrapping_add(2), &self.value)?;

        debug!(
            space_len = space.len(),
            key_len = key.len(),
            "decrypted entry"
        );
        body(&space, &key, &value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> WorkFactor {
        WorkFactor::new(10).unwrap()
    }

    fn sample(main: &Passphrase) -> Entry {
        let mut entry = Entry::new(main, b"foo.com", b"username", b"bob", fast()).unwrap();
        entry.set_mac(main).unwrap();
        entry
    }

    #[test]
    fn round_trip() {
        let main = Passphrase::new("hello world").unwrap();
        let entry = sample(&main);

        let mut seen = None;
        entry
            .with_plaintext(&main, |space, key, value| {
                seen = Some((space.to_vec(), key.to_vec(), value.to_vec()));
            })
            .unwrap();
        let (space, key, value) = seen.unwrap();
        assert_eq!(space, b"foo.com");
        assert_eq!(key, b"username");
        assert_eq!(value, b"bob");
    }

    #[test]
    fn ciphertext_lengths_are_block_aligned() {
        let main = Passphrase::new("hello world").unwrap();
        let entry = sample(&main);
        for field in [&entry.space, &entry.key, &entry.value] {
            assert!(!field.is_empty());
            assert_eq!(field.len() % 16, 0);
        }
    }

    #[test]
    fn wrong_passphrase_is_bad_mac() {
        let main = Passphrase::new("hello world").unwrap();
        let entry = sample(&main);

        let wrong = Passphrase::new("HELLO WORLD").unwrap();
        assert!(matches!(entry.check_mac(&wrong), Err(Error::BadMac)));
        assert!(matches!(
            entry.with_plaintext(&wrong, |_, _, _| {}),
            Err(Error::BadMac)
        ));
    }

    #[test]
    fn any_single_byte_flip_is_detected() {
        let main = Passphrase::new("hello world").unwrap();
        let entry = sample(&main);

        let mutations: Vec<Box<dyn Fn(&mut Entry)>> = vec![
            Box::new(|e| e.space[0] ^= 1),
            Box::new(|e| e.key[3] ^= 0x80),
            Box::new(|e| *e.value.last_mut().unwrap() ^= 1),
            Box::new(|e| e.salt[7] ^= 1),
            Box::new(|e| e.iv[15] ^= 1),
        ];
        for mutate in mutations {
            let mut tampered = entry.clone();
            mutate(&mut tampered);
            assert!(matches!(tampered.check_mac(&main), Err(Error::BadMac)));
        }
    }

    #[test]
    fn unauthenticated_entry_fails_check() {
        let main = Passphrase::new("hello world").unwrap();
        let entry = Entry::new(&main, b"a", b"b", b"c", fast()).unwrap();
        assert!(matches!(entry.check_mac(&main), Err(Error::BadMac)));
    }

    #[test]
    fn empty_value_round_trips() {
        let main = Passphrase::new("hello world").unwrap();
        let mut entry = Entry::new(&main, b"space", b"key", b"", fast()).unwrap();
        entry.set_mac(&main).unwrap();

        let mut value_len = None;
        entry
            .with_plaintext(&main, |_, _, value| value_len = Some(value.len()))
            .unwrap();
        assert_eq!(value_len, Some(0));
    }

    #[test]
    fn truncated_iv_is_bad_iv_size() {
        let main = Passphrase::new("hello world").unwrap();
        let mut entry = sample(&main);
        entry.iv.truncate(8);
        entry.set_mac(&main).unwrap();
        assert!(matches!(
            entry.with_plaintext(&main, |_, _, _| {}),
            Err(Error::BadIvSize)
        ));
    }
}
