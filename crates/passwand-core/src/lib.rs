//! Core engine for the passwand password vault.
//!
//! The vault is a single JSON file of encrypted entries, each a
//! `(space, key, value)` triple sealed under a main passphrase. This crate
//! owns the cryptography (scrypt key derivation, AES-128-CTR, HMAC-SHA512
//! binding), the file format, the locked-memory allocator that backs every
//! plaintext buffer, and the parallel scan driver commands are built on.
//! Everything user-facing (argument parsing, prompting, locking policy)
//! lives in the CLI crate.

pub mod codec;
pub mod crypto;
pub mod entry;
pub mod error;
pub mod scan;
pub mod secure;
pub mod store;

pub use crypto::WorkFactor;
pub use entry::Entry;
pub use error::Error;
pub use secure::{Passphrase, SecBuf};
