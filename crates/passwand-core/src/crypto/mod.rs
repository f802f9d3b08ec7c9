//! Cryptographic primitives for the vault engine.

pub mod cipher;
pub mod kdf;
pub mod mac;
pub mod pack;
pub mod rng;

pub use kdf::{DerivedKeys, WorkFactor};
