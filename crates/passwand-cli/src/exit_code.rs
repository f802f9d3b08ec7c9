//! Exit codes for scripted callers.
//!
//! Anything non-zero signals failure; the distinctions below let scripts
//! tell "wrong passphrase" apart from "no such entry" without parsing
//! stderr.

pub const SUCCESS: u8 = 0;
pub const GENERAL_ERROR: u8 = 1;
/// Authentication failed: wrong passphrase or tampered vault.
pub const AUTH_FAILED: u8 = 2;
/// The named entry (or the vault file itself) was not found.
pub const NOT_FOUND: u8 = 3;
/// The vault file did not parse as a vault.
pub const VAULT_INVALID: u8 = 4;
