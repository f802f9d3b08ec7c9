//! Error types for the vault engine.
//!
//! Every fallible operation in this crate reports one of the kinds below.
//! The CLI renders the `Display` form prefixed with a one-line context
//! ("failed to process entry 3: ..."), so the messages here describe the
//! failure without naming the operation that hit it.

use thiserror::Error;

/// Error kinds propagated by the vault engine.
///
/// # Security Classification
///
/// [`Error::BadMac`] deliberately conflates a wrong main passphrase with a
/// tampered entry. Both derive the wrong HMAC key, and distinguishing them
/// would hand an attacker an oracle. Callers must not attempt to tell the
/// two cases apart.
#[derive(Error, Debug)]
pub enum Error {
    /// An underlying I/O operation failed (file access, entropy source).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A secure-memory allocation could not be satisfied.
    ///
    /// The locked heap is bounded by `RLIMIT_MEMLOCK`, and a poisoned heap
    /// (see [`crate::secure`]) refuses all further allocations; both surface
    /// here.
    #[error("out of secure memory")]
    OutOfMemory,

    /// Integer overflow while computing a buffer size.
    #[error("integer overflow")]
    Overflow,

    /// An encryption key had the wrong length.
    #[error("incorrect key length")]
    BadKeySize,

    /// An initialisation vector had the wrong length.
    #[error("incorrect initialisation vector length")]
    BadIvSize,

    /// The scrypt work factor was outside `10..=31`.
    #[error("work factor out of range")]
    BadWorkFactor,

    /// Data that must be block-aligned was not.
    #[error("unaligned data")]
    Unaligned,

    /// A crypto primitive failed internally.
    #[error("failure in underlying crypto primitive")]
    Crypto,

    /// A packed buffer did not start with the expected header.
    #[error("mismatched header value")]
    HeaderMismatch,

    /// The initialisation vector embedded in a packed buffer did not match
    /// the one supplied for decryption.
    #[error("mismatched initialisation vector")]
    IvMismatch,

    /// Data ended before a complete structure could be read.
    #[error("data was too short")]
    Truncated,

    /// A packed buffer carried more padding than the scheme permits.
    #[error("data was incorrectly padded")]
    BadPadding,

    /// Imported data did not conform to the expected schema.
    #[error("imported data did not conform to expected schema")]
    BadSchema,

    /// An entry failed authentication.
    ///
    /// Raised for both a wrong main passphrase and a tampered entry; the two
    /// are indistinguishable by design.
    #[error("entry failed authentication")]
    BadMac,
}
