use anyhow::{Context, Result};
use passwand_core::crypto::rng;
use zeroize::Zeroizing;

#[derive(clap::Args)]
pub struct Args {
    /// Namespace of the entry
    #[arg(long)]
    pub space: String,

    /// Key within the namespace
    #[arg(long)]
    pub key: String,

    /// Length of the generated value
    #[arg(long)]
    pub length: Option<usize>,
}

/// Default value length when `--length` was not given.
pub const DEFAULT_LENGTH: usize = 30;

/// Characters we accept in a generated password: safe to type, paste and
/// embed in shell commands.
fn acceptable(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}

/// Draw a random value of `length` accepted characters.
///
/// Rejection sampling over raw entropy bytes keeps the accepted characters
/// uniformly distributed.
pub fn random_value(length: usize) -> Result<Zeroizing<String>> {
    let mut value = Zeroizing::new(String::with_capacity(length));
    let mut buffer = Zeroizing::new([0u8; 256]);
    while value.len() < length {
        rng::fill(&mut *buffer).context("failed to generate random bytes")?;
        for &byte in buffer.iter() {
            if value.len() < length && acceptable(byte) {
                value.push(char::from(byte));
            }
        }
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_requested_length() {
        for length in [1, 16, 30, 100] {
            let value = random_value(length).unwrap();
            assert_eq!(value.len(), length);
        }
    }

    #[test]
    fn only_accepted_characters() {
        let value = random_value(500).unwrap();
        assert!(value.bytes().all(acceptable));
    }

    #[test]
    fn values_are_not_repeated() {
        assert_ne!(*random_value(30).unwrap(), *random_value(30).unwrap());
    }
}
