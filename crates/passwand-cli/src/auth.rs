use std::io::{self, Write};

use anyhow::{bail, Context, Result};
use passwand_core::Passphrase;

/// Resolve the main passphrase.
///
/// An explicit `--password` / `PASSWAND_PASSWORD` value wins; otherwise the
/// user is prompted with echo disabled. `confirm` makes interactive users
/// type the passphrase twice, which mutating commands use to guard against
/// sealing the vault under a typo.
pub fn obtain(flag: Option<String>, confirm: bool) -> Result<Passphrase> {
    if let Some(text) = flag {
        return store(text);
    }

    let main = prompt("main passphrase: ")?;
    if confirm {
        let again = prompt("confirm main passphrase: ")?;
        if main != again {
            bail!("passphrases do not match");
        }
    }
    Ok(main)
}

/// Resolve the replacement passphrase for `change-main`, always confirmed
/// when prompted interactively.
pub fn obtain_new(flag: Option<String>) -> Result<Passphrase> {
    if let Some(text) = flag {
        return store(text);
    }

    let new = prompt("new main passphrase: ")?;
    let again = prompt("confirm new main passphrase: ")?;
    if new != again {
        bail!("passphrases do not match");
    }
    Ok(new)
}

/// Prompt on stderr with echo disabled and move the input straight into
/// locked memory.
fn prompt(message: &str) -> Result<Passphrase> {
    eprint!("{message}");
    io::stderr().flush()?;

    let text = rpassword::read_password().context("failed to read passphrase")?;
    store(text)
}

fn store(text: String) -> Result<Passphrase> {
    Passphrase::from_string(text).context("failed to move passphrase into locked memory")
}
