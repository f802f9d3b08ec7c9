use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::bail;
use passwand_core::scan::Operation;
use passwand_core::Entry;

#[derive(clap::Args)]
pub struct Args {
    /// Restrict the check to one namespace
    #[arg(long)]
    pub space: Option<String>,

    /// Restrict the check to one key
    #[arg(long)]
    pub key: Option<String>,

    /// Word list used for the dictionary check
    #[arg(long, value_name = "PATH", default_value = "/usr/share/dict/words")]
    pub dictionary: PathBuf,
}

/// Hook for an external breached-password oracle.
///
/// The network lookup itself lives outside this binary; whatever is wired
/// in here answers "how many known breaches contain this secret". Without
/// an oracle, entries that pass the dictionary check are reported as
/// skipped rather than silently blessed.
pub trait BreachOracle: Sync {
    /// Number of breaches the secret appears in, or a human-readable
    /// reason the lookup could not be performed.
    fn breach_count(&self, secret: &[u8]) -> Result<u64, String>;
}

/// The built-in stand-in oracle: no network, every lookup unavailable.
pub struct NoOracle;

impl BreachOracle for NoOracle {
    fn breach_count(&self, _secret: &[u8]) -> Result<u64, String> {
        Err("breach lookup unavailable".to_string())
    }
}

/// Report each entry's value as OK, weak or skipped.
pub struct Check<O = NoOracle> {
    space: Option<String>,
    key: Option<String>,
    dictionary: PathBuf,
    words: HashSet<Vec<u8>>,
    oracle: O,
    weak_found: AtomicBool,
}

impl Check<NoOracle> {
    pub fn new(args: Args) -> Self {
        Check {
            space: args.space,
            key: args.key,
            dictionary: args.dictionary,
            words: HashSet::new(),
            oracle: NoOracle,
            weak_found: AtomicBool::new(false),
        }
    }
}

fn load_words(path: &Path) -> HashSet<Vec<u8>> {
    // a missing word list is not an error, it just weakens the check
    let Ok(content) = std::fs::read(path) else {
        tracing::warn!(path = %path.display(), "word list unavailable, skipping dictionary check");
        return HashSet::new();
    };
    content
        .split(|&byte| byte == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .filter(|line| !line.is_empty())
        .map(<[u8]>::to_vec)
        .collect()
}

impl<O: BreachOracle> Operation for Check<O> {
    type Error = anyhow::Error;

    fn initialize(&mut self, _entries: &[Entry]) -> anyhow::Result<()> {
        self.words = load_words(&self.dictionary);
        Ok(())
    }

    fn visit(&self, _index: usize, space: &[u8], key: &[u8], value: &[u8]) {
        if let Some(wanted) = &self.space {
            if space != wanted.as_bytes() {
                return;
            }
        }
        if let Some(wanted) = &self.key {
            if key != wanted.as_bytes() {
                return;
            }
        }

        let name = format!(
            "{}/{}",
            String::from_utf8_lossy(space),
            String::from_utf8_lossy(key)
        );
        let mut stdout = std::io::stdout().lock();
        if self.words.contains(value) {
            let _ = writeln!(stdout, "{name}: weak password (dictionary word)");
            self.weak_found.store(true, Ordering::Release);
        } else {
            match self.oracle.breach_count(value) {
                Ok(0) => {
                    let _ = writeln!(stdout, "{name}: OK");
                }
                Ok(count) => {
                    let _ = writeln!(
                        stdout,
                        "{name}: weak password (found in password breaches {count} times)"
                    );
                    self.weak_found.store(true, Ordering::Release);
                }
                Err(reason) => {
                    let _ = writeln!(stdout, "{name}: skipped ({reason})");
                }
            }
        }
    }

    fn finalize(&mut self, _entries: &mut Vec<Entry>, _failure_pending: bool) -> anyhow::Result<()> {
        if self.weak_found.load(Ordering::Acquire) {
            bail!("weak passwords found");
        }
        Ok(())
    }
}
