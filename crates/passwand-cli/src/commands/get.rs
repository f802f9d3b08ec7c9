use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use anyhow::bail;
use passwand_core::scan::Operation;
use passwand_core::{store, Entry};

use super::is_match;

#[derive(clap::Args)]
pub struct Args {
    /// Namespace of the entry
    #[arg(long)]
    pub space: String,

    /// Key within the namespace
    #[arg(long)]
    pub key: String,
}

/// Print the value of the single matching entry.
pub struct Get {
    space: String,
    key: String,
    data: PathBuf,
    found: AtomicBool,
    found_index: AtomicUsize,
}

impl Get {
    pub fn new(args: Args, data: PathBuf) -> Self {
        Get {
            space: args.space,
            key: args.key,
            data,
            found: AtomicBool::new(false),
            found_index: AtomicUsize::new(usize::MAX),
        }
    }
}

impl Operation for Get {
    type Error = anyhow::Error;

    fn wants_more(&self) -> bool {
        !self.found.load(Ordering::Acquire)
    }

    fn visit(&self, index: usize, space: &[u8], key: &[u8], value: &[u8]) {
        if !is_match(space, key, &self.space, &self.key) {
            return;
        }
        // This exchange should never lose: there should only ever be a
        // single matching entry. But maybe we are operating on a tampered
        // with or corrupted database.
        if self
            .found
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.found_index.store(index, Ordering::Release);
            let mut stdout = std::io::stdout().lock();
            let _ = stdout.write_all(value);
            let _ = stdout.write_all(b"\n");
        }
    }

    fn finalize(&mut self, entries: &mut Vec<Entry>, _failure_pending: bool) -> anyhow::Result<()> {
        if !self.found.load(Ordering::Acquire) {
            bail!("not found");
        }

        // Move the entry we just retrieved to the front, so that over time
        // the file approaches an MRU ordering and common look-ups finish
        // early. A read command must still succeed if the rewrite does not.
        let index = self.found_index.load(Ordering::Acquire);
        if index != 0 && index < entries.len() {
            let entry = entries.remove(index);
            entries.insert(0, entry);
            if let Err(error) = store::export(&self.data, entries) {
                tracing::debug!(%error, "skipped MRU rewrite of the vault");
            }
        }
        Ok(())
    }
}
