use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use anyhow::{bail, Context};
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

/// Remove the single matching entry.
pub struct Delete {
    space: String,
    key: String,
    data: PathBuf,
    found: AtomicBool,
    found_index: AtomicUsize,
}

impl Delete {
    pub fn new(args: Args, data: PathBuf) -> Self {
        Delete {
            space: args.space,
            key: args.key,
            data,
            found: AtomicBool::new(false),
            found_index: AtomicUsize::new(usize::MAX),
        }
    }
}

impl Operation for Delete {
    type Error = anyhow::Error;

    fn wants_more(&self) -> bool {
        !self.found.load(Ordering::Acquire)
    }

    fn visit(&self, index: usize, space: &[u8], key: &[u8], _value: &[u8]) {
        if !is_match(space, key, &self.space, &self.key) {
            return;
        }
        if self
            .found
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.found_index.store(index, Ordering::Release);
        }
    }

    fn fail_fast(&self) -> bool {
        // refuse to rewrite a vault containing an entry we cannot decrypt
        true
    }

    fn finalize(&mut self, entries: &mut Vec<Entry>, failure_pending: bool) -> anyhow::Result<()> {
        if failure_pending {
            bail!("not every entry could be decrypted");
        }
        if !self.found.load(Ordering::Acquire) {
            bail!("failed to find entry");
        }
        entries.remove(self.found_index.load(Ordering::Acquire));
        store::export(&self.data, entries).context("failed to export entries")
    }
}
