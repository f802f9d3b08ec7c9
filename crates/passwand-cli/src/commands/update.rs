use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use anyhow::{bail, Context};
use passwand_core::scan::Operation;
use passwand_core::{store, Entry, Passphrase, WorkFactor};
use zeroize::Zeroizing;

use super::is_match;

#[derive(clap::Args)]
pub struct Args {
    /// Namespace of the entry
    #[arg(long)]
    pub space: String,

    /// Key within the namespace
    #[arg(long)]
    pub key: String,

    /// Replacement value
    #[arg(long)]
    pub value: String,
}

/// Replace the single matching entry and promote it to the front.
///
/// An unrelated entry that fails to decrypt does not abort the update: we
/// can only replace an entry we have decrypted successfully, so a tampered
/// bystander must not be able to hold the operation hostage.
pub struct Update<'m> {
    main: &'m Passphrase,
    space: String,
    key: String,
    value: Zeroizing<String>,
    work_factor: WorkFactor,
    data: PathBuf,
    found: AtomicBool,
    found_index: AtomicUsize,
}

impl<'m> Update<'m> {
    pub fn new(
        main: &'m Passphrase,
        args: Args,
        work_factor: WorkFactor,
        data: PathBuf,
    ) -> Self {
        Update {
            main,
            space: args.space,
            key: args.key,
            value: Zeroizing::new(args.value),
            work_factor,
            data,
            found: AtomicBool::new(false),
            found_index: AtomicUsize::new(usize::MAX),
        }
    }
}

impl Operation for Update<'_> {
    type Error = anyhow::Error;

    fn wants_more(&self) -> bool {
        !self.found.load(Ordering::Acquire)
    }

    fn visit(&self, index: usize, space: &[u8], key: &[u8], _value: &[u8]) {
        if !is_match(space, key, &self.space, &self.key) {
            return;
        }
        // only one entry should ever match; first winner records the index
        if self
            .found
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.found_index.store(index, Ordering::Release);
        }
    }

    fn finalize(&mut self, entries: &mut Vec<Entry>, _failure_pending: bool) -> anyhow::Result<()> {
        if !self.found.load(Ordering::Acquire) {
            bail!("entry not found");
        }

        let mut entry = Entry::new(
            self.main,
            self.space.as_bytes(),
            self.key.as_bytes(),
            self.value.as_bytes(),
            self.work_factor,
        )
        .context("failed to create updated entry")?;
        entry
            .set_mac(self.main)
            .context("failed to create updated entry")?;

        let index = self.found_index.load(Ordering::Acquire);
        entries.remove(index);
        // the fresh entry goes to the front, as we assume we will be
        // looking it up in the near future
        entries.insert(0, entry);
        store::export(&self.data, entries).context("failed to export entries")
    }
}
