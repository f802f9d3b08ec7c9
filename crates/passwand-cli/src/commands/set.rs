use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{bail, Context};
use passwand_core::scan::Operation;
use passwand_core::{Entry, Passphrase, WorkFactor};
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

    /// Value to store
    #[arg(long)]
    pub value: String,
}

/// Create a new entry, refusing to shadow an existing `(space, key)`.
pub struct Set<'m> {
    main: &'m Passphrase,
    space: String,
    key: String,
    value: Zeroizing<String>,
    work_factor: WorkFactor,
    data: PathBuf,
    found: AtomicBool,
}

impl<'m> Set<'m> {
    pub fn new(
        main: &'m Passphrase,
        space: String,
        key: String,
        value: Zeroizing<String>,
        work_factor: WorkFactor,
        data: PathBuf,
    ) -> Self {
        Set {
            main,
            space,
            key,
            value,
            work_factor,
            data,
            found: AtomicBool::new(false),
        }
    }
}

impl Operation for Set<'_> {
    type Error = anyhow::Error;

    fn wants_more(&self) -> bool {
        !self.found.load(Ordering::Acquire)
    }

    fn visit(&self, _index: usize, space: &[u8], key: &[u8], _value: &[u8]) {
        if is_match(space, key, &self.space, &self.key) {
            self.found.store(true, Ordering::Release);
        }
    }

    fn fail_fast(&self) -> bool {
        // an undecryptable entry could be the very (space, key) we were
        // asked to create, so the command must not write past it
        true
    }

    fn finalize(&mut self, entries: &mut Vec<Entry>, failure_pending: bool) -> anyhow::Result<()> {
        if failure_pending {
            bail!("not every entry could be decrypted");
        }
        if self.found.load(Ordering::Acquire) {
            bail!("an entry for {}/{} already exists", self.space, self.key);
        }

        let mut entry = Entry::new(
            self.main,
            self.space.as_bytes(),
            self.key.as_bytes(),
            self.value.as_bytes(),
            self.work_factor,
        )
        .context("failed to create new entry")?;
        entry.set_mac(self.main).context("failed to create new entry")?;

        // insert at the front, as we assume we will be looking the new
        // entry up in the near future
        entries.insert(0, entry);
        passwand_core::store::export(&self.data, entries).context("failed to export entries")
    }
}
