use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{bail, Context};
use passwand_core::scan::Operation;
use passwand_core::{store, Entry, Error, Passphrase, WorkFactor};

#[derive(clap::Args)]
pub struct Args {
    /// New main passphrase (insecure; prefer the interactive prompt)
    #[arg(long, env = "PASSWAND_NEW_PASSWORD", hide_env_values = true)]
    pub new_password: Option<String>,
}

/// Re-encrypt every entry under a replacement passphrase.
///
/// Workers decrypt under the old passphrase and immediately re-seal the
/// triple under the new one into a shadow list; nothing is exported unless
/// every single entry made it across.
pub struct ChangeMain<'m> {
    new_main: &'m Passphrase,
    work_factor: WorkFactor,
    data: PathBuf,
    reencrypted: Mutex<Vec<Option<Entry>>>,
    /// First re-encryption error wins; losers leave it untouched.
    error: Mutex<Option<Error>>,
}

impl<'m> ChangeMain<'m> {
    pub fn new(new_main: &'m Passphrase, work_factor: WorkFactor, data: PathBuf) -> Self {
        ChangeMain {
            new_main,
            work_factor,
            data,
            reencrypted: Mutex::new(Vec::new()),
            error: Mutex::new(None),
        }
    }

    fn record_error(&self, error: Error) {
        let mut slot = self.error.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_none() {
            *slot = Some(error);
        }
    }
}

impl Operation for ChangeMain<'_> {
    type Error = anyhow::Error;

    fn initialize(&mut self, entries: &[Entry]) -> anyhow::Result<()> {
        *self.reencrypted.get_mut().unwrap_or_else(|e| e.into_inner()) =
            vec![None; entries.len()];
        Ok(())
    }

    fn wants_more(&self) -> bool {
        self.error
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_none()
    }

    fn visit(&self, index: usize, space: &[u8], key: &[u8], value: &[u8]) {
        let sealed = Entry::new(self.new_main, space, key, value, self.work_factor)
            .and_then(|mut entry| entry.set_mac(self.new_main).map(|()| entry));
        match sealed {
            Ok(entry) => {
                self.reencrypted.lock().unwrap_or_else(|e| e.into_inner())[index] = Some(entry);
            }
            Err(error) => self.record_error(error),
        }
    }

    fn fail_fast(&self) -> bool {
        // a vault that is only half re-encrypted must never be written out
        true
    }

    fn finalize(&mut self, entries: &mut Vec<Entry>, failure_pending: bool) -> anyhow::Result<()> {
        if let Some(error) = self
            .error
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            return Err(error).context("failed to re-encrypt entries");
        }
        if failure_pending {
            bail!("not every entry could be re-encrypted");
        }

        let shadow = std::mem::take(self.reencrypted.get_mut().unwrap_or_else(|e| e.into_inner()));
        let Some(replaced) = shadow.into_iter().collect::<Option<Vec<Entry>>>() else {
            bail!("not every entry was re-encrypted");
        };

        *entries = replaced;
        store::export(&self.data, entries).context("failed to export entries")
    }
}
