use std::io::Write;

use anyhow::bail;
use passwand_core::scan::Operation;
use passwand_core::Entry;

#[derive(clap::Args)]
pub struct Args {}

/// Print `space/key` for every entry, one line per entry.
pub struct List;

impl Operation for List {
    type Error = anyhow::Error;

    fn visit(&self, _index: usize, space: &[u8], key: &[u8], _value: &[u8]) {
        // one whole line per lock acquisition, so concurrent workers never
        // interleave partial lines
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(space);
        let _ = stdout.write_all(b"/");
        let _ = stdout.write_all(key);
        let _ = stdout.write_all(b"\n");
    }

    fn finalize(&mut self, _entries: &mut Vec<Entry>, failure_pending: bool) -> anyhow::Result<()> {
        if failure_pending {
            bail!("some entries could not be decrypted");
        }
        Ok(())
    }
}
