//! Parallel iteration over a vault's entries.
//!
//! A scan applies one [`Operation`] to every entry of an imported list
//! under a shared main passphrase. Work is distributed by a single atomic
//! cursor that each worker fetch-and-increments, so every entry is
//! decrypted exactly once regardless of worker count; with one job no
//! thread is spawned at all.
//!
//! Termination is cooperative: once [`Operation::wants_more`] returns
//! false no worker starts another entry, but workers already inside a
//! decryption run it to completion. The entry list itself is immutable
//! while workers run; operations that reorder or rewrite it (MRU
//! promotion, updates) do so in [`Operation::finalize`], which runs after
//! the last worker has exited.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::warn;

use crate::entry::Entry;
use crate::secure::Passphrase;
use crate::Error;

/// One command's behaviour, spread over the scan lifecycle.
///
/// `initialize` and `finalize` run single-threaded and may mutate the
/// operation; the three per-entry hooks run concurrently from every worker
/// and share it, so match state lives in atomics (or a mutex) inside the
/// implementation.
pub trait Operation: Sync {
    /// The error type `initialize`/`finalize` report. Worker-side entry
    /// failures are [`Error`]s and convert into it.
    type Error: From<Error> + Send;

    /// One-time setup before any worker runs. Failure aborts the scan.
    fn initialize(&mut self, entries: &[Entry]) -> Result<(), Self::Error> {
        let _ = entries;
        Ok(())
    }

    /// Called by worker `worker` when it claims entry `index`, before the
    /// continuation check.
    fn notify(&self, worker: usize, index: usize) {
        let _ = (worker, index);
    }

    /// Continuation check; return false to stop issuing new entries.
    fn wants_more(&self) -> bool {
        true
    }

    /// The per-entry body, invoked with the decrypted triple. The slices
    /// are wiped when the call returns and must not be retained.
    fn visit(&self, index: usize, space: &[u8], key: &[u8], value: &[u8]);

    /// Whether an entry that fails to decrypt aborts the whole scan.
    ///
    /// When false (the default) the failure is logged, the entry is
    /// skipped, and the scan carries on; an attacker who tampers with an
    /// unrelated entry then cannot block an operation whose own target
    /// decrypts successfully. Operations that must touch every entry (such
    /// as re-encrypting the vault) return true instead.
    fn fail_fast(&self) -> bool {
        false
    }

    /// One-time teardown; owns any persistent side effect such as
    /// reordering `entries` and exporting them. `failure_pending` is true
    /// iff some entry failed to decrypt.
    fn finalize(&mut self, entries: &mut Vec<Entry>, failure_pending: bool)
        -> Result<(), Self::Error>;
}

/// A per-entry decryption failure, latched by the worker that hit it.
struct Failure {
    index: usize,
    error: Error,
}

/// Run `op` over `entries` with `jobs` workers.
///
/// The overall scan succeeds iff `initialize` succeeded, no fatal worker
/// error was recorded, and `finalize` succeeded.
pub fn scan<O: Operation>(
    main: &Passphrase,
    entries: &mut Vec<Entry>,
    jobs: NonZeroUsize,
    op: &mut O,
) -> Result<(), O::Error> {
    op.initialize(entries)?;

    let cursor = AtomicUsize::new(0);
    let failures = {
        let shared: &[Entry] = entries;
        let cursor = &cursor;
        let op: &O = op;
        if jobs.get() == 1 {
            worker(0, main, shared, cursor, op)
        } else {
            std::thread::scope(|scope| {
                let handles: Vec<_> = (1..jobs.get())
                    .map(|id| scope.spawn(move || worker(id, main, shared, cursor, op)))
                    .collect();
                let mut failures = worker(0, main, shared, cursor, op);
                for handle in handles {
                    match handle.join() {
                        Ok(mut collected) => failures.append(&mut collected),
                        Err(panic) => std::panic::resume_unwind(panic),
                    }
                }
                failures
            })
        }
    };

    let failure_pending = !failures.is_empty();
    let fatal = if op.fail_fast() {
        failures.into_iter().next()
    } else {
        None
    };

    let finalized = op.finalize(entries, failure_pending);
    match fatal {
        // the first worker error outranks whatever finalize had to say
        Some(failure) => Err(failure.error.into()),
        None => finalized,
    }
}

fn worker<O: Operation>(
    id: usize,
    main: &Passphrase,
    entries: &[Entry],
    cursor: &AtomicUsize,
    op: &O,
) -> Vec<Failure> {
    let mut failures = Vec::new();
    loop {
        let index = cursor.fetch_add(1, Ordering::SeqCst);
        if index >= entries.len() {
            break;
        }

        op.notify(id, index);
        if !op.wants_more() {
            break;
        }

        let outcome = entries[index]
            .with_plaintext(main, |space, key, value| op.visit(index, space, key, value));
        if let Err(error) = outcome {
            warn!(worker = id, index, %error, "failed to process entry");
            let fatal = op.fail_fast();
            failures.push(Failure { index, error });
            if fatal {
                break;
            }
        }
    }
    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::WorkFactor;
    use std::sync::atomic::AtomicBool;
    use std::sync::Mutex;

    fn fast() -> WorkFactor {
        WorkFactor::new(10).unwrap()
    }

    fn vault(main: &Passphrase, count: usize) -> Vec<Entry> {
        (0..count)
            .map(|i| {
                let mut entry = Entry::new(
                    main,
                    format!("space{i}").as_bytes(),
                    format!("key{i}").as_bytes(),
                    format!("value{i}").as_bytes(),
                    fast(),
                )
                .unwrap();
                entry.set_mac(main).unwrap();
                entry
            })
            .collect()
    }

    #[derive(Default)]
    struct Recorder {
        visited: Mutex<Vec<usize>>,
        finalized: AtomicBool,
        saw_failure: AtomicBool,
        fatal: bool,
    }

    impl Operation for Recorder {
        type Error = Error;

        fn visit(&self, index: usize, _space: &[u8], _key: &[u8], _value: &[u8]) {
            self.visited.lock().unwrap().push(index);
        }

        fn fail_fast(&self) -> bool {
            self.fatal
        }

        fn finalize(
            &mut self,
            _entries: &mut Vec<Entry>,
            failure_pending: bool,
        ) -> Result<(), Error> {
            self.finalized.store(true, Ordering::SeqCst);
            self.saw_failure.store(failure_pending, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn visits_every_entry_exactly_once() {
        let main = Passphrase::new("hello world").unwrap();
        let mut entries = vault(&main, 7);

        for jobs in [1, 4] {
            let mut op = Recorder::default();
            scan(&main, &mut entries, NonZeroUsize::new(jobs).unwrap(), &mut op).unwrap();
            let mut visited = op.visited.into_inner().unwrap();
            visited.sort_unstable();
            assert_eq!(visited, (0..7).collect::<Vec<_>>(), "jobs = {jobs}");
            assert!(op.finalized.load(Ordering::SeqCst));
            assert!(!op.saw_failure.load(Ordering::SeqCst));
        }
    }

    struct StopAfterFirst {
        visited: AtomicUsize,
        stopped: AtomicBool,
    }

    impl Operation for StopAfterFirst {
        type Error = Error;

        fn wants_more(&self) -> bool {
            !self.stopped.load(Ordering::SeqCst)
        }

        fn visit(&self, _index: usize, _space: &[u8], _key: &[u8], _value: &[u8]) {
            self.visited.fetch_add(1, Ordering::SeqCst);
            self.stopped.store(true, Ordering::SeqCst);
        }

        fn finalize(&mut self, _entries: &mut Vec<Entry>, _failure_pending: bool) -> Result<(), Error> {
            Ok(())
        }
    }

    #[test]
    fn single_job_stops_at_first_match() {
        let main = Passphrase::new("hello world").unwrap();
        let mut entries = vault(&main, 5);
        let mut op = StopAfterFirst {
            visited: AtomicUsize::new(0),
            stopped: AtomicBool::new(false),
        };
        scan(&main, &mut entries, NonZeroUsize::new(1).unwrap(), &mut op).unwrap();
        assert_eq!(op.visited.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn tampered_entry_is_skipped_but_reported() {
        let main = Passphrase::new("hello world").unwrap();
        let mut entries = vault(&main, 3);
        entries[1].value[0] ^= 1;

        let mut op = Recorder::default();
        scan(&main, &mut entries, NonZeroUsize::new(1).unwrap(), &mut op).unwrap();

        let visited = op.visited.into_inner().unwrap();
        assert_eq!(visited, vec![0, 2]);
        assert!(op.saw_failure.load(Ordering::SeqCst));
    }

    #[test]
    fn fail_fast_surfaces_the_entry_error() {
        let main = Passphrase::new("hello world").unwrap();
        let mut entries = vault(&main, 3);
        entries[0].value[0] ^= 1;

        let mut op = Recorder {
            fatal: true,
            ..Recorder::default()
        };
        let result = scan(&main, &mut entries, NonZeroUsize::new(1).unwrap(), &mut op);
        assert!(matches!(result, Err(Error::BadMac)));
        // finalize still ran, and was told about the failure
        assert!(op.finalized.load(Ordering::SeqCst));
        assert!(op.saw_failure.load(Ordering::SeqCst));
    }

    #[test]
    fn scan_of_empty_vault_just_finalizes() {
        let main = Passphrase::new("hello world").unwrap();
        let mut entries = Vec::new();
        let mut op = Recorder::default();
        scan(&main, &mut entries, NonZeroUsize::new(8).unwrap(), &mut op).unwrap();
        assert!(op.visited.into_inner().unwrap().is_empty());
        assert!(op.finalized.load(Ordering::SeqCst));
    }
}
