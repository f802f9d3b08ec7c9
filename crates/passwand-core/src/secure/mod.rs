//! Locked-memory primitives.
//!
//! The locked heap is necessarily process-wide (`mlock` accounting and the
//! debugger-attach disable are process-level), but it is deliberately
//! exposed as a narrow module: buffers are acquired through [`SecBuf`] and
//! released by dropping them, and the only other operations are tearing the
//! whole heap down ([`reset`]) and dumping its occupancy ([`dump_heap`]).

mod buffer;
mod heap;
mod passphrase;

pub use buffer::SecBuf;
pub use heap::HeapBusy;
pub use passphrase::Passphrase;

use std::io;

/// Unlock and release the heap's pages.
///
/// Fails while any [`SecBuf`] is still alive, and permanently after the
/// heap has been poisoned by a detected misuse.
pub fn reset() -> Result<(), HeapBusy> {
    heap::HEAP.reset()
}

/// Write the heap's chunk bitmaps to `sink`. Debug aid.
pub fn dump_heap(sink: &mut dyn io::Write) -> io::Result<()> {
    heap::HEAP.dump(sink)
}
