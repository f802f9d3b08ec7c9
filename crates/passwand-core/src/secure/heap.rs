//! A locked-page small-object allocator.
//!
//! Buffers that ever hold key material or decrypted plaintext come from
//! here rather than the general-purpose heap. The backing memory is:
//!
//! - pinned in RAM via `mlock`, so it can never reach a swap file;
//! - excluded from debugger attach where the platform supports it
//!   (`prctl(PR_SET_DUMPABLE, 0)` on Linux, attempted once per heap);
//! - zero-wiped with volatile writes when released.
//!
//! Explicit non-goals: low latency and large allocations. Requests are
//! capped at one page, and every call serialises on a single mutex. Secure
//! allocation is never on a hot path, so correctness wins over throughput.
//!
//! The heap hands out memory from a list of "chunks", each owning one
//! page-aligned, mlocked page. Occupancy within a chunk is tracked by a
//! bitmap at 8-byte block granularity, which also lets the heap detect a
//! caller returning memory it never allocated. Such a call - along with a
//! free of clear bits or a range overflow - latches the heap into a
//! permanently poisoned state in which every later allocation fails.
//! Freed ranges and fresh pages are always zero-filled, so allocations are
//! handed out zeroed.

use std::alloc::Layout;
use std::io;
use std::ptr::NonNull;
use std::sync::Mutex;

use thiserror::Error;
use zeroize::Zeroize;

/// Size of a chunk's backing page. Checked against the platform page size
/// before the first `mlock`.
pub(crate) const PAGE_SIZE: usize = 4096;

/// Allocation granularity. Matches the machine's natural minimum alignment.
const BLOCK_SIZE: usize = size_of::<u64>();

const BLOCKS_PER_CHUNK: usize = PAGE_SIZE / BLOCK_SIZE;
const BITMAP_BYTES: usize = BLOCKS_PER_CHUNK / 8;

/// The heap still has live allocations, so it cannot be torn down.
#[derive(Debug, Error)]
#[error("secure heap has live allocations")]
pub struct HeapBusy;

/// One mlocked page plus the occupancy bitmap for its blocks. A set bit
/// means the block is in use.
struct Chunk {
    base: NonNull<u8>,
    bitmap: [u8; BITMAP_BYTES],
}

// SAFETY: a Chunk is only ever reached through the heap mutex, and the page
// it points at is exclusively owned by the heap.
unsafe impl Send for Chunk {}

impl Chunk {
    fn bit(&self, index: usize) -> bool {
        debug_assert!(index < BLOCKS_PER_CHUNK);
        self.bitmap[index / 8] & (1 << (index % 8)) != 0
    }

    fn set_bit(&mut self, index: usize, value: bool) {
        debug_assert!(index < BLOCKS_PER_CHUNK);
        if value {
            self.bitmap[index / 8] |= 1 << (index % 8);
        } else {
            self.bitmap[index / 8] &= !(1 << (index % 8));
        }
    }

    /// First-fit search for `blocks` contiguous free blocks.
    fn find_free_run(&self, blocks: usize) -> Option<usize> {
        let mut start = 0;
        while start + blocks <= BLOCKS_PER_CHUNK {
            match (start..start + blocks).find(|&index| self.bit(index)) {
                // resume past the occupied block we collided with
                Some(occupied) => start = occupied + 1,
                None => return Some(start),
            }
        }
        None
    }

    fn mark(&mut self, start: usize, blocks: usize, value: bool) {
        for index in start..start + blocks {
            self.set_bit(index, value);
        }
    }

    fn base_addr(&self) -> usize {
        self.base.as_ptr() as usize
    }
}

struct HeapState {
    chunks: Vec<Chunk>,
    /// Latched on detection of an inappropriate (potentially malicious)
    /// call; once set, every later allocation fails.
    poisoned: bool,
    /// Whether the one-shot debugger-attach disable has run.
    traced: bool,
}

/// A locked-page allocator instance.
///
/// The process-wide heap lives behind [`crate::secure::SecBuf`]; separate
/// instances exist so tests can poison a private heap without taking the
/// global one down with it.
pub(crate) struct LockedHeap {
    state: Mutex<HeapState>,
}

impl LockedHeap {
    pub(crate) const fn new() -> Self {
        LockedHeap {
            state: Mutex::new(HeapState {
                chunks: Vec::new(),
                poisoned: false,
                traced: false,
            }),
        }
    }

    /// Allocate `size` bytes of zeroed, mlocked memory.
    ///
    /// Returns `None` for `size == 0`, for requests larger than one page,
    /// when the heap is poisoned, and when the platform refuses to lock
    /// another page (typically `RLIMIT_MEMLOCK`).
    pub(crate) fn alloc(&self, size: usize) -> Option<NonNull<u8>> {
        if size == 0 || size > PAGE_SIZE {
            return None;
        }
        let blocks = size.div_ceil(BLOCK_SIZE);

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let state = &mut *state;
        if state.poisoned {
            return None;
        }

        if !state.traced {
            if !disable_debugger_attach() {
                return None;
            }
            state.traced = true;
        }

        for chunk in &mut state.chunks {
            if let Some(start) = chunk.find_free_run(blocks) {
                chunk.mark(start, blocks, true);
                // SAFETY: start + blocks fits in the chunk's page.
                let p = unsafe { chunk.base.as_ptr().add(start * BLOCK_SIZE) };
                return NonNull::new(p);
            }
        }

        // No fit anywhere; acquire another locked page and carve the
        // request from its tail.
        let base = map_locked_page()?;
        let mut chunk = Chunk {
            base,
            bitmap: [0; BITMAP_BYTES],
        };
        let start = BLOCKS_PER_CHUNK - blocks;
        chunk.mark(start, blocks, true);
        // SAFETY: start * BLOCK_SIZE < PAGE_SIZE.
        let p = unsafe { base.as_ptr().add(start * BLOCK_SIZE) };
        state.chunks.push(chunk);
        NonNull::new(p)
    }

    /// Release `size` bytes at `ptr`, wiping them first.
    ///
    /// `size == 0` is a no-op. A pointer outside every chunk, a range whose
    /// blocks are not all currently in use, or address arithmetic overflow
    /// poisons the heap.
    pub(crate) fn free(&self, ptr: NonNull<u8>, size: usize) {
        if size == 0 {
            return;
        }
        let blocks = size.div_ceil(BLOCK_SIZE);
        let start_addr = ptr.as_ptr() as usize;

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let state = &mut *state;
        if state.poisoned {
            return;
        }

        let Some(rounded) = blocks.checked_mul(BLOCK_SIZE) else {
            state.poisoned = true;
            return;
        };
        let Some(end_addr) = start_addr.checked_add(rounded) else {
            state.poisoned = true;
            return;
        };

        for chunk in &mut state.chunks {
            let base = chunk.base_addr();
            if start_addr < base || end_addr > base + PAGE_SIZE {
                continue;
            }
            // the allocation came from this chunk
            let offset = start_addr - base;
            if offset % BLOCK_SIZE != 0 {
                state.poisoned = true;
                return;
            }
            let first = offset / BLOCK_SIZE;
            if (first..first + blocks).any(|index| !chunk.bit(index)) {
                // freeing memory that is not in use: double free?
                state.poisoned = true;
                return;
            }
            // SAFETY: the whole rounded range lies inside this chunk's page
            // and is in use, so no other live allocation aliases it.
            unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr(), rounded) }.zeroize();
            chunk.mark(first, blocks, false);
            return;
        }

        // the range lies in no chunk: this memory is not ours
        state.poisoned = true;
    }

    /// Unlock and release every chunk. Fails while any block is in use or
    /// after the heap has been poisoned.
    pub(crate) fn reset(&self) -> Result<(), HeapBusy> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.poisoned {
            return Err(HeapBusy);
        }
        for chunk in &state.chunks {
            if (0..BLOCKS_PER_CHUNK).any(|index| chunk.bit(index)) {
                return Err(HeapBusy);
            }
        }
        for chunk in state.chunks.drain(..) {
            unmap_page(chunk.base);
        }
        Ok(())
    }

    /// Dump every chunk's occupancy bitmap. Debug aid.
    pub(crate) fn dump(&self, sink: &mut dyn io::Write) -> io::Result<()> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        for chunk in &state.chunks {
            writeln!(sink, "{:p}:", chunk.base.as_ptr())?;
            for index in 0..BLOCKS_PER_CHUNK {
                if index % 64 == 0 {
                    write!(sink, " ")?;
                }
                write!(sink, "{}", u8::from(chunk.bit(index)))?;
                if index % 64 == 63 {
                    writeln!(sink)?;
                }
            }
        }
        Ok(())
    }
}

/// The process-wide heap backing [`crate::secure::SecBuf`].
pub(crate) static HEAP: LockedHeap = LockedHeap::new();

/// Acquire one zeroed, page-aligned, mlocked page.
fn map_locked_page() -> Option<NonNull<u8>> {
    #[cfg(unix)]
    {
        // SAFETY: trivially valid sysconf call.
        let page = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if page <= 0 || (page as usize) > PAGE_SIZE {
            return None;
        }
    }

    let layout = Layout::from_size_align(PAGE_SIZE, PAGE_SIZE).ok()?;
    // SAFETY: layout has non-zero size.
    let p = NonNull::new(unsafe { std::alloc::alloc_zeroed(layout) })?;

    #[cfg(unix)]
    {
        // SAFETY: p points at PAGE_SIZE bytes we own.
        if unsafe { libc::mlock(p.as_ptr().cast(), PAGE_SIZE) } != 0 {
            // SAFETY: allocated above with the same layout.
            unsafe { std::alloc::dealloc(p.as_ptr(), layout) };
            return None;
        }
    }

    Some(p)
}

fn unmap_page(base: NonNull<u8>) {
    #[cfg(unix)]
    {
        // SAFETY: base was mlocked by map_locked_page.
        let r = unsafe { libc::munlock(base.as_ptr().cast(), PAGE_SIZE) };
        debug_assert_eq!(r, 0, "munlock unexpectedly failed");
    }
    let layout = Layout::from_size_align(PAGE_SIZE, PAGE_SIZE)
        .expect("page layout is statically valid");
    // SAFETY: base came from alloc_zeroed with this layout.
    unsafe { std::alloc::dealloc(base.as_ptr(), layout) };
}

/// Prevent other processes attaching to us with `PTRACE_ATTACH`. This goes
/// some way towards stopping a colocated process peeking at the secure heap
/// while we run; it is not foolproof (/proc remains an avenue on Linux).
fn disable_debugger_attach() -> bool {
    #[cfg(target_os = "linux")]
    {
        // SAFETY: PR_SET_DUMPABLE takes no pointers.
        unsafe { libc::prctl(libc::PR_SET_DUMPABLE, 0, 0, 0, 0) == 0 }
    }
    #[cfg(not(target_os = "linux"))]
    {
        true
    }
}
