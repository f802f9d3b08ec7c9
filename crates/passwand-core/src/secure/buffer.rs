//! Owned byte buffers backed by the locked heap.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

use crate::Error;

use super::heap::HEAP;

/// A byte buffer whose backing memory is mlocked and wiped on drop.
///
/// Every transient secret in the engine - the main passphrase, derived key
/// material, packed plaintext, decrypted plaintext - lives in one of these.
/// The buffer dereferences to `[u8]`; the memory is handed out zeroed and
/// is zeroed again when the buffer is released, on every exit path.
///
/// Allocation is capped at one page (see [`crate::secure`]); larger
/// requests fail with [`Error::OutOfMemory`].
pub struct SecBuf {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: SecBuf exclusively owns its range of heap memory, and the heap
// itself serialises all bookkeeping behind a mutex.
unsafe impl Send for SecBuf {}
unsafe impl Sync for SecBuf {}

impl SecBuf {
    /// Allocate a zeroed buffer of `len` bytes.
    ///
    /// A zero-length buffer is valid and occupies no locked memory.
    pub fn new(len: usize) -> Result<Self, Error> {
        if len == 0 {
            return Ok(SecBuf {
                ptr: NonNull::dangling(),
                len: 0,
            });
        }
        let ptr = HEAP.alloc(len).ok_or(Error::OutOfMemory)?;
        Ok(SecBuf { ptr, len })
    }

    /// Allocate a buffer holding a copy of `data`.
    pub fn from_slice(data: &[u8]) -> Result<Self, Error> {
        let mut buffer = Self::new(data.len())?;
        buffer.copy_from_slice(data);
        Ok(buffer)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Deref for SecBuf {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        // SAFETY: ptr covers len initialised bytes we exclusively own (for
        // len == 0 the dangling pointer is valid for an empty slice).
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl DerefMut for SecBuf {
    fn deref_mut(&mut self) -> &mut [u8] {
        // SAFETY: as above, and we hold &mut self.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for SecBuf {
    fn drop(&mut self) {
        if self.len != 0 {
            HEAP.free(self.ptr, self.len);
        }
    }
}

impl fmt::Debug for SecBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecBuf")
            .field("len", &self.len)
            .field("data", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_data() {
        let buffer = SecBuf::from_slice(b"hello world").unwrap();
        assert_eq!(&*buffer, b"hello world");
    }

    #[test]
    fn zero_length_buffer_is_fine() {
        let buffer = SecBuf::new(0).unwrap();
        assert!(buffer.is_empty());
        assert_eq!(&*buffer, b"");
    }

    #[test]
    fn new_buffers_are_zeroed() {
        let buffer = SecBuf::new(300).unwrap();
        assert!(buffer.iter().all(|&b| b == 0));
    }

    #[test]
    fn oversized_request_is_out_of_memory() {
        assert!(matches!(SecBuf::new(1 << 20), Err(Error::OutOfMemory)));
    }

    #[test]
    fn debug_redacts_contents() {
        let buffer = SecBuf::from_slice(b"secret").unwrap();
        let rendered = format!("{buffer:?}");
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("REDACTED"));
    }
}
