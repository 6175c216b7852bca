//! DataChunk: a refcounted [`Buffer`] plus transport hints.
//!
//! Grounded on `src/body/chunk.rs` (`Chunk` wraps a `Bytes` buffer) and
//! spec.md §4.2, generalized with `flush`, `release_callback`,
//! `write_future`, and a stable tracing `id` per spec.md §3.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::buffer::Buffer;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Invoked exactly once, when a chunk's refcount transitions to zero.
pub type ReleaseCallback = Arc<dyn Fn() + Send + Sync>;

/// Signaled by the transport once a chunk has actually been written.
///
/// `DataChunk::write_future` holds the receiving half; transports hold the
/// `oneshot::Sender` (not modeled here, since the transport is an external
/// collaborator per spec.md §1) and complete it after flushing the chunk.
pub type WriteFuture = oneshot::Receiver<()>;

/// A single piece of an HTTP message body: a [`Buffer`] plus the hints the
/// transport needs (`flush`, a release callback, an optional write
/// completion handle, and a stable id for tracing).
pub struct DataChunk {
    buffer: Buffer,
    flush: bool,
    release_callback: Option<ReleaseCallback>,
    write_future: Option<WriteFuture>,
    id: u64,
}

impl DataChunk {
    pub fn create(flush: bool, release_callback: Option<ReleaseCallback>, buffer: Buffer) -> Self {
        DataChunk {
            buffer,
            flush,
            release_callback,
            write_future: None,
            id: next_id(),
        }
    }

    pub fn from_buffer(buffer: Buffer) -> Self {
        DataChunk::create(false, None, buffer)
    }

    /// A zero-length chunk carrying only the `flush` signal.
    pub fn flush_marker() -> Self {
        let mut buf = Buffer::with_capacity(0);
        buf.clear();
        DataChunk::create(true, None, buf)
    }

    pub fn with_write_future(mut self, write_future: WriteFuture) -> Self {
        self.write_future = Some(write_future);
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn flush(&self) -> bool {
        self.flush
    }

    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut Buffer {
        &mut self.buffer
    }

    pub fn write_future(&mut self) -> Option<&mut WriteFuture> {
        self.write_future.as_mut()
    }

    /// `true` when `flush` is set and the buffer has no remaining bytes.
    pub fn is_flush_marker(&self) -> bool {
        self.flush && !self.buffer.has_remaining()
    }

    /// A new chunk sharing this chunk's buffer bytes, but with no release
    /// callback: the original retains ownership of release (spec.md §4.2).
    pub fn duplicate(&self) -> Self {
        DataChunk {
            buffer: self.buffer.duplicate(),
            flush: self.flush,
            release_callback: None,
            write_future: None,
            id: self.id,
        }
    }

    /// A read-only view sharing this chunk's buffer bytes; drops the
    /// release callback on the returned copy, same as `duplicate()`.
    pub fn as_read_only(&self) -> Self {
        DataChunk {
            buffer: self.buffer.as_read_only(),
            flush: self.flush,
            release_callback: None,
            write_future: None,
            id: self.id,
        }
    }

    /// Decrements the buffer's refcount by `n`; on the zero-transition,
    /// invokes the release callback exactly once.
    pub fn release(&self, n: usize) {
        if self.buffer.release(n) {
            if let Some(cb) = &self.release_callback {
                cb();
            }
        }
    }

    pub fn retain(&self, n: usize) {
        self.buffer.retain(n);
    }
}

impl fmt::Debug for DataChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataChunk")
            .field("id", &self.id)
            .field("flush", &self.flush)
            .field("remaining", &self.buffer.remaining())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    #[test]
    fn flush_marker_has_no_bytes() {
        let chunk = DataChunk::flush_marker();
        assert!(chunk.is_flush_marker());
    }

    #[test]
    fn non_empty_chunk_with_flush_is_not_a_marker() {
        let chunk = DataChunk::create(true, None, Buffer::from_bytes(bytes::Bytes::from_static(b"x")));
        assert!(!chunk.is_flush_marker());
    }

    #[test]
    fn release_callback_fires_exactly_once_on_zero() {
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = Arc::clone(&fired);
        let cb: ReleaseCallback = Arc::new(move || {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });
        let chunk = DataChunk::create(false, Some(cb), Buffer::with_capacity(1));
        chunk.retain(1); // refcount now 2
        chunk.release(1);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        chunk.release(1);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn duplicate_drops_release_callback() {
        let called = Arc::new(AtomicBool::new(false));
        let called_clone = Arc::clone(&called);
        let cb: ReleaseCallback = Arc::new(move || called_clone.store(true, Ordering::SeqCst));
        let chunk = DataChunk::create(false, Some(cb), Buffer::with_capacity(1));
        let dup = chunk.duplicate();
        dup.release(1);
        assert!(!called.load(Ordering::SeqCst));
    }
}
