//! Buffer and CompositeBuffer: cursor-addressed byte regions.
//!
//! Grounded on `body/to_bytes.rs` and `body/aggregate.rs` for the modern
//! (`bytes = "1"`) `Buf`/`BufMut` idiom, and on spec.md §4.1 for the
//! position/limit/mark/capacity cursor contract. The refcount is an
//! explicit `Arc<AtomicUsize>` rather than relying on `Bytes`'s own
//! internal refcounting, because spec.md requires observing the exact
//! zero-transition so a release callback (owned one level up, by
//! [`crate::chunk::DataChunk`]) can fire.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::{Bytes, BytesMut};

use crate::error::{Error, Result};

#[derive(Clone)]
enum Storage {
    /// Backed by an immutable, already-materialized region (e.g. bytes that
    /// arrived off the wire). Puts always fail.
    Shared(Bytes),
    /// Backed by a mutable region a single owning task writes into.
    Mutable(Arc<Mutex<BytesMut>>),
}

/// A logical byte region with `(position, limit, capacity, mark)` cursor
/// state, shared storage, and a refcount.
///
/// Invariant: `0 <= mark <= position <= limit <= capacity` whenever `mark`
/// is set; mutating operations on a read-only buffer fail with
/// [`Error::new_illegal_argument`].
#[derive(Clone)]
pub struct Buffer {
    storage: Storage,
    position: usize,
    limit: usize,
    capacity: usize,
    mark: Option<usize>,
    read_only: bool,
    refcount: Arc<AtomicUsize>,
}

impl Buffer {
    /// Wraps already-materialized, immutable bytes. Read-only.
    pub fn from_bytes(bytes: Bytes) -> Self {
        let capacity = bytes.len();
        Buffer {
            storage: Storage::Shared(bytes),
            position: 0,
            limit: capacity,
            capacity,
            mark: None,
            read_only: true,
            refcount: Arc::new(AtomicUsize::new(1)),
        }
    }

    /// A mutable buffer of `capacity` zeroed bytes, `position = 0`,
    /// `limit = capacity`.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut backing = BytesMut::with_capacity(capacity);
        backing.resize(capacity, 0);
        Buffer {
            storage: Storage::Mutable(Arc::new(Mutex::new(backing))),
            position: 0,
            limit: capacity,
            capacity,
            mark: None,
            read_only: false,
            refcount: Arc::new(AtomicUsize::new(1)),
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn mark(&self) -> Option<usize> {
        self.mark
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Bytes between `position` and `limit`.
    pub fn remaining(&self) -> usize {
        self.limit - self.position
    }

    pub fn has_remaining(&self) -> bool {
        self.remaining() > 0
    }

    /// Moves the cursor to `n`. Discards `mark` if `n < mark`.
    pub fn set_position(&mut self, n: usize) -> Result<()> {
        if n > self.limit {
            return Err(Error::new_illegal_argument(format!(
                "position {} exceeds limit {}",
                n, self.limit
            )));
        }
        if let Some(mark) = self.mark {
            if n < mark {
                self.mark = None;
            }
        }
        self.position = n;
        Ok(())
    }

    /// Moves `limit` to `n`. Clamps `position` and discards `mark` if they
    /// now exceed the new limit.
    pub fn set_limit(&mut self, n: usize) -> Result<()> {
        if n > self.capacity {
            return Err(Error::new_illegal_argument(format!(
                "limit {} exceeds capacity {}",
                n, self.capacity
            )));
        }
        self.limit = n;
        if self.position > n {
            self.position = n;
        }
        if let Some(mark) = self.mark {
            if mark > n {
                self.mark = None;
            }
        }
        Ok(())
    }

    /// Sets `mark = position`.
    pub fn set_mark(&mut self) {
        self.mark = Some(self.position);
    }

    /// Resets `position` to the previously set `mark`.
    pub fn reset(&mut self) -> Result<()> {
        match self.mark {
            Some(mark) => {
                self.position = mark;
                Ok(())
            }
            None => Err(Error::new_illegal_argument("reset() called with no mark set")),
        }
    }

    /// `position = 0`, `limit = capacity`, `mark` discarded.
    pub fn clear(&mut self) {
        self.position = 0;
        self.limit = self.capacity;
        self.mark = None;
    }

    fn read_byte_at(&self, i: usize) -> Result<u8> {
        if i >= self.limit {
            return Err(Error::new_illegal_argument(format!(
                "index {} at or beyond limit {}",
                i, self.limit
            )));
        }
        match &self.storage {
            Storage::Shared(bytes) => Ok(bytes[i]),
            Storage::Mutable(cell) => Ok(cell.lock().expect("buffer lock poisoned")[i]),
        }
    }

    /// Absolute get of a single byte at `i`.
    pub fn get_at(&self, i: usize) -> Result<u8> {
        self.read_byte_at(i)
    }

    /// Relative get: reads at `position`, advances `position` by one.
    pub fn get(&mut self) -> Result<u8> {
        let byte = self.read_byte_at(self.position)?;
        self.position += 1;
        Ok(byte)
    }

    /// Absolute bulk get starting at `i`.
    pub fn get_slice_at(&self, i: usize, dst: &mut [u8]) -> Result<()> {
        if i + dst.len() > self.limit {
            return Err(Error::new_illegal_argument("get_slice_at exceeds limit"));
        }
        for (offset, slot) in dst.iter_mut().enumerate() {
            *slot = self.read_byte_at(i + offset)?;
        }
        Ok(())
    }

    /// Relative bulk get: reads `dst.len()` bytes at `position`, advances it.
    pub fn get_slice(&mut self, dst: &mut [u8]) -> Result<()> {
        self.get_slice_at(self.position, dst)?;
        self.position += dst.len();
        Ok(())
    }

    fn write_byte_at(&mut self, i: usize, byte: u8) -> Result<()> {
        if self.read_only {
            return Err(Error::new_illegal_argument("buffer is read-only"));
        }
        if i >= self.limit {
            return Err(Error::new_illegal_argument(format!(
                "index {} at or beyond limit {}",
                i, self.limit
            )));
        }
        match &self.storage {
            Storage::Shared(_) => unreachable!("read_only buffers never use Shared storage for writes"),
            Storage::Mutable(cell) => {
                cell.lock().expect("buffer lock poisoned")[i] = byte;
                Ok(())
            }
        }
    }

    /// Absolute put of a single byte at `i`.
    pub fn put_at(&mut self, i: usize, byte: u8) -> Result<()> {
        self.write_byte_at(i, byte)
    }

    /// Relative put: writes at `position`, advances `position` by one.
    pub fn put(&mut self, byte: u8) -> Result<()> {
        self.write_byte_at(self.position, byte)?;
        self.position += 1;
        Ok(())
    }

    /// Absolute bulk put starting at `i`.
    pub fn put_slice_at(&mut self, i: usize, src: &[u8]) -> Result<()> {
        if i + src.len() > self.limit {
            return Err(Error::new_illegal_argument("put_slice_at exceeds limit"));
        }
        for (offset, byte) in src.iter().enumerate() {
            self.write_byte_at(i + offset, *byte)?;
        }
        Ok(())
    }

    /// Relative bulk put: writes `src`, starting at `position`, advancing it.
    pub fn put_slice(&mut self, src: &[u8]) -> Result<()> {
        self.put_slice_at(self.position, src)?;
        self.position += src.len();
        Ok(())
    }

    /// An independent cursor sharing the same underlying bytes.
    pub fn duplicate(&self) -> Buffer {
        Buffer {
            storage: self.storage.clone(),
            position: self.position,
            limit: self.limit,
            capacity: self.capacity,
            mark: self.mark,
            read_only: self.read_only,
            refcount: Arc::clone(&self.refcount),
        }
    }

    /// A non-mutating view over the same bytes.
    pub fn as_read_only(&self) -> Buffer {
        let mut dup = self.duplicate();
        dup.read_only = true;
        dup
    }

    /// The `[position, limit)` window copied out as an owned `Bytes`.
    pub fn to_bytes(&self) -> Bytes {
        match &self.storage {
            Storage::Shared(bytes) => bytes.slice(self.position..self.limit),
            Storage::Mutable(cell) => {
                Bytes::copy_from_slice(&cell.lock().expect("buffer lock poisoned")[self.position..self.limit])
            }
        }
    }

    /// Increments the refcount by `n`.
    pub fn retain(&self, n: usize) {
        self.refcount.fetch_add(n, Ordering::AcqRel);
    }

    /// Decrements the refcount by `n`. Returns `true` exactly when this
    /// call is the one that transitions the count to zero.
    pub fn release(&self, n: usize) -> bool {
        let previous = self.refcount.fetch_sub(n, Ordering::AcqRel);
        previous == n
    }

    pub fn ref_count(&self) -> usize {
        self.refcount.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("position", &self.position)
            .field("limit", &self.limit)
            .field("capacity", &self.capacity)
            .field("mark", &self.mark)
            .field("read_only", &self.read_only)
            .finish()
    }
}

/// An ordered list of [`Buffer`] segments whose logical view is their
/// concatenation, built without copying bytes.
///
/// `get` locates the owning segment by linear scan: spec.md §4.1 notes
/// this is acceptable for the small segment counts this corpus expects.
pub struct CompositeBuffer {
    segments: VecDeque<Buffer>,
    read_only: bool,
}

impl CompositeBuffer {
    pub fn new() -> Self {
        CompositeBuffer {
            segments: VecDeque::new(),
            read_only: false,
        }
    }

    pub fn from_segments(segments: impl IntoIterator<Item = Buffer>) -> Self {
        let segments: VecDeque<Buffer> = segments.into_iter().collect();
        let read_only = segments.iter().all(Buffer::is_read_only);
        CompositeBuffer { segments, read_only }
    }

    /// Sum of each segment's remaining (`limit - position`) bytes.
    pub fn capacity(&self) -> usize {
        self.segments.iter().map(Buffer::remaining).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.capacity() == 0
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn segments(&self) -> impl Iterator<Item = &Buffer> {
        self.segments.iter()
    }

    /// Absolute get at logical offset `i`.
    pub fn get(&self, i: usize) -> Result<u8> {
        let mut remaining_offset = i;
        for segment in &self.segments {
            let len = segment.remaining();
            if remaining_offset < len {
                return segment.get_at(segment.position() + remaining_offset);
            }
            remaining_offset -= len;
        }
        Err(Error::new_illegal_argument(format!(
            "index {} beyond composite capacity {}",
            i,
            self.capacity()
        )))
    }

    /// Appends `segment` to the end.
    pub fn put(&mut self, segment: Buffer) -> Result<()> {
        if self.read_only && !segment.is_read_only() {
            return Err(Error::new_illegal_argument("cannot append mutable segment to read-only composite"));
        }
        if segment.is_read_only() {
            // appending a read-only segment does not itself make the
            // composite read-only; that's decided at construction.
        }
        self.segments.push_back(segment);
        Ok(())
    }

    /// Inserts `segment` so its bytes appear at logical offset `at`,
    /// splitting an existing segment's cursor window if `at` falls inside
    /// one. No bytes are copied; splitting a segment means duplicating its
    /// cursor with an adjusted window over the same storage.
    pub fn insert_at(&mut self, at: usize, segment: Buffer) -> Result<()> {
        if at == self.capacity() {
            return self.put(segment);
        }
        let mut remaining_offset = at;
        let mut index = 0;
        for (i, existing) in self.segments.iter().enumerate() {
            let len = existing.remaining();
            if remaining_offset < len {
                index = i;
                break;
            }
            remaining_offset -= len;
            index = i + 1;
        }
        if remaining_offset == 0 {
            self.segments.insert(index, segment);
            return Ok(());
        }
        // Split the segment at `index` at local offset `remaining_offset`.
        let existing = self.segments.remove(index).expect("index computed in range");
        let mut left = existing.duplicate();
        left.set_limit(existing.position() + remaining_offset)?;
        let mut right = existing.duplicate();
        right.set_position(existing.position() + remaining_offset)?;
        self.segments.insert(index, right);
        self.segments.insert(index, segment);
        self.segments.insert(index, left);
        Ok(())
    }

    /// Removes the logical byte range `[offset, offset + length)`, splitting
    /// and dropping segments as needed. No bytes are copied: partially
    /// covered segments are trimmed by narrowing their cursor window.
    pub fn delete(&mut self, offset: usize, length: usize) -> Result<()> {
        if length == 0 {
            return Ok(());
        }
        let end = offset
            .checked_add(length)
            .ok_or_else(|| Error::new_illegal_argument("offset + length overflowed"))?;
        if end > self.capacity() {
            return Err(Error::new_illegal_argument("delete range exceeds composite capacity"));
        }

        let mut rebuilt = VecDeque::with_capacity(self.segments.len());
        let mut cursor = 0usize;
        for segment in self.segments.drain(..) {
            let seg_start = cursor;
            let seg_len = segment.remaining();
            let seg_end = seg_start + seg_len;
            cursor = seg_end;

            if seg_end <= offset || seg_start >= end {
                // Entirely outside the deleted range: keep unchanged.
                rebuilt.push_back(segment);
                continue;
            }

            let delete_start_local = offset.saturating_sub(seg_start);
            let delete_end_local = (end - seg_start).min(seg_len);

            if delete_start_local > 0 {
                let mut left = segment.duplicate();
                left.set_limit(segment.position() + delete_start_local)?;
                rebuilt.push_back(left);
            }
            if delete_end_local < seg_len {
                let mut right = segment.duplicate();
                right.set_position(segment.position() + delete_end_local)?;
                rebuilt.push_back(right);
            }
            // The middle portion (if any) is simply not re-pushed: dropped.
        }
        self.segments = rebuilt;
        Ok(())
    }

    /// Copies out the full logical content as an owned `Bytes`.
    pub fn to_bytes(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(self.capacity());
        for segment in &self.segments {
            out.extend_from_slice(&segment.to_bytes());
        }
        out.freeze()
    }
}

impl Default for CompositeBuffer {
    fn default() -> Self {
        CompositeBuffer::new()
    }
}

impl fmt::Debug for CompositeBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeBuffer")
            .field("segments", &self.segments.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}
