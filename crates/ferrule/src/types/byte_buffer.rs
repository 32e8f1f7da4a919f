//! Offset-addressed byte storage shared by `bytes` and `bytearray`.
//!
//! A [`ByteBuffer`] is a window `[offset, offset + size)` into a backing array. Mutable buffers
//! keep spare capacity on both sides of the window so that inserting or deleting near either
//! end is usually satisfied by moving the shorter side of the data rather than reallocating.
//!
//! Backing arrays are reference counted. Cloning a buffer handle, or taking a contiguous slice of
//! a mutable buffer, shares the backing array; the first write through any handle copies the
//! array for that handle only (copy-on-write), so other handles never see its partial writes.

use std::{fmt, sync::Arc};

use crate::{
    exception_private::{ExcType, RunError},
    types::slice::slice_len,
};

/// Reallocation sizes are rounded up to a multiple of this.
const ALIGNMENT: usize = 16;

/// Failure of a byte buffer operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferError {
    /// Index outside `[0, len)` (or `[0, len]` for insertion points).
    IndexOutOfRange { index: isize, len: usize },
    /// Attempt to modify an immutable buffer.
    Immutable,
    /// Extended slice assignment with a source of the wrong length.
    SizeMismatch { expected: usize, actual: usize },
    ZeroStep,
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IndexOutOfRange { .. } => f.write_str("bytearray index out of range"),
            Self::Immutable => f.write_str("'bytes' object does not support item assignment"),
            Self::SizeMismatch { expected, actual } => write!(
                f,
                "attempt to assign bytes of size {actual} to extended slice of size {expected}"
            ),
            Self::ZeroStep => f.write_str("slice step cannot be zero"),
        }
    }
}

impl std::error::Error for BufferError {}

impl From<BufferError> for RunError {
    fn from(err: BufferError) -> Self {
        match err {
            BufferError::IndexOutOfRange { .. } => ExcType::index_error(err),
            BufferError::Immutable => ExcType::type_error(err),
            BufferError::SizeMismatch { .. } | BufferError::ZeroStep => ExcType::value_error(err),
        }
    }
}

/// Storage length to allocate for `needed` bytes: `needed + needed/8` plus a small constant,
/// rounded up to [`ALIGNMENT`].
#[must_use]
pub fn recommended_length(needed: usize) -> usize {
    let extra = if needed < 9 { 3 } else { 6 };
    (needed + needed / 8 + extra).next_multiple_of(ALIGNMENT)
}

/// A byte sequence stored as a window into a shared backing array.
///
/// Invariant: `offset + size <= storage.len()`. Immutable buffers always use exact-fit storage
/// with `offset == 0`.
#[derive(Clone)]
pub struct ByteBuffer {
    storage: Arc<Vec<u8>>,
    offset: usize,
    size: usize,
    mutable: bool,
}

impl ByteBuffer {
    /// Creates an empty mutable buffer with no storage.
    #[must_use]
    pub fn new_mutable() -> Self {
        Self {
            storage: Arc::new(Vec::new()),
            offset: 0,
            size: 0,
            mutable: true,
        }
    }

    /// Creates a mutable buffer holding a copy of `data`, with spare capacity after it.
    #[must_use]
    pub fn mutable_from(data: &[u8]) -> Self {
        if data.is_empty() {
            return Self::new_mutable();
        }
        let mut storage = vec![0; recommended_length(data.len())];
        storage[..data.len()].copy_from_slice(data);
        Self {
            storage: Arc::new(storage),
            offset: 0,
            size: data.len(),
            mutable: true,
        }
    }

    /// Creates an immutable, exact-fit buffer.
    #[must_use]
    pub fn immutable_from(data: impl Into<Vec<u8>>) -> Self {
        let storage: Vec<u8> = data.into();
        let size = storage.len();
        Self {
            storage: Arc::new(storage),
            offset: 0,
            size,
            mutable: false,
        }
    }

    #[must_use]
    pub fn is_mutable(&self) -> bool {
        self.mutable
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.size
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Length of the backing array, including spare capacity on both sides.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Start of the valid window within the backing array.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.storage[self.offset..self.offset + self.size]
    }

    /// Whether `self` and `other` currently read from the same backing array.
    #[must_use]
    pub fn shares_storage_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.storage, &other.storage)
    }

    /// Immutable copy of the current contents.
    #[must_use]
    pub fn to_immutable(&self) -> Self {
        Self::immutable_from(self.as_slice())
    }

    /// Mutable copy of the current contents.
    #[must_use]
    pub fn to_mutable(&self) -> Self {
        Self::mutable_from(self.as_slice())
    }

    pub fn get(&self, index: usize) -> Result<u8, BufferError> {
        if index < self.size {
            Ok(self.storage[self.offset + index])
        } else {
            Err(self.out_of_range(index))
        }
    }

    pub fn set(&mut self, index: usize, byte: u8) -> Result<(), BufferError> {
        self.check_mutable()?;
        if index >= self.size {
            return Err(self.out_of_range(index));
        }
        let offset = self.offset;
        Arc::make_mut(&mut self.storage)[offset + index] = byte;
        Ok(())
    }

    /// Copies the elements selected by `start, stop, step` into a new buffer of the same
    /// mutability.
    ///
    /// A contiguous slice of a mutable buffer shares the backing array instead of copying it.
    pub fn slice(&self, start: isize, stop: isize, step: isize) -> Result<Self, BufferError> {
        if step == 0 {
            return Err(BufferError::ZeroStep);
        }
        let count = slice_len(start, stop, step);
        if count == 0 {
            return Ok(self.empty_like());
        }
        self.check_progression(start, step, count)?;
        let start = start as usize;
        if step == 1 {
            if self.mutable {
                return Ok(Self {
                    storage: Arc::clone(&self.storage),
                    offset: self.offset + start,
                    size: count,
                    mutable: true,
                });
            }
            return Ok(Self::immutable_from(&self.as_slice()[start..start + count]));
        }
        let data = self.as_slice();
        let picked: Vec<u8> = (0..count)
            .map(|i| data[(start as isize + i as isize * step) as usize])
            .collect();
        Ok(self.with_contents(&picked))
    }

    /// Assigns `source` to the elements selected by `start, stop, step`.
    ///
    /// With `step == 1` the selected range is replaced and the buffer may grow or shrink; an
    /// inverted range (`stop < start`) inserts at `start`. With any other step the source must
    /// have exactly as many bytes as the slice selects, otherwise the buffer is left unchanged.
    pub fn assign_slice(&mut self, start: isize, stop: isize, step: isize, source: &[u8]) -> Result<(), BufferError> {
        self.check_mutable()?;
        if step == 0 {
            return Err(BufferError::ZeroStep);
        }
        if step == 1 {
            let start = self.check_position(start)?;
            let stop = usize::try_from(stop).unwrap_or(0).clamp(start, self.size);
            self.replace_region(start, stop - start, source.len());
            self.write_at(start, source);
            return Ok(());
        }
        let count = slice_len(start, stop, step);
        if source.len() != count {
            return Err(BufferError::SizeMismatch {
                expected: count,
                actual: source.len(),
            });
        }
        if count == 0 {
            return Ok(());
        }
        self.check_progression(start, step, count)?;
        let offset = self.offset;
        let storage = Arc::make_mut(&mut self.storage);
        for (i, &byte) in source.iter().enumerate() {
            let index = (start + i as isize * step) as usize;
            storage[offset + index] = byte;
        }
        Ok(())
    }

    /// Inserts `byte` before `index`; `index == len` appends.
    pub fn insert(&mut self, index: usize, byte: u8) -> Result<(), BufferError> {
        self.check_mutable()?;
        if index > self.size {
            return Err(self.out_of_range(index));
        }
        self.replace_region(index, 0, 1);
        self.write_at(index, &[byte]);
        Ok(())
    }

    pub fn delete(&mut self, index: usize) -> Result<(), BufferError> {
        self.check_mutable()?;
        if index >= self.size {
            return Err(self.out_of_range(index));
        }
        self.replace_region(index, 1, 0);
        Ok(())
    }

    /// Removes the bytes in `[start, stop)`.
    pub fn delete_range(&mut self, start: usize, stop: usize) -> Result<(), BufferError> {
        self.check_mutable()?;
        if stop > self.size {
            return Err(self.out_of_range(stop));
        }
        if start > stop {
            return Err(self.out_of_range(start));
        }
        self.replace_region(start, stop - start, 0);
        Ok(())
    }

    /// Removes the elements selected by `start, stop, step`, preserving the order of the rest.
    ///
    /// Elements are removed in ascending index order whatever the sign of `step`, so the result
    /// of `del b[i:j:k]` does not depend on the direction the slice was written in.
    pub fn delete_slice(&mut self, start: isize, stop: isize, step: isize) -> Result<(), BufferError> {
        self.check_mutable()?;
        if step == 0 {
            return Err(BufferError::ZeroStep);
        }
        let count = slice_len(start, stop, step);
        if count == 0 {
            return Ok(());
        }
        self.check_progression(start, step, count)?;
        // lowest selected index and the distance between selected indices
        let (first, stride) = if step > 0 {
            (start as usize, step.unsigned_abs())
        } else {
            ((start + (count as isize - 1) * step) as usize, step.unsigned_abs())
        };
        if stride == 1 {
            self.replace_region(first, count, 0);
            return Ok(());
        }

        let offset = self.offset;
        let size = self.size;
        let storage = Arc::make_mut(&mut self.storage);
        let data = &mut storage[offset..offset + size];
        let mut write = first;
        let mut next_deleted = first;
        let mut deleted = 0;
        for read in first..size {
            if deleted < count && read == next_deleted {
                deleted += 1;
                next_deleted += stride;
                continue;
            }
            data[write] = data[read];
            write += 1;
        }
        debug_assert_eq!(deleted, count);
        // the compacted tail now holds `count` stale bytes
        self.replace_region(size - count, count, 0);
        Ok(())
    }

    pub fn append(&mut self, byte: u8) -> Result<(), BufferError> {
        self.insert(self.size, byte)
    }

    pub fn extend(&mut self, data: &[u8]) -> Result<(), BufferError> {
        self.check_mutable()?;
        let at = self.size;
        self.replace_region(at, 0, data.len());
        self.write_at(at, data);
        Ok(())
    }

    /// Removes and returns the byte at `index`.
    pub fn pop(&mut self, index: usize) -> Result<u8, BufferError> {
        let byte = self.get(index)?;
        self.delete(index)?;
        Ok(byte)
    }

    pub fn reverse(&mut self) -> Result<(), BufferError> {
        self.check_mutable()?;
        let (offset, size) = (self.offset, self.size);
        Arc::make_mut(&mut self.storage)[offset..offset + size].reverse();
        Ok(())
    }

    pub fn clear(&mut self) -> Result<(), BufferError> {
        self.check_mutable()?;
        self.replace_region(0, self.size, 0);
        Ok(())
    }

    /// `self + other` as a new buffer of the same mutability.
    #[must_use]
    pub fn concat(&self, other: &[u8]) -> Self {
        let mut data = Vec::with_capacity(self.size + other.len());
        data.extend_from_slice(self.as_slice());
        data.extend_from_slice(other);
        self.with_contents(&data)
    }

    /// `self * count` as a new buffer of the same mutability.
    #[must_use]
    pub fn repeat(&self, count: usize) -> Self {
        self.with_contents(&self.as_slice().repeat(count))
    }

    fn with_contents(&self, data: &[u8]) -> Self {
        if self.mutable {
            Self::mutable_from(data)
        } else {
            Self::immutable_from(data)
        }
    }

    fn empty_like(&self) -> Self {
        if self.mutable {
            Self::new_mutable()
        } else {
            Self::immutable_from(Vec::new())
        }
    }

    fn check_mutable(&self) -> Result<(), BufferError> {
        if self.mutable { Ok(()) } else { Err(BufferError::Immutable) }
    }

    fn out_of_range(&self, index: usize) -> BufferError {
        BufferError::IndexOutOfRange {
            index: isize::try_from(index).unwrap_or(isize::MAX),
            len: self.size,
        }
    }

    /// Validates an insertion point in `[0, len]`.
    fn check_position(&self, position: isize) -> Result<usize, BufferError> {
        usize::try_from(position)
            .ok()
            .filter(|&p| p <= self.size)
            .ok_or(BufferError::IndexOutOfRange {
                index: position,
                len: self.size,
            })
    }

    /// Validates that the first and last elements of a non-empty progression are in range.
    fn check_progression(&self, start: isize, step: isize, count: usize) -> Result<(), BufferError> {
        let last = start + (count as isize - 1) * step;
        for index in [start, last] {
            if usize::try_from(index).map_or(true, |i| i >= self.size) {
                return Err(BufferError::IndexOutOfRange { index, len: self.size });
            }
        }
        Ok(())
    }

    fn write_at(&mut self, at: usize, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let start = self.offset + at;
        Arc::make_mut(&mut self.storage)[start..start + data.len()].copy_from_slice(data);
    }

    /// Replaces `removed` bytes at logical index `at` with a gap of `inserted` bytes whose
    /// contents are unspecified; callers overwrite the gap.
    ///
    /// The backing array is reallocated when the new size exceeds it, or falls below half of it
    /// and a smaller allocation would result. Otherwise whichever side of the edit holds fewer
    /// bytes is shifted within the existing storage. When only the longer side has room to move
    /// into, the contents are laid out afresh at the same capacity with the spare split as in
    /// [`reallocate`](Self::reallocate).
    fn replace_region(&mut self, at: usize, removed: usize, inserted: usize) {
        debug_assert!(at + removed <= self.size);
        let new_size = self.size - removed + inserted;
        let capacity = self.storage.len();
        let recommended = recommended_length(new_size);
        if new_size > capacity || (new_size < capacity / 2 && recommended < capacity) {
            self.reallocate(at, removed, inserted, recommended);
            return;
        }

        let left = at;
        let right = self.size - at - removed;
        let start = self.offset;
        let tail = start + at + removed;

        if inserted > removed {
            let grow = inserted - removed;
            let can_shift_left = start >= grow;
            let can_shift_right = start + self.size + grow <= capacity;
            let shift_left = match (can_shift_left, can_shift_right) {
                (true, true) => left <= right,
                (true, false) if left <= right => true,
                (false, true) if right <= left => false,
                // the room is all on the side of the longer part; moving it on every edit
                // would make repeated edits at the other end quadratic
                (true, false) | (false, true) => {
                    self.reallocate(at, removed, inserted, capacity);
                    return;
                }
                (false, false) => {
                    self.reallocate(at, removed, inserted, recommended.max(capacity));
                    return;
                }
            };
            let storage = Arc::make_mut(&mut self.storage);
            if shift_left {
                storage.copy_within(start..start + left, start - grow);
                self.offset = start - grow;
            } else {
                storage.copy_within(tail..tail + right, tail + grow);
            }
        } else if removed > inserted {
            let shrink = removed - inserted;
            let storage = Arc::make_mut(&mut self.storage);
            if left < right {
                storage.copy_within(start..start + left, start + shrink);
                self.offset = start + shrink;
            } else {
                storage.copy_within(tail..tail + right, tail - shrink);
            }
        }
        self.size = new_size;
    }

    /// Moves the contents into fresh storage of `new_capacity` bytes, leaving the gap for the
    /// edit in place.
    ///
    /// Spare space is split in the ratio of the bytes retained on the right to those retained
    /// on the left, so edits near the front leave room at the front and appends leave room at
    /// the back.
    fn reallocate(&mut self, at: usize, removed: usize, inserted: usize, new_capacity: usize) {
        let left = at;
        let right = self.size - at - removed;
        let new_size = left + inserted + right;
        debug_assert!(new_capacity >= new_size);
        let spare = new_capacity - new_size;
        let spare_left = if left + right == 0 {
            spare / 2
        } else {
            spare.checked_mul(right).map_or(spare / 2, |scaled| scaled / (left + right))
        };

        let mut storage = vec![0; new_capacity];
        let old = self.as_slice();
        storage[spare_left..spare_left + left].copy_from_slice(&old[..left]);
        let tail = spare_left + left + inserted;
        storage[tail..tail + right].copy_from_slice(&old[at + removed..]);

        self.storage = Arc::new(storage);
        self.offset = spare_left;
        self.size = new_size;
    }
}

impl PartialEq for ByteBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl Eq for ByteBuffer {}

impl fmt::Debug for ByteBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteBuffer")
            .field("data", &self.as_slice().escape_ascii().to_string())
            .field("offset", &self.offset)
            .field("capacity", &self.capacity())
            .field("mutable", &self.mutable)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_invariant(buf: &ByteBuffer) {
        assert!(buf.offset + buf.size <= buf.storage.len());
        if !buf.mutable {
            assert_eq!(buf.offset, 0);
            assert_eq!(buf.storage.len(), buf.size);
        }
    }

    #[test]
    fn recommended_length_rounds_to_alignment() {
        assert_eq!(recommended_length(0), 16);
        assert_eq!(recommended_length(1), 16);
        assert_eq!(recommended_length(20), 32);
        assert_eq!(recommended_length(100), 128);
    }

    #[test]
    fn append_leaves_spare_on_the_right() {
        let mut buf = ByteBuffer::mutable_from(b"0123456789");
        buf.append(b'x').unwrap();
        assert_eq!(buf.as_slice(), b"0123456789x");
        assert_eq!(buf.offset(), 0);
        check_invariant(&buf);
    }

    #[test]
    fn prepend_after_reallocation_leaves_spare_on_the_left() {
        let data = [7u8; 16];
        let mut buf = ByteBuffer::mutable_from(&data);
        assert_eq!(buf.capacity(), 32);
        // grow past capacity at the front: everything retained is on the right
        let big = [1u8; 20];
        buf.assign_slice(0, 0, 1, &big).unwrap();
        assert_eq!(buf.len(), 36);
        assert_eq!(buf.capacity(), recommended_length(36));
        assert_eq!(buf.offset(), buf.capacity() - 36);
        check_invariant(&buf);
    }

    #[test]
    fn insert_shifts_the_shorter_side() {
        let mut buf = ByteBuffer::mutable_from(b"abcdefgh");
        buf.delete(0).unwrap();
        // deleting at the front moves nothing: the window just advances
        assert_eq!(buf.offset(), 1);
        buf.insert(0, b'A').unwrap();
        assert_eq!(buf.offset(), 0);
        assert_eq!(buf.as_slice(), b"Abcdefgh");
        check_invariant(&buf);
    }

    #[test]
    fn appends_after_prepends_stop_moving_the_data() {
        let mut buf = ByteBuffer::mutable_from(&[0u8; 16]);
        for i in 0..200 {
            buf.insert(0, i as u8).unwrap();
        }
        // all spare room is now at the front
        let mut moves = 0;
        let mut reallocations = 0;
        for i in 0..200 {
            let (offset, capacity) = (buf.offset(), buf.capacity());
            buf.append(i as u8).unwrap();
            if buf.capacity() != capacity {
                reallocations += 1;
            } else if buf.offset() != offset {
                moves += 1;
            }
        }
        assert!(moves <= 1, "{moves} appends moved the whole buffer");
        assert!(reallocations <= 6, "{reallocations} reallocations for 200 appends");
        assert_eq!(buf.len(), 416);
        check_invariant(&buf);
    }

    #[test]
    fn prepends_after_appends_stop_moving_the_data() {
        let mut buf = ByteBuffer::mutable_from(&[0u8; 16]);
        for i in 0..200 {
            buf.append(i as u8).unwrap();
        }
        let mut moves = 0;
        for i in 0..200 {
            let (offset, capacity) = (buf.offset(), buf.capacity());
            buf.insert(0, i as u8).unwrap();
            // a cheap prepend only steps the window back by one
            if buf.capacity() == capacity && buf.offset() + 1 != offset {
                moves += 1;
            }
        }
        assert!(moves <= 1, "{moves} prepends moved the whole buffer");
        assert_eq!(buf.as_slice()[0], 199);
        check_invariant(&buf);
    }

    #[test]
    fn shrink_below_half_reallocates() {
        let mut buf = ByteBuffer::mutable_from(&[0u8; 100]);
        assert_eq!(buf.capacity(), 128);
        buf.delete_range(0, 90).unwrap();
        assert_eq!(buf.len(), 10);
        assert_eq!(buf.capacity(), recommended_length(10));
        check_invariant(&buf);
    }

    #[test]
    fn strided_delete_compacts_in_order() {
        let mut buf = ByteBuffer::mutable_from(b"0123456789");
        buf.delete_slice(1, 10, 3).unwrap();
        assert_eq!(buf.as_slice(), b"0235689");
        let mut backwards = ByteBuffer::mutable_from(b"0123456789");
        backwards.delete_slice(7, -1, -3).unwrap();
        assert_eq!(backwards.as_slice(), b"0235689");
        check_invariant(&buf);
    }

    #[test]
    fn immutable_rejects_mutation() {
        let mut buf = ByteBuffer::immutable_from(b"abc".to_vec());
        assert_eq!(buf.set(0, b'x'), Err(BufferError::Immutable));
        assert_eq!(buf.insert(0, b'x'), Err(BufferError::Immutable));
        assert_eq!(buf.delete(0), Err(BufferError::Immutable));
        let joined = buf.concat(b"def");
        assert!(!joined.is_mutable());
        assert_eq!(joined.as_slice(), b"abcdef");
        check_invariant(&joined);
    }
}
