//! Growable CPU-side vertex/index storage, mirrored lazily to the GPU.
//!
//! A [`VecBuffer`] is an append-only staging area for fixed-width records
//! (vertices or indices). It tracks a live span `[front, back)` inside a
//! backing `Vec` whose length only ever grows, and remembers how much of
//! that span the GPU has already seen so that [`VecBuffer::sync`] uploads
//! just the newly-written delta — or re-uploads everything when the backing
//! store outgrew the GPU allocation.
//!
//! The GPU side is abstracted behind [`BufferSink`] so the growth and sync
//! state machine can be exercised without a GL context; the production sink
//! is [`BufferObject`](crate::gl::BufferObject).

use bytemuck::Pod;

/// Which end of the buffer new records are written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Growth {
    /// New data lands at `back`, which advances toward capacity. The live
    /// span starts at offset 0 and grows upward.
    FromBack,
    /// New data lands below `front`, which retreats toward 0. The live span
    /// ends at capacity and grows downward, so the most recent records
    /// occupy the lowest offsets.
    FromFront,
}

/// Destination for buffer uploads: a GL buffer object, or a fake in tests.
///
/// Implementations are expected to be dumb byte stores; all policy (when to
/// reallocate, which range changed) lives in [`VecBuffer::sync`].
pub trait BufferSink {
    /// Replace the sink's entire allocation with `bytes`.
    fn reallocate(&mut self, bytes: &[u8]);

    /// Overwrite bytes starting at `byte_offset` within the current
    /// allocation. Never called with a range past the last `reallocate`.
    fn write(&mut self, byte_offset: usize, bytes: &[u8]);
}

/// Append-only record storage with incremental GPU synchronization.
///
/// `T` is the scalar element (`f32` for vertex data, `u32` for indices);
/// `stride` is the number of elements per record and is only used to
/// sanity-check appends and convert sizes to record units.
#[derive(Debug)]
pub struct VecBuffer<T: Pod> {
    data: Vec<T>,
    front: usize,
    back: usize,
    growth: Growth,
    stride: usize,
    /// Elements the sink has allocated. 0 until the first `sync`.
    sink_len: usize,
    /// Cursor position (element index) up to which the sink is current.
    synced: usize,
}

impl<T: Pod> VecBuffer<T> {
    /// Create a buffer with room for `initial` elements.
    ///
    /// `initial` is rounded up so the capacity is at least one record; the
    /// doubling growth scheme needs a non-zero starting size.
    #[must_use]
    pub fn new(initial: usize, stride: usize, growth: Growth) -> Self {
        let capacity = initial.max(stride).max(1);
        let data = vec![T::zeroed(); capacity];
        let (front, back) = match growth {
            Growth::FromBack => (0, 0),
            Growth::FromFront => (capacity, capacity),
        };
        Self {
            data,
            front,
            back,
            growth,
            stride,
            sink_len: 0,
            synced: front,
        }
    }

    /// Element offset of the start of the live span.
    #[must_use]
    pub fn front(&self) -> usize {
        self.front
    }

    /// Number of live elements (`back - front`).
    #[must_use]
    pub fn size(&self) -> usize {
        self.back - self.front
    }

    /// Whether the live span is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.back == self.front
    }

    /// Elements per record.
    #[must_use]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// The live span, oldest-first for [`Growth::FromBack`] and
    /// newest-first for [`Growth::FromFront`].
    #[must_use]
    pub fn live(&self) -> &[T] {
        &self.data[self.front..self.back]
    }

    /// Append one or more records.
    ///
    /// Doubles the backing storage as needed; the live span stays
    /// contiguous across growth, so record offsets previously derived from
    /// `front()` remain meaningful relative to the current cursors.
    pub fn add(&mut self, new: &[T]) {
        debug_assert_eq!(
            new.len() % self.stride,
            0,
            "append length must be a whole number of records"
        );
        let len = new.len();
        match self.growth {
            Growth::FromBack => {
                while self.back + len >= self.data.len() {
                    let grown = self.data.len() * 2;
                    self.data.resize(grown, T::zeroed());
                }
                self.data[self.back..self.back + len].copy_from_slice(new);
                self.back += len;
            }
            Growth::FromFront => {
                while self.front < len {
                    // Doubling by self-append keeps the live tail span
                    // intact at the upper end of the grown array.
                    let old = self.data.len();
                    self.data.extend_from_within(..);
                    self.front += old;
                    self.back += old;
                }
                self.front -= len;
                self.data[self.front..self.front + len].copy_from_slice(new);
            }
        }
    }

    /// Reset the live span without shrinking storage.
    ///
    /// Buffers reach a steady-state size after a few frames and are reused;
    /// the capacity (and the sink's allocation) survive across frames.
    pub fn clear(&mut self) {
        match self.growth {
            Growth::FromBack => {
                self.front = 0;
                self.back = 0;
                self.synced = 0;
            }
            Growth::FromFront => {
                self.front = self.data.len();
                self.back = self.data.len();
                self.synced = self.front;
            }
        }
    }

    /// Bring the sink up to date with the live span.
    ///
    /// If the backing storage outgrew the sink's allocation, the whole
    /// array is re-uploaded; otherwise only the elements written since the
    /// last `sync` are. Calling this twice in a row performs no upload the
    /// second time.
    pub fn sync(&mut self, sink: &mut impl BufferSink) {
        if self.sink_len < self.data.len() {
            sink.reallocate(bytemuck::cast_slice(&self.data));
            self.sink_len = self.data.len();
            self.synced = match self.growth {
                Growth::FromBack => self.back,
                Growth::FromFront => self.front,
            };
            return;
        }
        match self.growth {
            Growth::FromBack if self.synced < self.back => {
                let bytes = bytemuck::cast_slice(&self.data[self.synced..self.back]);
                sink.write(self.synced * std::mem::size_of::<T>(), bytes);
                self.synced = self.back;
            }
            Growth::FromFront if self.synced > self.front => {
                let bytes = bytemuck::cast_slice(&self.data[self.front..self.synced]);
                sink.write(self.front * std::mem::size_of::<T>(), bytes);
                self.synced = self.front;
            }
            _ => {}
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// A byte store that mirrors what a GL buffer object would hold and
    /// counts the calls made to it.
    #[derive(Default)]
    struct RecordingSink {
        storage: Vec<u8>,
        reallocations: usize,
        writes: Vec<(usize, usize)>,
    }

    impl BufferSink for RecordingSink {
        fn reallocate(&mut self, bytes: &[u8]) {
            self.storage = bytes.to_vec();
            self.reallocations += 1;
        }

        fn write(&mut self, byte_offset: usize, bytes: &[u8]) {
            assert!(
                byte_offset + bytes.len() <= self.storage.len(),
                "write past sink allocation"
            );
            self.storage[byte_offset..byte_offset + bytes.len()].copy_from_slice(bytes);
            self.writes.push((byte_offset, bytes.len()));
        }
    }

    impl RecordingSink {
        /// The sink's view of the live span, for mirror checks.
        fn live_view(&self, buf: &VecBuffer<f32>) -> Vec<f32> {
            let lo = buf.front() * 4;
            let hi = (buf.front() + buf.size()) * 4;
            bytemuck::cast_slice(&self.storage[lo..hi]).to_vec()
        }
    }

    #[test]
    fn append_from_back_keeps_submission_order() {
        let mut buf = VecBuffer::<f32>::new(4, 2, Growth::FromBack);
        buf.add(&[1.0, 2.0]);
        buf.add(&[3.0, 4.0, 5.0, 6.0]);
        assert_eq!(buf.front(), 0);
        assert_eq!(buf.size(), 6);
        assert_eq!(buf.live(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn append_from_front_puts_newest_lowest() {
        let mut buf = VecBuffer::<f32>::new(8, 2, Growth::FromFront);
        buf.add(&[1.0, 2.0]);
        buf.add(&[3.0, 4.0]);
        assert_eq!(buf.size(), 4);
        assert_eq!(buf.live(), &[3.0, 4.0, 1.0, 2.0]);
    }

    #[test]
    fn growth_from_back_preserves_content() {
        let mut buf = VecBuffer::<f32>::new(2, 1, Growth::FromBack);
        let records: Vec<f32> = (0..100).map(|i| i as f32).collect();
        for r in &records {
            buf.add(&[*r]);
        }
        assert_eq!(buf.live(), records.as_slice());
    }

    #[test]
    fn growth_from_front_preserves_tail_span() {
        let mut buf = VecBuffer::<f32>::new(2, 1, Growth::FromFront);
        for i in 0..100 {
            buf.add(&[i as f32]);
        }
        // Newest-first: 99, 98, ..., 0.
        let expected: Vec<f32> = (0..100).rev().map(|i| i as f32).collect();
        assert_eq!(buf.live(), expected.as_slice());
        assert_eq!(buf.size(), 100);
    }

    #[test]
    fn clear_resets_span_not_capacity() {
        let mut buf = VecBuffer::<f32>::new(2, 1, Growth::FromBack);
        for i in 0..50 {
            buf.add(&[i as f32]);
        }
        let capacity_before = buf.data.len();
        buf.clear();
        assert_eq!(buf.size(), 0);
        assert!(buf.is_empty());
        assert_eq!(buf.data.len(), capacity_before);
    }

    #[test]
    fn sync_uploads_only_the_delta() {
        let mut buf = VecBuffer::<f32>::new(64, 1, Growth::FromBack);
        let mut sink = RecordingSink::default();

        buf.add(&[1.0, 2.0]);
        buf.sync(&mut sink);
        assert_eq!(sink.reallocations, 1);
        assert!(sink.writes.is_empty());

        buf.add(&[3.0]);
        buf.sync(&mut sink);
        // One sub-range write: element 2, one f32.
        assert_eq!(sink.writes, vec![(8, 4)]);
        assert_eq!(sink.live_view(&buf), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn sync_is_idempotent() {
        let mut buf = VecBuffer::<f32>::new(16, 1, Growth::FromBack);
        let mut sink = RecordingSink::default();
        buf.add(&[1.0, 2.0, 3.0]);
        buf.sync(&mut sink);
        let (reallocs, writes) = (sink.reallocations, sink.writes.len());
        buf.sync(&mut sink);
        assert_eq!(sink.reallocations, reallocs);
        assert_eq!(sink.writes.len(), writes);
    }

    #[test]
    fn sync_after_growth_reuploads_everything() {
        let mut buf = VecBuffer::<f32>::new(2, 1, Growth::FromBack);
        let mut sink = RecordingSink::default();
        buf.add(&[1.0]);
        buf.sync(&mut sink);
        assert_eq!(sink.reallocations, 1);

        // Force a doubling, then sync again: full re-upload, no sub-write.
        buf.add(&[2.0, 3.0, 4.0]);
        buf.sync(&mut sink);
        assert_eq!(sink.reallocations, 2);
        assert!(sink.writes.is_empty());
        assert_eq!(sink.live_view(&buf), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn sync_mirrors_front_mode_deltas() {
        let mut buf = VecBuffer::<f32>::new(64, 1, Growth::FromFront);
        let mut sink = RecordingSink::default();
        buf.add(&[1.0]);
        buf.sync(&mut sink);
        buf.add(&[2.0]);
        buf.add(&[3.0]);
        buf.sync(&mut sink);
        // Delta covers the two records written below the old front.
        assert_eq!(sink.writes.len(), 1);
        assert_eq!(sink.live_view(&buf), vec![3.0, 2.0, 1.0]);
    }

    #[test]
    fn clear_then_sync_behaves_like_fresh_buffer() {
        let mut buf = VecBuffer::<f32>::new(8, 1, Growth::FromBack);
        let mut sink = RecordingSink::default();
        buf.add(&[1.0, 2.0]);
        buf.sync(&mut sink);
        buf.clear();
        buf.sync(&mut sink);
        // Nothing live, nothing to upload.
        assert_eq!(sink.reallocations, 1);
        assert!(sink.writes.is_empty());
        assert_eq!(buf.size(), 0);

        buf.add(&[9.0]);
        buf.sync(&mut sink);
        assert_eq!(sink.live_view(&buf), vec![9.0]);
    }

    #[test]
    fn index_buffers_share_the_implementation() {
        let mut buf = VecBuffer::<u32>::new(1, 1, Growth::FromBack);
        buf.add(&[0, 1, 2, u32::MAX]);
        assert_eq!(buf.live(), &[0, 1, 2, u32::MAX]);
    }
}
