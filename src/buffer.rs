//! Chunk buffer.

use rayon;

use crate::record::RECORD_SIZE;

/// In-memory buffer holding a single chunk's records while they are sorted.
pub struct ChunkBuffer<T> {
    inner: Vec<T>,
}

impl<T> ChunkBuffer<T> {
    pub fn new() -> Self {
        ChunkBuffer { inner: Vec::new() }
    }

    /// Creates a buffer preallocated for a chunk of the provided byte size.
    pub fn for_chunk_size(chunk_size: u64) -> Self {
        let records = usize::try_from(chunk_size / RECORD_SIZE as u64).unwrap_or(0);

        ChunkBuffer {
            inner: Vec::with_capacity(records),
        }
    }

    /// Adds a new element to the buffer.
    pub fn push(&mut self, item: T) {
        self.inner.push(item);
    }

    /// Returns buffer length.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl<T> Default for ChunkBuffer<T> {
    fn default() -> Self {
        ChunkBuffer::new()
    }
}

impl<T> IntoIterator for ChunkBuffer<T> {
    type Item = T;
    type IntoIter = <Vec<T> as IntoIterator>::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.into_iter()
    }
}

impl<T: Send> rayon::slice::ParallelSliceMut<T> for ChunkBuffer<T> {
    fn as_parallel_slice_mut(&mut self) -> &mut [T] {
        self.inner.as_mut_slice()
    }
}

#[cfg(test)]
mod test {
    use rayon::slice::ParallelSliceMut;

    use super::ChunkBuffer;

    #[test]
    fn test_chunk_buffer() {
        let mut buffer = ChunkBuffer::for_chunk_size(24);
        assert!(buffer.is_empty());

        buffer.push(3i64);
        buffer.push(1);
        buffer.push(2);
        assert_eq!(buffer.len(), 3);

        buffer.par_sort_unstable();
        let data = Vec::from_iter(buffer);
        assert_eq!(data, vec![1, 2, 3]);
    }
}
