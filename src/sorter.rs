//! In-memory chunk sorter.

use std::sync::Arc;

use log;
use rayon::slice::ParallelSliceMut;

use crate::buffer::ChunkBuffer;
use crate::record::Record;
use crate::sort::SortError;

/// Sorts a single chunk in memory.
///
/// The sorter materializes the whole input stream, so the chunk must fit into memory. Chunk sizing is
/// up to the caller. Equal records keep no particular order.
pub struct InMemorySorter {
    thread_pool: Arc<rayon::ThreadPool>,
}

impl InMemorySorter {
    /// Creates a sorter running the sort on the provided thread pool.
    pub fn new(thread_pool: Arc<rayon::ThreadPool>) -> Self {
        InMemorySorter { thread_pool }
    }

    /// Consumes the input stream and returns its records in ascending order.
    /// The first error item of the input aborts the sort and is returned.
    ///
    /// # Arguments
    /// * `input` - Chunk records
    /// * `buffer` - Buffer the records are collected to
    pub fn sort<T, I>(&self, input: I, mut buffer: ChunkBuffer<T>) -> Result<ChunkBuffer<T>, SortError>
    where
        T: Record,
        I: IntoIterator<Item = Result<T, SortError>>,
    {
        for item in input {
            buffer.push(item?);
        }

        log::debug!("sorting {} records ...", buffer.len());
        self.thread_pool.install(|| {
            buffer.par_sort_unstable();
        });

        return Ok(buffer);
    }
}
