//! `ext-merge-sort` is a parallel external merge sort of fixed-width binary integer records.
//!
//! External sorting is a class of sorting algorithms that can handle massive amounts of data. External sorting
//! is required when the data being sorted do not fit into the main memory (RAM) of a computer and instead must be
//! resided in slower external memory, usually a hard disk drive. For more information see
//! [External Sorting](https://en.wikipedia.org/wiki/External_sorting).
//!
//! # Overview
//!
//! The input is a flat sequence of 8-byte big-endian integers without any header or delimiters.
//! It is split into a number of chunks and sorted by a pipeline of concurrent stages:
//!
//! * **Sources:** every chunk is read through its own file handle and decoded lazily.
//! * **Sorters:** every chunk is collected into memory and sorted on a shared thread pool.
//! * **Merge tree:** sorted chunks are merged pairwise by a balanced binary tree of merge stages.
//!
//! Stages run in their own threads and are connected by bounded queues, so a slow consumer holds back its
//! producers instead of letting them buffer unbounded data. The first error cancels the whole pipeline.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use ext_merge_sort::{PipelineSorter, PipelineSorterBuilder};
//!
//! fn main() {
//!     let sorter: PipelineSorter<i64> = PipelineSorterBuilder::new()
//!         .with_chunk_count(4)
//!         .build()
//!         .unwrap();
//!
//!     let mut sorted = sorter.sort_file(Path::new("input.bin")).unwrap();
//!     sorted.write_to_file(Path::new("output.bin"), None).unwrap();
//! }
//! ```

pub mod buffer;
pub mod merger;
pub mod record;
pub mod sink;
pub mod sort;
pub mod sorter;
pub mod source;
pub mod stats;
pub mod stream;

pub use buffer::ChunkBuffer;
pub use merger::{build_merge_tree, merge_all, TwoWayMerger};
pub use record::{encode_all, Record, RECORD_SIZE};
pub use sink::StreamSink;
pub use sort::{split_chunks, ChunkRange, PipelineSorter, PipelineSorterBuilder, SortError, SortedStream};
pub use sorter::InMemorySorter;
pub use source::{Input, ReaderSource, TruncatedRecordPolicy};
pub use stats::SortReport;
pub use stream::{CancelToken, RecordStream};
