//! Pipeline sorter.

use log;
use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::fs;
use std::io;
use std::io::{Read, Write};
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;
use std::thread;

use crate::buffer::ChunkBuffer;
use crate::merger::{build_merge_tree, TwoWayMerger};
use crate::record::{Record, RECORD_SIZE};
use crate::sink::{self, StreamSink};
use crate::sorter::InMemorySorter;
use crate::source::{Input, ReaderSource, TruncatedRecordPolicy};
use crate::stats::{PipelineStats, SortReport};
use crate::stream::{self, spawn_stage, CancelToken, RecordStream, StreamSender, DEFAULT_QUEUE_CAPACITY};

/// Merge tree node output, or the error that prevented the node from being started.
type PendingStream<T> = Result<RecordStream<T>, SortError>;

/// Default number of chunks the input is split into.
pub const DEFAULT_CHUNK_COUNT: usize = 4;

/// Sorting error.
#[derive(Debug)]
pub enum SortError {
    /// Chunk count is not positive.
    InvalidChunkCount(usize),
    /// Workers thread pool initialization error.
    ThreadPoolBuildError(rayon::ThreadPoolBuildError),
    /// Pipeline stage thread creation error.
    ThreadSpawn(io::Error),
    /// Input opening or positioning error.
    InputOpen(io::Error),
    /// Input read error.
    IO(io::Error),
    /// Input ends with a partial record.
    TruncatedRecord { offset: u64, len: usize },
    /// Output write error.
    Output(io::Error),
    /// Sorting pipeline has been cancelled.
    Cancelled,
    /// Pipeline stage thread panicked.
    StagePanicked(String),
}

impl Error for SortError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self {
            SortError::ThreadPoolBuildError(err) => Some(err),
            SortError::ThreadSpawn(err) => Some(err),
            SortError::InputOpen(err) => Some(err),
            SortError::IO(err) => Some(err),
            SortError::Output(err) => Some(err),
            SortError::InvalidChunkCount(_)
            | SortError::TruncatedRecord { .. }
            | SortError::Cancelled
            | SortError::StagePanicked(_) => None,
        }
    }
}

impl Display for SortError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            SortError::InvalidChunkCount(count) => write!(f, "invalid chunk count: {}", count),
            SortError::ThreadPoolBuildError(err) => write!(f, "thread pool initialization failed: {}", err),
            SortError::ThreadSpawn(err) => write!(f, "pipeline stage not started: {}", err),
            SortError::InputOpen(err) => write!(f, "input not opened: {}", err),
            SortError::IO(err) => write!(f, "I/O operation failed: {}", err),
            SortError::TruncatedRecord { offset, len } => {
                write!(f, "truncated record at offset {}: {} of {} bytes", offset, len, RECORD_SIZE)
            }
            SortError::Output(err) => write!(f, "output write failed: {}", err),
            SortError::Cancelled => write!(f, "sorting cancelled"),
            SortError::StagePanicked(stage) => write!(f, "pipeline stage {} panicked", stage),
        }
    }
}

/// Half-open byte range `[offset, offset + size)` of the input sorted by a single sorter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRange {
    pub offset: u64,
    pub size: u64,
}

impl ChunkRange {
    /// Chunk end offset (exclusive).
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }
}

/// Splits an input into contiguous chunks aligned to record boundaries.
///
/// Whole records are distributed as evenly as possible: the first `records % chunk_count` chunks get one record
/// more than the rest. The last chunk also covers trailing bytes that do not form a whole record.
/// The chunks never overlap and cover the whole input.
///
/// # Arguments
/// * `input_len` - Input length in bytes
/// * `chunk_count` - Number of chunks, must be positive
pub fn split_chunks(input_len: u64, chunk_count: usize) -> Result<Vec<ChunkRange>, SortError> {
    if chunk_count == 0 {
        return Err(SortError::InvalidChunkCount(chunk_count));
    }

    let record_size = RECORD_SIZE as u64;
    let count = chunk_count as u64;
    let records = input_len / record_size;
    let (base, extra) = (records / count, records % count);

    let mut chunks = Vec::with_capacity(chunk_count);
    let mut offset = 0;
    for idx in 0..count {
        let mut size = (base + u64::from(idx < extra)) * record_size;
        if idx == count - 1 {
            size += input_len % record_size;
        }

        chunks.push(ChunkRange { offset, size });
        offset += size;
    }

    return Ok(chunks);
}

/// Pipeline sorter builder. Provides methods for [`PipelineSorter`] initialization.
#[derive(Clone)]
pub struct PipelineSorterBuilder<T: Record = i64> {
    /// Number of chunks the input is split into.
    chunk_count: usize,
    /// Number of threads to be used to sort chunks.
    threads_number: Option<usize>,
    /// Capacity of the queues between pipeline stages.
    queue_capacity: usize,
    /// Input read buffer size.
    rw_buf_size: Option<usize>,
    /// Truncated record behaviour.
    truncated_records: TruncatedRecordPolicy,

    /// Record type.
    item_type: PhantomData<T>,
}

impl<T: Record> PipelineSorterBuilder<T> {
    /// Creates an instance of a builder with default parameters.
    pub fn new() -> Self {
        PipelineSorterBuilder::default()
    }

    /// Builds a [`PipelineSorter`] instance using provided configuration.
    pub fn build(self) -> Result<PipelineSorter<T>, SortError> {
        PipelineSorter::new(
            self.chunk_count,
            self.threads_number,
            self.queue_capacity,
            self.rw_buf_size,
            self.truncated_records,
        )
    }

    /// Sets number of chunks the input is split into. Each chunk is read and sorted by its own stage.
    pub fn with_chunk_count(mut self, chunk_count: usize) -> PipelineSorterBuilder<T> {
        self.chunk_count = chunk_count;
        return self;
    }

    /// Sets number of threads to be used to sort chunks.
    pub fn with_threads_number(mut self, threads_number: usize) -> PipelineSorterBuilder<T> {
        self.threads_number = Some(threads_number);
        return self;
    }

    /// Sets capacity (in records) of the queues between pipeline stages.
    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> PipelineSorterBuilder<T> {
        self.queue_capacity = queue_capacity;
        return self;
    }

    /// Sets input read buffer size.
    pub fn with_rw_buf_size(mut self, buf_size: usize) -> PipelineSorterBuilder<T> {
        self.rw_buf_size = Some(buf_size);
        return self;
    }

    /// Sets truncated record behaviour.
    pub fn with_truncated_records(mut self, policy: TruncatedRecordPolicy) -> PipelineSorterBuilder<T> {
        self.truncated_records = policy;
        return self;
    }
}

impl<T: Record> Default for PipelineSorterBuilder<T> {
    fn default() -> Self {
        PipelineSorterBuilder {
            chunk_count: DEFAULT_CHUNK_COUNT,
            threads_number: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            rw_buf_size: None,
            truncated_records: TruncatedRecordPolicy::default(),
            item_type: PhantomData,
        }
    }
}

/// Parallel external merge sorter.
///
/// The input is split into chunks. Every chunk is read by its own source stage and sorted in memory by its own
/// sorter stage, then the sorted chunks are merged by a binary tree of merge stages. All the stages run
/// concurrently and are connected by bounded queues.
pub struct PipelineSorter<T: Record = i64> {
    /// Chunk sorting thread pool.
    thread_pool: Arc<rayon::ThreadPool>,
    /// Number of chunks the input is split into.
    chunk_count: usize,
    /// Capacity of the queues between pipeline stages.
    queue_capacity: usize,
    /// Input read buffer size.
    rw_buf_size: Option<usize>,
    /// Truncated record behaviour.
    truncated_records: TruncatedRecordPolicy,

    /// Record type.
    item_type: PhantomData<T>,
}

impl<T: Record> PipelineSorter<T> {
    /// Creates a new pipeline sorter instance.
    ///
    /// # Arguments
    /// * `chunk_count` - Number of chunks the input is split into.
    /// * `threads_number` - Number of threads to be used to sort chunks. If the parameter is [`None`]
    ///   threads number will be selected based on available CPU core number.
    /// * `queue_capacity` - Capacity (in records) of the queues between pipeline stages.
    /// * `rw_buf_size` - Input read buffer size.
    /// * `truncated_records` - Truncated record behaviour.
    pub fn new(
        chunk_count: usize,
        threads_number: Option<usize>,
        queue_capacity: usize,
        rw_buf_size: Option<usize>,
        truncated_records: TruncatedRecordPolicy,
    ) -> Result<Self, SortError> {
        if chunk_count == 0 {
            return Err(SortError::InvalidChunkCount(chunk_count));
        }

        return Ok(PipelineSorter {
            thread_pool: Arc::new(Self::init_thread_pool(threads_number)?),
            chunk_count,
            queue_capacity,
            rw_buf_size,
            truncated_records,
            item_type: PhantomData,
        });
    }

    fn init_thread_pool(threads_number: Option<usize>) -> Result<rayon::ThreadPool, SortError> {
        let mut thread_pool_builder = rayon::ThreadPoolBuilder::new();

        if let Some(threads_number) = threads_number {
            log::info!("initializing thread-pool (threads: {})", threads_number);
            thread_pool_builder = thread_pool_builder.num_threads(threads_number);
        } else {
            log::info!("initializing thread-pool (threads: default)");
        }
        let thread_pool = thread_pool_builder
            .build()
            .map_err(|err| SortError::ThreadPoolBuildError(err))?;

        return Ok(thread_pool);
    }

    /// Sorts a file. The input length is taken from the file metadata.
    pub fn sort_file(&self, path: &Path) -> Result<SortedStream<T>, SortError> {
        let input_len = fs::metadata(path).map_err(SortError::InputOpen)?.len();

        self.sort(path, input_len)
    }

    /// Sorts data from the input.
    /// Returns an iterator that can be used to get sorted data stream.
    ///
    /// All the chunk readers are opened before any stage is started, so an input that can't be opened
    /// fails the call without producing anything.
    ///
    /// # Arguments
    /// * `input` - Input medium data to be fetched from
    /// * `input_len` - Input length in bytes
    pub fn sort<I>(&self, input: &I, input_len: u64) -> Result<SortedStream<T>, SortError>
    where
        I: Input + ?Sized,
    {
        let chunks = split_chunks(input_len, self.chunk_count)?;
        log::info!("sorting {} bytes in {} chunks", input_len, chunks.len());

        let mut readers = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            readers.push(input.open_at(chunk.offset).map_err(SortError::InputOpen)?);
        }

        let cancel = CancelToken::new();
        let stats = Arc::new(PipelineStats::new());
        let mut stages = Vec::new();

        return match self.start_stages(chunks, readers, &cancel, &stats, &mut stages) {
            Ok(stream) => Ok(SortedStream {
                stream,
                stages,
                cancel,
                stats,
                finished: false,
            }),
            Err(err) => {
                cancel.cancel();
                for stage in stages {
                    let _ = stage.join();
                }
                Err(err)
            }
        };
    }

    fn start_stages<R>(
        &self,
        chunks: Vec<ChunkRange>,
        readers: Vec<R>,
        cancel: &CancelToken,
        stats: &Arc<PipelineStats>,
        stages: &mut Vec<thread::JoinHandle<()>>,
    ) -> Result<RecordStream<T>, SortError>
    where
        R: Read + Send + 'static,
    {
        let mut sorted_chunks = Vec::with_capacity(chunks.len());

        for (idx, (chunk, reader)) in chunks.into_iter().zip(readers).enumerate() {
            log::debug!("chunk {}: bytes {}..{}", idx, chunk.offset, chunk.end());
            let source = ReaderSource::new(
                reader,
                chunk.offset,
                Some(chunk.size),
                self.rw_buf_size,
                self.truncated_records,
            );

            let (source_tx, source_rx) = stream::bounded(self.queue_capacity, cancel);
            let stage_stats = stats.clone();
            stages.push(spawn_stage(format!("source-{}", idx), move || {
                run_source(idx, source, source_tx, &stage_stats)
            })?);

            let (sorted_tx, sorted_rx) = stream::bounded(self.queue_capacity, cancel);
            let sorter = InMemorySorter::new(self.thread_pool.clone());
            let stage_stats = stats.clone();
            stages.push(spawn_stage(format!("sorter-{}", idx), move || {
                run_sorter(idx, chunk, sorter, source_rx, sorted_tx, &stage_stats)
            })?);

            sorted_chunks.push(Ok(sorted_rx));
        }

        let mut merge_idx = 0;
        let mut merge_node = |left: PendingStream<T>, right: PendingStream<T>| -> PendingStream<T> {
            let (left, right) = (left?, right?);
            let (merged_tx, merged_rx) = stream::bounded(self.queue_capacity, cancel);
            let stage_stats = stats.clone();
            let idx = merge_idx;
            merge_idx += 1;

            stages.push(spawn_stage(format!("merge-{}", idx), move || {
                run_merge(idx, left, right, merged_tx, &stage_stats)
            })?);

            Ok(merged_rx)
        };

        // chunk count is validated on construction so the tree is never empty
        let merged = build_merge_tree(sorted_chunks, &mut merge_node);
        return merged.unwrap_or(Err(SortError::InvalidChunkCount(0)));
    }
}

fn run_source<R: Read, T: Record>(
    idx: usize,
    mut source: ReaderSource<R, T>,
    tx: StreamSender<T>,
    stats: &PipelineStats,
) {
    let start_offset = source.offset();
    tx.send_all(&mut source);

    let bytes = source.offset() - start_offset;
    stats.add_chunk_read(bytes / RECORD_SIZE as u64, bytes);
    log::debug!("chunk {} read done: {} bytes, elapsed {:?}", idx, bytes, stats.elapsed());
}

fn run_sorter<T: Record>(
    idx: usize,
    chunk: ChunkRange,
    sorter: InMemorySorter,
    rx: RecordStream<T>,
    tx: StreamSender<T>,
    stats: &PipelineStats,
) {
    match sorter.sort(rx, ChunkBuffer::for_chunk_size(chunk.size)) {
        Ok(buffer) => {
            stats.add_chunk_sorted();
            log::debug!(
                "chunk {} sorted: {} records, elapsed {:?}",
                idx,
                buffer.len(),
                stats.elapsed()
            );
            tx.send_all(buffer.into_iter().map(Ok));
        }
        Err(err) => {
            tx.send(Err(err));
        }
    }
}

fn run_merge<T: Record>(
    idx: usize,
    left: RecordStream<T>,
    right: RecordStream<T>,
    tx: StreamSender<T>,
    stats: &PipelineStats,
) {
    if tx.send_all(TwoWayMerger::new(left, right)) {
        stats.add_merge_completed();
        log::debug!("merge {} done, elapsed {:?}", idx, stats.elapsed());
    }
}

/// Sorted record stream produced by a [`PipelineSorter`].
///
/// The first error item is fatal: it cancels the whole pipeline and ends the stream.
/// Dropping the stream cancels all the stages that are still running and waits for them to exit.
pub struct SortedStream<T> {
    stream: RecordStream<T>,
    stages: Vec<thread::JoinHandle<()>>,
    cancel: CancelToken,
    stats: Arc<PipelineStats>,
    finished: bool,
}

impl<T> SortedStream<T> {
    /// Cancels the sorting. The stream returns [`SortError::Cancelled`] and ends.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns the pipeline cancellation token.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Returns the run statistics collected so far.
    pub fn report(&self) -> SortReport {
        self.stats.report()
    }

    /// Waits for all the stages to exit. Returns an error if any of them panicked.
    fn join_stages(&mut self) -> Option<SortError> {
        let mut result = None;
        for stage in self.stages.drain(..) {
            let name = stage.thread().name().unwrap_or("unnamed").to_string();
            if stage.join().is_err() {
                log::error!("pipeline stage {} panicked", name);
                result.get_or_insert(SortError::StagePanicked(name));
            }
        }

        return result;
    }

    /// Stops the pipeline: cancels every stage still running and waits for them to exit.
    fn abort(&mut self) {
        self.finished = true;
        self.cancel.cancel();
        self.join_stages();
    }
}

impl<T: Record> SortedStream<T> {
    /// Writes the remaining records to the sink.
    /// A failure cancels the whole pipeline, so no stage keeps its chunk in memory after the error.
    /// Returns the number of records written by this call.
    pub fn write_into<W: Write>(&mut self, sink: &mut StreamSink<W>) -> Result<u64, SortError> {
        let result = sink.write_all(&mut *self);
        if result.is_err() {
            self.abort();
        }

        return result;
    }

    /// Writes the remaining records to a file, see [`sink::write_to_file`].
    /// A failure cancels the whole pipeline.
    ///
    /// # Arguments
    /// * `path` - Output file path
    /// * `buf_size` - Write buffer size. If the parameter is [`None`] the default buffer size is used.
    pub fn write_to_file(&mut self, path: &Path, buf_size: Option<usize>) -> Result<u64, SortError> {
        let result = sink::write_to_file(&mut *self, path, buf_size);
        if result.is_err() {
            self.abort();
        }

        return result;
    }
}

impl<T> Iterator for SortedStream<T> {
    type Item = Result<T, SortError>;

    /// Returns the next record in ascending order.
    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.stream.next() {
            Some(Ok(item)) => Some(Ok(item)),
            Some(Err(err)) => {
                self.abort();
                Some(Err(err))
            }
            None => {
                self.finished = true;
                let panicked = self.join_stages();
                if panicked.is_none() {
                    log::debug!("external sort done, elapsed {:?}", self.stats.elapsed());
                }
                panicked.map(Err)
            }
        }
    }
}

impl<T> Drop for SortedStream<T> {
    fn drop(&mut self) {
        self.abort();
    }
}

#[cfg(test)]
mod test {
    use std::fs;
    use std::io::{self, Write};
    use std::path::Path;
    use std::sync::Arc;

    use rand::seq::SliceRandom;
    use rand::Rng;
    use rstest::*;

    use super::{split_chunks, ChunkRange, PipelineSorter, PipelineSorterBuilder, SortError};
    use crate::record::encode_all;
    use crate::sink::StreamSink;
    use crate::source::TruncatedRecordPolicy;

    fn sorter<T: crate::Record>(chunk_count: usize) -> PipelineSorter<T> {
        PipelineSorterBuilder::new()
            .with_chunk_count(chunk_count)
            .with_threads_number(2)
            .with_queue_capacity(4)
            .build()
            .unwrap()
    }

    fn sort_bytes<T: crate::Record>(sorter: &PipelineSorter<T>, data: Vec<u8>) -> Result<Vec<T>, SortError> {
        let input_len = data.len() as u64;
        let input: Arc<[u8]> = data.into();

        sorter.sort(&input, input_len)?.collect()
    }

    #[rstest]
    #[case(64, 2, vec![(0, 32), (32, 32)])]
    #[case(56, 3, vec![(0, 24), (24, 16), (40, 16)])]
    #[case(60, 3, vec![(0, 24), (24, 16), (40, 20)])]
    #[case(16, 4, vec![(0, 8), (8, 8), (16, 0), (16, 0)])]
    #[case(0, 2, vec![(0, 0), (0, 0)])]
    #[case(5, 1, vec![(0, 5)])]
    fn test_split_chunks(#[case] input_len: u64, #[case] chunk_count: usize, #[case] expected: Vec<(u64, u64)>) {
        let expected = Vec::from_iter(expected.into_iter().map(|(offset, size)| ChunkRange { offset, size }));

        assert_eq!(split_chunks(input_len, chunk_count).unwrap(), expected);
    }

    #[test]
    fn test_split_chunks_partition() {
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            let input_len = rng.gen_range(0..10_000u64);
            let chunk_count = rng.gen_range(1..50usize);

            let chunks = split_chunks(input_len, chunk_count).unwrap();
            assert_eq!(chunks.len(), chunk_count);
            assert_eq!(chunks[0].offset, 0);
            assert_eq!(chunks[chunk_count - 1].end(), input_len);
            for pair in chunks.windows(2) {
                assert_eq!(pair[0].end(), pair[1].offset);
                assert_eq!(pair[0].offset % 8, 0);
            }
        }
    }

    #[test]
    fn test_invalid_chunk_count() {
        assert!(matches!(split_chunks(64, 0), Err(SortError::InvalidChunkCount(0))));

        let result = PipelineSorterBuilder::<i64>::new().with_chunk_count(0).build();
        assert!(matches!(result, Err(SortError::InvalidChunkCount(0))));
    }

    #[test]
    fn test_sort_scenario() {
        let data = encode_all(vec![5i64, 3, 9, 1, 3, 7, 2, 8]);

        let actual = sort_bytes(&sorter::<i64>(2), data).unwrap();
        assert_eq!(actual, vec![1, 2, 3, 3, 5, 7, 8, 9]);
    }

    #[rstest]
    #[case(1)]
    #[case(3)]
    fn test_sort_empty_input(#[case] chunk_count: usize) {
        let actual = sort_bytes(&sorter::<i64>(chunk_count), Vec::new()).unwrap();
        assert!(actual.is_empty());
    }

    #[test]
    fn test_sort_uneven_split() {
        let data = encode_all(vec![4i64, -6, 1, 0, 9, -2, 4]);

        let actual = sort_bytes(&sorter::<i64>(3), data).unwrap();
        assert_eq!(actual, vec![-6, -2, 0, 1, 4, 4, 9]);
    }

    #[rstest]
    #[case(1)]
    #[case(2)]
    #[case(5)]
    #[case(8)]
    #[case(33)]
    fn test_sort_shuffled(#[case] chunk_count: usize) {
        let mut rng = rand::thread_rng();
        let mut input = Vec::from_iter((0..1000).map(|_| rng.gen_range(-100i64..100)));
        input.shuffle(&mut rng);

        let mut expected = input.clone();
        expected.sort();

        let actual = sort_bytes(&sorter::<i64>(chunk_count), encode_all(input)).unwrap();
        assert_eq!(actual.len(), expected.len());
        assert!(actual.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_sort_unsigned_order() {
        let data = encode_all(vec![u64::MAX, 0, 1 << 63, 7]);

        let actual = sort_bytes(&sorter::<u64>(2), data).unwrap();
        assert_eq!(actual, vec![0, 7, 1 << 63, u64::MAX]);
    }

    #[test]
    fn test_sort_is_idempotent() {
        let mut input = Vec::from_iter(0i64..500);
        input.shuffle(&mut rand::thread_rng());

        let sorter = sorter::<i64>(4);
        let once = sort_bytes(&sorter, encode_all(input)).unwrap();
        let twice = sort_bytes(&sorter, encode_all(once.clone())).unwrap();
        assert_eq!(twice, once);
    }

    #[test]
    fn test_sort_truncated_tail() {
        let mut data = encode_all(vec![3i64, 1, 2]);
        data.extend_from_slice(&[0xff; 5]);

        let actual = sort_bytes(&sorter::<i64>(2), data.clone()).unwrap();
        assert_eq!(actual, vec![1, 2, 3]);

        let strict: PipelineSorter<i64> = PipelineSorterBuilder::new()
            .with_chunk_count(2)
            .with_truncated_records(TruncatedRecordPolicy::Error)
            .build()
            .unwrap();
        let result = sort_bytes(&strict, data);
        assert!(matches!(result, Err(SortError::TruncatedRecord { offset: 24, len: 5 })));
    }

    #[test]
    fn test_sort_file() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let path = tmp_dir.path().join("input.bin");
        let mut input = Vec::from_iter(0i64..2000);
        input.shuffle(&mut rand::thread_rng());
        fs::write(&path, encode_all(input)).unwrap();

        let stream = sorter::<i64>(4).sort_file(&path).unwrap();
        let actual: Result<Vec<i64>, _> = stream.collect();
        assert_eq!(actual.unwrap(), Vec::from_iter(0i64..2000));
    }

    #[test]
    fn test_sort_missing_file() {
        let result = sorter::<i64>(2).sort(Path::new("./missing-input.bin"), 64);
        assert!(matches!(result, Err(SortError::InputOpen(_))));
    }

    #[test]
    fn test_sort_report() {
        let data = encode_all(Vec::from_iter((0i64..100).rev()));
        let input: Arc<[u8]> = data.into();

        let mut stream = sorter::<i64>(5).sort(&input, 800).unwrap();
        let actual: Result<Vec<i64>, _> = stream.by_ref().collect();
        assert_eq!(actual.unwrap(), Vec::from_iter(0i64..100));

        let report = stream.report();
        assert_eq!(report.records_read, 100);
        assert_eq!(report.bytes_read, 800);
        assert_eq!(report.chunks_sorted, 5);
        assert_eq!(report.merges_completed, 4);
    }

    #[test]
    fn test_sort_cancel() {
        let data = encode_all(Vec::from_iter((0i64..10_000).rev()));
        let input: Arc<[u8]> = data.into();

        let mut stream = sorter::<i64>(4).sort(&input, 80_000).unwrap();
        assert_eq!(stream.next().unwrap().unwrap(), 0);

        stream.cancel();
        assert!(matches!(stream.next(), Some(Err(SortError::Cancelled))));
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_drop_stops_pipeline() {
        let data = encode_all(Vec::from_iter(0i64..10_000));
        let input: Arc<[u8]> = data.into();

        let mut stream = sorter::<i64>(8).sort(&input, 80_000).unwrap();
        let head = Vec::from_iter(stream.by_ref().take(3).map(Result::unwrap));
        assert_eq!(head, vec![0, 1, 2]);

        let cancel = stream.cancel_token();
        drop(stream);
        assert!(cancel.is_cancelled());
    }

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_failure_stops_pipeline() {
        let data = encode_all(Vec::from_iter((0i64..100_000).rev()));
        let input: Arc<[u8]> = data.into();

        let mut stream = sorter::<i64>(4).sort(&input, 800_000).unwrap();
        let mut sink = StreamSink::new(FailingWriter, Some(0));

        let result = stream.write_into(&mut sink);
        assert!(matches!(result, Err(SortError::Output(_))));
        assert!(stream.cancel_token().is_cancelled());
        assert!(stream.stages.is_empty());
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_write_to_file() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let path = tmp_dir.path().join("output.bin");
        let data = encode_all(Vec::from_iter((0i64..1000).rev()));
        let input: Arc<[u8]> = data.into();

        let mut stream = sorter::<i64>(3).sort(&input, 8000).unwrap();
        assert_eq!(stream.write_to_file(&path, None).unwrap(), 1000);
        assert_eq!(fs::read(&path).unwrap(), encode_all(Vec::from_iter(0i64..1000)));
    }

    #[test]
    fn test_write_to_file_failure_stops_pipeline() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let path = tmp_dir.path().join("missing").join("output.bin");
        let data = encode_all(Vec::from_iter((0i64..10_000).rev()));
        let input: Arc<[u8]> = data.into();

        let mut stream = sorter::<i64>(4).sort(&input, 80_000).unwrap();
        let result = stream.write_to_file(&path, None);
        assert!(matches!(result, Err(SortError::Output(_))));
        assert!(stream.cancel_token().is_cancelled());
        assert!(stream.stages.is_empty());
    }
}
