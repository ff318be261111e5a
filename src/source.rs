//! Bounded record sources.

use std::fs;
use std::io::{self, prelude::*};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log;

use crate::record::{Record, RECORD_SIZE};
use crate::sort::SortError;

/// Behaviour on a trailing record shorter than [`RECORD_SIZE`] bytes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TruncatedRecordPolicy {
    /// Treat the partial record as the end of the stream (logged as a warning).
    Drop,
    /// Report the partial record as [`SortError::TruncatedRecord`].
    Error,
}

impl Default for TruncatedRecordPolicy {
    fn default() -> Self {
        TruncatedRecordPolicy::Drop
    }
}

/// Byte-addressable input medium. Every call opens an independent read handle,
/// so concurrent readers never share a read position.
pub trait Input: Sync {
    type Reader: Read + Send + 'static;

    /// Opens a new reader positioned at the provided offset.
    fn open_at(&self, offset: u64) -> io::Result<Self::Reader>;
}

impl Input for Path {
    type Reader = fs::File;

    fn open_at(&self, offset: u64) -> io::Result<Self::Reader> {
        let mut file = fs::File::open(self)?;
        file.seek(io::SeekFrom::Start(offset))?;

        return Ok(file);
    }
}

impl Input for PathBuf {
    type Reader = fs::File;

    fn open_at(&self, offset: u64) -> io::Result<Self::Reader> {
        self.as_path().open_at(offset)
    }
}

impl Input for Arc<[u8]> {
    type Reader = io::Cursor<Arc<[u8]>>;

    fn open_at(&self, offset: u64) -> io::Result<Self::Reader> {
        let mut cursor = io::Cursor::new(self.clone());
        cursor.set_position(offset);

        return Ok(cursor);
    }
}

/// Lazy record sequence read from a byte stream.
///
/// Records are read in [`RECORD_SIZE`] units until the byte limit is reached, the reader is exhausted or a
/// read comes up short. A short read ends the stream according to the [`TruncatedRecordPolicy`].
pub struct ReaderSource<R: Read, T> {
    reader: io::Take<io::BufReader<R>>,
    offset: u64,
    policy: TruncatedRecordPolicy,
    finished: bool,

    item_type: PhantomData<T>,
}

impl<R: Read, T: Record> ReaderSource<R, T> {
    /// Creates a record source.
    ///
    /// # Arguments
    /// * `reader` - Reader positioned at the first record
    /// * `offset` - Reader position, used for error reporting only
    /// * `limit` - Maximum number of bytes to be read. If the parameter is [`None`] the reader is read to the end.
    /// * `buf_size` - Read buffer size. If the parameter is [`None`] the default buffer size is used.
    /// * `policy` - Truncated record behaviour
    pub fn new(
        reader: R,
        offset: u64,
        limit: Option<u64>,
        buf_size: Option<usize>,
        policy: TruncatedRecordPolicy,
    ) -> Self {
        let reader = match buf_size {
            Some(buf_size) => io::BufReader::with_capacity(buf_size, reader),
            None => io::BufReader::new(reader),
        };

        return ReaderSource {
            reader: reader.take(limit.unwrap_or(u64::MAX)),
            offset,
            policy,
            finished: false,
            item_type: PhantomData,
        };
    }

    /// Returns the reader position.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    fn read_record(&mut self) -> Result<Option<T>, SortError> {
        let mut buf = [0u8; RECORD_SIZE];
        let mut filled = 0;

        while filled < RECORD_SIZE {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(SortError::IO(err)),
            }
        }

        let record_offset = self.offset;
        self.offset += filled as u64;

        if filled == RECORD_SIZE {
            return Ok(Some(T::decode(buf)));
        }
        if filled == 0 {
            return Ok(None);
        }

        match self.policy {
            TruncatedRecordPolicy::Drop => {
                log::warn!("dropping truncated record at offset {} ({} bytes)", record_offset, filled);
                Ok(None)
            }
            TruncatedRecordPolicy::Error => Err(SortError::TruncatedRecord {
                offset: record_offset,
                len: filled,
            }),
        }
    }
}

impl<R: Read, T: Record> Iterator for ReaderSource<R, T> {
    type Item = Result<T, SortError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let result = self.read_record();
        if !matches!(result, Ok(Some(_))) {
            self.finished = true;
        }

        result.transpose()
    }
}

#[cfg(test)]
mod test {
    use std::io::{self, Read};
    use std::sync::Arc;

    use rstest::*;

    use super::{Input, ReaderSource, TruncatedRecordPolicy};
    use crate::record::encode_all;
    use crate::sort::SortError;

    fn read_all(
        data: &[u8],
        offset: u64,
        limit: Option<u64>,
        policy: TruncatedRecordPolicy,
    ) -> Vec<Result<i64, SortError>> {
        let input: Arc<[u8]> = data.into();
        let reader = input.open_at(offset).unwrap();

        Vec::from_iter(ReaderSource::new(reader, offset, limit, None, policy))
    }

    #[rstest]
    #[case(0, None, vec![5, 3, 9, 1])]
    #[case(0, Some(16), vec![5, 3])]
    #[case(8, Some(16), vec![3, 9])]
    #[case(16, None, vec![9, 1])]
    #[case(32, None, vec![])]
    #[case(0, Some(0), vec![])]
    fn test_reader_source(#[case] offset: u64, #[case] limit: Option<u64>, #[case] expected: Vec<i64>) {
        let data = encode_all(vec![5i64, 3, 9, 1]);

        let actual: Result<Vec<i64>, _> = read_all(&data, offset, limit, TruncatedRecordPolicy::Drop)
            .into_iter()
            .collect();
        assert_eq!(actual.unwrap(), expected);
    }

    #[test]
    fn test_truncated_record_dropped() {
        let mut data = encode_all(vec![7i64, 8]);
        data.extend_from_slice(&[1, 2, 3]);

        let actual: Result<Vec<i64>, _> = read_all(&data, 0, None, TruncatedRecordPolicy::Drop)
            .into_iter()
            .collect();
        assert_eq!(actual.unwrap(), vec![7, 8]);
    }

    #[test]
    fn test_truncated_record_reported() {
        let mut data = encode_all(vec![7i64, 8]);
        data.extend_from_slice(&[1, 2, 3]);

        let actual = read_all(&data, 0, None, TruncatedRecordPolicy::Error);
        assert_eq!(actual.len(), 3);
        assert_eq!(actual[1].as_ref().unwrap(), &8);
        assert!(matches!(actual[2], Err(SortError::TruncatedRecord { offset: 16, len: 3 })));
    }

    #[test]
    fn test_limit_cuts_record() {
        let data = encode_all(vec![7i64, 8]);

        let actual = read_all(&data, 0, Some(12), TruncatedRecordPolicy::Error);
        assert_eq!(actual.len(), 2);
        assert!(matches!(actual[1], Err(SortError::TruncatedRecord { offset: 8, len: 4 })));
    }

    /// Reader returning at most `step` bytes per call.
    struct ShortReader {
        data: io::Cursor<Vec<u8>>,
        step: usize,
    }

    impl Read for ShortReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let len = buf.len().min(self.step);
            self.data.read(&mut buf[..len])
        }
    }

    #[rstest]
    #[case(1)]
    #[case(3)]
    #[case(5)]
    fn test_short_reads_are_not_truncation(#[case] step: usize) {
        let reader = ShortReader {
            data: io::Cursor::new(encode_all(vec![-1i64, 2, 3])),
            step,
        };
        // a one-byte read buffer forces the short reads through to the source
        let source: ReaderSource<_, i64> = ReaderSource::new(reader, 0, None, Some(1), TruncatedRecordPolicy::Error);

        let actual: Result<Vec<i64>, _> = source.collect();
        assert_eq!(actual.unwrap(), vec![-1, 2, 3]);
    }

    #[test]
    fn test_read_error_surfaced() {
        struct FailingReader;

        impl Read for FailingReader {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::Other, "test error"))
            }
        }

        let mut source: ReaderSource<_, u64> =
            ReaderSource::new(FailingReader, 0, None, None, TruncatedRecordPolicy::Drop);
        assert!(matches!(source.next(), Some(Err(SortError::IO(_)))));
        assert!(source.next().is_none());
    }

    #[test]
    fn test_file_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.bin");
        std::fs::write(&path, encode_all(vec![1i64, 2, 3])).unwrap();

        let reader = path.open_at(8).unwrap();
        let source: ReaderSource<_, i64> = ReaderSource::new(reader, 8, Some(8), None, TruncatedRecordPolicy::Drop);

        let actual: Result<Vec<i64>, _> = source.collect();
        assert_eq!(actual.unwrap(), vec![2]);
    }
}
