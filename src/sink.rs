//! Sorted stream sink.

use std::io::{self, prelude::*};
use std::path::Path;

use log;
use tempfile;

use crate::record::Record;
use crate::sort::SortError;

/// Writes records to an output in their binary form.
pub struct StreamSink<W: Write> {
    writer: io::BufWriter<W>,
    written: u64,
}

impl<W: Write> StreamSink<W> {
    /// Creates a sink.
    ///
    /// # Arguments
    /// * `writer` - Output the records are written to
    /// * `buf_size` - Write buffer size. If the parameter is [`None`] the default buffer size is used.
    pub fn new(writer: W, buf_size: Option<usize>) -> Self {
        let writer = match buf_size {
            Some(buf_size) => io::BufWriter::with_capacity(buf_size, writer),
            None => io::BufWriter::new(writer),
        };

        return StreamSink { writer, written: 0 };
    }

    /// Writes all the stream records in stream order.
    /// Stops at the first stream error or write failure.
    /// Returns the number of records written by this call.
    pub fn write_all<T, I>(&mut self, stream: I) -> Result<u64, SortError>
    where
        T: Record,
        I: IntoIterator<Item = Result<T, SortError>>,
    {
        let mut written = 0;
        for item in stream {
            self.writer.write_all(&item?.encode()).map_err(SortError::Output)?;
            written += 1;
        }
        self.written += written;

        return Ok(written);
    }

    /// Total number of records written.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flushes the buffered records and returns the underlying writer.
    pub fn finish(self) -> Result<W, SortError> {
        self.writer.into_inner().map_err(|err| SortError::Output(err.into_error()))
    }
}

/// Writes the stream to a file. The records are written to a temporary file next to the destination
/// which replaces the destination only when the whole stream has been written, so a failed run
/// leaves no partial output behind.
/// Returns the number of records written.
///
/// # Arguments
/// * `stream` - Records to be written
/// * `path` - Output file path
/// * `buf_size` - Write buffer size. If the parameter is [`None`] the default buffer size is used.
pub fn write_to_file<T, I>(stream: I, path: &Path, buf_size: Option<usize>) -> Result<u64, SortError>
where
    T: Record,
    I: IntoIterator<Item = Result<T, SortError>>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let tmp_file = tempfile::NamedTempFile::new_in(dir).map_err(SortError::Output)?;

    let mut sink = StreamSink::new(tmp_file, buf_size);
    let written = sink.write_all(stream)?;
    let tmp_file = sink.finish()?;

    tmp_file.as_file().sync_all().map_err(SortError::Output)?;
    tmp_file.persist(path).map_err(|err| SortError::Output(err.error))?;
    log::debug!("{} records written to {}", written, path.display());

    return Ok(written);
}
