use std::fmt::Display;
use std::fs;
use std::path::Path;
use std::process;
use std::time::Instant;

use bytesize::ByteSize;
use clap::ArgEnum;
use env_logger;
use log;
use rand::distributions::{Distribution, Standard};
use rand::Rng;

use ext_merge_sort::StreamSink;
use ext_merge_sort::{PipelineSorter, PipelineSorterBuilder, ReaderSource, Record, TruncatedRecordPolicy};

fn main() {
    let arg_parser = build_arg_parser();

    let log_level: LogLevel = arg_parser.value_of_t_or_exit("log_level");
    init_logger(log_level);

    let key: KeyType = arg_parser.value_of_t_or_exit("key");
    match key {
        KeyType::Signed => run::<i64>(&arg_parser),
        KeyType::Unsigned => run::<u64>(&arg_parser),
    }
}

fn run<T>(arg_parser: &clap::ArgMatches)
where
    T: Record + Display,
    Standard: Distribution<T>,
{
    let started = Instant::now();

    let chunks: usize = arg_parser.value_of_t_or_exit("chunks");
    let queue_capacity: usize = arg_parser.value_of_t_or_exit("queue_capacity");
    let truncated: Truncated = arg_parser.value_of_t_or_exit("truncated");
    let threads: Option<usize> = arg_parser
        .is_present("threads")
        .then(|| arg_parser.value_of_t_or_exit("threads"));
    let rw_buf_size: Option<usize> = match arg_parser.value_of("rw_buf_size") {
        Some(v) => {
            let size = v.parse::<ByteSize>().expect("value is pre-validated");
            match usize::try_from(size.as_u64()) {
                Ok(size) => Some(size),
                Err(_) => {
                    log::error!("read/write buffer size {} exceeds the addressable memory", size);
                    process::exit(1);
                }
            }
        }
        None => None,
    };

    let input = Path::new(arg_parser.value_of("input").expect("value is required"));
    let output = Path::new(arg_parser.value_of("output").expect("value is required"));

    if let Some(size) = arg_parser.value_of("generate") {
        let size = size.parse::<ByteSize>().expect("value is pre-validated");
        if let Err(err) = generate_input::<T>(input, size.as_u64(), rw_buf_size) {
            log::error!("input generation error: {}", err);
            process::exit(1);
        }
        log::info!("{} of random records generated, elapsed {:?}", size, started.elapsed());
    }

    let mut sorter_builder = PipelineSorterBuilder::new()
        .with_chunk_count(chunks)
        .with_queue_capacity(queue_capacity)
        .with_truncated_records(match truncated {
            Truncated::Drop => TruncatedRecordPolicy::Drop,
            Truncated::Error => TruncatedRecordPolicy::Error,
        });
    if let Some(threads) = threads {
        sorter_builder = sorter_builder.with_threads_number(threads);
    }
    if let Some(rw_buf_size) = rw_buf_size {
        sorter_builder = sorter_builder.with_rw_buf_size(rw_buf_size);
    }

    let sorter: PipelineSorter<T> = match sorter_builder.build() {
        Ok(sorter) => sorter,
        Err(err) => {
            log::error!("sorter initialization error: {}", err);
            process::exit(1);
        }
    };

    let mut sorted_stream = match sorter.sort_file(input) {
        Ok(sorted_stream) => sorted_stream,
        Err(err) => {
            log::error!("data sorting error: {}", err);
            process::exit(1);
        }
    };
    log::info!("pipeline started, elapsed {:?}", started.elapsed());

    if let Err(err) = sorted_stream.write_to_file(output, rw_buf_size) {
        log::error!("sorted data saving error: {}", err);
        process::exit(1);
    }

    let report = sorted_stream.report();
    log::info!(
        "{} records ({}) sorted in {} chunks with {} merges, elapsed {:?}",
        report.records_read,
        ByteSize(report.bytes_read),
        report.chunks_sorted,
        report.merges_completed,
        started.elapsed()
    );

    if arg_parser.is_present("print") {
        let count: usize = arg_parser.value_of_t_or_exit("print");
        if let Err(err) = print_records::<T>(output, count) {
            log::error!("sorted data reading error: {}", err);
            process::exit(1);
        }
    }
}

/// Fills the file with random records.
fn generate_input<T>(path: &Path, size: u64, buf_size: Option<usize>) -> Result<u64, ext_merge_sort::SortError>
where
    T: Record,
    Standard: Distribution<T>,
{
    let file = fs::File::create(path).map_err(ext_merge_sort::SortError::Output)?;
    let mut rng = rand::thread_rng();

    let records = size / ext_merge_sort::RECORD_SIZE as u64;
    let mut sink = StreamSink::new(file, buf_size);
    sink.write_all((0..records).map(|_| Ok(rng.gen::<T>())))?;
    sink.finish()?;

    return Ok(records);
}

/// Prints the first records of a file.
fn print_records<T: Record + Display>(path: &Path, count: usize) -> Result<(), ext_merge_sort::SortError> {
    let file = fs::File::open(path).map_err(ext_merge_sort::SortError::InputOpen)?;
    let source: ReaderSource<_, T> = ReaderSource::new(file, 0, None, None, TruncatedRecordPolicy::Drop);

    for record in source.take(count) {
        println!("{}", record?);
    }

    return Ok(());
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        Self::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <LogLevel as clap::ArgEnum>::from_str(s, false)
    }
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum KeyType {
    Signed,
    Unsigned,
}

impl KeyType {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        KeyType::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for KeyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <KeyType as clap::ArgEnum>::from_str(s, false)
    }
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum Truncated {
    Drop,
    Error,
}

impl Truncated {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        Truncated::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for Truncated {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Truncated as clap::ArgEnum>::from_str(s, false)
    }
}

fn validate_size(v: &str) -> Result<(), String> {
    match v.parse::<ByteSize>() {
        Ok(_) => Ok(()),
        Err(err) => Err(format!("size format incorrect: {}", err)),
    }
}

fn validate_count(v: &str) -> Result<(), String> {
    match v.parse::<usize>() {
        Ok(0) => Err("value must be positive".to_string()),
        Ok(_) => Ok(()),
        Err(err) => Err(format!("number format incorrect: {}", err)),
    }
}

fn build_arg_parser() -> clap::ArgMatches {
    clap::App::new("ext-merge-sort")
        .about("parallel external merge sorter of 8-byte big-endian integer records")
        .arg(
            clap::Arg::new("input")
                .short('i')
                .long("input")
                .help("file to be sorted")
                .required(true)
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("output")
                .short('o')
                .long("output")
                .help("result file")
                .required(true)
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("chunks")
                .short('c')
                .long("chunks")
                .help("number of chunks the input is split into")
                .takes_value(true)
                .default_value("4")
                .validator(validate_count),
        )
        .arg(
            clap::Arg::new("threads")
                .short('t')
                .long("threads")
                .help("number of threads to use for parallel chunk sorting")
                .takes_value(true)
                .validator(validate_count),
        )
        .arg(
            clap::Arg::new("queue_capacity")
                .short('q')
                .long("queue-capacity")
                .help("capacity of the queues between pipeline stages (records)")
                .takes_value(true)
                .default_value("1024")
                .validator(validate_count),
        )
        .arg(
            clap::Arg::new("rw_buf_size")
                .short('b')
                .long("rw-buf-size")
                .help("file read/write buffer size")
                .takes_value(true)
                .validator(validate_size),
        )
        .arg(
            clap::Arg::new("key")
                .short('k')
                .long("key")
                .help("record key type")
                .takes_value(true)
                .default_value("signed")
                .possible_values(KeyType::possible_values()),
        )
        .arg(
            clap::Arg::new("truncated")
                .long("truncated")
                .help("trailing partial record handling")
                .takes_value(true)
                .default_value("drop")
                .possible_values(Truncated::possible_values()),
        )
        .arg(
            clap::Arg::new("generate")
                .short('g')
                .long("generate")
                .help("fill the input file with random records of the given total size before sorting")
                .takes_value(true)
                .validator(validate_size),
        )
        .arg(
            clap::Arg::new("print")
                .short('p')
                .long("print")
                .help("print the first records of the result file")
                .takes_value(true)
                .validator(|v| v.parse::<usize>().map(|_| ()).map_err(|err| err.to_string())),
        )
        .arg(
            clap::Arg::new("log_level")
                .short('l')
                .long("loglevel")
                .help("logging level")
                .takes_value(true)
                .default_value("info")
                .possible_values(LogLevel::possible_values()),
        )
        .get_matches()
}

fn init_logger(log_level: LogLevel) {
    env_logger::Builder::new()
        .filter_level(match log_level {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        })
        .format_timestamp_millis()
        .init();
}
