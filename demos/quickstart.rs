use std::sync::Arc;

use env_logger;
use log;

use ext_merge_sort::{encode_all, PipelineSorter, PipelineSorterBuilder, StreamSink};

fn main() {
    env_logger::Builder::new().filter_level(log::LevelFilter::Debug).init();

    let input: Arc<[u8]> = encode_all(vec![5i64, 3, 9, 1, 3, 7, 2, 8]).into();

    let sorter: PipelineSorter<i64> = PipelineSorterBuilder::new().with_chunk_count(2).build().unwrap();
    let mut sorted = sorter.sort(&input, input.len() as u64).unwrap();

    let mut sink = StreamSink::new(Vec::new(), None);
    sorted.write_into(&mut sink).unwrap();
    let output = sink.finish().unwrap();

    for record in output.chunks(8) {
        println!("{}", i64::from_be_bytes(record.try_into().unwrap()));
    }
    log::info!("{:?}", sorted.report());
}
