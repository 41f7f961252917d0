#![no_main]

use libfuzzer_sys::fuzz_target;
use std::io::Cursor;
use taxatsv::parallel::split_fields;
use taxatsv::{parse_tsv, ParseOptions};

fuzz_target!(|data: &[u8]| {
    if data.len() < 3 {
        return;
    }

    let workers = (data[0] % 4) as usize + 1;
    let batch_size = (data[1] % 8) as usize + 1;
    let chunk_size = (data[2] % 64) as usize + 1;
    let input = &data[3..];

    let options = ParseOptions::default()
        .with_workers(workers)
        .with_batch_size(batch_size)
        .with_chunk_size(chunk_size)
        .with_buffer_size(32)
        .with_allow_crlf(false);

    // Sequential reference: one record per newline, plus an unterminated tail.
    let mut expected: Vec<&[u8]> = input.split(|&b| b == b'\n').collect();
    if expected.last().is_some_and(|last| last.is_empty()) {
        expected.pop();
    }

    let mut line = 0usize;
    parse_tsv(Cursor::new(input), options, |row| {
        let reference = split_fields(expected[line]);
        assert_eq!(row.line as usize, line + 1);
        assert_eq!(row.fields, reference.as_slice());
        line += 1;
        Ok(())
    })
    .expect("non-strict parse of in-memory input cannot fail");

    assert_eq!(line, expected.len());
});
