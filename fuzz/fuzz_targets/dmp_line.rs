#![no_main]

use libfuzzer_sys::fuzz_target;
use std::io::Cursor;
use taxatsv::taxonomy::{parse_dmp_line, read_names, read_nodes};

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        for line in text.lines() {
            let fields = parse_dmp_line(line);
            assert!(fields.first().map_or(true, |f| !f.is_empty()));
        }
    }

    let (names, _) = read_names(Cursor::new(data)).expect("in-memory read");
    let (nodes, stats) = read_nodes(Cursor::new(data), &names).expect("in-memory read");
    assert!(nodes.len() as u64 <= stats.kept);
});
