// tests/common/mod.rs
// Shared test utilities for integration tests
#![allow(dead_code)]

use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use taxatsv::ParseOptions;

/// `rows` records of `cols` tab-separated fields, `r{row}c{col}`, newline-terminated.
pub fn generate_tsv(rows: usize, cols: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(rows * cols * 8);
    for r in 0..rows {
        for c in 0..cols {
            if c > 0 {
                out.push(b'\t');
            }
            write!(out, "r{r}c{c}").unwrap();
        }
        out.push(b'\n');
    }
    out
}

/// Small chunks and batches so even short inputs span many batches.
pub fn small_options(workers: usize) -> ParseOptions {
    ParseOptions::default()
        .with_workers(workers)
        .with_chunk_size(64)
        .with_batch_size(3)
        .with_buffer_size(128)
}

pub fn gzip_bytes(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Write `data` to `dir/name`, gzip-compressed when `gzip` is set.
pub fn write_file(dir: &Path, name: &str, data: &[u8], gzip: bool) -> PathBuf {
    let path = dir.join(name);
    let bytes = if gzip {
        gzip_bytes(data)
    } else {
        data.to_vec()
    };
    std::fs::write(&path, bytes).unwrap();
    path
}

/// Minimal taxdump: root(1) → Eukaryota(2, superkingdom) → Chordata(3, phylum)
/// → G(9, genus) → S(10, species), plus an unnamed order (4) under 3.
pub const NAMES_DMP: &str = "\
1\t|\troot\t|\t\t|\tscientific name\t|
2\t|\tEukaryota\t|\t\t|\tscientific name\t|
2\t|\teukaryotes\t|\t\t|\tgenbank common name\t|
3\t|\tChordata\t|\t\t|\tscientific name\t|
9\t|\tG\t|\t\t|\tscientific name\t|
9\t|\tG later\t|\t\t|\tscientific name\t|
10\t|\tS\t|\t\t|\tscientific name\t|
not-an-id\t|\tbroken\t|\t\t|\tscientific name\t|
";

pub const NODES_DMP: &str = "\
1\t|\t1\t|\tno rank\t|\t\t|
2\t|\t1\t|\tsuperkingdom\t|\t\t|
3\t|\t2\t|\tphylum\t|\t\t|
4\t|\t3\t|\torder\t|\t\t|
9\t|\t3\t|\tgenus\t|\t\t|
10\t|\t9\t|\tspecies\t|\t\t|
11\t|\tbroken
";

/// Serves `data` a few bytes at a time, sleeping before each read.
pub struct SlowReader {
    data: Vec<u8>,
    pos: usize,
    step: usize,
    delay: Duration,
}

impl SlowReader {
    pub fn new(data: Vec<u8>, step: usize, delay: Duration) -> Self {
        Self {
            data,
            pos: 0,
            step,
            delay,
        }
    }
}

impl Read for SlowReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        thread::sleep(self.delay);
        let end = (self.pos + self.step).min(self.data.len());
        let n = (end - self.pos).min(buf.len());
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// Yields `good` bytes, then fails.
pub struct FailingReader {
    good: io::Cursor<Vec<u8>>,
}

impl FailingReader {
    pub fn new(good: Vec<u8>) -> Self {
        Self {
            good: io::Cursor::new(good),
        }
    }
}

impl Read for FailingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.good.read(buf)? {
            0 => Err(io::Error::new(io::ErrorKind::Other, "disk on fire")),
            n => Ok(n),
        }
    }
}
