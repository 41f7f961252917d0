use anyhow::{anyhow, Context, Result};
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Chain, Cursor, Read};
use std::path::Path;

type ChainReader = Chain<Cursor<Vec<u8>>, File>;
type GzipReader = BufReader<MultiGzDecoder<ChainReader>>;
type ZstdReader = BufReader<zstd::Decoder<'static, BufReader<ChainReader>>>;
type PlainReader = BufReader<ChainReader>;

const GZIP_MAGIC: [u8; 3] = [0x1F, 0x8B, 0x08];
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// Compression detected from the first bytes of an input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Gzip,
    Zstd,
    None,
}

impl Compression {
    pub fn detect(head: &[u8]) -> Self {
        if head.starts_with(&GZIP_MAGIC) {
            Compression::Gzip
        } else if head.starts_with(&ZSTD_MAGIC) {
            Compression::Zstd
        } else {
            Compression::None
        }
    }
}

/// Streaming decompression wrapper over an input file
/// Detects gzip (1F 8B 08) and zstd (28 B5 2F FD) compression using magic bytes
pub enum InputReader {
    /// Gzip decompression, including concatenated members (bgzip, `cat a.gz b.gz`)
    Gzip(GzipReader),
    /// Zstd decompression - decoder requires BufRead input and provides Read output
    Zstd(ZstdReader),
    /// Passthrough for non-compressed files
    Plain(PlainReader),
}

// Manually implement Debug since zstd::Decoder doesn't implement it
impl std::fmt::Debug for InputReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputReader::Gzip(_) => write!(f, "InputReader::Gzip"),
            InputReader::Zstd(_) => write!(f, "InputReader::Zstd"),
            InputReader::Plain(_) => write!(f, "InputReader::Plain"),
        }
    }
}

impl BufRead for InputReader {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        match self {
            InputReader::Gzip(reader) => reader.fill_buf(),
            InputReader::Zstd(reader) => reader.fill_buf(),
            InputReader::Plain(reader) => reader.fill_buf(),
        }
    }

    fn consume(&mut self, amt: usize) {
        match self {
            InputReader::Gzip(reader) => reader.consume(amt),
            InputReader::Zstd(reader) => reader.consume(amt),
            InputReader::Plain(reader) => reader.consume(amt),
        }
    }
}

impl Read for InputReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            InputReader::Gzip(reader) => reader.read(buf),
            InputReader::Zstd(reader) => reader.read(buf),
            InputReader::Plain(reader) => reader.read(buf),
        }
    }
}

impl InputReader {
    pub fn compression(&self) -> Compression {
        match self {
            InputReader::Gzip(_) => Compression::Gzip,
            InputReader::Zstd(_) => Compression::Zstd,
            InputReader::Plain(_) => Compression::None,
        }
    }
}

/// Read up to `head.len()` bytes, tolerating short reads from pipes.
fn read_head<R: Read>(reader: &mut R, head: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < head.len() {
        match reader.read(&mut head[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn detect_compression_file(mut file: File) -> io::Result<InputReader> {
    let mut head = [0u8; 4];
    let n = read_head(&mut file, &mut head)?;

    // Put the read bytes back in front using a cursor chain
    let chained = Cursor::new(head[..n].to_vec()).chain(file);

    Ok(match Compression::detect(&head[..n]) {
        Compression::Gzip => InputReader::Gzip(BufReader::new(MultiGzDecoder::new(chained))),
        Compression::Zstd => {
            // zstd::Decoder wraps input in BufReader automatically
            InputReader::Zstd(BufReader::new(zstd::Decoder::new(chained)?))
        }
        Compression::None => InputReader::Plain(BufReader::new(chained)),
    })
}

/// Open `path`, transparently decompressing gzip or zstd content.
pub fn open_input<P: AsRef<Path>>(path: P) -> Result<InputReader> {
    let path = path.as_ref();

    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        if extension.eq_ignore_ascii_case("zip") {
            return Err(anyhow!(
                "ZIP archives are not supported, only gzip and zstd streams. Extract it first: unzip {}",
                path.display()
            ));
        }
    }

    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    detect_compression_file(file)
        .with_context(|| format!("detect compression of {}", path.display()))
}

/// Generic magic bytes detection for any Read type
pub fn maybe_decompress<R: Read + Send + 'static>(mut reader: R) -> io::Result<Box<dyn Read + Send>> {
    let mut head = [0u8; 4];
    let n = read_head(&mut reader, &mut head)?;
    let chained: Chain<Cursor<Vec<u8>>, R> = Cursor::new(head[..n].to_vec()).chain(reader);

    Ok(match Compression::detect(&head[..n]) {
        Compression::Gzip => Box::new(MultiGzDecoder::new(chained)),
        Compression::Zstd => Box::new(zstd::Decoder::new(chained)?),
        Compression::None => Box::new(chained),
    })
}

/// Count newline-delimited records, plus one for unterminated trailing content.
pub fn count_records<R: Read>(mut reader: R) -> io::Result<u64> {
    let mut buf = vec![0u8; 1 << 20];
    let mut count = 0u64;
    let mut last = None;

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        count += memchr::memchr_iter(b'\n', &buf[..n]).count() as u64;
        last = Some(buf[n - 1]);
    }

    if matches!(last, Some(b) if b != b'\n') {
        count += 1;
    }
    Ok(count)
}
