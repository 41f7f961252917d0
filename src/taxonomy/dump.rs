//! NCBI taxonomy dump readers (`names.dmp`, `nodes.dmp`)
//!
//! Rows look like `id\t|\tfield\t|\t...\t|`. Fields are split on `|` and trimmed,
//! so ragged spacing and the trailing terminator are tolerated. Rows that do not
//! parse are skipped and counted.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;

use crate::decompression::open_input;

use super::resolver::TaxNode;

/// Counters for one dump file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DumpStats {
    pub rows: u64,
    pub kept: u64,
    pub skipped: u64,
}

/// Split a dump row on `|`, trimming each field and dropping leading empties.
pub fn parse_dmp_line(line: &str) -> Vec<&str> {
    let mut out = Vec::with_capacity(8);
    for part in line.split('|') {
        let field = part.trim();
        if !field.is_empty() || !out.is_empty() {
            out.push(field);
        }
    }
    out
}

fn label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Visit every row of a dump file as text, reporting the row count.
fn for_each_row<R, F>(mut reader: R, mut visit: F) -> std::io::Result<u64>
where
    R: BufRead,
    F: FnMut(&str),
{
    let mut buf = Vec::with_capacity(256);
    let mut rows = 0u64;
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        rows += 1;
        visit(&String::from_utf8_lossy(&buf));
    }
    Ok(rows)
}

/// Scientific names by taxid. The first non-empty scientific name of an id wins.
pub fn read_names<R: BufRead>(reader: R) -> std::io::Result<(HashMap<i64, String>, DumpStats)> {
    let mut names = HashMap::new();
    let mut stats = DumpStats::default();

    stats.rows = for_each_row(reader, |line| {
        let fields = parse_dmp_line(line);
        if fields.len() < 4 || fields[3] != "scientific name" {
            // Synonyms and other name classes are expected, not malformed.
            if fields.len() < 4 && !fields.is_empty() {
                stats.skipped += 1;
            }
            return;
        }
        let Ok(id) = fields[0].parse::<i64>() else {
            stats.skipped += 1;
            return;
        };
        if fields[1].is_empty() {
            stats.skipped += 1;
            return;
        }
        if !names.contains_key(&id) {
            names.insert(id, fields[1].to_string());
            stats.kept += 1;
        }
    })?;

    Ok((names, stats))
}

/// Nodes by taxid, with names attached from `names`.
pub fn read_nodes<R: BufRead>(
    reader: R,
    names: &HashMap<i64, String>,
) -> std::io::Result<(HashMap<i64, TaxNode>, DumpStats)> {
    let mut nodes = HashMap::new();
    let mut stats = DumpStats::default();

    stats.rows = for_each_row(reader, |line| {
        let fields = parse_dmp_line(line);
        if fields.len() < 3 {
            if !fields.is_empty() {
                stats.skipped += 1;
            }
            return;
        }
        let (Ok(id), Ok(parent)) = (fields[0].parse::<i64>(), fields[1].parse::<i64>()) else {
            stats.skipped += 1;
            return;
        };
        nodes.insert(
            id,
            TaxNode {
                parent,
                rank: fields[2].to_string(),
                name: names.get(&id).cloned(),
            },
        );
        stats.kept += 1;
    })?;

    Ok((nodes, stats))
}

/// Load `names.dmp` (optionally gzip/zstd compressed).
pub fn load_names<P: AsRef<Path>>(path: P) -> Result<HashMap<i64, String>> {
    let path = path.as_ref();
    let label = label(path);
    let reader = open_input(path).with_context(|| format!("open {label}"))?;
    let (names, stats) = read_names(reader).with_context(|| format!("read {label}"))?;
    tracing::debug!(
        file = %label,
        rows = stats.rows,
        names = stats.kept,
        skipped = stats.skipped,
        "loaded scientific names"
    );
    Ok(names)
}

/// Load `nodes.dmp` (optionally gzip/zstd compressed), resolving names.
pub fn load_nodes<P: AsRef<Path>>(
    path: P,
    names: &HashMap<i64, String>,
) -> Result<HashMap<i64, TaxNode>> {
    let path = path.as_ref();
    let label = label(path);
    let reader = open_input(path).with_context(|| format!("open {label}"))?;
    let (nodes, stats) = read_nodes(reader, names).with_context(|| format!("read {label}"))?;
    tracing::debug!(
        file = %label,
        rows = stats.rows,
        nodes = stats.kept,
        skipped = stats.skipped,
        "loaded taxonomy nodes"
    );
    Ok(nodes)
}
