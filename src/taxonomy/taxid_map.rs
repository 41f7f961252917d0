use anyhow::{Context, Result};
use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;

use crate::decompression::open_input;
use crate::error::TaxonomyError;

/// Parse `sequence-id <tab> taxid` lines. Falls back to whitespace splitting for
/// lines without a tab; blank lines and non-integer taxids are skipped.
pub fn read_taxid_map<R: BufRead>(reader: R) -> std::io::Result<HashMap<String, i64>> {
    let mut map = HashMap::new();

    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 2 {
            fields = line.split_whitespace().collect();
        }
        if fields.len() < 2 {
            continue;
        }

        if let Ok(taxid) = fields[1].trim().parse::<i64>() {
            map.insert(fields[0].to_string(), taxid);
        }
    }

    Ok(map)
}

/// Load a sequence-id → taxid map. A map without usable entries is an error.
pub fn load_taxid_map<P: AsRef<Path>>(path: P) -> Result<HashMap<String, i64>> {
    let path = path.as_ref();
    let reader = open_input(path).context("open taxid map")?;
    let map = read_taxid_map(reader)
        .with_context(|| format!("read taxid map {}", path.display()))?;

    if map.is_empty() {
        return Err(TaxonomyError::EmptyTaxidMap(path.display().to_string()).into());
    }
    tracing::debug!(entries = map.len(), path = %path.display(), "loaded taxid map");
    Ok(map)
}
