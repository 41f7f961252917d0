// Core library for taxatsv: parallel TSV ingestion and taxonomy lineage lookup

//! Streams very large tab-separated files to a caller in file order using a pool
//! of worker threads, and resolves rank → name lineages from an NCBI taxdump.
//!
//! ```no_run
//! use taxatsv::{decompression::open_input, parse_tsv, ParseOptions, Taxonomy};
//!
//! # fn main() -> anyhow::Result<()> {
//! let taxonomy = Taxonomy::load_dir("taxdump")?;
//! let input = open_input("records.tsv.gz")?;
//! let options = ParseOptions::default().with_skip_progress_first_row(true);
//!
//! parse_tsv(input, options, |row| {
//!     let taxid: i64 = row.field_str(1).and_then(|s| s.parse().ok()).unwrap_or(0);
//!     if let Some(lineage) = taxonomy.lineage(taxid) {
//!         println!("{}\t{:?}", row.field_str(0).unwrap_or(""), lineage.get("genus"));
//!     }
//!     Ok(())
//! })?;
//! # Ok(())
//! # }
//! ```

pub mod config_file;
pub mod decompression;
pub mod error;
pub mod logging;
pub mod parallel;
pub mod stats;
pub mod taxonomy;

pub use config_file::ConfigFile;
pub use error::{ParseError, TaxonomyError};
pub use parallel::{
    parse_tsv, parse_tsv_channel, OwnedRow, ParseOptions, ProgressSink, Row, RowStream,
    TsvParser,
};
pub use stats::ParseStats;
pub use taxonomy::{has_all_ranks, Lineage, ResolverConfig, Taxonomy};
