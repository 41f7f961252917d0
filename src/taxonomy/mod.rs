//! Taxonomy lineage resolution
//!
//! Loads an NCBI-style taxdump (`nodes.dmp`, `names.dmp`) and answers
//! `lineage(id)` queries: the rank → scientific name map obtained by walking
//! parent links, memoized per id.
//!
//! # Module Structure
//!
//! - `dump`: `|`-delimited dump parsing
//! - `resolver`: `Taxonomy`, `ResolverConfig` and the lineage walk
//! - `taxid_map`: sequence-id → taxid tables

mod dump;
mod resolver;
mod taxid_map;

pub use dump::{load_names, load_nodes, parse_dmp_line, read_names, read_nodes, DumpStats};
pub use resolver::{
    Lineage, LineageStats, ResolverConfig, TaxNode, Taxonomy, DEFAULT_MAX_HOPS,
};
pub use taxid_map::{load_taxid_map, read_taxid_map};

/// True when `lineage` has a non-empty name for every required rank. Blank
/// entries in `required` are ignored.
pub fn has_all_ranks<S: AsRef<str>>(lineage: &Lineage, required: &[S]) -> bool {
    required
        .iter()
        .map(AsRef::as_ref)
        .filter(|rank| !rank.is_empty())
        .all(|rank| lineage.get(rank).is_some_and(|name| !name.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_all_ranks() {
        let mut lineage = Lineage::new();
        lineage.insert("species".to_string(), "S".to_string());
        lineage.insert("genus".to_string(), "G".to_string());

        assert!(has_all_ranks::<&str>(&lineage, &[]));
        assert!(has_all_ranks(&lineage, &["genus", "", "species"]));
        assert!(!has_all_ranks(&lineage, &["family"]));
        assert!(has_all_ranks(&Lineage::new(), &[""]));
    }
}
