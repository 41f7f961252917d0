//! Memoized lineage resolution over a loaded taxonomy

use anyhow::Result;
use dashmap::DashMap;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::dump::{load_names, load_nodes};

/// Default bound on parent hops per lineage walk
pub const DEFAULT_MAX_HOPS: usize = 64;

/// Rank → scientific name, leaf first
pub type Lineage = IndexMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxNode {
    pub parent: i64,
    pub rank: String,
    pub name: Option<String>,
}

/// Resolver policy: rank aliases and the hop cap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    pub max_hops: usize,
    pub aliases: HashMap<String, String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_hops: DEFAULT_MAX_HOPS,
            aliases: HashMap::from([("superkingdom".to_string(), "kingdom".to_string())]),
        }
    }
}

impl ResolverConfig {
    pub fn with_max_hops(mut self, max_hops: usize) -> Self {
        self.max_hops = max_hops;
        self
    }

    pub fn with_alias(mut self, rank: impl Into<String>, canonical: impl Into<String>) -> Self {
        self.aliases.insert(rank.into(), canonical.into());
        self
    }

    /// Canonical name for `rank`.
    pub fn alias<'a>(&'a self, rank: &'a str) -> &'a str {
        self.aliases.get(rank).map(String::as_str).unwrap_or(rank)
    }
}

/// Query counters snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineageStats {
    pub queries: u64,
    pub cache_hits: u64,
    pub nodes_visited: u64,
    pub cached: usize,
}

/// Loaded taxonomy with a shared lineage cache.
///
/// `lineage` takes `&self`, so one `Taxonomy` can serve several threads.
#[derive(Debug)]
pub struct Taxonomy {
    nodes: HashMap<i64, TaxNode>,
    config: ResolverConfig,
    cache: DashMap<i64, Arc<Lineage>>,
    queries: AtomicU64,
    cache_hits: AtomicU64,
    nodes_visited: AtomicU64,
}

impl Taxonomy {
    pub fn from_nodes(nodes: HashMap<i64, TaxNode>, config: ResolverConfig) -> Self {
        Self {
            nodes,
            config,
            cache: DashMap::new(),
            queries: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            nodes_visited: AtomicU64::new(0),
        }
    }

    /// Load `nodes.dmp` and `names.dmp` with the default resolver policy.
    pub fn load<P: AsRef<Path>, Q: AsRef<Path>>(nodes_path: P, names_path: Q) -> Result<Self> {
        Self::load_with_config(nodes_path, names_path, ResolverConfig::default())
    }

    pub fn load_with_config<P: AsRef<Path>, Q: AsRef<Path>>(
        nodes_path: P,
        names_path: Q,
        config: ResolverConfig,
    ) -> Result<Self> {
        let names = load_names(names_path)?;
        let nodes = load_nodes(nodes_path, &names)?;
        tracing::info!(nodes = nodes.len(), names = names.len(), "taxonomy loaded");
        Ok(Self::from_nodes(nodes, config))
    }

    /// Load `nodes.dmp` and `names.dmp` from an extracted taxdump directory.
    pub fn load_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        Self::load(dir.join("nodes.dmp"), dir.join("names.dmp"))
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: i64) -> Option<&TaxNode> {
        self.nodes.get(&id)
    }

    /// Lineage of `id`, closest ancestor first. `None` for non-positive ids.
    ///
    /// Each id is walked at most once; later queries return the same `Arc`.
    pub fn lineage(&self, id: i64) -> Option<Arc<Lineage>> {
        if id <= 0 {
            return None;
        }
        self.queries.fetch_add(1, Ordering::Relaxed);

        if let Some(cached) = self.cache.get(&id) {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Some(Arc::clone(cached.value()));
        }

        let lineage = Arc::new(self.walk(id));
        // A concurrent walk of the same id may have landed first; keep that one.
        let entry = self.cache.entry(id).or_insert(lineage);
        Some(Arc::clone(entry.value()))
    }

    fn walk(&self, id: i64) -> Lineage {
        let mut lineage = Lineage::with_capacity(8);
        let mut current = id;
        let mut visited = 0usize;

        while current > 0 && visited < self.config.max_hops {
            let Some(node) = self.nodes.get(&current) else {
                break;
            };
            visited += 1;

            let rank = self.config.alias(&node.rank);
            if let Some(name) = node.name.as_deref() {
                if !rank.is_empty() && rank != "no rank" && !lineage.contains_key(rank) {
                    lineage.insert(rank.to_string(), name.to_string());
                }
            }

            if node.parent == current {
                break;
            }
            current = node.parent;
        }

        self.nodes_visited.fetch_add(visited as u64, Ordering::Relaxed);
        lineage
    }

    pub fn stats(&self) -> LineageStats {
        LineageStats {
            queries: self.queries.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            nodes_visited: self.nodes_visited.load(Ordering::Relaxed),
            cached: self.cache.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(parent: i64, rank: &str, name: Option<&str>) -> TaxNode {
        TaxNode {
            parent,
            rank: rank.to_string(),
            name: name.map(str::to_string),
        }
    }

    fn sample() -> Taxonomy {
        let nodes = HashMap::from([
            (1, node(1, "no rank", Some("root"))),
            (2, node(1, "superkingdom", Some("Eukaryota"))),
            (9, node(2, "genus", Some("G"))),
            (10, node(9, "species", Some("S"))),
        ]);
        Taxonomy::from_nodes(nodes, ResolverConfig::default())
    }

    #[test]
    fn test_lineage_leaf_first_with_alias() {
        let taxonomy = sample();
        let lineage = taxonomy.lineage(10).unwrap();
        let pairs: Vec<(&str, &str)> = lineage
            .iter()
            .map(|(r, n)| (r.as_str(), n.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![("species", "S"), ("genus", "G"), ("kingdom", "Eukaryota")]
        );
    }

    #[test]
    fn test_non_positive_ids() {
        let taxonomy = sample();
        assert!(taxonomy.lineage(0).is_none());
        assert!(taxonomy.lineage(-5).is_none());
        assert_eq!(taxonomy.stats().queries, 0);
    }

    #[test]
    fn test_unknown_id_is_empty_and_cached() {
        let taxonomy = sample();
        assert!(taxonomy.lineage(404).unwrap().is_empty());
        taxonomy.lineage(404);
        let stats = taxonomy.stats();
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.nodes_visited, 0);
    }

    #[test]
    fn test_closest_ancestor_wins() {
        let nodes = HashMap::from([
            (1, node(1, "no rank", Some("root"))),
            (5, node(1, "genus", Some("Far"))),
            (6, node(5, "genus", Some("Near"))),
            (7, node(6, "species", Some("Leaf"))),
        ]);
        let taxonomy = Taxonomy::from_nodes(nodes, ResolverConfig::default());
        let lineage = taxonomy.lineage(7).unwrap();
        assert_eq!(lineage["genus"], "Near");
        assert_eq!(lineage.len(), 2);
    }

    #[test]
    fn test_cycle_bounded_by_hop_cap() {
        let nodes = HashMap::from([
            (3, node(4, "genus", Some("A"))),
            (4, node(3, "family", Some("B"))),
        ]);
        let taxonomy = Taxonomy::from_nodes(nodes, ResolverConfig::default());
        let lineage = taxonomy.lineage(3).unwrap();
        assert_eq!(lineage.len(), 2);
        assert_eq!(taxonomy.stats().nodes_visited, DEFAULT_MAX_HOPS as u64);
    }

    #[test]
    fn test_custom_hop_cap_and_alias() {
        let config = ResolverConfig::default()
            .with_max_hops(2)
            .with_alias("clade", "group");
        let nodes = HashMap::from([
            (1, node(1, "no rank", Some("root"))),
            (2, node(1, "superkingdom", Some("Top"))),
            (3, node(2, "clade", Some("C"))),
            (4, node(3, "species", Some("Sp"))),
        ]);
        let taxonomy = Taxonomy::from_nodes(nodes, config);
        let lineage = taxonomy.lineage(4).unwrap();
        assert_eq!(lineage.keys().collect::<Vec<_>>(), vec!["species", "group"]);
    }

    #[test]
    fn test_skips_unnamed_and_blank_ranks() {
        let nodes = HashMap::from([
            (1, node(1, "no rank", Some("root"))),
            (2, node(1, "order", None)),
            (3, node(2, "", Some("Blank"))),
            (4, node(3, "species", Some("Sp"))),
        ]);
        let taxonomy = Taxonomy::from_nodes(nodes, ResolverConfig::default());
        let lineage = taxonomy.lineage(4).unwrap();
        assert_eq!(lineage.len(), 1);
        assert_eq!(lineage["species"], "Sp");
    }

    #[test]
    fn test_repeat_query_reuses_cached_lineage() {
        let taxonomy = sample();
        let first = taxonomy.lineage(10).unwrap();
        let visited = taxonomy.stats().nodes_visited;
        let second = taxonomy.lineage(10).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        let stats = taxonomy.stats();
        assert_eq!(stats.nodes_visited, visited);
        assert_eq!(stats.queries, 2);
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.cached, 1);
    }

    #[test]
    fn test_shared_across_threads() {
        let taxonomy = Arc::new(sample());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let taxonomy = Arc::clone(&taxonomy);
                std::thread::spawn(move || taxonomy.lineage(10).unwrap())
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for lineage in &results {
            assert!(Arc::ptr_eq(lineage, &results[0]));
        }
        assert_eq!(taxonomy.stats().cached, 1);
    }
}
