//! Bipartition registry: clade deduplication and support counting.
//!
//! # Overview
//! Trees are added one at a time. Every internal edge of a tree yields a
//! clade (the taxa below the edge) and its complement (the rest of *that*
//! tree's leaves). The registry keeps one [`RegistryEntry`] per distinct
//! clade and counts how many trees support it.
//!
//! # Modes
//! - **Node-wise** ([`SplitMode::NodeWise`]): each side of a split is its own
//!   clade, and an entry is identified by its clade alone. Taxon sets may
//!   differ between trees, so two different clades can share the same other
//!   side. For a root with more than two children (an unrooted tree) the
//!   edges hanging off the root are also registered in the mirrored
//!   orientation. An entry gains at most one support per tree, which keeps
//!   its support equal to its presence-matrix column sum.
//! - **Edgewise** ([`SplitMode::Edgewise`]): all trees are assumed to share
//!   one taxon set and `{A,B}|{C,D}` is one entry regardless of which side a
//!   tree happens to hang below a node. Splits with fewer than two taxa on a
//!   side are ignored and an entry gains at most one support per tree.
//!
//! # Lookups
//! Entries are found through hash maps keyed by the sorted clade, so adding
//! a tree costs one hash lookup per edge regardless of registry size.

use crate::snapshot::{Split, TreeSplits};
use crate::taxa::TaxonIndex;
use crate::tree::Tree;
use std::collections::{HashMap, HashSet};
use std::num::ParseFloatError;
use tracing::{debug, warn};

pub use crate::snapshot::Clade;

/// How the two sides of a split are registered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SplitMode {
    #[default]
    NodeWise,
    Edgewise,
}

/// Settings for one registry run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistryConfig {
    pub mode: SplitMode,
    /// Ignore edges whose support label is absent, unparsable or below this.
    pub support_cutoff: Option<f64>,
    /// Report only clades present in the first tree.
    pub restrict_to_first_tree: bool,
}

impl RegistryConfig {
    pub fn with_mode(mut self, mode: SplitMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_support_cutoff(mut self, cutoff: Option<f64>) -> Self {
        self.support_cutoff = cutoff;
        self
    }

    pub fn with_restrict_to_first_tree(mut self, restrict: bool) -> Self {
        self.restrict_to_first_tree = restrict;
        self
    }

    /// Whether an edge with this support label survives the cutoff.
    ///
    /// # Example
    /// ```
    /// # use rust_python_clade_support::registry::RegistryConfig;
    /// let config = RegistryConfig::default().with_support_cutoff(Some(70.0));
    /// assert!(config.passes_cutoff(Some("95")));
    /// assert!(!config.passes_cutoff(Some("50")));
    /// assert!(!config.passes_cutoff(Some("high")));
    /// assert!(!config.passes_cutoff(None));
    /// assert!(RegistryConfig::default().passes_cutoff(None));
    /// ```
    pub fn passes_cutoff(&self, support_label: Option<&str>) -> bool {
        let Some(cutoff) = self.support_cutoff else {
            return true;
        };
        match support_label.map(parse_support) {
            Some(Ok(support)) => support >= cutoff,
            _ => false,
        }
    }
}

/// Parses a node support label such as `"95"` or `"0.87"`.
pub fn parse_support(label: &str) -> Result<f64, ParseFloatError> {
    label.trim().parse::<f64>()
}

/// One distinct clade and its accumulated support.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryEntry {
    pub clade: Clade,
    /// The other side, relative to the leaf set of the tree that first
    /// produced the entry.
    pub complement: Clade,
    pub support: f64,
    /// Taxa known at discovery time but absent from the discovering tree.
    pub not_included: Clade,
}

/// Deduplicated clades of a forest with their supports.
#[derive(Debug, Clone, Default)]
pub struct BipartitionRegistry {
    config: RegistryConfig,
    entries: Vec<RegistryEntry>,
    by_clade: HashMap<Clade, usize>,
    by_complement: HashMap<Clade, usize>,
    snapshots: Vec<TreeSplits>,
}

impl BipartitionRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        BipartitionRegistry {
            config,
            ..Default::default()
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    pub fn num_trees(&self) -> usize {
        self.snapshots.len()
    }

    pub fn snapshots(&self) -> &[TreeSplits] {
        &self.snapshots
    }

    /// Index of the entry whose stored clade is exactly `clade`.
    pub fn find_clade(&self, clade: &[usize]) -> Option<usize> {
        self.by_clade.get(clade).copied()
    }

    /// Clears all entries and trees, keeping the configuration.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.by_clade.clear();
        self.by_complement.clear();
        self.snapshots.clear();
    }

    /// Registers every qualifying edge of `tree`.
    ///
    /// Unseen leaf names are added to `taxa`. For complete `not_included`
    /// bookkeeping, observe all trees in `taxa` before adding any of them.
    pub fn add_tree(&mut self, tree: &Tree, taxa: &mut TaxonIndex) {
        let splits = TreeSplits::from_tree(tree, taxa);
        let not_included = splits.missing_taxa(taxa);
        if !not_included.is_empty() {
            warn!(
                tree = self.snapshots.len(),
                missing = ?taxa.names_of(&not_included),
                "Tree lacks taxa present elsewhere in the forest"
            );
        }

        let before = self.entries.len();
        let mut counted_in_tree: HashSet<usize> = HashSet::new();
        for split in &splits.splits {
            if splits.is_full(&split.clade) || !self.config.passes_cutoff(split.support_label.as_deref()) {
                continue;
            }
            let complement = splits.complement(&split.clade);

            match self.config.mode {
                SplitMode::NodeWise => {
                    self.count_node_wise(&split.clade, &complement, &not_included, &mut counted_in_tree);
                    if splits.unrooted && split.root_adjacent {
                        self.count_node_wise(&complement, &split.clade, &not_included, &mut counted_in_tree);
                    }
                }
                SplitMode::Edgewise => {
                    if split.clade.len() < 2 || complement.len() < 2 {
                        continue;
                    }
                    let found = self
                        .by_clade
                        .get(&split.clade)
                        .or_else(|| self.by_clade.get(&complement))
                        .copied();
                    match found {
                        Some(index) => {
                            if counted_in_tree.insert(index) {
                                self.entries[index].support += 1.0;
                            }
                        }
                        None => {
                            let index = self.push_entry(split.clade.clone(), complement, &not_included);
                            counted_in_tree.insert(index);
                        }
                    }
                }
            }
        }

        debug!(
            tree = self.snapshots.len(),
            leaves = splits.num_leaves(),
            new_clades = self.entries.len() - before,
            "Registered tree"
        );
        self.snapshots.push(splits);
    }

    fn count_node_wise(
        &mut self,
        clade: &[usize],
        complement: &[usize],
        not_included: &[usize],
        counted_in_tree: &mut HashSet<usize>,
    ) {
        match self.by_clade.get(clade).copied() {
            Some(index) => {
                if counted_in_tree.insert(index) {
                    self.entries[index].support += 1.0;
                }
            }
            None => {
                let index = self.push_entry(clade.to_vec(), complement.to_vec(), not_included);
                counted_in_tree.insert(index);
            }
        }
    }

    fn push_entry(&mut self, clade: Clade, complement: Clade, not_included: &[usize]) -> usize {
        let index = self.entries.len();
        self.by_clade.entry(clade.clone()).or_insert(index);
        self.by_complement.entry(complement.clone()).or_insert(index);
        self.entries.push(RegistryEntry {
            clade,
            complement,
            support: 1.0,
            not_included: not_included.to_vec(),
        });
        index
    }

    /// Column of the presence matrix that `split` marks, if any.
    fn presence_column(&self, snapshot: &TreeSplits, split: &Split) -> Option<usize> {
        match self.config.mode {
            SplitMode::NodeWise => {
                let root_column = self.entries.len();
                if snapshot.is_full(&split.clade) {
                    return Some(root_column);
                }
                Some(self.by_clade.get(&split.clade).copied().unwrap_or(root_column))
            }
            SplitMode::Edgewise => {
                if split.node == snapshot.root {
                    return None;
                }
                self.by_clade
                    .get(&split.clade)
                    .or_else(|| self.by_complement.get(&split.clade))
                    .copied()
            }
        }
    }

    /// Builds the tree × clade presence matrix.
    ///
    /// Node-wise matrices carry one extra trailing column collecting every
    /// internal node (the root included) that matches no entry.
    pub fn presence_matrix(&self) -> PresenceMatrix {
        let has_root_column = self.config.mode == SplitMode::NodeWise;
        let columns = self.entries.len() + usize::from(has_root_column);

        let rows = self
            .snapshots
            .iter()
            .map(|snapshot| {
                let mut row = vec![0u8; columns];
                for split in &snapshot.splits {
                    if !self.config.passes_cutoff(split.support_label.as_deref()) {
                        continue;
                    }
                    let Some(column) = self.presence_column(snapshot, split) else {
                        continue;
                    };
                    row[column] = 1;

                    if snapshot.unrooted && split.root_adjacent {
                        let mirror = snapshot.complement(&split.clade);
                        let column = match self.config.mode {
                            SplitMode::NodeWise => {
                                Some(self.by_clade.get(&mirror).copied().unwrap_or(self.entries.len()))
                            }
                            SplitMode::Edgewise => self
                                .by_clade
                                .get(&mirror)
                                .or_else(|| self.by_clade.get(&split.clade))
                                .copied(),
                        };
                        if let Some(column) = column {
                            row[column] = 1;
                        }
                    }
                }
                row
            })
            .collect();

        PresenceMatrix {
            rows,
            num_clades: self.entries.len(),
            has_root_column,
        }
    }

    /// Copy of `tree` whose internal non-root nodes are labelled with the
    /// tree frequency of the matching clade (`0.666667`), or `0.0`.
    ///
    /// A node whose leaves include a taxon unknown to `taxa` never matches.
    pub fn annotate_map_tree(&self, tree: &Tree, taxa: &TaxonIndex) -> Tree {
        let num_trees = self.num_trees() as f64;
        let mut mapped = tree.clone();

        for id in tree.internal_nodes() {
            if tree.is_root(id) {
                continue;
            }
            let clade: Option<Clade> = tree
                .leaf_names_under(id)
                .iter()
                .map(|name| taxa.get(name))
                .collect::<Option<Vec<_>>>()
                .map(|mut ids| {
                    ids.sort_unstable();
                    ids.dedup();
                    ids
                });

            let found = clade.and_then(|clade| match self.config.mode {
                SplitMode::NodeWise => self.by_clade.get(&clade).copied(),
                SplitMode::Edgewise => self
                    .by_clade
                    .get(&clade)
                    .or_else(|| self.by_complement.get(&clade))
                    .copied(),
            });
            let label = match found {
                Some(index) => format!("{:.6}", self.entries[index].support / num_trees),
                None => "0.0".to_string(),
            };

            let node = mapped.node_mut(id);
            node.name.clear();
            node.support_label = Some(label);
        }
        mapped
    }
}

/// Tree × clade 0/1 matrix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceMatrix {
    rows: Vec<Vec<u8>>,
    num_clades: usize,
    has_root_column: bool,
}

impl PresenceMatrix {
    pub fn num_trees(&self) -> usize {
        self.rows.len()
    }

    /// Number of registry entries (the root column excluded).
    pub fn num_clades(&self) -> usize {
        self.num_clades
    }

    /// Index of the node-wise root column.
    pub fn root_column(&self) -> Option<usize> {
        self.has_root_column.then_some(self.num_clades)
    }

    pub fn row(&self, tree: usize) -> &[u8] {
        &self.rows[tree]
    }

    pub fn rows(&self) -> &[Vec<u8>] {
        &self.rows
    }

    pub fn contains(&self, tree: usize, column: usize) -> bool {
        self.rows[tree][column] == 1
    }

    /// Number of trees exhibiting column `column`.
    pub fn column_sum(&self, column: usize) -> usize {
        self.rows.iter().map(|row| row[column] as usize).sum()
    }

    /// Indices of the trees exhibiting column `column`.
    pub fn trees_with(&self, column: usize) -> Vec<usize> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| row[column] == 1)
            .map(|(t, _)| t)
            .collect()
    }

    /// First tree of each group of trees with identical rows, in order.
    pub fn unique_rows(&self) -> Vec<usize> {
        let mut seen: HashSet<&[u8]> = HashSet::new();
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| seen.insert(row.as_slice()))
            .map(|(t, _)| t)
            .collect()
    }
}
