//! Clade conflict detection and Internode Certainty.
//!
//! This module turns a frozen [`BipartitionRegistry`] into per-clade reports:
//!
//! 1. **Conflict**: two clades conflict when no single tree can contain both.
//!    Taxa outside either clade's tree are ignored by restricting both to the
//!    universe they share.
//!
//! 2. **ICA (Internode Certainty All)**: for a clade with support `s0` and
//!    conflicting clades with supports `s1..sk`, let `p_i = s_i / Σs`. Then
//!    `ICA = 1 + Σ p_i · log_{k+1}(p_i)`, negated when some conflicting clade
//!    is better supported. Range: [-1, 1].
//!
//! 3. **TSCA (Tree Support Certainty All)**: the sum of |ICA| over every
//!    reported clade.

use crate::bitset::Bitset;
use crate::registry::{BipartitionRegistry, PresenceMatrix, RegistryConfig, SplitMode};
use crate::taxa::TaxonIndex;
use crate::tree::Tree;
use rayon::prelude::*;

/// Packed clade and complement of one registry entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CladeRows {
    pub clade: Bitset,
    pub complement: Bitset,
}

impl CladeRows {
    pub fn new(words: usize, clade: &[usize], complement: &[usize]) -> Self {
        CladeRows {
            clade: Bitset::from_ids(words, clade),
            complement: Bitset::from_ids(words, complement),
        }
    }

    /// Every taxon this entry's discovering tree contained.
    pub fn universe(&self) -> Bitset {
        self.clade.union(&self.complement)
    }
}

/// Whether `a` and `b` cannot both hold in one tree.
///
/// Both clades are first cut down to the taxa both trees contained.
/// - Node-wise: the cut clades overlap and neither contains the other.
/// - Edgewise: the four-gamete test; all four pairings of the two sides
///   overlap.
///
/// # Example
/// ```text
/// {A,B} vs {B,C}   over {A,B,C,D}: overlap {B}, no nesting → conflict
/// {A,B} vs {A,B,C} over {A,B,C,D}: nested                 → compatible
/// ```
pub fn conflicts(a: &CladeRows, b: &CladeRows, mode: SplitMode) -> bool {
    let shared = a.universe().and(&b.universe());
    let a_in = a.clade.and(&shared);
    let b_in = b.clade.and(&shared);

    match mode {
        SplitMode::NodeWise => {
            a_in.intersects(&b_in) && !a_in.is_subset_of(&b_in) && !b_in.is_subset_of(&a_in)
        }
        SplitMode::Edgewise => {
            let a_out = a.complement.and(&shared);
            let b_out = b.complement.and(&shared);
            a_in.intersects(&b_in)
                && a_in.intersects(&b_out)
                && a_out.intersects(&b_in)
                && a_out.intersects(&b_out)
        }
    }
}

/// `log_base(x)`, with `log_1(x) = 0` so a clade without conflicts scores 1.
fn log_n(x: f64, base: usize) -> f64 {
    if base <= 1 { 0.0 } else { x.ln() / (base as f64).ln() }
}

/// Result of [`internode_certainty`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Certainty {
    /// `p[0]`: the clade's share of the total support.
    pub frequency: f64,
    /// Unsigned ICA in [0, 1].
    pub magnitude: f64,
    /// Some conflicting clade has a larger share than the clade itself.
    pub dominated: bool,
}

impl Certainty {
    /// ICA with its sign: negative when the clade is dominated.
    pub fn signed(&self) -> f64 {
        if self.dominated { -self.magnitude } else { self.magnitude }
    }
}

/// ICA for a clade whose support is `supports[0]` and whose conflicting
/// clades have the remaining supports.
///
/// # Example
/// ```
/// # use rust_python_clade_support::conflict::internode_certainty;
/// let even = internode_certainty(&[5.0, 5.0]);
/// assert!(even.magnitude.abs() < 1e-12);
///
/// let alone = internode_certainty(&[3.0]);
/// assert_eq!(alone.signed(), 1.0);
/// ```
pub fn internode_certainty(supports: &[f64]) -> Certainty {
    let total: f64 = supports.iter().sum();
    if supports.is_empty() || total <= 0.0 {
        return Certainty {
            frequency: 0.0,
            magnitude: 0.0,
            dominated: false,
        };
    }

    let base = supports.len();
    let shares: Vec<f64> = supports.iter().map(|s| s / total).collect();
    let magnitude = 1.0
        + shares
            .iter()
            .filter(|&&p| p > 0.0)
            .map(|&p| p * log_n(p, base))
            .sum::<f64>();

    Certainty {
        frequency: shares[0],
        magnitude,
        dominated: shares.iter().any(|&p| p > shares[0]),
    }
}

/// A clade found to conflict with a reported clade.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictReport {
    pub entry: usize,
    pub clade: Vec<String>,
    /// Other side of the split; filled in edgewise mode only.
    pub complement: Vec<String>,
    pub support: f64,
    pub tree_frequency: f64,
}

/// Everything reported for one clade.
#[derive(Debug, Clone, PartialEq)]
pub struct CladeReport {
    /// Index into the registry entries.
    pub entry: usize,
    pub clade: Vec<String>,
    /// Other side of the split; filled in edgewise mode only.
    pub complement: Vec<String>,
    pub support: f64,
    /// `support / number of trees`.
    pub tree_frequency: f64,
    /// Share of the support among the clade and its conflicts (`FREQ`).
    pub conflict_frequency: f64,
    pub ica: f64,
    /// Present in every tree: frequency and ICA are exactly 1.
    pub in_all_trees: bool,
    pub conflicts: Vec<ConflictReport>,
    /// Trees exhibiting the clade.
    pub trees: Vec<usize>,
}

/// Per-forest result of the conflict scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ForestSummary {
    pub num_trees: usize,
    /// Number of registry entries (reported or not).
    pub num_clades: usize,
    /// Reported clades, in registry order.
    pub clades: Vec<CladeReport>,
    pub tsca: f64,
}

/// Runs the conflict scan over a frozen registry.
///
/// A clade is reported when at least one tree exhibits it (and, if the
/// registry restricts to the first tree, tree 0 does). Only clades present in
/// some but not all trees take part as conflicts. The per-clade scan runs in
/// parallel; output order is registry order.
pub fn analyze(
    registry: &BipartitionRegistry,
    matrix: &PresenceMatrix,
    taxa: &TaxonIndex,
) -> ForestSummary {
    let num_trees = registry.num_trees();
    let config = registry.config();
    let entries = registry.entries();
    let words = taxa.len().div_ceil(64).max(1);

    let rows: Vec<CladeRows> = entries
        .iter()
        .map(|e| CladeRows::new(words, &e.clade, &e.complement))
        .collect();
    let sums: Vec<usize> = (0..entries.len()).map(|c| matrix.column_sum(c)).collect();
    let candidates: Vec<usize> = (0..entries.len())
        .filter(|&j| sums[j] > 0 && sums[j] < num_trees)
        .collect();

    let side_names = |ids: &[usize]| -> Vec<String> {
        match config.mode {
            SplitMode::Edgewise => taxa.names_of(ids),
            SplitMode::NodeWise => Vec::new(),
        }
    };

    let clades: Vec<CladeReport> = (0..entries.len())
        .into_par_iter()
        .filter_map(|i| {
            if sums[i] == 0 || (config.restrict_to_first_tree && !matrix.contains(0, i)) {
                return None;
            }
            let entry = &entries[i];
            let in_all_trees = sums[i] == num_trees;

            let conflicts: Vec<ConflictReport> = if in_all_trees {
                Vec::new()
            } else {
                candidates
                    .iter()
                    .filter(|&&j| j != i && conflicts(&rows[i], &rows[j], config.mode))
                    .map(|&j| ConflictReport {
                        entry: j,
                        clade: taxa.names_of(&entries[j].clade),
                        complement: side_names(&entries[j].complement),
                        support: entries[j].support,
                        tree_frequency: entries[j].support / num_trees as f64,
                    })
                    .collect()
            };

            let (conflict_frequency, ica, tree_frequency) = if in_all_trees {
                (1.0, 1.0, 1.0)
            } else {
                let supports: Vec<f64> = std::iter::once(entry.support)
                    .chain(conflicts.iter().map(|c| c.support))
                    .collect();
                let certainty = internode_certainty(&supports);
                (
                    certainty.frequency,
                    certainty.signed(),
                    entry.support / num_trees as f64,
                )
            };

            Some(CladeReport {
                entry: i,
                clade: taxa.names_of(&entry.clade),
                complement: side_names(&entry.complement),
                support: entry.support,
                tree_frequency,
                conflict_frequency,
                ica,
                in_all_trees,
                conflicts,
                trees: matrix.trees_with(i),
            })
        })
        .collect();

    let tsca = clades.iter().map(|c| c.ica.abs()).sum();

    ForestSummary {
        num_trees,
        num_clades: entries.len(),
        clades,
        tsca,
    }
}

/// Everything computed for one forest.
#[derive(Debug, Clone)]
pub struct ForestAnalysis {
    pub taxa: TaxonIndex,
    pub registry: BipartitionRegistry,
    pub matrix: PresenceMatrix,
    pub summary: ForestSummary,
}

/// Observes every taxon, registers every tree, then runs the conflict scan.
///
/// # Example
/// ```
/// use rust_python_clade_support::conflict::analyze_forest;
/// use rust_python_clade_support::newick::parse_newick;
/// use rust_python_clade_support::registry::RegistryConfig;
///
/// let trees: Vec<_> = ["((A,B),(C,D));", "((A,B),(C,D));"]
///     .iter()
///     .map(|s| parse_newick(s).unwrap())
///     .collect();
/// let analysis = analyze_forest(&trees, RegistryConfig::default());
/// assert_eq!(analysis.summary.num_trees, 2);
/// assert_eq!(analysis.summary.tsca, 2.0);
/// ```
pub fn analyze_forest(trees: &[Tree], config: RegistryConfig) -> ForestAnalysis {
    let mut taxa = TaxonIndex::new();
    for tree in trees {
        taxa.observe(tree);
    }

    let mut registry = BipartitionRegistry::new(config);
    for tree in trees {
        registry.add_tree(tree, &mut taxa);
    }

    let matrix = registry.presence_matrix();
    let summary = analyze(&registry, &matrix, &taxa);
    ForestAnalysis {
        taxa,
        registry,
        matrix,
        summary,
    }
}
