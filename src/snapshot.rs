//! Per-tree clade snapshots.
//!
//! # Overview
//! A [`TreeSplits`] captures, for one tree, the taxon ids below every
//! internal node together with the tree's own leaf set. The registry builds
//! one snapshot per tree when the tree is added and keeps it, so the
//! presence matrix can be rebuilt later without the trees themselves.
//!
//! # What is a clade here?
//! Each internal node defines the set of leaves below it:
//! ```text
//!         root
//!        /    \
//!      n1      n2
//!     /  \    /  \
//!    A    B  C    D
//! ```
//! n1 → {A, B}, n2 → {C, D}, root → {A, B, C, D}. Its complement is taken
//! relative to the leaves of *this* tree, not the whole forest.
//!
//! # Taxon ids, not node ids
//! Node ids differ between trees; taxon names don't. Clades are therefore
//! stored as sorted lists of [`TaxonIndex`] ids, which compare equal across
//! trees that share taxa.

use crate::taxa::TaxonIndex;
use crate::tree::{NodeId, Tree};

/// Sorted, duplicate-free taxon ids.
pub type Clade = Vec<usize>;

/// One internal node of a snapshotted tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Split {
    pub node: NodeId,
    pub clade: Clade,
    /// Raw support label of the node, if any.
    pub support_label: Option<String>,
    /// Whether the node is a direct child of the root.
    pub root_adjacent: bool,
}

/// Immutable clade snapshot of a single tree.
///
/// `splits` holds every internal node (the root included) in arena order.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeSplits {
    pub leaf_set: Clade,
    pub splits: Vec<Split>,
    pub root: NodeId,
    pub unrooted: bool,
}

impl TreeSplits {
    /// Snapshots `tree`, registering unseen leaf names in `taxa`.
    ///
    /// # Algorithm
    /// 1. Map each leaf to its taxon id
    /// 2. Walk the tree in post-order, merging child clades into the parent
    /// 3. Keep the clade of every internal node
    pub fn from_tree(tree: &Tree, taxa: &mut TaxonIndex) -> Self {
        let mut cache: Vec<Clade> = vec![Vec::new(); tree.len()];
        for id in tree.post_order() {
            let node = tree.node(id);
            if node.is_leaf() {
                cache[id] = vec![taxa.get_or_insert(&node.name)];
                continue;
            }
            let mut clade: Clade = node
                .children()
                .iter()
                .flat_map(|&child| cache[child].iter().copied())
                .collect();
            clade.sort_unstable();
            clade.dedup();
            cache[id] = clade;
        }

        let root = tree.root();
        let splits = tree
            .internal_nodes()
            .map(|id| Split {
                node: id,
                clade: std::mem::take(&mut cache[id]),
                support_label: tree.node(id).support_label.clone(),
                root_adjacent: tree.node(id).parent() == Some(root),
            })
            .collect::<Vec<_>>();

        let leaf_set = if tree.node(root).is_leaf() {
            std::mem::take(&mut cache[root])
        } else {
            splits
                .iter()
                .find(|s| s.node == root)
                .map(|s| s.clade.clone())
                .unwrap_or_default()
        };

        TreeSplits {
            leaf_set,
            splits,
            root,
            unrooted: tree.is_unrooted(),
        }
    }

    /// Leaves of this tree that are not in `clade` (both sorted).
    ///
    /// # Example
    /// ```
    /// # use rust_python_clade_support::snapshot::TreeSplits;
    /// # use rust_python_clade_support::taxa::TaxonIndex;
    /// # use rust_python_clade_support::newick::parse_newick;
    /// let tree = parse_newick("((A,B),(C,D));").unwrap();
    /// let mut taxa = TaxonIndex::new();
    /// let splits = TreeSplits::from_tree(&tree, &mut taxa);
    /// assert_eq!(splits.complement(&[0, 1]), vec![2, 3]);
    /// ```
    pub fn complement(&self, clade: &[usize]) -> Clade {
        sorted_difference(&self.leaf_set, clade)
    }

    /// Taxa known to `taxa` that this tree lacks.
    pub fn missing_taxa(&self, taxa: &TaxonIndex) -> Clade {
        let all: Clade = (0..taxa.len()).collect();
        sorted_difference(&all, &self.leaf_set)
    }

    /// Whether `clade` spans the whole tree.
    pub fn is_full(&self, clade: &[usize]) -> bool {
        clade.len() == self.leaf_set.len()
    }

    pub fn num_leaves(&self) -> usize {
        self.leaf_set.len()
    }
}

/// `left \ right` for sorted id lists.
pub(crate) fn sorted_difference(left: &[usize], right: &[usize]) -> Clade {
    let mut out = Vec::with_capacity(left.len().saturating_sub(right.len()));
    let mut j = 0;
    for &x in left {
        while j < right.len() && right[j] < x {
            j += 1;
        }
        if j < right.len() && right[j] == x {
            continue;
        }
        out.push(x);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::newick::parse_newick;

    /// Rooted example
    ///
    /// ```text
    ///          root
    ///         /    \
    ///       n1      D
    ///      /  \
    ///     A    n2
    ///         /  \
    ///        B    C
    /// ```
    ///
    /// Taxa: A=0, B=1, C=2, D=3
    #[test]
    fn test_rooted_snapshot() {
        let tree = parse_newick("((A,(B,C)90),D);").unwrap();
        let mut taxa = TaxonIndex::new();
        let splits = TreeSplits::from_tree(&tree, &mut taxa);

        assert!(!splits.unrooted);
        assert_eq!(splits.leaf_set, vec![0, 1, 2, 3]);
        let clades: Vec<&Clade> = splits.splits.iter().map(|s| &s.clade).collect();
        assert_eq!(clades, vec![&vec![0, 1, 2, 3], &vec![0, 1, 2], &vec![1, 2]]);

        let n1 = &splits.splits[1];
        assert!(n1.root_adjacent);
        let n2 = &splits.splits[2];
        assert!(!n2.root_adjacent);
        assert_eq!(n2.support_label.as_deref(), Some("90"));
        assert!(splits.is_full(&splits.splits[0].clade));
    }

    /// Unrooted (trifurcating root) example
    ///
    /// ```text
    ///        root
    ///      /  |   \
    ///     A   B    n1
    ///             /  \
    ///            C    D
    /// ```
    #[test]
    fn test_unrooted_snapshot() {
        let tree = parse_newick("(A,B,(C,D));").unwrap();
        let mut taxa = TaxonIndex::new();
        let splits = TreeSplits::from_tree(&tree, &mut taxa);
        assert!(splits.unrooted);
        assert_eq!(splits.splits.len(), 2);
        assert_eq!(splits.complement(&splits.splits[1].clade), vec![0, 1]);
    }

    #[test]
    fn test_ids_shared_across_trees() {
        let mut taxa = TaxonIndex::new();
        let first = TreeSplits::from_tree(&parse_newick("((A,B),(C,D));").unwrap(), &mut taxa);
        let second = TreeSplits::from_tree(&parse_newick("((D,C),(E,(B,A)));").unwrap(), &mut taxa);

        assert_eq!(taxa.len(), 5);
        assert!(first.splits.iter().any(|s| s.clade == vec![0, 1]));
        assert!(second.splits.iter().any(|s| s.clade == vec![0, 1]));
        assert!(second.splits.iter().any(|s| s.clade == vec![2, 3]));
        assert_eq!(first.missing_taxa(&taxa), vec![4]);
        assert!(second.missing_taxa(&taxa).is_empty());
    }

    #[test]
    fn test_single_leaf_tree() {
        let mut taxa = TaxonIndex::new();
        let splits = TreeSplits::from_tree(&parse_newick("A;").unwrap(), &mut taxa);
        assert_eq!(splits.leaf_set, vec![0]);
        assert!(splits.splits.is_empty());
    }

    #[test]
    fn test_sorted_difference() {
        assert_eq!(sorted_difference(&[0, 1, 2, 5, 7], &[1, 5, 6]), vec![0, 2, 7]);
        assert_eq!(sorted_difference(&[1, 2], &[]), vec![1, 2]);
        assert!(sorted_difference(&[], &[3]).is_empty());
    }
}
