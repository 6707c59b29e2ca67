//! Python binding layer for clade support analysis.
//!
//! Provides Python functions that read Newick or Nexus tree files and report
//! clade frequencies, Internode Certainty and unique topologies.

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::conflict::analyze_forest;
use crate::io::read_forest_file;
use crate::registry::{RegistryConfig, SplitMode};
use crate::tree::Tree;

/// One reported clade: (clade, complement, count, tree_freq, freq, ica).
type CladeRow = (Vec<String>, Vec<String>, f64, f64, f64, f64);

/// Compute clade support and Internode Certainty over the trees of several files.
///
/// Args:
///     paths: List of Newick or Nexus tree files (optionally gzip-compressed)
///     edgewise: Treat each split as one two-sided bipartition; assumes all
///         trees share the same taxa (default: False)
///     cutoff: Ignore edges whose support label is missing or below this value
///         (default: None)
///     first_tree: Only report clades present in the first tree (default: False)
///
/// Returns:
///     A tuple of (clades, tsca) where:
///     - clades is a list of (clade, complement, count, tree_freq, freq, ica)
///       tuples in discovery order; complement is empty unless edgewise
///     - tsca is the summed certainty of all reported clades
///
/// Raises:
///     ValueError: If a file cannot be read, is not a tree file, or holds no trees
#[pyfunction]
#[pyo3(signature = (paths, edgewise=false, cutoff=None, first_tree=false))]
fn clade_support(
    paths: Vec<String>,
    edgewise: bool,
    cutoff: Option<f64>,
    first_tree: bool,
) -> PyResult<(Vec<CladeRow>, f64)> {
    let trees = read_all_trees(&paths)?;

    let mode = if edgewise { SplitMode::Edgewise } else { SplitMode::NodeWise };
    let config = RegistryConfig::default()
        .with_mode(mode)
        .with_support_cutoff(cutoff)
        .with_restrict_to_first_tree(first_tree);

    let summary = analyze_forest(&trees, config).summary;
    let rows = summary
        .clades
        .into_iter()
        .map(|c| {
            (
                c.clade,
                c.complement,
                c.support,
                c.tree_frequency,
                c.conflict_frequency,
                c.ica,
            )
        })
        .collect();

    Ok((rows, summary.tsca))
}

/// Return one Newick string (without branch lengths) per distinct topology.
///
/// Args:
///     paths: List of Newick or Nexus tree files (optionally gzip-compressed)
///
/// Returns:
///     A list of Newick strings: the first tree of each group of trees that
///     contain exactly the same clades
///
/// Raises:
///     ValueError: If a file cannot be read, is not a tree file, or holds no trees
#[pyfunction]
#[pyo3(signature = (paths))]
fn unique_trees(paths: Vec<String>) -> PyResult<Vec<String>> {
    let trees = read_all_trees(&paths)?;
    let analysis = analyze_forest(&trees, RegistryConfig::default());
    Ok(analysis
        .matrix
        .unique_rows()
        .into_iter()
        .map(|t| trees[t].to_newick(false))
        .collect())
}

/// Helper function to read trees from multiple files
fn read_all_trees(paths: &[String]) -> PyResult<Vec<Tree>> {
    let mut all_trees = Vec::new();

    for path in paths {
        let forest = read_forest_file(path)
            .map_err(|e| PyValueError::new_err(format!("Failed to read '{path}': {e}")))?;

        if forest.trees.is_empty() {
            return Err(PyValueError::new_err(format!(
                "No trees found in file '{path}'"
            )));
        }
        all_trees.extend(forest.trees);
    }

    if all_trees.is_empty() {
        return Err(PyValueError::new_err(
            "No trees found in any of the provided files",
        ));
    }

    Ok(all_trees)
}

/// Python module definition
#[pymodule]
fn rust_python_clade_support(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(clade_support, m)?)?;
    m.add_function(wrap_pyfunction!(unique_trees, m)?)?;
    Ok(())
}
