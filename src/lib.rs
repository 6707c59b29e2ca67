//! Crate root: lightweight module orchestration and public re-exports.
//!
//! Modules:
//! - `tree`: arena-backed phylogenetic tree model.
//! - `format`, `newick`, `nexus`: format detection, parsers and the Newick writer.
//! - `taxa`: dense taxon-name numbering shared by every tree of a run.
//! - `bitset`: compact bitset rows for taxon sets.
//! - `snapshot`: per-tree clade snapshots.
//! - `registry`: clade deduplication, support counting and the presence matrix.
//! - `conflict`: clade conflicts, ICA and TSCA.
//! - `mrca`: named MRCA queries.
//! - `io`: reading (plain or gzip) tree files and writing reports.
//! - `api`: Python bindings via `pyo3` (gated behind "python" feature).

pub mod bitset;
pub mod conflict;
pub mod error;
pub mod format;
pub mod io;
pub mod mrca;
pub mod newick;
pub mod nexus;
pub mod registry;
pub mod snapshot;
pub mod taxa;
pub mod tree;

#[cfg(feature = "python")]
pub mod api;

// Re-export frequently used types & functions
pub use conflict::{CladeReport, ForestAnalysis, ForestSummary, analyze, analyze_forest};
pub use error::{Result, TreeError};
pub use format::{TreeFormat, detect_format};
pub use io::{read_forest, read_forest_file, write_matrix_tsv, write_report};
pub use newick::{NewickReader, parse_newick, write_newick};
pub use nexus::NexusReader;
pub use registry::{BipartitionRegistry, PresenceMatrix, RegistryConfig, SplitMode};
pub use taxa::TaxonIndex;
pub use tree::{Node, NodeId, Tree};
