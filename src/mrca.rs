//! Named MRCA queries.
//!
//! A statement file holds one query per line:
//! ```text
//! ingroup = A B C
//! crown   = B C
//! ```
//! Each query is answered per tree with the number of leaves below the most
//! recent common ancestor of the listed taxa and that node's label.

use crate::error::Result;
use crate::tree::Tree;
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MrcaStatement {
    pub name: String,
    pub taxa: Vec<String>,
}

/// Parses `NAME = tip1 tip2 ...` lines.
///
/// Blank lines are skipped and lines without `=` are ignored with a warning.
/// Statements come back sorted by name; a repeated name keeps its last
/// definition.
///
/// # Example
/// ```
/// # use rust_python_clade_support::mrca::parse_mrca_statements;
/// let statements = parse_mrca_statements("b = C D\n\na = A B\n");
/// assert_eq!(statements[0].name, "a");
/// assert_eq!(statements[1].taxa, vec!["C", "D"]);
/// ```
pub fn parse_mrca_statements(text: &str) -> Vec<MrcaStatement> {
    let mut statements: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (number, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let Some((name, taxa)) = line.split_once('=') else {
            warn!(line = number + 1, "Skipping MRCA line without '='");
            continue;
        };
        let taxa = taxa.split_whitespace().map(str::to_string).collect();
        statements.insert(name.trim().to_string(), taxa);
    }
    statements
        .into_iter()
        .map(|(name, taxa)| MrcaStatement { name, taxa })
        .collect()
}

/// Answer to one statement on one tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MrcaResult {
    pub name: String,
    pub leaf_count: usize,
    pub label: String,
}

impl fmt::Display for MrcaResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.name, self.leaf_count, self.label)
    }
}

/// Locates the MRCA of `statement.taxa` in `tree`.
///
/// # Errors
/// [`TreeError::NotFound`](crate::error::TreeError::NotFound) when a listed
/// taxon is not a leaf of `tree` or the list is empty.
pub fn evaluate(tree: &Tree, statement: &MrcaStatement) -> Result<MrcaResult> {
    let mrca = tree.find_mrca(&statement.taxa)?;
    Ok(MrcaResult {
        name: statement.name.clone(),
        leaf_count: tree.descendant_count(mrca),
        label: tree.node(mrca).label().to_string(),
    })
}
