//! Dense numbering of taxon names across a forest.
//!
//! Ids are handed out in first-observed order and never reassigned, so a
//! clade written as a sorted id list means the same thing in every tree that
//! was registered against the same index.

use crate::tree::Tree;
use std::collections::HashMap;

/// Bidirectional map between taxon names and dense ids `0..len`.
#[derive(Debug, Clone, Default)]
pub struct TaxonIndex {
    ids: HashMap<String, usize>,
    names: Vec<String>,
}

impl TaxonIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id for `name`, assigning the next free id on first sight.
    ///
    /// # Example
    /// ```
    /// # use rust_python_clade_support::taxa::TaxonIndex;
    /// let mut taxa = TaxonIndex::new();
    /// assert_eq!(taxa.get_or_insert("Kea"), 0);
    /// assert_eq!(taxa.get_or_insert("Kaka"), 1);
    /// assert_eq!(taxa.get_or_insert("Kea"), 0);
    /// ```
    pub fn get_or_insert(&mut self, name: &str) -> usize {
        if let Some(&id) = self.ids.get(name) {
            return id;
        }
        let id = self.names.len();
        self.ids.insert(name.to_string(), id);
        self.names.push(name.to_string());
        id
    }

    pub fn get(&self, name: &str) -> Option<usize> {
        self.ids.get(name).copied()
    }

    pub fn name(&self, id: usize) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Registers every leaf name of `tree`, in leaf order.
    pub fn observe(&mut self, tree: &Tree) {
        for leaf in tree.leaves() {
            self.get_or_insert(&tree.node(leaf).name);
        }
    }

    /// Resolves ids back to names; unknown ids are skipped.
    pub fn names_of(&self, ids: &[usize]) -> Vec<String> {
        ids.iter()
            .filter_map(|&id| self.name(id).map(str::to_string))
            .collect()
    }
}
