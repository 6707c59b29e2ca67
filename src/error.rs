//! Error type shared by the tree model, the parsers and the analysis layer.
//!
//! Only structural problems are errors. Unmapped TRANSLATE tokens and
//! unparsable support labels are handled leniently where they occur.

use thiserror::Error;

/// Errors raised while reading trees or querying them.
#[derive(Debug, Error)]
pub enum TreeError {
    /// Input is neither Newick nor Nexus. Fatal for the whole run.
    #[error("Unrecognized tree format: input is neither Newick nor Nexus")]
    UnrecognizedFormat,

    /// Structural violation in a single Newick string.
    #[error("Malformed Newick at position {position}: {message}")]
    MalformedNewick { position: usize, message: String },

    /// A leaf name requested by a query is absent from the tree.
    #[error("No leaf named '{0}' in tree")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TreeError {
    pub(crate) fn malformed(position: usize, message: impl Into<String>) -> Self {
        TreeError::MalformedNewick {
            position,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TreeError>;
