//! Tree file format detection.

use crate::error::{Result, TreeError};
use std::fmt;
use std::io::BufRead;

/// Tree file formats understood by the readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TreeFormat {
    Nexus = 0,
    Newick = 1,
}

impl TreeFormat {
    /// Numeric format code (Nexus = 0, Newick = 1).
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for TreeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeFormat::Nexus => write!(f, "Nexus"),
            TreeFormat::Newick => write!(f, "Newick"),
        }
    }
}

/// Reads from `reader` until the first meaningful content and classifies it.
///
/// Everything consumed (including leading whitespace and comments) is handed
/// back as the residual string, which the matching reader must be given so
/// that no input is lost.
///
/// # Errors
/// [`TreeError::UnrecognizedFormat`] when the first content is neither a
/// Nexus header nor an opening parenthesis, or when the input is empty.
///
/// # Example
/// ```
/// use rust_python_clade_support::format::{detect_format, TreeFormat};
/// use std::io::Cursor;
///
/// let mut input = Cursor::new("[generated]\n((A,B),C);\n");
/// let (format, residual) = detect_format(&mut input).unwrap();
/// assert_eq!(format, TreeFormat::Newick);
/// assert_eq!(residual, "[generated]\n((A,B),C);\n");
/// ```
pub fn detect_format<R: BufRead>(reader: &mut R) -> Result<(TreeFormat, String)> {
    let mut residual = String::new();
    loop {
        let read = reader.read_line(&mut residual)?;
        match first_content(&residual) {
            Some(Some(start)) => {
                let content = &residual[start..];
                let format = if is_nexus_start(content) {
                    TreeFormat::Nexus
                } else if content.starts_with('(') {
                    TreeFormat::Newick
                } else {
                    return Err(TreeError::UnrecognizedFormat);
                };
                return Ok((format, residual));
            }
            // Blank so far, or inside an unclosed comment.
            _ if read == 0 => return Err(TreeError::UnrecognizedFormat),
            _ => continue,
        }
    }
}

/// `#NEXUS`, or `BEGIN TREES` with any whitespace between the two words.
fn is_nexus_start(content: &str) -> bool {
    if content.get(..6).is_some_and(|head| head.eq_ignore_ascii_case("#NEXUS")) {
        return true;
    }
    let mut words = content
        .split(|c: char| c.is_whitespace() || c == ';')
        .filter(|w| !w.is_empty());
    matches!(
        (words.next(), words.next()),
        (Some(begin), Some(block)) if begin.eq_ignore_ascii_case("BEGIN") && block.eq_ignore_ascii_case("TREES")
    )
}

/// Offset of the first byte that is neither whitespace nor inside a comment.
///
/// `None` while a comment is still open, `Some(None)` for blank text.
fn first_content(text: &str) -> Option<Option<usize>> {
    let mut depth = 0usize;
    for (i, b) in text.bytes().enumerate() {
        match b {
            b'[' => depth += 1,
            b']' if depth > 0 => depth -= 1,
            _ if depth > 0 || b.is_ascii_whitespace() => {}
            _ => return Some(Some(i)),
        }
    }
    if depth > 0 { None } else { Some(None) }
}
