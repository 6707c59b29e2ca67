//! Newick parsing and writing.
//!
//! # Grammar
//! ```text
//! tree     := subtree ';'
//! subtree  := internal | leaf
//! internal := '(' subtree (',' subtree)* ')' label? (':' length)?
//! leaf     := label? (':' length)?
//! ```
//!
//! Labels are either single-quoted (`''` escapes a quote, everything else is
//! kept verbatim) or unquoted, in which case `_` is read as a space.
//! Comments `[...]` may appear wherever whitespace may; annotation blocks
//! (`[&R]`, `[&rate=0.1]`) are read as comments and dropped.
//!
//! An internal label that parses as a number becomes the node's
//! `support_label`; any other internal label becomes its `name`.
//!
//! # Streams
//! [`NewickReader`] pulls one `;`-terminated tree at a time out of a
//! [`BufRead`] and keeps whatever follows in a residual buffer, so one
//! stream can feed several calls (or be handed on to another reader).

use crate::error::{Result, TreeError};
use crate::tree::{Node, NodeId, Tree};
use std::collections::HashMap;
use std::io::BufRead;

/// Characters that force a label to be quoted when written.
const QUOTE_TRIGGERS: &[char] = &[',', ';', '\t', '\n', '\r', '(', ')', ':', '[', ']', '\'', '_'];

// =#========================================================================#=
// PARSER
// =#========================================================================#=
/// Recursive-descent parser over a single Newick string.
struct NewickParser<'a> {
    text: &'a str,
    bytes: &'a [u8],
    pos: usize,
    translation: Option<&'a HashMap<String, String>>,
    unmapped: Vec<String>,
}

impl<'a> NewickParser<'a> {
    fn new(text: &'a str) -> Self {
        NewickParser {
            text,
            bytes: text.as_bytes(),
            pos: 0,
            translation: None,
            unmapped: Vec::new(),
        }
    }

    fn with_translation(mut self, table: &'a HashMap<String, String>) -> Self {
        if !table.is_empty() {
            self.translation = Some(table);
        }
        self
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn consume_if(&mut self, b: u8) -> bool {
        if self.peek() == Some(b) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn error(&self, message: impl Into<String>) -> TreeError {
        TreeError::malformed(self.pos, message)
    }

    fn describe_next(&self) -> String {
        match self.peek() {
            Some(b) => format!("'{}'", b as char),
            None => "end of input".to_string(),
        }
    }

    /// Skips whitespace and (possibly nested) `[...]` comments.
    fn skip_comment_and_whitespace(&mut self) -> Result<()> {
        loop {
            while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
                self.pos += 1;
            }
            if self.peek() != Some(b'[') {
                return Ok(());
            }
            let start = self.pos;
            let mut depth = 0usize;
            loop {
                match self.peek() {
                    Some(b'[') => depth += 1,
                    Some(b']') => {
                        depth -= 1;
                        if depth == 0 {
                            self.pos += 1;
                            break;
                        }
                    }
                    Some(_) => {}
                    None => return Err(TreeError::malformed(start, "Unclosed comment")),
                }
                self.pos += 1;
            }
        }
    }

    /// Parses one tree up to and including its terminating `;`.
    fn parse_tree(&mut self) -> Result<Tree> {
        self.skip_comment_and_whitespace()?;
        if self.is_eof() {
            return Err(self.error("Empty Newick string"));
        }

        let mut tree = Tree::with_root(Node::default());
        let root = tree.root();
        self.parse_subtree(&mut tree, root)?;

        self.skip_comment_and_whitespace()?;
        if !self.consume_if(b';') {
            let found = self.describe_next();
            return Err(self.error(match self.peek() {
                Some(b')') => "Unbalanced parentheses: unexpected ')'".to_string(),
                _ => format!("Expected ';' at end of tree but found {found}"),
            }));
        }
        Ok(tree)
    }

    /// Parses the subtree whose top node is the already allocated `id`.
    fn parse_subtree(&mut self, tree: &mut Tree, id: NodeId) -> Result<()> {
        self.skip_comment_and_whitespace()?;

        let is_internal = self.consume_if(b'(');
        if is_internal {
            loop {
                let child = tree.add_child(id, Node::default());
                self.parse_subtree(tree, child)?;

                self.skip_comment_and_whitespace()?;
                if self.consume_if(b',') {
                    continue;
                }
                if self.consume_if(b')') {
                    break;
                }
                let found = self.describe_next();
                return Err(self.error(if self.is_eof() {
                    "Unbalanced parentheses: missing ')'".to_string()
                } else {
                    format!("Expected ',' or ')' but found {found}")
                }));
            }
            self.skip_comment_and_whitespace()?;
        }

        if let Some(label) = self.parse_label()? {
            if is_internal {
                let node = tree.node_mut(id);
                if label.parse::<f64>().is_ok() {
                    node.support_label = Some(label);
                } else {
                    node.name = label;
                }
            } else {
                tree.node_mut(id).name = self.translate(label);
            }
        }

        if let Some(length) = self.parse_branch_length()? {
            tree.node_mut(id).branch_length = Some(length);
        }
        Ok(())
    }

    /// Parses an optional quoted or unquoted label at the current position.
    fn parse_label(&mut self) -> Result<Option<String>> {
        if self.peek() == Some(b'\'') {
            let start = self.pos;
            self.pos += 1;
            let mut label = String::new();
            loop {
                let Some(offset) = self.text[self.pos..].find('\'') else {
                    return Err(TreeError::malformed(start, "Unterminated quoted label"));
                };
                label.push_str(&self.text[self.pos..self.pos + offset]);
                self.pos += offset + 1;
                if self.consume_if(b'\'') {
                    label.push('\'');
                } else {
                    break;
                }
            }
            return Ok(Some(label));
        }

        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_whitespace()
                || matches!(b, b',' | b'(' | b')' | b':' | b';' | b'[' | b'\'')
            {
                break;
            }
            self.pos += 1;
        }
        if self.pos == start {
            return Ok(None);
        }
        Ok(Some(self.text[start..self.pos].replace('_', " ")))
    }

    /// Parses an optional `:length`; comments may surround the colon.
    fn parse_branch_length(&mut self) -> Result<Option<f64>> {
        self.skip_comment_and_whitespace()?;
        if !self.consume_if(b':') {
            return Ok(None);
        }
        self.skip_comment_and_whitespace()?;

        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_digit() || matches!(b, b'.' | b'-' | b'+' | b'e' | b'E') {
                self.pos += 1;
            } else {
                break;
            }
        }
        let literal = &self.text[start..self.pos];
        let value = literal
            .parse::<f64>()
            .map_err(|_| TreeError::malformed(start, format!("Invalid branch length: '{literal}'")))?;
        Ok(Some(value))
    }

    fn translate(&mut self, token: String) -> String {
        let Some(table) = self.translation else {
            return token;
        };
        match table.get(&token) {
            Some(label) => label.clone(),
            None => {
                self.unmapped.push(token.clone());
                token
            }
        }
    }
}

// =#========================================================================#=
// PUBLIC PARSING API
// =#========================================================================#=
/// Parses one tree from the start of `text` and returns it together with the
/// residual text following its `;`.
///
/// # Errors
/// [`TreeError::MalformedNewick`] on unbalanced parentheses, a missing `;`,
/// structural characters inside labels, unterminated quotes or comments, or
/// an unparsable branch length.
///
/// # Example
/// ```
/// use rust_python_clade_support::newick::parse_newick_prefix;
///
/// let (tree, rest) = parse_newick_prefix("(A,(B,C));((A,B),C);").unwrap();
/// assert_eq!(tree.leaf_names(), vec!["A", "B", "C"]);
/// assert_eq!(rest, "((A,B),C);");
/// ```
pub fn parse_newick_prefix(text: &str) -> Result<(Tree, &str)> {
    let mut parser = NewickParser::new(text);
    let tree = parser.parse_tree()?;
    Ok((tree, &text[parser.pos..]))
}

/// Parses a string holding exactly one tree (trailing whitespace and
/// comments allowed).
pub fn parse_newick(text: &str) -> Result<Tree> {
    let (tree, rest) = parse_newick_prefix(text)?;
    ensure_blank(text, rest)?;
    Ok(tree)
}

/// Parses one tree, replacing leaf tokens through `table`.
///
/// Returns the tree and the leaf tokens that had no entry in a non-empty
/// table; those keep their literal text as name.
pub(crate) fn parse_newick_translated(
    text: &str,
    table: &HashMap<String, String>,
) -> Result<(Tree, Vec<String>)> {
    let mut parser = NewickParser::new(text).with_translation(table);
    let tree = parser.parse_tree()?;
    let consumed = parser.pos;
    ensure_blank(text, &text[consumed..])?;
    Ok((tree, parser.unmapped))
}

fn ensure_blank(text: &str, rest: &str) -> Result<()> {
    let mut tail = NewickParser::new(rest);
    tail.skip_comment_and_whitespace()?;
    if !tail.is_eof() {
        let offset = text.len() - rest.len() + tail.pos;
        return Err(TreeError::malformed(offset, "Unexpected text after ';'"));
    }
    Ok(())
}

/// Whether `text` holds nothing but whitespace and closed comments.
pub(crate) fn is_blank(text: &str) -> bool {
    let mut parser = NewickParser::new(text);
    parser.skip_comment_and_whitespace().is_ok() && parser.is_eof()
}

/// Growing text buffer that hands out `;`-terminated statements.
///
/// Taken statements only advance an offset; the consumed prefix is dropped
/// when more text is appended and it makes up at least half the buffer, so
/// reading many statements from one long line stays linear.
#[derive(Debug, Default)]
pub(crate) struct StatementBuffer {
    text: String,
    consumed: usize,
}

impl StatementBuffer {
    pub(crate) fn new(text: String) -> Self {
        StatementBuffer { text, consumed: 0 }
    }

    /// Text not yet handed out.
    pub(crate) fn as_str(&self) -> &str {
        &self.text[self.consumed..]
    }

    pub(crate) fn push_str(&mut self, more: &str) {
        if self.consumed > 0 && self.consumed * 2 >= self.text.len() {
            self.text.drain(..self.consumed);
            self.consumed = 0;
        }
        self.text.push_str(more);
    }

    /// Next statement up to and including its `;`.
    pub(crate) fn take_statement(&mut self) -> Option<String> {
        let end = find_terminator(self.as_str())?;
        let start = self.consumed;
        self.consumed += end + 1;
        Some(self.text[start..self.consumed].to_string())
    }

    /// Everything not yet handed out; leaves the buffer empty.
    pub(crate) fn take_rest(&mut self) -> String {
        let rest = self.as_str().to_string();
        self.text.clear();
        self.consumed = 0;
        rest
    }
}

/// Byte offset of the first `;` outside quotes and comments, if any.
pub(crate) fn find_terminator(text: &str) -> Option<usize> {
    let mut in_quote = false;
    let mut comment_depth = 0usize;
    for (i, b) in text.bytes().enumerate() {
        match b {
            b'\'' if comment_depth == 0 => in_quote = !in_quote,
            b'[' if !in_quote => comment_depth += 1,
            b']' if !in_quote && comment_depth > 0 => comment_depth -= 1,
            b';' if !in_quote && comment_depth == 0 => return Some(i),
            _ => {}
        }
    }
    None
}

// =#========================================================================#=
// STREAM READER
// =#========================================================================#=
/// Reads Newick trees one at a time from a buffered stream.
///
/// `next_tree` returns `Ok(None)` once the stream holds no further tree.
/// A malformed tree is reported as an error after its text has been
/// consumed, so callers may skip it and keep reading.
pub struct NewickReader<R> {
    reader: R,
    buffer: StatementBuffer,
    done: bool,
}

impl<R: BufRead> NewickReader<R> {
    /// Creates a reader that first consumes `residual` (e.g. the text the
    /// format detector already pulled from `reader`).
    pub fn new(reader: R, residual: String) -> Self {
        NewickReader {
            reader,
            buffer: StatementBuffer::new(residual),
            done: false,
        }
    }

    pub fn next_tree(&mut self) -> Result<Option<Tree>> {
        if self.done {
            return Ok(None);
        }
        loop {
            if let Some(statement) = self.buffer.take_statement() {
                return parse_newick(&statement).map(Some);
            }

            let mut line = String::new();
            let read = self.reader.read_line(&mut line).inspect_err(|_| {
                self.done = true;
            })?;
            if read == 0 {
                self.done = true;
                let leftover = self.buffer.take_rest();
                if is_blank(&leftover) {
                    return Ok(None);
                }
                return Err(TreeError::malformed(
                    leftover.len(),
                    "Missing ';' at end of input",
                ));
            }
            self.buffer.push_str(&line);
        }
    }

    /// Text read from the stream but not yet consumed by a tree.
    pub fn residual(&self) -> &str {
        self.buffer.as_str()
    }

    pub fn into_residual(mut self) -> String {
        self.buffer.take_rest()
    }
}

impl<R: BufRead> Iterator for NewickReader<R> {
    type Item = Result<Tree>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_tree().transpose()
    }
}

// =#========================================================================#=
// WRITER
// =#========================================================================#=
/// Serializes `tree` to Newick, terminated by `;`.
///
/// Leaves print their name; internal nodes print their name, or their
/// support label when unnamed. Newick has a single label slot per node, so a
/// node carrying both a name and a support label is written with the name
/// only. Labels are quoted when needed so that parsing the output gives back
/// the same names.
pub fn write_newick(tree: &Tree, with_branch_lengths: bool) -> String {
    fn build(tree: &Tree, id: NodeId, lengths: bool, out: &mut String) {
        let node = tree.node(id);
        if !node.is_leaf() {
            out.push('(');
            for (i, &child) in node.children().iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                build(tree, child, lengths, out);
            }
            out.push(')');
        }
        out.push_str(&escape_label(node.label()));
        if lengths {
            if let Some(length) = node.branch_length {
                out.push(':');
                out.push_str(&length.to_string());
            }
        }
    }

    let mut out = String::with_capacity(tree.len() * 8);
    build(tree, tree.root(), with_branch_lengths, &mut out);
    out.push(';');
    out
}

/// Escapes a label for Newick output.
///
/// Labels with structural characters, quotes or underscores are wrapped in
/// single quotes (inner quotes doubled); otherwise spaces become underscores.
pub fn escape_label(label: &str) -> String {
    if label.contains(QUOTE_TRIGGERS) {
        format!("'{}'", label.replace('\'', "''"))
    } else {
        label.replace(' ', "_")
    }
}

/// Reverses [`escape_label`] for a single label token (also used for
/// TRANSLATE entries).
pub fn unescape_label(token: &str) -> String {
    if token.len() >= 2 && token.starts_with('\'') && token.ends_with('\'') {
        token[1..token.len() - 1].replace("''", "'")
    } else {
        token.replace('_', " ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_parse_simple() {
        let tree = parse_newick("(A,(B,C):0.1)Root:0.0;").unwrap();
        assert_eq!(tree.leaf_names(), vec!["A", "B", "C"]);
        assert_eq!(tree.node(tree.root()).name, "Root");
        assert_eq!(tree.node(tree.root()).branch_length, Some(0.0));
        assert_eq!(tree.internal_count(), 2);
    }

    #[test]
    fn test_parse_multifurcation() {
        let tree = parse_newick("(A,B,(C,D,E));").unwrap();
        assert!(tree.is_unrooted());
        assert_eq!(tree.child_count(tree.root()), 3);
        assert_eq!(tree.leaf_count(), 5);
    }

    #[test]
    fn test_parse_single_leaf() {
        let tree = parse_newick("A;").unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.leaf_names(), vec!["A"]);
    }

    #[test]
    fn test_support_labels_and_names() {
        let tree = parse_newick("((A,B)95:0.2,(C,D)clade_x);").unwrap();
        let ab = tree.find_mrca(&["A", "B"]).unwrap();
        let cd = tree.find_mrca(&["C", "D"]).unwrap();
        assert_eq!(tree.node(ab).support_label.as_deref(), Some("95"));
        assert_eq!(tree.node(ab).name, "");
        assert_eq!(tree.node(ab).branch_length, Some(0.2));
        assert_eq!(tree.node(cd).name, "clade x");
        assert_eq!(tree.node(cd).support_label, None);
    }

    #[test]
    fn test_quoted_labels() {
        let tree = parse_newick("('Baillon''s_Crake','Little Owl',Kea_bird);").unwrap();
        assert_eq!(tree.leaf_names(), vec!["Baillon's_Crake", "Little Owl", "Kea bird"]);
    }

    #[test]
    fn test_comments_and_annotations_skipped() {
        let tree = parse_newick("[&R] ([c1]A[&rate=0.5]:[&x=1]1.5e-1,B:2)[root];").unwrap();
        assert_eq!(tree.leaf_names(), vec!["A", "B"]);
        let a = tree.find_leaf("A").unwrap();
        assert_eq!(tree.node(a).branch_length, Some(0.15));
    }

    #[test]
    fn test_prefix_returns_residual() {
        let (first, rest) = parse_newick_prefix("(A,B);\n(C,D);").unwrap();
        assert_eq!(first.leaf_names(), vec!["A", "B"]);
        assert_eq!(rest, "\n(C,D);");
        let (second, rest) = parse_newick_prefix(rest).unwrap();
        assert_eq!(second.leaf_names(), vec!["C", "D"]);
        assert_eq!(rest, "");
    }

    #[test]
    fn test_malformed_inputs() {
        for bad in [
            "((A,B);",
            "(A,B))C;",
            "(A,B)",
            "(A(B),C);",
            "(A,B:x);",
            "('A,B);",
            "(A,B)[open;",
        ] {
            let result = parse_newick(bad);
            assert!(
                matches!(result, Err(TreeError::MalformedNewick { .. })),
                "expected MalformedNewick for {bad:?}, got {result:?}"
            );
        }
    }

    #[test]
    fn test_trailing_text_rejected() {
        assert!(matches!(
            parse_newick("(A,B); junk"),
            Err(TreeError::MalformedNewick { .. })
        ));
        assert!(parse_newick("(A,B); [a comment]\n").is_ok());
    }

    #[test]
    fn test_translation() {
        let table: HashMap<String, String> = [("1", "taxonA"), ("2", "taxonB")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let (tree, unmapped) = parse_newick_translated("((1,2)90,3);", &table).unwrap();
        assert_eq!(tree.leaf_names(), vec!["taxonA", "taxonB", "3"]);
        assert_eq!(unmapped, vec!["3"]);
        // Internal support labels are never translated.
        let inner = tree.find_mrca(&["taxonA", "taxonB"]).unwrap();
        assert_eq!(tree.node(inner).support_label.as_deref(), Some("90"));
    }

    #[test]
    fn test_write_and_reparse() {
        let input = "(('Baillon''s Crake':1,Kea_bird:0.5)87:0.25,'odd_name':2,(C,D)Named:1e-3);";
        let tree = parse_newick(input).unwrap();
        let written = write_newick(&tree, true);
        let again = parse_newick(&written).unwrap();
        assert_eq!(tree, again);
        assert_eq!(write_newick(&again, true), written);
    }

    #[test]
    fn test_write_without_lengths() {
        let tree = parse_newick("(A:1,(B:2,C:3)0.9:4);").unwrap();
        assert_eq!(write_newick(&tree, false), "(A,(B,C)0.9);");
        assert_eq!(write_newick(&tree, true), "(A:1,(B:2,C:3)0.9:4);");
    }

    #[test]
    fn test_escape_unescape() {
        assert_eq!(escape_label("Pukeko"), "Pukeko");
        assert_eq!(escape_label("Swamp hen"), "Swamp_hen");
        assert_eq!(escape_label("Pu[ke]ko"), "'Pu[ke]ko'");
        assert_eq!(escape_label("a_b"), "'a_b'");
        assert_eq!(escape_label("Baillon's"), "'Baillon''s'");
        assert_eq!(unescape_label("Swamp_hen"), "Swamp hen");
        assert_eq!(unescape_label("'a_b'"), "a_b");
        assert_eq!(unescape_label("'Baillon''s'"), "Baillon's");
    }

    #[test]
    fn test_find_terminator() {
        assert_eq!(find_terminator("(A,B);"), Some(5));
        assert_eq!(find_terminator("('a;b',B);"), Some(9));
        assert_eq!(find_terminator("(A[;],B);"), Some(8));
        assert_eq!(find_terminator("(A,B)"), None);
    }

    #[test]
    fn test_reader_multiple_trees() {
        let input = "(A,B);(C,D);\n((A,\nB),C);\n";
        let mut reader = NewickReader::new(Cursor::new(input), String::new());
        let mut names = Vec::new();
        while let Some(tree) = reader.next_tree().unwrap() {
            names.push(tree.leaf_names());
        }
        assert_eq!(names.len(), 3);
        assert_eq!(names[2], vec!["A", "B", "C"]);
        assert!(reader.next_tree().unwrap().is_none());
    }

    #[test]
    fn test_reader_uses_handoff_residual() {
        let reader = NewickReader::new(Cursor::new("B);"), "(A,".to_string());
        let trees: Vec<Tree> = reader.collect::<Result<_>>().unwrap();
        assert_eq!(trees.len(), 1);
        assert_eq!(trees[0].leaf_names(), vec!["A", "B"]);
    }

    #[test]
    fn test_reader_skips_bad_tree_and_continues() {
        let input = "(A,(B);\n(C,D);\n";
        let mut reader = NewickReader::new(Cursor::new(input), String::new());
        assert!(reader.next_tree().is_err());
        let tree = reader.next_tree().unwrap().unwrap();
        assert_eq!(tree.leaf_names(), vec!["C", "D"]);
    }

    #[test]
    fn test_reader_missing_terminator() {
        let mut reader = NewickReader::new(Cursor::new("(A,B);(C,D)"), String::new());
        assert!(reader.next_tree().unwrap().is_some());
        assert!(matches!(
            reader.next_tree(),
            Err(TreeError::MalformedNewick { .. })
        ));
        assert!(reader.next_tree().unwrap().is_none());
    }

    #[test]
    fn test_reader_many_trees_on_one_line() {
        let line = "((A,B),C);".repeat(500);
        let mut reader = NewickReader::new(Cursor::new(format!("{line}(D,")), String::new());
        for _ in 0..500 {
            assert_eq!(reader.next_tree().unwrap().unwrap().leaf_names(), vec!["A", "B", "C"]);
        }
        assert_eq!(reader.residual(), "(D,");
        assert!(reader.next_tree().is_err());
    }

    #[test]
    fn test_statement_buffer() {
        let mut buffer = StatementBuffer::new("(A,B);('x;y',C)".to_string());
        assert_eq!(buffer.take_statement().as_deref(), Some("(A,B);"));
        assert_eq!(buffer.take_statement(), None);
        buffer.push_str(";\n(D,E);");
        assert_eq!(buffer.take_statement().as_deref(), Some("('x;y',C);"));
        assert_eq!(buffer.as_str(), "\n(D,E);");
        assert_eq!(buffer.take_rest(), "\n(D,E);");
        assert_eq!(buffer.as_str(), "");
    }

    #[test]
    fn test_name_wins_over_support_when_writing() {
        let mut tree = parse_newick("((A,B)crown,C);").unwrap();
        let crown = tree.find_mrca(&["A", "B"]).unwrap();
        tree.node_mut(crown).support_label = Some("95".to_string());
        assert_eq!(write_newick(&tree, false), "((A,B)crown,C);");

        tree.node_mut(crown).name.clear();
        assert_eq!(write_newick(&tree, false), "((A,B)95,C);");
    }
}
