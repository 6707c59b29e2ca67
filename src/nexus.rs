//! Nexus tree reading.
//!
//! Only the TREES block matters here. The reader walks the file statement by
//! statement (`;`-terminated, with quotes and `[...]` comments respected),
//! picks up the optional TRANSLATE table and parses each
//! `TREE <name> = <newick>;` statement with the Newick parser, replacing leaf
//! tokens through the table. Other blocks are skipped.

use crate::error::{Result, TreeError};
use crate::newick::{StatementBuffer, is_blank, parse_newick_translated, unescape_label};
use crate::tree::Tree;
use std::collections::{HashMap, HashSet};
use std::io::BufRead;
use tracing::warn;

/// A classified Nexus statement (terminating `;` already removed).
enum Statement<'a> {
    BeginTrees,
    BeginOther,
    End,
    Translate(&'a str),
    Tree(&'a str),
    Other,
}

/// Streams the trees of a Nexus TREES block.
pub struct NexusReader<R> {
    reader: R,
    buffer: StatementBuffer,
    translation: HashMap<String, String>,
    pending: Option<String>,
    in_trees_block: bool,
    unmapped: Vec<String>,
    warned: HashSet<String>,
    done: bool,
}

impl<R: BufRead> NexusReader<R> {
    /// Creates the reader and scans ahead until the TRANSLATE table, the
    /// first tree, or the end of input.
    ///
    /// `residual` is the text the format detector already consumed.
    pub fn new(reader: R, residual: String) -> Result<Self> {
        let mut nexus = NexusReader {
            reader,
            buffer: StatementBuffer::new(residual),
            translation: HashMap::new(),
            pending: None,
            in_trees_block: false,
            unmapped: Vec::new(),
            warned: HashSet::new(),
            done: false,
        };
        nexus.scan_header()?;
        Ok(nexus)
    }

    fn scan_header(&mut self) -> Result<()> {
        while let Some(statement) = self.next_statement()? {
            if matches!(classify(&statement, self.in_trees_block), Statement::Tree(_)) {
                self.pending = Some(statement);
                return Ok(());
            }
            match classify(&statement, self.in_trees_block) {
                Statement::Translate(body) => {
                    self.translation = parse_translate(body);
                    return Ok(());
                }
                other => self.track_block(&other),
            }
        }
        Ok(())
    }

    /// Returns the next tree of the TREES block, or `None` when exhausted.
    ///
    /// A malformed tree statement yields an error; the statement has been
    /// consumed, so the following call continues with the next one.
    pub fn next_tree(&mut self) -> Result<Option<Tree>> {
        if let Some(statement) = self.pending.take() {
            if let Statement::Tree(body) = classify(&statement, true) {
                return self.parse_tree_statement(body).map(Some);
            }
        }
        while let Some(statement) = self.next_statement()? {
            match classify(&statement, self.in_trees_block) {
                Statement::Tree(body) => return self.parse_tree_statement(body).map(Some),
                Statement::Translate(body) => self.translation = parse_translate(body),
                other => self.track_block(&other),
            }
        }
        Ok(None)
    }

    /// Leaf tokens that had no entry in the TRANSLATE table, in first-seen
    /// order. They were kept as literal leaf names.
    pub fn unmapped_tokens(&self) -> &[String] {
        &self.unmapped
    }

    pub fn translation(&self) -> &HashMap<String, String> {
        &self.translation
    }

    fn track_block(&mut self, statement: &Statement<'_>) {
        match statement {
            Statement::BeginTrees => self.in_trees_block = true,
            Statement::BeginOther | Statement::End => self.in_trees_block = false,
            _ => {}
        }
    }

    fn parse_tree_statement(&mut self, body: &str) -> Result<Tree> {
        let Some(eq) = find_outside_quotes(body, b'=') else {
            return Err(TreeError::malformed(0, "TREE statement without '='"));
        };

        let mut newick = body[eq + 1..].to_string();
        newick.push(';');
        let (mut tree, unmapped) = parse_newick_translated(&newick, &self.translation)?;

        let name = statement_tree_name(&body[..eq]);
        if !name.is_empty() {
            tree.set_name(name);
        }

        for token in unmapped {
            if self.warned.insert(token.clone()) {
                warn!("Leaf token '{token}' has no TRANSLATE entry, keeping it as the leaf name");
                self.unmapped.push(token);
            }
        }
        Ok(tree)
    }

    fn next_statement(&mut self) -> Result<Option<String>> {
        if self.done {
            return Ok(None);
        }
        loop {
            if let Some(mut statement) = self.buffer.take_statement() {
                statement.pop();
                return Ok(Some(statement));
            }

            let mut line = String::new();
            let read = self.reader.read_line(&mut line).inspect_err(|_| {
                self.done = true;
            })?;
            if read == 0 {
                self.done = true;
                let leftover = self.buffer.take_rest();
                // A trailing "#NEXUS" header or comment without ';' is harmless.
                if is_blank(&leftover) || skip_comments(&leftover).trim_end().eq_ignore_ascii_case("#NEXUS") {
                    return Ok(None);
                }
                return Err(TreeError::malformed(
                    leftover.len(),
                    "Missing ';' at end of Nexus input",
                ));
            }
            self.buffer.push_str(&line);
        }
    }
}

impl<R: BufRead> Iterator for NexusReader<R> {
    type Item = Result<Tree>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_tree().transpose()
    }
}

fn classify(statement: &str, in_trees_block: bool) -> Statement<'_> {
    let (mut keyword, mut rest) = split_keyword(skip_comments(statement));
    if keyword.eq_ignore_ascii_case("#NEXUS") {
        (keyword, rest) = split_keyword(skip_comments(rest));
    }

    match keyword.to_ascii_uppercase().as_str() {
        "BEGIN" => {
            let (block, _) = split_keyword(skip_comments(rest));
            if block.eq_ignore_ascii_case("TREES") {
                Statement::BeginTrees
            } else {
                Statement::BeginOther
            }
        }
        "END" | "ENDBLOCK" => Statement::End,
        "TRANSLATE" if in_trees_block => Statement::Translate(rest),
        "TREE" | "UTREE" if in_trees_block => Statement::Tree(rest),
        _ => Statement::Other,
    }
}

/// Splits off the first word; the remainder keeps its leading separator.
fn split_keyword(text: &str) -> (&str, &str) {
    match text.find(|c: char| c.is_whitespace() || c == '[') {
        Some(i) => (&text[..i], &text[i..]),
        None => (text, ""),
    }
}

/// Drops leading whitespace and `[...]` comments.
fn skip_comments(mut text: &str) -> &str {
    loop {
        text = text.trim_start();
        if !text.starts_with('[') {
            return text;
        }
        let mut depth = 0usize;
        let mut end = None;
        for (i, b) in text.bytes().enumerate() {
            match b {
                b'[' => depth += 1,
                b']' => {
                    depth -= 1;
                    if depth == 0 {
                        end = Some(i);
                        break;
                    }
                }
                _ => {}
            }
        }
        match end {
            Some(i) => text = &text[i + 1..],
            None => return "",
        }
    }
}

fn find_outside_quotes(text: &str, target: u8) -> Option<usize> {
    let mut in_quote = false;
    let mut depth = 0usize;
    for (i, b) in text.bytes().enumerate() {
        match b {
            b'\'' if depth == 0 => in_quote = !in_quote,
            b'[' if !in_quote => depth += 1,
            b']' if !in_quote && depth > 0 => depth -= 1,
            _ if b == target && !in_quote && depth == 0 => return Some(i),
            _ => {}
        }
    }
    None
}

/// Name part of `TREE [*] name [comment] =`.
///
/// Quoted names are unescaped; bare names are kept verbatim (`STATE_0`).
fn statement_tree_name(head: &str) -> String {
    let head = skip_comments(head);
    let head = head.strip_prefix('*').map(skip_comments).unwrap_or(head);
    let end = find_outside_quotes(head, b'[').unwrap_or(head.len());
    let name = head[..end].trim();
    if name.starts_with('\'') {
        unescape_label(name)
    } else {
        name.to_string()
    }
}

/// Parses the body of a TRANSLATE command: `token label, token label, ...`.
fn parse_translate(body: &str) -> HashMap<String, String> {
    let mut table = HashMap::new();
    let mut rest = body;
    loop {
        let (entry, tail) = match find_outside_quotes(rest, b',') {
            Some(i) => (&rest[..i], Some(&rest[i + 1..])),
            None => (rest, None),
        };
        let entry = skip_comments(entry).trim();
        if let Some(split) = entry.find(char::is_whitespace) {
            let token = unescape_label(&entry[..split]);
            let label = unescape_label(entry[split..].trim());
            table.insert(token, label);
        } else if !entry.is_empty() {
            warn!("Ignoring TRANSLATE entry without a label: '{entry}'");
        }
        match tail {
            Some(tail) => rest = tail,
            None => return table,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn reader(text: &str) -> NexusReader<Cursor<String>> {
        NexusReader::new(Cursor::new(text.to_string()), String::new()).unwrap()
    }

    #[test]
    fn test_translate_block() {
        let mut nexus = reader(
            "#NEXUS\nBEGIN TREES;\n TRANSLATE 1 taxonA, 2 taxonB;\n TREE t1 = (1,2);\nEND;\n",
        );
        let tree = nexus.next_tree().unwrap().unwrap();
        assert_eq!(tree.leaf_names(), vec!["taxonA", "taxonB"]);
        assert_eq!(tree.name(), Some("t1"));
        assert!(nexus.next_tree().unwrap().is_none());
        assert!(nexus.unmapped_tokens().is_empty());
    }

    #[test]
    fn test_without_translate() {
        let text = "#NEXUS\n[comment; with semicolon]\nBEGIN TAXA;\n DIMENSIONS NTAX=3;\nEND;\n\
                    BEGIN TREES;\n TREE one = ((A,B),C);\n TREE two = ((A,C),B);\nEND;\n";
        let trees: Vec<Tree> = reader(text).collect::<Result<_>>().unwrap();
        assert_eq!(trees.len(), 2);
        assert_eq!(trees[1].leaf_names(), vec!["A", "C", "B"]);
        assert_eq!(trees[1].name(), Some("two"));
    }

    #[test]
    fn test_quoted_translation_labels() {
        let text = "#NEXUS\nbegin trees;\n translate\n  1 'Baillon''s_Crake',\n  2 Little_Owl,\n  \
                    3 'Kea';\n tree 'first tree' = [&U] ((1,2),3);\nend;\n";
        let mut nexus = reader(text);
        assert_eq!(nexus.translation().len(), 3);
        let tree = nexus.next_tree().unwrap().unwrap();
        assert_eq!(tree.leaf_names(), vec!["Baillon's_Crake", "Little Owl", "Kea"]);
        assert_eq!(tree.name(), Some("first tree"));
    }

    #[test]
    fn test_beast_style_annotations() {
        let text = "#NEXUS\nBegin trees;\n\tTranslate\n\t\t1 A,\n\t\t2 B,\n\t\t3 C\n\t\t;\n\
                    tree STATE_0 [&lnP=-10.5] = [&R] ((1[&rate=1.0]:0.5,2:0.5)[&posterior=1]:1,3:1.5);\n\
                    End;\n";
        let mut nexus = reader(text);
        let tree = nexus.next_tree().unwrap().unwrap();
        assert_eq!(tree.leaf_names(), vec!["A", "B", "C"]);
        assert_eq!(tree.name(), Some("STATE_0"));
        let a = tree.find_leaf("A").unwrap();
        assert_eq!(tree.node(a).branch_length, Some(0.5));
    }

    #[test]
    fn test_missing_translation_is_lenient() {
        let mut nexus = reader(
            "#NEXUS\nBEGIN TREES;\nTRANSLATE 1 taxonA;\nTREE t = (1,2);\nTREE u = (2,1);\nEND;\n",
        );
        let tree = nexus.next_tree().unwrap().unwrap();
        assert_eq!(tree.leaf_names(), vec!["taxonA", "2"]);
        nexus.next_tree().unwrap().unwrap();
        assert_eq!(nexus.unmapped_tokens(), &["2".to_string()]);
    }

    #[test]
    fn test_malformed_tree_statement_skipped() {
        let mut nexus = reader("#NEXUS\nBEGIN TREES;\nTREE bad = ((A,B);\nTREE good = (A,B);\nEND;\n");
        assert!(matches!(
            nexus.next_tree(),
            Err(TreeError::MalformedNewick { .. })
        ));
        let tree = nexus.next_tree().unwrap().unwrap();
        assert_eq!(tree.name(), Some("good"));
    }

    #[test]
    fn test_tree_statements_outside_trees_block_ignored() {
        let trees: Vec<Tree> = reader("#NEXUS\nBEGIN PAUP;\nTREE x = (A,B);\nEND;\n")
            .collect::<Result<_>>()
            .unwrap();
        assert!(trees.is_empty());
    }

    #[test]
    fn test_uses_detector_residual() {
        let nexus = NexusReader::new(
            Cursor::new("BEGIN TREES;\nTREE t = (A,B);\nEND;\n".to_string()),
            "#NEXUS\n".to_string(),
        )
        .unwrap();
        let trees: Vec<Tree> = nexus.collect::<Result<_>>().unwrap();
        assert_eq!(trees.len(), 1);
    }
}
