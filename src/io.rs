//! Reading tree files and writing reports.
//!
//! Inputs may be plain or gzip-compressed (`.gz`), and `-` stands for stdin.
//! The text report follows the layout of the classic `pxbp` tool:
//!
//! ```text
//! 3 trees
//! 3 unique clades found
//! CLADE: B C D 	FREQ:	0.666667	ICA:	0.0817042	COUNT:	2	TREEFREQ:	0.666667
//! CLADE: C D 	FREQ:	1	ICA:	1	COUNT:	3	TREEFREQ:	1
//! ...
//! TSCA: 1.16341
//! ```

use crate::conflict::{CladeReport, ForestSummary};
use crate::error::{Result, TreeError};
use crate::format::{TreeFormat, detect_format};
use crate::newick::NewickReader;
use crate::nexus::NexusReader;
use crate::registry::PresenceMatrix;
use crate::tree::Tree;
use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use itertools::Itertools;
use std::fmt::Display;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Opens `path` for buffered reading. `-` reads stdin; a `.gz` suffix is
/// decompressed on the fly.
pub fn open_input<P: AsRef<Path>>(path: P) -> io::Result<Box<dyn BufRead>> {
    let p = path.as_ref();
    if p.as_os_str() == "-" {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }
    let file = File::open(p)?;
    if is_gz(p) {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Opens `path` for buffered writing, appending `.gz` compression when the
/// name asks for it. `-` writes to stdout.
pub fn open_output<P: AsRef<Path>>(path: P) -> io::Result<Box<dyn Write>> {
    let p = path.as_ref();
    if p.as_os_str() == "-" {
        return Ok(Box::new(BufWriter::new(io::stdout())));
    }
    let file = File::create(p)?;
    if is_gz(p) {
        Ok(Box::new(BufWriter::new(GzEncoder::new(file, Compression::default()))))
    } else {
        Ok(Box::new(BufWriter::new(file)))
    }
}

fn is_gz(path: &Path) -> bool {
    path.to_string_lossy().ends_with(".gz")
}

/// Trees read from one input.
#[derive(Debug, Clone)]
pub struct TreeForest {
    pub format: TreeFormat,
    pub trees: Vec<Tree>,
    /// Nexus leaf tokens missing from the TRANSLATE table.
    pub unmapped_tokens: Vec<String>,
    /// Malformed trees that were skipped.
    pub skipped: usize,
}

/// Detects the format of `reader` and reads every tree in it.
///
/// Malformed trees are logged and skipped; I/O errors and an unrecognized
/// format abort the read.
pub fn read_forest<R: BufRead>(mut reader: R) -> Result<TreeForest> {
    let (format, residual) = detect_format(&mut reader)?;
    let mut forest = TreeForest {
        format,
        trees: Vec::new(),
        unmapped_tokens: Vec::new(),
        skipped: 0,
    };

    match format {
        TreeFormat::Newick => {
            collect_trees(NewickReader::new(reader, residual), &mut forest)?;
        }
        TreeFormat::Nexus => {
            let mut nexus = NexusReader::new(reader, residual)?;
            collect_trees(&mut nexus, &mut forest)?;
            forest.unmapped_tokens = nexus.unmapped_tokens().to_vec();
        }
    }

    info!(format = %format, trees = forest.trees.len(), skipped = forest.skipped, "Read forest");
    Ok(forest)
}

fn collect_trees<I>(trees: I, forest: &mut TreeForest) -> Result<()>
where
    I: Iterator<Item = Result<Tree>>,
{
    for (idx, tree) in trees.enumerate() {
        match tree {
            Ok(tree) => forest.trees.push(tree),
            Err(TreeError::MalformedNewick { position, message }) => {
                warn!("Skipping malformed tree at index {idx}: position {position}: {message}");
                forest.skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Reads the forest stored at `path` (see [`open_input`]).
pub fn read_forest_file<P: AsRef<Path>>(path: P) -> Result<TreeForest> {
    read_forest(open_input(path)?)
}

/// Reads only the first well-formed tree of `reader`.
pub fn read_first_tree<R: BufRead>(mut reader: R) -> Result<Option<Tree>> {
    let (format, residual) = detect_format(&mut reader)?;
    let first = match format {
        TreeFormat::Newick => NewickReader::new(reader, residual).find_map(|t| t.ok()),
        TreeFormat::Nexus => NexusReader::new(reader, residual)?.find_map(|t| t.ok()),
    };
    Ok(first)
}

/// Path the annotated map tree is written to: `<maptree>.pxbpmapped.tre`.
pub fn mapped_tree_path<P: AsRef<Path>>(maptree: P) -> PathBuf {
    let mut name = maptree.as_ref().as_os_str().to_owned();
    name.push(".pxbpmapped.tre");
    PathBuf::from(name)
}

/// Formats a number the way C++ streams do by default: six significant
/// digits, no trailing zeros.
pub fn format_number(x: f64) -> String {
    if x.fract() == 0.0 && x.abs() < 1e15 {
        return format!("{}", x as i64);
    }
    if !x.is_finite() {
        return x.to_string();
    }
    let magnitude = x.abs().log10().floor() as i32;
    let decimals = (5 - magnitude).max(0) as usize;
    let s = format!("{x:.decimals$}");
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s
    }
}

fn write_sides<W: Write>(out: &mut W, clade: &[String], complement: &[String]) -> io::Result<()> {
    write!(out, "{} ", clade.iter().join(" "))?;
    if !complement.is_empty() {
        write!(out, "| {} ", complement.iter().join(" "))?;
    }
    Ok(())
}

fn write_clade<W: Write>(out: &mut W, clade: &CladeReport, verbose: bool) -> io::Result<()> {
    write!(out, "CLADE: ")?;
    write_sides(out, &clade.clade, &clade.complement)?;

    if verbose && !clade.in_all_trees {
        writeln!(out, "\n\tCONFLICTS:")?;
        for conflict in &clade.conflicts {
            write!(out, " \t ")?;
            write_sides(out, &conflict.clade, &conflict.complement)?;
            writeln!(
                out,
                "\tCOUNT:\t{}\tTREEFREQ:\t{}",
                format_number(conflict.support),
                format_number(conflict.tree_frequency)
            )?;
        }
    }

    writeln!(
        out,
        "\tFREQ:\t{}\tICA:\t{}\tCOUNT:\t{}\tTREEFREQ:\t{}",
        format_number(clade.conflict_frequency),
        format_number(clade.ica),
        format_number(clade.support),
        format_number(clade.tree_frequency)
    )?;

    if verbose {
        writeln!(out, "\tTREES:\t{} ", clade.trees.iter().join(" "))?;
    }
    Ok(())
}

/// Writes the per-clade report followed by the TSCA line.
pub fn write_report<W: Write>(out: &mut W, summary: &ForestSummary, verbose: bool) -> io::Result<()> {
    writeln!(out, "{} trees ", summary.num_trees)?;
    writeln!(out, "{} unique clades found", summary.num_clades)?;
    for clade in &summary.clades {
        write_clade(out, clade, verbose)?;
    }
    writeln!(out, "TSCA: {}", format_number(summary.tsca))?;
    Ok(())
}

/// Writes the first tree of every distinct presence-matrix row, without
/// branch lengths.
pub fn write_unique_trees<W: Write>(
    out: &mut W,
    trees: &[Tree],
    matrix: &PresenceMatrix,
) -> io::Result<()> {
    writeln!(out, "====UNIQUE TREES====")?;
    for t in matrix.unique_rows() {
        writeln!(out, "{}", trees[t].to_newick(false))?;
    }
    writeln!(out, "==END UNIQUE TREES==")?;
    Ok(())
}

/// Write a labelled matrix as TSV to a file or stdout (`-`).
/// If `path` ends with `.gz`, the output is gzip-compressed.
pub fn write_matrix_tsv<P: AsRef<Path>, T: Display>(
    path: P,
    row_names: &[String],
    column_names: &[String],
    mat: &[Vec<T>],
) -> io::Result<()> {
    if row_names.len() != mat.len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} row names for {} rows", row_names.len(), mat.len()),
        ));
    }

    let mut out = open_output(path)?;

    // Header row
    writeln!(out, "\t{}", column_names.iter().join("\t"))?;

    // Rows
    for (name, row) in row_names.iter().zip(mat) {
        write!(out, "{name}")?;
        for val in row {
            write!(out, "\t{val}")?;
        }
        writeln!(out)?;
    }

    out.flush()?;
    Ok(())
}

/// Writes the tree × clade presence matrix. Rows are named after the trees
/// (their Nexus name, or `tree_<i>`), columns after the clades (`A,B,C`),
/// plus a trailing `root` column in node-wise mode.
pub fn write_presence_tsv<P: AsRef<Path>>(
    path: P,
    trees: &[Tree],
    summary_names: &[Vec<String>],
    matrix: &PresenceMatrix,
) -> io::Result<()> {
    let row_names: Vec<String> = trees
        .iter()
        .enumerate()
        .map(|(i, t)| t.name().map_or_else(|| format!("tree_{i}"), str::to_string))
        .collect();
    let mut column_names: Vec<String> = summary_names.iter().map(|c| c.iter().join(",")).collect();
    if matrix.root_column().is_some() {
        column_names.push("root".to_string());
    }
    write_matrix_tsv(path, &row_names, &column_names, matrix.rows())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::analyze_forest;
    use crate::registry::RegistryConfig;
    use std::io::{Cursor, Read};
    use tempfile::tempdir;

    const SCENARIO: &str = "(A,(B,(C,D)));\n(A,(B,(C,D)));\n((A,B),(C,D));\n";

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(1.0), "1");
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(2.0 / 3.0), "0.666667");
        assert_eq!(format_number(0.0817042), "0.0817042");
        assert_eq!(format_number(-0.5), "-0.5");
        assert_eq!(format_number(1.163408), "1.16341");
    }

    #[test]
    fn test_read_forest_newick() {
        let forest = read_forest(Cursor::new(SCENARIO)).unwrap();
        assert_eq!(forest.format, TreeFormat::Newick);
        assert_eq!(forest.trees.len(), 3);
        assert_eq!(forest.skipped, 0);
    }

    #[test]
    fn test_read_forest_skips_malformed() {
        let forest = read_forest(Cursor::new("(A,B);\n(A,(B;\n(C,D);\n")).unwrap();
        assert_eq!(forest.trees.len(), 2);
        assert_eq!(forest.skipped, 1);
    }

    #[test]
    fn test_read_forest_nexus() {
        let text = "#NEXUS\nBEGIN TREES;\nTRANSLATE 1 taxonA, 2 taxonB;\nTREE t1 = (1,(2,3));\nEND;\n";
        let forest = read_forest(Cursor::new(text)).unwrap();
        assert_eq!(forest.format, TreeFormat::Nexus);
        assert_eq!(forest.trees[0].leaf_names(), vec!["taxonA", "taxonB", "3"]);
        assert_eq!(forest.unmapped_tokens, vec!["3"]);
    }

    #[test]
    fn test_read_forest_unrecognized() {
        assert!(matches!(
            read_forest(Cursor::new("not a tree\n")),
            Err(TreeError::UnrecognizedFormat)
        ));
    }

    #[test]
    fn test_read_first_tree() {
        let tree = read_first_tree(Cursor::new("((A,;\n(C,D);\n(E,F);\n")).unwrap().unwrap();
        assert_eq!(tree.leaf_names(), vec!["C", "D"]);
    }

    #[test]
    fn test_gzip_input() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trees.tre.gz");
        {
            let mut out = open_output(&path).unwrap();
            out.write_all(SCENARIO.as_bytes()).unwrap();
            out.flush().unwrap();
        }
        let forest = read_forest_file(&path).unwrap();
        assert_eq!(forest.trees.len(), 3);
    }

    #[test]
    fn test_write_report() {
        let forest = read_forest(Cursor::new(SCENARIO)).unwrap();
        let analysis = analyze_forest(&forest.trees, RegistryConfig::default());

        let mut buf = Vec::new();
        write_report(&mut buf, &analysis.summary, false).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "3 trees ");
        assert_eq!(lines[1], "3 unique clades found");
        assert_eq!(
            lines[2],
            "CLADE: B C D \tFREQ:\t0.666667\tICA:\t0.0817042\tCOUNT:\t2\tTREEFREQ:\t0.666667"
        );
        assert_eq!(lines[3], "CLADE: C D \tFREQ:\t1\tICA:\t1\tCOUNT:\t3\tTREEFREQ:\t1");
        assert!(lines[4].starts_with("CLADE: A B \tFREQ:\t0.333333\tICA:\t-0.0817042"));
        assert_eq!(lines[5], "TSCA: 1.16341");
    }

    #[test]
    fn test_write_report_verbose() {
        let forest = read_forest(Cursor::new(SCENARIO)).unwrap();
        let analysis = analyze_forest(&forest.trees, RegistryConfig::default());

        let mut buf = Vec::new();
        write_report(&mut buf, &analysis.summary, true).unwrap();
        let text = String::from_utf8(buf).unwrap();

        assert!(text.contains("CLADE: B C D \n\tCONFLICTS:\n \t A B \tCOUNT:\t1\tTREEFREQ:\t0.333333\n"));
        assert!(text.contains("\tTREES:\t0 1 \n"));
        assert!(text.contains("\tTREES:\t0 1 2 \n"));
    }

    #[test]
    fn test_write_unique_trees() {
        let forest = read_forest(Cursor::new("((A:1,B:1):1,C:1);\n((B,A),C);\n((A,C),B);\n")).unwrap();
        let analysis = analyze_forest(&forest.trees, RegistryConfig::default());
        let mut buf = Vec::new();
        write_unique_trees(&mut buf, &forest.trees, &analysis.matrix).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "====UNIQUE TREES====\n((A,B),C);\n((A,C),B);\n==END UNIQUE TREES==\n"
        );
    }

    #[test]
    fn test_write_presence_tsv_gz() {
        let forest = read_forest(Cursor::new(SCENARIO)).unwrap();
        let analysis = analyze_forest(&forest.trees, RegistryConfig::default());
        let names: Vec<Vec<String>> = analysis
            .registry
            .entries()
            .iter()
            .map(|e| analysis.taxa.names_of(&e.clade))
            .collect();

        let dir = tempdir().unwrap();
        let path = dir.path().join("presence.tsv.gz");
        write_presence_tsv(&path, &forest.trees, &names, &analysis.matrix).unwrap();

        let mut text = String::new();
        open_input(&path).unwrap().read_to_string(&mut text).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "\tB,C,D\tC,D\tA,B\troot");
        assert_eq!(lines[1], "tree_0\t1\t1\t0\t1");
        assert_eq!(lines[3], "tree_2\t0\t1\t1\t1");
    }

    #[test]
    fn test_write_matrix_tsv_row_mismatch() {
        let dir = tempdir().unwrap();
        let err = write_matrix_tsv(
            dir.path().join("m.tsv"),
            &["only".to_string()],
            &["c".to_string()],
            &[vec![1], vec![0]],
        )
        .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_mapped_tree_path() {
        assert_eq!(
            mapped_tree_path("out/best.tre"),
            PathBuf::from("out/best.tre.pxbpmapped.tre")
        );
    }
}
