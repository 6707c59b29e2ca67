use clap::{Args, Parser, Subcommand, ValueEnum};
use rust_python_clade_support::conflict::analyze_forest;
use rust_python_clade_support::error::TreeError;
use rust_python_clade_support::io::{
    TreeForest, mapped_tree_path, open_input, open_output, read_first_tree, read_forest,
    write_presence_tsv, write_report, write_unique_trees,
};
use rust_python_clade_support::mrca::{evaluate, parse_mrca_statements};
use rust_python_clade_support::registry::{RegistryConfig, SplitMode};
use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Clade support, conflict and Internode Certainty for sets of phylogenetic
/// trees (Newick or Nexus, optionally gzip-compressed).
#[derive(Parser, Debug)]
#[command(name = "clade-support", version, about = "Clade frequencies and ICA for tree sets")]
struct Cli {
    /// Quiet mode: suppresses progress messages on stderr
    #[arg(short = 'q', long = "quiet", global = true, default_value_t = false)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Bipartition (clade) frequencies, conflicts, ICA and TSCA
    Bp(BpArgs),
    /// Leaf count and label of named MRCAs in every tree
    Mrca(MrcaArgs),
}

#[derive(Args, Debug)]
struct BpArgs {
    /// Input tree file; stdin when omitted or `-`
    #[arg(short = 't', long = "treef")]
    treef: Option<PathBuf>,

    /// Output file; stdout when omitted
    #[arg(short = 'o', long = "outf")]
    outf: Option<PathBuf>,

    /// List the conflicting clades and the trees exhibiting each clade
    #[arg(short = 'v', long = "verbose", default_value_t = false)]
    verbose: bool,

    /// How splits are registered
    #[arg(long = "mode", value_enum, default_value_t = ModeArg::NodeWise)]
    mode: ModeArg,

    /// Edgewise splits over a shared taxon set (same as `--mode edgewise`)
    #[arg(short = 'e', long = "edgeall", default_value_t = false)]
    edgeall: bool,

    /// Print one tree per distinct topology instead of the clade report
    #[arg(short = 'u', long = "uniquetree", default_value_t = false)]
    uniquetree: bool,

    /// Label the edges of this tree with clade frequencies
    /// (writes `<FILE>.pxbpmapped.tre`)
    #[arg(short = 'm', long = "maptree")]
    maptree: Option<PathBuf>,

    /// Skip edges whose support label is missing or lower than this
    #[arg(short = 'c', long = "cutoff")]
    cutoff: Option<f64>,

    /// Don't print the clade report (useful with --maptree)
    #[arg(short = 's', long = "suppress", default_value_t = false)]
    suppress: bool,

    /// Only report clades present in the first tree
    #[arg(short = 'f', long = "first", default_value_t = false)]
    first: bool,

    /// Also write the tree × clade presence matrix as TSV (`.gz` compresses)
    #[arg(long = "presence")]
    presence: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct MrcaArgs {
    /// Input tree file; stdin when omitted or `-`
    #[arg(short = 't', long = "treef")]
    treef: Option<PathBuf>,

    /// File of `NAME = tip1 tip2 ...` lines
    #[arg(short = 'm', long = "mrca")]
    mrca: PathBuf,

    /// Output file (appended to); stdout when omitted
    #[arg(short = 'o', long = "outf")]
    outf: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ModeArg {
    NodeWise,
    Edgewise,
}

impl BpArgs {
    fn split_mode(&self) -> SplitMode {
        match (self.edgeall, self.mode) {
            (true, _) | (false, ModeArg::Edgewise) => SplitMode::Edgewise,
            (false, ModeArg::NodeWise) => SplitMode::NodeWise,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.quiet);

    match cli.command {
        Command::Bp(args) => run_bp(&args, !cli.quiet),
        Command::Mrca(args) => run_mrca(&args, !cli.quiet),
    }
}

fn init_tracing(quiet: bool) {
    let default = if quiet { "warn" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn run_bp(args: &BpArgs, show: bool) {
    // Read trees
    let t0 = Instant::now();
    let forest = read_trees_or_exit(args.treef.as_deref());
    let read_s = t0.elapsed().as_secs_f64();
    log_if(show, format!("Read {} trees ({}) {read_s:.3}s", forest.trees.len(), forest.format));

    let config = RegistryConfig::default()
        .with_mode(args.split_mode())
        .with_support_cutoff(args.cutoff)
        .with_restrict_to_first_tree(args.first);

    // Register clades and scan for conflicts
    let t1 = Instant::now();
    let analysis = analyze_forest(&forest.trees, config);
    let analysis_s = t1.elapsed().as_secs_f64();
    log_if(
        show,
        format!(
            "Found {} unique clades over {} taxa {analysis_s:.3}s",
            analysis.registry.entries().len(),
            analysis.taxa.len()
        ),
    );

    let output = args.outf.clone().unwrap_or_else(|| PathBuf::from("-"));
    let t2 = Instant::now();
    let written = open_output(&output).and_then(|mut out| {
        if args.uniquetree {
            write_unique_trees(&mut out, &forest.trees, &analysis.matrix)?;
        } else if !args.suppress {
            write_report(&mut out, &analysis.summary, args.verbose)?;
        }
        out.flush()
    });
    if let Err(e) = written {
        eprintln!("Failed to write output {output:?}: {e}");
        std::process::exit(4);
    }
    log_write_done(show && !args.suppress, &output, t2.elapsed().as_secs_f64());

    if args.uniquetree {
        return;
    }

    if let Some(presence) = &args.presence {
        let names: Vec<Vec<String>> = analysis
            .registry
            .entries()
            .iter()
            .map(|e| analysis.taxa.names_of(&e.clade))
            .collect();
        if let Err(e) = write_presence_tsv(presence, &forest.trees, &names, &analysis.matrix) {
            eprintln!("Failed to write presence matrix {presence:?}: {e}");
            std::process::exit(4);
        }
        log_if(show, format!("Wrote presence matrix to {}", presence.display()));
    }

    if let Some(maptree) = &args.maptree {
        let tree = match open_input(maptree).map_err(TreeError::from).and_then(read_first_tree) {
            Ok(Some(tree)) => tree,
            Ok(None) => {
                eprintln!("No tree found in map tree file {maptree:?}.");
                std::process::exit(3);
            }
            Err(TreeError::UnrecognizedFormat) => {
                eprintln!("Error: this really only works with nexus or newick. Exiting.");
                std::process::exit(3);
            }
            Err(e) => {
                eprintln!("Failed to read map tree {maptree:?}: {e}");
                std::process::exit(3);
            }
        };

        let mapped = analysis.registry.annotate_map_tree(&tree, &analysis.taxa);
        let mapped_path = mapped_tree_path(maptree);
        if let Err(e) = std::fs::write(&mapped_path, format!("{}\n", mapped.to_newick(true))) {
            eprintln!("Failed to write mapped tree {mapped_path:?}: {e}");
            std::process::exit(4);
        }
        log_if(show, format!("Wrote mapped tree to {}", mapped_path.display()));
    }
}

fn run_mrca(args: &MrcaArgs, show: bool) {
    let statements = match std::fs::read_to_string(&args.mrca) {
        Ok(text) => parse_mrca_statements(&text),
        Err(e) => {
            eprintln!("Failed to read MRCA file {:?}: {e}", args.mrca);
            std::process::exit(1);
        }
    };
    if statements.is_empty() {
        eprintln!("No MRCA statements found in {:?}.", args.mrca);
        std::process::exit(2);
    }

    let forest = read_trees_or_exit(args.treef.as_deref());
    log_if(show, format!("Evaluating {} MRCAs on {} trees", statements.len(), forest.trees.len()));

    let out: io::Result<Box<dyn Write>> = match &args.outf {
        Some(path) => OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map(|f| Box::new(BufWriter::new(f)) as Box<dyn Write>),
        None => Ok(Box::new(BufWriter::new(io::stdout()))),
    };

    let written = out.and_then(|mut out| {
        for (idx, tree) in forest.trees.iter().enumerate() {
            for statement in &statements {
                match evaluate(tree, statement) {
                    Ok(result) => writeln!(out, "{result}")?,
                    Err(e) => warn!("Tree {idx}: MRCA '{}' skipped: {e}", statement.name),
                }
            }
        }
        out.flush()
    });
    if let Err(e) = written {
        eprintln!("Failed to write output: {e}");
        std::process::exit(4);
    }
}

fn read_trees_or_exit(path: Option<&Path>) -> TreeForest {
    let path = path.unwrap_or(Path::new("-"));
    let forest = match open_input(path).map_err(TreeError::from).and_then(read_forest) {
        Ok(forest) => forest,
        Err(TreeError::UnrecognizedFormat) => {
            eprintln!("Error: this really only works with nexus or newick. Exiting.");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Failed to read {path:?}: {e}");
            std::process::exit(1);
        }
    };
    if forest.trees.is_empty() {
        eprintln!("There are no trees to analyze in {path:?}.");
        std::process::exit(2);
    }
    forest
}

fn log_if(show: bool, msg: String) {
    if show { eprintln!("{}", msg); }
}

fn log_write_done(show: bool, output: &Path, secs: f64) {
    if !show { return; }
    let is_stdout = output.as_os_str() == "-";
    if is_stdout {
        eprintln!("Writing to stdout {secs:.3}s");
    } else {
        eprintln!("Writing to output {secs:.3}s");
    }
}
