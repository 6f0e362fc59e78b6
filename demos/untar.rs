use std::path::{Path, PathBuf};
use std::process;

use anyhow::*;
use log::*;
use structopt::*;

use chunktar::read::HeaderRecord;
use chunktar::*;

#[derive(Debug, StructOpt)]
#[structopt(name = "untar", about = "Lists or extracts regular files from a tar archive")]
struct Opt {
    /// The archive to read
    #[structopt(short = "f", long = "file")]
    archive: PathBuf,

    /// List the archive's entries
    #[structopt(short = "t", long, conflicts_with = "extract")]
    list: bool,

    /// Extract the archive's entries
    #[structopt(short = "x", long)]
    extract: bool,

    /// Print names while extracting.
    /// Pass more times for additional logging (info, debug, trace).
    #[structopt(short, long, parse(from_occurrences))]
    verbosity: usize,

    /// Extract into the given directory
    #[structopt(short = "C", long)]
    directory: Option<PathBuf>,

    /// Bytes of archive to keep in memory (a multiple of 512)
    #[structopt(long, default_value = "1048576")]
    window_size: usize,

    /// Reject POSIX ustar magic the way some minimal tar readers do
    #[structopt(long)]
    legacy_magic: bool,

    /// Only handle these entries (default: all)
    #[structopt(name = "NAMES")]
    names: Vec<String>,
}

/// Prints names as the archive is scanned.
struct Printer {
    action: Action,
    echo_extracted: bool,
}

impl Observer for Printer {
    fn matched(&mut self, header: &HeaderRecord, _destination: Option<&Path>) {
        if self.action == Action::List || self.echo_extracted {
            println!("{}", header.path);
        }
    }

    fn not_found(&mut self, name: &str) {
        println!("untar: {}: Not found in archive", name);
    }
}

fn main() {
    if let Err(e) = run() {
        eprintln!("untar: {:#}", e);
        eprintln!("untar: Exiting with failure status due to previous errors");
        process::exit(2);
    }
}

fn run() -> Result<()> {
    let args = Opt::from_args();

    let mut errlog = stderrlog::new();
    // Start at warnings so a lone zero block gets mentioned.
    errlog.verbosity(args.verbosity.saturating_sub(1) + 1);
    errlog.init()?;

    let action = match (args.list, args.extract) {
        (true, false) => Action::List,
        (false, true) => Action::Extract,
        _ => bail!("Pass one of -t (list) or -x (extract)"),
    };

    let options = ScanOptions {
        window_size: args.window_size,
        magic_check: if args.legacy_magic {
            MagicCheck::Legacy
        } else {
            MagicCheck::Ustar
        },
        output_dir: args.directory.unwrap_or_else(|| PathBuf::from(".")),
    };
    info!("Scanning {:#?} with {:?}", args.archive, options);

    let mut printer = Printer {
        action,
        echo_extracted: args.verbosity > 0,
    };
    let report = scan(&args.archive, action, &args.names, &options, &mut printer)
        .with_context(|| format!("Couldn't read {}", args.archive.display()))?;

    if !report.is_success() {
        bail!("{} requested entries weren't found", report.not_found.len());
    }
    Ok(())
}
