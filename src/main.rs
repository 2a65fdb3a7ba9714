use std::{
    io::{self, BufWriter, Write},
    path::PathBuf,
    time::Instant,
};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::info;

use ipcount::{logging::init_logger, Counter, ScanConfig, Strategy};

/// Count the distinct IPv4 addresses in a file with one address per line
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input file
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Counting strategy
    #[arg(short, long, value_enum, default_value_t = CliStrategy::Atomic)]
    strategy: CliStrategy,

    /// Number of worker threads (default: available parallelism)
    #[arg(short = 't', long = "threads", value_name = "N")]
    threads: Option<usize>,

    /// Bytes per raw read, or per claimed range with the mmap strategy
    #[arg(long, value_name = "BYTES")]
    block_size: Option<usize>,

    /// Longest partial line carried between reads before giving up
    #[arg(long, value_name = "BYTES")]
    max_line_len: Option<usize>,

    /// Log progress and timing to stderr
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CliStrategy {
    /// Reader plus worker pool over a lock-free bitmap
    Atomic,
    /// Memory-mapped input split across workers
    Mmap,
    /// Single-threaded baseline
    Bitset,
}

impl From<CliStrategy> for Strategy {
    fn from(s: CliStrategy) -> Self {
        match s {
            CliStrategy::Atomic => Strategy::Atomic,
            CliStrategy::Mmap => Strategy::Mmap,
            CliStrategy::Bitset => Strategy::Bitset,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logger(args.verbose);

    let mut config = ScanConfig::default();
    if let Some(n) = args.threads {
        config = config.with_workers(n);
    }
    if let Some(bytes) = args.block_size {
        config = config.with_read_block_size(bytes);
    }
    if let Some(bytes) = args.max_line_len {
        config = config.with_max_line_len(bytes);
    }

    let strategy = Strategy::from(args.strategy);
    info!(
        "counting '{}' with {:?} strategy, {} workers",
        args.file.display(),
        strategy,
        config.workers
    );

    let started = Instant::now();
    let count = strategy
        .counter(config)
        .count_unique(&args.file)
        .with_context(|| format!("failed to count addresses in '{}'", args.file.display()))?;
    info!("done in {:.2?}", started.elapsed());

    let mut out = BufWriter::new(io::stdout().lock());
    writeln!(out, "Unique IPs: {count}")?;
    out.flush()?;
    Ok(())
}
