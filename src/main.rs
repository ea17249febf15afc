use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use spr_replay::replay::{DEFAULT_OUT_DIR, ReplayConfig, replay_file};
use tracing_subscriber::EnvFilter;

/// Replay the prune and regraft moves recorded in a tree-search trace and
/// write every intermediate topology as a Newick file.
#[derive(Parser, Debug)]
#[command(name = "spr-replay", version, about = "Replay SPR moves from a tree-search trace")]
struct Args {
    /// Path to the trace file
    trace: PathBuf,

    /// Directory receiving the output trees
    #[arg(short = 'o', long = "out-dir", default_value = DEFAULT_OUT_DIR)]
    out_dir: PathBuf,

    /// Quiet mode: only warnings and errors are logged
    #[arg(short = 'q', long = "quiet", default_value_t = false)]
    quiet: bool,
}

fn init_tracing(quiet: bool) {
    let default = if quiet { "warn" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).with_writer(std::io::stderr).init();
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.quiet);

    let t0 = Instant::now();
    let config = ReplayConfig { out_dir: args.out_dir.clone() };
    let stats = replay_file(&args.trace, config)
        .with_context(|| format!("replaying {}", args.trace.display()))?;

    tracing::info!(
        trees = stats.trees,
        out_dir = %args.out_dir.display(),
        "done in {:.3}s",
        t0.elapsed().as_secs_f64()
    );
    Ok(())
}
