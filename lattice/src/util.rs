use std::path::Path;

use anyhow::{bail, Context};
use tracing_subscriber::EnvFilter;

/// Logs to stderr at `warn` by default; each `-v` raises the level.
/// `RUST_LOG`, when set, takes precedence.
pub fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact();

    // a second init is a no-op
    let _ = subscriber.try_init();
}

pub fn set_threads(num_threads: usize) -> anyhow::Result<()> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build_global()
        .context("failed to build rayon global threadpool")
}

pub fn check_overwrite(path: &Path, allow_overwrite: bool) -> anyhow::Result<()> {
    if path.exists() && !allow_overwrite {
        bail!(
            "output file already exists: {} (use --allow-overwrite)",
            path.to_string_lossy()
        );
    }
    Ok(())
}
