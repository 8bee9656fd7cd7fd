use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use liblattice::search::best_path;

use super::{load, run_each, Report};
use crate::cli::CommonArgs;

#[derive(Debug, Args)]
pub struct BestPathArgs {
    /// Lattice files, optionally gzipped
    #[arg(value_name = "LATTICE", required = true)]
    pub lattice_paths: Vec<PathBuf>,

    /// Bypass filler words such as <sil> before searching
    #[arg(long = "bypass-fillers", action)]
    pub bypass_fillers: bool,

    /// Arguments that are common across all lattice subcommands
    #[command(flatten)]
    pub common_args: CommonArgs,
}

#[derive(Debug, Serialize)]
pub struct BestPathReport {
    pub path: PathBuf,
    pub score: f64,
    pub words: Vec<String>,
}

impl Report for BestPathReport {
    fn write_text(&self, out: &mut impl Write) -> Result<()> {
        writeln!(
            out,
            "{}\t{:.4}\t{}",
            self.path.to_string_lossy(),
            self.score,
            self.words.join(" ")
        )?;
        Ok(())
    }
}

pub fn bestpath(args: &BestPathArgs) -> Result<()> {
    run_each(&args.lattice_paths, &args.common_args, |path| {
        let mut lattice = load(path, &args.common_args)?;

        if args.bypass_fillers {
            lattice.bypass_fillers();
        }

        let best = best_path(&lattice, None)?;

        Ok(BestPathReport {
            path: path.to_path_buf(),
            score: best.score,
            words: best
                .words(&lattice)
                .into_iter()
                .map(String::from)
                .collect(),
        })
    })
}
