use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use liblattice::posterior::{edge_posteriors, posterior, EdgePosterior};

use super::{load, run_each, Report};
use crate::cli::CommonArgs;

#[derive(Debug, Args)]
pub struct PosteriorArgs {
    /// Lattice files, optionally gzipped
    #[arg(value_name = "LATTICE", required = true)]
    pub lattice_paths: Vec<PathBuf>,

    /// Only report edges with a posterior probability of at least this value
    #[arg(short = 'm', long = "min-posterior", default_value_t = 0.0, value_name = "F")]
    pub min_posterior: f64,

    /// Arguments that are common across all lattice subcommands
    #[command(flatten)]
    pub common_args: CommonArgs,
}

#[derive(Debug, Serialize)]
pub struct PosteriorReport {
    pub path: PathBuf,
    /// The log of the total probability of the lattice
    pub norm: f64,
    pub edges: Vec<EdgePosterior>,
}

impl Report for PosteriorReport {
    fn write_text(&self, out: &mut impl Write) -> Result<()> {
        writeln!(
            out,
            "{}: log total probability {:.4}",
            self.path.to_string_lossy(),
            self.norm
        )?;

        let width = self.edges.iter().map(|e| e.word.len()).max().unwrap_or(0);
        for edge in self.edges.iter() {
            writeln!(
                out,
                "  {:<width$} {:>6} {:>6} {:.6}",
                edge.word,
                edge.entry,
                edge.exit,
                edge.posterior.exp()
            )?;
        }

        Ok(())
    }
}

pub fn posterior_scores(args: &PosteriorArgs) -> Result<()> {
    let min_log_posterior = args.min_posterior.ln();

    run_each(&args.lattice_paths, &args.common_args, |path| {
        let mut lattice = load(path, &args.common_args)?;
        let norm = posterior(&mut lattice, None)?;

        Ok(PosteriorReport {
            path: path.to_path_buf(),
            norm,
            edges: edge_posteriors(&lattice)
                .into_iter()
                .filter(|edge| edge.posterior >= min_log_posterior)
                .collect(),
        })
    })
}
