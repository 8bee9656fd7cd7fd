use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use indexmap::IndexMap;
use serde::Serialize;

use liblattice::structs::LatticeSummary;

use super::{load, run_each, Report};
use crate::cli::CommonArgs;

#[derive(Debug, Args)]
pub struct InfoArgs {
    /// Lattice files, optionally gzipped
    #[arg(value_name = "LATTICE", required = true)]
    pub lattice_paths: Vec<PathBuf>,

    /// Arguments that are common across all lattice subcommands
    #[command(flatten)]
    pub common_args: CommonArgs,
}

#[derive(Debug, Serialize)]
pub struct InfoReport {
    pub path: PathBuf,
    #[serde(flatten)]
    pub summary: LatticeSummary,
    pub header: IndexMap<String, String>,
}

impl Report for InfoReport {
    fn write_text(&self, out: &mut impl Write) -> Result<()> {
        writeln!(out, "{}", self.path.to_string_lossy())?;
        writeln!(out, "  frames: {}", self.summary.frames)?;
        writeln!(out, "  nodes:  {}", self.summary.nodes)?;
        writeln!(out, "  edges:  {}", self.summary.edges)?;
        writeln!(
            out,
            "  start:  {}",
            self.summary.start.as_deref().unwrap_or("-")
        )?;
        writeln!(out, "  end:    {}", self.summary.end.as_deref().unwrap_or("-"))?;

        for (key, value) in self.header.iter() {
            writeln!(out, "  {key} = {value}")?;
        }

        Ok(())
    }
}

pub fn info(args: &InfoArgs) -> Result<()> {
    run_each(&args.lattice_paths, &args.common_args, |path| {
        let lattice = load(path, &args.common_args)?;

        Ok(InfoReport {
            path: path.to_path_buf(),
            summary: lattice.summary(),
            header: lattice.header,
        })
    })
}
