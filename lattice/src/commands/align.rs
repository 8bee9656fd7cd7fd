use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use serde::Serialize;

use liblattice::align::minimum_error;
use liblattice::align::structs::{AlignmentStep, MinimumError};

use super::{load, run_each, Report};
use crate::cli::CommonArgs;

#[derive(Debug, Args)]
pub struct AlignArgs {
    /// Lattice files, optionally gzipped
    #[arg(value_name = "LATTICE", required = true)]
    pub lattice_paths: Vec<PathBuf>,

    /// The reference transcript, as whitespace separated words
    #[arg(short = 'r', long = "reference", value_name = "WORDS")]
    pub reference: String,

    /// Arguments that are common across all lattice subcommands
    #[command(flatten)]
    pub common_args: CommonArgs,
}

impl AlignArgs {
    pub fn reference_words(&self) -> Vec<&str> {
        self.reference.split_whitespace().collect()
    }
}

#[derive(Debug, Serialize)]
pub struct AlignReport {
    pub path: PathBuf,
    pub error_rate: f64,
    #[serde(flatten)]
    pub alignment: MinimumError,
}

/// Renders the alignment as three rows like [`MinimumError::display_strings`],
/// with the columns that hold an error highlighted.
fn colored_rows(steps: &[AlignmentStep]) -> [String; 3] {
    let mut rows: [Vec<String>; 3] = Default::default();

    for step in steps {
        let (reference, lattice) = step.pair();
        let width = reference.len().max(lattice.len());
        let marker = step.marker().to_string();

        for (row, word) in rows.iter_mut().zip([reference, marker.as_str(), lattice]) {
            let cell = format!("{word:<width$}");
            row.push(match step {
                AlignmentStep::Match { .. } => cell,
                AlignmentStep::Substitution { .. } => cell.yellow().to_string(),
                AlignmentStep::Insertion { .. } | AlignmentStep::Deletion { .. } => {
                    cell.red().to_string()
                }
            });
        }
    }

    rows.map(|row| row.join(" "))
}

impl Report for AlignReport {
    fn write_text(&self, out: &mut impl Write) -> Result<()> {
        writeln!(
            out,
            "{}: {} errors over {} words ({:.2}%)",
            self.path.to_string_lossy(),
            self.alignment.errors,
            self.alignment.reference_length(),
            self.error_rate * 100.0
        )?;

        for row in colored_rows(&self.alignment.steps) {
            writeln!(out, "  {row}")?;
        }

        Ok(())
    }
}

pub fn align(args: &AlignArgs) -> Result<()> {
    let reference = args.reference_words();

    run_each(&args.lattice_paths, &args.common_args, |path| {
        let mut lattice = load(path, &args.common_args)?;
        let alignment = minimum_error(&mut lattice, &reference)?;

        Ok(AlignReport {
            path: path.to_path_buf(),
            error_rate: alignment.error_rate(),
            alignment,
        })
    })
}
