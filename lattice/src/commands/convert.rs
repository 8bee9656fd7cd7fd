use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, ValueEnum};
use tracing::info;

use liblattice::{write_lattice, LatticeFormat};

use super::load;
use crate::cli::CommonArgs;
use crate::util::check_overwrite;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Sphinx,
    Htk,
}

impl From<OutputFormat> for LatticeFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Sphinx => LatticeFormat::Sphinx,
            OutputFormat::Htk => LatticeFormat::Htk,
        }
    }
}

#[derive(Debug, Args)]
pub struct ConvertArgs {
    /// The lattice to convert, optionally gzipped
    #[arg(value_name = "LATTICE")]
    pub lattice_path: PathBuf,

    /// Where to write the converted lattice (gzipped if it ends in .gz)
    #[arg(value_name = "OUTPUT")]
    pub output_path: PathBuf,

    /// The format to write
    #[arg(long = "to", value_enum)]
    pub to: OutputFormat,

    /// Allow the output file to be overwritten
    #[arg(short = 'q', long = "allow-overwrite", default_value_t = false)]
    pub allow_overwrite: bool,

    /// Arguments that are common across all lattice subcommands
    #[command(flatten)]
    pub common_args: CommonArgs,
}

pub fn convert(args: &ConvertArgs) -> Result<()> {
    check_overwrite(&args.output_path, args.allow_overwrite)?;

    let lattice = load(&args.lattice_path, &args.common_args)?;
    write_lattice(&lattice, &args.output_path, args.to.into())?;

    info!(
        from = %args.lattice_path.to_string_lossy(),
        to = %args.output_path.to_string_lossy(),
        format = %LatticeFormat::from(args.to),
        "converted lattice"
    );

    Ok(())
}
