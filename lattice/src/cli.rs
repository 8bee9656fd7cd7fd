use clap::{Args, Parser, Subcommand, ValueEnum};
use liblattice::{LatticeFormat, LoadOptions};

use crate::commands::{AlignArgs, BestPathArgs, ConvertArgs, InfoArgs, PosteriorArgs};

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatArg {
    /// Guess the format from the file contents
    Auto,
    /// Sphinx-III word lattices
    Sphinx,
    /// HTK Standard Lattice Format
    Htk,
}

impl FormatArg {
    pub fn lattice_format(self) -> Option<LatticeFormat> {
        match self {
            FormatArg::Auto => None,
            FormatArg::Sphinx => Some(LatticeFormat::Sphinx),
            FormatArg::Htk => Some(LatticeFormat::Htk),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// The number of threads to use
    #[arg(
        short = 't',
        long = "threads",
        default_value_t = 8usize,
        value_name = "n"
    )]
    pub num_threads: usize,

    /// The format of the input lattices
    #[arg(short = 'f', long = "format", value_enum, default_value_t = FormatArg::Auto)]
    pub format: FormatArg,

    /// Frames per second, used to convert HTK node times to frames
    #[arg(long = "frame-rate", default_value_t = LoadOptions::default().frame_rate, value_name = "F")]
    pub frame_rate: f64,

    /// The Sphinx-III log base, for lattices without a -logbase header
    #[arg(long = "log-base", default_value_t = LoadOptions::DEFAULT_LOG_BASE, value_name = "F")]
    pub log_base: f64,

    /// Print results as JSON lines
    #[arg(long, action)]
    pub json: bool,

    /// Log more detail to stderr (-v for debug, -vv for trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl CommonArgs {
    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            frame_rate: self.frame_rate,
            log_base: self.log_base,
        }
    }
}

#[derive(Subcommand)]
pub enum SubCommands {
    #[command(about = "Print the size, endpoints and header of each lattice")]
    Info(InfoArgs),
    #[command(about = "Find the highest scoring path through each lattice")]
    Bestpath(BestPathArgs),
    #[command(about = "Find the lattice path with the fewest word errors against a reference")]
    Align(AlignArgs),
    #[command(about = "Compute the posterior probability of every lattice edge")]
    Posterior(PosteriorArgs),
    #[command(about = "Rewrite a lattice in another format")]
    Convert(ConvertArgs),
}

impl SubCommands {
    pub fn common_args(&self) -> &CommonArgs {
        match self {
            SubCommands::Info(args) => &args.common_args,
            SubCommands::Bestpath(args) => &args.common_args,
            SubCommands::Align(args) => &args.common_args,
            SubCommands::Posterior(args) => &args.common_args,
            SubCommands::Convert(args) => &args.common_args,
        }
    }
}

#[derive(Parser)]
#[command(name = "lattice")]
#[command(
    about = "Search, align and score speech recognition word lattices in Sphinx-III or HTK format"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: SubCommands,
}
