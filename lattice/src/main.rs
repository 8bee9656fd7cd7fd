mod cli;
mod commands;
mod util;

use cli::{Cli, SubCommands};
use commands::{align, bestpath, convert, info, posterior_scores};
use util::{init_logging, set_threads};

use clap::Parser;

#[cfg(feature = "jemalloc")]
#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

fn main() -> anyhow::Result<()> {
    color_backtrace::install();

    let cli = Cli::parse();
    let common_args = cli.command.common_args();
    init_logging(common_args.verbose);
    set_threads(common_args.num_threads)?;

    match &cli.command {
        SubCommands::Info(args) => info(args)?,
        SubCommands::Bestpath(args) => bestpath(args)?,
        SubCommands::Align(args) => align(args)?,
        SubCommands::Posterior(args) => posterior_scores(args)?,
        SubCommands::Convert(args) => convert(args)?,
    }
    Ok(())
}
