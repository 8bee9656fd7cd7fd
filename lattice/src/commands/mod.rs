mod align;
pub use align::*;

mod bestpath;
pub use bestpath::*;

mod convert;
pub use convert::*;

mod info;
pub use info::*;

mod posterior;
pub use posterior::*;

use std::io::{stdout, Write};
use std::path::{Path, PathBuf};

use anyhow::Result;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use serde::Serialize;

use liblattice::{load_lattice, Lattice};

use crate::cli::CommonArgs;

/// Loads a lattice with the format and load options given on the command line.
pub fn load(path: &Path, args: &CommonArgs) -> Result<Lattice> {
    load_lattice(path, args.format.lattice_format(), &args.load_options())
}

/// A per-lattice result that can be printed as text or as a JSON line.
pub trait Report: Serialize + Send {
    fn write_text(&self, out: &mut impl Write) -> Result<()>;
}

/// Runs `task` on every lattice in parallel, then prints
/// the reports to stdout in the order the paths were given.
pub fn run_each<R, F>(paths: &[PathBuf], args: &CommonArgs, task: F) -> Result<()>
where
    R: Report,
    F: Fn(&Path) -> Result<R> + Sync + Send,
{
    let reports = paths
        .par_iter()
        .map(|path| task(path))
        .collect::<Result<Vec<R>>>()?;

    let mut out = stdout().lock();
    for report in reports.iter() {
        if args.json {
            serde_json::to_writer(&mut out, report)?;
            writeln!(out)?;
        } else {
            report.write_text(&mut out)?;
        }
    }
    out.flush()?;

    Ok(())
}
