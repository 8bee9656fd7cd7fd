use std::fmt::{Display, Formatter};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::structs::{Lattice, NodeId};

pub mod htk;
pub use htk::{parse_htk, write_htk};

pub mod sphinx;
pub use sphinx::{parse_sphinx, write_sphinx};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// The largest frame a loaded lattice may use: almost three hours at 100
/// frames per second.
pub const MAX_FRAME: usize = 1_000_000;

/// An Error that is produced when a lattice file can't be parsed.
///
/// `line` is 1-based; a line of 0 refers to the file as a whole.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("malformed lattice at line {line}: {reason}")]
pub struct MalformedLatticeError {
    pub line: usize,
    pub reason: String,
}

impl MalformedLatticeError {
    pub fn new(line: usize, reason: impl Into<String>) -> Self {
        Self {
            line,
            reason: reason.into(),
        }
    }
}

/// Settings that the lattice files themselves don't carry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadOptions {
    /// Frames per second, used to turn HTK times into frames
    pub frame_rate: f64,
    /// The Sphinx-III log base, unless the file header names its own
    pub log_base: f64,
}

impl LoadOptions {
    pub const DEFAULT_LOG_BASE: f64 = 1.0001;
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            frame_rate: Lattice::DEFAULT_FRAME_RATE,
            log_base: Self::DEFAULT_LOG_BASE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LatticeFormat {
    /// The Sphinx-III word lattice format
    Sphinx,
    /// The HTK Standard Lattice Format (SLF)
    Htk,
}

impl LatticeFormat {
    /// Guesses the format from the first line that isn't blank or a comment:
    /// HTK lines are made of `key=value` fields.
    pub fn detect(text: &str) -> Self {
        let first = text
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty() && !line.starts_with('#'));

        match first {
            Some(line) if htk::starts_with_field(line) => LatticeFormat::Htk,
            _ => LatticeFormat::Sphinx,
        }
    }
}

impl Display for LatticeFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            LatticeFormat::Sphinx => write!(f, "sphinx"),
            LatticeFormat::Htk => write!(f, "htk"),
        }
    }
}

impl FromStr for LatticeFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sphinx" | "s3" => Ok(LatticeFormat::Sphinx),
            "htk" | "slf" => Ok(LatticeFormat::Htk),
            _ => anyhow::bail!("unknown lattice format: {s}"),
        }
    }
}

/// Reads everything from `reader`, decompressing it first if it is gzipped.
pub fn read_text(mut reader: impl Read) -> Result<String> {
    let mut bytes = vec![];
    reader.read_to_end(&mut bytes)?;

    if bytes.starts_with(&GZIP_MAGIC) {
        debug!("detected gzip input");
        let mut decompressed = vec![];
        MultiGzDecoder::new(&bytes[..])
            .read_to_end(&mut decompressed)
            .map_err(|e| {
                MalformedLatticeError::new(0, format!("gzip decompression failed: {e}"))
            })?;
        bytes = decompressed;
    }

    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Parses a lattice from text in a known format.
pub fn parse_lattice(text: &str, format: LatticeFormat, options: &LoadOptions) -> Result<Lattice> {
    let lattice = match format {
        LatticeFormat::Sphinx => parse_sphinx(text, options)?,
        LatticeFormat::Htk => parse_htk(text, options)?,
    };

    debug!(
        %format,
        nodes = lattice.node_count(),
        edges = lattice.edge_count(),
        "loaded lattice"
    );

    Ok(lattice)
}

/// Reads a plain or gzipped lattice, detecting its format when `format` is `None`.
pub fn read_lattice(
    reader: impl Read,
    format: Option<LatticeFormat>,
    options: &LoadOptions,
) -> Result<Lattice> {
    let text = read_text(reader)?;
    let format = format.unwrap_or_else(|| LatticeFormat::detect(&text));
    parse_lattice(&text, format, options)
}

/// Loads a lattice file. See [`read_lattice`].
pub fn load_lattice<P: AsRef<Path>>(
    path: P,
    format: Option<LatticeFormat>,
    options: &LoadOptions,
) -> Result<Lattice> {
    let file = File::open(&path).with_context(|| {
        format!(
            "failed to open lattice file: {}",
            path.as_ref().to_string_lossy()
        )
    })?;

    read_lattice(file, format, options).with_context(|| {
        format!(
            "failed to load lattice file: {}",
            path.as_ref().to_string_lossy()
        )
    })
}

/// Writes a lattice in the given format, gzipped when `path` ends in `.gz`.
pub fn write_lattice<P: AsRef<Path>>(
    lattice: &Lattice,
    path: P,
    format: LatticeFormat,
) -> Result<()> {
    let file = File::create(&path).with_context(|| {
        format!(
            "failed to create lattice file: {}",
            path.as_ref().to_string_lossy()
        )
    })?;

    let gzipped = path
        .as_ref()
        .extension()
        .is_some_and(|extension| extension == "gz");

    if gzipped {
        let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
        write_lattice_to(lattice, &mut encoder, format)?;
        encoder.finish()?.flush()?;
    } else {
        let mut out = BufWriter::new(file);
        write_lattice_to(lattice, &mut out, format)?;
        out.flush()?;
    }

    Ok(())
}

/// Writes a lattice in the given format to `out`.
pub fn write_lattice_to(
    lattice: &Lattice,
    out: &mut impl Write,
    format: LatticeFormat,
) -> Result<()> {
    match format {
        LatticeFormat::Sphinx => write_sphinx(lattice, out),
        LatticeFormat::Htk => write_htk(lattice, out),
    }
}

/// Parses the token at `idx`, describing it as `what` if it is missing or invalid.
pub(crate) fn parse_token<T: FromStr>(
    tokens: &[&str],
    idx: usize,
    line: usize,
    what: &str,
) -> Result<T, MalformedLatticeError> {
    let token = tokens
        .get(idx)
        .ok_or_else(|| MalformedLatticeError::new(line, format!("missing {what}")))?;

    token
        .parse::<T>()
        .map_err(|_| MalformedLatticeError::new(line, format!("invalid {what}: {token}")))
}

/// Rejects a frame past [`MAX_FRAME`].
pub(crate) fn check_frame(frame: usize, line: usize) -> Result<usize, MalformedLatticeError> {
    if frame > MAX_FRAME {
        return Err(MalformedLatticeError::new(
            line,
            format!("frame {frame} is past the last supported frame ({MAX_FRAME})"),
        ));
    }
    Ok(frame)
}

/// Rejects a declared node count that the file can't hold: each node takes a line.
pub(crate) fn check_node_count(
    count: usize,
    text: &str,
    line: usize,
) -> Result<usize, MalformedLatticeError> {
    let num_lines = text.lines().count();
    if count > num_lines {
        return Err(MalformedLatticeError::new(
            line,
            format!("node count {count} is larger than the file ({num_lines} lines)"),
        ));
    }
    Ok(count)
}

/// A node declaration from the first pass over a lattice file.
#[derive(Debug, Clone)]
pub(crate) struct NodeDecl {
    pub line: usize,
    pub symbol: String,
    pub frame: usize,
}

/// An edge from the first pass over a lattice file, by file node index.
#[derive(Debug, Clone)]
pub(crate) struct EdgeDecl {
    pub line: usize,
    pub from: usize,
    pub to: usize,
    pub score: f64,
}

/// The second pass shared by both loaders: creates the declared nodes in
/// file order, then resolves every edge against them.
///
/// A node that repeats the word and frame of an earlier node replaces it,
/// and the edges of the replaced node are dropped. Returns the lattice
/// and, for each file node index, the node that holds its word and frame
/// once loading is done, so the index of a replaced node names its
/// replacement.
pub(crate) fn resolve(
    mut lattice: Lattice,
    nodes: &[Option<NodeDecl>],
    edges: &[EdgeDecl],
) -> Result<(Lattice, Vec<Option<NodeId>>), MalformedLatticeError> {
    let mut ids: Vec<Option<NodeId>> = vec![None; nodes.len()];

    for (idx, decl) in nodes.iter().enumerate() {
        let Some(decl) = decl else {
            continue;
        };

        let id = match lattice.insert_node(decl.frame, &decl.symbol) {
            Ok(id) => id,
            Err(err) => {
                warn!(line = decl.line, "{err}; keeping the later node");
                lattice.replace_node(decl.frame, &decl.symbol)
            }
        };
        ids[idx] = Some(id);
    }

    let frame_of = |idx: usize, line: usize| -> Result<usize, MalformedLatticeError> {
        nodes
            .get(idx)
            .and_then(|decl| decl.as_ref())
            .map(|decl| decl.frame)
            .ok_or_else(|| MalformedLatticeError::new(line, format!("unknown node index: {idx}")))
    };

    for edge in edges {
        frame_of(edge.from, edge.line)?;
        let to_frame = frame_of(edge.to, edge.line)?;

        if let Some(from) = ids[edge.from] {
            lattice.add_edge(from, to_frame, edge.score);
        }
    }

    let survivors: Vec<Option<NodeId>> = nodes
        .iter()
        .map(|decl| {
            decl.as_ref()
                .and_then(|decl| lattice.node_at(decl.frame, &decl.symbol))
        })
        .collect();

    Ok((lattice, survivors))
}
