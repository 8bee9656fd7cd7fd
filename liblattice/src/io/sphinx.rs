use std::io::Write;

use anyhow::Result;
use lazy_static::lazy_static;
use regex::Regex;

use super::{
    check_frame, check_node_count, parse_token, resolve, EdgeDecl, LoadOptions,
    MalformedLatticeError, NodeDecl,
};
use crate::structs::{Lattice, NodeId};

lazy_static! {
    // matches header arguments like: # -logbase 1.0003
    static ref HEADER_RE: Regex = Regex::new(r"^#\s*(-\S+)\s+(\S+)").unwrap();
}

const LOG_BASE_ARG: &str = "-logbase";

enum ParserState {
    Header,
    Nodes,
    /// Between `Initial` and `Edges`, e.g. the `BestSegAscr` block
    Skipping,
    Edges,
    Done,
}

/// Parses a Sphinx-III word lattice.
///
/// Edge scores are integers in the log base named by the `-logbase`
/// header argument (or `options.log_base`), and are converted to natural log.
pub fn parse_sphinx(text: &str, options: &LoadOptions) -> Result<Lattice> {
    let mut lattice = Lattice::new(options.frame_rate);
    let mut log_base = options.log_base;

    let mut state = ParserState::Header;
    let mut nodes: Vec<Option<NodeDecl>> = vec![];
    let mut edges: Vec<EdgeDecl> = vec![];
    let mut initial: Option<(usize, usize)> = None;
    let mut last: Option<(usize, usize)> = None;
    let mut line_number = 0;

    for line in text.lines() {
        line_number += 1;
        let line = line.trim();

        if line.is_empty() {
            continue;
        }

        if line.starts_with('#') {
            if let Some(captures) = HEADER_RE.captures(line) {
                let (arg, value) = (&captures[1], &captures[2]);
                if arg == LOG_BASE_ARG {
                    log_base = value.parse::<f64>().map_err(|_| {
                        MalformedLatticeError::new(line_number, format!("invalid log base: {value}"))
                    })?;
                }
                lattice.header.insert(arg.to_string(), value.to_string());
            }
            continue;
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();

        match tokens[0] {
            "Frames" => {
                let num_frames: usize = parse_token(&tokens, 1, line_number, "frame count")?;
                lattice.ensure_frame(check_frame(num_frames, line_number)?);
            }
            "Nodes" => {
                let num_nodes: usize = parse_token(&tokens, 1, line_number, "node count")?;
                nodes = vec![None; check_node_count(num_nodes, text, line_number)?];
                state = ParserState::Nodes;
            }
            "Initial" => {
                initial = Some((parse_token(&tokens, 1, line_number, "initial node")?, line_number));
                state = ParserState::Skipping;
            }
            "Final" => {
                last = Some((parse_token(&tokens, 1, line_number, "final node")?, line_number));
            }
            "Edges" => state = ParserState::Edges,
            "End" => {
                state = ParserState::Done;
                break;
            }
            _ => match state {
                ParserState::Nodes => {
                    let idx: usize = parse_token(&tokens, 0, line_number, "node id")?;
                    let symbol: String = parse_token(&tokens, 1, line_number, "node word")?;
                    let frame: usize = parse_token(&tokens, 2, line_number, "start frame")?;
                    check_frame(frame, line_number)?;

                    let slot = nodes.get_mut(idx).ok_or_else(|| {
                        MalformedLatticeError::new(
                            line_number,
                            format!("node id {idx} is out of range"),
                        )
                    })?;

                    *slot = Some(NodeDecl {
                        line: line_number,
                        symbol,
                        frame,
                    });
                }
                ParserState::Edges => {
                    let from: usize = parse_token(&tokens, 0, line_number, "source node")?;
                    let to: usize = parse_token(&tokens, 1, line_number, "destination node")?;
                    let score: f64 = parse_token(&tokens, 2, line_number, "acoustic score")?;

                    edges.push(EdgeDecl {
                        line: line_number,
                        from,
                        to,
                        score,
                    });
                }
                ParserState::Skipping => (),
                ParserState::Header | ParserState::Done => {
                    return Err(MalformedLatticeError::new(
                        line_number,
                        format!("unexpected line: {line}"),
                    )
                    .into());
                }
            },
        }
    }

    if !matches!(state, ParserState::Done) {
        return Err(
            MalformedLatticeError::new(line_number + 1, "missing End line (truncated file)").into(),
        );
    }

    // the scores are only known once the whole header has been read
    let scale = log_base.ln();
    edges.iter_mut().for_each(|edge| edge.score *= scale);

    let (mut lattice, ids) = resolve(lattice, &nodes, &edges)?;

    let endpoint = |found: Option<(usize, usize)>, which: &str| -> Result<NodeId> {
        let (idx, line) = found.ok_or_else(|| {
            MalformedLatticeError::new(0, format!("missing {which} node declaration"))
        })?;

        ids.get(idx).copied().flatten().ok_or_else(|| {
            MalformedLatticeError::new(line, format!("unknown {which} node index: {idx}")).into()
        })
    };

    let start = endpoint(initial, "Initial")?;
    let end = endpoint(last, "Final")?;
    lattice.set_start(start);
    lattice.set_end(end);

    Ok(lattice)
}

/// Writes a lattice in the Sphinx-III format.
///
/// Scores are written in the log base of the lattice's `-logbase`
/// header argument, or the default log base when it has none.
pub fn write_sphinx(lattice: &Lattice, out: &mut impl Write) -> Result<()> {
    let start = lattice.start()?;
    let end = lattice.end()?;

    let log_base = lattice
        .header
        .get(LOG_BASE_ARG)
        .and_then(|value| value.parse::<f64>().ok())
        .unwrap_or(LoadOptions::DEFAULT_LOG_BASE);
    let scale = log_base.ln();

    // file node ids are assigned in time order
    let mut file_ids: Vec<Option<usize>> = vec![None; lattice.arena_len()];
    let nodes: Vec<NodeId> = lattice.nodes().collect();
    nodes
        .iter()
        .enumerate()
        .for_each(|(file_id, id)| file_ids[id.index()] = Some(file_id));
    let file_id = |id: NodeId| file_ids[id.index()].unwrap_or_default();

    writeln!(out, "# {LOG_BASE_ARG} {log_base}")?;
    for (arg, value) in lattice.header.iter() {
        if arg.starts_with('-') && arg != LOG_BASE_ARG {
            writeln!(out, "# {arg} {value}")?;
        }
    }
    writeln!(out, "#")?;
    writeln!(out, "Frames {}", lattice.num_frames().saturating_sub(1))?;
    writeln!(out, "#")?;

    writeln!(
        out,
        "Nodes {} (NODEID WORD STARTFRAME FIRST-ENDFRAME LAST-ENDFRAME)",
        nodes.len()
    )?;
    for &id in nodes.iter() {
        let node = &lattice[id];
        let exit_frames = node.exits.iter().map(|edge| edge.frame);
        let first_end = exit_frames.clone().min().map_or(node.entry, |f| f.saturating_sub(1));
        let last_end = exit_frames.max().map_or(node.entry, |f| f.saturating_sub(1));

        writeln!(
            out,
            "{} {} {} {} {}",
            file_id(id),
            node.symbol,
            node.entry,
            first_end,
            last_end
        )?;
    }

    writeln!(out, "#")?;
    writeln!(out, "Initial {}", file_id(start))?;
    writeln!(out, "Final {}", file_id(end))?;
    writeln!(out, "#")?;

    writeln!(out, "Edges (FROM-NODEID TO-NODEID ASCORE)")?;
    for &id in nodes.iter() {
        for (next, edge) in lattice.successors(id) {
            writeln!(
                out,
                "{} {} {}",
                file_id(id),
                file_id(next),
                (edge.acoustic_score / scale).round() as i64
            )?;
        }
    }
    writeln!(out, "End")?;

    Ok(())
}
