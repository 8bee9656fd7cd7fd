use std::io::Write;
use std::str::FromStr;

use anyhow::Result;
use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::warn;

use super::{
    check_node_count, resolve, EdgeDecl, LoadOptions, MalformedLatticeError, NodeDecl, MAX_FRAME,
};
use crate::structs::{Lattice, NodeId};
use crate::util::{SENTENCE_END_MARKERS, SENTENCE_START_MARKERS};

lazy_static! {
    // key=value or key="quoted \"value\""
    static ref FIELD_RE: Regex = Regex::new(r#"(\S+)=(?:"((?:[^\\"]+|\\.)*)"|(\S+))"#).unwrap();
    static ref ESCAPE_RE: Regex = Regex::new(r"\\(.)").unwrap();
}

/// Header keys that the writer produces itself.
const RESERVED_KEYS: [&str; 5] = ["VERSION", "start", "end", "N", "L"];

/// Returns true if `line` begins with a `key=value` field.
pub(crate) fn starts_with_field(line: &str) -> bool {
    FIELD_RE.find(line).is_some_and(|m| m.start() == 0)
}

fn parse_fields(line: &str) -> IndexMap<String, String> {
    FIELD_RE
        .captures_iter(line)
        .map(|captures| {
            let value = match (captures.get(2), captures.get(3)) {
                (Some(quoted), _) => ESCAPE_RE.replace_all(quoted.as_str(), "$1").into_owned(),
                (None, Some(plain)) => plain.as_str().to_string(),
                // the empty string in quotes
                (None, None) => String::new(),
            };
            (captures[1].to_string(), value)
        })
        .collect()
}

fn quote(value: &str) -> String {
    if !value.is_empty()
        && !value
            .chars()
            .any(|c| c.is_whitespace() || c == '"' || c == '\\')
    {
        return value.to_string();
    }

    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

fn field<T: FromStr>(
    fields: &IndexMap<String, String>,
    key: &str,
    line: usize,
    what: &str,
) -> Result<T, MalformedLatticeError> {
    let value = fields
        .get(key)
        .ok_or_else(|| MalformedLatticeError::new(line, format!("missing {what} ({key}=)")))?;

    value
        .parse::<T>()
        .map_err(|_| MalformedLatticeError::new(line, format!("invalid {what}: {value}")))
}

/// Parses an HTK Standard Lattice Format (SLF) file.
///
/// Link scores are already natural log. Node times are converted to
/// frames with the frame rate in `options`, rounding to the nearest frame.
pub fn parse_htk(text: &str, options: &LoadOptions) -> Result<Lattice> {
    let mut lattice = Lattice::new(options.frame_rate);

    let mut nodes: Option<Vec<Option<NodeDecl>>> = None;
    let mut edges: Vec<EdgeDecl> = vec![];
    let mut num_links = 0;
    let mut line_number = 0;

    for line in text.lines() {
        line_number += 1;
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let fields = parse_fields(line);
        if fields.is_empty() {
            return Err(
                MalformedLatticeError::new(line_number, format!("expected fields: {line}")).into(),
            );
        }

        if fields.contains_key("N") {
            let num_nodes: usize = field(&fields, "N", line_number, "node count")?;
            num_links = field(&fields, "L", line_number, "link count")?;
            nodes = Some(vec![None; check_node_count(num_nodes, text, line_number)?]);
            continue;
        }

        let Some(nodes) = nodes.as_mut() else {
            lattice.header.extend(fields);
            continue;
        };

        if fields.contains_key("I") {
            let idx: usize = field(&fields, "I", line_number, "node index")?;
            let time: f64 = field(&fields, "t", line_number, "time")?;
            let symbol: String = field(&fields, "W", line_number, "word")?;

            if !time.is_finite() || time < 0.0 {
                return Err(
                    MalformedLatticeError::new(line_number, format!("invalid time: {time}")).into(),
                );
            }

            let frame = (time * options.frame_rate).round();
            if !(0.0..=MAX_FRAME as f64).contains(&frame) {
                return Err(MalformedLatticeError::new(
                    line_number,
                    format!("time {time} is past the last supported frame ({MAX_FRAME})"),
                )
                .into());
            }

            let slot = nodes.get_mut(idx).ok_or_else(|| {
                MalformedLatticeError::new(line_number, format!("node index {idx} is out of range"))
            })?;

            *slot = Some(NodeDecl {
                line: line_number,
                symbol,
                frame: frame as usize,
            });
        } else if fields.contains_key("J") {
            edges.push(EdgeDecl {
                line: line_number,
                from: field(&fields, "S", line_number, "link start")?,
                to: field(&fields, "E", line_number, "link end")?,
                score: field(&fields, "a", line_number, "acoustic score")?,
            });
        } else {
            return Err(MalformedLatticeError::new(
                line_number,
                format!("expected a node (I=) or a link (J=): {line}"),
            )
            .into());
        }
    }

    let Some(nodes) = nodes else {
        return Err(MalformedLatticeError::new(
            line_number + 1,
            "missing node and link counts (N=, L=)",
        )
        .into());
    };

    if edges.len() < num_links {
        return Err(MalformedLatticeError::new(
            line_number + 1,
            format!(
                "expected {num_links} links, found {} (truncated file)",
                edges.len()
            ),
        )
        .into());
    } else if edges.len() > num_links {
        warn!(expected = num_links, found = edges.len(), "extra links in lattice");
    }

    let (mut lattice, ids) = resolve(lattice, &nodes, &edges)?;

    let start = find_endpoint(&lattice, &ids, "start")?;
    let end = find_endpoint(&lattice, &ids, "end")?;
    lattice.set_start(start);
    lattice.set_end(end);

    Ok(lattice)
}

/// Finds the start or end node, trying in order: the `start=`/`end=`
/// header field, the sentence boundary marker (earliest start, latest
/// end), and the only node without incoming (or outgoing) links.
fn find_endpoint(
    lattice: &Lattice,
    ids: &[Option<NodeId>],
    which: &str,
) -> Result<NodeId, MalformedLatticeError> {
    let is_start = which == "start";

    if let Some(value) = lattice.header.get(which) {
        return value
            .parse::<usize>()
            .ok()
            .and_then(|idx| ids.get(idx).copied().flatten())
            .filter(|&id| lattice.contains(id))
            .ok_or_else(|| MalformedLatticeError::new(0, format!("invalid {which} node: {value}")));
    }

    let markers = if is_start {
        &SENTENCE_START_MARKERS
    } else {
        &SENTENCE_END_MARKERS
    };

    let marked = lattice
        .nodes()
        .filter(|&id| markers.contains(lattice[id].symbol.as_str()));

    let found = if is_start {
        marked.min_by_key(|&id| lattice[id].entry)
    } else {
        marked.max_by_key(|&id| lattice[id].entry)
    };

    if let Some(id) = found {
        return Ok(id);
    }

    let candidates: Vec<NodeId> = if is_start {
        let predecessors = lattice.predecessors();
        lattice
            .nodes()
            .filter(|&id| !predecessors.has_any(id))
            .collect()
    } else {
        lattice
            .nodes()
            .filter(|&id| lattice.successors(id).next().is_none())
            .collect()
    };

    match candidates[..] {
        [id] => Ok(id),
        _ => Err(MalformedLatticeError::new(
            0,
            format!(
                "can't determine the {which} node ({} candidates)",
                candidates.len()
            ),
        )),
    }
}

/// Writes a lattice in the HTK Standard Lattice Format.
///
/// Sphinx-III header arguments (keys starting with `-`) are not written.
pub fn write_htk(lattice: &Lattice, out: &mut impl Write) -> Result<()> {
    let start = lattice.start()?;
    let end = lattice.end()?;

    let mut file_ids: Vec<Option<usize>> = vec![None; lattice.arena_len()];
    let nodes: Vec<NodeId> = lattice.nodes().collect();
    nodes
        .iter()
        .enumerate()
        .for_each(|(file_id, id)| file_ids[id.index()] = Some(file_id));
    let file_id = |id: NodeId| file_ids[id.index()].unwrap_or_default();

    let links: Vec<(usize, usize, f64)> = nodes
        .iter()
        .flat_map(move |&id| {
            lattice
                .successors(id)
                .map(move |(next, edge)| (file_id(id), file_id(next), edge.acoustic_score))
        })
        .collect();

    let version = lattice
        .header
        .get("VERSION")
        .map_or("1.0", String::as_str);
    writeln!(out, "VERSION={}", quote(version))?;

    for (key, value) in lattice.header.iter() {
        if key.starts_with('-') || RESERVED_KEYS.contains(&key.as_str()) {
            continue;
        }
        writeln!(out, "{key}={}", quote(value))?;
    }

    writeln!(out, "start={} end={}", file_id(start), file_id(end))?;
    writeln!(out, "N={} L={}", nodes.len(), links.len())?;

    for &id in nodes.iter() {
        let node = &lattice[id];
        writeln!(
            out,
            "I={} t={} W={}",
            file_id(id),
            node.entry as f64 / lattice.frame_rate,
            quote(&node.symbol)
        )?;
    }

    for (idx, (from, to, score)) in links.iter().enumerate() {
        writeln!(out, "J={idx} S={from} E={to} a={score}")?;
    }

    Ok(())
}
