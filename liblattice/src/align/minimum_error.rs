use anyhow::Result;
use thiserror::Error;
use tracing::debug;

use super::structs::{AlignmentStep, Backpointer, CostMatrix, MinimumError};
use crate::search::UnreachableEndError;
use crate::structs::{Lattice, NodeId};
use crate::util::is_filler;

/// An Error that is produced when a reference
/// has no words left once fillers are removed.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("reference sequence is empty after removing fillers")]
pub struct InvalidReferenceSequenceError;

const UNREACHABLE: usize = CostMatrix::UNREACHABLE;

/// The candidate with the lowest cost; the earliest one wins ties.
fn cheapest(candidates: &[usize], cost: impl Fn(usize) -> usize) -> Option<(usize, usize)> {
    candidates
        .iter()
        .map(|&k| (k, cost(k)))
        .fold(None, |best, (k, c)| match best {
            Some((_, best_cost)) if best_cost <= c => best,
            _ => Some((k, c)),
        })
}

/// Finds the lattice path with the fewest word errors against `reference`.
///
/// See [`minimum_error_from`].
pub fn minimum_error(lattice: &mut Lattice, reference: &[&str]) -> Result<MinimumError> {
    let start = lattice.start()?;
    minimum_error_from(lattice, start, reference)
}

/// Finds the path from `start` to the lattice's end node with the fewest
/// word errors against `reference`, along with the alignment to it.
///
/// Fillers are dropped from the reference and bypassed in the lattice
/// before aligning. Sentence boundary markers are ordinary words here,
/// so a reference should carry them when the lattice paths do.
pub fn minimum_error_from(
    lattice: &mut Lattice,
    start: NodeId,
    reference: &[&str],
) -> Result<MinimumError> {
    let reference: Vec<&str> = reference
        .iter()
        .copied()
        .filter(|w| !is_filler(w))
        .collect();

    if reference.is_empty() {
        return Err(InvalidReferenceSequenceError.into());
    }

    let end = lattice.end()?;
    lattice.bypass_fillers();
    let lattice: &Lattice = lattice;

    let nodes: Vec<NodeId> = lattice.nodes().collect();
    let num_columns = lattice.arena_len();

    // the number of nodes on the shortest path from start, and the
    // non-filler nodes reachable from start with an edge into each node
    let mut distances = vec![UNREACHABLE; num_columns];
    let mut predecessors: Vec<Vec<usize>> = vec![vec![]; num_columns];

    if lattice.contains(start) {
        distances[start.0] = 1;
    }

    for &node in nodes.iter() {
        if distances[node.0] == UNREACHABLE || is_filler(&lattice[node].symbol) {
            continue;
        }

        let distance = distances[node.0] + 1;
        for (next, _) in lattice.successors(node) {
            if distance < distances[next.0] {
                distances[next.0] = distance;
            }
            if !predecessors[next.0].contains(&node.0) {
                predecessors[next.0].push(node.0);
            }
        }
    }

    if distances[end.0] == UNREACHABLE {
        return Err(UnreachableEndError {
            from: start,
            to: end,
        }
        .into());
    }

    let mut matrix = CostMatrix::new(reference.len(), num_columns);

    for (row, &word) in reference.iter().enumerate() {
        for &node in nodes.iter() {
            let column = node.0;
            let mismatch = (word != lattice[node].symbol) as usize;
            let preds = &predecessors[column];

            // a node without predecessors follows a virtual node
            // that has consumed the reference through the row before
            let (insertion_pred, insertion_cost) =
                match cheapest(preds, |k| matrix.get(row, k)) {
                    Some((k, cost)) => (Some(k), cost.saturating_add(1)),
                    None => (None, row + 2),
                };

            let deletion_cost = match row {
                0 => distances[column].saturating_add(1),
                _ => matrix.get(row - 1, column).saturating_add(1),
            };

            let (substitution_pred, substitution_cost) = match row {
                0 => match cheapest(preds, |k| distances[k]) {
                    Some((k, distance)) => (Some(k), distance.saturating_add(mismatch)),
                    None => (None, mismatch),
                },
                _ => match cheapest(preds, |k| matrix.get(row - 1, k)) {
                    Some((k, cost)) => (Some(k), cost.saturating_add(mismatch)),
                    None => (None, row + mismatch),
                },
            };

            let (cost, backpointer) =
                if substitution_cost <= insertion_cost && substitution_cost <= deletion_cost {
                    (
                        substitution_cost,
                        Backpointer::Substitution {
                            pred: substitution_pred,
                        },
                    )
                } else if insertion_cost <= deletion_cost {
                    (
                        insertion_cost,
                        Backpointer::Insertion {
                            pred: insertion_pred,
                        },
                    )
                } else {
                    (deletion_cost, Backpointer::Deletion)
                };

            matrix.set(row, column, cost);
            matrix.set_backpointer(row, column, backpointer);
        }
    }

    let last_row = reference.len() - 1;
    let errors = matrix.get(last_row, end.0);

    let symbol = |column: usize| lattice[NodeId(column)].symbol.as_str();

    // every reference word is consumed:
    // the rest of the path up to `column` is inserted
    let insert_path = |steps: &mut Vec<AlignmentStep>, mut column: usize| loop {
        steps.push(AlignmentStep::Insertion {
            lattice: symbol(column).to_string(),
        });

        let closer = predecessors[column]
            .iter()
            .copied()
            .filter(|&k| distances[k] < distances[column])
            .min_by_key(|&k| distances[k]);

        match closer {
            Some(k) => column = k,
            None => break,
        }
    };

    // the lattice path is consumed:
    // every reference word through `row` is deleted
    let delete_through = |steps: &mut Vec<AlignmentStep>, row: usize| {
        steps.extend((0..=row).rev().map(|r| AlignmentStep::Deletion {
            reference: reference[r].to_string(),
        }));
    };

    let mut steps = vec![];
    let mut row = last_row;
    let mut column = end.0;

    loop {
        match matrix.get_backpointer(row, column) {
            Backpointer::Substitution { pred } => {
                steps.push(AlignmentStep::aligned(reference[row], symbol(column)));
                match (row, pred) {
                    (0, None) => break,
                    (0, Some(k)) => {
                        insert_path(&mut steps, k);
                        break;
                    }
                    (_, None) => {
                        delete_through(&mut steps, row - 1);
                        break;
                    }
                    (_, Some(k)) => {
                        row -= 1;
                        column = k;
                    }
                }
            }
            Backpointer::Insertion { pred } => {
                steps.push(AlignmentStep::Insertion {
                    lattice: symbol(column).to_string(),
                });
                match pred {
                    Some(k) => column = k,
                    None => {
                        delete_through(&mut steps, row);
                        break;
                    }
                }
            }
            Backpointer::Deletion => {
                steps.push(AlignmentStep::Deletion {
                    reference: reference[row].to_string(),
                });
                match row {
                    0 => {
                        insert_path(&mut steps, column);
                        break;
                    }
                    _ => row -= 1,
                }
            }
        }
    }

    steps.reverse();

    debug!(errors, length = steps.len(), "aligned reference");

    Ok(MinimumError { errors, steps })
}
