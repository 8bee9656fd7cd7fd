use anyhow::Result;
use thiserror::Error;
use tracing::debug;

use crate::lm::LanguageModel;
use crate::structs::{EdgePayload, Lattice, NodeId};
use crate::util::{log_add, LogSum, LOGZERO};

/// An Error that is produced when the backward pass
/// finds an edge that the forward pass never scored.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("edge from node {node} to frame {frame} has no forward score")]
pub struct UnscoredEdgeError {
    pub node: NodeId,
    pub frame: usize,
}

/// Computes the backward score (beta) of every edge.
///
/// Requires the alphas of [`forward`](super::forward). The beta of an edge
/// from `v` into `w` sums the scores of every path from `w` to the end node;
/// it is zero for edges into the end node itself. Like the forward pass,
/// an edge from `w` into its own entry frame adds nothing to `w` itself.
pub fn backward(lattice: &mut Lattice, lm: Option<&dyn LanguageModel>) -> Result<()> {
    let end = lattice.end()?;

    if let Some((node, edge)) = lattice
        .all_edges()
        .find(|(_, edge)| edge.payload == EdgePayload::Unscored)
    {
        return Err(UnscoredEdgeError {
            node,
            frame: edge.frame,
        }
        .into());
    }

    let nodes: Vec<NodeId> = lattice.nodes().collect();
    for &id in nodes.iter() {
        if let Some(node) = lattice.get_mut(id) {
            node.exits
                .iter_mut()
                .for_each(|edge| edge.payload = edge.payload.with_beta(LOGZERO));
        }
    }

    let predecessors = lattice.predecessors();
    let weight = lm.map_or(1.0, |lm| lm.language_weight());
    let order = lattice.topological_order(&predecessors);

    for &w in order.iter().rev() {
        let node = &lattice[w];
        let entry = node.entry;

        let betas: Vec<(NodeId, f64)> = predecessors
            .of(w)
            .iter()
            .filter(|&&v| v != w)
            .map(|&v| {
                if w == end {
                    return (v, 0.0);
                }

                let language_score = lm.map_or(0.0, |lm| {
                    lm.prob(&[node.symbol.as_str(), lattice[v].symbol.as_str()])
                });

                let beta = node
                    .exits
                    .iter()
                    .map(|edge| {
                        edge.beta_or_logzero() + language_score + edge.acoustic_score / weight
                    })
                    .log_sum();

                (v, beta)
            })
            .collect();

        for (v, beta) in betas {
            if let Some(pred) = lattice.get_mut(v) {
                pred.exits
                    .iter_mut()
                    .filter(|edge| edge.frame == entry)
                    .for_each(|edge| {
                        edge.payload = edge
                            .payload
                            .with_beta(log_add(edge.beta_or_logzero(), beta))
                    });
            }
        }
    }

    debug!(edges = lattice.edge_count(), "computed backward scores");

    Ok(())
}
