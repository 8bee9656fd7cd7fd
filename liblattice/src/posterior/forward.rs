use anyhow::Result;
use tracing::debug;

use crate::lm::LanguageModel;
use crate::structs::{EdgePayload, Lattice, NodeId};
use crate::util::LogSum;

/// Computes the forward score (alpha) of every edge.
///
/// Fillers are bypassed and nodes that can't reach the end node are
/// pruned first, and every existing payload is discarded. Nodes are
/// scored in [`Lattice::topological_order`], so a node's edges into its
/// own entry frame never feed its own alpha. The alpha of an edge leaving `w`
/// sums, over every path into `w`, the path's score plus the edge's
/// acoustic score scaled by the language weight. With a language model,
/// each step from `v` into `w` also scores the unweighted `P(w | v)`.
pub fn forward(lattice: &mut Lattice, lm: Option<&dyn LanguageModel>) -> Result<()> {
    lattice.bypass_fillers();
    lattice.remove_unreachable()?;
    lattice.reset_edge_scores();

    let predecessors = lattice.predecessors();
    let weight = lm.map_or(1.0, |lm| lm.language_weight());
    let nodes = lattice.topological_order(&predecessors);

    for w in nodes {
        let node = &lattice[w];
        let preds: Vec<NodeId> = predecessors
            .of(w)
            .iter()
            .copied()
            .filter(|&v| v != w)
            .collect();

        // a node with no predecessors starts with a probability of one
        let incoming = if preds.is_empty() {
            0.0
        } else {
            preds
                .iter()
                .map(|&v| {
                    let language_score = lm.map_or(0.0, |lm| {
                        lm.prob(&[node.symbol.as_str(), lattice[v].symbol.as_str()])
                    });

                    lattice[v]
                        .exits
                        .iter()
                        .filter(|edge| edge.frame == node.entry)
                        .map(|edge| edge.alpha_or_logzero() + language_score)
                        .log_sum()
                })
                .log_sum()
        };

        let alphas: Vec<f64> = node
            .exits
            .iter()
            .map(|edge| incoming + edge.acoustic_score / weight)
            .collect();

        if let Some(node) = lattice.get_mut(w) {
            node.exits
                .iter_mut()
                .zip(alphas)
                .for_each(|(edge, alpha)| edge.payload = EdgePayload::Forward { alpha });
        }
    }

    debug!(edges = lattice.edge_count(), "computed forward scores");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lm::test_lm::BigramTable;
    use assert2::{check, let_assert};

    #[test]
    fn test_forward_chain() {
        let mut lattice = Lattice::default();
        let s = lattice.insert_node(0, "<s>").unwrap();
        let a = lattice.insert_node(1, "a").unwrap();
        let e = lattice.insert_node(2, "</s>").unwrap();
        lattice.add_edge(s, 1, -1.0);
        lattice.add_edge(a, 2, -2.0);
        lattice.set_start(s);
        lattice.set_end(e);

        let_assert!(Ok(()) = forward(&mut lattice, None));
        check!(lattice[s].exits[0].payload == EdgePayload::Forward { alpha: -1.0 });
        check!(lattice[a].exits[0].payload == EdgePayload::Forward { alpha: -3.0 });
    }

    #[test]
    fn test_forward_sums_paths() {
        // two edges from <s> into frame 1, both reaching a
        let mut lattice = Lattice::default();
        let s = lattice.insert_node(0, "<s>").unwrap();
        let a = lattice.insert_node(1, "a").unwrap();
        let e = lattice.insert_node(2, "</s>").unwrap();
        lattice.add_edge(s, 1, 0.5f64.ln());
        lattice.add_edge(s, 1, 0.25f64.ln());
        lattice.add_edge(a, 2, 0.5f64.ln());
        lattice.set_start(s);
        lattice.set_end(e);

        let_assert!(Ok(()) = forward(&mut lattice, None));
        let_assert!(Some(alpha) = lattice[a].exits[0].payload.alpha());
        check!((alpha - (0.75f64 * 0.5).ln()).abs() < 1e-12);
    }

    #[test]
    fn test_forward_language_model() {
        let mut lattice = Lattice::default();
        let s = lattice.insert_node(0, "<s>").unwrap();
        let a = lattice.insert_node(1, "a").unwrap();
        let e = lattice.insert_node(2, "</s>").unwrap();
        lattice.add_edge(s, 1, -1.0);
        lattice.add_edge(a, 2, -2.0);
        lattice.set_start(s);
        lattice.set_end(e);

        let lm = BigramTable::new(&[("a", "<s>", -0.5)], -3.0, 2.0);
        let_assert!(Ok(()) = forward(&mut lattice, Some(&lm)));

        // acoustic scores are divided by the weight,
        // language scores are unweighted
        let_assert!(Some(alpha) = lattice[a].exits[0].payload.alpha());
        check!(alpha == -0.5 + -0.5 + -1.0);
    }

    #[test]
    fn test_forward_bypasses_fillers() {
        let mut lattice = Lattice::default();
        let s = lattice.insert_node(0, "<s>").unwrap();
        let sil = lattice.insert_node(1, "<sil>").unwrap();
        let e = lattice.insert_node(2, "</s>").unwrap();
        lattice.add_edge(s, 1, -1.0);
        lattice.add_edge(sil, 2, -2.0);
        lattice.set_start(s);
        lattice.set_end(e);

        let_assert!(Ok(()) = forward(&mut lattice, None));
        check!(lattice[s].exits.len() == 2);
        let_assert!(Some(bypass) = lattice[s].exits.iter().find(|edge| edge.frame == 2));
        check!(bypass.payload == EdgePayload::Forward { alpha: 0.0 });
    }

    #[test]
    fn test_forward_prunes_unreachable() {
        let mut lattice = Lattice::default();
        let s = lattice.insert_node(0, "<s>").unwrap();
        let dead = lattice.insert_node(1, "dead").unwrap();
        let e = lattice.insert_node(2, "</s>").unwrap();
        lattice.add_edge(s, 2, -1.0);
        lattice.add_edge(s, 1, -1.0);
        lattice.set_start(s);
        lattice.set_end(e);

        let_assert!(Ok(()) = forward(&mut lattice, None));
        check!(!lattice.contains(dead));
        check!(lattice.edge_count() == 1);
    }
}
