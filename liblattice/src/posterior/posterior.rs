use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{backward, forward};
use crate::lm::LanguageModel;
use crate::structs::{EdgePayload, Lattice, NodeId};
use crate::util::LogSum;

/// The posterior of one edge, as reported by [`edge_posteriors`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgePosterior {
    pub node: NodeId,
    pub word: String,
    /// The frame the word starts in
    pub entry: usize,
    /// The frame the successors of the edge start in
    pub exit: usize,
    pub acoustic_score: f64,
    /// The log posterior probability of the edge
    pub posterior: f64,
}

/// Computes the log posterior probability of every edge and
/// returns the log of the total probability of the lattice.
///
/// The forward and backward passes are run only when an edge is
/// still missing its alpha or beta, so they can be run ahead of
/// time with a language model of the caller's choice.
pub fn posterior(lattice: &mut Lattice, lm: Option<&dyn LanguageModel>) -> Result<f64> {
    if lattice
        .all_edges()
        .any(|(_, edge)| edge.payload == EdgePayload::Unscored)
    {
        forward(lattice, lm)?;
    }

    if lattice
        .all_edges()
        .any(|(_, edge)| edge.payload.beta().is_none())
    {
        backward(lattice, lm)?;
    }

    let end = lattice.end()?;
    let end_entry = lattice[end].entry;

    let norm = lattice
        .predecessors()
        .of(end)
        .iter()
        .flat_map(|&v| lattice[v].exits.iter())
        .filter(|edge| edge.frame == end_entry)
        .map(|edge| edge.alpha_or_logzero())
        .log_sum();

    let nodes: Vec<NodeId> = lattice.nodes().collect();
    for id in nodes {
        if let Some(node) = lattice.get_mut(id) {
            node.exits.iter_mut().for_each(|edge| {
                let alpha = edge.alpha_or_logzero();
                let beta = edge.beta_or_logzero();
                edge.payload = EdgePayload::Posterior {
                    alpha,
                    beta,
                    posterior: alpha + beta - norm,
                };
            });
        }
    }

    debug!(norm, "computed edge posteriors");

    Ok(norm)
}

/// Lists every edge that carries a posterior, in time order.
pub fn edge_posteriors(lattice: &Lattice) -> Vec<EdgePosterior> {
    lattice
        .all_edges()
        .filter_map(|(id, edge)| {
            edge.payload.posterior().map(|posterior| EdgePosterior {
                node: id,
                word: lattice[id].symbol.clone(),
                entry: lattice[id].entry,
                exit: edge.frame,
                acoustic_score: edge.acoustic_score,
                posterior,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lm::test_lm::BigramTable;
    use assert2::{check, let_assert};
    use rand::{Rng, SeedableRng};
    use rand_pcg::Pcg64;

    const TOLERANCE: f64 = 1e-6;

    /// The total probability of the edges entering the end node.
    fn end_mass(lattice: &Lattice) -> f64 {
        let end = lattice.end().unwrap();
        let entry = lattice[end].entry;
        lattice
            .all_edges()
            .filter(|(_, edge)| edge.frame == entry)
            .map(|(_, edge)| edge.payload.posterior().unwrap().exp())
            .sum()
    }

    /// The total probability of the edges leaving the start node.
    fn start_mass(lattice: &Lattice) -> f64 {
        let start = lattice.start().unwrap();
        lattice[start]
            .exits
            .iter()
            .map(|edge| edge.payload.posterior().unwrap().exp())
            .sum()
    }

    // <s>(0) -> A(1) -> </s>(3)
    //        -> B(2) ---^
    fn diamond() -> Lattice {
        let mut lattice = Lattice::default();
        let s = lattice.insert_node(0, "<s>").unwrap();
        let a = lattice.insert_node(1, "A").unwrap();
        let b = lattice.insert_node(2, "B").unwrap();
        let e = lattice.insert_node(3, "</s>").unwrap();
        lattice.add_edge(s, 1, 0.3f64.ln());
        lattice.add_edge(s, 2, 0.1f64.ln());
        lattice.add_edge(a, 3, 0.5f64.ln());
        lattice.add_edge(b, 3, 0.5f64.ln());
        lattice.set_start(s);
        lattice.set_end(e);
        lattice
    }

    #[test]
    fn test_posterior_diamond() {
        let mut lattice = diamond();
        let_assert!(Ok(norm) = posterior(&mut lattice, None));

        check!((norm - 0.2f64.ln()).abs() < TOLERANCE);
        check!((end_mass(&lattice) - 1.0).abs() < TOLERANCE);
        check!((start_mass(&lattice) - 1.0).abs() < TOLERANCE);

        let a = lattice.node_at(1, "A").unwrap();
        let_assert!(Some(p) = lattice[a].exits[0].payload.posterior());
        check!((p.exp() - 0.75).abs() < TOLERANCE);
    }

    #[test]
    fn test_posterior_reuses_existing_passes() {
        let mut lattice = diamond();
        let lm = BigramTable::new(&[("A", "<s>", -3.0)], -0.5, 1.0);

        // the passes already ran with the language model,
        // so posterior() must not redo them without it
        let_assert!(Ok(()) = forward(&mut lattice, Some(&lm)));
        let_assert!(Ok(()) = backward(&mut lattice, Some(&lm)));
        let_assert!(Ok(with_lm) = posterior(&mut lattice, None));

        let mut plain = diamond();
        let_assert!(Ok(without_lm) = posterior(&mut plain, None));

        check!(with_lm != without_lm);
        check!((end_mass(&lattice) - 1.0).abs() < TOLERANCE);

        // and a second call gives the same answer
        let_assert!(Ok(again) = posterior(&mut lattice, None));
        check!(again == with_lm);
    }

    #[test]
    fn test_posterior_bypasses_fillers() {
        // <s>(0) -> <sil>(1) -> </s>(3)
        //        -> A(2) -----^
        let mut lattice = Lattice::default();
        let s = lattice.insert_node(0, "<s>").unwrap();
        let sil = lattice.insert_node(1, "<sil>").unwrap();
        let a = lattice.insert_node(2, "A").unwrap();
        let e = lattice.insert_node(3, "</s>").unwrap();
        lattice.add_edge(s, 1, 0.5f64.ln());
        lattice.add_edge(s, 2, 0.5f64.ln());
        lattice.add_edge(sil, 3, 0.5f64.ln());
        lattice.add_edge(a, 3, 0.5f64.ln());
        lattice.set_start(s);
        lattice.set_end(e);

        let_assert!(Ok(norm) = posterior(&mut lattice, None));
        // 0.25 through <sil>, 0.25 through A, and 1.0 on the bypass edge
        check!((norm - 1.5f64.ln()).abs() < TOLERANCE);
        check!(lattice[s].exits.len() == 3);
        check!((end_mass(&lattice) - 1.0).abs() < TOLERANCE);
        check!((start_mass(&lattice) - 1.0).abs() < TOLERANCE);
    }

    #[test]
    fn test_posterior_zero_duration_link() {
        // a's edge into frame 1 reaches b and a itself,
        // and b is inserted before a
        let mut lattice = Lattice::default();
        let s = lattice.insert_node(0, "<s>").unwrap();
        let b = lattice.insert_node(1, "b").unwrap();
        let a = lattice.insert_node(1, "a").unwrap();
        let e = lattice.insert_node(2, "</s>").unwrap();
        lattice.add_edge(s, 1, 0.0);
        lattice.add_edge(a, 1, 0.5f64.ln());
        lattice.add_edge(b, 2, 0.0);
        lattice.set_start(s);
        lattice.set_end(e);

        // <s> b </s> scores 1.0 and <s> a b </s> scores 0.5
        let_assert!(Ok(norm) = posterior(&mut lattice, None));
        check!((norm - 1.5f64.ln()).abs() < TOLERANCE);

        let_assert!(Some(p) = lattice[a].exits[0].payload.posterior());
        check!((p.exp() - 1.0 / 3.0).abs() < TOLERANCE);
        let_assert!(Some(p) = lattice[b].exits[0].payload.posterior());
        check!((p.exp() - 1.0).abs() < TOLERANCE);
        check!((end_mass(&lattice) - 1.0).abs() < TOLERANCE);
    }

    #[test]
    fn test_edge_posteriors() {
        let mut lattice = diamond();
        check!(edge_posteriors(&lattice).is_empty());

        let_assert!(Ok(_) = posterior(&mut lattice, None));
        let posteriors = edge_posteriors(&lattice);
        check!(posteriors.len() == 4);
        check!(posteriors[0].word == "<s>");
        check!(posteriors[0].exit == 1);
        check!(posteriors[3].word == "B");
    }

    /// A lattice over `num_frames` frames with `<s>` alone in frame 0 and
    /// `</s>` alone in the last frame. Every frame has a node with an edge
    /// into it, and `<s>` always has an edge straight to `</s>`.
    fn random_lattice(rng: &mut Pcg64, num_frames: usize) -> Lattice {
        let vocabulary = ["a", "b", "c"];
        let last = num_frames - 1;

        let mut lattice = Lattice::default();
        let s = lattice.insert_node(0, "<s>").unwrap();
        lattice.set_start(s);

        for frame in 1..last {
            let num_words = rng.gen_range(1..=3);
            for word in vocabulary.iter().take(num_words) {
                lattice.insert_node(frame, word).unwrap();
            }
        }
        let e = lattice.insert_node(last, "</s>").unwrap();
        lattice.set_end(e);

        lattice.add_edge(s, last, rng.gen_range(-8.0..-0.1));
        for frame in 1..=last {
            let from_frame = rng.gen_range(0..frame);
            let from: Vec<NodeId> = lattice.nodes_at(from_frame).collect();
            let from = from[rng.gen_range(0..from.len())];
            lattice.add_edge(from, frame, rng.gen_range(-8.0..-0.1));
        }

        let nodes: Vec<NodeId> = lattice.nodes().collect();
        for id in nodes {
            let entry = lattice[id].entry;
            for frame in (entry + 1)..=last {
                if rng.gen_bool(0.3) {
                    lattice.add_edge(id, frame, rng.gen_range(-8.0..-0.1));
                }
            }
        }

        lattice
    }

    #[test]
    fn test_posterior_normalizes_random_lattices() {
        let mut rng = Pcg64::seed_from_u64(42);

        for _ in 0..50 {
            let num_frames = rng.gen_range(3..12);
            let mut lattice = random_lattice(&mut rng, num_frames);

            let_assert!(Ok(norm) = posterior(&mut lattice, None));
            check!(norm.is_finite());
            check!((end_mass(&lattice) - 1.0).abs() < TOLERANCE);
            check!((start_mass(&lattice) - 1.0).abs() < TOLERANCE);
        }
    }

    #[test]
    fn test_posterior_normalizes_with_language_model() {
        let mut rng = Pcg64::seed_from_u64(7);
        let lm = BigramTable::new(&[("a", "<s>", -0.2), ("</s>", "b", -0.1)], -2.0, 3.0);

        for _ in 0..20 {
            let num_frames = rng.gen_range(3..10);
            let mut lattice = random_lattice(&mut rng, num_frames);

            let_assert!(Ok(_) = posterior(&mut lattice, Some(&lm)));
            check!((end_mass(&lattice) - 1.0).abs() < TOLERANCE);
        }
    }
}
