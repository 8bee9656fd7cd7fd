use std::cmp::Ordering;
use std::collections::BinaryHeap;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::lm::LanguageModel;
use crate::structs::{Lattice, NodeId};

/// An Error that is produced when a search exhausts
/// every path without reaching its target node.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("no path from node {from} to node {to}")]
pub struct UnreachableEndError {
    pub from: NodeId,
    pub to: NodeId,
}

/// The highest scoring path found by [`best_path`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestPath {
    /// The total log domain score of the path
    pub score: f64,
    /// The nodes on the path, from the start node to the end node
    pub nodes: Vec<NodeId>,
}

impl BestPath {
    pub fn words<'a>(&self, lattice: &'a Lattice) -> Vec<&'a str> {
        self.nodes
            .iter()
            .map(|&id| lattice[id].symbol.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    score: f64,
    node: NodeId,
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

/// Builds `[next, node, prev(node), ...]`, at most `order` words long.
fn history<'a>(
    lattice: &'a Lattice,
    backpointers: &[Option<NodeId>],
    next: NodeId,
    node: NodeId,
    order: usize,
) -> Vec<&'a str> {
    let mut words = vec![lattice[next].symbol.as_str(), lattice[node].symbol.as_str()];
    let mut prev = backpointers[node.0];

    while words.len() < order {
        match prev {
            Some(id) => {
                words.push(lattice[id].symbol.as_str());
                prev = backpointers[id.0];
            }
            None => break,
        }
    }

    words
}

/// Finds the highest scoring path from the lattice's start node to its end node.
///
/// See [`best_path_between`].
pub fn best_path(lattice: &Lattice, lm: Option<&dyn LanguageModel>) -> Result<BestPath> {
    best_path_between(lattice, lattice.start()?, lattice.end()?, lm)
}

/// Finds the highest scoring path from `start` to `end` with Dijkstra's algorithm.
///
/// An edge scores its acoustic score, plus the language model score of the
/// successor word given the words behind it on the current best path.
/// Scores are log probabilities, so a path never gains score by growing.
///
/// When two paths reach a node with the same score, the one relaxed
/// first is kept. Which one that is depends on heap order and isn't
/// something callers should rely on.
pub fn best_path_between(
    lattice: &Lattice,
    start: NodeId,
    end: NodeId,
    lm: Option<&dyn LanguageModel>,
) -> Result<BestPath> {
    let num_slots = lattice.arena_len();
    let mut scores = vec![f64::NEG_INFINITY; num_slots];
    let mut backpointers: Vec<Option<NodeId>> = vec![None; num_slots];
    let mut finished = vec![false; num_slots];
    let mut heap = BinaryHeap::new();

    if lattice.contains(start) {
        scores[start.0] = 0.0;
        heap.push(Candidate {
            score: 0.0,
            node: start,
        });
    }

    while let Some(Candidate { score, node }) = heap.pop() {
        // stale heap entry
        if finished[node.0] || score < scores[node.0] {
            continue;
        }
        finished[node.0] = true;

        if node == end {
            let mut nodes = vec![end];
            let mut prev = backpointers[end.0];
            while let Some(id) = prev {
                nodes.push(id);
                prev = backpointers[id.0];
            }
            nodes.reverse();

            debug!(score, length = nodes.len(), "found best path");
            return Ok(BestPath { score, nodes });
        }

        for (next, edge) in lattice.successors(node) {
            if finished[next.0] {
                continue;
            }

            let mut candidate_score = score + edge.acoustic_score;
            if let Some(lm) = lm {
                let words = history(lattice, &backpointers, next, node, lm.order());
                candidate_score += lm.score(&words).log_prob;
            }

            if candidate_score > scores[next.0] {
                scores[next.0] = candidate_score;
                backpointers[next.0] = Some(node);
                heap.push(Candidate {
                    score: candidate_score,
                    node: next,
                });
            }
        }
    }

    Err(UnreachableEndError {
        from: start,
        to: end,
    }
    .into())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::lm::test_lm::BigramTable;
    use crate::lm::LmScore;
    use assert2::{assert, check, let_assert};

    // <s>(0) -> A(1) -> </s>(3)
    //        -> B(2) ---^
    fn diamond() -> Lattice {
        let mut lattice = Lattice::default();
        let s = lattice.insert_node(0, "<s>").unwrap();
        let a = lattice.insert_node(1, "A").unwrap();
        let b = lattice.insert_node(2, "B").unwrap();
        let e = lattice.insert_node(3, "</s>").unwrap();
        lattice.add_edge(s, 1, -1.0);
        lattice.add_edge(s, 2, -3.0);
        lattice.add_edge(a, 3, -1.0);
        lattice.add_edge(b, 3, -1.0);
        lattice.set_start(s);
        lattice.set_end(e);
        lattice
    }

    #[test]
    fn test_best_path_diamond() {
        let lattice = diamond();
        let_assert!(Ok(path) = best_path(&lattice, None));

        check!(path.words(&lattice) == vec!["<s>", "A", "</s>"]);
        check!(path.score == -2.0);

        // the search doesn't depend on anything but the lattice
        let_assert!(Ok(again) = best_path(&lattice, None));
        check!(again == path);
    }

    #[test]
    fn test_best_path_cat_dog() {
        let mut lattice = Lattice::default();
        let s = lattice.insert_node(0, "<s>").unwrap();
        let cat = lattice.insert_node(1, "cat").unwrap();
        let dog = lattice.insert_node(1, "dog").unwrap();
        let e = lattice.insert_node(2, "</s>").unwrap();
        lattice.add_edge(s, 1, -1.0);
        lattice.add_edge(cat, 2, -2.0);
        lattice.add_edge(dog, 2, -5.0);
        lattice.set_start(s);
        lattice.set_end(e);

        let_assert!(Ok(path) = best_path(&lattice, None));
        check!(path.score == -3.0);
        check!(path.nodes == vec![s, cat, e]);
    }

    #[test]
    fn test_best_path_language_model() {
        let lattice = diamond();
        let lm = BigramTable::new(
            &[
                ("A", "<s>", -1.0),
                ("B", "<s>", -1.0),
                ("</s>", "A", -5.0),
                ("</s>", "B", -0.5),
            ],
            -10.0,
            1.0,
        );

        let_assert!(Ok(path) = best_path(&lattice, Some(&lm)));
        check!(path.words(&lattice) == vec!["<s>", "B", "</s>"]);
        check!(path.score == -5.5);
    }

    struct RecordingLm {
        queries: Mutex<Vec<Vec<String>>>,
    }

    impl LanguageModel for RecordingLm {
        fn score(&self, words: &[&str]) -> LmScore {
            self.queries
                .lock()
                .unwrap()
                .push(words.iter().map(|w| w.to_string()).collect());
            LmScore {
                log_prob: 0.0,
                n_used: words.len(),
            }
        }

        fn prob(&self, _: &[&str]) -> f64 {
            0.0
        }

        fn order(&self) -> usize {
            3
        }
    }

    #[test]
    fn test_best_path_history_follows_backpointers() {
        let mut lattice = Lattice::default();
        let s = lattice.insert_node(0, "<s>").unwrap();
        let a = lattice.insert_node(1, "a").unwrap();
        let b = lattice.insert_node(2, "b").unwrap();
        let e = lattice.insert_node(3, "</s>").unwrap();
        lattice.add_edge(s, 1, -1.0);
        lattice.add_edge(a, 2, -1.0);
        lattice.add_edge(b, 3, -1.0);
        lattice.set_start(s);
        lattice.set_end(e);

        let lm = RecordingLm {
            queries: Mutex::new(vec![]),
        };
        assert!(best_path(&lattice, Some(&lm)).is_ok());

        let queries = lm.queries.into_inner().unwrap();
        check!(queries[0] == vec!["a", "<s>"]);
        check!(queries[1] == vec!["b", "a", "<s>"]);
        check!(queries[2] == vec!["</s>", "b", "a"]);
    }

    #[test]
    fn test_best_path_unreachable_end() {
        let mut lattice = Lattice::default();
        let s = lattice.insert_node(0, "<s>").unwrap();
        let a = lattice.insert_node(1, "a").unwrap();
        let e = lattice.insert_node(2, "</s>").unwrap();
        lattice.add_edge(s, 1, -1.0);
        lattice.set_start(s);
        lattice.set_end(e);

        let_assert!(Err(err) = best_path(&lattice, None));
        let_assert!(Some(unreachable) = err.downcast_ref::<UnreachableEndError>());
        check!(unreachable.from == s);
        check!(unreachable.to == e);

        let_assert!(Ok(partial) = best_path_between(&lattice, s, a, None));
        check!(partial.nodes == vec![s, a]);
    }
}
