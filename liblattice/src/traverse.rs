use std::borrow::Cow;
use std::collections::VecDeque;

use tracing::debug;

use crate::structs::{Lattice, MissingEndpointError, NodeId};
use crate::util::is_filler;

/// The set of nodes with an edge into each node, keyed by arena index.
#[derive(Debug, Clone, Default)]
pub struct Predecessors {
    lists: Vec<Vec<NodeId>>,
}

impl Predecessors {
    /// The nodes with an edge into `id`, in time order.
    pub fn of(&self, id: NodeId) -> &[NodeId] {
        self.lists.get(id.0).map(|l| l.as_slice()).unwrap_or(&[])
    }

    pub fn has_any(&self, id: NodeId) -> bool {
        !self.of(id).is_empty()
    }
}

#[derive(Clone, Copy)]
enum Order {
    DepthFirst,
    BreadthFirst,
}

/// A lazy traversal over the nodes reachable from a root.
///
/// Every reachable node is produced exactly once. The traversal
/// walks successor edges, or predecessor links when it was built
/// by [`Lattice::reverse_breadth`].
pub struct Traversal<'a> {
    lattice: &'a Lattice,
    predecessors: Option<Cow<'a, Predecessors>>,
    agenda: VecDeque<NodeId>,
    seen: Vec<bool>,
    order: Order,
}

impl<'a> Traversal<'a> {
    fn new(
        lattice: &'a Lattice,
        root: NodeId,
        order: Order,
        predecessors: Option<Cow<'a, Predecessors>>,
    ) -> Self {
        let mut seen = vec![false; lattice.arena_len()];
        let mut agenda = VecDeque::new();

        if lattice.contains(root) {
            seen[root.0] = true;
            agenda.push_back(root);
        }

        Self {
            lattice,
            predecessors,
            agenda,
            seen,
            order,
        }
    }

    fn visit(&mut self, id: NodeId) {
        if !self.seen[id.0] {
            self.seen[id.0] = true;
            self.agenda.push_back(id);
        }
    }
}

impl Iterator for Traversal<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = match self.order {
            Order::DepthFirst => self.agenda.pop_back()?,
            Order::BreadthFirst => self.agenda.pop_front()?,
        };

        let neighbors: Vec<NodeId> = match self.predecessors {
            Some(ref predecessors) => predecessors.of(current).to_vec(),
            None => self
                .lattice
                .successors(current)
                .map(|(next, _)| next)
                .collect(),
        };

        neighbors.into_iter().for_each(|id| self.visit(id));

        Some(current)
    }
}

impl Lattice {
    /// Computes the predecessors of every node.
    pub fn predecessors(&self) -> Predecessors {
        let mut lists: Vec<Vec<NodeId>> = vec![vec![]; self.arena_len()];

        for from in self.nodes() {
            for (to, _) in self.successors(from) {
                let list = &mut lists[to.0];
                if !list.contains(&from) {
                    list.push(from);
                }
            }
        }

        Predecessors { lists }
    }

    /// All nodes, each after its predecessors, in time order where the
    /// edges allow it. A node's edges into its own entry frame don't make
    /// it its own predecessor here; a longer cycle is cut where it is first
    /// reached.
    pub fn topological_order(&self, predecessors: &Predecessors) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.node_count());
        let mut seen = vec![false; self.arena_len()];
        // (node, index of the next predecessor to visit)
        let mut stack: Vec<(NodeId, usize)> = vec![];

        for root in self.nodes() {
            if seen[root.0] {
                continue;
            }
            seen[root.0] = true;
            stack.push((root, 0));

            while let Some((id, next)) = stack.pop() {
                match predecessors.of(id).get(next) {
                    Some(&pred) => {
                        stack.push((id, next + 1));
                        if !seen[pred.0] {
                            seen[pred.0] = true;
                            stack.push((pred, 0));
                        }
                    }
                    None => order.push(id),
                }
            }
        }

        order
    }

    /// Depth-first traversal of the nodes reachable from `start`.
    pub fn depth_first(&self, start: NodeId) -> Traversal<'_> {
        Traversal::new(self, start, Order::DepthFirst, None)
    }

    /// Breadth-first traversal of the nodes reachable from `start`.
    pub fn breadth_first(&self, start: NodeId) -> Traversal<'_> {
        Traversal::new(self, start, Order::BreadthFirst, None)
    }

    /// Breadth-first traversal of the nodes that can reach `end`.
    pub fn reverse_breadth(&self, end: NodeId) -> Traversal<'_> {
        Traversal::new(
            self,
            end,
            Order::BreadthFirst,
            Some(Cow::Owned(self.predecessors())),
        )
    }

    /// Like [`Lattice::reverse_breadth`], reusing already computed predecessors.
    pub fn reverse_breadth_with<'a>(
        &'a self,
        end: NodeId,
        predecessors: &'a Predecessors,
    ) -> Traversal<'a> {
        Traversal::new(
            self,
            end,
            Order::BreadthFirst,
            Some(Cow::Borrowed(predecessors)),
        )
    }

    /// Removes every node that can't reach the end node,
    /// then drops the edges that point into emptied frames.
    ///
    /// Returns the number of removed nodes.
    pub fn remove_unreachable(&mut self) -> Result<usize, MissingEndpointError> {
        let end = self.end()?;
        let predecessors = self.predecessors();

        let mut reachable = vec![false; self.arena_len()];
        self.reverse_breadth_with(end, &predecessors)
            .for_each(|id| reachable[id.0] = true);

        let unreachable: Vec<NodeId> = self.nodes().filter(|id| !reachable[id.0]).collect();
        unreachable.iter().for_each(|&id| {
            self.take_node(id);
        });

        let dropped_edges = self.drop_dangling_exits();

        if !unreachable.is_empty() || dropped_edges > 0 {
            self.reset_edge_scores();
        }

        debug!(
            removed_nodes = unreachable.len(),
            dropped_edges, "removed unreachable nodes"
        );

        Ok(unreachable.len())
    }

    /// Adds a zero score edge from every predecessor of `filler`
    /// to each of its non-filler successors. Returns the number of added edges.
    pub fn bypass_filler(&mut self, filler: NodeId) -> usize {
        let predecessors = self.predecessors();
        self.bypass_filler_with(filler, &predecessors)
    }

    fn bypass_filler_with(&mut self, filler: NodeId, predecessors: &Predecessors) -> usize {
        let mut targets: Vec<usize> = self
            .successors(filler)
            .filter(|&(next, _)| !is_filler(&self[next].symbol))
            .map(|(next, _)| self[next].entry)
            .collect();
        targets.dedup();

        let mut added = 0;
        for &from in predecessors.of(filler) {
            for &frame in targets.iter() {
                if self.add_edge(from, frame, 0.0) {
                    added += 1;
                }
            }
        }
        added
    }

    /// Bypasses every filler node in the lattice.
    ///
    /// The filler nodes and their edges stay in place. Bypassing repeats
    /// until no new edge appears, so runs of consecutive fillers are
    /// bridged and a second call adds nothing.
    pub fn bypass_fillers(&mut self) -> usize {
        let mut total = 0;

        loop {
            let predecessors = self.predecessors();
            let fillers: Vec<NodeId> = self
                .nodes()
                .filter(|&id| is_filler(&self[id].symbol))
                .collect();

            let added: usize = fillers
                .into_iter()
                .map(|filler| self.bypass_filler_with(filler, &predecessors))
                .sum();

            total += added;
            if added == 0 {
                break;
            }
        }

        debug!(added_edges = total, "bypassed fillers");
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::{check, let_assert};

    // <s>(0) -> a(1) -> c(3) -> </s>(4)
    //        -> b(1) -> d(2) ---^
    //                   dead(2) (never reaches </s>)
    fn test_lattice() -> (Lattice, Vec<NodeId>) {
        let mut lattice = Lattice::default();
        let s = lattice.insert_node(0, "<s>").unwrap();
        let a = lattice.insert_node(1, "a").unwrap();
        let b = lattice.insert_node(1, "b").unwrap();
        let d = lattice.insert_node(2, "d").unwrap();
        let dead = lattice.insert_node(2, "dead").unwrap();
        let c = lattice.insert_node(3, "c").unwrap();
        let e = lattice.insert_node(4, "</s>").unwrap();

        lattice.add_edge(s, 1, -1.0);
        lattice.add_edge(a, 3, -1.0);
        lattice.add_edge(b, 2, -1.0);
        lattice.add_edge(d, 3, -1.0);
        lattice.add_edge(c, 4, -1.0);
        // dead ends in a frame that nobody enters
        lattice.add_edge(dead, 9, -1.0);

        lattice.set_start(s);
        lattice.set_end(e);
        (lattice, vec![s, a, b, d, dead, c, e])
    }

    #[test]
    fn test_predecessors() {
        let (lattice, ids) = test_lattice();
        let [s, a, b, d, dead, c, e] = ids[..] else {
            panic!()
        };
        let predecessors = lattice.predecessors();

        check!(predecessors.of(s).is_empty());
        check!(predecessors.of(a) == [s]);
        check!(predecessors.of(b) == [s]);
        // d and dead share frame 2, so b reaches both
        check!(predecessors.of(d) == [b]);
        check!(predecessors.of(dead) == [b]);
        check!(predecessors.of(c) == [a, d]);
        check!(predecessors.of(e) == [c]);
    }

    #[test]
    fn test_breadth_first() {
        let (lattice, ids) = test_lattice();
        let [s, a, b, d, dead, c, e] = ids[..] else {
            panic!()
        };

        let order: Vec<NodeId> = lattice.breadth_first(s).collect();
        check!(order == vec![s, a, b, c, d, dead, e]);
    }

    #[test]
    fn test_depth_first() {
        let (lattice, ids) = test_lattice();
        let [s, a, b, d, dead, c, e] = ids[..] else {
            panic!()
        };

        let order: Vec<NodeId> = lattice.depth_first(s).collect();
        check!(order == vec![s, b, dead, d, c, e, a]);
    }

    #[test]
    fn test_reverse_breadth() {
        let (lattice, ids) = test_lattice();
        let [s, a, b, d, _, c, e] = ids[..] else {
            panic!()
        };

        let order: Vec<NodeId> = lattice.reverse_breadth(e).collect();
        check!(order == vec![e, c, a, d, s, b]);
    }

    #[test]
    fn test_traversal_visits_each_node_once() {
        let mut lattice = Lattice::default();
        let s = lattice.insert_node(0, "<s>").unwrap();
        lattice.insert_node(1, "x").unwrap();
        lattice.insert_node(1, "y").unwrap();
        lattice.insert_node(2, "z").unwrap();
        lattice.add_edge(s, 1, -1.0);
        lattice.add_edge(s, 1, -2.0);
        let x = lattice.node_at(1, "x").unwrap();
        let y = lattice.node_at(1, "y").unwrap();
        lattice.add_edge(x, 2, -1.0);
        lattice.add_edge(y, 2, -1.0);

        check!(lattice.depth_first(s).count() == 4);
        check!(lattice.breadth_first(s).count() == 4);
    }

    #[test]
    fn test_topological_order() {
        let (lattice, ids) = test_lattice();
        let order = lattice.topological_order(&lattice.predecessors());
        check!(order == lattice.nodes().collect::<Vec<_>>());
        check!(order.len() == ids.len());
    }

    #[test]
    fn test_topological_order_zero_duration_links() {
        // b enters frame 1 first, but a reaches it through
        // an edge into frame 1, which also reaches a itself
        let mut lattice = Lattice::default();
        let s = lattice.insert_node(0, "<s>").unwrap();
        let b = lattice.insert_node(1, "b").unwrap();
        let a = lattice.insert_node(1, "a").unwrap();
        let e = lattice.insert_node(2, "</s>").unwrap();
        lattice.add_edge(s, 1, -1.0);
        lattice.add_edge(a, 1, -1.0);
        lattice.add_edge(b, 2, -1.0);

        let order = lattice.topological_order(&lattice.predecessors());
        check!(order == [s, a, b, e]);
    }

    #[test]
    fn test_remove_unreachable() {
        let (mut lattice, ids) = test_lattice();
        let dead = ids[4];

        let_assert!(Ok(removed) = lattice.remove_unreachable());
        check!(removed == 1);
        check!(!lattice.contains(dead));
        check!(lattice.node_count() == 6);

        // every remaining node reaches the end and no edge dangles
        let end = lattice.end().unwrap();
        let reaching: Vec<NodeId> = lattice.reverse_breadth(end).collect();
        check!(reaching.len() == lattice.node_count());
        for (_, edge) in lattice.all_edges() {
            check!(lattice.nodes_at(edge.frame).count() > 0);
        }
    }

    #[test]
    fn test_remove_unreachable_drops_dangling_edges() {
        let mut lattice = Lattice::default();
        let s = lattice.insert_node(0, "<s>").unwrap();
        let x = lattice.insert_node(1, "x").unwrap();
        let e = lattice.insert_node(2, "</s>").unwrap();
        lattice.insert_node(3, "orphan").unwrap();
        lattice.add_edge(s, 1, -1.0);
        lattice.add_edge(s, 3, -1.0);
        lattice.add_edge(x, 2, -1.0);
        lattice.set_start(s);
        lattice.set_end(e);

        check!(lattice.remove_unreachable() == Ok(1));
        check!(lattice.edge_count() == 2);
        check!(lattice[s].exits.len() == 1);
    }

    #[test]
    fn test_remove_unreachable_without_end() {
        let mut lattice = Lattice::default();
        lattice.insert_node(0, "<s>").unwrap();
        check!(lattice.remove_unreachable().is_err());
    }

    fn filler_lattice() -> Lattice {
        // <s>(0) -> <sil>(1) -> ++um++(2) -> hello(3) -> </s>(4)
        //        -> hi(1) -----------------^
        let mut lattice = Lattice::default();
        let s = lattice.insert_node(0, "<s>").unwrap();
        let sil = lattice.insert_node(1, "<sil>").unwrap();
        let hi = lattice.insert_node(1, "hi").unwrap();
        let um = lattice.insert_node(2, "++um++").unwrap();
        let hello = lattice.insert_node(3, "hello").unwrap();
        let e = lattice.insert_node(4, "</s>").unwrap();
        lattice.add_edge(s, 1, -1.0);
        lattice.add_edge(sil, 2, -1.0);
        lattice.add_edge(hi, 3, -1.0);
        lattice.add_edge(um, 3, -1.0);
        lattice.add_edge(hello, 4, -1.0);
        lattice.set_start(s);
        lattice.set_end(e);
        lattice
    }

    #[test]
    fn test_bypass_filler() {
        let mut lattice = filler_lattice();
        let sil = lattice.node_at(1, "<sil>").unwrap();
        let s = lattice.start().unwrap();

        // <sil> is only followed by another filler
        check!(lattice.bypass_filler(sil) == 0);

        let um = lattice.node_at(2, "++um++").unwrap();
        check!(lattice.bypass_filler(um) == 1);
        check!(lattice[sil].exits.iter().any(|e| e.frame == 3 && e.acoustic_score == 0.0));
        check!(lattice[s].exits.len() == 1);
    }

    #[test]
    fn test_bypass_fillers_bridges_runs_of_fillers() {
        let mut lattice = filler_lattice();
        let s = lattice.start().unwrap();

        check!(lattice.bypass_fillers() == 2);
        // <s> now jumps over <sil> and ++um++ straight to hello
        check!(lattice[s].exits.iter().any(|e| e.frame == 3 && e.acoustic_score == 0.0));
        // the filler nodes are still there
        check!(lattice.node_count() == 6);
    }

    #[test]
    fn test_bypass_fillers_idempotent() {
        let mut once = filler_lattice();
        once.bypass_fillers();
        let edges_once = once.edge_count();
        once.remove_unreachable().unwrap();

        let mut twice = filler_lattice();
        twice.bypass_fillers();
        check!(twice.bypass_fillers() == 0);
        check!(twice.edge_count() == edges_once);
        twice.remove_unreachable().unwrap();

        let words = |lattice: &Lattice| -> Vec<String> {
            lattice
                .nodes()
                .map(|id| lattice[id].symbol.clone())
                .filter(|w| !is_filler(w))
                .collect()
        };
        check!(words(&once) == words(&twice));
    }
}
