use std::ops::Index;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{Edge, EdgePayload, Node, NodeId};

/// An Error that is produced when a node is inserted
/// at a frame that already holds a node with the same word.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("duplicate node for word {symbol} at frame {frame}")]
pub struct DuplicateNodeError {
    pub frame: usize,
    pub symbol: String,
}

/// An Error that is produced when an algorithm needs the
/// designated start or end node and the lattice doesn't have one.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("lattice has no {which} node")]
pub struct MissingEndpointError {
    which: &'static str,
}

/// A word lattice: a list of frames, each of which maps a word
/// to the node that hypothesizes that word starting in that frame.
///
/// Nodes live in an arena and are addressed by [`NodeId`]. Edges
/// don't point at nodes directly; they point at a frame, and every
/// node entering in that frame is a successor.
#[derive(Debug, Clone)]
pub struct Lattice {
    /// The node arena; removed nodes leave a `None` behind
    nodes: Vec<Option<Node>>,
    /// One map of word -> node per frame
    frames: Vec<IndexMap<String, NodeId>>,
    start: Option<NodeId>,
    end: Option<NodeId>,
    /// The key/value header of the file the lattice was loaded from
    pub header: IndexMap<String, String>,
    /// The number of frames per second
    pub frame_rate: f64,
}

/// A short description of a lattice's shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatticeSummary {
    pub frames: usize,
    pub nodes: usize,
    pub edges: usize,
    pub start: Option<String>,
    pub end: Option<String>,
}

impl Default for Lattice {
    fn default() -> Self {
        Lattice::new(Lattice::DEFAULT_FRAME_RATE)
    }
}

impl Lattice {
    pub const DEFAULT_FRAME_RATE: f64 = 100.0;

    pub fn new(frame_rate: f64) -> Self {
        Self {
            nodes: vec![],
            frames: vec![],
            start: None,
            end: None,
            header: IndexMap::new(),
            frame_rate,
        }
    }

    /// Appends an empty frame and returns its index.
    pub fn add_frame_slot(&mut self) -> usize {
        self.frames.push(IndexMap::new());
        self.frames.len() - 1
    }

    /// Makes sure that frames `0..=frame` exist.
    pub fn ensure_frame(&mut self, frame: usize) {
        while self.frames.len() <= frame {
            self.add_frame_slot();
        }
    }

    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    /// Adds a node for `symbol` entering at `frame`, growing the frame list if needed.
    pub fn insert_node(
        &mut self,
        frame: usize,
        symbol: &str,
    ) -> Result<NodeId, DuplicateNodeError> {
        self.ensure_frame(frame);

        if self.frames[frame].contains_key(symbol) {
            return Err(DuplicateNodeError {
                frame,
                symbol: symbol.to_string(),
            });
        }

        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(Node::new(symbol, frame)));
        self.frames[frame].insert(symbol.to_string(), id);
        Ok(id)
    }

    /// Adds a node for `symbol` entering at `frame`, removing any
    /// node that already holds that word in that frame.
    pub fn replace_node(&mut self, frame: usize, symbol: &str) -> NodeId {
        if let Some(existing) = self.node_at(frame, symbol) {
            self.remove_node(existing);
        }

        match self.insert_node(frame, symbol) {
            Ok(id) => id,
            // the slot was just cleared
            Err(_) => unreachable!(),
        }
    }

    /// Removes a node from its frame and from the arena.
    ///
    /// Any structural change invalidates forward-backward scores,
    /// so all edge payloads are reset as well.
    pub fn remove_node(&mut self, id: NodeId) -> Option<Node> {
        let node = self.take_node(id)?;
        self.reset_edge_scores();
        Some(node)
    }

    /// Removes a node without touching edge payloads.
    pub(crate) fn take_node(&mut self, id: NodeId) -> Option<Node> {
        let node = self.nodes.get_mut(id.0)?.take()?;

        if let Some(frame) = self.frames.get_mut(node.entry) {
            if frame.get(&node.symbol) == Some(&id) {
                frame.shift_remove(&node.symbol);
            }
        }

        if self.start == Some(id) {
            self.start = None;
        }
        if self.end == Some(id) {
            self.end = None;
        }

        Some(node)
    }

    /// Adds an edge from `from` to the nodes entering at `frame`.
    ///
    /// Returns false (and adds nothing) if the node already has an
    /// edge with the same exit frame and score, or if `from` was removed.
    pub fn add_edge(&mut self, from: NodeId, frame: usize, acoustic_score: f64) -> bool {
        let Some(node) = self.get_mut(from) else {
            return false;
        };

        if node
            .exits
            .iter()
            .any(|e| e.frame == frame && e.acoustic_score == acoustic_score)
        {
            return false;
        }

        node.exits.push(Edge::new(frame, acoustic_score));
        true
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0).and_then(|n| n.as_ref())
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0).and_then(|n| n.as_mut())
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// The node for `symbol` entering at `frame`, if there is one.
    pub fn node_at(&self, frame: usize, symbol: &str) -> Option<NodeId> {
        self.frames.get(frame)?.get(symbol).copied()
    }

    /// The nodes entering at `frame`, in insertion order.
    pub fn nodes_at(&self, frame: usize) -> impl DoubleEndedIterator<Item = NodeId> + '_ {
        self.frames
            .get(frame)
            .into_iter()
            .flat_map(|f| f.values().copied())
    }

    /// All nodes in time order.
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.frames.iter().flat_map(|f| f.values().copied())
    }

    /// All nodes in reverse time order.
    pub fn reverse_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.frames.iter().rev().flat_map(|f| f.values().rev().copied())
    }

    /// All edges in time order, paired with the node they leave.
    pub fn all_edges(&self) -> impl Iterator<Item = (NodeId, &Edge)> + '_ {
        self.nodes()
            .flat_map(move |id| self[id].exits.iter().map(move |edge| (id, edge)))
    }

    /// The successors of a node, paired with the edge that reaches them.
    ///
    /// One edge reaches every node that enters at its exit frame,
    /// so a single edge can produce several successors.
    pub fn successors(&self, id: NodeId) -> impl Iterator<Item = (NodeId, &Edge)> + '_ {
        self.get(id)
            .into_iter()
            .flat_map(|node| node.exits.iter())
            .flat_map(move |edge| self.nodes_at(edge.frame).map(move |next| (next, edge)))
    }

    pub fn node_count(&self) -> usize {
        self.frames.iter().map(|f| f.len()).sum()
    }

    pub fn edge_count(&self) -> usize {
        self.nodes().map(|id| self[id].exits.len()).sum()
    }

    /// The size of the node arena, including removed nodes.
    /// Per-node scratch space is allocated with this length.
    pub fn arena_len(&self) -> usize {
        self.nodes.len()
    }

    pub fn set_start(&mut self, id: NodeId) {
        self.start = Some(id);
    }

    pub fn set_end(&mut self, id: NodeId) {
        self.end = Some(id);
    }

    pub fn start(&self) -> Result<NodeId, MissingEndpointError> {
        self.start
            .filter(|&id| self.contains(id))
            .ok_or(MissingEndpointError { which: "start" })
    }

    pub fn end(&self) -> Result<NodeId, MissingEndpointError> {
        self.end
            .filter(|&id| self.contains(id))
            .ok_or(MissingEndpointError { which: "end" })
    }

    /// Returns every edge payload to `Unscored`.
    pub fn reset_edge_scores(&mut self) {
        self.nodes
            .iter_mut()
            .flatten()
            .flat_map(|node| node.exits.iter_mut())
            .for_each(|edge| edge.payload = EdgePayload::Unscored);
    }

    /// Drops every edge whose exit frame holds no node. Returns the number of dropped edges.
    pub(crate) fn drop_dangling_exits(&mut self) -> usize {
        let frames = &self.frames;
        let is_live = |frame: usize| frames.get(frame).is_some_and(|f| !f.is_empty());

        self.nodes
            .iter_mut()
            .flatten()
            .map(|node| {
                let before = node.exits.len();
                node.exits.retain(|edge| is_live(edge.frame));
                before - node.exits.len()
            })
            .sum()
    }

    pub fn summary(&self) -> LatticeSummary {
        LatticeSummary {
            frames: self.num_frames(),
            nodes: self.node_count(),
            edges: self.edge_count(),
            start: self.start().ok().map(|id| self[id].symbol.clone()),
            end: self.end().ok().map(|id| self[id].symbol.clone()),
        }
    }
}

impl Index<NodeId> for Lattice {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Self::Output {
        match self.get(id) {
            Some(node) => node,
            None => panic!("node {id} is not in the lattice"),
        }
    }
}
