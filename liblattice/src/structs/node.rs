use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use super::Edge;

/// A stable handle to a node in a lattice's node arena.
///
/// Handles are never reused, so a handle to a removed node stays invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One hypothesized word instance. All edges out of this node
/// represent instances of `symbol` that begin at frame `entry`.
#[derive(Debug, Clone)]
pub struct Node {
    /// The word this node hypothesizes
    pub symbol: String,
    /// The frame in which the word begins
    pub entry: usize,
    /// The edges leaving this node
    pub exits: Vec<Edge>,
}

impl Node {
    pub fn new(symbol: impl Into<String>, entry: usize) -> Self {
        Self {
            symbol: symbol.into(),
            entry,
            exits: vec![],
        }
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, [", self.symbol, self.entry)?;
        for (idx, edge) in self.exits.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "({}, {})", edge.frame, edge.acoustic_score)?;
        }
        write!(f, "])")
    }
}
