pub mod edge;
pub use edge::{Edge, EdgePayload};

pub mod lattice;
pub use lattice::{DuplicateNodeError, Lattice, LatticeSummary, MissingEndpointError};

pub mod node;
pub use node::{Node, NodeId};
