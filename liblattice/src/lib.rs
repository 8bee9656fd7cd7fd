pub mod align;
pub mod io;
pub mod lm;
pub mod posterior;
pub mod search;
pub mod structs;
pub mod traverse;
pub mod util;

pub use io::{load_lattice, read_lattice, write_lattice, LatticeFormat, LoadOptions};
pub use structs::{Lattice, Node, NodeId};
