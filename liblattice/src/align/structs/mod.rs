mod alignment;
pub use alignment::{AlignmentStep, MinimumError, DELETION_MARKER, INSERTION_MARKER};

mod cost_matrix;
pub use cost_matrix::{Backpointer, CostMatrix};
