mod best_path;
pub use best_path::{best_path, best_path_between, BestPath, UnreachableEndError};
