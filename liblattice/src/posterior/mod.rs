mod forward;
pub use forward::forward;

mod backward;
pub use backward::{backward, UnscoredEdgeError};

mod posterior;
pub use posterior::{edge_posteriors, posterior, EdgePosterior};
