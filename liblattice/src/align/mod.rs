pub mod structs;

mod minimum_error;
pub use minimum_error::{minimum_error, minimum_error_from, InvalidReferenceSequenceError};
