//! Network parameters of the peg: confirmation depths, monetary limits,
//! authorizer sets and fork activation heights.

mod activations;
mod authorizer;
mod bridge;
mod errors;
pub mod serde_helpers;

pub use activations::*;
pub use authorizer::*;
pub use bridge::*;
pub use errors::*;
