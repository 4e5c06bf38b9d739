//! Optimizer module.
//!
//! Chromosome operators, the month simulation with its cost strategies,
//! and the evolution loop that ties them together.

pub mod chromosome;
pub mod fitness;
pub mod engine;

pub use chromosome::*;
pub use fitness::*;
pub use engine::*;
