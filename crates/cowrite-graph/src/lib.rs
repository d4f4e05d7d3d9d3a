pub mod error;
pub mod graph;
mod memo;

pub use error::GraphError;
pub use graph::{ContributionGraph, GraphSnapshot};
