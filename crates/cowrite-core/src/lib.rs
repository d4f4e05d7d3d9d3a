pub mod digest;
pub mod event;
pub mod scoring;
pub mod text_state;
pub mod trace;
pub mod types;

pub use types::*;
