//! The retrieval-and-normalization pipeline.

pub mod pipeline;
pub mod selector;

pub use pipeline::{run, scan};
pub use selector::{scan_window, select_candidates};
