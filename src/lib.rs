//! Crate root: module orchestration and public re-exports.
//!
//! Modules:
//! - `trace`: line-oriented reader for `@tree` / `@subtree` / `@insertion` records.
//! - `tree`: arena tree with stable node ids and mutual adjacency.
//! - `bitset`: compact bitset representation for tip sets.
//! - `splits`: index from tip-set split to the edge inducing it.
//! - `editor`: reversible prune and splice guards.
//! - `replay`: driver walking a trace and writing one Newick file per step.
//! - `io`: Newick parsing and output files.
//! - `error`: crate error type.
//! - `api`: Python bindings via `pyo3` (gated behind "python" feature).

pub mod bitset;
pub mod editor;
pub mod error;
pub mod io;
pub mod replay;
pub mod splits;
pub mod trace;
pub mod tree;

#[cfg(feature = "python")]
pub mod api;

// Re-export frequently used types & functions
pub use bitset::Bitset;
pub use error::{ReplayError, Result};
pub use replay::{ReplayConfig, ReplayDriver, ReplayStats, replay_file};
pub use splits::{Edge, SplitIndex};
pub use trace::TraceReader;
pub use tree::Tree;
