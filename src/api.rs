//! Python binding layer for trace replay.
//!
//! Provides Python functions for replaying tree-search traces and for
//! inspecting the splits of a single topology.

use std::path::PathBuf;

use pyo3::exceptions::{PyIOError, PyValueError};
use pyo3::prelude::*;

use crate::error::ReplayError;
use crate::replay::{ReplayConfig, ReplayStats, DEFAULT_OUT_DIR, replay_file};
use crate::splits::SplitIndex;
use crate::tree::Tree;

fn to_py_err(err: ReplayError) -> PyErr {
    match err {
        ReplayError::Io(e) => PyIOError::new_err(e.to_string()),
        other => PyValueError::new_err(other.to_string()),
    }
}

/// Replay a trace file, writing one Newick file per step.
///
/// Args:
///     trace: Path to the trace file
///     out_dir: Directory receiving the output files (default: "spr_replay")
///
/// Returns:
///     A tuple of (trees, subtrees, insertions) replayed
///
/// Raises:
///     IOError: If the trace cannot be read or an output file cannot be written
///     ValueError: If a record is malformed or names a split the tree lacks
#[pyfunction]
#[pyo3(signature = (trace, out_dir=DEFAULT_OUT_DIR.to_string()))]
fn replay(trace: String, out_dir: String) -> PyResult<(usize, usize, usize)> {
    let config = ReplayConfig { out_dir: PathBuf::from(out_dir) };
    let ReplayStats { trees, subtrees, insertions } = replay_file(&trace, config).map_err(to_py_err)?;
    Ok((trees, subtrees, insertions))
}

/// List the non-trivial and tip splits of a topology.
///
/// Each split is given as the sorted tip names on the side that excludes
/// the alphabetically first tip.
///
/// Raises:
///     ValueError: If the topology cannot be parsed or has duplicate tips
#[pyfunction]
fn edge_splits(newick: &str) -> PyResult<Vec<Vec<String>>> {
    let tree = Tree::from_newick(newick).map_err(to_py_err)?;
    let index = SplitIndex::compute(&tree).map_err(to_py_err)?;
    Ok(index.splits())
}

/// Python module definition
#[pymodule]
fn spr_replay(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(replay, m)?)?;
    m.add_function(wrap_pyfunction!(edge_splits, m)?)?;
    Ok(())
}
