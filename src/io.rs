use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use phylotree::tree::Tree as PhyloTree;

use crate::error::{ReplayError, Result};

/// Strip bracketed comments from a Newick string.
///
/// Tree-search traces may carry annotations like `:[&rate=0.123]2.45` or
/// `[&R]` prefixes. Only the text outside `[...]` is kept, branch lengths
/// included.
fn strip_comments(newick: &str) -> String {
    let mut result = String::with_capacity(newick.len());
    let mut depth = 0usize;

    for ch in newick.chars() {
        match ch {
            '[' => depth += 1,
            ']' if depth > 0 => depth -= 1,
            _ if depth == 0 => result.push(ch),
            _ => {}
        }
    }

    result
}

/// Parse a topology string as found on a `@tree` line.
///
/// Comments are removed and surrounding whitespace trimmed before handing the
/// text to `phylotree`. The string must start with `(`.
pub fn parse_topology(text: &str) -> Result<PhyloTree> {
    let cleaned = strip_comments(text);
    let cleaned = cleaned.trim();
    if !cleaned.starts_with('(') {
        return Err(ReplayError::MalformedTree(format!(
            "topology must start with '(': {cleaned:?}"
        )));
    }
    PhyloTree::from_newick(cleaned).map_err(|e| ReplayError::MalformedTree(e.to_string()))
}

/// Write one Newick string, newline-terminated, to `dir/name`.
///
/// The directory is created if needed. Returns the full path written.
pub fn write_newick<P: AsRef<Path>>(dir: P, name: &str, newick: &str) -> Result<PathBuf> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;
    let path = dir.join(name);

    let mut out = BufWriter::new(File::create(&path)?);
    writeln!(&mut out, "{newick}")?;
    out.flush()?;

    tracing::trace!(path = %path.display(), "wrote topology");
    Ok(path)
}
