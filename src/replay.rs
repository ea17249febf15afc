//! Replay of a trace against the trees it records.
//!
//! # Levels
//! ```text
//! @tree ...            → load tree t, index its splits
//!   @subtree (...)     → prune clade s, write x.t.s and y.t.s
//!     @insertion ...   → splice clade into edge i, write t.s.i, undo splice
//!     @insertion ...
//!                      ← undo prune
//!   @subtree (...)
//! @tree ...
//! ```
//! Counters are 1-based; the subtree counter restarts for every tree and
//! the insertion counter for every subtree.
//!
//! Every edit is rolled back, so each record is replayed against the tree
//! exactly as the `@tree` line gave it. The first failure stops the run;
//! files written before it are kept.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::editor::{Prune, Splice};
use crate::error::{ReplayError, Result};
use crate::io::{parse_topology, write_newick};
use crate::splits::SplitIndex;
use crate::trace::{RecordKind, TraceReader, TraceRecord};
use crate::tree::Tree;

/// Output directory used when none is configured.
pub const DEFAULT_OUT_DIR: &str = "spr_replay";

/// Name of the full-tree dump written when a split lookup fails.
pub const ERROR_TREE_FILE: &str = "error_tree";

#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// Directory receiving one Newick file per replayed step.
    pub out_dir: PathBuf,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        ReplayConfig { out_dir: PathBuf::from(DEFAULT_OUT_DIR) }
    }
}

/// Number of records replayed at each level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub trees: usize,
    pub subtrees: usize,
    pub insertions: usize,
}

pub struct ReplayDriver<R> {
    reader: TraceReader<R>,
    tree: Tree,
    config: ReplayConfig,
    stats: ReplayStats,
}

impl ReplayDriver<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(trace: P, config: ReplayConfig) -> Result<Self> {
        Ok(Self::new(TraceReader::open(trace)?, config))
    }
}

impl<R: BufRead> ReplayDriver<R> {
    pub fn new(reader: TraceReader<R>, config: ReplayConfig) -> Self {
        ReplayDriver { reader, tree: Tree::new(), config, stats: ReplayStats::default() }
    }

    /// Replay the whole trace.
    ///
    /// On failure the trace position is logged before the error is returned.
    pub fn run(mut self) -> Result<ReplayStats> {
        match self.replay() {
            Ok(()) => {
                let ReplayStats { trees, subtrees, insertions } = self.stats;
                info!(trees, subtrees, insertions, "replay finished");
                Ok(self.stats)
            }
            Err(e) => {
                let (line, text) = self.reader.position();
                error!(line, text, "replay failed: {e}");
                Err(e)
            }
        }
    }

    fn replay(&mut self) -> Result<()> {
        let topology = loop {
            match self.reader.next()? {
                RecordKind::Tree => break self.reader.get_tree()?,
                RecordKind::End => return Err(ReplayError::EndOfStream),
                _ => continue,
            }
        };

        let mut record = TraceRecord::Tree(topology);
        while let TraceRecord::Tree(topology) = record {
            record = self.replay_tree(&topology)?;
        }
        Ok(())
    }

    /// Replay one tree generation. Returns the record that ended it.
    fn replay_tree(&mut self, topology: &str) -> Result<TraceRecord> {
        let parsed = parse_topology(topology)?;
        self.tree.load(&parsed)?;
        let index = SplitIndex::compute(&self.tree)?;

        self.stats.trees += 1;
        let tree_no = self.stats.trees;
        info!(tree = tree_no, tips = index.names().len(), edges = index.len(), "tree");

        let mut subtree_no = 0;
        let mut record = self.reader.next_record()?;
        loop {
            record = match record {
                TraceRecord::Subtree(tips) => {
                    subtree_no += 1;
                    match self.replay_subtree(&index, &tips, tree_no, subtree_no) {
                        Err(e @ ReplayError::SplitNotFound(_)) => {
                            self.dump_error_tree();
                            return Err(e);
                        }
                        other => other?,
                    }
                }
                TraceRecord::Insertion(insertion) => {
                    // no open prune: only check the split exists in the full tree
                    if let Err(e) = index.resolve(&insertion.tips) {
                        if matches!(e, ReplayError::SplitNotFound(_)) {
                            self.dump_error_tree();
                        }
                        return Err(e);
                    }
                    let score = insertion.score()?;
                    warn!(tree = tree_no, score, "insertion outside a subtree, not replayed");
                    self.reader.next_record()?
                }
                other @ (TraceRecord::Tree(_) | TraceRecord::End) => return Ok(other),
            };
        }
    }

    /// Replay one subtree and its insertions. Returns the record that ended
    /// the level.
    fn replay_subtree(
        &mut self,
        index: &SplitIndex,
        tips: &[String],
        tree_no: usize,
        subtree_no: usize,
    ) -> Result<TraceRecord> {
        let edge = index.resolve(tips)?;
        self.stats.subtrees += 1;
        debug!(tree = tree_no, subtree = subtree_no, tips = tips.len(), "subtree");

        let out_dir = &self.config.out_dir;
        let mut prune = Prune::open(&mut self.tree, edge)?;
        write_newick(out_dir, &format!("x.{tree_no}.{subtree_no}"), &prune.remainder_newick()?)?;
        write_newick(out_dir, &format!("y.{tree_no}.{subtree_no}"), &prune.subtree_newick()?)?;

        let mut insertion_no = 0;
        loop {
            match self.reader.next_record()? {
                TraceRecord::Insertion(insertion) => {
                    insertion_no += 1;
                    let score = insertion.score()?;
                    let target = prune
                        .remainder_edge(index.resolve(&insertion.tips)?)
                        .ok_or_else(|| ReplayError::SplitNotFound(insertion.tips.clone()))?;

                    let splice = Splice::open(&mut prune, target)?;
                    let name = format!("{tree_no}.{subtree_no}.{insertion_no}");
                    write_newick(out_dir, &name, &splice.newick()?)?;
                    drop(splice);

                    self.stats.insertions += 1;
                    debug!(insertion = %name, tips = insertion.tips.len(), score, "insertion");
                }
                other => return Ok(other),
            }
        }
    }

    /// Write the current full tree for inspection. Failures are only logged so
    /// the error that triggered the dump is the one reported.
    fn dump_error_tree(&self) {
        let Some(anchor) = self.tree.anchor() else { return };
        let written = self
            .tree
            .to_newick_unrooted(anchor)
            .and_then(|newick| write_newick(&self.config.out_dir, ERROR_TREE_FILE, &newick));
        match written {
            Ok(path) => error!(path = %path.display(), "wrote current tree"),
            Err(e) => error!("could not write {ERROR_TREE_FILE}: {e}"),
        }
    }
}

/// Replay the trace file at `path`.
pub fn replay_file<P: AsRef<Path>>(path: P, config: ReplayConfig) -> Result<ReplayStats> {
    ReplayDriver::open(path, config)?.run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Cursor;

    fn replay(trace: &str, out_dir: &Path) -> Result<ReplayStats> {
        let reader = TraceReader::new(Cursor::new(trace.as_bytes().to_vec()));
        ReplayDriver::new(reader, ReplayConfig { out_dir: out_dir.to_path_buf() }).run()
    }

    fn read_tree(dir: &Path, name: &str) -> Tree {
        let text = fs::read_to_string(dir.join(name)).unwrap();
        Tree::from_newick(&text).unwrap()
    }

    fn splits_of(tree: &Tree) -> Vec<Vec<String>> {
        SplitIndex::compute(tree).unwrap().splits()
    }

    fn tips_of(tree: &Tree) -> Vec<String> {
        tree.tip_names(None, tree.anchor().unwrap())
    }

    #[test]
    fn test_quartet_end_to_end() {
        let tmp = tempfile::tempdir().unwrap();
        let trace = "@tree (A,B,(C,D));\n@subtree (C D)\n@insertion 0.5 (A B)\n";

        let stats = replay(trace, tmp.path()).unwrap();
        assert_eq!(stats, ReplayStats { trees: 1, subtrees: 1, insertions: 1 });

        let remainder = read_tree(tmp.path(), "x.1.1");
        assert_eq!(tips_of(&remainder), vec!["A", "B"]);
        assert_eq!(splits_of(&remainder), splits_of(&Tree::from_newick("(A,B);").unwrap()));

        let subtree = read_tree(tmp.path(), "y.1.1");
        assert_eq!(tips_of(&subtree), vec!["C", "D"]);
        assert_eq!(splits_of(&subtree), splits_of(&Tree::from_newick("(C,D);").unwrap()));

        let rebuilt = read_tree(tmp.path(), "1.1.1");
        assert_eq!(tips_of(&rebuilt), vec!["A", "B", "C", "D"]);
        assert_eq!(splits_of(&rebuilt), splits_of(&Tree::from_newick("(A,B,(C,D));").unwrap()));
        assert!(!tmp.path().join(ERROR_TREE_FILE).exists());
    }

    #[test]
    fn test_regraft_elsewhere() {
        let tmp = tempfile::tempdir().unwrap();
        let trace = "@tree (A,B,(C,(D,E)));\n@subtree (D E)\n@insertion -12.5 (A)\n";

        replay(trace, tmp.path()).unwrap();

        let rebuilt = SplitIndex::compute(&read_tree(tmp.path(), "1.1.1")).unwrap();
        assert_eq!(rebuilt.names().len(), 5);
        assert!(rebuilt.resolve(&["A", "D", "E"]).is_ok());
        assert!(rebuilt.resolve(&["C", "D", "E"]).is_err());
    }

    #[test]
    fn test_positional_file_names() {
        let tmp = tempfile::tempdir().unwrap();
        let trace = "\
            search start\n\
            @tree (A,B,(C,D));\n\
            @subtree (A)\n\
            @insertion 1.0 (C)\n\
            @insertion 2.0 (D)\n\
            @tree: (A,C,(B,(D,E)));\n\
            @subtree (D E)\n\
            @insertion 3.0 (A)\n\
            @subtree (B)\n\
            @subtree (C)\n\
            @insertion 4.0 (D)\n\
            done\n";

        let stats = replay(trace, tmp.path()).unwrap();
        assert_eq!(stats, ReplayStats { trees: 2, subtrees: 4, insertions: 4 });

        for name in [
            "x.1.1", "y.1.1", "1.1.1", "1.1.2",
            "x.2.1", "y.2.1", "2.1.1",
            "x.2.2", "y.2.2",
            "x.2.3", "y.2.3", "2.3.1",
        ] {
            assert!(tmp.path().join(name).exists(), "missing {name}");
        }
        assert!(!tmp.path().join("2.2.1").exists());
        assert!(!tmp.path().join("1.2.1").exists());

        // every reconstruction holds each tip exactly once
        let rebuilt = read_tree(tmp.path(), "2.3.1");
        assert_eq!(tips_of(&rebuilt), vec!["A", "B", "C", "D", "E"]);
    }

    #[test]
    fn test_no_tree_is_end_of_stream() {
        let tmp = tempfile::tempdir().unwrap();
        let err = replay("@subtree (A)\nnothing else\n", tmp.path()).unwrap_err();
        assert!(matches!(err, ReplayError::EndOfStream));
    }

    #[test]
    fn test_unknown_subtree_tip() {
        let tmp = tempfile::tempdir().unwrap();
        let err = replay("@tree (A,B,(C,D));\n@subtree (Zzz)\n", tmp.path()).unwrap_err();
        assert!(matches!(err, ReplayError::UnknownTip(ref t) if t == "Zzz"));
    }

    #[test]
    fn test_missing_insertion_split_dumps_tree() {
        let tmp = tempfile::tempdir().unwrap();
        let trace = "@tree (A,B,(C,(D,E)));\n@subtree (D E)\n@insertion 0.1 (A)\n@insertion 0.2 (A C)\n";

        let err = replay(trace, tmp.path()).unwrap_err();
        assert!(matches!(err, ReplayError::SplitNotFound(_)));

        // earlier output stays, the dump is the full unpruned tree
        assert!(tmp.path().join("1.1.1").exists());
        let dumped = read_tree(tmp.path(), ERROR_TREE_FILE);
        assert_eq!(splits_of(&dumped), splits_of(&Tree::from_newick("(A,B,(C,(D,E)));").unwrap()));
    }

    #[test]
    fn test_insertion_inside_pruned_clade() {
        let tmp = tempfile::tempdir().unwrap();
        let trace = "@tree (A,B,(C,(D,E)));\n@subtree (C D E)\n@insertion 0.1 (D)\n";

        let err = replay(trace, tmp.path()).unwrap_err();
        assert!(matches!(err, ReplayError::SplitNotFound(ref t) if t == &["D"]));
        assert!(tmp.path().join(ERROR_TREE_FILE).exists());
    }

    #[test]
    fn test_missing_score_is_fatal_when_replayed() {
        let tmp = tempfile::tempdir().unwrap();
        let trace = "@tree (A,B,(C,D));\n@subtree (C D)\n@insertion (A B)\n";

        let err = replay(trace, tmp.path()).unwrap_err();
        assert!(matches!(err, ReplayError::MalformedRecord { line: 3, .. }));
        assert!(tmp.path().join("x.1.1").exists());
    }

    #[test]
    fn test_tree_level_insertion_is_checked() {
        let tmp = tempfile::tempdir().unwrap();

        let stats = replay("@tree (A,B,(C,D));\n@insertion 0.5 (A B)\n", tmp.path()).unwrap();
        assert_eq!(stats, ReplayStats { trees: 1, subtrees: 0, insertions: 0 });

        let err = replay("@tree (A,B,(C,D));\n@insertion 0.5 (A C)\n", tmp.path()).unwrap_err();
        assert!(matches!(err, ReplayError::SplitNotFound(_)));
    }

    #[test]
    fn test_tree_level_insertion_score_is_read() {
        let tmp = tempfile::tempdir().unwrap();
        let err = replay("@tree (A,B,(C,D));\n@insertion (A B)\n", tmp.path()).unwrap_err();
        assert!(matches!(err, ReplayError::MalformedRecord { line: 2, .. }));
    }

    #[test]
    fn test_missing_subtree_split_dumps_tree() {
        let tmp = tempfile::tempdir().unwrap();
        let err = replay("@tree (A,B,(C,D));\n@subtree (A C)\n", tmp.path()).unwrap_err();
        assert!(matches!(err, ReplayError::SplitNotFound(ref t) if t == &["A", "C"]));

        assert!(!tmp.path().join("x.1.1").exists());
        let dumped = read_tree(tmp.path(), ERROR_TREE_FILE);
        assert_eq!(splits_of(&dumped), splits_of(&Tree::from_newick("(A,B,(C,D));").unwrap()));
    }

    #[test]
    fn test_non_utf8_noise_between_records() {
        let tmp = tempfile::tempdir().unwrap();
        let trace = b"@tree (A,B,(C,D));\nlog: caf\xe9 noise\n@subtree (C D)\n@insertion 0.5 (A B)\n".to_vec();
        let reader = TraceReader::new(Cursor::new(trace));

        let stats = ReplayDriver::new(reader, ReplayConfig { out_dir: tmp.path().to_path_buf() }).run().unwrap();
        assert_eq!(stats, ReplayStats { trees: 1, subtrees: 1, insertions: 1 });
        assert!(tmp.path().join("1.1.1").exists());
    }

    #[test]
    fn test_malformed_tree_record() {
        let tmp = tempfile::tempdir().unwrap();
        let err = replay("@tree (A,B,(A,D));\n", tmp.path()).unwrap_err();
        assert!(matches!(err, ReplayError::MalformedTree(_)));

        let err = replay("@tree (A);\n", tmp.path()).unwrap_err();
        assert!(matches!(err, ReplayError::EmptyTree { tips: 1 }));
    }

    #[test]
    fn test_replay_file() {
        let tmp = tempfile::tempdir().unwrap();
        let trace = tmp.path().join("run.trace");
        fs::write(&trace, "@tree ((A:1,B:1):1,(C:1,D:1):1);\n@subtree (A B)\n@insertion 0 (C)\n").unwrap();

        let out = tmp.path().join("out");
        let stats = replay_file(&trace, ReplayConfig { out_dir: out.clone() }).unwrap();
        assert_eq!(stats.insertions, 1);
        assert_eq!(tips_of(&read_tree(&out, "1.1.1")), vec!["A", "B", "C", "D"]);
    }
}
