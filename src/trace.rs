//! Line-oriented reader for tree-search trace files.
//!
//! A trace interleaves three kinds of records with arbitrary other output:
//!
//! ```text
//! @tree (A,B,(C,D));          start of a tree generation
//! @subtree (C D)              clade pruned from that tree
//! @insertion 0.5 (A B)        candidate regraft edge and its score
//! ```
//!
//! Lines are classified by their first whitespace-delimited token; anything
//! else is skipped. The payload of the current line is extracted on demand
//! by the `get_*` accessor matching its classification.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{ReplayError, Result};

/// What the reader currently holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReaderState {
    Seeking,
    HaveTree,
    HaveSubtree,
    HaveInsertion,
    End,
}

impl ReaderState {
    fn label(self) -> &'static str {
        match self {
            ReaderState::Seeking => "no",
            ReaderState::HaveTree => "tree",
            ReaderState::HaveSubtree => "subtree",
            ReaderState::HaveInsertion => "insertion",
            ReaderState::End => "end-of-stream",
        }
    }
}

/// Classification returned by [`TraceReader::next`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordKind {
    Tree,
    Subtree,
    Insertion,
    End,
}

/// A candidate regraft position.
///
/// The score is kept as the raw token and only parsed by [`Insertion::score`],
/// so a record with a missing or broken score can still be classified and
/// its tip list inspected.
#[derive(Clone, Debug, PartialEq)]
pub struct Insertion {
    /// Tip names on one side of the target edge, sorted.
    pub tips: Vec<String>,
    score_token: Option<String>,
    line: usize,
}

impl Insertion {
    pub fn score(&self) -> Result<f64> {
        let token = self.score_token.as_deref().ok_or_else(|| ReplayError::MalformedRecord {
            line: self.line,
            reason: "insertion record has no score".to_string(),
        })?;
        token.parse::<f64>().map_err(|_| ReplayError::MalformedRecord {
            line: self.line,
            reason: format!("insertion score '{token}' is not a number"),
        })
    }
}

/// One parsed trace record.
#[derive(Clone, Debug, PartialEq)]
pub enum TraceRecord {
    /// Topology string, from the first `(` to the end of the line.
    Tree(String),
    /// Sorted tip names of the clade to prune.
    Subtree(Vec<String>),
    Insertion(Insertion),
    End,
}

pub struct TraceReader<R> {
    input: R,
    buf: Vec<u8>,
    line: String,
    line_no: usize,
    state: ReaderState,
}

impl TraceReader<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(BufReader::new(File::open(path)?)))
    }
}

impl<R: BufRead> TraceReader<R> {
    pub fn new(input: R) -> Self {
        TraceReader { input, buf: Vec::new(), line: String::new(), line_no: 0, state: ReaderState::Seeking }
    }

    pub fn state(&self) -> ReaderState {
        self.state
    }

    /// Number and text of the last line read, for diagnostics.
    pub fn position(&self) -> (usize, &str) {
        (self.line_no, &self.line)
    }

    /// Advance to the next recognised line and classify it.
    ///
    /// Returns [`RecordKind::End`] once the input is exhausted. Calling it
    /// again after that is an `EndOfStream` error.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<RecordKind> {
        if self.state == ReaderState::End {
            return Err(ReplayError::EndOfStream);
        }

        loop {
            self.buf.clear();
            if self.input.read_until(b'\n', &mut self.buf)? == 0 {
                self.line.clear();
                self.state = ReaderState::End;
                return Ok(RecordKind::End);
            }
            self.line_no += 1;
            // log output may carry non-UTF-8 text; only record lines need to be readable
            self.line = String::from_utf8_lossy(&self.buf).into_owned();
            let trimmed = self.line.trim_end_matches(['\n', '\r']).len();
            self.line.truncate(trimmed);

            let (state, kind) = match self.line.split_whitespace().next() {
                Some("@tree") | Some("@tree:") => (ReaderState::HaveTree, RecordKind::Tree),
                Some("@subtree") => (ReaderState::HaveSubtree, RecordKind::Subtree),
                Some("@insertion") => (ReaderState::HaveInsertion, RecordKind::Insertion),
                _ => continue,
            };
            self.state = state;
            return Ok(kind);
        }
    }

    fn require(&self, wanted: ReaderState) -> Result<()> {
        if self.state == wanted {
            Ok(())
        } else {
            Err(ReplayError::StateMismatch { expected: wanted.label(), found: self.state.label() })
        }
    }

    fn malformed(&self, reason: impl Into<String>) -> ReplayError {
        ReplayError::MalformedRecord { line: self.line_no, reason: reason.into() }
    }

    /// Whitespace-separated names between the first `(` and the first `)`.
    fn tip_list(&self) -> Result<Vec<String>> {
        let open = self.line.find('(').ok_or_else(|| self.malformed("missing '('"))?;
        let close = self.line.find(')').ok_or_else(|| self.malformed("missing ')'"))?;
        if close < open {
            return Err(self.malformed("')' before '('"));
        }

        let mut tips: Vec<String> = self.line[open + 1..close]
            .split_whitespace()
            .map(str::to_string)
            .collect();
        tips.sort();
        Ok(tips)
    }

    /// Topology string of the current `@tree` line.
    pub fn get_tree(&self) -> Result<String> {
        self.require(ReaderState::HaveTree)?;
        let open = self.line.find('(').ok_or_else(|| self.malformed("tree record without topology"))?;
        Ok(self.line[open..].to_string())
    }

    /// Sorted tip names of the current `@subtree` line.
    pub fn get_subtree(&self) -> Result<Vec<String>> {
        self.require(ReaderState::HaveSubtree)?;
        self.tip_list()
    }

    /// Tip list and raw score of the current `@insertion` line.
    pub fn get_insertion(&self) -> Result<Insertion> {
        self.require(ReaderState::HaveInsertion)?;
        let tips = self.tip_list()?;
        let score_token = self.line.split_whitespace().nth(1).map(str::to_string);
        Ok(Insertion { tips, score_token, line: self.line_no })
    }

    /// [`next`](Self::next) followed by the matching accessor.
    pub fn next_record(&mut self) -> Result<TraceRecord> {
        Ok(match self.next()? {
            RecordKind::Tree => TraceRecord::Tree(self.get_tree()?),
            RecordKind::Subtree => TraceRecord::Subtree(self.get_subtree()?),
            RecordKind::Insertion => TraceRecord::Insertion(self.get_insertion()?),
            RecordKind::End => TraceRecord::End,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn reader(text: &str) -> TraceReader<Cursor<Vec<u8>>> {
        TraceReader::new(Cursor::new(text.as_bytes().to_vec()))
    }

    #[test]
    fn test_classification_and_skipping() {
        let mut tr = reader(
            "starting search\n\
             @tree (A,B,(C,D));\n\
             \n\
             # comment\n\
             @tree: (A,C,(B,D));\n\
             @subtree (C D)\n\
             lnl: -1234.5\n\
             @insertion 0.5 (A B)\n\
             @treehouse (X)\n",
        );

        assert_eq!(tr.next().unwrap(), RecordKind::Tree);
        assert_eq!(tr.next().unwrap(), RecordKind::Tree);
        assert_eq!(tr.next().unwrap(), RecordKind::Subtree);
        assert_eq!(tr.next().unwrap(), RecordKind::Insertion);
        assert_eq!(tr.next().unwrap(), RecordKind::End);
        assert_eq!(tr.state(), ReaderState::End);
        assert!(matches!(tr.next(), Err(ReplayError::EndOfStream)));
    }

    #[test]
    fn test_non_utf8_lines_are_skipped() {
        let mut tr = TraceReader::new(Cursor::new(b"\xff\xfe junk\n@subtree (B \xe9A)\nlog: caf\xe9\n@tree (A,B);\n".to_vec()));

        assert_eq!(tr.next().unwrap(), RecordKind::Subtree);
        assert_eq!(tr.position().0, 2);
        assert_eq!(tr.get_subtree().unwrap(), vec!["B", "\u{FFFD}A"]);
        assert_eq!(tr.next().unwrap(), RecordKind::Tree);
        assert_eq!(tr.position(), (4, "@tree (A,B);"));
    }

    #[test]
    fn test_empty_input() {
        let mut tr = reader("");
        assert_eq!(tr.next().unwrap(), RecordKind::End);
    }

    #[test]
    fn test_get_tree() {
        let mut tr = reader("@tree: lnl=-12.5 (A:1,B:2,(C,D));\r\n");
        tr.next().unwrap();
        assert_eq!(tr.get_tree().unwrap(), "(A:1,B:2,(C,D));");
    }

    #[test]
    fn test_subtree_names_sorted() {
        let mut tr = reader("@subtree ( D  C\tB )\n");
        tr.next().unwrap();
        assert_eq!(tr.get_subtree().unwrap(), vec!["B", "C", "D"]);
    }

    #[test]
    fn test_insertion_record() {
        let mut tr = reader("@insertion -3.25 (B A)\n");
        tr.next().unwrap();
        let ins = tr.get_insertion().unwrap();
        assert_eq!(ins.tips, vec!["A", "B"]);
        assert_eq!(ins.score().unwrap(), -3.25);
    }

    #[test]
    fn test_missing_score_surfaces_on_use() {
        let mut tr = reader("@insertion (A B)\n");
        assert_eq!(tr.next().unwrap(), RecordKind::Insertion);

        let ins = tr.get_insertion().unwrap();
        assert_eq!(ins.tips, vec!["A", "B"]);
        assert!(matches!(ins.score(), Err(ReplayError::MalformedRecord { line: 1, .. })));

        let mut tr = reader("@insertion\n");
        tr.next().unwrap();
        assert!(matches!(tr.get_insertion(), Err(ReplayError::MalformedRecord { .. })));
    }

    #[test]
    fn test_non_numeric_score() {
        let mut tr = reader("\n@insertion abc (A B)\n");
        tr.next().unwrap();
        let ins = tr.get_insertion().unwrap();
        match ins.score() {
            Err(ReplayError::MalformedRecord { line, reason }) => {
                assert_eq!(line, 2);
                assert!(reason.contains("abc"));
            }
            other => panic!("expected MalformedRecord, got {other:?}"),
        }
    }

    #[test]
    fn test_state_mismatch() {
        let mut tr = reader("@subtree (C D)\n");
        assert!(matches!(
            tr.get_tree(),
            Err(ReplayError::StateMismatch { expected: "tree", found: "no" })
        ));

        tr.next().unwrap();
        assert!(matches!(
            tr.get_insertion(),
            Err(ReplayError::StateMismatch { expected: "insertion", found: "subtree" })
        ));
        assert!(tr.get_subtree().is_ok());
    }

    #[test]
    fn test_missing_parentheses() {
        let mut tr = reader("@subtree C D\n@subtree )C D(\n@tree ;\n");
        tr.next().unwrap();
        assert!(matches!(tr.get_subtree(), Err(ReplayError::MalformedRecord { line: 1, .. })));
        tr.next().unwrap();
        assert!(matches!(tr.get_subtree(), Err(ReplayError::MalformedRecord { line: 2, .. })));
        tr.next().unwrap();
        assert!(matches!(tr.get_tree(), Err(ReplayError::MalformedRecord { line: 3, .. })));
    }

    #[test]
    fn test_position_tracks_last_line() {
        let mut tr = reader("noise\nmore noise\n@subtree (A)\nnoise\n");
        tr.next().unwrap();
        assert_eq!(tr.position(), (3, "@subtree (A)"));
        tr.next().unwrap();
        assert_eq!(tr.position().0, 4);
    }

    #[test]
    fn test_next_record() {
        let mut tr = reader("@tree (A,B,(C,D));\n@subtree (D C)\n@insertion 1e-3 (A B)\n");

        assert_eq!(tr.next_record().unwrap(), TraceRecord::Tree("(A,B,(C,D));".into()));
        assert_eq!(tr.next_record().unwrap(), TraceRecord::Subtree(vec!["C".into(), "D".into()]));
        match tr.next_record().unwrap() {
            TraceRecord::Insertion(ins) => assert_eq!(ins.score().unwrap(), 1e-3),
            other => panic!("expected insertion, got {other:?}"),
        }
        assert_eq!(tr.next_record().unwrap(), TraceRecord::End);
    }

    #[test]
    fn test_open_missing_file() {
        assert!(matches!(
            TraceReader::open("/definitely/not/here.trace"),
            Err(ReplayError::Io(_))
        ));
    }
}
