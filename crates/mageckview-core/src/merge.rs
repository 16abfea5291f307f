//! Joining guide statistics with raw counts and library membership.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{Result, ViewError};
use crate::record::{GuideRecord, GuideStats, Sample};

/// Library of guides whose ids are purely numeric (Calabrese set A).
pub const NUMERIC_LIBRARY: &str = "libA";
/// Library of every other guide (Calabrese set B, `GENE_n` ids).
pub const NAMED_LIBRARY: &str = "libB";

/// Raw count matrix: guide id → counts, one per sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CountTable {
    pub samples: Vec<Sample>,
    counts: HashMap<String, Vec<f64>>,
}

impl CountTable {
    pub fn new(samples: Vec<Sample>) -> Self {
        Self {
            samples,
            counts: HashMap::new(),
        }
    }

    /// Add the counts of one guide. The vector must have one entry per sample.
    pub fn insert(&mut self, guide: impl Into<String>, counts: Vec<f64>) -> Result<()> {
        let guide = guide.into();
        if counts.len() != self.samples.len() {
            return Err(ViewError::CountLengthMismatch {
                id: guide,
                expected: self.samples.len(),
                actual: counts.len(),
            });
        }
        self.counts.insert(guide, counts);
        Ok(())
    }

    pub fn get(&self, guide: &str) -> Option<&[f64]> {
        self.counts.get(guide).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Library {
    pub name: String,
    pub guides: HashSet<String>,
}

/// Explicit guide → library membership, from user supplied library files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LibraryAssignment {
    libraries: Vec<Library>,
}

impl LibraryAssignment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a library; returns its index.
    pub fn add<I, S>(&mut self, name: impl Into<String>, guides: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(Library {
            name: name.into(),
            guides: guides.into_iter().map(Into::into).collect(),
        })
    }

    pub fn push(&mut self, library: Library) -> usize {
        self.libraries.push(library);
        self.libraries.len() - 1
    }

    /// First registered library containing `guide`.
    pub fn library_of(&self, guide: &str) -> Option<&str> {
        self.libraries
            .iter()
            .find(|lib| lib.guides.contains(guide))
            .map(|lib| lib.name.as_str())
    }

    pub fn libraries(&self) -> &[Library] {
        &self.libraries
    }

    pub fn is_empty(&self) -> bool {
        self.libraries.is_empty()
    }
}

/// Library guess when no library files were supplied.
pub fn heuristic_library(guide: &str) -> &'static str {
    if !guide.is_empty() && guide.bytes().all(|b| b.is_ascii_digit()) {
        NUMERIC_LIBRARY
    } else {
        NAMED_LIBRARY
    }
}

/// Build guide records in `stats` order.
///
/// Every stats row needs counts in `counts`; a missing entry aborts the merge
/// with `IncompleteRecord`. An empty `libraries` counts as absent.
pub fn merge(
    counts: &CountTable,
    stats: Vec<GuideStats>,
    libraries: Option<&LibraryAssignment>,
) -> Result<Vec<GuideRecord>> {
    let libraries = libraries.filter(|l| !l.is_empty());
    let n = counts.samples.len();
    let mut out = Vec::with_capacity(stats.len());
    for row in stats {
        let Some(guide_counts) = counts.get(&row.sgrna) else {
            return Err(ViewError::IncompleteRecord { guide: row.sgrna });
        };
        if guide_counts.len() != n {
            return Err(ViewError::CountLengthMismatch {
                id: row.sgrna,
                expected: n,
                actual: guide_counts.len(),
            });
        }
        let library = match libraries {
            Some(assignment) => assignment.library_of(&row.sgrna).map(str::to_string),
            None => Some(heuristic_library(&row.sgrna).to_string()),
        };
        out.push(GuideRecord::new(row, library, guide_counts.to_vec()));
    }
    tracing::debug!(
        guides = out.len(),
        explicit_libraries = libraries.is_some(),
        "guide records merged"
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> CountTable {
        let mut t = CountTable::new(vec![Sample::new("s0", 0), Sample::new("s1", 1)]);
        t.insert("123", vec![1.0, 2.0]).unwrap();
        t.insert("TP53_1", vec![3.0, 4.0]).unwrap();
        t
    }

    #[test]
    fn heuristic_assigns_numeric_ids_to_lib_a() {
        let stats = vec![GuideStats::bare("TP53_1", "TP53"), GuideStats::bare("123", "X")];
        let merged = merge(&table(), stats, None).unwrap();
        assert_eq!(merged[0].id(), "TP53_1");
        assert_eq!(merged[0].library.as_deref(), Some(NAMED_LIBRARY));
        assert_eq!(merged[1].library.as_deref(), Some(NUMERIC_LIBRARY));
        assert_eq!(merged[1].counts, vec![1.0, 2.0]);
    }

    #[test]
    fn explicit_assignment_leaves_unknown_guides_unset() {
        let mut libs = LibraryAssignment::new();
        libs.add("brunello", ["TP53_1"]);
        let stats = vec![GuideStats::bare("123", "X"), GuideStats::bare("TP53_1", "TP53")];
        let merged = merge(&table(), stats, Some(&libs)).unwrap();
        assert_eq!(merged[0].library, None);
        assert_eq!(merged[1].library.as_deref(), Some("brunello"));
    }

    #[test]
    fn first_matching_library_wins() {
        let mut libs = LibraryAssignment::new();
        assert_eq!(libs.add("first", ["a", "b"]), 0);
        assert_eq!(libs.add("second", ["b"]), 1);
        assert_eq!(libs.library_of("b"), Some("first"));
        assert_eq!(libs.library_of("c"), None);
    }

    #[test]
    fn missing_counts_abort_the_merge() {
        let stats = vec![GuideStats::bare("TP53_1", "TP53"), GuideStats::bare("nope", "X")];
        assert_eq!(
            merge(&table(), stats, None).unwrap_err(),
            ViewError::IncompleteRecord {
                guide: "nope".to_string()
            }
        );
    }

    #[test]
    fn count_table_rejects_wrong_lengths() {
        let mut t = table();
        assert!(t.insert("bad", vec![1.0]).is_err());
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn empty_string_is_not_numeric() {
        assert_eq!(heuristic_library(""), NAMED_LIBRARY);
        assert_eq!(heuristic_library("0042"), NUMERIC_LIBRARY);
    }
}
