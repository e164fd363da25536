//! Revision tags of replicated documents.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Number of revisions kept in a document's history.
pub const REVS_LIMIT: usize = 100;

/// A parsed `<generation>-<hash>` revision tag.
///
/// Revisions are totally ordered by generation, then by hash. Among
/// conflicting revisions of the same kind (both live or both deleted) the
/// larger one wins.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Revision {
    pub generation: u64,
    pub hash: String,
}

/// The revision tag is not of the form `<generation>-<hash>`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid revision tag: {0}")]
pub struct ParseRevisionError(pub String);

impl Revision {
    pub fn new(generation: u64, hash: impl Into<String>) -> Self {
        Self {
            generation,
            hash: hash.into(),
        }
    }
}

impl FromStr for Revision {
    type Err = ParseRevisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (generation, hash) = s
            .split_once('-')
            .ok_or_else(|| ParseRevisionError(s.to_string()))?;
        let generation = generation
            .parse::<u64>()
            .map_err(|_| ParseRevisionError(s.to_string()))?;
        if generation == 0 || hash.is_empty() {
            return Err(ParseRevisionError(s.to_string()));
        }
        Ok(Self::new(generation, hash))
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.generation, self.hash)
    }
}

/// Revision ancestry in the `_revisions` form used by the replication
/// protocol: the newest generation and the hashes, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionHistory {
    pub start: u64,
    pub ids: Vec<String>,
}

impl RevisionHistory {
    /// History holding only `rev`.
    pub fn root(rev: &Revision) -> Self {
        Self {
            start: rev.generation,
            ids: vec![rev.hash.clone()],
        }
    }

    /// History of a revision written on top of this one, capped at
    /// [`REVS_LIMIT`] entries.
    pub fn extend(&self, next: &Revision) -> Self {
        let mut ids = Vec::with_capacity(self.ids.len() + 1);
        ids.push(next.hash.clone());
        ids.extend(self.ids.iter().take(REVS_LIMIT - 1).cloned());
        Self {
            start: next.generation,
            ids,
        }
    }

    pub fn contains(&self, rev: &Revision) -> bool {
        rev.generation <= self.start
            && self
                .ids
                .get((self.start - rev.generation) as usize)
                .is_some_and(|hash| *hash == rev.hash)
    }

    /// Hashes of the ancestors, i.e. everything but the newest entry.
    pub fn ancestor_ids(&self) -> &[String] {
        self.ids.get(1..).unwrap_or_default()
    }
}
