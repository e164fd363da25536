//! Revision computation.

use loggit_types::Revision;
use sha2::{Digest, Sha256};

/// Computes the revision that follows `previous` for the given content.
///
/// The generation increments by one; the hash covers the document content
/// and the previous revision, so identical edits made on two replicas from
/// the same parent produce the same revision.
pub fn next_revision(
    previous: Option<&Revision>,
    id: &str,
    name: &str,
    date: &str,
    deleted: bool,
) -> Revision {
    let generation = previous.map_or(1, |rev| rev.generation + 1);

    let mut hasher = Sha256::new();
    hasher.update(id.as_bytes());
    hasher.update([0]);
    hasher.update(name.as_bytes());
    hasher.update([0]);
    hasher.update(date.as_bytes());
    hasher.update([0, u8::from(deleted), 0]);
    if let Some(prev) = previous {
        hasher.update(prev.to_string().as_bytes());
    }
    let digest = hex::encode(hasher.finalize());

    Revision::new(generation, &digest[..32])
}
