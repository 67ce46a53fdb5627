//! Kind-prefixed resource id generation.
//!
//! Ids are `<prefix>-<ulid>`, e.g. `agt-01J8ZK...`. A process-wide
//! generator produces monotonically non-decreasing ULIDs so ids sort by
//! creation order within a process.

use std::sync::Mutex;

use stigmer_api::v1::ApiResourceKind;
use ulid::Ulid;

/// Process-wide monotonic id generator.
pub struct IdGenerator {
    inner: Mutex<ulid::Generator>,
}

impl std::fmt::Debug for IdGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdGenerator").finish_non_exhaustive()
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self {
            inner: Mutex::new(ulid::Generator::new()),
        }
    }
}

impl IdGenerator {
    /// Create a new generator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a fresh id for the given kind.
    pub fn next_id(&self, kind: ApiResourceKind) -> String {
        let ulid = match self.inner.lock() {
            Ok(mut generator) => generator.generate().unwrap_or_else(|_| Ulid::new()),
            // A poisoned lock only means another id generation panicked;
            // fall back to a non-monotonic ULID rather than propagating.
            Err(_) => Ulid::new(),
        };
        format!("{}-{}", kind.id_prefix(), ulid)
    }
}

/// Split an id into its kind prefix and ULID parts.
/// Returns `None` when the id is not of the `<prefix>-<ulid>` shape.
#[must_use]
pub fn parse_id(id: &str) -> Option<(&str, &str)> {
    let (prefix, rest) = id.split_once('-')?;
    if prefix.is_empty() || rest.is_empty() {
        return None;
    }
    Some((prefix, rest))
}

/// Check that an id carries the prefix of the expected kind.
#[must_use]
pub fn id_matches_kind(id: &str, kind: ApiResourceKind) -> bool {
    parse_id(id).is_some_and(|(prefix, _)| prefix == kind.id_prefix())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_carry_kind_prefix() {
        let generator = IdGenerator::new();
        let id = generator.next_id(ApiResourceKind::Agent);
        assert!(id.starts_with("agt-"));
        assert!(id_matches_kind(&id, ApiResourceKind::Agent));
        assert!(!id_matches_kind(&id, ApiResourceKind::Workflow));
    }

    #[test]
    fn ids_are_unique_and_monotonic() {
        let generator = IdGenerator::new();
        let mut previous = String::new();
        for _ in 0..10_000 {
            let id = generator.next_id(ApiResourceKind::Session);
            assert!(id > previous, "{id} not after {previous}");
            previous = id;
        }
    }

    #[test]
    fn parse_id_rejects_malformed() {
        assert!(parse_id("").is_none());
        assert!(parse_id("agt").is_none());
        assert!(parse_id("agt-").is_none());
        assert_eq!(parse_id("agt-01J8"), Some(("agt", "01J8")));
    }
}
