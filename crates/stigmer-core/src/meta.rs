//! Metadata stamping for create and update pipelines.

use stigmer_api::Resource;
use stigmer_api::v1::AuditFields;

use crate::clock::Clock;
use crate::id::IdGenerator;
use crate::slug::slugify;

/// Initialize metadata on a freshly created resource: generate the id,
/// derive the slug, stamp `created_at = updated_at = now`, `version = 1`.
pub fn init_metadata<R: Resource>(resource: &mut R, ids: &IdGenerator, clock: &dyn Clock) {
    let now = clock.now_rfc3339();
    let id = ids.next_id(R::KIND);
    let meta = resource.meta_mut();
    meta.id = id;
    if meta.slug.is_empty() {
        meta.slug = slugify(&meta.name);
    }
    meta.audit = Some(AuditFields {
        created_at: now.clone(),
        updated_at: now,
        version: 1,
    });
}

/// Carry identity from the existing resource into an updated state:
/// preserve `id`, `org`, and `created_at`, bump `version`, refresh
/// `updated_at`.
pub fn advance_metadata<R: Resource>(existing: &R, updated: &mut R, clock: &dyn Clock) {
    let now = clock.now_rfc3339();
    let existing_meta = existing.meta();
    let existing_audit = existing_meta.and_then(|m| m.audit.as_ref());

    let id = existing_meta.map_or("", |m| m.id.as_str()).to_string();
    let org = existing_meta.map_or("", |m| m.org.as_str()).to_string();
    let name = existing_meta.map_or("", |m| m.name.as_str()).to_string();
    let slug = existing_meta.map_or("", |m| m.slug.as_str()).to_string();
    let created_at = existing_audit.map_or("", |a| a.created_at.as_str()).to_string();
    let version = existing_audit.map_or(0, |a| a.version);

    let meta = updated.meta_mut();
    meta.id = id;
    meta.org = org;
    if meta.name.is_empty() {
        meta.name = name;
    }
    meta.slug = slug;
    meta.audit = Some(AuditFields {
        created_at,
        updated_at: now,
        version: version.saturating_add(1),
    });
}

/// Current audit version of a resource, 0 when unset.
#[must_use]
pub fn version_of<R: Resource>(resource: &R) -> u64 {
    resource
        .meta()
        .and_then(|m| m.audit.as_ref())
        .map_or(0, |a| a.version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::{TimeZone, Utc};
    use stigmer_api::v1::{Agent, ApiResourceMetadata};

    fn clock() -> FixedClock {
        FixedClock(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap())
    }

    fn named_agent(name: &str) -> Agent {
        Agent {
            metadata: Some(ApiResourceMetadata {
                name: name.to_string(),
                org: "acme".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn init_generates_id_slug_and_audit() {
        let ids = IdGenerator::new();
        let mut agent = named_agent("PR Reviewer");

        init_metadata(&mut agent, &ids, &clock());

        let meta = agent.metadata.as_ref().unwrap();
        assert!(meta.id.starts_with("agt-"));
        assert_eq!(meta.slug, "pr-reviewer");
        let audit = meta.audit.as_ref().unwrap();
        assert_eq!(audit.version, 1);
        assert_eq!(audit.created_at, audit.updated_at);
    }

    #[test]
    fn advance_preserves_identity_and_bumps_version() {
        let ids = IdGenerator::new();
        let mut existing = named_agent("Reviewer");
        init_metadata(&mut existing, &ids, &clock());

        let later = FixedClock(Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap());
        let mut updated = named_agent("Reviewer");
        advance_metadata(&existing, &mut updated, &later);

        let old_meta = existing.metadata.as_ref().unwrap();
        let new_meta = updated.metadata.as_ref().unwrap();
        assert_eq!(new_meta.id, old_meta.id);
        assert_eq!(new_meta.slug, old_meta.slug);
        let old_audit = old_meta.audit.as_ref().unwrap();
        let new_audit = new_meta.audit.as_ref().unwrap();
        assert_eq!(new_audit.created_at, old_audit.created_at);
        assert_eq!(new_audit.version, 2);
        assert_ne!(new_audit.updated_at, old_audit.updated_at);
    }

    #[test]
    fn version_of_unset_is_zero() {
        assert_eq!(version_of(&Agent::default()), 0);
    }
}
