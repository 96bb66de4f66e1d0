//! Sample project generation for seeding an owner's projects.

use projectstore_core::entity::{Entity, FieldMap, FIELD_DESCRIPTION, FIELD_NAME, FIELD_STATUS};
use projectstore_core::storage::{EntityRepository, WriteWarning};
use serde_json::{json, Value};

use super::error::Result;

const NAMES: [&str; 8] = [
    "Website redesign",
    "Quarterly report",
    "Mobile app",
    "Onboarding flow",
    "Data migration",
    "Customer survey",
    "Billing revamp",
    "Team offsite",
];

const STATUSES: [&str; 3] = ["active", "paused", "archived"];

/// A project to create, keyed so re-seeding the same owner is a no-op.
#[derive(Debug, Clone)]
pub struct SeedProject {
    pub idempotency_key: String,
    pub fields: FieldMap,
}

impl SeedProject {
    pub fn name(&self) -> &str {
        self.fields
            .get(FIELD_NAME)
            .and_then(Value::as_str)
            .unwrap_or_default()
    }
}

/// Generate `count` sample projects (pure function).
pub fn generate_seed_projects(count: u32) -> Vec<SeedProject> {
    (0..count as usize)
        .map(|i| {
            let base = NAMES[i % NAMES.len()];
            let name = if i < NAMES.len() {
                base.to_string()
            } else {
                format!("{} {}", base, i / NAMES.len() + 1)
            };

            let mut fields = FieldMap::new();
            fields.insert(FIELD_NAME.to_string(), json!(name));
            fields.insert(
                FIELD_DESCRIPTION.to_string(),
                json!(format!("Sample project #{}", i + 1)),
            );
            fields.insert(
                FIELD_STATUS.to_string(),
                json!(STATUSES[i % STATUSES.len()]),
            );
            fields.insert("priority".to_string(), json!((i % 5) + 1));
            fields.insert(
                "tags".to_string(),
                json!(["seed", if i % 2 == 0 { "internal" } else { "client" }]),
            );

            SeedProject {
                idempotency_key: format!("seed-{}", i),
                fields,
            }
        })
        .collect()
}

/// Create the projects for `owner_id`, returning them with any index warnings.
pub async fn seed_projects<R: EntityRepository + ?Sized>(
    repo: &R,
    owner_id: &str,
    projects: &[SeedProject],
) -> Result<(Vec<Entity>, Vec<WriteWarning>)> {
    let mut created = Vec::with_capacity(projects.len());
    let mut warnings = Vec::new();

    for project in projects {
        let outcome = repo
            .create_entity_idempotent(owner_id, project.fields.clone(), &project.idempotency_key)
            .await?;
        warnings.extend(outcome.warnings);
        created.push(outcome.value);
    }

    Ok((created, warnings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use projectstore::storage::InMemoryStore;
    use projectstore::{EntityStore, StoreConfig, TableNames};
    use projectstore_core::storage::PageRequest;

    #[test]
    fn test_generated_projects_have_unique_keys_and_names() {
        let projects = generate_seed_projects(12);

        assert_eq!(projects.len(), 12);
        assert_eq!(projects[0].name(), "Website redesign");
        assert_eq!(projects[8].name(), "Website redesign 2");

        let keys: HashSet<_> = projects.iter().map(|p| p.idempotency_key.as_str()).collect();
        assert_eq!(keys.len(), 12);
    }

    #[tokio::test]
    async fn test_reseeding_does_not_duplicate_projects() {
        let store = EntityStore::new(
            InMemoryStore::new(),
            StoreConfig::new(TableNames::new("projects", "user_projects")),
        );
        let projects = generate_seed_projects(3);

        let (first, warnings) = seed_projects(&store, "owner-1", &projects).await.unwrap();
        let (second, _) = seed_projects(&store, "owner-1", &projects).await.unwrap();

        assert!(warnings.is_empty());
        assert_eq!(
            first.iter().map(|e| &e.id).collect::<Vec<_>>(),
            second.iter().map(|e| &e.id).collect::<Vec<_>>()
        );

        let page = store
            .list_entities_by_owner("owner-1", PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.items.len(), 3);
    }
}
