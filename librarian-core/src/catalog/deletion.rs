//! `delete_instances` (§4.1). Only `Standard` and `Noop` ship: see
//! DESIGN.md's Open Question decisions for why the source's ambiguous
//! total-deletion mode was not carried forward.

use super::{CatalogBackend, DeletionMode};
use crate::error::{LibrarianError, Result};
use librarian_model::{DeletionPolicy, FileInstance, FileName, StoreId};

/// Remove instances of `name` whose `deletion_policy` is `Allowed`,
/// optionally restricted to one store. `Noop` performs the lookup and
/// returns zero without mutating anything, which is useful for a caller
/// that wants to preview whether a delete would refuse.
pub async fn delete_instances(
    catalog: &dyn CatalogBackend,
    name: &FileName,
    mode: DeletionMode,
    restrict_to_store: Option<StoreId>,
) -> Result<u64> {
    if mode == DeletionMode::Noop {
        return Ok(0);
    }

    let instances = catalog.list_instances(name).await?;
    let in_scope: Vec<&FileInstance> = instances
        .iter()
        .filter(|i| restrict_to_store.is_none_or(|store| i.store_id == store))
        .collect();

    let deletable: Vec<StoreId> = in_scope
        .iter()
        .filter(|i| i.deletion_policy.is_allowed())
        .map(|i| i.store_id)
        .collect();

    if deletable.is_empty() {
        return Ok(0);
    }

    let would_remain = instances.len() - deletable.len();
    if would_remain == 0 {
        return Err(LibrarianError::BadRequest(format!(
            "deleting all instances of {name} would leave the file with no copies; \
             standard deletion mode refuses this"
        )));
    }

    catalog.remove_instances(name, &deletable).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::memory::InMemoryCatalog;
    use librarian_model::{DeletionPolicy, File, FileInstance};

    async fn seed_file_with_instances(
        catalog: &InMemoryCatalog,
        name: &str,
        policies: &[(i64, DeletionPolicy)],
    ) -> FileName {
        let file_name = FileName::new(name).unwrap();
        let file = File {
            name: file_name.clone(),
            file_type: "uvh5".into(),
            source: "correlator".into(),
            size: 10,
            digest: librarian_model::Digest::new("deadbeef").unwrap(),
            create_time: chrono::Utc::now(),
            obsid: None,
        };
        catalog.create_file(&file).await.unwrap();
        for (store_id, policy) in policies {
            catalog
                .register_instance(&FileInstance {
                    store_id: StoreId(*store_id),
                    parent_dirs: "data".into(),
                    name: file_name.clone(),
                    deletion_policy: *policy,
                })
                .await
                .unwrap();
        }
        file_name
    }

    #[tokio::test]
    async fn refuses_to_delete_the_last_instance() {
        let catalog = InMemoryCatalog::new();
        let name =
            seed_file_with_instances(&catalog, "only.uv", &[(1, DeletionPolicy::Allowed)]).await;
        let err = delete_instances(&catalog, &name, DeletionMode::Standard, None)
            .await
            .unwrap_err();
        assert!(matches!(err, LibrarianError::BadRequest(_)));
    }

    #[tokio::test]
    async fn removes_allowed_instances_when_others_remain() {
        let catalog = InMemoryCatalog::new();
        let name = seed_file_with_instances(
            &catalog,
            "dup.uv",
            &[(1, DeletionPolicy::Allowed), (2, DeletionPolicy::Disallowed)],
        )
        .await;
        let removed = delete_instances(&catalog, &name, DeletionMode::Standard, None)
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(catalog.list_instances(&name).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn noop_mode_never_mutates() {
        let catalog = InMemoryCatalog::new();
        let name =
            seed_file_with_instances(&catalog, "noop.uv", &[(1, DeletionPolicy::Allowed)]).await;
        let removed = delete_instances(&catalog, &name, DeletionMode::Noop, None)
            .await
            .unwrap();
        assert_eq!(removed, 0);
        assert_eq!(catalog.list_instances(&name).await.unwrap().len(), 1);
    }
}
