//! Resolves a file name to an obsid when none was supplied at registration
//! time (§6 "Obsid inference modes"). [`librarian_config::infer_obsid`]
//! handles the name-only part of this; `hera` and `so` names don't carry the
//! obsid directly, so this module does the catalog lookup that original's
//! `infer_file_obsid` does against the ORM: find existing files sharing the
//! inferred prefix and require that they all agree on a single obsid.

use librarian_config::{InferredObsid, ObsidInferenceMode};
use librarian_model::ObsId;

use crate::catalog::CatalogBackend;
use crate::error::{LibrarianError, Result};
use crate::search::clause::Clause;

/// Infer the obsid for a newly-seen file name, consulting the catalog for
/// the `hera`/`so` name-prefix modes.
pub async fn resolve_obsid(
    catalog: &dyn CatalogBackend,
    mode: ObsidInferenceMode,
    file_name: &str,
) -> Result<ObsId> {
    match librarian_config::infer_obsid(mode, file_name)? {
        InferredObsid::Direct(obsid) => Ok(ObsId(obsid)),
        InferredObsid::NamePrefix(prefix) => {
            let separator = match mode {
                ObsidInferenceMode::Hera => '.',
                _ => '_',
            };
            resolve_by_prefix(catalog, &prefix, separator, file_name).await
        }
    }
}

async fn resolve_by_prefix(
    catalog: &dyn CatalogBackend,
    prefix: &str,
    separator: char,
    file_name: &str,
) -> Result<ObsId> {
    let clause = Clause::AttrMatches {
        attr: "name".into(),
        pattern: format!("{prefix}{separator}%"),
    };
    let mut candidates: Vec<ObsId> = catalog
        .search_files(&clause)
        .await?
        .into_iter()
        .filter_map(|f| f.obsid)
        .collect();
    candidates.sort();
    candidates.dedup();

    match candidates.len() {
        1 => Ok(candidates[0]),
        0 => Err(LibrarianError::BadRequest(format!(
            "need to infer obsid of file {file_name:?}, but no similarly-named files are on record"
        ))),
        n => Err(LibrarianError::BadRequest(format!(
            "need to infer obsid of file {file_name:?}, but got {n} candidate obsids from similarly-named files"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::memory::InMemoryCatalog;
    use librarian_model::{Digest, File, FileName};

    async fn seed(catalog: &InMemoryCatalog, name: &str, obsid: i64) {
        catalog
            .create_file(&File {
                name: FileName::new(name).unwrap(),
                file_type: "uv".into(),
                source: "correlator".into(),
                size: 1,
                digest: Digest::new("deadbeef").unwrap(),
                create_time: chrono::Utc::now(),
                obsid: Some(ObsId(obsid)),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn hera_prefix_resolves_when_exactly_one_candidate_obsid_exists() {
        let catalog = InMemoryCatalog::new();
        seed(&catalog, "zen.2458101.12345.uv", 2458101).await;
        seed(&catalog, "zen.2458101.12400.uv", 2458101).await;

        let obsid = resolve_obsid(&catalog, ObsidInferenceMode::Hera, "zen.2458101.99999.uv")
            .await
            .unwrap();
        assert_eq!(obsid, ObsId(2458101));
    }

    #[tokio::test]
    async fn hera_prefix_fails_when_no_candidates_exist() {
        let catalog = InMemoryCatalog::new();
        let err = resolve_obsid(&catalog, ObsidInferenceMode::Hera, "zen.2458101.99999.uv")
            .await
            .unwrap_err();
        assert!(matches!(err, LibrarianError::BadRequest(_)));
    }

    #[tokio::test]
    async fn hera_prefix_fails_when_candidates_disagree_on_obsid() {
        let catalog = InMemoryCatalog::new();
        seed(&catalog, "zen.2458101.12345.uv", 2458101).await;
        seed(&catalog, "zen.2458101.12400.uv", 2458102).await;

        let err = resolve_obsid(&catalog, ObsidInferenceMode::Hera, "zen.2458101.99999.uv")
            .await
            .unwrap_err();
        assert!(matches!(err, LibrarianError::BadRequest(_)));
    }

    #[tokio::test]
    async fn testing_mode_resolves_directly_without_touching_the_catalog() {
        let catalog = InMemoryCatalog::new();
        let obsid = resolve_obsid(&catalog, ObsidInferenceMode::Testing, "x.2459000.5.uv")
            .await
            .unwrap();
        assert_eq!(obsid, ObsId(librarian_config::infer_obsid(
            ObsidInferenceMode::Testing,
            "x.2459000.5.uv",
        )
        .map(|inferred| match inferred {
            InferredObsid::Direct(n) => n,
            InferredObsid::NamePrefix(_) => unreachable!(),
        })
        .unwrap()));
    }
}
