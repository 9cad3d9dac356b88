use crate::ids::{FileName, StoreId};

/// Whether a `FileInstance` may be deleted by the standard deletion path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "text", rename_all = "lowercase"))]
pub enum DeletionPolicy {
    Disallowed,
    Allowed,
}

impl DeletionPolicy {
    pub fn is_allowed(self) -> bool {
        matches!(self, DeletionPolicy::Allowed)
    }
}

/// A physical copy of a `File` on a particular `Store` at a particular path.
///
/// Identity is the composite `(store_id, parent_dirs, name)`; a unique index
/// on `name` alone supports the "any instance" lookup (§3).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct FileInstance {
    pub store_id: StoreId,
    pub parent_dirs: String,
    pub name: FileName,
    pub deletion_policy: DeletionPolicy,
}

impl FileInstance {
    /// Store-relative path: `parent_dirs/name`.
    pub fn store_path(&self) -> String {
        if self.parent_dirs.is_empty() {
            self.name.as_str().to_string()
        } else {
            format!("{}/{}", self.parent_dirs.trim_end_matches('/'), self.name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_path_joins_parent_and_name() {
        let inst = FileInstance {
            store_id: StoreId(1),
            parent_dirs: "2459000".into(),
            name: FileName::new("zen.uv").unwrap(),
            deletion_policy: DeletionPolicy::Disallowed,
        };
        assert_eq!(inst.store_path(), "2459000/zen.uv");
    }

    #[test]
    fn store_path_without_parent() {
        let inst = FileInstance {
            store_id: StoreId(1),
            parent_dirs: String::new(),
            name: FileName::new("zen.uv").unwrap(),
            deletion_policy: DeletionPolicy::Allowed,
        };
        assert_eq!(inst.store_path(), "zen.uv");
    }
}
