use crate::ids::StoreId;

/// A remote machine with a filesystem root reachable over SSH-like transport.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Store {
    pub id: StoreId,
    pub name: String,
    pub ssh_host: String,
    pub path_prefix: String,
    pub http_prefix: Option<String>,
    pub available: bool,
}

impl Store {
    pub fn path_prefix_is_absolute(&self) -> bool {
        self.path_prefix.starts_with('/')
    }

    pub fn resolve(&self, relative_path: &str) -> String {
        format!(
            "{}/{}",
            self.path_prefix.trim_end_matches('/'),
            relative_path.trim_start_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> Store {
        Store {
            id: StoreId(1),
            name: "karoo".into(),
            ssh_host: "karoo.example.org".into(),
            path_prefix: "/data".into(),
            http_prefix: None,
            available: true,
        }
    }

    #[test]
    fn resolves_relative_paths_under_prefix() {
        assert_eq!(store().resolve("2459000/zen.uv"), "/data/2459000/zen.uv");
    }

    #[test]
    fn rejects_relative_path_prefix() {
        let mut s = store();
        s.path_prefix = "data".into();
        assert!(!s.path_prefix_is_absolute());
    }
}
