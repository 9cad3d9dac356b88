use crate::ids::{Digest, FileName, ObsId};

#[cfg(feature = "chrono")]
pub type CreateTime = chrono::DateTime<chrono::Utc>;
#[cfg(not(feature = "chrono"))]
pub type CreateTime = i64;

/// A cataloged, immutable named artifact.
///
/// `name` is the catalog key; `(size, digest)` are caller-supplied and
/// immutable post-creation (§3).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct File {
    pub name: FileName,
    pub file_type: String,
    pub source: String,
    pub size: i64,
    pub digest: Digest,
    pub create_time: CreateTime,
    pub obsid: Option<ObsId>,
}

impl File {
    pub fn path_has_no_separator(&self) -> bool {
        !self.name.as_str().contains('/') && !self.name.as_str().contains('\\')
    }
}

/// A denormalized snapshot of a `File` and its `Observation`/`Session`,
/// used to recreate records on a peer librarian (the "rec-info" of the
/// glossary).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FileRecInfo {
    pub name: String,
    pub file_type: String,
    pub source: String,
    pub size: i64,
    pub digest: String,
    pub create_time: CreateTime,
    pub obsid: Option<i64>,
    pub session_id: Option<i64>,
    pub start_time_jd: Option<f64>,
    pub stop_time_jd: Option<f64>,
}
