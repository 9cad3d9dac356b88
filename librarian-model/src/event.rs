use crate::file::CreateTime;
use crate::ids::FileName;

/// Stable event-type strings produced by the catalog (§4.1).
pub mod event_type {
    pub const INSTANCE_CREATION: &str = "instance_creation";
    pub const INSTANCE_DELETION_POLICY_CHANGED: &str = "instance_deletion_policy_changed";
    pub const COPY_LAUNCHED: &str = "copy_launched";
    pub const COPY_FINISHED: &str = "copy_finished";

    /// Per-standing-order success marker; the spec requires this family to
    /// appear at most once per file per order (§8 property 5).
    pub fn standing_order_succeeded(order_name: &str) -> String {
        format!("standing_order_succeeded:{order_name}")
    }
}

/// An append-only log entry attached to a `File` recording a state change.
///
/// Never mutated or deleted once committed (§3, §8 property 4).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct FileEvent {
    pub name: FileName,
    pub time: CreateTime,
    pub event_type: String,
    pub payload: serde_json::Value,
}

impl FileEvent {
    pub fn new(
        name: FileName,
        time: CreateTime,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            name,
            time,
            event_type: event_type.into(),
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standing_order_event_type_is_namespaced() {
        assert_eq!(
            event_type::standing_order_succeeded("nrao-mirror"),
            "standing_order_succeeded:nrao-mirror"
        );
    }
}
