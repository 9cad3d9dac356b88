use crate::ids::StandingOrderId;

/// The operating mode of a standing order, or of the replication engine as
/// a whole (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "text", rename_all = "lowercase"))]
pub enum StandingOrderMode {
    Normal,
    Disabled,
    Nighttime,
}

impl Default for StandingOrderMode {
    fn default() -> Self {
        StandingOrderMode::Normal
    }
}

/// An administrator-defined subscription consisting of a search and a
/// destination peer connection, driving replication.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StandingOrder {
    pub id: StandingOrderId,
    pub name: String,
    /// Raw JSON text of the search clause tree; parsed by the search
    /// compiler, not by this crate.
    pub search: String,
    pub conn_name: String,
    pub mode: StandingOrderMode,
}

impl StandingOrder {
    /// The stable event-type string this order's successful copies record.
    pub fn success_event_type(&self) -> String {
        crate::event::event_type::standing_order_succeeded(&self.name)
    }
}
