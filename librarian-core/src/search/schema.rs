use std::collections::HashMap;

/// Which catalog entity a search is being compiled against (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    File,
    Observation,
    ObservingSession,
}

/// The scalar type of a registered attribute, used to validate clause
/// payloads against the attribute they name (§9 "per-attribute clause
/// expansion": `clause = {attr, op, payload}; validate op against attr's
/// type table`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrType {
    Text,
    Int,
    Float,
    Bool,
}

/// Whether an attribute is stored directly on the entity's table or derived
/// from a join/aggregate (e.g. `num_instances`, `duration`, `age`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrKind {
    Stored,
    Derived,
}

#[derive(Debug, Clone, Copy)]
pub struct AttrSchema {
    pub name: &'static str,
    pub ty: AttrType,
    pub kind: AttrKind,
}

/// Attribute table for one entity kind (§4.3's three registered schemas).
#[derive(Debug, Clone)]
pub struct EntitySchema {
    pub kind: EntityKind,
    attrs: HashMap<&'static str, AttrSchema>,
}

impl EntitySchema {
    fn new(kind: EntityKind, attrs: &[AttrSchema]) -> Self {
        Self {
            kind,
            attrs: attrs.iter().map(|a| (a.name, *a)).collect(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&AttrSchema> {
        self.attrs.get(name)
    }

    pub fn file() -> Self {
        Self::new(
            EntityKind::File,
            &[
                AttrSchema {
                    name: "name",
                    ty: AttrType::Text,
                    kind: AttrKind::Stored,
                },
                AttrSchema {
                    name: "type",
                    ty: AttrType::Text,
                    kind: AttrKind::Stored,
                },
                AttrSchema {
                    name: "source",
                    ty: AttrType::Text,
                    kind: AttrKind::Stored,
                },
                AttrSchema {
                    name: "size",
                    ty: AttrType::Int,
                    kind: AttrKind::Stored,
                },
                AttrSchema {
                    name: "obsid",
                    ty: AttrType::Int,
                    kind: AttrKind::Stored,
                },
                AttrSchema {
                    name: "num-instances",
                    ty: AttrType::Int,
                    kind: AttrKind::Derived,
                },
                AttrSchema {
                    name: "create_time",
                    ty: AttrType::Float,
                    kind: AttrKind::Stored,
                },
            ],
        )
    }

    pub fn observation() -> Self {
        Self::new(
            EntityKind::Observation,
            &[
                AttrSchema {
                    name: "obsid",
                    ty: AttrType::Int,
                    kind: AttrKind::Stored,
                },
                AttrSchema {
                    name: "start_time_jd",
                    ty: AttrType::Float,
                    kind: AttrKind::Stored,
                },
                AttrSchema {
                    name: "stop_time_jd",
                    ty: AttrType::Float,
                    kind: AttrKind::Stored,
                },
                AttrSchema {
                    name: "start_lst_hr",
                    ty: AttrType::Float,
                    kind: AttrKind::Stored,
                },
                AttrSchema {
                    name: "session_id",
                    ty: AttrType::Int,
                    kind: AttrKind::Stored,
                },
                AttrSchema {
                    name: "duration",
                    ty: AttrType::Float,
                    kind: AttrKind::Derived,
                },
                AttrSchema {
                    name: "num_files",
                    ty: AttrType::Int,
                    kind: AttrKind::Derived,
                },
                AttrSchema {
                    name: "total_size",
                    ty: AttrType::Int,
                    kind: AttrKind::Derived,
                },
            ],
        )
    }

    pub fn observing_session() -> Self {
        Self::new(
            EntityKind::ObservingSession,
            &[
                AttrSchema {
                    name: "session_id",
                    ty: AttrType::Int,
                    kind: AttrKind::Stored,
                },
                AttrSchema {
                    name: "start_time_jd",
                    ty: AttrType::Float,
                    kind: AttrKind::Stored,
                },
                AttrSchema {
                    name: "stop_time_jd",
                    ty: AttrType::Float,
                    kind: AttrKind::Stored,
                },
                AttrSchema {
                    name: "duration",
                    ty: AttrType::Float,
                    kind: AttrKind::Derived,
                },
                AttrSchema {
                    name: "num_obs",
                    ty: AttrType::Int,
                    kind: AttrKind::Derived,
                },
                AttrSchema {
                    name: "num_files",
                    ty: AttrType::Int,
                    kind: AttrKind::Derived,
                },
                AttrSchema {
                    name: "age",
                    ty: AttrType::Float,
                    kind: AttrKind::Derived,
                },
            ],
        )
    }

    pub fn for_kind(kind: EntityKind) -> Self {
        match kind {
            EntityKind::File => Self::file(),
            EntityKind::Observation => Self::observation(),
            EntityKind::ObservingSession => Self::observing_session(),
        }
    }
}
