use super::clause::{self, Clause, ScalarValue};
use super::schema::{AttrKind, AttrType, EntityKind, EntitySchema};
use crate::error::{LibrarianError, Result};

/// Parse and validate a search against the schema registered for `entity`
/// (§4.3: "validate op against attr's type table; refuse unknown (attr, op)
/// pairs").
pub fn compile_for(entity: EntityKind, raw_json: &str) -> Result<Clause> {
    let tree = clause::compile(raw_json)?;
    let tree = if entity == EntityKind::File {
        proxy_file_attrs(tree)
    } else {
        tree
    };
    let schema = EntitySchema::for_kind(entity);
    validate(&tree, &schema, entity)?;
    Ok(tree)
}

/// `start_time_jd`, `stop_time_jd`, `start_lst_hr`, and `session_id` are
/// properties of an `Observation`, not a `File`, but a File search shouldn't
/// have to spell out `obs-matches` to use them — wrap any leaf clause that
/// names a stored Observation attribute File doesn't have in an implicit
/// `ObsMatches`, so it resolves to `File.obsid IN (SELECT obsid FROM
/// observations WHERE ...)` like the rest of the `obs-matches` machinery.
fn proxy_file_attrs(node: Clause) -> Clause {
    match node {
        Clause::And(parts) => Clause::And(parts.into_iter().map(proxy_file_attrs).collect()),
        Clause::Or(parts) => Clause::Or(parts.into_iter().map(proxy_file_attrs).collect()),
        Clause::NoneOf(parts) => Clause::NoneOf(parts.into_iter().map(proxy_file_attrs).collect()),
        leaf @ (Clause::AttrIsExactly { .. }
        | Clause::AttrIsNot { .. }
        | Clause::AttrMatches { .. }
        | Clause::AttrGreaterThan { .. }
        | Clause::AttrLessThan { .. }
        | Clause::AttrInRange { .. }
        | Clause::AttrNotInRange { .. }) => proxy_leaf_if_observation_attr(leaf),
        other => other,
    }
}

fn proxy_leaf_if_observation_attr(leaf: Clause) -> Clause {
    let attr = leaf_attr(&leaf);
    if EntitySchema::file().attr(attr).is_some() {
        return leaf;
    }
    match EntitySchema::observation().attr(attr) {
        Some(attr_schema) if attr_schema.kind == AttrKind::Stored => Clause::ObsMatches(Box::new(leaf)),
        _ => leaf,
    }
}

fn leaf_attr(leaf: &Clause) -> &str {
    match leaf {
        Clause::AttrIsExactly { attr, .. }
        | Clause::AttrIsNot { attr, .. }
        | Clause::AttrMatches { attr, .. }
        | Clause::AttrGreaterThan { attr, .. }
        | Clause::AttrLessThan { attr, .. }
        | Clause::AttrInRange { attr, .. }
        | Clause::AttrNotInRange { attr, .. } => attr,
        _ => unreachable!("leaf_attr called on a non-attribute clause"),
    }
}

fn validate(node: &Clause, schema: &EntitySchema, entity: EntityKind) -> Result<()> {
    match node {
        Clause::And(parts) | Clause::Or(parts) | Clause::NoneOf(parts) => {
            parts.iter().try_for_each(|p| validate(p, schema, entity))
        }
        Clause::AlwaysTrue | Clause::AlwaysFalse | Clause::ObsidIsNull => Ok(()),
        Clause::NotOlderThanDays(_) | Clause::NotNewerThanDays(_) => Ok(()),
        Clause::NoFileHasEvent(_) => {
            if entity == EntityKind::File {
                Ok(())
            } else {
                Err(LibrarianError::bad_search(
                    "no-file-has-event only applies to file searches",
                ))
            }
        }
        Clause::ObsMatches(inner) => {
            if entity != EntityKind::File {
                return Err(LibrarianError::bad_search(
                    "obs-matches only applies to file searches",
                ));
            }
            validate(inner, &EntitySchema::observation(), EntityKind::Observation)
        }
        Clause::AttrIsExactly { attr, value } | Clause::AttrIsNot { attr, value } => {
            let attr_schema = lookup(schema, attr)?;
            check_scalar_type(attr, attr_schema.ty, value)
        }
        Clause::AttrMatches { attr, .. } => {
            let attr_schema = lookup(schema, attr)?;
            if attr_schema.ty != AttrType::Text {
                return Err(LibrarianError::bad_search(format!(
                    "{attr} does not support text matching"
                )));
            }
            Ok(())
        }
        Clause::AttrGreaterThan { attr, .. } | Clause::AttrLessThan { attr, .. } => {
            check_numeric(schema, attr)
        }
        Clause::AttrInRange { attr, .. } | Clause::AttrNotInRange { attr, .. } => {
            check_numeric(schema, attr)
        }
    }
}

/// Derived attributes (`num-instances`, `duration`, `age`, ...) are computed
/// by aggregation, not stored in a column a predicate can reference; the
/// compiler refuses clauses naming them rather than emit SQL against a
/// nonexistent column.
fn lookup<'a>(schema: &'a EntitySchema, attr: &str) -> Result<&'a crate::search::AttrSchema> {
    let attr_schema = schema
        .attr(attr)
        .ok_or_else(|| LibrarianError::bad_search(format!("unknown attribute {attr:?}")))?;
    if attr_schema.kind == AttrKind::Derived {
        return Err(LibrarianError::bad_search(format!(
            "{attr} is a derived attribute and cannot be filtered on directly"
        )));
    }
    Ok(attr_schema)
}

fn check_numeric(schema: &EntitySchema, attr: &str) -> Result<()> {
    let attr_schema = lookup(schema, attr)?;
    match attr_schema.ty {
        AttrType::Int | AttrType::Float => Ok(()),
        _ => Err(LibrarianError::bad_search(format!(
            "{attr} is not a numeric attribute"
        ))),
    }
}

fn check_scalar_type(attr: &str, ty: AttrType, value: &ScalarValue) -> Result<()> {
    let compatible = matches!(
        (ty, value),
        (AttrType::Text, ScalarValue::Text(_))
            | (AttrType::Int, ScalarValue::Int(_))
            | (AttrType::Float, ScalarValue::Int(_))
            | (AttrType::Float, ScalarValue::Float(_))
            | (AttrType::Bool, ScalarValue::Bool(_))
    );
    if compatible {
        Ok(())
    } else {
        Err(LibrarianError::bad_search(format!(
            "value type does not match attribute {attr:?}"
        )))
    }
}

/// Whether an attribute participates in the stored-column table (derived
/// attributes need an aggregate, not a plain predicate).
pub fn is_derived(schema: &EntitySchema, attr: &str) -> bool {
    schema
        .attr(attr)
        .map(|a| a.kind == AttrKind::Derived)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_attribute() {
        let err = compile_for(EntityKind::File, r#"{"bogus-is-exactly": 1}"#).unwrap_err();
        assert!(matches!(err, LibrarianError::BadRequest(_)));
    }

    #[test]
    fn rejects_type_mismatch() {
        let err =
            compile_for(EntityKind::File, r#"{"source-greater-than": 5}"#).unwrap_err();
        assert!(matches!(err, LibrarianError::BadRequest(_)));
    }

    #[test]
    fn accepts_well_typed_clause() {
        compile_for(
            EntityKind::File,
            r#"{"size-greater-than": 1000, "source-is-exactly": "correlator"}"#,
        )
        .unwrap();
    }

    #[test]
    fn obs_matches_validates_against_observation_schema() {
        compile_for(
            EntityKind::File,
            r#"{"obs-matches": {"start_time_jd-greater-than": 2459000.0}}"#,
        )
        .unwrap();
    }

    #[test]
    fn obs_matches_rejected_outside_file_entity() {
        let err = compile_for(
            EntityKind::Observation,
            r#"{"obs-matches": {"start_time_jd-greater-than": 2459000.0}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, LibrarianError::BadRequest(_)));
    }

    #[test]
    fn bare_observation_attribute_on_a_file_search_proxies_into_obs_matches() {
        let clause =
            compile_for(EntityKind::File, r#"{"start_time_jd-greater-than": 2459000.0}"#).unwrap();
        assert_eq!(
            clause,
            Clause::ObsMatches(Box::new(Clause::AttrGreaterThan {
                attr: "start_time_jd".into(),
                value: 2459000.0,
            }))
        );
    }

    #[test]
    fn bare_session_id_on_a_file_search_proxies_into_obs_matches() {
        let clause = compile_for(EntityKind::File, r#"{"session_id-is-exactly": 12}"#).unwrap();
        assert_eq!(
            clause,
            Clause::ObsMatches(Box::new(Clause::AttrIsExactly {
                attr: "session_id".into(),
                value: ScalarValue::Int(12),
            }))
        );
    }

    #[test]
    fn proxy_rewrite_applies_inside_boolean_composition() {
        let clause = compile_for(
            EntityKind::File,
            r#"{"and": {"size-greater-than": 0, "stop_time_jd-less-than": 2459100.0}}"#,
        )
        .unwrap();
        assert_eq!(
            clause,
            Clause::And(vec![
                Clause::AttrGreaterThan { attr: "size".into(), value: 0.0 },
                Clause::ObsMatches(Box::new(Clause::AttrLessThan {
                    attr: "stop_time_jd".into(),
                    value: 2459100.0,
                })),
            ])
        );
    }

    #[test]
    fn proxy_rewrite_does_not_apply_to_observation_searches() {
        let err = compile_for(EntityKind::Observation, r#"{"num_files-greater-than": 0}"#)
            .unwrap_err();
        assert!(matches!(err, LibrarianError::BadRequest(_)));
    }
}
