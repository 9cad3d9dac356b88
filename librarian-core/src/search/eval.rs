use super::clause::{Clause, ScalarValue};

/// A record a compiled clause can be evaluated against. Implemented by the
/// in-memory catalog test double and by ad-hoc wrappers in unit tests;
/// missing attributes evaluate to "does not match" rather than erroring,
/// since validation already guaranteed the attribute exists in the schema.
pub trait RecordContext {
    fn attr(&self, name: &str) -> Option<ScalarValue>;

    fn obsid_is_null(&self) -> bool {
        false
    }

    /// Age of the record's `create_time` in days, for `not-older-than` /
    /// `not-newer-than`.
    fn age_days(&self) -> Option<f64> {
        None
    }

    /// The observation this file belongs to, for `obs-matches`.
    fn observation(&self) -> Option<&dyn RecordContext> {
        None
    }

    fn has_event(&self, _event_type: &str) -> bool {
        false
    }
}

/// Evaluate a validated clause tree against a record (§4.3's reference
/// semantics; also the backing implementation for the in-memory catalog used
/// in tests).
pub fn evaluate(clause: &Clause, ctx: &dyn RecordContext) -> bool {
    match clause {
        Clause::And(parts) => parts.iter().all(|p| evaluate(p, ctx)),
        Clause::Or(parts) => parts.iter().any(|p| evaluate(p, ctx)),
        Clause::NoneOf(parts) => !parts.iter().any(|p| evaluate(p, ctx)),
        Clause::AlwaysTrue => true,
        Clause::AlwaysFalse => false,
        Clause::AttrIsExactly { attr, value } => ctx.attr(attr).as_ref() == Some(value),
        Clause::AttrIsNot { attr, value } => ctx.attr(attr).as_ref() != Some(value),
        Clause::AttrMatches { attr, pattern } => match ctx.attr(attr) {
            Some(ScalarValue::Text(s)) => like_match(&s, pattern),
            _ => false,
        },
        Clause::AttrGreaterThan { attr, value } => {
            ctx.attr(attr).and_then(|v| v.as_f64()).is_some_and(|n| n > *value)
        }
        Clause::AttrLessThan { attr, value } => {
            ctx.attr(attr).and_then(|v| v.as_f64()).is_some_and(|n| n < *value)
        }
        Clause::AttrInRange { attr, lo, hi } => ctx
            .attr(attr)
            .and_then(|v| v.as_f64())
            .is_some_and(|n| n >= *lo && n <= *hi),
        Clause::AttrNotInRange { attr, lo, hi } => match ctx.attr(attr).and_then(|v| v.as_f64()) {
            Some(n) => !(n >= *lo && n <= *hi),
            None => true,
        },
        Clause::ObsidIsNull => ctx.obsid_is_null(),
        Clause::NotOlderThanDays(n) => ctx.age_days().is_some_and(|age| age <= *n),
        Clause::NotNewerThanDays(n) => ctx.age_days().is_some_and(|age| age >= *n),
        Clause::ObsMatches(inner) => ctx.observation().is_some_and(|obs| evaluate(inner, obs)),
        Clause::NoFileHasEvent(event_type) => !ctx.has_event(event_type),
    }
}

/// A tiny SQL `LIKE`-style matcher (`%` = any run, `_` = any one char), used
/// both by the in-memory evaluator and as the reference semantics for the
/// SQL translation's `ILIKE` predicate.
fn like_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    like_match_from(&text, &pattern, 0, 0)
}

fn like_match_from(text: &[char], pattern: &[char], ti: usize, pi: usize) -> bool {
    if pi == pattern.len() {
        return ti == text.len();
    }
    match pattern[pi] {
        '%' => {
            (ti..=text.len()).any(|skip| like_match_from(text, pattern, skip, pi + 1))
        }
        '_' => ti < text.len() && like_match_from(text, pattern, ti + 1, pi + 1),
        c => ti < text.len() && text[ti] == c && like_match_from(text, pattern, ti + 1, pi + 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapRecord(HashMap<&'static str, ScalarValue>);

    impl RecordContext for MapRecord {
        fn attr(&self, name: &str) -> Option<ScalarValue> {
            self.0.get(name).cloned()
        }
    }

    #[test]
    fn like_match_supports_percent_wildcard() {
        assert!(like_match("correlator_1.uvh5", "correlator%"));
        assert!(!like_match("other.uvh5", "correlator%"));
    }

    #[test]
    fn like_match_supports_underscore_wildcard() {
        assert!(like_match("abc", "a_c"));
        assert!(!like_match("abbc", "a_c"));
    }

    #[test]
    fn and_clause_requires_every_part() {
        let ctx = MapRecord(HashMap::from([
            ("size", ScalarValue::Int(2000)),
            ("source", ScalarValue::Text("correlator".into())),
        ]));
        let clause = Clause::And(vec![
            Clause::AttrGreaterThan {
                attr: "size".into(),
                value: 1000.0,
            },
            Clause::AttrIsExactly {
                attr: "source".into(),
                value: ScalarValue::Text("correlator".into()),
            },
        ]);
        assert!(evaluate(&clause, &ctx));
    }

    #[test]
    fn not_in_range_is_true_when_attribute_absent() {
        let ctx = MapRecord(HashMap::new());
        let clause = Clause::AttrNotInRange {
            attr: "size".into(),
            lo: 0.0,
            hi: 10.0,
        };
        assert!(evaluate(&clause, &ctx));
    }

    #[test]
    fn none_of_negates_every_part() {
        let ctx = MapRecord(HashMap::from([("size", ScalarValue::Int(5))]));
        let clause = Clause::NoneOf(vec![Clause::AttrGreaterThan {
            attr: "size".into(),
            value: 1000.0,
        }]);
        assert!(evaluate(&clause, &ctx));
    }
}
