use crate::error::{LibrarianError, Result};
use serde_json::Value;

/// A parsed scalar payload, already checked against the attribute's
/// declared type.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl ScalarValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::Int(n) => Some(*n as f64),
            ScalarValue::Float(f) => Some(*f),
            _ => None,
        }
    }
}

/// The parsed clause tree (§4.3). Boolean composition nests; leaves name an
/// attribute and an operator.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    And(Vec<Clause>),
    Or(Vec<Clause>),
    /// Negation of `Or` (§4.3: "none-of = negation of or").
    NoneOf(Vec<Clause>),
    AlwaysTrue,
    AlwaysFalse,
    AttrIsExactly { attr: String, value: ScalarValue },
    AttrIsNot { attr: String, value: ScalarValue },
    AttrMatches { attr: String, pattern: String },
    AttrGreaterThan { attr: String, value: f64 },
    AttrLessThan { attr: String, value: f64 },
    AttrInRange { attr: String, lo: f64, hi: f64 },
    AttrNotInRange { attr: String, lo: f64, hi: f64 },
    ObsidIsNull,
    NotOlderThanDays(f64),
    NotNewerThanDays(f64),
    ObsMatches(Box<Clause>),
    NoFileHasEvent(String),
}

/// Strip `#`-to-end-of-line comments before JSON decoding (§4.3 "input
/// hygiene"), respecting JSON string quoting so a literal `#` inside a
/// string value is preserved.
pub fn strip_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '#' => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push(next);
                        break;
                    }
                }
            }
            _ => out.push(c),
        }
    }
    out
}

const SUFFIXES: &[(&str, fn(String, &Value) -> Result<Clause>)] = &[
    ("-not-in-range", parse_not_in_range),
    ("-in-range", parse_in_range),
    ("-is-exactly", parse_is_exactly),
    ("-is-not", parse_is_not),
    ("-matches", parse_matches),
    ("-greater-than", parse_greater_than),
    ("-less-than", parse_less_than),
];

pub fn compile(raw_json: &str) -> Result<Clause> {
    let cleaned = strip_comments(raw_json);
    let value: Value =
        serde_json::from_str(&cleaned).map_err(|e| LibrarianError::bad_search(e.to_string()))?;
    parse_tree(&value)
}

/// A bare object at the top level (or inside `and`/`or`/`none-of`) is an
/// implicit conjunction/disjunction of its named clauses.
fn parse_tree(value: &Value) -> Result<Clause> {
    let map = value
        .as_object()
        .ok_or_else(|| LibrarianError::bad_search("expected a JSON object"))?;
    parse_clause_map(map).map(Clause::And)
}

fn parse_clause_map(map: &serde_json::Map<String, Value>) -> Result<Vec<Clause>> {
    map.iter()
        .map(|(name, payload)| parse_single_clause(name, payload))
        .collect()
}

fn parse_single_clause(name: &str, payload: &Value) -> Result<Clause> {
    match name {
        "and" => Ok(Clause::And(parse_submap(payload)?)),
        "or" => Ok(Clause::Or(parse_submap(payload)?)),
        "none-of" => Ok(Clause::NoneOf(parse_submap(payload)?)),
        "always-true" => Ok(Clause::AlwaysTrue),
        "always-false" => Ok(Clause::AlwaysFalse),
        "obsid-is-null" => Ok(Clause::ObsidIsNull),
        "not-older-than" => Ok(Clause::NotOlderThanDays(expect_number(payload)?)),
        "not-newer-than" => Ok(Clause::NotNewerThanDays(expect_number(payload)?)),
        "obs-matches" => Ok(Clause::ObsMatches(Box::new(parse_tree(payload)?))),
        "no-file-has-event" => Ok(Clause::NoFileHasEvent(expect_text(payload)?)),
        other => parse_attr_clause(other, payload),
    }
}

fn parse_submap(payload: &Value) -> Result<Vec<Clause>> {
    let map = payload
        .as_object()
        .ok_or_else(|| LibrarianError::bad_search("expected a map of named clauses"))?;
    parse_clause_map(map)
}

fn parse_attr_clause(name: &str, payload: &Value) -> Result<Clause> {
    for (suffix, build) in SUFFIXES {
        if let Some(attr) = name.strip_suffix(suffix) {
            if attr.is_empty() {
                continue;
            }
            return build(attr.to_string(), payload);
        }
    }
    Err(LibrarianError::bad_search(format!(
        "unknown clause name {name:?}"
    )))
}

fn parse_is_exactly(attr: String, payload: &Value) -> Result<Clause> {
    Ok(Clause::AttrIsExactly {
        attr,
        value: expect_scalar(payload)?,
    })
}

fn parse_is_not(attr: String, payload: &Value) -> Result<Clause> {
    Ok(Clause::AttrIsNot {
        attr,
        value: expect_scalar(payload)?,
    })
}

fn parse_matches(attr: String, payload: &Value) -> Result<Clause> {
    Ok(Clause::AttrMatches {
        attr,
        pattern: expect_text(payload)?,
    })
}

fn parse_greater_than(attr: String, payload: &Value) -> Result<Clause> {
    Ok(Clause::AttrGreaterThan {
        attr,
        value: expect_number(payload)?,
    })
}

fn parse_less_than(attr: String, payload: &Value) -> Result<Clause> {
    Ok(Clause::AttrLessThan {
        attr,
        value: expect_number(payload)?,
    })
}

fn parse_in_range(attr: String, payload: &Value) -> Result<Clause> {
    let (lo, hi) = expect_range(payload)?;
    Ok(Clause::AttrInRange { attr, lo, hi })
}

fn parse_not_in_range(attr: String, payload: &Value) -> Result<Clause> {
    let (lo, hi) = expect_range(payload)?;
    Ok(Clause::AttrNotInRange { attr, lo, hi })
}

fn expect_number(payload: &Value) -> Result<f64> {
    payload
        .as_f64()
        .ok_or_else(|| LibrarianError::bad_search("expected a number"))
}

fn expect_text(payload: &Value) -> Result<String> {
    payload
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| LibrarianError::bad_search("expected text"))
}

fn expect_scalar(payload: &Value) -> Result<ScalarValue> {
    match payload {
        Value::String(s) => Ok(ScalarValue::Text(s.clone())),
        Value::Bool(b) => Ok(ScalarValue::Bool(*b)),
        Value::Number(n) if n.is_i64() || n.is_u64() => {
            Ok(ScalarValue::Int(n.as_i64().unwrap_or_default()))
        }
        Value::Number(n) => Ok(ScalarValue::Float(n.as_f64().unwrap_or_default())),
        _ => Err(LibrarianError::bad_search(
            "expected a number, text, or boolean",
        )),
    }
}

/// Accepts `[lo, hi]` and swaps endpoints if `lo > hi` (§4.3, §8 boundary
/// behavior).
fn expect_range(payload: &Value) -> Result<(f64, f64)> {
    let arr = payload
        .as_array()
        .ok_or_else(|| LibrarianError::bad_search("expected a [lo, hi] range"))?;
    if arr.len() != 2 {
        return Err(LibrarianError::bad_search("range must have exactly 2 elements"));
    }
    let a = arr[0]
        .as_f64()
        .ok_or_else(|| LibrarianError::bad_search("range bounds must be numeric"))?;
    let b = arr[1]
        .as_f64()
        .ok_or_else(|| LibrarianError::bad_search("range bounds must be numeric"))?;
    Ok(if a <= b { (a, b) } else { (b, a) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_hash_comments_outside_strings() {
        let input = "{\n  \"size-greater-than\": 1000 # minimum size\n}\n";
        let stripped = strip_comments(input);
        assert!(!stripped.contains("minimum size"));
        assert!(stripped.contains("\"size-greater-than\""));
    }

    #[test]
    fn preserves_hash_inside_string_literal() {
        let input = r#"{"source-is-exactly": "band#1"}"#;
        let stripped = strip_comments(input);
        assert_eq!(stripped, input);
    }

    #[test]
    fn compiles_conjunction_of_attr_clauses() {
        let clause = compile(r#"{"size-greater-than": 1000, "source-is-exactly": "correlator"}"#)
            .unwrap();
        match clause {
            Clause::And(parts) => {
                assert_eq!(parts.len(), 2);
                assert!(parts.contains(&Clause::AttrGreaterThan {
                    attr: "size".into(),
                    value: 1000.0
                }));
                assert!(parts.contains(&Clause::AttrIsExactly {
                    attr: "source".into(),
                    value: ScalarValue::Text("correlator".into())
                }));
            }
            other => panic!("expected And, got {other:?}"),
        }
    }

    #[test]
    fn range_clause_swaps_inverted_bounds() {
        let clause = compile(r#"{"size-in-range": [10, 5]}"#).unwrap();
        match clause {
            Clause::And(parts) => match &parts[0] {
                Clause::AttrInRange { attr, lo, hi } => {
                    assert_eq!(attr, "size");
                    assert_eq!(*lo, 5.0);
                    assert_eq!(*hi, 10.0);
                }
                other => panic!("expected AttrInRange, got {other:?}"),
            },
            other => panic!("expected And, got {other:?}"),
        }
    }

    #[test]
    fn unknown_clause_name_is_bad_search() {
        let err = compile(r#"{"frobnicate": 1}"#).unwrap_err();
        assert!(matches!(err, LibrarianError::BadRequest(_)));
    }

    #[test]
    fn malformed_json_is_bad_search() {
        let err = compile("not json").unwrap_err();
        assert!(matches!(err, LibrarianError::BadRequest(_)));
    }
}
