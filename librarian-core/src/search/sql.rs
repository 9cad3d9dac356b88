use super::clause::{Clause, ScalarValue};
use sqlx::{Postgres, QueryBuilder};

/// Append the SQL translation of `clause` to `qb`, parenthesized so it can
/// be combined with other predicates via `AND`/`OR` at the call site.
///
/// Grounded on the teacher's `sqlx::QueryBuilder` pool-wrapper idiom
/// (`postgres_ref.rs`); nothing in the example pack builds a WHERE clause
/// this way, so the shape here follows `QueryBuilder`'s own bind-and-push
/// API rather than a copied pattern.
pub fn to_sql<'a>(clause: &'a Clause, qb: &mut QueryBuilder<'a, Postgres>) {
    match clause {
        Clause::And(parts) => push_joined(qb, parts, " AND "),
        Clause::Or(parts) => push_joined(qb, parts, " OR "),
        Clause::NoneOf(parts) => {
            qb.push("NOT (");
            push_joined(qb, parts, " OR ");
            qb.push(")");
        }
        Clause::AlwaysTrue => {
            qb.push("TRUE");
        }
        Clause::AlwaysFalse => {
            qb.push("FALSE");
        }
        Clause::AttrIsExactly { attr, value } => push_scalar_cmp(qb, attr, "=", value),
        Clause::AttrIsNot { attr, value } => push_scalar_cmp(qb, attr, "<>", value),
        Clause::AttrMatches { attr, pattern } => {
            qb.push(quote_ident(attr));
            qb.push(" ILIKE ");
            qb.push_bind(pattern.as_str());
        }
        Clause::AttrGreaterThan { attr, value } => {
            qb.push(quote_ident(attr));
            qb.push(" > ");
            qb.push_bind(*value);
        }
        Clause::AttrLessThan { attr, value } => {
            qb.push(quote_ident(attr));
            qb.push(" < ");
            qb.push_bind(*value);
        }
        Clause::AttrInRange { attr, lo, hi } => {
            qb.push(quote_ident(attr));
            qb.push(" BETWEEN ");
            qb.push_bind(*lo);
            qb.push(" AND ");
            qb.push_bind(*hi);
        }
        Clause::AttrNotInRange { attr, lo, hi } => {
            let col = quote_ident(attr);
            qb.push(&col);
            qb.push(" IS NULL OR NOT (");
            qb.push(&col);
            qb.push(" BETWEEN ");
            qb.push_bind(*lo);
            qb.push(" AND ");
            qb.push_bind(*hi);
            qb.push(")");
        }
        Clause::ObsidIsNull => {
            qb.push("obsid IS NULL");
        }
        Clause::NotOlderThanDays(days) => {
            qb.push("create_time >= NOW() - (");
            qb.push_bind(*days);
            qb.push(" * INTERVAL '1 day')");
        }
        Clause::NotNewerThanDays(days) => {
            qb.push("create_time <= NOW() - (");
            qb.push_bind(*days);
            qb.push(" * INTERVAL '1 day')");
        }
        Clause::ObsMatches(inner) => {
            qb.push("obsid IN (SELECT obsid FROM observations WHERE ");
            to_sql(inner, qb);
            qb.push(")");
        }
        Clause::NoFileHasEvent(event_type) => {
            qb.push("NOT EXISTS (SELECT 1 FROM file_events fe WHERE fe.name = files.name AND fe.event_type = ");
            qb.push_bind(event_type.as_str());
            qb.push(")");
        }
    }
}

fn push_joined<'a>(qb: &mut QueryBuilder<'a, Postgres>, parts: &'a [Clause], sep: &str) {
    if parts.is_empty() {
        qb.push("TRUE");
        return;
    }
    qb.push("(");
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            qb.push(sep);
        }
        to_sql(part, qb);
    }
    qb.push(")");
}

fn push_scalar_cmp<'a>(
    qb: &mut QueryBuilder<'a, Postgres>,
    attr: &'a str,
    op: &str,
    value: &'a ScalarValue,
) {
    qb.push(quote_ident(attr));
    qb.push(" ");
    qb.push(op);
    qb.push(" ");
    match value {
        ScalarValue::Text(s) => {
            qb.push_bind(s.as_str());
        }
        ScalarValue::Int(n) => {
            qb.push_bind(*n);
        }
        ScalarValue::Float(f) => {
            qb.push_bind(*f);
        }
        ScalarValue::Bool(b) => {
            qb.push_bind(*b);
        }
    }
}

/// Attribute names are drawn from a fixed, compiler-validated schema, never
/// from arbitrary user text, so a defensive quote is enough here.
fn quote_ident(attr: &str) -> String {
    format!("\"{}\"", attr.replace('"', ""))
}
