//! The search compiler (§4.3): untrusted JSON in, a validated [`clause::Clause`]
//! tree out, evaluated either in memory (tests, small catalogs) or translated
//! to SQL against the Postgres-backed catalog.

pub mod clause;
pub mod compiler;
pub mod eval;
pub mod schema;
pub mod sql;

pub use clause::{Clause, ScalarValue};
pub use compiler::compile_for;
pub use eval::evaluate;
pub use schema::{AttrKind, AttrSchema, AttrType, EntityKind, EntitySchema};
pub use sql::to_sql;
