//! Persistence layer. SQLite-backed storage for the candidate roster,
//! per-email processing records, and category tallies.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlStore;
pub use traits::{Candidate, CategoryTally, EmailRecord, RecordOutcome, RecordStore};
