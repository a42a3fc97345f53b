//! Corpus: classification fields, field classes and document labels.
//!
//! Document text is not stored here; it lives in the artifact store.

mod sqlite;
mod store;
mod types;

pub use sqlite::SqliteCorpus;
pub use store::{CorpusError, CorpusStore};
pub use types::{DocumentLabel, Field, FieldClass};
