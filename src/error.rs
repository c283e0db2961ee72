use std::path::PathBuf;

use thiserror::Error;

/// Failure to reach the underlying key-value store.
///
/// A missing key is never an error (see [`crate::store::Lookup::NotFound`]);
/// anything that ends up here aborts the whole reconstruction run.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: cannot open {}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("store unavailable: query on {table} failed")]
    Query {
        table: &'static str,
        #[source]
        source: rusqlite::Error,
    },
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;
