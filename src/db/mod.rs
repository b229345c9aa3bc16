// Database module

pub mod destination;
pub mod migrations;
pub mod pg;
pub mod schema;

use rusqlite::Connection;
use std::path::Path;

use crate::error::{ImportError, Result};

pub use destination::{
    AccessMode, DestinationSession, DestinationStore, DestinationTransaction, LabelCollation,
    SqliteDestination,
};
pub use pg::{PostgresDestination, PostgresSession};

/// Create a new, empty destination catalog. Refuses to touch an existing file.
pub fn init_catalog(db_path: &Path) -> Result<Connection> {
    if db_path.exists() {
        return Err(ImportError::Other(format!(
            "catalog already exists at {}",
            db_path.display()
        )));
    }

    let conn = Connection::open(db_path)?;

    // Enable foreign keys (must be done per connection)
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;

    migrations::run_migrations(&conn)?;

    Ok(conn)
}
