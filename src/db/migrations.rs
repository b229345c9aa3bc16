// Destination catalog migrations
// Migrations are forward-only. Never edit or delete a migration after it ships.
// Only used to create standalone catalogs (`init`) and test fixtures; an existing
// MediaHub catalog is verified, never migrated.

use rusqlite::Connection;

use crate::db::destination::LabelCollation;
use crate::error::{ImportError, Result};

/// All migrations in order. Each migration is a SQL string.
const MIGRATIONS: &[&str] = &[
    // Migration 1: Catalog tables touched by the importer
    r#"
    CREATE TABLE app_user (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL DEFAULT '',
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE media_item (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        library_id INTEGER NOT NULL DEFAULT 1,
        path TEXT NOT NULL,
        rel_path TEXT,
        kind TEXT NOT NULL DEFAULT 'video',
        present INTEGER NOT NULL DEFAULT 1,
        size_bytes INTEGER NOT NULL DEFAULT 0,
        mtime TEXT,
        UNIQUE(library_id, path)
    );

    CREATE TABLE tag (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE
    );

    CREATE TABLE item_tag (
        item_id INTEGER NOT NULL REFERENCES media_item(id) ON DELETE CASCADE,
        tag_id INTEGER NOT NULL REFERENCES tag(id) ON DELETE CASCADE,
        PRIMARY KEY (item_id, tag_id)
    );

    CREATE TABLE user_favorite (
        user_id INTEGER NOT NULL REFERENCES app_user(id) ON DELETE CASCADE,
        item_id INTEGER NOT NULL REFERENCES media_item(id) ON DELETE CASCADE,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        PRIMARY KEY (user_id, item_id)
    );

    CREATE INDEX idx_media_item_path ON media_item(path);
    CREATE INDEX idx_item_tag_tag ON item_tag(tag_id);
    "#,
];

/// Tables and columns a destination must expose before an import may run.
pub(crate) const REQUIRED_COLUMNS: &[(&str, &[&str])] = &[
    ("app_user", &["id"]),
    ("media_item", &["id", "path", "mtime"]),
    ("tag", &["id", "name"]),
    ("item_tag", &["item_id", "tag_id"]),
    ("user_favorite", &["user_id", "item_id"]),
];

/// Unique keys the idempotent writes depend on.
pub(crate) const REQUIRED_UNIQUE_KEYS: &[(&str, &[&str])] = &[
    ("tag", &["name"]),
    ("item_tag", &["item_id", "tag_id"]),
    ("user_favorite", &["user_id", "item_id"]),
];

/// Get current schema version from database
fn get_schema_version(conn: &Connection) -> Result<u32> {
    let version: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    Ok(version)
}

/// Run all pending migrations. Each one commits together with its version bump.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    apply_migrations(conn, MIGRATIONS)
}

fn apply_migrations(conn: &Connection, migrations: &[&str]) -> Result<()> {
    let current_version = get_schema_version(conn)?;
    let target_version = migrations.len() as u32;

    if current_version > target_version {
        return Err(ImportError::Schema(format!(
            "catalog schema version {} is newer than this build supports (max {})",
            current_version, target_version
        )));
    }

    for (i, migration) in migrations.iter().enumerate() {
        let migration_version = (i + 1) as u32;
        if migration_version <= current_version {
            continue;
        }

        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(migration)?;
        tx.execute_batch(&format!("PRAGMA user_version = {}", migration_version))?;
        tx.commit()?;

        log::info!("Applied catalog migration {}", migration_version);
    }

    Ok(())
}

/// Check that an existing catalog has every table, column and unique key the importer writes through.
pub fn verify_destination_schema(conn: &Connection) -> Result<()> {
    for (table, columns) in REQUIRED_COLUMNS {
        let present = table_columns(conn, table)?;
        if present.is_empty() {
            return Err(ImportError::Schema(format!("missing table '{}'", table)));
        }
        for column in *columns {
            if !present.iter().any(|c| c == column) {
                return Err(ImportError::Schema(format!(
                    "table '{}' has no column '{}'",
                    table, column
                )));
            }
        }
    }

    for (table, columns) in REQUIRED_UNIQUE_KEYS {
        if !has_unique_key(conn, table, columns)? {
            return Err(ImportError::Schema(format!(
                "table '{}' has no unique key on ({})",
                table,
                columns.join(", ")
            )));
        }
    }

    Ok(())
}

/// Collation of the unique index on `tag.name`, which decides which names collide.
pub fn detect_label_collation(conn: &Connection) -> Result<LabelCollation> {
    let mut index_stmt =
        conn.prepare("SELECT name FROM pragma_index_list('tag') WHERE \"unique\" = 1")?;
    let indexes = index_stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut column_stmt = conn.prepare("SELECT name, coll FROM pragma_index_xinfo(?1) WHERE key = 1")?;
    for index in indexes {
        let columns = column_stmt
            .query_map([&index], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        if let [(column, collation)] = columns.as_slice() {
            if column == "name" {
                return Ok(match collation.to_ascii_uppercase().as_str() {
                    "NOCASE" => LabelCollation::NoCase,
                    "RTRIM" => LabelCollation::RTrim,
                    _ => LabelCollation::Binary,
                });
            }
        }
    }

    Ok(LabelCollation::Binary)
}

fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1)")?;
    let columns = stmt
        .query_map([table], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(columns)
}

/// True when some unique index (including the primary key) covers exactly `columns`.
fn has_unique_key(conn: &Connection, table: &str, columns: &[&str]) -> Result<bool> {
    let mut index_stmt =
        conn.prepare("SELECT name FROM pragma_index_list(?1) WHERE \"unique\" = 1")?;
    let indexes = index_stmt
        .query_map([table], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut column_stmt = conn.prepare("SELECT name FROM pragma_index_info(?1)")?;
    for index in indexes {
        let mut indexed = column_stmt
            .query_map([&index], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        indexed.sort();

        let mut wanted: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
        wanted.sort();

        if indexed == wanted {
            return Ok(true);
        }
    }

    // A single-column INTEGER PRIMARY KEY is the rowid and has no index entry.
    if let [column] = columns {
        let is_rowid_pk: bool = conn.query_row(
            "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2 AND pk = 1 AND type = 'INTEGER'",
            rusqlite::params![table, column],
            |row| row.get::<_, i64>(0),
        )? == 1;
        return Ok(is_rowid_pk);
    }

    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), MIGRATIONS.len() as u32);
    }

    #[test]
    fn test_failed_migration_leaves_no_partial_schema() {
        let conn = Connection::open_in_memory().unwrap();
        let steps: &[&str] = &[
            "CREATE TABLE first_step (id INTEGER);",
            "CREATE TABLE second_step (id INTEGER); INSERT INTO nowhere VALUES (1);",
        ];

        assert!(apply_migrations(&conn, steps).is_err());
        assert_eq!(get_schema_version(&conn).unwrap(), 1);
        assert!(!table_columns(&conn, "first_step").unwrap().is_empty());
        assert!(table_columns(&conn, "second_step").unwrap().is_empty());
    }

    #[test]
    fn test_label_collation_of_migrated_catalog_is_binary() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        assert_eq!(detect_label_collation(&conn).unwrap(), LabelCollation::Binary);
    }

    #[test]
    fn test_newer_schema_is_refused() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA user_version = 99").unwrap();
        assert!(matches!(run_migrations(&conn), Err(ImportError::Schema(_))));
    }

    #[test]
    fn test_migrated_catalog_passes_verification() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        verify_destination_schema(&conn).unwrap();
    }

    #[test]
    fn test_missing_table_fails_verification() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn.execute_batch("DROP TABLE user_favorite").unwrap();

        let err = verify_destination_schema(&conn).unwrap_err();
        assert!(err.to_string().contains("user_favorite"), "got {err}");
    }

    #[test]
    fn test_tag_without_unique_name_fails_verification() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE app_user (id INTEGER PRIMARY KEY);
             CREATE TABLE media_item (id INTEGER PRIMARY KEY, path TEXT, mtime TEXT);
             CREATE TABLE tag (id INTEGER PRIMARY KEY, name TEXT);
             CREATE TABLE item_tag (item_id INTEGER, tag_id INTEGER, PRIMARY KEY (item_id, tag_id));
             CREATE TABLE user_favorite (user_id INTEGER, item_id INTEGER, PRIMARY KEY (user_id, item_id));",
        )
        .unwrap();

        let err = verify_destination_schema(&conn).unwrap_err();
        assert!(err.to_string().contains("unique key on (name)"), "got {err}");
    }
}
