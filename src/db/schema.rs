// Destination catalog types and query helpers

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::constants::LIKE_ESCAPE;
use crate::error::Result;

pub type RecordId = i64;
pub type LabelId = i64;
pub type UserId = i64;

// ----- Media items -----

/// A destination record that shares a basename with the path being resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordCandidate {
    pub id: RecordId,
    pub path: String,
    pub mtime: Option<String>,
}

pub fn find_media_item_by_path(conn: &Connection, path: &str) -> Result<Option<RecordId>> {
    let result = conn
        .query_row(
            "SELECT id FROM media_item WHERE path = ?1 ORDER BY id LIMIT 1",
            params![path],
            |row| row.get(0),
        )
        .optional()?;
    Ok(result)
}

/// Items whose path contains `basename` as a trailing substring, ordered by id.
/// SQLite LIKE is case-insensitive for ASCII, so callers must re-check the suffix.
pub fn find_media_items_ending_with(conn: &Connection, basename: &str) -> Result<Vec<RecordCandidate>> {
    let pattern = format!("%{}", escape_like(basename));
    let mut stmt = conn.prepare(
        "SELECT id, path, CAST(mtime AS TEXT) FROM media_item
         WHERE path LIKE ?1 ESCAPE '\\'
         ORDER BY id",
    )?;

    let candidates = stmt
        .query_map(params![pattern], |row| {
            Ok(RecordCandidate {
                id: row.get(0)?,
                path: row.get(1)?,
                mtime: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(candidates)
}

pub fn insert_media_item(conn: &Connection, path: &str, mtime: Option<&str>) -> Result<RecordId> {
    conn.execute(
        "INSERT INTO media_item (path, mtime) VALUES (?1, ?2)",
        params![path, mtime],
    )?;
    Ok(conn.last_insert_rowid())
}

pub(crate) fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if c == '%' || c == '_' || c == LIKE_ESCAPE {
            escaped.push(LIKE_ESCAPE);
        }
        escaped.push(c);
    }
    escaped
}

// ----- Tags -----

/// Result of an insert-or-return-existing on `tag.name`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagUpsert {
    pub id: LabelId,
    pub created: bool,
}

pub fn get_tag_id(conn: &Connection, name: &str) -> Result<Option<LabelId>> {
    let result = conn
        .query_row("SELECT id FROM tag WHERE name = ?1", params![name], |row| row.get(0))
        .optional()?;
    Ok(result)
}

/// Insert the tag unless the name already exists, then return its id.
/// Callers hold the write transaction, so no other writer can interleave.
pub fn upsert_tag(conn: &Connection, name: &str) -> Result<TagUpsert> {
    let inserted = conn.execute(
        "INSERT INTO tag (name) VALUES (?1) ON CONFLICT(name) DO NOTHING",
        params![name],
    )?;
    let id = conn.query_row("SELECT id FROM tag WHERE name = ?1", params![name], |row| row.get(0))?;
    Ok(TagUpsert { id, created: inserted == 1 })
}

pub fn count_tags(conn: &Connection) -> Result<i64> {
    let count = conn.query_row("SELECT COUNT(*) FROM tag", [], |row| row.get(0))?;
    Ok(count)
}

// ----- Item tags -----

/// Returns true when the pair was newly written.
pub fn add_item_tag(conn: &Connection, item_id: RecordId, tag_id: LabelId) -> Result<bool> {
    let inserted = conn.execute(
        "INSERT INTO item_tag (item_id, tag_id) VALUES (?1, ?2) ON CONFLICT DO NOTHING",
        params![item_id, tag_id],
    )?;
    Ok(inserted == 1)
}

pub fn has_item_tag(conn: &Connection, item_id: RecordId, tag_id: LabelId) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM item_tag WHERE item_id = ?1 AND tag_id = ?2",
        params![item_id, tag_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn count_item_tags(conn: &Connection) -> Result<i64> {
    let count = conn.query_row("SELECT COUNT(*) FROM item_tag", [], |row| row.get(0))?;
    Ok(count)
}

// ----- Favorites -----

/// Returns true when the pair was newly written.
pub fn add_user_favorite(conn: &Connection, user_id: UserId, item_id: RecordId) -> Result<bool> {
    let inserted = conn.execute(
        "INSERT INTO user_favorite (user_id, item_id) VALUES (?1, ?2) ON CONFLICT DO NOTHING",
        params![user_id, item_id],
    )?;
    Ok(inserted == 1)
}

pub fn has_user_favorite(conn: &Connection, user_id: UserId, item_id: RecordId) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM user_favorite WHERE user_id = ?1 AND item_id = ?2",
        params![user_id, item_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn count_user_favorites(conn: &Connection) -> Result<i64> {
    let count = conn.query_row("SELECT COUNT(*) FROM user_favorite", [], |row| row.get(0))?;
    Ok(count)
}

// ----- Users -----

pub fn user_exists(conn: &Connection, user_id: UserId) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM app_user WHERE id = ?1",
        params![user_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn insert_user(conn: &Connection, username: &str) -> Result<UserId> {
    conn.execute("INSERT INTO app_user (username) VALUES (?1)", params![username])?;
    Ok(conn.last_insert_rowid())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::run_migrations;

    fn setup_catalog() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    #[test]
    fn test_upsert_tag_reuses_existing_id() {
        let conn = setup_catalog();

        let first = upsert_tag(&conn, "Trilogy").unwrap();
        let second = upsert_tag(&conn, "Trilogy").unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.id, second.id);
        assert_eq!(count_tags(&conn).unwrap(), 1);
        assert_eq!(get_tag_id(&conn, "Trilogy").unwrap(), Some(first.id));
    }

    #[test]
    fn test_item_tag_and_favorite_are_idempotent() {
        let conn = setup_catalog();
        let user = insert_user(&conn, "alice").unwrap();
        let item = insert_media_item(&conn, "/library/a.mkv", None).unwrap();
        let tag = upsert_tag(&conn, "Picks").unwrap().id;

        assert!(add_item_tag(&conn, item, tag).unwrap());
        assert!(!add_item_tag(&conn, item, tag).unwrap());
        assert!(has_item_tag(&conn, item, tag).unwrap());

        assert!(add_user_favorite(&conn, user, item).unwrap());
        assert!(!add_user_favorite(&conn, user, item).unwrap());
        assert!(has_user_favorite(&conn, user, item).unwrap());

        assert_eq!(count_item_tags(&conn).unwrap(), 1);
        assert_eq!(count_user_favorites(&conn).unwrap(), 1);
    }

    #[test]
    fn test_like_wildcards_in_basename_are_literal() {
        let conn = setup_catalog();
        insert_media_item(&conn, "/library/100%_done.mkv", None).unwrap();
        insert_media_item(&conn, "/library/100xxdone.mkv", None).unwrap();

        let candidates = find_media_items_ending_with(&conn, "100%_done.mkv").unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].path, "/library/100%_done.mkv");
    }

    #[test]
    fn test_exact_lookup_prefers_lowest_id() {
        let conn = setup_catalog();
        conn.execute(
            "INSERT INTO media_item (library_id, path) VALUES (1, '/m/a.mkv'), (2, '/m/a.mkv')",
            [],
        )
        .unwrap();

        let id = find_media_item_by_path(&conn, "/m/a.mkv").unwrap().unwrap();
        let lowest: i64 = conn.query_row("SELECT MIN(id) FROM media_item", [], |r| r.get(0)).unwrap();
        assert_eq!(id, lowest);
        assert_eq!(find_media_item_by_path(&conn, "/m/b.mkv").unwrap(), None);
    }

    #[test]
    fn test_favorite_for_unknown_user_is_constraint_violation() {
        let conn = setup_catalog();
        let item = insert_media_item(&conn, "/library/a.mkv", None).unwrap();

        let err = add_user_favorite(&conn, 404, item).unwrap_err();
        assert!(matches!(err, crate::error::ImportError::ConstraintViolation(_)));
    }
}
