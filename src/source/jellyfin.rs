// Jellyfin library.db reader
// Collections are BoxSet items; members come from CollectionItems, or from
// child items when a collection has no explicit entries.

use std::path::Path;

use rusqlite::{params, Connection, OpenFlags};

use crate::constants::JELLYFIN_COLLECTION_TYPE_PATTERN;
use crate::error::{ImportError, Result};
use crate::source::{ImportGroup, SourceCatalog};

pub struct JellyfinLibrary {
    conn: Connection,
}

impl JellyfinLibrary {
    /// Open library.db read-only.
    pub fn open(db_path: &Path) -> Result<Self> {
        if !db_path.is_file() {
            return Err(ImportError::SourceUnavailable(format!(
                "Jellyfin database not found: {}",
                db_path.display()
            )));
        }

        let conn = Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| ImportError::SourceUnavailable(format!("{}: {}", db_path.display(), e)))?;

        Ok(Self { conn })
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    fn collection_members(&self, collection_id: &rusqlite::types::Value) -> rusqlite::Result<Vec<String>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT tbi.Path
             FROM TypedBaseItems tbi
             JOIN CollectionItems ci ON tbi.Id = ci.ItemId
             WHERE ci.CollectionId = ?1
             ORDER BY ci.rowid",
        )?;
        let members = collect_paths(stmt.query_map(params![collection_id], |row| row.get(0))?)?;
        if !members.is_empty() {
            return Ok(members);
        }

        let mut stmt = self
            .conn
            .prepare_cached("SELECT Path FROM TypedBaseItems WHERE ParentId = ?1 ORDER BY rowid")?;
        let children = collect_paths(stmt.query_map(params![collection_id], |row| row.get(0))?)?;
        Ok(children)
    }
}

impl SourceCatalog for JellyfinLibrary {
    fn list_groups(&self) -> Result<Vec<ImportGroup>> {
        let read = || -> rusqlite::Result<Vec<ImportGroup>> {
            let mut stmt = self.conn.prepare(
                "SELECT Id, Name FROM TypedBaseItems WHERE type LIKE ?1 ORDER BY rowid",
            )?;
            let collections = stmt
                .query_map(params![JELLYFIN_COLLECTION_TYPE_PATTERN], |row| {
                    Ok((row.get::<_, rusqlite::types::Value>(0)?, row.get::<_, Option<String>>(1)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut groups = Vec::with_capacity(collections.len());
            for (id, name) in collections {
                let label = match name {
                    Some(n) if !n.trim().is_empty() => n,
                    _ => {
                        log::warn!("Skipping Jellyfin collection with no name");
                        continue;
                    }
                };
                let members = self.collection_members(&id)?;
                groups.push(ImportGroup { label, members });
            }
            Ok(groups)
        };

        read().map_err(|e| ImportError::SourceRead(format!("collections: {}", e)))
    }

    fn list_favorites(&self, user: Option<&str>) -> Result<Vec<String>> {
        let read = || -> rusqlite::Result<Vec<String>> {
            match user {
                Some(username) => {
                    let mut stmt = self.conn.prepare(
                        "SELECT tbi.Path
                         FROM UserDatas ud
                         JOIN TypedBaseItems tbi ON ud.ItemId = tbi.Id
                         JOIN Users u ON ud.UserId = u.Id
                         WHERE ud.IsFavorite = 1 AND u.Username = ?1",
                    )?;
                    let rows = stmt.query_map(params![username], |row| row.get(0))?;
                    collect_paths(rows)
                }
                None => {
                    let mut stmt = self.conn.prepare(
                        "SELECT tbi.Path
                         FROM UserDatas ud
                         JOIN TypedBaseItems tbi ON ud.ItemId = tbi.Id
                         WHERE ud.IsFavorite = 1",
                    )?;
                    let rows = stmt.query_map([], |row| row.get(0))?;
                    collect_paths(rows)
                }
            }
        };

        read().map_err(|e| ImportError::SourceRead(format!("favorites: {}", e)))
    }
}

/// Drop NULL and empty paths.
fn collect_paths<I>(rows: I) -> rusqlite::Result<Vec<String>>
where
    I: Iterator<Item = rusqlite::Result<Option<String>>>,
{
    let mut paths = Vec::new();
    for row in rows {
        if let Some(path) = row? {
            if !path.is_empty() {
                paths.push(path);
            }
        }
    }
    Ok(paths)
}
