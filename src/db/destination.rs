// Destination catalog store
// One destination is opened per run; all reads and writes of the run go
// through a session (one transaction). Dropping a session without commit
// rolls it back, which covers every fatal-error exit.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, OpenFlags, Transaction, TransactionBehavior};

use crate::constants::BUSY_TIMEOUT_MS;
use crate::db::migrations::{detect_label_collation, verify_destination_schema};
use crate::db::schema::{self, LabelId, RecordCandidate, RecordId, TagUpsert, UserId};
use crate::error::{ImportError, Result};

/// Operations the reconciliation engine needs from a destination catalog.
///
/// Writes are idempotent: re-asserting an existing label, membership or
/// favorite returns the existing state instead of failing.
pub trait DestinationStore {
    /// Insert-or-return-existing on the label name.
    fn upsert_label(&self, name: &str) -> Result<TagUpsert>;
    fn find_label(&self, name: &str) -> Result<Option<LabelId>>;

    fn find_record_by_exact_path(&self, path: &str) -> Result<Option<RecordId>>;
    /// Every record whose path ends with `basename` (plain, case-sensitive
    /// string suffix). Picking among several is the resolver's job.
    fn find_records_by_basename(&self, basename: &str) -> Result<Vec<RecordCandidate>>;

    fn membership_exists(&self, label: LabelId, record: RecordId) -> Result<bool>;
    /// Returns true when the membership was newly written.
    fn add_membership(&self, label: LabelId, record: RecordId) -> Result<bool>;

    fn favorite_exists(&self, user: UserId, record: RecordId) -> Result<bool>;
    /// Returns true when the favorite was newly written.
    fn add_favorite(&self, user: UserId, record: RecordId) -> Result<bool>;

    fn user_exists(&self, user: UserId) -> Result<bool>;

    /// How `tag.name` compares for uniqueness in this destination.
    fn label_collation(&self) -> LabelCollation;
}

/// A destination session the run either commits or discards.
pub trait DestinationTransaction: DestinationStore + Sized {
    fn commit(self) -> Result<()>;
    fn rollback(self) -> Result<()>;
}

/// Equivalence of label names under the destination's unique key on `tag.name`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LabelCollation {
    #[default]
    Binary,
    /// SQLite NOCASE: folds ASCII letters only.
    NoCase,
    /// SQLite RTRIM: trailing spaces are ignored.
    RTrim,
    /// PostgreSQL citext: compares lowercased text.
    Lowercase,
}

impl LabelCollation {
    /// Two names collide in the destination exactly when their keys are equal.
    pub fn key(self, name: &str) -> String {
        match self {
            LabelCollation::Binary => name.to_string(),
            LabelCollation::NoCase => name.to_ascii_lowercase(),
            LabelCollation::RTrim => name.trim_end_matches(' ').to_string(),
            LabelCollation::Lowercase => name.to_lowercase(),
        }
    }
}

/// How the destination is opened for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    ReadWrite,
}

/// Open handle on a destination catalog file.
pub struct SqliteDestination {
    conn: Connection,
    access: AccessMode,
    path: PathBuf,
    collation: LabelCollation,
}

impl SqliteDestination {
    /// Open an existing catalog and verify its schema. Never creates a file.
    pub fn open(path: &Path, access: AccessMode) -> Result<Self> {
        if !path.is_file() {
            return Err(ImportError::DestinationUnavailable(format!(
                "catalog not found: {}",
                path.display()
            )));
        }

        let flags = match access {
            AccessMode::ReadOnly => OpenFlags::SQLITE_OPEN_READ_ONLY,
            AccessMode::ReadWrite => OpenFlags::SQLITE_OPEN_READ_WRITE,
        } | OpenFlags::SQLITE_OPEN_NO_MUTEX
            | OpenFlags::SQLITE_OPEN_URI;

        let conn = Connection::open_with_flags(path, flags).map_err(|e| {
            ImportError::DestinationUnavailable(format!("{}: {}", path.display(), e))
        })?;

        Self::from_connection(conn, access, path.to_path_buf())
    }

    /// Wrap an already-open connection (in-memory catalogs in tests, for example).
    pub fn from_connection(conn: Connection, access: AccessMode, path: PathBuf) -> Result<Self> {
        let prepared = (|| -> Result<LabelCollation> {
            conn.busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS))?;
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            verify_destination_schema(&conn)?;
            detect_label_collation(&conn)
        })();

        // A corrupt, locked or non-SQLite file surfaces as a plain database error here.
        let collation = prepared.map_err(|e| match e {
            ImportError::Database(inner) => {
                ImportError::DestinationUnavailable(format!("{}: {}", path.display(), inner))
            }
            other => other,
        })?;

        Ok(Self { conn, access, path, collation })
    }

    pub fn access(&self) -> AccessMode {
        self.access
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Start the run's transaction. Read-write sessions take the write lock up front.
    pub fn begin(&mut self) -> Result<DestinationSession<'_>> {
        let behavior = match self.access {
            AccessMode::ReadOnly => TransactionBehavior::Deferred,
            AccessMode::ReadWrite => TransactionBehavior::Immediate,
        };
        let tx = self.conn.transaction_with_behavior(behavior)?;
        Ok(DestinationSession { tx, collation: self.collation })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

/// One run's view of the destination. Uncommitted work is rolled back on drop.
pub struct DestinationSession<'conn> {
    tx: Transaction<'conn>,
    collation: LabelCollation,
}

impl DestinationTransaction for DestinationSession<'_> {
    fn commit(self) -> Result<()> {
        self.tx.commit()?;
        Ok(())
    }

    fn rollback(self) -> Result<()> {
        self.tx.rollback()?;
        Ok(())
    }
}

impl DestinationStore for DestinationSession<'_> {
    fn upsert_label(&self, name: &str) -> Result<TagUpsert> {
        schema::upsert_tag(&self.tx, name)
    }

    fn find_label(&self, name: &str) -> Result<Option<LabelId>> {
        schema::get_tag_id(&self.tx, name)
    }

    fn find_record_by_exact_path(&self, path: &str) -> Result<Option<RecordId>> {
        schema::find_media_item_by_path(&self.tx, path)
    }

    fn find_records_by_basename(&self, basename: &str) -> Result<Vec<RecordCandidate>> {
        let candidates = schema::find_media_items_ending_with(&self.tx, basename)?;
        Ok(candidates
            .into_iter()
            .filter(|c| c.path.ends_with(basename))
            .collect())
    }

    fn membership_exists(&self, label: LabelId, record: RecordId) -> Result<bool> {
        schema::has_item_tag(&self.tx, record, label)
    }

    fn add_membership(&self, label: LabelId, record: RecordId) -> Result<bool> {
        schema::add_item_tag(&self.tx, record, label)
    }

    fn favorite_exists(&self, user: UserId, record: RecordId) -> Result<bool> {
        schema::has_user_favorite(&self.tx, user, record)
    }

    fn add_favorite(&self, user: UserId, record: RecordId) -> Result<bool> {
        schema::add_user_favorite(&self.tx, user, record)
    }

    fn user_exists(&self, user: UserId) -> Result<bool> {
        schema::user_exists(&self.tx, user)
    }

    fn label_collation(&self) -> LabelCollation {
        self.collation
    }
}
