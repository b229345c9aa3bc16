// PostgreSQL destination
// The catalog a running MediaHub server uses. Same session model as the SQLite
// store: one transaction per run, read-only for preview, rolled back on drop.
// Integer columns are cast to bigint in SQL so int4 and int8 schemas both work.

use std::cell::RefCell;

use postgres::{Client, NoTls, Transaction};

use crate::db::destination::{AccessMode, DestinationStore, DestinationTransaction, LabelCollation};
use crate::db::migrations::{REQUIRED_COLUMNS, REQUIRED_UNIQUE_KEYS};
use crate::db::schema::{escape_like, LabelId, RecordCandidate, RecordId, TagUpsert, UserId};
use crate::error::{ImportError, Result};

pub struct PostgresDestination {
    client: Client,
    access: AccessMode,
    collation: LabelCollation,
}

impl PostgresDestination {
    /// Connect with a libpq-style string (`host=... user=...`) or a `postgres://` URL.
    pub fn connect(url: &str, access: AccessMode) -> Result<Self> {
        // The connection string may carry a password; keep it out of the message.
        let client = Client::connect(url, NoTls)
            .map_err(|e| ImportError::DestinationUnavailable(format!("PostgreSQL catalog: {}", e)))?;
        Self::from_client(client, access)
    }

    /// Wrap a connected client and verify the catalog schema it sees.
    pub fn from_client(mut client: Client, access: AccessMode) -> Result<Self> {
        verify_schema(&mut client)?;
        let collation = detect_label_collation(&mut client)?;
        Ok(Self { client, access, collation })
    }

    pub fn access(&self) -> AccessMode {
        self.access
    }

    pub fn begin(&mut self) -> Result<PostgresSession<'_>> {
        let tx = self
            .client
            .build_transaction()
            .read_only(self.access == AccessMode::ReadOnly)
            .start()?;
        Ok(PostgresSession { tx: RefCell::new(tx), collation: self.collation })
    }
}

fn verify_schema(client: &mut Client) -> Result<()> {
    for (table, columns) in REQUIRED_COLUMNS {
        let table: &str = table;
        let present: Vec<String> = client
            .query(
                "SELECT column_name::text FROM information_schema.columns
                 WHERE table_schema = current_schema() AND table_name = $1",
                &[&table],
            )?
            .iter()
            .map(|row| row.try_get(0))
            .collect::<std::result::Result<_, _>>()?;

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
        let table: &str = table;
        let mut wanted: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
        wanted.sort();

        let row = client.query_one(
            "SELECT EXISTS (
                 SELECT 1 FROM pg_index i
                 JOIN pg_class t ON t.oid = i.indrelid
                 JOIN pg_namespace n ON n.oid = t.relnamespace
                 WHERE n.nspname = current_schema() AND t.relname = $1
                   AND i.indisunique AND i.indpred IS NULL
                   AND (SELECT array_agg(a.attname::text ORDER BY a.attname::text)
                        FROM pg_attribute a
                        WHERE a.attrelid = t.oid AND a.attnum = ANY(i.indkey)) = $2::text[]
             )",
            &[&table, &wanted],
        )?;

        if !row.try_get::<_, bool>(0)? {
            return Err(ImportError::Schema(format!(
                "table '{}' has no unique key on ({})",
                table,
                columns.join(", ")
            )));
        }
    }

    Ok(())
}

fn detect_label_collation(client: &mut Client) -> Result<LabelCollation> {
    let row = client.query_one(
        "SELECT format_type(a.atttypid, a.atttypmod)
         FROM pg_attribute a
         JOIN pg_class t ON t.oid = a.attrelid
         JOIN pg_namespace n ON n.oid = t.relnamespace
         WHERE n.nspname = current_schema() AND t.relname = 'tag' AND a.attname = 'name'",
        &[],
    )?;
    Ok(collation_for_type(&row.try_get::<_, String>(0)?))
}

fn collation_for_type(type_name: &str) -> LabelCollation {
    if type_name.eq_ignore_ascii_case("citext") {
        LabelCollation::Lowercase
    } else {
        LabelCollation::Binary
    }
}

/// One run's transaction on the PostgreSQL catalog.
pub struct PostgresSession<'client> {
    // postgres::Transaction needs &mut for every statement; the store API is &self.
    tx: RefCell<Transaction<'client>>,
    collation: LabelCollation,
}

impl DestinationTransaction for PostgresSession<'_> {
    fn commit(self) -> Result<()> {
        self.tx.into_inner().commit()?;
        Ok(())
    }

    fn rollback(self) -> Result<()> {
        self.tx.into_inner().rollback()?;
        Ok(())
    }
}

impl PostgresSession<'_> {
    fn query_id(&self, sql: &str, name: &str) -> Result<Option<i64>> {
        let row = self.tx.borrow_mut().query_opt(sql, &[&name])?;
        match row {
            Some(row) => Ok(Some(row.try_get(0)?)),
            None => Ok(None),
        }
    }

    fn query_flag(&self, sql: &str, a: i64, b: i64) -> Result<bool> {
        let row = self.tx.borrow_mut().query_one(sql, &[&a, &b])?;
        Ok(row.try_get(0)?)
    }
}

impl DestinationStore for PostgresSession<'_> {
    fn upsert_label(&self, name: &str) -> Result<TagUpsert> {
        let inserted = self.query_id(
            "INSERT INTO tag (name) VALUES ($1) ON CONFLICT (name) DO NOTHING RETURNING id::bigint",
            name,
        )?;
        if let Some(id) = inserted {
            return Ok(TagUpsert { id, created: true });
        }

        match self.find_label(name)? {
            Some(id) => Ok(TagUpsert { id, created: false }),
            None => Err(ImportError::Other(format!("tag '{}' vanished after upsert", name))),
        }
    }

    fn find_label(&self, name: &str) -> Result<Option<LabelId>> {
        self.query_id("SELECT id::bigint FROM tag WHERE name = $1", name)
    }

    fn find_record_by_exact_path(&self, path: &str) -> Result<Option<RecordId>> {
        self.query_id(
            "SELECT id::bigint FROM media_item WHERE path = $1 ORDER BY id LIMIT 1",
            path,
        )
    }

    fn find_records_by_basename(&self, basename: &str) -> Result<Vec<RecordCandidate>> {
        // PostgreSQL LIKE is already a case-sensitive suffix test once wildcards are escaped.
        let pattern = format!("%{}", escape_like(basename));
        let rows = self.tx.borrow_mut().query(
            "SELECT id::bigint, path, mtime::text FROM media_item
             WHERE path LIKE $1 ESCAPE '\\'
             ORDER BY id",
            &[&pattern],
        )?;

        let mut candidates = Vec::with_capacity(rows.len());
        for row in rows {
            candidates.push(RecordCandidate {
                id: row.try_get(0)?,
                path: row.try_get(1)?,
                mtime: row.try_get(2)?,
            });
        }
        Ok(candidates)
    }

    fn membership_exists(&self, label: LabelId, record: RecordId) -> Result<bool> {
        self.query_flag(
            "SELECT EXISTS (SELECT 1 FROM item_tag WHERE item_id = $1::bigint AND tag_id = $2::bigint)",
            record,
            label,
        )
    }

    fn add_membership(&self, label: LabelId, record: RecordId) -> Result<bool> {
        let inserted = self.tx.borrow_mut().execute(
            "INSERT INTO item_tag (item_id, tag_id) VALUES ($1::bigint, $2::bigint) ON CONFLICT DO NOTHING",
            &[&record, &label],
        )?;
        Ok(inserted == 1)
    }

    fn favorite_exists(&self, user: UserId, record: RecordId) -> Result<bool> {
        self.query_flag(
            "SELECT EXISTS (SELECT 1 FROM user_favorite WHERE user_id = $1::bigint AND item_id = $2::bigint)",
            user,
            record,
        )
    }

    fn add_favorite(&self, user: UserId, record: RecordId) -> Result<bool> {
        let inserted = self.tx.borrow_mut().execute(
            "INSERT INTO user_favorite (user_id, item_id) VALUES ($1::bigint, $2::bigint) ON CONFLICT DO NOTHING",
            &[&user, &record],
        )?;
        Ok(inserted == 1)
    }

    fn user_exists(&self, user: UserId) -> Result<bool> {
        let row = self
            .tx
            .borrow_mut()
            .query_one("SELECT EXISTS (SELECT 1 FROM app_user WHERE id = $1::bigint)", &[&user])?;
        Ok(row.try_get(0)?)
    }

    fn label_collation(&self) -> LabelCollation {
        self.collation
    }
}
