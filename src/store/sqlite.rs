use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::collections::{CaseResult, Collection, TestCase};
use crate::error::{EngineError, Result};

use super::CollectionStore;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS collections (
  id TEXT PRIMARY KEY,
  name TEXT NOT NULL,
  position INTEGER NOT NULL,
  updated_at INTEGER NOT NULL DEFAULT (strftime('%s','now'))
);
CREATE TABLE IF NOT EXISTS test_cases (
  id TEXT PRIMARY KEY,
  collection_id TEXT NOT NULL REFERENCES collections(id) ON DELETE CASCADE,
  position INTEGER NOT NULL,
  case_json TEXT NOT NULL,
  updated_at INTEGER NOT NULL DEFAULT (strftime('%s','now'))
);
CREATE INDEX IF NOT EXISTS test_cases_by_collection ON test_cases (collection_id, position);
";

/// Local store keeping each test case as a JSON document.
///
/// Calls run on the caller's task; statements are short and serialized by
/// the connection mutex.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|err| EngineError::storage(format!("opening {}", path.display()), err))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|err| EngineError::storage("setting SQLite journal mode", err))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|err| EngineError::storage("opening in-memory SQLite", err))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|err| EngineError::storage("enabling foreign keys", err))?;
        conn.execute_batch(SCHEMA)
            .map_err(|err| EngineError::storage("initializing SQLite schema", err))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn load_case(conn: &Connection, id: &str) -> Result<TestCase> {
        let raw: Option<String> = conn
            .query_row(
                "SELECT case_json FROM test_cases WHERE id = ?1 LIMIT 1;",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        let raw = raw.ok_or_else(|| EngineError::not_found("Test case", id))?;
        decode_case(&raw)
    }

    fn write_case(conn: &Connection, case: &TestCase) -> Result<()> {
        let changed = conn.execute(
            "UPDATE test_cases
             SET case_json = ?2, updated_at = strftime('%s','now')
             WHERE id = ?1;",
            params![case.id, encode_case(case)?],
        )?;
        if changed == 0 {
            return Err(EngineError::not_found("Test case", &case.id));
        }
        Ok(())
    }
}

fn encode_case(case: &TestCase) -> Result<String> {
    serde_json::to_string(case).map_err(|err| EngineError::storage("serializing test case", err))
}

fn decode_case(raw: &str) -> Result<TestCase> {
    serde_json::from_str(raw).map_err(|err| EngineError::storage("parsing stored test case", err))
}

#[async_trait]
impl CollectionStore for SqliteStore {
    async fn list_collections(&self) -> Result<Vec<Collection>> {
        let conn = self.lock();

        let mut stmt = conn.prepare("SELECT id, name FROM collections ORDER BY position, rowid;")?;
        let mut collections = stmt
            .query_map([], |row| {
                Ok(Collection::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare(
            "SELECT case_json FROM test_cases WHERE collection_id = ?1 ORDER BY position, rowid;",
        )?;
        for collection in &mut collections {
            let rows = stmt
                .query_map(params![collection.id], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            collection.test_cases = rows.iter().map(|raw| decode_case(raw)).collect::<Result<_>>()?;
        }

        debug!(count = collections.len(), "Loaded collections from SQLite");
        Ok(collections)
    }

    async fn create_collection(&self, collection: &Collection) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO collections (id, name, position)
             VALUES (?1, ?2, (SELECT COALESCE(MAX(position), -1) + 1 FROM collections));",
            params![collection.id, collection.name],
        )?;
        for (position, case) in collection.test_cases.iter().enumerate() {
            tx.execute(
                "INSERT INTO test_cases (id, collection_id, position, case_json)
                 VALUES (?1, ?2, ?3, ?4);",
                params![case.id, collection.id, position as i64, encode_case(case)?],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    async fn rename_collection(&self, id: &str, name: &str) -> Result<()> {
        let changed = self.lock().execute(
            "UPDATE collections SET name = ?2, updated_at = strftime('%s','now') WHERE id = ?1;",
            params![id, name],
        )?;
        if changed == 0 {
            return Err(EngineError::not_found("Collection", id));
        }
        Ok(())
    }

    async fn delete_collection(&self, id: &str) -> Result<()> {
        self.lock()
            .execute("DELETE FROM collections WHERE id = ?1;", params![id])?;
        Ok(())
    }

    async fn create_case(&self, collection_id: &str, case: &TestCase) -> Result<()> {
        let case = TestCase {
            publish_id: Some(collection_id.to_string()),
            ..case.clone()
        };
        let conn = self.lock();
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM collections WHERE id = ?1);",
            params![collection_id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(EngineError::not_found("Collection", collection_id));
        }

        conn.execute(
            "INSERT INTO test_cases (id, collection_id, position, case_json)
             VALUES (?1, ?2,
               (SELECT COALESCE(MAX(position), -1) + 1 FROM test_cases WHERE collection_id = ?2),
               ?3);",
            params![case.id, collection_id, encode_case(&case)?],
        )?;
        Ok(())
    }

    async fn update_case(&self, case: &TestCase) -> Result<()> {
        Self::write_case(&self.lock(), case)
    }

    async fn save_result(&self, case_id: &str, result: &CaseResult) -> Result<()> {
        let conn = self.lock();
        let case = Self::load_case(&conn, case_id)?;
        Self::write_case(&conn, &case.with_result(result))
    }

    async fn delete_case(&self, id: &str) -> Result<()> {
        self.lock()
            .execute("DELETE FROM test_cases WHERE id = ?1;", params![id])?;
        Ok(())
    }
}
