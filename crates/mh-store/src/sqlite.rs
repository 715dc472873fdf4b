//! SQLite back-end (feature `sqlite`).
//!
//! One table, one JSON document per `(kind, id)` key.  The connection sits
//! behind a mutex and every call is a single short statement, so calls run
//! inline on the async caller's thread.

use std::path::Path;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use serde::de::DeserializeOwned;

use mh_core::{Carrier, GraphSnapshot, ItemId, Location, LocationId, Robot, RobotId};

use crate::{FacilityStore, StoreResult};

const GRAPH_KEY: &str = "default";

/// Persists facility records to an SQLite database file.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and initialise the schema.
    pub fn open(path: &Path) -> StoreResult<Self> {
        Self::init(Connection::open(path)?)
    }

    /// Private in-memory database; contents vanish with the store.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous  = NORMAL;
             CREATE TABLE IF NOT EXISTS records (
                 kind TEXT NOT NULL,
                 id   TEXT NOT NULL,
                 body TEXT NOT NULL,
                 PRIMARY KEY (kind, id)
             );",
        )?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn get<T: DeserializeOwned>(&self, kind: &str, id: &str) -> StoreResult<Option<T>> {
        let conn = self.conn.lock();
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM records WHERE kind = ?1 AND id = ?2",
                rusqlite::params![kind, id],
                |row| row.get(0),
            )
            .optional()?;
        body.map(|b| serde_json::from_str(&b)).transpose().map_err(Into::into)
    }

    fn put<T: Serialize>(&self, kind: &str, id: &str, value: &T) -> StoreResult<()> {
        let body = serde_json::to_string(value)?;
        self.conn.lock().execute(
            "INSERT INTO records (kind, id, body) VALUES (?1, ?2, ?3) \
             ON CONFLICT (kind, id) DO UPDATE SET body = excluded.body",
            rusqlite::params![kind, id, body],
        )?;
        Ok(())
    }

    fn list<T: DeserializeOwned>(&self, kind: &str) -> StoreResult<Vec<T>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached("SELECT body FROM records WHERE kind = ?1 ORDER BY id")?;
        let bodies = stmt
            .query_map(rusqlite::params![kind], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        bodies
            .iter()
            .map(|b| serde_json::from_str(b).map_err(Into::into))
            .collect()
    }
}

#[async_trait]
impl FacilityStore for SqliteStore {
    async fn get_location(&self, id: &LocationId) -> StoreResult<Option<Location>> {
        self.get("location", id.as_str())
    }

    async fn put_location(&self, location: &Location) -> StoreResult<()> {
        self.put("location", location.id.as_str(), location)
    }

    async fn list_locations(&self) -> StoreResult<Vec<Location>> {
        self.list("location")
    }

    async fn get_item(&self, id: &ItemId) -> StoreResult<Option<Carrier>> {
        self.get("item", id.as_str())
    }

    async fn put_item(&self, item: &Carrier) -> StoreResult<()> {
        self.put("item", item.id.as_str(), item)
    }

    async fn list_items(&self) -> StoreResult<Vec<Carrier>> {
        self.list("item")
    }

    async fn get_robot(&self, id: &RobotId) -> StoreResult<Option<Robot>> {
        self.get("robot", id.as_str())
    }

    async fn put_robot(&self, robot: &Robot) -> StoreResult<()> {
        self.put("robot", robot.id.as_str(), robot)
    }

    async fn list_robots(&self) -> StoreResult<Vec<Robot>> {
        self.list("robot")
    }

    async fn get_graph(&self) -> StoreResult<Option<GraphSnapshot>> {
        self.get("graph", GRAPH_KEY)
    }

    async fn put_graph(&self, graph: &GraphSnapshot) -> StoreResult<()> {
        self.put("graph", GRAPH_KEY, graph)
    }
}
