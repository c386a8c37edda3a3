// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Reservation persistence
//!
//! Defines the trait for durable reservation storage (spec.md §6) plus a
//! SQLite-backed implementation and an in-memory test double.

use crate::error::{NrmError, Result};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

/// One persisted route leg, mirroring the wire/DB schema in spec.md §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteEntryRecord {
    pub src: String,
    pub dst: String,
    pub x: bool,
    pub c: bool,
    pub is_go: bool,
}

/// A persisted reservation record (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationRecord {
    pub globalid: String,
    pub src: String,
    pub dst: String,
    pub route: Vec<RouteEntryRecord>,
}

/// Reservation store trait
///
/// Backend-agnostic interface for durable reservation persistence.
pub trait ReservationStore: Send + Sync {
    fn put(&self, record: &ReservationRecord) -> Result<()>;
    fn get(&self, globalid: &str) -> Result<Option<ReservationRecord>>;
    fn delete(&self, globalid: &str) -> Result<()>;
    fn scan(&self) -> Result<Vec<ReservationRecord>>;
    fn delete_all(&self) -> Result<()>;
}

/// SQLite-backed reservation store (spec.md §6, §9).
///
/// Thread-safe via internal Mutex (SQLite `Connection` is not `Sync`), the
/// same shape as the teacher's persistence crate.
pub struct SqliteReservationStore {
    conn: Mutex<Connection>,
}

impl SqliteReservationStore {
    pub fn open(path: &std::path::Path) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| NrmError::Reservation(format!("opening {}: {e}", path.display())))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| NrmError::Reservation(format!("opening in-memory db: {e}")))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "CREATE TABLE IF NOT EXISTS reservations (
                globalid TEXT PRIMARY KEY,
                src TEXT NOT NULL,
                dst TEXT NOT NULL,
                route_json TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| NrmError::Reservation(e.to_string()))?;
        Ok(())
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<ReservationRecord> {
        let globalid: String = row.get(0)?;
        let src: String = row.get(1)?;
        let dst: String = row.get(2)?;
        let route_json: String = row.get(3)?;
        let route: Vec<RouteEntryRecord> = serde_json::from_str(&route_json).unwrap_or_default();
        Ok(ReservationRecord {
            globalid,
            src,
            dst,
            route,
        })
    }
}

impl ReservationStore for SqliteReservationStore {
    fn put(&self, record: &ReservationRecord) -> Result<()> {
        let route_json = serde_json::to_string(&record.route)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO reservations (globalid, src, dst, route_json)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(globalid) DO UPDATE SET src=?2, dst=?3, route_json=?4",
            params![record.globalid, record.src, record.dst, route_json],
        )
        .map_err(|e| NrmError::Reservation(e.to_string()))?;
        Ok(())
    }

    fn get(&self, globalid: &str) -> Result<Option<ReservationRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT globalid, src, dst, route_json FROM reservations WHERE globalid = ?1")
            .map_err(|e| NrmError::Reservation(e.to_string()))?;
        let mut rows = stmt
            .query_map([globalid], Self::row_to_record)
            .map_err(|e| NrmError::Reservation(e.to_string()))?;
        match rows.next() {
            Some(r) => Ok(Some(r.map_err(|e| NrmError::Reservation(e.to_string()))?)),
            None => Ok(None),
        }
    }

    fn delete(&self, globalid: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM reservations WHERE globalid = ?1", [globalid])
            .map_err(|e| NrmError::Reservation(e.to_string()))?;
        Ok(())
    }

    fn scan(&self) -> Result<Vec<ReservationRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT globalid, src, dst, route_json FROM reservations")
            .map_err(|e| NrmError::Reservation(e.to_string()))?;
        let rows = stmt
            .query_map([], Self::row_to_record)
            .map_err(|e| NrmError::Reservation(e.to_string()))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| NrmError::Reservation(e.to_string()))
    }

    fn delete_all(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM reservations", [])
            .map_err(|e| NrmError::Reservation(e.to_string()))?;
        Ok(())
    }
}

/// In-memory test double (spec.md §9: solver/store isolation for tests).
#[derive(Default)]
pub struct InMemoryReservationStore {
    records: Mutex<HashMap<String, ReservationRecord>>,
}

impl InMemoryReservationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReservationStore for InMemoryReservationStore {
    fn put(&self, record: &ReservationRecord) -> Result<()> {
        self.records
            .lock()
            .unwrap()
            .insert(record.globalid.clone(), record.clone());
        Ok(())
    }

    fn get(&self, globalid: &str) -> Result<Option<ReservationRecord>> {
        Ok(self.records.lock().unwrap().get(globalid).cloned())
    }

    fn delete(&self, globalid: &str) -> Result<()> {
        self.records.lock().unwrap().remove(globalid);
        Ok(())
    }

    fn scan(&self) -> Result<Vec<ReservationRecord>> {
        Ok(self.records.lock().unwrap().values().cloned().collect())
    }

    fn delete_all(&self) -> Result<()> {
        self.records.lock().unwrap().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> ReservationRecord {
        ReservationRecord {
            globalid: id.to_string(),
            src: "N1_1@WDM32_1".to_string(),
            dst: "N2_2@WDM32_1".to_string(),
            route: vec![RouteEntryRecord {
                src: "N1_1@WDM32_1".to_string(),
                dst: "N1_2@WDM32_1".to_string(),
                x: true,
                c: true,
                is_go: true,
            }],
        }
    }

    #[test]
    fn sqlite_store_put_get_roundtrip() {
        let store = SqliteReservationStore::open_in_memory().unwrap();
        store.put(&record("urn:uuid:1")).unwrap();
        let loaded = store.get("urn:uuid:1").unwrap().unwrap();
        assert_eq!(loaded.route.len(), 1);
        assert_eq!(loaded.src, "N1_1@WDM32_1");
    }

    #[test]
    fn sqlite_store_put_upserts() {
        let store = SqliteReservationStore::open_in_memory().unwrap();
        store.put(&record("urn:uuid:1")).unwrap();
        let mut updated = record("urn:uuid:1");
        updated.dst = "N3_1@WDM32_1".to_string();
        store.put(&updated).unwrap();
        let loaded = store.get("urn:uuid:1").unwrap().unwrap();
        assert_eq!(loaded.dst, "N3_1@WDM32_1");
        assert_eq!(store.scan().unwrap().len(), 1);
    }

    #[test]
    fn sqlite_store_delete_all() {
        let store = SqliteReservationStore::open_in_memory().unwrap();
        store.put(&record("urn:uuid:1")).unwrap();
        store.put(&record("urn:uuid:2")).unwrap();
        store.delete_all().unwrap();
        assert!(store.scan().unwrap().is_empty());
    }

    #[test]
    fn in_memory_store_get_missing_is_none() {
        let store = InMemoryReservationStore::new();
        assert!(store.get("missing").unwrap().is_none());
    }
}
