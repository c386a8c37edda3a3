// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `Route`/`RouteEntry`, `Reservation`, `GlobalIdManager` and the
//! reservation manager (spec.md §3, §4.9).

use crate::request::PortChannel;
use crate::store::{ReservationRecord, ReservationStore, RouteEntryRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteEntry {
    pub src: PortChannel,
    pub dst: PortChannel,
    pub x: bool,
    pub c: bool,
    pub is_go: bool,
}

impl RouteEntry {
    /// `src@in_ch # dst@out_ch @ x` — dedup key for primary-solve merges.
    pub fn xkey(&self) -> String {
        format!("{}#{}@x", self.src, self.dst)
    }

    /// `src@in_ch # dst@out_ch @ c` — dedup key for channel-solve merges.
    pub fn ckey(&self) -> String {
        format!("{}#{}@c", self.src, self.dst)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Route {
    pub entries: Vec<RouteEntry>,
}

impl Route {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge newly-solved primary-solve entries, deduping on `xkey`
    /// (spec.md §8: route dedup).
    pub fn merge_pf_route(&mut self, incoming: &[RouteEntry]) {
        let mut seen: std::collections::HashSet<String> =
            self.entries.iter().map(|e| e.xkey()).collect();
        for entry in incoming {
            let key = entry.xkey();
            if seen.insert(key) {
                self.entries.push(entry.clone());
            }
        }
    }

    /// Merge newly-solved channel-assignment entries, deduping on `ckey`.
    pub fn merge_solvec_route(&mut self, incoming: &[RouteEntry]) {
        let mut seen: std::collections::HashSet<String> =
            self.entries.iter().map(|e| e.ckey()).collect();
        for entry in incoming {
            let key = entry.ckey();
            if seen.insert(key) {
                self.entries.push(entry.clone());
            }
        }
    }

    pub fn contains_xkey(&self, entry: &RouteEntry) -> bool {
        self.entries.iter().any(|e| e.xkey() == entry.xkey())
    }

    pub fn total_cost(&self, cost_of: impl Fn(&RouteEntry) -> f64) -> f64 {
        self.entries.iter().map(cost_of).sum()
    }
}

#[derive(Debug, Clone)]
pub struct Reservation {
    pub global_id: String,
    pub src: PortChannel,
    pub dst: PortChannel,
    pub route: Route,
    pub written_db: bool,
}

impl Reservation {
    pub fn new(src: PortChannel, dst: PortChannel, route: Route) -> Self {
        Self {
            global_id: format!("urn:uuid:{}", Uuid::new_v4()),
            src,
            dst,
            route,
            written_db: false,
        }
    }

    pub fn to_record(&self) -> ReservationRecord {
        ReservationRecord {
            globalid: self.global_id.clone(),
            src: self.src.to_string(),
            dst: self.dst.to_string(),
            route: self
                .route
                .entries
                .iter()
                .map(|e| RouteEntryRecord {
                    src: e.src.to_string(),
                    dst: e.dst.to_string(),
                    x: e.x,
                    c: e.c,
                    is_go: e.is_go,
                })
                .collect(),
        }
    }
}

/// Bijection between short integer ids (process-local, not durable) and
/// global UUIDs (spec.md §3, §9 Open Question 3).
#[derive(Default)]
pub struct GlobalIdManager {
    next: AtomicU64,
    short_to_global: std::sync::Mutex<HashMap<u64, String>>,
    global_to_short: std::sync::Mutex<HashMap<String, u64>>,
}

impl GlobalIdManager {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
            short_to_global: std::sync::Mutex::new(HashMap::new()),
            global_to_short: std::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn issue(&self, global_id: &str) -> u64 {
        let short = self.next.fetch_add(1, Ordering::SeqCst);
        self.short_to_global
            .lock()
            .unwrap()
            .insert(short, global_id.to_string());
        self.global_to_short
            .lock()
            .unwrap()
            .insert(global_id.to_string(), short);
        short
    }

    pub fn global_of(&self, short: u64) -> Option<String> {
        self.short_to_global.lock().unwrap().get(&short).cloned()
    }

    pub fn short_of(&self, global: &str) -> Option<u64> {
        self.global_to_short.lock().unwrap().get(global).copied()
    }

    pub fn remove(&self, global: &str) {
        if let Some(short) = self.global_to_short.lock().unwrap().remove(global) {
            self.short_to_global.lock().unwrap().remove(&short);
        }
    }
}

/// In-memory reservation map plus durable-store interaction
/// (spec.md §4.9).
pub struct ReservationManager {
    reservations: HashMap<String, Reservation>,
    pub ids: GlobalIdManager,
}

impl ReservationManager {
    pub fn new() -> Self {
        Self {
            reservations: HashMap::new(),
            ids: GlobalIdManager::new(),
        }
    }

    pub fn add(&mut self, reservation: Reservation) -> u64 {
        let short = self.ids.issue(&reservation.global_id);
        self.reservations
            .insert(reservation.global_id.clone(), reservation);
        short
    }

    pub fn get(&self, global_id: &str) -> Option<&Reservation> {
        self.reservations.get(global_id)
    }

    pub fn get_by_short(&self, short: u64) -> Option<&Reservation> {
        let global = self.ids.global_of(short)?;
        self.reservations.get(&global)
    }

    pub fn all(&self) -> impl Iterator<Item = &Reservation> {
        self.reservations.values()
    }

    /// Flush all not-yet-written reservations to the store; returns the
    /// count written, accumulating per-entry failures into a message.
    pub fn write_db(&mut self, store: &dyn ReservationStore) -> (usize, Vec<String>) {
        let mut written = 0;
        let mut failures = Vec::new();
        for rsv in self.reservations.values_mut() {
            if rsv.written_db {
                continue;
            }
            match store.put(&rsv.to_record()) {
                Ok(()) => {
                    rsv.written_db = true;
                    written += 1;
                }
                Err(e) => failures.push(format!("{}: {}", rsv.global_id, e)),
            }
        }
        (written, failures)
    }

    /// Delete from memory (and optionally the store); returns whether an
    /// entry was actually removed.
    pub fn delete(&mut self, global_id: &str, store: Option<&dyn ReservationStore>) -> bool {
        let removed = self.reservations.remove(global_id).is_some();
        if removed {
            self.ids.remove(global_id);
        }
        if let Some(store) = store {
            let _ = store.delete(global_id);
        }
        removed
    }

    pub fn delete_all(&mut self, store: Option<&dyn ReservationStore>) -> usize {
        let ids: Vec<String> = self.reservations.keys().cloned().collect();
        let count = ids.len();
        for id in &ids {
            self.ids.remove(id);
        }
        self.reservations.clear();
        if let Some(store) = store {
            let _ = store.delete_all();
        }
        count
    }

    /// All RouteEntries with `x=true` across all reservations
    /// (spec.md §4.9).
    pub fn find_used_path(&self) -> Route {
        let mut route = Route::new();
        for rsv in self.reservations.values() {
            for entry in &rsv.route.entries {
                if entry.x {
                    route.entries.push(entry.clone());
                }
            }
        }
        route
    }

    /// All RouteEntries from all reservations, `c=true` for each
    /// (spec.md §4.9).
    pub fn make_use_connection_list(&self) -> Route {
        let mut route = Route::new();
        for rsv in self.reservations.values() {
            for entry in &rsv.route.entries {
                let mut e = entry.clone();
                e.c = true;
                route.entries.push(e);
            }
        }
        route
    }
}

impl Default for ReservationManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryReservationStore;

    fn entry(src: &str, dst: &str) -> RouteEntry {
        RouteEntry {
            src: PortChannel::new(src, "WDM32_1"),
            dst: PortChannel::new(dst, "WDM32_1"),
            x: true,
            c: true,
            is_go: true,
        }
    }

    #[test]
    fn merge_pf_route_dedups_by_xkey() {
        let mut route = Route::new();
        route.merge_pf_route(&[entry("N1_1", "N1_2")]);
        route.merge_pf_route(&[entry("N1_1", "N1_2"), entry("N1_2", "N2_1")]);
        assert_eq!(route.entries.len(), 2);
    }

    #[test]
    fn short_ids_do_not_reuse_after_delete() {
        let mut mgr = ReservationManager::new();
        let rsv1 = Reservation::new(
            PortChannel::new("N1_1", "WDM32_1"),
            PortChannel::new("N2_2", "WDM32_1"),
            Route::new(),
        );
        let id1 = rsv1.global_id.clone();
        let short1 = mgr.add(rsv1);
        assert_eq!(short1, 1);
        mgr.delete(&id1, None);

        let rsv2 = Reservation::new(
            PortChannel::new("N1_1", "WDM32_1"),
            PortChannel::new("N2_2", "WDM32_1"),
            Route::new(),
        );
        let short2 = mgr.add(rsv2);
        assert_eq!(short2, 2);
    }

    #[test]
    fn write_db_marks_written_and_counts() {
        let mut mgr = ReservationManager::new();
        let rsv = Reservation::new(
            PortChannel::new("N1_1", "WDM32_1"),
            PortChannel::new("N2_2", "WDM32_1"),
            Route::new(),
        );
        mgr.add(rsv);
        let store = InMemoryReservationStore::new();
        let (count, failures) = mgr.write_db(&store);
        assert_eq!(count, 1);
        assert!(failures.is_empty());
        let (count2, _) = mgr.write_db(&store);
        assert_eq!(count2, 0, "already-written reservations are skipped");
    }

    #[test]
    fn find_used_path_only_includes_x_entries() {
        let mut mgr = ReservationManager::new();
        let mut route = Route::new();
        route.entries.push(entry("N1_1", "N1_2"));
        let mut c_only = entry("N1_2", "N2_1");
        c_only.x = false;
        route.entries.push(c_only);
        mgr.add(Reservation::new(
            PortChannel::new("N1_1", "WDM32_1"),
            PortChannel::new("N2_1", "WDM32_1"),
            route,
        ));
        let used = mgr.find_used_path();
        assert_eq!(used.entries.len(), 1);
    }
}
