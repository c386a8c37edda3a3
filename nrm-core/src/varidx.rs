// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `VarIdxTable`: dense, append-only index over feasible
//! (in_port, in_ch, out_port, out_ch) tuples (spec.md §3, §4.4).
//!
//! The source pickles this table next to its skeleton; a from-scratch
//! Rust implementation has no pickle equivalent, so it is persisted as
//! JSON instead (see DESIGN.md Open Question 4).

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

pub type Tuple = (String, String, String, String);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VarIdxTable {
    index: HashMap<Tuple, usize>,
    ordered: Vec<Tuple>,
}

impl VarIdxTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a tuple if new and return its 1-based index; if already
    /// present, return the existing index. Injective by construction
    /// (spec.md §8: VarIdxTable injectivity).
    pub fn insert(&mut self, in_port: &str, in_ch: &str, out_port: &str, out_ch: &str) -> usize {
        let key = (
            in_port.to_string(),
            in_ch.to_string(),
            out_port.to_string(),
            out_ch.to_string(),
        );
        if let Some(&idx) = self.index.get(&key) {
            return idx;
        }
        self.ordered.push(key.clone());
        let idx = self.ordered.len();
        self.index.insert(key, idx);
        idx
    }

    pub fn idx(&self, in_port: &str, in_ch: &str, out_port: &str, out_ch: &str) -> Option<usize> {
        let key = (
            in_port.to_string(),
            in_ch.to_string(),
            out_port.to_string(),
            out_ch.to_string(),
        );
        self.index.get(&key).copied()
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    pub fn tuples(&self) -> impl Iterator<Item = (&Tuple, usize)> {
        self.ordered.iter().map(|t| (t, self.index[t]))
    }

    /// Channels seen flowing into `port` across all recorded tuples.
    pub fn flow_in_channels(&self, port: &str) -> Vec<String> {
        let mut out: Vec<String> = self
            .ordered
            .iter()
            .filter(|(_, _, out_port, _)| out_port == port)
            .map(|(_, _, _, out_ch)| out_ch.clone())
            .collect();
        out.sort();
        out.dedup();
        out
    }

    /// Out-channels reachable for a given (in_port,in_ch,out_port) triple.
    pub fn flow_out_channels(&self, in_port: &str, in_ch: &str, out_port: &str) -> Vec<String> {
        let mut out: Vec<String> = self
            .ordered
            .iter()
            .filter(|(ip, ic, op, _)| ip == in_port && ic == in_ch && op == out_port)
            .map(|(_, _, _, oc)| oc.clone())
            .collect();
        out.sort();
        out.dedup();
        out
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_is_injective_and_stable() {
        let mut vt = VarIdxTable::new();
        let a = vt.insert("N1_1", "WDM32_1", "N1_2", "WDM32_1");
        let b = vt.insert("N1_1", "WDM32_1", "N1_3", "WDM32_1");
        let a_again = vt.insert("N1_1", "WDM32_1", "N1_2", "WDM32_1");
        assert_ne!(a, b);
        assert_eq!(a, a_again);
        assert_eq!(vt.len(), 2);
    }

    #[test]
    fn unknown_tuple_has_no_index() {
        let vt = VarIdxTable::new();
        assert_eq!(vt.idx("a", "b", "c", "d"), None);
    }

    #[test]
    fn roundtrips_through_json() {
        let mut vt = VarIdxTable::new();
        vt.insert("N1_1", "WDM32_1", "N1_2", "WDM32_1");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("skeleton.json");
        vt.save(&path).unwrap();
        let loaded = VarIdxTable::load(&path).unwrap();
        assert_eq!(loaded.idx("N1_1", "WDM32_1", "N1_2", "WDM32_1"), Some(1));
    }

    #[test]
    fn flow_in_channels_dedupes() {
        let mut vt = VarIdxTable::new();
        vt.insert("N1_1", "WDM32_1", "N1_2", "WDM32_1");
        vt.insert("N1_3", "WDM32_1", "N1_2", "WDM32_1");
        assert_eq!(vt.flow_in_channels("N1_2"), vec!["WDM32_1".to_string()]);
    }
}
