// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `ChannelTable` / `Channel` (spec.md §3).

use serde::{Deserialize, Serialize};

/// Only `optical` channel tables are retained; anything else is rejected
/// at load time (spec.md §3: "type tag (only `optical` is retained)").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelTableKind {
    Optical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub table_id: String,
    pub number: i64,
}

impl Channel {
    pub fn full_no(&self) -> String {
        format!("{}_{}", self.table_id, self.number)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelTable {
    pub id: String,
    pub kind: ChannelTableKind,
    pub channels: Vec<Channel>,
}

impl ChannelTable {
    /// Channel numbers must be unique within a table (spec.md §3 invariant).
    pub fn validate(&self) -> Result<(), String> {
        let mut seen = std::collections::HashSet::new();
        for ch in &self.channels {
            if !seen.insert(ch.number) {
                return Err(format!(
                    "duplicate channel number {} in table {}",
                    ch.number, self.id
                ));
            }
        }
        Ok(())
    }

    pub fn channel(&self, number: i64) -> Option<&Channel> {
        self.channels.iter().find(|c| c.number == number)
    }

    /// Cyclic successor of a channel number within this table (used for
    /// `param nextCh` in the skeleton, spec.md §4.4).
    pub fn next_channel(&self, number: i64) -> Option<i64> {
        let idx = self.channels.iter().position(|c| c.number == number)?;
        let next_idx = (idx + 1) % self.channels.len();
        Some(self.channels[next_idx].number)
    }
}

/// A component's declared support for channel tables: either every table
/// (`ANY`) or an explicit set of table ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SupportSet {
    Any,
    Tables(Vec<String>),
}

impl SupportSet {
    pub fn supports(&self, table_id: &str) -> bool {
        match self {
            SupportSet::Any => true,
            SupportSet::Tables(ids) => ids.iter().any(|t| t == table_id),
        }
    }
}

/// A port's single declared supported channel table, or `ANY`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SupportChannel {
    Any,
    Table(String),
}

impl SupportChannel {
    /// Symmetric compatibility: either side is `ANY`, or both equal
    /// (spec.md §4.4, "Support-channel compatibility is symmetric").
    pub fn compatible(&self, other: &SupportChannel) -> bool {
        match (self, other) {
            (SupportChannel::Any, _) | (_, SupportChannel::Any) => true,
            (SupportChannel::Table(a), SupportChannel::Table(b)) => a == b,
        }
    }

    pub fn table_id(&self) -> Option<&str> {
        match self {
            SupportChannel::Any => None,
            SupportChannel::Table(id) => Some(id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ChannelTable {
        ChannelTable {
            id: "WDM32".into(),
            kind: ChannelTableKind::Optical,
            channels: vec![
                Channel { table_id: "WDM32".into(), number: 1 },
                Channel { table_id: "WDM32".into(), number: 2 },
                Channel { table_id: "WDM32".into(), number: 3 },
            ],
        }
    }

    #[test]
    fn full_no_format() {
        let ch = Channel { table_id: "WDM32".into(), number: 7 };
        assert_eq!(ch.full_no(), "WDM32_7");
    }

    #[test]
    fn next_channel_wraps() {
        let t = table();
        assert_eq!(t.next_channel(1), Some(2));
        assert_eq!(t.next_channel(3), Some(1));
    }

    #[test]
    fn duplicate_numbers_rejected() {
        let mut t = table();
        t.channels.push(Channel { table_id: "WDM32".into(), number: 1 });
        assert!(t.validate().is_err());
    }

    #[test]
    fn support_channel_symmetry() {
        let any = SupportChannel::Any;
        let a = SupportChannel::Table("WDM32".into());
        let b = SupportChannel::Table("WDM40".into());
        assert!(any.compatible(&a));
        assert!(a.compatible(&any));
        assert!(!a.compatible(&b));
        assert!(a.compatible(&a.clone()));
    }
}
