// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `Component`, `Port`, `AvailableConnection` (spec.md §3).

use super::channel::{SupportChannel, SupportSet};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortIo {
    Input,
    Output,
    BiDi,
}

/// Derived `IN`/`OUT` classification extracted from the port name for
/// opposite-pair matching (spec.md §3: "derived `type` (`IN` or `OUT`)").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirectionTag {
    In,
    Out,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Port {
    pub pin: i64,
    pub name: String,
    pub io: PortIo,
    pub support_channel: SupportChannel,
    pub component: String,

    /// Other ports wired to this one via nets.
    #[serde(default)]
    pub connected: HashSet<String>,
    /// Intra+inter-device flow-in ports (built once at load).
    #[serde(default)]
    pub flow_in: HashSet<String>,
    /// Intra+inter-device flow-out ports (built once at load).
    #[serde(default)]
    pub flow_out: HashSet<String>,
}

impl Port {
    pub fn full_name(&self) -> String {
        format!("{}_{}", self.component, self.pin)
    }

    pub fn is_input(&self) -> bool {
        matches!(self.io, PortIo::Input)
    }

    pub fn is_output(&self) -> bool {
        matches!(self.io, PortIo::Output)
    }

    pub fn is_bidi(&self) -> bool {
        matches!(self.io, PortIo::BiDi)
    }

    /// `IN`/`OUT` tag derived by substring match on the port name, used
    /// only to find the opposite-direction port by name substitution.
    pub fn direction_tag(&self) -> Option<PortDirectionTag> {
        if self.name.contains("IN") {
            Some(PortDirectionTag::In)
        } else if self.name.contains("OUT") {
            Some(PortDirectionTag::Out)
        } else {
            None
        }
    }

    /// Name with IN<->OUT substituted, used to locate the opposite port
    /// within the same component (spec.md §3).
    pub fn opposite_name_candidate(&self) -> Option<String> {
        match self.direction_tag()? {
            PortDirectionTag::In => Some(self.name.replacen("IN", "OUT", 1)),
            PortDirectionTag::Out => Some(self.name.replacen("OUT", "IN", 1)),
        }
    }
}

/// Per-device permitted (in_pin, in_ch, out_pin, out_ch) tuples
/// (spec.md §3, §4.3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AvailableConnection {
    pub tuples: HashSet<(i64, i64, i64, i64)>,
    #[serde(skip)]
    by_in_pin: HashMap<i64, HashSet<i64>>,
}

impl AvailableConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, in_pin: i64, in_ch: i64, out_pin: i64, out_ch: i64) {
        self.tuples.insert((in_pin, in_ch, out_pin, out_ch));
        self.by_in_pin.entry(in_pin).or_default().insert(out_pin);
    }

    pub fn allows(&self, in_pin: i64, in_ch: i64, out_pin: i64, out_ch: i64) -> bool {
        self.tuples.contains(&(in_pin, in_ch, out_pin, out_ch))
    }

    /// True iff any channel combination permits routing `in_pin` -> `out_pin`.
    pub fn allows_pins(&self, in_pin: i64, out_pin: i64) -> bool {
        self.by_in_pin
            .get(&in_pin)
            .map(|outs| outs.contains(&out_pin))
            .unwrap_or(false)
    }

    /// Rebuild the `by_in_pin` reverse index after deserializing `tuples`
    /// from the persisted `.conn.txt` scan.
    pub fn reindex(&mut self) {
        self.by_in_pin.clear();
        for (in_pin, _in_ch, out_pin, _out_ch) in &self.tuples {
            self.by_in_pin.entry(*in_pin).or_default().insert(*out_pin);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Component {
    pub name: String,
    pub model: Option<String>,
    pub glpk: Option<String>,
    pub controller: Option<String>,
    pub socket: Option<u16>,
    #[serde(default)]
    pub cost: serde_json::Value,
    #[serde(default)]
    pub out_of_service: serde_json::Value,
    pub support_tables: SupportSet,
    pub ports: HashMap<i64, Port>,
    pub ac: Option<AvailableConnection>,
}

impl Component {
    /// A component is pseudo (an application endpoint) if its name starts
    /// with `P` (spec.md §3).
    pub fn is_pseudo(&self) -> bool {
        self.name.starts_with('P')
    }

    /// True iff this component's model has a reachable device controller.
    pub fn has_controller(&self) -> bool {
        self.controller.is_some() && self.socket.is_some()
    }

    pub fn port(&self, pin: i64) -> Option<&Port> {
        self.ports.get(&pin)
    }

    pub fn ports_sorted(&self) -> Vec<&Port> {
        let mut v: Vec<&Port> = self.ports.values().collect();
        v.sort_by_key(|p| p.pin);
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pseudo_detection() {
        let mut c = sample_component("P1");
        c.name = "P1".into();
        assert!(c.is_pseudo());
        c.name = "N1".into();
        assert!(!c.is_pseudo());
    }

    fn sample_component(name: &str) -> Component {
        Component {
            name: name.into(),
            model: None,
            glpk: None,
            controller: None,
            socket: None,
            cost: serde_json::Value::Null,
            out_of_service: serde_json::Value::Null,
            support_tables: SupportSet::Any,
            ports: HashMap::new(),
            ac: None,
        }
    }

    #[test]
    fn opposite_name_candidate_substitutes() {
        let port = Port {
            pin: 1,
            name: "LINE_IN_1".into(),
            io: PortIo::Input,
            support_channel: SupportChannel::Any,
            component: "N1".into(),
            connected: HashSet::new(),
            flow_in: HashSet::new(),
            flow_out: HashSet::new(),
        };
        assert_eq!(port.opposite_name_candidate().unwrap(), "LINE_OUT_1");
    }

    #[test]
    fn available_connection_allows_pins() {
        let mut ac = AvailableConnection::new();
        ac.insert(1, 1, 2, 1);
        assert!(ac.allows(1, 1, 2, 1));
        assert!(!ac.allows(1, 2, 2, 1));
        assert!(ac.allows_pins(1, 2));
        assert!(!ac.allows_pins(2, 1));
    }

    #[test]
    fn reindex_rebuilds_pin_lookup() {
        let mut ac = AvailableConnection::new();
        ac.tuples.insert((1, 1, 2, 1));
        ac.reindex();
        assert!(ac.allows_pins(1, 2));
    }
}
