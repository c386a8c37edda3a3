// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `PortPair` (spec.md §3): a directed net edge with a cost and a
//! bidirectional-net grouping key.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortPair {
    pub src: String,
    pub dst: String,
    pub cost: f64,
    /// Trailing `-0`/`-1` stripped from the net name; links the two
    /// directions of a bidirectional net. `None` for unidirectional nets.
    pub pair_key: Option<String>,
}

impl PortPair {
    /// Derive a pair key from a net name by stripping a trailing `-0`/`-1`.
    pub fn pair_key_from_net_name(net_name: &str) -> Option<String> {
        if let Some(stripped) = net_name.strip_suffix("-0") {
            Some(stripped.to_string())
        } else {
            net_name.strip_suffix("-1").map(|s| s.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_trailing_direction_suffix() {
        assert_eq!(
            PortPair::pair_key_from_net_name("N1-N2-0"),
            Some("N1-N2".to_string())
        );
        assert_eq!(
            PortPair::pair_key_from_net_name("N1-N2-1"),
            Some("N1-N2".to_string())
        );
        assert_eq!(PortPair::pair_key_from_net_name("N1-N2"), None);
    }
}
