// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `Request` and `PortChannel` (spec.md §3).

use crate::reservation::Route;
use crate::topology::Topology;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};

/// A fully-qualified port/channel pair: `port_full_name@channel_full_no`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortChannel {
    pub port: String,
    pub channel: String,
}

impl PortChannel {
    pub fn new(port: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            channel: channel.into(),
        }
    }
}

impl fmt::Display for PortChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.port, self.channel)
    }
}

/// A solvec target: a device model plus the subset of its components
/// selected for one channel-assignment solve group (spec.md §4.8).
#[derive(Debug, Clone)]
pub struct SolvecTarget {
    pub model: String,
    pub components: Vec<String>,
}

pub struct Request {
    pub topology: Arc<Topology>,
    pub src: PortChannel,
    pub dst: PortChannel,
    pub channels: Vec<String>,
    pub solvec_target: Option<SolvecTarget>,
    pub org_ero: Option<Vec<String>>,
    pub next_used_ero: Option<Vec<String>>,
    pub bidi: bool,
    pub used_route: Arc<Mutex<Route>>,
    pub used_conn: Arc<Mutex<Route>>,
    pub errors: Arc<Mutex<Vec<String>>>,
}

impl Request {
    pub fn new(
        topology: Arc<Topology>,
        src: PortChannel,
        dst: PortChannel,
        channels: Vec<String>,
        bidi: bool,
    ) -> Self {
        Self {
            topology,
            src,
            dst,
            channels,
            solvec_target: None,
            org_ero: None,
            next_used_ero: None,
            bidi,
            used_route: Arc::new(Mutex::new(Route::new())),
            used_conn: Arc::new(Mutex::new(Route::new())),
            errors: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Record an error; errors accumulate and propagate to the root
    /// (spec.md §3).
    pub fn push_error(&self, message: impl Into<String>) {
        self.errors.lock().unwrap().push(message.into());
    }

    pub fn errors_joined(&self) -> String {
        self.errors.lock().unwrap().join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_channel_display() {
        let pc = PortChannel::new("N1_1", "WDM32_1");
        assert_eq!(pc.to_string(), "N1_1@WDM32_1");
    }
}
