// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Solver stdout / `.sol` result parsing (spec.md §4.7).

use crate::error::{NrmError, Result};
use crate::reservation::RouteEntry;
use crate::request::PortChannel;
use crate::topology::Topology;
use std::path::Path;

/// Cost recorded for a sub-solve with no feasible solution
/// (spec.md §4.6, §7).
pub const NOT_FOUND_COST: f64 = f64::INFINITY;

/// Parse `pf` solver stdout into route entries (spec.md §4.7).
///
/// Each `#`-prefixed line with exactly 10 whitespace-separated fields is a
/// candidate: `# src_port src_ch dst_port dst_ch isX isC ...`. Both `isX`
/// and `isC` must be `"1"`.
pub fn parse_pf_stdout(stdout: &str, topo: &Topology) -> Result<Vec<RouteEntry>> {
    let mut entries = Vec::new();
    for line in stdout.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 10 || fields[0] != "#" {
            continue;
        }
        let (src_port, src_ch, dst_port, dst_ch, is_x, is_c) =
            (fields[1], fields[2], fields[3], fields[4], fields[5], fields[6]);
        if is_x != "1" || is_c != "1" {
            continue;
        }
        if topo.port_by_name(src_port).is_none()
            || topo.channel_by_fullno(src_ch).is_none()
            || topo.port_by_name(dst_port).is_none()
            || topo.channel_by_fullno(dst_ch).is_none()
        {
            return Err(NrmError::MalformedSolverOutput(format!(
                "unresolvable port/channel in line: {line}"
            )));
        }
        entries.push(RouteEntry {
            src: PortChannel::new(src_port, src_ch),
            dst: PortChannel::new(dst_port, dst_ch),
            x: true,
            c: true,
            is_go: true,
        });
    }
    Ok(entries)
}

/// Parse `solvec` solver stdout (spec.md §4.7): scan for the sentinel
/// `SOLUTION FOUND`; absent that, there is no answer. Then each
/// `#`-prefixed line with 7 fields where `v[5]=="1"` yields a channel-only
/// RouteEntry.
pub fn parse_solvec_stdout(stdout: &str) -> Option<Vec<RouteEntry>> {
    if !stdout.contains("SOLUTION FOUND") {
        return None;
    }
    let mut entries = Vec::new();
    for line in stdout.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 7 || fields[0] != "#" {
            continue;
        }
        if fields[5] != "1" {
            continue;
        }
        entries.push(RouteEntry {
            src: PortChannel::new(fields[1], fields[2]),
            dst: PortChannel::new(fields[3], fields[4]),
            x: false,
            c: true,
            is_go: true,
        });
    }
    Some(entries)
}

/// Parse `PATH_COST = <float>` from the first 10 lines of a `.sol` file.
pub fn parse_path_cost(sol_path: &Path) -> Option<f64> {
    let content = std::fs::read_to_string(sol_path).ok()?;
    for line in content.lines().take(10) {
        if let Some(rest) = line.trim().strip_prefix("PATH_COST") {
            let rest = rest.trim_start_matches('=').trim();
            if let Ok(v) = rest.parse::<f64>() {
                return Some(v);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solvec_no_sentinel_means_no_answer() {
        assert!(parse_solvec_stdout("no solution here").is_none());
    }

    #[test]
    fn solvec_parses_accepted_lines() {
        let stdout = "SOLUTION FOUND\n# N1_1 WDM32_1 N1_2 WDM32_1 1 x\n# N1_1 WDM32_1 N1_3 WDM32_1 0 x\n";
        let entries = parse_solvec_stdout(stdout).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(!entries[0].x);
        assert!(entries[0].c);
    }

    #[test]
    fn path_cost_parses_from_sol_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.sol");
        std::fs::write(&path, "Header\nPATH_COST = 12.5\nrest\n").unwrap();
        assert_eq!(parse_path_cost(&path), Some(12.5));
    }

    #[test]
    fn path_cost_absent_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.sol");
        std::fs::write(&path, "no cost line here\n").unwrap();
        assert_eq!(parse_path_cost(&path), None);
    }
}
