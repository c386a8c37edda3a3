// SPDX-License-Identifier: Apache-2.0 OR MIT

//! AvailableConnection builder (spec.md §4.3): per-device ILP emission,
//! solver invocation, `.conn.txt` persistence, and tuple scanning.

use crate::error::{NrmError, Result};
use crate::solver::Solver;
use crate::topology::{AvailableConnection, Channel, ChannelTable, Component, SupportSet, Topology};
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

const AC_TMLIM: Duration = Duration::from_secs(120);

fn re_conn_tuple() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\(\s*(\d+)\s*,\s*(\d+)\s*,\s*(\d+)\s*,\s*(\d+)\s*\)").unwrap())
}

/// Renders the `InputPort`/`OutputPort` sets and the component's
/// constraint text with `Channels` normalized to the component's
/// actual channel table(s) (spec.md §4.3): a single supported table
/// becomes `Channels_<id>`; multiple tables number each occurrence of
/// the literal `Channels` in appearance order as `Channels1`,
/// `Channels2`, ...
pub fn build_model_text(component: &Component, glpk_text: &str, support_ids: &[String]) -> String {
    let ports = component.ports_sorted();
    let input_pins: Vec<i64> = ports
        .iter()
        .filter(|p| p.is_input() || p.is_bidi())
        .map(|p| p.pin)
        .collect();
    let output_pins: Vec<i64> = ports
        .iter()
        .filter(|p| p.is_output() || p.is_bidi())
        .map(|p| p.pin)
        .collect();

    let mut text = String::new();
    text.push_str(&format!(
        "set InputPort := {{{}}};\n",
        join_pins(&input_pins)
    ));
    text.push_str(&format!(
        "set OutputPort := {{{}}};\n",
        join_pins(&output_pins)
    ));

    text.push_str(&normalize_channels(glpk_text, support_ids));
    text.push_str("\ndisplay AvailableConnection;end;\n");
    text
}

fn join_pins(pins: &[i64]) -> String {
    pins.iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn normalize_channels(text: &str, support_ids: &[String]) -> String {
    match support_ids.len() {
        0 => text.to_string(),
        1 => text.replace("Channels", &format!("Channels_{}", support_ids[0])),
        _ => {
            let mut out = String::with_capacity(text.len());
            let mut occurrence = 0usize;
            let mut rest = text;
            while let Some(pos) = rest.find("Channels") {
                out.push_str(&rest[..pos]);
                occurrence += 1;
                out.push_str(&format!("Channels{occurrence}"));
                rest = &rest[pos + "Channels".len()..];
            }
            out.push_str(rest);
            out
        }
    }
}

/// `channels.data`: a shared file enumerating all channels and the
/// `chNo` map (spec.md §4.3), reused across every per-model AC build.
pub fn build_channels_data(channel_tables: &HashMap<String, ChannelTable>) -> String {
    let mut ids: Vec<&String> = channel_tables.keys().collect();
    ids.sort();
    let mut text = String::new();
    for id in &ids {
        let table = &channel_tables[*id];
        let mut nums: Vec<i64> = table.channels.iter().map(|c| c.number).collect();
        nums.sort();
        text.push_str(&format!("set Channels_{id} := {{{}}};\n", join_pins(&nums)));
    }
    text.push_str("param chNo :=\n");
    for id in &ids {
        let table = &channel_tables[*id];
        let mut channels: Vec<&Channel> = table.channels.iter().collect();
        channels.sort_by_key(|c| c.number);
        for ch in channels {
            text.push_str(&format!("  [{id},{}] {}\n", ch.number, ch.number));
        }
    }
    text.push_str(";\n");
    text
}

/// Scan solver stdout (persisted verbatim as `<model>.conn.txt`) for
/// `(pin,ch,pin,ch)` tuples (spec.md §4.3).
pub fn parse_conn_txt(text: &str) -> AvailableConnection {
    let mut ac = AvailableConnection::new();
    for caps in re_conn_tuple().captures_iter(text) {
        let in_pin: i64 = caps[1].parse().unwrap_or_default();
        let in_ch: i64 = caps[2].parse().unwrap_or_default();
        let out_pin: i64 = caps[3].parse().unwrap_or_default();
        let out_ch: i64 = caps[4].parse().unwrap_or_default();
        ac.insert(in_pin, in_ch, out_pin, out_ch);
    }
    ac.reindex();
    ac
}

/// Builds and caches `AvailableConnection` tables, keyed by model name
/// only (DESIGN.md Open Question 2: components sharing a `Model` name
/// are assumed to share a compatible port layout).
#[derive(Default)]
pub struct AcCache {
    cache: Mutex<HashMap<String, AvailableConnection>>,
}

impl AcCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached AC for `model`, building it with `solver` into
    /// `work_dir/<model>.conn.txt` if not already cached.
    pub fn get_or_build(
        &self,
        model: &str,
        representative: &Component,
        glpk_text: &str,
        channel_tables: &HashMap<String, ChannelTable>,
        support_ids: &[String],
        solver: &dyn Solver,
        work_dir: &Path,
    ) -> Result<AvailableConnection> {
        if let Some(ac) = self.cache.lock().unwrap().get(model) {
            return Ok(ac.clone());
        }

        let model_text = build_model_text(representative, glpk_text, support_ids);
        let data_text = build_channels_data(channel_tables);

        std::fs::create_dir_all(work_dir)?;
        let model_path: PathBuf = work_dir.join(format!("{model}.model"));
        let data_path: PathBuf = work_dir.join("channels.data");
        let out_path: PathBuf = work_dir.join(format!("{model}.sol"));
        std::fs::write(&model_path, &model_text)?;
        std::fs::write(&data_path, &data_text)?;

        let run = solver.solve(&model_path, &data_path, &out_path, AC_TMLIM)?;
        if !run.exit_ok {
            return Err(NrmError::AcBuild {
                model: model.to_string(),
                detail: format!("{}\n{}", run.stdout, run.stderr),
            });
        }

        let conn_path = work_dir.join(format!("{model}.conn.txt"));
        std::fs::write(&conn_path, &run.stdout)?;

        let ac = parse_conn_txt(&run.stdout);
        self.cache
            .lock()
            .unwrap()
            .insert(model.to_string(), ac.clone());
        Ok(ac)
    }
}

/// Builds one `AvailableConnection` per distinct component model present
/// in `topology`, keyed by model name (spec.md §4.1 construction order:
/// AC files come after components are known, before port-pairs). Callers
/// load the topology once with a no-op `ac_loader`, call this, then load
/// it again passing the returned map back in as the loader.
pub fn build_all(
    topology: &Topology,
    solver: &dyn Solver,
    work_dir: &Path,
) -> Result<HashMap<String, AvailableConnection>> {
    let cache = AcCache::new();
    let mut representatives: HashMap<String, &Component> = HashMap::new();
    for comp in topology.components.values() {
        if comp.model.is_some() && comp.glpk.is_some() {
            representatives
                .entry(comp.model.clone().unwrap())
                .or_insert(comp);
        }
    }

    let mut out = HashMap::new();
    for (model, representative) in representatives {
        let glpk_text = representative.glpk.as_deref().unwrap_or_default();
        let support_ids: Vec<String> = match &representative.support_tables {
            SupportSet::Any => topology.channel_tables.keys().cloned().collect(),
            SupportSet::Tables(ids) => ids.clone(),
        };
        let ac = cache.get_or_build(
            &model,
            representative,
            glpk_text,
            &topology.channel_tables,
            &support_ids,
            solver,
            work_dir,
        )?;
        out.insert(model, ac);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::test_support::StubSolver;
    use crate::topology::{Component, PortIo, SupportChannel, SupportSet};
    use std::collections::HashMap as Map;

    fn component_with_ports() -> Component {
        let mut ports = Map::new();
        ports.insert(
            1,
            Port {
                pin: 1,
                name: "IN_1".into(),
                io: PortIo::Input,
                support_channel: SupportChannel::Table("WDM32".into()),
                component: "M1".into(),
                connected: Default::default(),
                flow_in: Default::default(),
                flow_out: Default::default(),
            },
        );
        ports.insert(
            2,
            Port {
                pin: 2,
                name: "OUT_1".into(),
                io: PortIo::Output,
                support_channel: SupportChannel::Table("WDM32".into()),
                component: "M1".into(),
                connected: Default::default(),
                flow_in: Default::default(),
                flow_out: Default::default(),
            },
        );
        Component {
            name: "M1".into(),
            model: Some("ModelA".into()),
            glpk: Some("s.t. AC {...} : c[i,j,k,l] <= 1;".into()),
            controller: None,
            socket: None,
            cost: serde_json::Value::Null,
            out_of_service: serde_json::Value::Null,
            support_tables: SupportSet::Tables(vec!["WDM32".into()]),
            ports,
            ac: None,
        }
    }

    #[test]
    fn normalize_channels_single_table() {
        let out = normalize_channels("j in Channels, l in Channels", &["WDM32".to_string()]);
        assert_eq!(out, "j in Channels_WDM32, l in Channels_WDM32");
    }

    #[test]
    fn normalize_channels_multi_table_numbers_occurrences() {
        let out = normalize_channels(
            "j in Channels, l in Channels",
            &["WDM32".to_string(), "WDM64".to_string()],
        );
        assert_eq!(out, "j in Channels1, l in Channels2");
    }

    #[test]
    fn parse_conn_txt_extracts_tuples() {
        let ac = parse_conn_txt("noise (1,1,2,1) more noise (1,2,2,2)");
        assert!(ac.allows(1, 1, 2, 1));
        assert!(ac.allows(1, 2, 2, 2));
        assert!(ac.allows_pins(1, 2));
    }

    #[test]
    fn builds_and_caches_ac_via_stub_solver() {
        let comp = component_with_ports();
        let solver = StubSolver::new("(1,1,2,1)");
        let cache = AcCache::new();
        let dir = tempfile::tempdir().unwrap();
        let tables = Map::new();
        let ac = cache
            .get_or_build(
                "ModelA",
                &comp,
                comp.glpk.as_deref().unwrap(),
                &tables,
                &["WDM32".to_string()],
                &solver,
                dir.path(),
            )
            .unwrap();
        assert!(ac.allows(1, 1, 2, 1));
        assert_eq!(solver.runs.lock().unwrap().len(), 1);

        // Second call hits the cache, no further solver invocation.
        let _ = cache
            .get_or_build(
                "ModelA",
                &comp,
                comp.glpk.as_deref().unwrap(),
                &tables,
                &["WDM32".to_string()],
                &solver,
                dir.path(),
            )
            .unwrap();
        assert_eq!(solver.runs.lock().unwrap().len(), 1);
    }

    #[test]
    fn builds_reports_ac_build_error_on_nonzero_exit() {
        let comp = component_with_ports();
        let solver = StubSolver::failing();
        let cache = AcCache::new();
        let dir = tempfile::tempdir().unwrap();
        let tables = Map::new();
        let err = cache
            .get_or_build(
                "ModelA",
                &comp,
                comp.glpk.as_deref().unwrap(),
                &tables,
                &["WDM32".to_string()],
                &solver,
                dir.path(),
            )
            .unwrap_err();
        assert!(matches!(err, NrmError::AcBuild { .. }));
    }
}
