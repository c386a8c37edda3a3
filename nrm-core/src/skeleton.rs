// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Skeleton builder (spec.md §4.4): for a topology, a target-channel
//! list, and a mode (`pf` primary solve vs `solvec` channel-assignment
//! solve), produces `(data_skeleton_text, model_text)` plus the
//! `VarIdxTable` built along the way.

use crate::modeltext::{self, ConstraintText};
use crate::topology::Topology;
use crate::varidx::VarIdxTable;
use std::collections::{HashMap, HashSet};

/// Sentinel for "no variable index" in `param vt default <NO_IDX>`.
pub const NO_IDX: i64 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Pf,
    Solvec,
}

pub struct SkeletonParams<'a> {
    pub topology: &'a Topology,
    /// Target channels in the order given in the request (spec.md §4.4:
    /// "channels in given order").
    pub channels: Vec<String>,
    pub mode: Mode,
    /// `pf` only: the channel table id the request targets, when the
    /// topology declares more than one table (otherwise all ports are
    /// eligible regardless of support).
    pub target_table: Option<String>,
    /// `solvec` only: the components selected for this solve group.
    pub solvec_components: Option<Vec<String>>,
    /// Parsed constraint text per component model, used to discover the
    /// `InputPort*`/`OutputPort*` set names each model declares.
    pub model_constraints: HashMap<String, ConstraintText>,
}

pub struct SkeletonOutput {
    pub data_text: String,
    pub model_text: String,
    pub varidx: VarIdxTable,
}

/// Ordering per spec.md §4.4: components natural-sorted on name, ports
/// natural-sorted within a component. Channels keep caller-given order.
pub fn natural_sort(items: &mut [String]) {
    items.sort_by(|a, b| natural_cmp(a, b));
}

pub fn natural_cmp(a: &str, b: &str) -> std::cmp::Ordering {
    let ca = chunk(a);
    let cb = chunk(b);
    for (x, y) in ca.iter().zip(cb.iter()) {
        let ord = if x.0 && y.0 {
            let xn: i64 = x.1.parse().unwrap_or(0);
            let yn: i64 = y.1.parse().unwrap_or(0);
            xn.cmp(&yn)
        } else {
            x.1.cmp(&y.1)
        };
        if ord != std::cmp::Ordering::Equal {
            return ord;
        }
    }
    ca.len().cmp(&cb.len())
}

fn chunk(s: &str) -> Vec<(bool, String)> {
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut cur_digit = false;
    for (i, c) in s.chars().enumerate() {
        let d = c.is_ascii_digit();
        if i == 0 {
            cur_digit = d;
        }
        if d == cur_digit {
            cur.push(c);
        } else {
            out.push((cur_digit, std::mem::take(&mut cur)));
            cur.push(c);
            cur_digit = d;
        }
    }
    if !cur.is_empty() {
        out.push((cur_digit, cur));
    }
    out
}

pub(crate) fn channel_table_id(full_no: &str) -> Option<&str> {
    full_no.rsplit_once('_').map(|(id, _)| id)
}

pub(crate) fn channel_number(full_no: &str) -> Option<i64> {
    full_no.rsplit_once('_')?.1.parse().ok()
}

fn json_number_map(value: &serde_json::Value) -> HashMap<(i64, i64), f64> {
    let mut out = HashMap::new();
    if let Some(obj) = value.as_object() {
        for (key, v) in obj {
            if let Some((a, b)) = key.split_once(',') {
                if let (Ok(a), Ok(b), Some(n)) = (a.trim().parse(), b.trim().parse(), v.as_f64()) {
                    out.insert((a, b), n);
                }
            }
        }
    }
    out
}

fn json_pin_pair_set(value: &serde_json::Value) -> HashSet<(i64, i64)> {
    let mut out = HashSet::new();
    if let Some(obj) = value.as_object() {
        for key in obj.keys() {
            if let Some((a, b)) = key.split_once(',') {
                if let (Ok(a), Ok(b)) = (a.trim().parse(), b.trim().parse()) {
                    out.insert((a, b));
                }
            }
        }
    } else if let Some(arr) = value.as_array() {
        for item in arr {
            if let Some(pair) = item.as_array() {
                if pair.len() == 2 {
                    if let (Some(a), Some(b)) = (pair[0].as_i64(), pair[1].as_i64()) {
                        out.insert((a, b));
                    }
                }
            }
        }
    }
    out
}

/// The port set a skeleton is built over (spec.md §4.4 step 1): every
/// port of every topology component for `pf` (restricted to the target
/// channel table when one is given and more than one table exists), or
/// just the named components' ports for `solvec`. Shared with the
/// pathfinder orchestrator so overlay's `target_ports` always matches
/// the skeleton it is appended to.
pub fn target_ports_for(
    topo: &Topology,
    mode: Mode,
    target_table: Option<&str>,
    solvec_components: Option<&[String]>,
) -> Vec<String> {
    let mut target_ports: Vec<String> = match mode {
        Mode::Pf => {
            let only_one_table = topo.channel_tables.len() <= 1;
            topo.components
                .values()
                .flat_map(|c| c.ports_sorted().into_iter())
                .filter(|p| {
                    only_one_table
                        || target_table
                            .map(|t| p.support_channel.table_id().map(|id| id == t).unwrap_or(true))
                            .unwrap_or(true)
                })
                .map(|p| p.full_name())
                .collect()
        }
        Mode::Solvec => {
            let comps = solvec_components.unwrap_or(&[]);
            topo.components
                .values()
                .filter(|c| comps.contains(&c.name))
                .flat_map(|c| c.ports_sorted().into_iter())
                .map(|p| p.full_name())
                .collect()
        }
    };
    natural_sort(&mut target_ports);
    target_ports.dedup();
    target_ports
}

/// Build the 11 data sections plus model text (spec.md §4.4).
pub fn build(params: &SkeletonParams) -> SkeletonOutput {
    let topo = params.topology;
    let mut data = String::new();
    let mut model = String::new();

    // -- target ports (§4.4 step 1) --
    let target_ports: Vec<String> = target_ports_for(
        topo,
        params.mode,
        params.target_table.as_deref(),
        params.solvec_components.as_deref(),
    );
    let target_set: HashSet<String> = target_ports.iter().cloned().collect();

    data.push_str(&format!("set V := {{{}}};\n", target_ports.join(",")));

    // -- per-model Comps_<model> and i/k sets (§4.4 step 2) --
    let mut models: Vec<String> = target_ports
        .iter()
        .filter_map(|p| topo.component_by_port(p).and_then(|c| c.model.clone()))
        .collect();
    models.sort();
    models.dedup();

    for model_name in &models {
        let mut comps: Vec<String> = target_ports
            .iter()
            .filter_map(|p| topo.component_by_port(p))
            .filter(|c| c.model.as_deref() == Some(model_name.as_str()))
            .map(|c| c.name.clone())
            .collect();
        comps.sort();
        comps.dedup();
        data.push_str(&format!(
            "set Comps_{model_name} := {{{}}};\n",
            comps.join(",")
        ));

        let Some(ct) = params.model_constraints.get(model_name) else {
            continue;
        };
        for (tag, set_name) in io_set_names(ct) {
            model.push_str(&format!("set {set_name}{{Comps_{set_name}}};\n"));
            for comp_name in &comps {
                let Some(comp) = topo.component_by_name(comp_name) else {
                    continue;
                };
                let ports: Vec<i64> = comp
                    .ports_sorted()
                    .into_iter()
                    .filter(|p| match tag {
                        'i' => p.is_input() || p.is_bidi(),
                        _ => p.is_output() || p.is_bidi(),
                    })
                    .map(|p| p.pin)
                    .collect();
                let ports_str = ports
                    .iter()
                    .map(|p| p.to_string())
                    .collect::<Vec<_>>()
                    .join(",");
                data.push_str(&format!("set {set_name}[{comp_name}] := {{{ports_str}}};\n"));
            }
        }
    }

    // -- flow ports (§4.4 step 3) --
    for port in &target_ports {
        let Some(p) = topo.port_by_name(port) else { continue };
        let mut fin: Vec<String> = p.flow_in.iter().filter(|x| target_set.contains(*x)).cloned().collect();
        let mut fout: Vec<String> = p.flow_out.iter().filter(|x| target_set.contains(*x)).cloned().collect();
        natural_sort(&mut fin);
        natural_sort(&mut fout);
        data.push_str(&format!("set FlowInPorts[{port}] := {{{}}};\n", fin.join(",")));
        data.push_str(&format!("set FlowOutPorts[{port}] := {{{}}};\n", fout.join(",")));
    }

    // -- channel sets (§4.4 step 4) --
    let mut by_table: HashMap<String, Vec<i64>> = HashMap::new();
    let mut all_channels: Vec<String> = Vec::new();
    for ch in &params.channels {
        if let (Some(table_id), Some(no)) = (channel_table_id(ch), channel_number(ch)) {
            by_table.entry(table_id.to_string()).or_default().push(no);
            if !all_channels.contains(ch) {
                all_channels.push(ch.clone());
            }
        }
    }
    let mut table_ids: Vec<&String> = by_table.keys().collect();
    table_ids.sort();
    for id in &table_ids {
        let nums = &by_table[*id];
        let nums_str = nums.iter().map(|n| n.to_string()).collect::<Vec<_>>().join(",");
        data.push_str(&format!("set Channels_{id} := {{{nums_str}}};\n"));
    }
    data.push_str(&format!("set AllChannels := {{{}}};\n", all_channels.join(",")));
    data.push_str("param chNo :=\n");
    for ch in &all_channels {
        if let (Some(id), Some(no)) = (channel_table_id(ch), channel_number(ch)) {
            data.push_str(&format!("  [{id},{no}] {no}\n"));
        }
    }
    data.push_str(";\n");
    data.push_str("param nextCh :=\n");
    for ch in &all_channels {
        if let (Some(id), Some(no)) = (channel_table_id(ch), channel_number(ch)) {
            if let Some(next) = topo.channeltable_by_id(id).and_then(|t| t.next_channel(no)) {
                data.push_str(&format!("  [{id},{no}] {next}\n"));
            }
        }
    }
    data.push_str(";\n");

    // -- vt / NUM_VARS (§4.4 step 5) --
    let mut vt = VarIdxTable::new();
    for in_port in &target_ports {
        for ch in &params.channels {
            for out_port in &target_ports {
                if topo.has_connection(in_port, ch, out_port, ch) {
                    vt.insert(in_port, ch, out_port, ch);
                }
            }
        }
    }
    data.push_str(&format!("param vt default {NO_IDX} :=\n"));
    for ((ip, ic, op, oc), idx) in vt.tuples() {
        data.push_str(&format!("  [{ip},{ic},{op},{oc}] {idx}\n"));
    }
    data.push_str(";\n");
    data.push_str(&format!("param NUM_VARS := {};\n", vt.len()));

    // -- FlowInChannels (§4.4 step 6) --
    for port in &target_ports {
        let chans = vt.flow_in_channels(port);
        data.push_str(&format!("set FlowInChannels[{port}] := {{{}}};\n", chans.join(",")));
    }

    if params.mode == Mode::Pf {
        // -- IJK2Ls (§4.4 step 7) --
        let mut triples: Vec<(String, String, String)> = vt
            .tuples()
            .map(|((ip, ic, op, _), _)| (ip.clone(), ic.clone(), op.clone()))
            .collect();
        triples.sort();
        triples.dedup();
        for (ip, ic, op) in &triples {
            let outs = vt.flow_out_channels(ip, ic, op);
            data.push_str(&format!(
                "set IJK2Ls[{ip},{ic},{op}] := {{{}}};\n",
                outs.join(",")
            ));
        }

        // -- widthOK / ChannelRange (§4.4 step 8) --
        data.push_str("param widthOK default 1 := 1;\n");
        for ch in &all_channels {
            data.push_str(&format!("set ChannelRange[{ch}] := {{{ch}}};\n"));
        }

        // -- pair param (§4.4 step 9) --
        data.push_str("param pair default 0 :=\n");
        for (_key, group) in topo.get_all_portpairs_list() {
            if group.len() != 2 {
                continue;
            }
            let (a, b) = (group[0], group[1]);
            for ch in &params.channels {
                let idx_a = vt.idx(&a.src, ch, &a.dst, ch);
                let idx_b = vt.idx(&b.src, ch, &b.dst, ch);
                if let (Some(ia), Some(ib)) = (idx_a, idx_b) {
                    data.push_str(&format!("  [{},{ch},{},{ch}] {ia}\n", b.src, b.dst));
                    data.push_str(&format!("  [{},{ch},{},{ch}] {ib}\n", a.src, a.dst));
                }
            }
        }
        data.push_str(";\n");

        // -- cost param (§4.4 step 10) --
        data.push_str("param cost default 0 :=\n");
        let mut emitted: HashSet<(String, String, String, String)> = HashSet::new();
        for pair in &topo.portpairs {
            if !target_set.contains(&pair.src) || !target_set.contains(&pair.dst) {
                continue;
            }
            for ch in &params.channels {
                if vt.idx(&pair.src, ch, &pair.dst, ch).is_some() {
                    let key = (pair.src.clone(), ch.clone(), pair.dst.clone(), ch.clone());
                    if emitted.insert(key) {
                        data.push_str(&format!(
                            "  [{},{ch},{},{ch}] {}\n",
                            pair.src, pair.dst, pair.cost
                        ));
                    }
                }
            }
        }
        for model_name in &models {
            for comp_name in target_ports
                .iter()
                .filter_map(|p| topo.component_by_port(p))
                .filter(|c| c.model.as_deref() == Some(model_name.as_str()))
                .map(|c| c.name.clone())
                .collect::<HashSet<_>>()
            {
                let Some(comp) = topo.component_by_name(&comp_name) else { continue };
                let costs = json_number_map(&comp.cost);
                if costs.is_empty() {
                    continue;
                }
                for ((in_pin, out_pin), cost) in &costs {
                    for ch in &params.channels {
                        let in_port = format!("{comp_name}_{in_pin}");
                        let out_port = format!("{comp_name}_{out_pin}");
                        if vt.idx(&in_port, ch, &out_port, ch).is_none() {
                            continue;
                        }
                        let key = (in_port.clone(), ch.clone(), out_port.clone(), ch.clone());
                        if emitted.insert(key) {
                            data.push_str(&format!(
                                "  [{in_port},{ch},{out_port},{ch}] {cost}\n"
                            ));
                        } else {
                            tracing::warn!(
                                component = %comp_name, %in_port, %out_port,
                                "duplicate cost key ignored"
                            );
                        }
                    }
                }
            }
        }
        data.push_str(";\n");

        // -- OUT_OF_SERVICES (§4.4 step 11) --
        let mut out_of_service_idx: Vec<usize> = Vec::new();
        for model_name in &models {
            for comp_name in target_ports
                .iter()
                .filter_map(|p| topo.component_by_port(p))
                .filter(|c| c.model.as_deref() == Some(model_name.as_str()))
                .map(|c| c.name.clone())
                .collect::<HashSet<_>>()
            {
                let Some(comp) = topo.component_by_name(&comp_name) else { continue };
                let oos = json_pin_pair_set(&comp.out_of_service);
                for (in_pin, out_pin) in &oos {
                    for ch in &params.channels {
                        let in_port = format!("{comp_name}_{in_pin}");
                        let out_port = format!("{comp_name}_{out_pin}");
                        if let Some(idx) = vt.idx(&in_port, ch, &out_port, ch) {
                            out_of_service_idx.push(idx);
                        }
                    }
                }
            }
        }
        out_of_service_idx.sort();
        out_of_service_idx.dedup();
        data.push_str(&format!(
            "set OUT_OF_SERVICES := {{{}}};\n",
            out_of_service_idx
                .iter()
                .map(|i| i.to_string())
                .collect::<Vec<_>>()
                .join(",")
        ));
    }

    SkeletonOutput {
        data_text: data,
        model_text: model,
        varidx: vt,
    }
}

pub(crate) fn io_set_names(ct: &ConstraintText) -> Vec<(char, String)> {
    let mut seen = HashSet::new();
    let mut names = Vec::new();
    for st in &ct.statements {
        for (tag, set_name) in modeltext::io_vars(&st.domain) {
            if seen.insert((tag, set_name.clone())) {
                names.push((tag, set_name));
            }
        }
    }
    names
}
