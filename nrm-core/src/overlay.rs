// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Request-overlay builder (spec.md §4.5): given a request and a
//! previously-built `VarIdxTable`, emits the request-specific data
//! appendix appended to the shared skeleton.

use crate::modeltext::ConstraintText;
use crate::reservation::Route;
use crate::request::Request;
use crate::skeleton::{self, Mode};
use crate::topology::Topology;
use crate::varidx::VarIdxTable;
use std::collections::{HashMap, HashSet};

pub struct OverlayParams<'a> {
    pub request: &'a Request,
    pub varidx: &'a VarIdxTable,
    pub target_ports: &'a [String],
    pub channels: &'a [String],
    pub mode: Mode,
    pub model_constraints: &'a HashMap<String, ConstraintText>,
}

/// Builds the overlay text (spec.md §4.5). `used_route`/`used_conn` are
/// read from the request's shared state as of the call, matching the
/// teacher's "snapshot, don't hold the lock across I/O" style.
pub fn build(params: &OverlayParams) -> String {
    let topo = &*params.request.topology;
    let target_set: HashSet<&String> = params.target_ports.iter().collect();
    let channel_set: HashSet<&String> = params.channels.iter().collect();

    let mut out = String::new();
    out.push_str(&format!("param src := {};\n", params.request.src.port));
    out.push_str(&format!("param dst := {};\n", params.request.dst.port));

    match params.mode {
        Mode::Pf => build_pf(params, topo, &target_set, &channel_set, &mut out),
        Mode::Solvec => build_solvec(params, topo, &target_set, &mut out),
    }

    out.push_str("end;\n");
    out
}

fn build_pf(
    params: &OverlayParams,
    topo: &Topology,
    target_set: &HashSet<&String>,
    channel_set: &HashSet<&String>,
    out: &mut String,
) {
    let next_ero = params.request.next_used_ero.clone().unwrap_or_default();
    out.push_str(&format!("set NextERO := {{{}}};\n", next_ero.join(",")));

    let used_conn = params.request.used_conn.lock().unwrap().clone();
    let used_route = params.request.used_route.lock().unwrap().clone();
    let _ = topo;

    out.push_str("param inuse_C default 0 :=\n");
    emit_inuse(&used_conn, params.varidx, target_set, channel_set, out);
    out.push_str(";\n");

    out.push_str("param inuse_X default 0 :=\n");
    emit_inuse(&used_route, params.varidx, target_set, channel_set, out);
    out.push_str(";\n");
}

fn emit_inuse(
    route: &Route,
    vt: &VarIdxTable,
    target_set: &HashSet<&String>,
    channel_set: &HashSet<&String>,
    out: &mut String,
) {
    for entry in &route.entries {
        let in_ch = &entry.src.channel;
        let out_ch = &entry.dst.channel;
        if !channel_set.contains(in_ch) || !channel_set.contains(out_ch) {
            continue;
        }
        if !target_set.contains(&entry.src.port) || !target_set.contains(&entry.dst.port) {
            continue;
        }
        if vt.idx(&entry.src.port, in_ch, &entry.dst.port, out_ch).is_some() {
            out.push_str(&format!(
                "  [{},{},{},{}] 1\n",
                entry.src.port, in_ch, entry.dst.port, out_ch
            ));
        } else {
            tracing::warn!(
                src = %entry.src, dst = %entry.dst,
                "used-route entry has no VarIdxTable connection, skipping"
            );
        }
    }
}

fn build_solvec(
    params: &OverlayParams,
    topo: &Topology,
    target_set: &HashSet<&String>,
    out: &mut String,
) {
    let used_route = params.request.used_route.lock().unwrap().clone();
    let mut vinuse: Vec<String> = used_route
        .entries
        .iter()
        .flat_map(|e| [e.src.port.clone(), e.dst.port.clone()])
        .filter(|p| target_set.contains(p))
        .collect();
    vinuse.sort();
    vinuse.dedup();
    out.push_str(&format!("set Vinuse := {{{}}};\n", vinuse.join(",")));

    let mut models: Vec<String> = params
        .target_ports
        .iter()
        .filter_map(|p| topo.component_by_port(p).and_then(|c| c.model.clone()))
        .collect();
    models.sort();
    models.dedup();

    for model_name in &models {
        let mut comps: Vec<String> = params
            .target_ports
            .iter()
            .filter_map(|p| topo.component_by_port(p))
            .filter(|c| c.model.as_deref() == Some(model_name.as_str()))
            .map(|c| c.name.clone())
            .collect();
        comps.sort();
        comps.dedup();
        out.push_str(&format!("set Comps_{model_name} := {{{}}};\n", comps.join(",")));

        let Some(ct) = params.model_constraints.get(model_name) else {
            continue;
        };
        for (tag, set_name) in skeleton::io_set_names(ct) {
            out.push_str(&format!("set {set_name}{{Comps_{set_name}}} := \n"));
            for comp_name in &comps {
                let Some(comp) = topo.component_by_name(comp_name) else { continue };
                let ports: Vec<i64> = comp
                    .ports_sorted()
                    .into_iter()
                    .filter(|p| match tag {
                        'i' => p.is_input() || p.is_bidi(),
                        _ => p.is_output() || p.is_bidi(),
                    })
                    .map(|p| p.pin)
                    .collect();
                let ports_str = ports.iter().map(|p| p.to_string()).collect::<Vec<_>>().join(",");
                out.push_str(&format!("  [{comp_name}] {{{ports_str}}}\n"));
            }
            out.push_str(";\n");
        }
    }

    for port in params.target_ports {
        let Some(p) = topo.port_by_name(port) else { continue };
        let mut fin: Vec<String> = p.flow_in.iter().filter(|x| target_set.contains(x)).cloned().collect();
        let mut fout: Vec<String> = p.flow_out.iter().filter(|x| target_set.contains(x)).cloned().collect();
        fin.sort();
        fout.sort();
        out.push_str(&format!("set FlowInPorts[{port}] := {{{}}};\n", fin.join(",")));
        out.push_str(&format!("set FlowOutPorts[{port}] := {{{}}};\n", fout.join(",")));
    }

    let mut triples: Vec<(String, String, String)> = params
        .varidx
        .tuples()
        .map(|((ip, ic, op, _), _)| (ip.clone(), ic.clone(), op.clone()))
        .collect();
    triples.sort();
    triples.dedup();
    for (ip, ic, op) in &triples {
        let outs = params.varidx.flow_out_channels(ip, ic, op);
        out.push_str(&format!("set IJK2Ls[{ip},{ic},{op}] := {{{}}};\n", outs.join(",")));
    }

    out.push_str("param inuse_X default 0 :=\n");
    for entry in &used_route.entries {
        if !target_set.contains(&entry.src.port) || !target_set.contains(&entry.dst.port) {
            continue;
        }
        if params
            .varidx
            .idx(&entry.src.port, &entry.src.channel, &entry.dst.port, &entry.dst.channel)
            .is_some()
        {
            out.push_str(&format!(
                "  [{},{},{},{}] 1\n",
                entry.src.port, entry.src.channel, entry.dst.port, entry.dst.channel
            ));
        }
    }
    out.push_str(";\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::PortChannel;
    use crate::reservation::RouteEntry;
    use std::sync::Arc;

    fn topology() -> Topology {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("topo.xml");
        std::fs::write(
            &path,
            r#"<design>
              <channelInfo>
                <channelTable id="WDM32" type="optical"><channel no="1"/></channelTable>
              </channelInfo>
              <components>
                <comp ref="N1">
                  <ports>
                    <port number="1" name="CLIENT_IN_1" io="input" supportChannel="ANY"/>
                    <port number="2" name="LINE_OUT_1" io="output" supportChannel="WDM32"/>
                  </ports>
                </comp>
                <comp ref="N2">
                  <ports>
                    <port number="1" name="LINE_IN_1" io="input" supportChannel="WDM32"/>
                    <port number="2" name="CLIENT_OUT_1" io="output" supportChannel="ANY"/>
                  </ports>
                </comp>
              </components>
              <nets>
                <net code="1" name="N1-N2-0">
                  <node ref="N1" pin="2"/><node ref="N2" pin="1"/><cost>5</cost>
                </net>
              </nets>
            </design>"#,
        )
        .unwrap();
        Topology::load(&path, |_| None).unwrap()
    }

    #[test]
    fn build_pf_overlay_emits_src_dst_and_inuse_sections() {
        let topo = Arc::new(topology());
        let request = Request::new(
            topo.clone(),
            PortChannel::new("N1_1", "WDM32_1"),
            PortChannel::new("N2_2", "WDM32_1"),
            vec!["WDM32_1".to_string()],
            false,
        );
        request.used_route.lock().unwrap().entries.push(RouteEntry {
            src: PortChannel::new("N1_2", "WDM32_1"),
            dst: PortChannel::new("N2_1", "WDM32_1"),
            x: true,
            c: true,
            is_go: true,
        });

        let target_ports = vec!["N1_1".to_string(), "N1_2".to_string(), "N2_1".to_string(), "N2_2".to_string()];
        let channels = vec!["WDM32_1".to_string()];
        let mut vt = VarIdxTable::new();
        vt.insert("N1_2", "WDM32_1", "N2_1", "WDM32_1");

        let params = OverlayParams {
            request: &request,
            varidx: &vt,
            target_ports: &target_ports,
            channels: &channels,
            mode: Mode::Pf,
            model_constraints: &HashMap::new(),
        };
        let text = build(&params);
        assert!(text.contains("param src := N1_1"));
        assert!(text.contains("param inuse_X default 0"));
        assert!(text.contains("[N1_2,WDM32_1,N2_1,WDM32_1] 1"));
        assert!(text.trim_end().ends_with("end;"));
    }
}
