// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pathfinder orchestrator (spec.md §4.8): ERO split, per-channel
//! fan-out over a bounded worker pool, ERO merge, answer selection,
//! backward-path synthesis, and the `solvec` follow-up.

use crate::error::{NrmError, Result};
use crate::modeltext::ConstraintText;
use crate::overlay::{self, OverlayParams};
use crate::request::{PortChannel, Request, SolvecTarget};
use crate::reservation::{Route, RouteEntry};
use crate::result_parser;
use crate::skeleton::{self, Mode, SkeletonOutput, SkeletonParams};
use crate::solver::{Solver, SOLVE_TIMEOUT};
use crate::topology::Topology;
use crate::workerpool::WorkerPool;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Resolved forward (+ reverse, + solvec) route and its total forward cost.
#[derive(Debug, Clone)]
pub struct PfOutcome {
    pub route: Route,
    pub cost: f64,
    /// Per-run scratch directory under `work_root/runs/`, so callers can
    /// remove it when `deltmp` is enabled (spec.md §5).
    pub run_dir: PathBuf,
}

/// Shared, reusable state for solving requests against one topology
/// (spec.md §5: topology and per-channel skeletons are immutable/
/// read-only after construction and may be shared across requests).
pub struct PathfinderContext {
    pub topology: Arc<Topology>,
    pub model_constraints: Arc<HashMap<String, ConstraintText>>,
    pub solver: Arc<dyn Solver>,
    pub work_root: PathBuf,
    pub num_comps: usize,
    dump_glpsol: std::sync::atomic::AtomicBool,
    pool: WorkerPool,
    wdmsa_idx: AtomicUsize,
}

impl PathfinderContext {
    pub fn new(
        topology: Arc<Topology>,
        model_constraints: HashMap<String, ConstraintText>,
        solver: Arc<dyn Solver>,
        work_root: PathBuf,
        num_comps: usize,
    ) -> Self {
        Self {
            topology,
            model_constraints: Arc::new(model_constraints),
            solver,
            work_root,
            num_comps,
            dump_glpsol: std::sync::atomic::AtomicBool::new(false),
            pool: WorkerPool::new(WorkerPool::default_size()),
            wdmsa_idx: AtomicUsize::new(0),
        }
    }

    /// Toggle full-stdout capture for subsequent solves (`dumpglpsol`,
    /// spec.md §6). Shared across requests, like the `wdmsa` counter.
    pub fn set_dump_glpsol(&self, enabled: bool) {
        self.dump_glpsol.store(enabled, Ordering::SeqCst);
    }

    fn dump_glpsol(&self) -> bool {
        self.dump_glpsol.load(Ordering::SeqCst)
    }
}

/// `-ch`/`-wdmsa` channel option (spec.md §4.8). `Explicit` tokens may
/// contain a `"a..b"` range, expanded against the first token's channel
/// table id.
pub enum ChannelOption {
    All,
    Wdmsa,
    Explicit(Vec<String>),
}

pub fn resolve_channels(topo: &Topology, option: &ChannelOption, ctx: &PathfinderContext) -> Vec<String> {
    match option {
        ChannelOption::All => all_channels(topo),
        ChannelOption::Wdmsa => {
            let all = all_channels(topo);
            if all.is_empty() {
                return all;
            }
            let idx = ctx.wdmsa_idx.fetch_add(1, Ordering::SeqCst) % all.len();
            vec![all[idx].clone()]
        }
        ChannelOption::Explicit(tokens) => {
            let mut out = Vec::new();
            for token in tokens {
                if let Some((a, b)) = token.split_once("..") {
                    if let (Some(table), Some(start), Some(end)) =
                        (skeleton::channel_table_id(a), skeleton::channel_number(a), skeleton::channel_number(b))
                    {
                        for n in start..=end {
                            out.push(format!("{table}_{n}"));
                        }
                        continue;
                    }
                }
                out.push(token.clone());
            }
            out
        }
    }
}

fn all_channels(topo: &Topology) -> Vec<String> {
    let mut all: Vec<String> = topo
        .channel_tables
        .values()
        .flat_map(|t| t.channels.iter().map(|c| c.full_no()))
        .collect();
    skeleton::natural_sort(&mut all);
    all
}

/// Top-level entry point (spec.md §4.8 steps 1-7).
pub fn find_path(ctx: &PathfinderContext, request: &Request) -> Result<PfOutcome> {
    if request.bidi
        && (ctx.topology.opposite_port(&request.src.port).is_none()
            || ctx.topology.opposite_port(&request.dst.port).is_none())
    {
        return Err(NrmError::Request("BidiNotSupported".into()));
    }

    let hops = hop_ports(request);
    if hops.len() < 2 {
        return Err(NrmError::Request("request has no hop to solve".into()));
    }

    let run_dir = ctx.work_root.join("runs").join(Uuid::new_v4().to_string());
    let skeleton_cache: Mutex<HashMap<String, Arc<SkeletonOutput>>> = Mutex::new(HashMap::new());
    let n_channels = request.channels.len();

    // -- steps 1-4: sequential ERO hops, each fanned out per channel --
    let mut per_hop_results: Vec<Vec<Option<(Vec<RouteEntry>, f64)>>> = Vec::with_capacity(hops.len() - 1);
    for hop_idx in 0..hops.len() - 1 {
        let from_port = &hops[hop_idx];
        let to_port = &hops[hop_idx + 1];
        let next_used_ero = (hop_idx + 2 < hops.len()).then(|| hops[hop_idx + 2..].to_vec());

        let results = solve_hop(
            ctx,
            &skeleton_cache,
            request,
            hop_idx,
            from_port,
            to_port,
            &request.channels,
            next_used_ero,
            &run_dir,
        )?;

        {
            let mut used_route = request.used_route.lock().unwrap();
            let mut used_conn = request.used_conn.lock().unwrap();
            for (entries, _cost) in results.iter().flatten() {
                used_route.merge_pf_route(entries);
                used_conn.merge_solvec_route(entries);
            }
        }

        per_hop_results.push(results);
    }

    // -- step 5: answer selection --
    let mut candidates: Vec<(usize, f64)> = Vec::new();
    for ch_idx in 0..n_channels {
        let mut total = 0.0;
        let mut all_ok = true;
        for hop_results in &per_hop_results {
            match &hop_results[ch_idx] {
                Some((_, cost)) => total += cost,
                None => {
                    all_ok = false;
                    break;
                }
            }
        }
        if all_ok {
            candidates.push((ch_idx, total));
        }
    }
    candidates.sort_by(|a, b| {
        a.1.partial_cmp(&b.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });

    if candidates.is_empty() {
        return Err(NrmError::Request(format!(
            "no feasible path found for any requested channel; {}",
            request.errors_joined()
        )));
    }

    // -- steps 6-7: backward synthesis + solvec, tried in cost order --
    for (ch_idx, total_cost) in &candidates {
        let mut forward = Route::new();
        for hop_results in &per_hop_results {
            if let Some((entries, _)) = &hop_results[*ch_idx] {
                forward.merge_pf_route(entries);
            }
        }

        let mut full_route = forward.clone();
        if request.bidi {
            let used_route = request.used_route.lock().unwrap().clone();
            match synthesize_backward_path(&ctx.topology, &forward, &used_route) {
                Some(reverse) => full_route.merge_pf_route(&reverse.entries),
                None => {
                    request.push_error(format!("channel {ch_idx}: no backward path"));
                    continue;
                }
            }
        }

        match run_solvec_followups(ctx, request, &full_route, &run_dir) {
            Ok(Some(solvec_entries)) => {
                full_route.merge_solvec_route(&solvec_entries.entries);
                return Ok(PfOutcome {
                    route: full_route,
                    cost: *total_cost,
                    run_dir: run_dir.clone(),
                });
            }
            Ok(None) => {
                request.push_error(format!("channel {ch_idx}: solvec follow-up found no answer"));
            }
            Err(e) => request.push_error(e.to_string()),
        }
    }

    Err(NrmError::Request(format!(
        "no candidate path survived channel-assignment solve; {}",
        request.errors_joined()
    )))
}

/// `[src.port, e1, ..., eN, dst.port]` (spec.md §4.8 step 1).
fn hop_ports(request: &Request) -> Vec<String> {
    let mut ports = vec![request.src.port.clone()];
    if let Some(ero) = &request.org_ero {
        ports.extend(ero.iter().cloned());
    }
    ports.push(request.dst.port.clone());
    ports
}

fn channel_supported(topo: &Topology, from_port: &str, to_port: &str, channel: &str) -> bool {
    let Some(table) = skeleton::channel_table_id(channel) else {
        return false;
    };
    let supports = |port: &str| {
        topo.port_by_name(port)
            .map(|p| p.support_channel.table_id().map(|t| t == table).unwrap_or(true))
            .unwrap_or(false)
    };
    supports(from_port) && supports(to_port)
}

fn build_or_get_skeleton(
    ctx: &PathfinderContext,
    cache: &Mutex<HashMap<String, Arc<SkeletonOutput>>>,
    channel: &str,
) -> Result<Arc<SkeletonOutput>> {
    if let Some(found) = cache.lock().unwrap().get(channel) {
        return Ok(found.clone());
    }

    let target_table = skeleton::channel_table_id(channel).map(|s| s.to_string());
    let params = SkeletonParams {
        topology: &ctx.topology,
        channels: vec![channel.to_string()],
        mode: Mode::Pf,
        target_table,
        solvec_components: None,
        model_constraints: (*ctx.model_constraints).clone(),
    };
    let out = skeleton::build(&params);

    let dir = ctx.work_root.join("glpk").join(channel);
    std::fs::create_dir_all(&dir)?;
    std::fs::write(dir.join("skeleton.data"), &out.data_text)?;
    std::fs::write(dir.join("pf.model"), &out.model_text)?;
    out.varidx.save(&dir.join("skeleton.json"))?;

    let arc = Arc::new(out);
    cache.lock().unwrap().insert(channel.to_string(), arc.clone());
    Ok(arc)
}

/// Per-channel fan-out for one ERO hop (spec.md §4.8 steps 2-3).
#[allow(clippy::too_many_arguments)]
fn solve_hop(
    ctx: &PathfinderContext,
    skeleton_cache: &Mutex<HashMap<String, Arc<SkeletonOutput>>>,
    request: &Request,
    hop_idx: usize,
    from_port: &str,
    to_port: &str,
    channels: &[String],
    next_used_ero: Option<Vec<String>>,
    run_dir: &Path,
) -> Result<Vec<Option<(Vec<RouteEntry>, f64)>>> {
    let mut prepared: Vec<Option<(Arc<SkeletonOutput>, Vec<String>)>> = Vec::with_capacity(channels.len());
    for ch in channels {
        if !channel_supported(&ctx.topology, from_port, to_port, ch) {
            prepared.push(None);
            continue;
        }
        let sk = build_or_get_skeleton(ctx, skeleton_cache, ch)?;
        let target_table = skeleton::channel_table_id(ch).map(|s| s.to_string());
        let target_ports = skeleton::target_ports_for(&ctx.topology, Mode::Pf, target_table.as_deref(), None);
        prepared.push(Some((sk, target_ports)));
    }

    let used_route_snapshot = request.used_route.lock().unwrap().clone();
    let used_conn_snapshot = request.used_conn.lock().unwrap().clone();
    let topology = ctx.topology.clone();
    let solver = ctx.solver.clone();
    let constraints = ctx.model_constraints.clone();
    let dump_glpsol = ctx.dump_glpsol();
    let from = from_port.to_string();
    let to = to_port.to_string();
    let run_dir = run_dir.to_path_buf();

    let items: Vec<(usize, String, Option<(Arc<SkeletonOutput>, Vec<String>)>)> = channels
        .iter()
        .cloned()
        .zip(prepared)
        .enumerate()
        .map(|(idx, (ch, p))| (idx, ch, p))
        .collect();

    let results = ctx.pool.map_indexed(items, move |(idx, ch, prepared)| {
        let Some((skeleton, target_ports)) = prepared else {
            return None;
        };
        let leg_request = Request {
            topology: topology.clone(),
            src: PortChannel::new(from.clone(), ch.clone()),
            dst: PortChannel::new(to.clone(), ch.clone()),
            channels: vec![ch.clone()],
            solvec_target: None,
            org_ero: None,
            next_used_ero: next_used_ero.clone(),
            bidi: false,
            used_route: Arc::new(Mutex::new(used_route_snapshot.clone())),
            used_conn: Arc::new(Mutex::new(used_conn_snapshot.clone())),
            errors: Arc::new(Mutex::new(Vec::new())),
        };
        let work_dir = run_dir.join(format!("hop{hop_idx}")).join(format!("ch{idx}"));
        execute_pf_solve(
            solver.as_ref(),
            dump_glpsol,
            &topology,
            &skeleton,
            &target_ports,
            &constraints,
            &leg_request,
            &work_dir,
        )
        .ok()
        .flatten()
    });

    Ok(results)
}

#[allow(clippy::too_many_arguments)]
fn execute_pf_solve(
    solver: &dyn Solver,
    dump_glpsol: bool,
    topology: &Topology,
    skeleton: &SkeletonOutput,
    target_ports: &[String],
    model_constraints: &HashMap<String, ConstraintText>,
    leg_request: &Request,
    work_dir: &Path,
) -> Result<Option<(Vec<RouteEntry>, f64)>> {
    std::fs::create_dir_all(work_dir)?;
    let model_path = work_dir.join("pf.model");
    let data_path = work_dir.join("pf.data");
    let out_path = work_dir.join("pf.sol");

    let overlay_params = OverlayParams {
        request: leg_request,
        varidx: &skeleton.varidx,
        target_ports,
        channels: &leg_request.channels,
        mode: Mode::Pf,
        model_constraints,
    };
    let overlay_text = overlay::build(&overlay_params);

    let mut data_text = skeleton.data_text.clone();
    data_text.push_str(&overlay_text);
    std::fs::write(&model_path, &skeleton.model_text)?;
    std::fs::write(&data_path, &data_text)?;

    let run = solver.solve(&model_path, &data_path, &out_path, SOLVE_TIMEOUT)?;
    if dump_glpsol {
        let _ = std::fs::write(work_dir.join("pf.stdout"), &run.stdout);
    }
    if !run.exit_ok {
        return Ok(None);
    }

    let entries = result_parser::parse_pf_stdout(&run.stdout, topology)?;
    if entries.is_empty() {
        return Ok(None);
    }
    let cost = result_parser::parse_path_cost(&out_path).unwrap_or(0.0);
    Ok(Some((entries, cost)))
}

/// Backward-path synthesis (spec.md §4.8 step 6, bidi only).
fn synthesize_backward_path(topo: &Topology, forward: &Route, used_route: &Route) -> Option<Route> {
    if forward.entries.is_empty() {
        return Some(Route::new());
    }
    let channel = forward.entries[0].src.channel.clone();

    let mut stops: Vec<String> = Vec::new();
    for entry in &forward.entries {
        if stops.last() != Some(&entry.src.port) {
            stops.push(entry.src.port.clone());
        }
        stops.push(entry.dst.port.clone());
    }
    if stops.len() < 2 {
        return Some(Route::new());
    }

    let mut reverse = Route::new();
    for window in stops.windows(2).rev() {
        let (p_i, p_next) = (&window[0], &window[1]);
        let hop = reverse_hop(topo, p_i, p_next, &channel, used_route)?;
        reverse.entries.extend(hop);
    }
    Some(reverse)
}

fn reverse_hop(
    topo: &Topology,
    p_i: &str,
    p_next: &str,
    channel: &str,
    used_route: &Route,
) -> Option<Vec<RouteEntry>> {
    if let Some(pair) = topo.find_portpair(p_i, p_next) {
        let entry = RouteEntry {
            src: PortChannel::new(pair.src.clone(), channel.to_string()),
            dst: PortChannel::new(pair.dst.clone(), channel.to_string()),
            x: true,
            c: true,
            is_go: false,
        };
        if used_route.contains_xkey(&entry) {
            return None;
        }
        return Some(vec![entry]);
    }

    let path = bfs_flow_path(topo, p_next, channel, p_i)?;
    let mut out = Vec::with_capacity(path.len());
    for (src, dst) in path {
        let entry = RouteEntry {
            src: PortChannel::new(src, channel.to_string()),
            dst: PortChannel::new(dst, channel.to_string()),
            x: true,
            c: true,
            is_go: false,
        };
        if used_route.contains_xkey(&entry) {
            return None;
        }
        out.push(entry);
    }
    Some(out)
}

/// BFS over the `flow_out` graph, each hop verified by `has_connection`
/// (spec.md §4.8 step 6: "fill the gap with a simple BFS").
fn bfs_flow_path(topo: &Topology, from: &str, channel: &str, to: &str) -> Option<Vec<(String, String)>> {
    if from == to {
        return Some(Vec::new());
    }
    let mut queue: VecDeque<String> = VecDeque::new();
    let mut visited: HashSet<String> = HashSet::new();
    let mut parent: HashMap<String, String> = HashMap::new();
    queue.push_back(from.to_string());
    visited.insert(from.to_string());

    while let Some(cur) = queue.pop_front() {
        let Some(port) = topo.port_by_name(&cur) else { continue };
        let mut next_ports: Vec<String> = port.flow_out.iter().cloned().collect();
        next_ports.sort();
        for next in next_ports {
            if visited.contains(&next) || !topo.has_connection(&cur, channel, &next, channel) {
                continue;
            }
            visited.insert(next.clone());
            parent.insert(next.clone(), cur.clone());
            if next == to {
                let mut path = Vec::new();
                let mut node = next;
                while let Some(p) = parent.get(&node) {
                    path.push((p.clone(), node.clone()));
                    node = p.clone();
                }
                path.reverse();
                return Some(path);
            }
            queue.push_back(next);
        }
    }
    None
}

/// Channel-assignment follow-up (spec.md §4.8 step 7): partition
/// controller-bearing used components per model into groups of at most
/// `num_comps`, solve each group, merge by `ckey`.
fn run_solvec_followups(
    ctx: &PathfinderContext,
    request: &Request,
    route: &Route,
    run_dir: &Path,
) -> Result<Option<Route>> {
    let mut used_components: HashSet<String> = HashSet::new();
    for entry in &route.entries {
        for port in [&entry.src.port, &entry.dst.port] {
            if let Some((comp, _)) = crate::topology::split_full_name(port) {
                used_components.insert(comp.to_string());
            }
        }
    }

    let mut by_model: HashMap<String, Vec<String>> = HashMap::new();
    for name in used_components {
        let Some(comp) = ctx.topology.component_by_name(&name) else { continue };
        if !comp.has_controller() {
            continue;
        }
        if let Some(model) = &comp.model {
            by_model.entry(model.clone()).or_default().push(name);
        }
    }

    if by_model.is_empty() {
        return Ok(Some(Route::new()));
    }

    let group_size = ctx.num_comps.max(1);
    let mut groups: Vec<(String, Vec<String>)> = Vec::new();
    for (model, mut comps) in by_model {
        comps.sort();
        for chunk in comps.chunks(group_size) {
            groups.push((model.clone(), chunk.to_vec()));
        }
    }

    let mut merged = Route::new();
    for (idx, (model, comps)) in groups.iter().enumerate() {
        let group_dir = run_dir.join(format!("solvec{idx}"));
        match solve_solvec_group(ctx, request, model, comps, route, &group_dir)? {
            Some(entries) => merged.merge_solvec_route(&entries),
            None => return Ok(None),
        }
    }
    Ok(Some(merged))
}

fn solve_solvec_group(
    ctx: &PathfinderContext,
    request: &Request,
    model: &str,
    comps: &[String],
    route: &Route,
    work_dir: &Path,
) -> Result<Option<Vec<RouteEntry>>> {
    let params = SkeletonParams {
        topology: &ctx.topology,
        channels: request.channels.clone(),
        mode: Mode::Solvec,
        target_table: None,
        solvec_components: Some(comps.to_vec()),
        model_constraints: (*ctx.model_constraints).clone(),
    };
    let skeleton = skeleton::build(&params);
    let target_ports = skeleton::target_ports_for(&ctx.topology, Mode::Solvec, None, Some(comps));

    let leg_request = Request {
        topology: ctx.topology.clone(),
        src: request.src.clone(),
        dst: request.dst.clone(),
        channels: request.channels.clone(),
        solvec_target: Some(SolvecTarget {
            model: model.to_string(),
            components: comps.to_vec(),
        }),
        org_ero: None,
        next_used_ero: None,
        bidi: false,
        used_route: Arc::new(Mutex::new(route.clone())),
        used_conn: Arc::new(Mutex::new(route.clone())),
        errors: Arc::new(Mutex::new(Vec::new())),
    };

    let overlay_params = OverlayParams {
        request: &leg_request,
        varidx: &skeleton.varidx,
        target_ports: &target_ports,
        channels: &request.channels,
        mode: Mode::Solvec,
        model_constraints: &ctx.model_constraints,
    };
    let overlay_text = overlay::build(&overlay_params);

    std::fs::create_dir_all(work_dir)?;
    let model_path = work_dir.join(format!("{model}.model"));
    let data_path = work_dir.join(format!("{model}.data"));
    let out_path = work_dir.join(format!("{model}.sol"));
    let mut data_text = skeleton.data_text.clone();
    data_text.push_str(&overlay_text);
    std::fs::write(&model_path, &skeleton.model_text)?;
    std::fs::write(&data_path, &data_text)?;

    let run = ctx.solver.solve(&model_path, &data_path, &out_path, SOLVE_TIMEOUT)?;
    if ctx.dump_glpsol() {
        let _ = std::fs::write(work_dir.join(format!("{model}.stdout")), &run.stdout);
    }
    if !run.exit_ok {
        return Ok(None);
    }
    Ok(result_parser::parse_solvec_stdout(&run.stdout))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::test_support::StubSolver;

    fn two_device_topology() -> Topology {
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

    fn lone_port_topology() -> Topology {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("topo.xml");
        std::fs::write(
            &path,
            r#"<design>
              <components>
                <comp ref="X">
                  <ports>
                    <port number="1" name="ONLY_IN_1" io="input" supportChannel="ANY"/>
                  </ports>
                </comp>
              </components>
            </design>"#,
        )
        .unwrap();
        Topology::load(&path, |_| None).unwrap()
    }

    fn context(topo: Topology, solver: StubSolver) -> PathfinderContext {
        let work_root = tempfile::tempdir().unwrap().keep();
        PathfinderContext::new(
            Arc::new(topo),
            HashMap::new(),
            Arc::new(solver),
            work_root,
            2,
        )
    }

    #[test]
    fn hop_ports_includes_ero_waypoints() {
        let topo = Arc::new(two_device_topology());
        let mut request = Request::new(
            topo,
            PortChannel::new("N1_1", "WDM32_1"),
            PortChannel::new("N2_2", "WDM32_1"),
            vec!["WDM32_1".to_string()],
            false,
        );
        request.org_ero = Some(vec!["N1_2".to_string(), "N2_1".to_string()]);
        assert_eq!(hop_ports(&request), vec!["N1_1", "N1_2", "N2_1", "N2_2"]);
    }

    #[test]
    fn resolve_channels_explicit_expands_range() {
        let topo = two_device_topology();
        let ctx = context(two_device_topology(), StubSolver::new(""));
        let option = ChannelOption::Explicit(vec!["WDM32_1..WDM32_1".to_string()]);
        assert_eq!(resolve_channels(&topo, &option, &ctx), vec!["WDM32_1".to_string()]);
    }

    #[test]
    fn bidi_guard_rejects_endpoint_without_opposite_port() {
        let topo = lone_port_topology();
        let ctx = context(lone_port_topology(), StubSolver::new(""));
        let request = Request::new(
            Arc::new(topo),
            PortChannel::new("X_1", "WDM32_1"),
            PortChannel::new("X_1", "WDM32_1"),
            vec!["WDM32_1".to_string()],
            true,
        );
        let err = find_path(&ctx, &request).unwrap_err();
        assert!(matches!(err, NrmError::Request(ref m) if m == "BidiNotSupported"));
    }

    #[test]
    fn find_path_happy_case_solves_single_hop() {
        let stdout = "\
# N1_1 WDM32_1 N1_2 WDM32_1 1 1 0 0 0 0
# N1_2 WDM32_1 N2_1 WDM32_1 1 1 0 0 0 0
# N2_1 WDM32_1 N2_2 WDM32_1 1 1 0 0 0 0
";
        let topo = Arc::new(two_device_topology());
        let ctx = context(two_device_topology(), StubSolver::new(stdout));
        let request = Request::new(
            topo,
            PortChannel::new("N1_1", "WDM32_1"),
            PortChannel::new("N2_2", "WDM32_1"),
            vec!["WDM32_1".to_string()],
            false,
        );
        let outcome = find_path(&ctx, &request).unwrap();
        assert_eq!(outcome.route.entries.len(), 3);
    }

    #[test]
    fn find_path_reports_no_feasible_path_when_solver_finds_nothing() {
        let topo = Arc::new(two_device_topology());
        let ctx = context(two_device_topology(), StubSolver::new("no rows here\n"));
        let request = Request::new(
            topo,
            PortChannel::new("N1_1", "WDM32_1"),
            PortChannel::new("N2_2", "WDM32_1"),
            vec!["WDM32_1".to_string()],
            false,
        );
        assert!(find_path(&ctx, &request).is_err());
    }
}
