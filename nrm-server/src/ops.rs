// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Operation dispatch table (spec.md §4.10, §9: "dispatch by table
//! lookup, not control-flow branching" for option parsing). Each
//! operation runs as a single top-level try-block: a successful handler
//! returns a reply string, any error becomes `ERROR: <message>`.

use nrm_core::pathfinder::{self, ChannelOption, PathfinderContext};
use nrm_core::reservation::{Reservation, ReservationManager};
use nrm_core::store::ReservationStore;
use nrm_core::{PortChannel, Request};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// How many values a flag consumes off the token stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Bool,
    One,
    Many,
}

pub struct OptionSpec {
    pub flag: &'static str,
    pub arity: Arity,
}

const fn opt(flag: &'static str, arity: Arity) -> OptionSpec {
    OptionSpec { flag, arity }
}

const PATHFIND_SCHEMA: &[OptionSpec] = &[
    opt("-s", Arity::One),
    opt("-d", Arity::One),
    opt("-bi", Arity::Bool),
    opt("-ero", Arity::Many),
    opt("-ch", Arity::Many),
    opt("-wdmsa", Arity::Bool),
    opt("-p", Arity::One),
    opt("-model", Arity::One),
    opt("-data", Arity::One),
];
const QUERY_SCHEMA: &[OptionSpec] = &[opt("-g", Arity::One), opt("-q", Arity::Bool), opt("-db", Arity::Bool)];
const TERMINATE_SCHEMA: &[OptionSpec] = &[opt("-g", Arity::One), opt("-db", Arity::Bool)];
const TERMINATEALL_SCHEMA: &[OptionSpec] = &[opt("-db", Arity::Bool)];

/// Parsed `-flag value...` tokens, keyed by flag name.
#[derive(Debug, Default)]
pub struct ParsedArgs {
    bools: HashSet<String>,
    ones: HashMap<String, String>,
    manys: HashMap<String, Vec<String>>,
}

impl ParsedArgs {
    pub fn has(&self, flag: &str) -> bool {
        self.bools.contains(flag)
    }

    pub fn one(&self, flag: &str) -> Option<&str> {
        self.ones.get(flag).map(|s| s.as_str())
    }

    pub fn many(&self, flag: &str) -> Option<&[String]> {
        self.manys.get(flag).map(|v| v.as_slice())
    }
}

/// Splits `tokens` against `schema`, consuming each flag's declared
/// arity. Unrecognized flags and missing values are reported by name
/// rather than silently ignored.
pub fn parse_args(tokens: &[String], schema: &[OptionSpec]) -> Result<ParsedArgs, String> {
    let mut out = ParsedArgs::default();
    let mut i = 0;
    while i < tokens.len() {
        let tok = tokens[i].as_str();
        let spec = schema
            .iter()
            .find(|s| s.flag == tok)
            .ok_or_else(|| format!("unrecognized flag: {tok}"))?;
        i += 1;
        match spec.arity {
            Arity::Bool => {
                out.bools.insert(spec.flag.to_string());
            }
            Arity::One => {
                let value = tokens
                    .get(i)
                    .ok_or_else(|| format!("{} requires a value", spec.flag))?;
                out.ones.insert(spec.flag.to_string(), value.clone());
                i += 1;
            }
            Arity::Many => {
                let mut values = Vec::new();
                while i < tokens.len() && !tokens[i].starts_with('-') {
                    values.push(tokens[i].clone());
                    i += 1;
                }
                if values.is_empty() {
                    return Err(format!("{} requires at least one value", spec.flag));
                }
                out.manys.insert(spec.flag.to_string(), values);
            }
        }
    }
    Ok(out)
}

fn parse_port_channel(value: &str) -> Result<PortChannel, String> {
    let (port, channel) = value
        .split_once('@')
        .ok_or_else(|| format!("expected port@channel, got '{value}'"))?;
    Ok(PortChannel::new(port, channel))
}

/// Shared per-connection-sequence state (spec.md §5: mutated only on the
/// request thread; the accept loop is one client at a time).
pub struct ServerState {
    pub ctx: PathfinderContext,
    pub reservations: Mutex<ReservationManager>,
    pub store: Arc<dyn ReservationStore>,
    pub deltmp: AtomicBool,
}

impl ServerState {
    pub fn new(ctx: PathfinderContext, store: Arc<dyn ReservationStore>) -> Self {
        Self {
            ctx,
            reservations: Mutex::new(ReservationManager::new()),
            store,
            deltmp: AtomicBool::new(true),
        }
    }
}

fn usage() -> String {
    "usage: pathfind|reserve -s SRC -d DST [-bi] [-ero P...] [-ch C...] [-wdmsa] [-p N] \
     | query [-g ID] [-db] | terminate -g ID [-db] | TERMINATEALL [-db] | writeDB \
     | deltmp true|false | dumpglpsol true|false"
        .to_string()
}

/// Parses one command line and runs its operation (spec.md §4.10).
pub fn dispatch(line: &str, state: &ServerState) -> String {
    let mut tokens = line.split_whitespace();
    let Some(op) = tokens.next() else {
        return usage();
    };
    let rest: Vec<String> = tokens.map(|s| s.to_string()).collect();

    let result = match op {
        "pathfind" => handle_pathfind(&rest, state, false),
        "reserve" => handle_pathfind(&rest, state, true),
        "query" => handle_query(&rest, state),
        "terminate" => handle_terminate(&rest, state),
        "TERMINATEALL" => handle_terminate_all(&rest, state),
        "writeDB" => handle_write_db(state),
        "deltmp" => handle_deltmp(&rest, state),
        "dumpglpsol" => handle_dumpglpsol(&rest, state),
        other => Err(format!("unknown operation '{other}'. {}", usage())),
    };
    match result {
        Ok(reply) => reply,
        Err(e) => format!("ERROR: {e}"),
    }
}

fn handle_pathfind(args: &[String], state: &ServerState, reserve: bool) -> Result<String, String> {
    let parsed = parse_args(args, PATHFIND_SCHEMA)?;
    let src = parse_port_channel(parsed.one("-s").ok_or("pathfind requires -s SRC")?)?;
    let dst = parse_port_channel(parsed.one("-d").ok_or("pathfind requires -d DST")?)?;
    let bidi = parsed.has("-bi");

    let option = if parsed.has("-wdmsa") {
        ChannelOption::Wdmsa
    } else if let Some(ch) = parsed.many("-ch") {
        ChannelOption::Explicit(ch.to_vec())
    } else {
        ChannelOption::All
    };
    let channels = pathfinder::resolve_channels(&state.ctx.topology, &option, &state.ctx);
    if channels.is_empty() {
        return Err("no channels available for this request".to_string());
    }

    let mut request = Request::new(state.ctx.topology.clone(), src, dst, channels, bidi);
    if let Some(ero) = parsed.many("-ero") {
        request.org_ero = Some(ero.to_vec());
    }

    let outcome = pathfinder::find_path(&state.ctx, &request).map_err(|e| e.to_string())?;

    let reply = if reserve {
        let reservation = Reservation::new(request.src.clone(), request.dst.clone(), outcome.route.clone());
        let global_id = reservation.global_id.clone();
        let short = state.reservations.lock().unwrap().add(reservation);
        format!("id={short}, globalId={global_id}")
    } else {
        format_route(&outcome.route, outcome.cost)
    };

    if state.deltmp.load(Ordering::SeqCst) {
        let _ = std::fs::remove_dir_all(&outcome.run_dir);
    }
    Ok(reply)
}

fn format_route(route: &nrm_core::Route, cost: f64) -> String {
    let mut out = format!("cost={cost}\n");
    for entry in &route.entries {
        out.push_str(&format!(
            "{} -> {} x={} c={} is_go={}\n",
            entry.src, entry.dst, entry.x, entry.c, entry.is_go
        ));
    }
    out
}

fn format_reservation(reservation: &Reservation) -> String {
    let mut out = format!(
        "globalId={} src={} dst={}\n",
        reservation.global_id, reservation.src, reservation.dst
    );
    for entry in &reservation.route.entries {
        out.push_str(&format!(
            "  {} -> {} x={} c={} is_go={}\n",
            entry.src, entry.dst, entry.x, entry.c, entry.is_go
        ));
    }
    out
}

fn lookup_reservation<'a>(mgr: &'a ReservationManager, id: &str) -> Option<&'a Reservation> {
    if let Ok(short) = id.parse::<u64>() {
        if let Some(r) = mgr.get_by_short(short) {
            return Some(r);
        }
    }
    mgr.get(id)
}

fn resolve_global_id(mgr: &ReservationManager, id: &str) -> Option<String> {
    if let Ok(short) = id.parse::<u64>() {
        if let Some(global) = mgr.ids.global_of(short) {
            return Some(global);
        }
    }
    mgr.get(id).map(|r| r.global_id.clone())
}

fn handle_query(args: &[String], state: &ServerState) -> Result<String, String> {
    let parsed = parse_args(args, QUERY_SCHEMA)?;
    let mgr = state.reservations.lock().unwrap();
    let mut out = String::new();

    if let Some(id) = parsed.one("-g") {
        let reservation = lookup_reservation(&mgr, id).ok_or_else(|| format!("no such reservation: {id}"))?;
        out.push_str(&format_reservation(reservation));
        if parsed.has("-db") {
            if let Some(record) = state
                .store
                .get(&reservation.global_id)
                .map_err(|e| e.to_string())?
            {
                out.push_str(&format!("[db] globalid={} route entries={}\n", record.globalid, record.route.len()));
            }
        }
    } else {
        for reservation in mgr.all() {
            out.push_str(&format_reservation(reservation));
        }
        if parsed.has("-db") {
            for record in state.store.scan().map_err(|e| e.to_string())? {
                out.push_str(&format!("[db] globalid={} route entries={}\n", record.globalid, record.route.len()));
            }
        }
    }

    if out.is_empty() {
        out.push_str("no reservations\n");
    }
    Ok(out)
}

fn handle_terminate(args: &[String], state: &ServerState) -> Result<String, String> {
    let parsed = parse_args(args, TERMINATE_SCHEMA)?;
    let id = parsed.one("-g").ok_or("terminate requires -g ID|GLOBAL")?;
    let use_db = parsed.has("-db");

    let mut mgr = state.reservations.lock().unwrap();
    let global = resolve_global_id(&mgr, id).ok_or_else(|| format!("no such reservation: {id}"))?;
    let store: Option<&dyn ReservationStore> = if use_db { Some(state.store.as_ref()) } else { None };
    if mgr.delete(&global, store) {
        Ok(format!(
            "delete from memory{}: {global}",
            if use_db { " and DB" } else { "" }
        ))
    } else {
        Err(format!("no such reservation: {id}"))
    }
}

fn handle_terminate_all(args: &[String], state: &ServerState) -> Result<String, String> {
    let parsed = parse_args(args, TERMINATEALL_SCHEMA)?;
    let use_db = parsed.has("-db");
    let mut mgr = state.reservations.lock().unwrap();
    let store: Option<&dyn ReservationStore> = if use_db { Some(state.store.as_ref()) } else { None };
    let count = mgr.delete_all(store);
    Ok(format!(
        "delete all {count} reservation(s) from memory{}",
        if use_db { " and DB" } else { "" }
    ))
}

fn handle_write_db(state: &ServerState) -> Result<String, String> {
    let mut mgr = state.reservations.lock().unwrap();
    let (written, failures) = mgr.write_db(state.store.as_ref());
    if failures.is_empty() {
        Ok(format!("{written} entries written to the DB"))
    } else {
        Err(format!(
            "{written} entries written to the DB; failures: {}",
            failures.join("; ")
        ))
    }
}

fn parse_bool_positional(args: &[String], op: &str) -> Result<bool, String> {
    match args.first().map(|s| s.as_str()) {
        Some("true") => Ok(true),
        Some("false") => Ok(false),
        _ => Err(format!("{op} requires 'true' or 'false'")),
    }
}

fn handle_deltmp(args: &[String], state: &ServerState) -> Result<String, String> {
    let value = parse_bool_positional(args, "deltmp")?;
    state.deltmp.store(value, Ordering::SeqCst);
    Ok(format!("deltmp={value}"))
}

fn handle_dumpglpsol(args: &[String], state: &ServerState) -> Result<String, String> {
    let value = parse_bool_positional(args, "dumpglpsol")?;
    state.ctx.set_dump_glpsol(value);
    Ok(format!("dumpglpsol={value}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nrm_core::solver::Solver;
    use nrm_core::store::InMemoryReservationStore;
    use nrm_core::{PathfinderContext, SolverRun};
    use std::path::Path;
    use std::time::Duration;

    struct StubSolver {
        stdout: String,
        exit_ok: bool,
    }

    impl Solver for StubSolver {
        fn solve(&self, _model: &Path, _data: &Path, _out: &Path, _tmlim: Duration) -> nrm_core::Result<SolverRun> {
            Ok(SolverRun {
                stdout: self.stdout.clone(),
                stderr: String::new(),
                exit_ok: self.exit_ok,
            })
        }
    }

    fn topology() -> nrm_core::Topology {
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
        nrm_core::Topology::load(&path, |_| None).unwrap()
    }

    fn state(stdout: &str, exit_ok: bool) -> ServerState {
        let ctx = PathfinderContext::new(
            Arc::new(topology()),
            HashMap::new(),
            Arc::new(StubSolver {
                stdout: stdout.to_string(),
                exit_ok,
            }),
            tempfile::tempdir().unwrap().keep(),
            2,
        );
        ServerState::new(ctx, Arc::new(InMemoryReservationStore::new()))
    }

    #[test]
    fn parse_args_collects_bool_one_and_many() {
        let tokens: Vec<String> = "-s N1_1@WDM32_1 -d N2_2@WDM32_1 -bi -ero N1_2 N2_1"
            .split_whitespace()
            .map(String::from)
            .collect();
        let parsed = parse_args(&tokens, PATHFIND_SCHEMA).unwrap();
        assert_eq!(parsed.one("-s"), Some("N1_1@WDM32_1"));
        assert!(parsed.has("-bi"));
        assert_eq!(parsed.many("-ero"), Some(&["N1_2".to_string(), "N2_1".to_string()][..]));
    }

    #[test]
    fn parse_args_rejects_unknown_flag() {
        let tokens: Vec<String> = vec!["-bogus".to_string()];
        assert!(parse_args(&tokens, PATHFIND_SCHEMA).is_err());
    }

    #[test]
    fn dispatch_unknown_op_reports_usage() {
        let st = state("", false);
        assert!(dispatch("frobnicate", &st).starts_with("ERROR: unknown operation"));
    }

    #[test]
    fn dispatch_pathfind_then_reserve_then_query() {
        let stdout = "\
# N1_1 WDM32_1 N1_2 WDM32_1 1 1 0 0 0 0
# N1_2 WDM32_1 N2_1 WDM32_1 1 1 0 0 0 0
# N2_1 WDM32_1 N2_2 WDM32_1 1 1 0 0 0 0
";
        let st = state(stdout, true);
        let pf = dispatch("pathfind -s N1_1@WDM32_1 -d N2_2@WDM32_1", &st);
        assert!(pf.starts_with("cost="), "unexpected reply: {pf}");

        let reserved = dispatch("reserve -s N1_1@WDM32_1 -d N2_2@WDM32_1", &st);
        assert!(reserved.starts_with("id="), "unexpected reply: {reserved}");

        let queried = dispatch("query", &st);
        assert!(queried.contains("globalId="));
    }

    #[test]
    fn dispatch_deltmp_and_dumpglpsol_toggle() {
        let st = state("", false);
        assert_eq!(dispatch("deltmp false", &st), "deltmp=false");
        assert!(!st.deltmp.load(Ordering::SeqCst));
        assert_eq!(dispatch("dumpglpsol true", &st), "dumpglpsol=true");
    }

    #[test]
    fn dispatch_terminate_all_on_empty_store() {
        let st = state("", false);
        let reply = dispatch("TERMINATEALL", &st);
        assert_eq!(reply, "delete all 0 reservation(s) from memory");
    }
}
