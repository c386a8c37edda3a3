// SPDX-License-Identifier: Apache-2.0 OR MIT

//! NRM server entry point: CLI parsing, topology/solver/store startup,
//! and the blocking accept loop (spec.md §5, §6).
//!
//! # Usage
//!
//! ```bash
//! nrm-server --config /etc/nrm/nrm.json
//! nrm-server --config nrm.json --bind 0.0.0.0 --port 7401
//! ```

mod config;
mod ops;
mod server;

use clap::Parser;
use nrm_core::pathfinder::PathfinderContext;
use nrm_core::solver::ShellSolver;
use nrm_core::store::SqliteReservationStore;
use nrm_core::{NrmConfig, ReservationStore, Topology};
use ops::ServerState;
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "nrm-server", about = "Optical network resource manager server")]
struct Args {
    /// Path to the NRM JSON environment/config file (spec.md §6).
    #[arg(long, short = 'c')]
    config: PathBuf,

    /// Override the configured bind host.
    #[arg(long)]
    bind: Option<IpAddr>,

    /// Override the configured port.
    #[arg(long)]
    port: Option<u16>,

    /// Name (or path) of the GLPK-compatible MIP solver binary.
    #[arg(long, default_value = "glpsol")]
    solver_binary: String,

    /// Tracing filter (e.g. "info", "nrm_server=debug").
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(args.log_level.clone()))
        .init();

    let mut nrm_config = NrmConfig::from_file(&args.config)?;
    config::apply_overrides(&mut nrm_config, args.bind, args.port)?;

    info!(topo = %nrm_config.topo_xml.display(), "loading topology");
    let bare_topology = Topology::load(&nrm_config.topo_xml, |_| None)?;

    let solver: Arc<dyn nrm_core::Solver> = Arc::new(ShellSolver::new(args.solver_binary.clone()));
    let ac_work_dir = nrm_config.glpk_dir.join("ac");
    let acs = nrm_core::build_available_connections(&bare_topology, solver.as_ref(), &ac_work_dir)?;
    info!(models = acs.len(), "built available-connection tables");

    let topology = Topology::load(&nrm_config.topo_xml, |model| acs.get(model).cloned())?;

    let mut model_constraints = HashMap::new();
    for comp in topology.components.values() {
        if let (Some(model), Some(glpk)) = (&comp.model, &comp.glpk) {
            model_constraints
                .entry(model.clone())
                .or_insert_with(|| nrm_core::modeltext::parse(glpk));
        }
    }

    std::fs::create_dir_all(&nrm_config.db_dir)?;
    let db_path = nrm_config.db_dir.join("reservations.sqlite3");
    let store: Arc<dyn ReservationStore> = Arc::new(SqliteReservationStore::open(&db_path)?);

    let ctx = PathfinderContext::new(
        Arc::new(topology),
        model_constraints,
        solver,
        nrm_config.glpk_dir.join("runs"),
        nrm_config.num_comps,
    );
    let state = Arc::new(ServerState::new(ctx, store));

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_handler = shutdown.clone();
    ctrlc::set_handler(move || {
        info!("Ctrl+C received, finishing the current request then shutting down");
        shutdown_handler.store(true, Ordering::SeqCst);
    })?;

    let bind_addr = format!("{}:{}", nrm_config.nrm_host, nrm_config.nrm_port);
    server::run(&bind_addr, state, shutdown)?;

    info!("nrm-server exited cleanly");
    Ok(())
}
