// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Blocking accept loop (spec.md §5: "the server accepts one TCP client
//! at a time; requests on a client are serialized"). Adapted from
//! `hdds-discovery-server::server`'s async/tokio loop to a plain
//! `std::net` loop, matching the scheduling model this protocol actually
//! wants: one connection fully drained before the next is accepted.

pub mod connection;

use crate::ops::{self, ServerState};
use connection::ClientConnection;
use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("bind failed: {0}")]
    Bind(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Runs the accept loop until `shutdown` is flipped. One client is
/// served at a time; `shutdown` is checked between `accept()` calls, so
/// the server finishes the connection it is currently draining before
/// exiting (spec.md §5: "on Ctrl+C the server finishes the current
/// handler iteration ... and exits").
pub fn run(bind_addr: &str, state: Arc<ServerState>, shutdown: Arc<AtomicBool>) -> Result<(), ServerError> {
    let listener = TcpListener::bind(bind_addr).map_err(|e| ServerError::Bind(e.to_string()))?;
    listener.set_nonblocking(true)?;
    info!(%bind_addr, "nrm-server listening");

    while !shutdown.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                stream.set_nonblocking(false)?;
                info!(%peer, "client connected");
                if let Err(e) = serve_client(stream, &state) {
                    warn!(%peer, error = %e, "client connection ended with an error");
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(std::time::Duration::from_millis(50));
            }
            Err(e) => return Err(ServerError::Io(e)),
        }
    }

    info!("shutdown requested, exiting accept loop");
    Ok(())
}

fn serve_client(stream: std::net::TcpStream, state: &ServerState) -> Result<(), ServerError> {
    let mut conn = ClientConnection::new(stream).map_err(|e| ServerError::Io(std::io::Error::other(e.to_string())))?;
    loop {
        let Some(line) = conn
            .read_command()
            .map_err(|e| ServerError::Io(std::io::Error::other(e.to_string())))?
        else {
            info!(peer = %conn.peer_addr, "client closed");
            return Ok(());
        };
        if line.trim().is_empty() {
            continue;
        }
        info!(peer = %conn.peer_addr, command = %line, "dispatching command");
        let reply = ops::dispatch(&line, state);
        conn.send_reply(&reply)
            .map_err(|e| ServerError::Io(std::io::Error::other(e.to_string())))?;
    }
}
