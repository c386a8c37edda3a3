// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `nrmctl`: line-mode TCP client for the NRM server (spec.md §6).
//!
//! Connects once, then for each line read from stdin sends it verbatim
//! (newline-terminated, no framing) as one command and prints the
//! decoded reply. On `Ctrl+C` or stdin EOF it prints `close` and exits 0.

use clap::Parser;
use std::io::{BufRead, Read, Write};
use std::net::{IpAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "nrmctl", about = "Line-mode client for the NRM server")]
struct Args {
    /// Server host.
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    /// Server port.
    #[arg(long, default_value_t = 7401)]
    port: u16,

    /// Tracing filter (e.g. "info", "nrm_client=debug").
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(args.log_level.clone()))
        .init();

    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupted_handler = interrupted.clone();
    ctrlc::set_handler(move || {
        interrupted_handler.store(true, Ordering::SeqCst);
    })?;

    let addr = format!("{}:{}", args.host, args.port);
    let mut stream = TcpStream::connect(&addr)?;
    info!(%addr, "connected to nrm-server");

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        if interrupted.load(Ordering::SeqCst) {
            break;
        }
        let Some(line) = lines.next() else {
            break;
        };
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        if let Err(e) = send_command(&mut stream, &line) {
            warn!(error = %e, "failed to send command");
            break;
        }
        match read_reply(&mut stream) {
            Ok(Some(reply)) => println!("{reply}"),
            Ok(None) => {
                warn!("server closed the connection");
                break;
            }
            Err(e) => {
                warn!(error = %e, "failed to read reply");
                break;
            }
        }
    }

    println!("close");
    Ok(())
}

fn send_command(stream: &mut TcpStream, line: &str) -> std::io::Result<()> {
    stream.write_all(line.as_bytes())?;
    stream.write_all(b"\n")?;
    stream.flush()
}

/// Reads one 4-byte-big-endian-length-prefixed reply (spec.md §6). A
/// zero-length or missing length signals the server is down, reported
/// here as `Ok(None)` so the caller can close cleanly.
fn read_reply(stream: &mut TcpStream) -> std::io::Result<Option<String>> {
    let mut len_buf = [0u8; 4];
    if let Err(e) = stream.read_exact(&mut len_buf) {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            return Ok(None);
        }
        return Err(e);
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    if len == 0 {
        return Ok(None);
    }
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body)?;
    Ok(Some(String::from_utf8_lossy(&body).to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn send_command_appends_newline_with_no_length_prefix() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 64];
            let n = stream.read(&mut buf).unwrap();
            String::from_utf8(buf[..n].to_vec()).unwrap()
        });

        let mut client = TcpStream::connect(addr).unwrap();
        send_command(&mut client, "query").unwrap();
        drop(client);

        assert_eq!(server.join().unwrap(), "query\n");
    }

    #[test]
    fn read_reply_decodes_length_prefixed_body() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let body = b"id=1, globalId=urn:uuid:abc";
            stream.write_all(&(body.len() as u32).to_be_bytes()).unwrap();
            stream.write_all(body).unwrap();
        });

        let mut client = TcpStream::connect(addr).unwrap();
        let reply = read_reply(&mut client).unwrap().unwrap();
        assert_eq!(reply, "id=1, globalId=urn:uuid:abc");
        server.join().unwrap();
    }

    #[test]
    fn read_reply_returns_none_on_eof() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = std::thread::spawn(move || {
            let (_stream, _) = listener.accept().unwrap();
        });

        let mut client = TcpStream::connect(addr).unwrap();
        server.join().unwrap();
        assert!(read_reply(&mut client).unwrap().is_none());
    }
}
