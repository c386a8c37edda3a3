// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-client framing (spec.md §6): client -> server is a raw
//! newline-terminated UTF-8 command with no length prefix; server ->
//! client is a 4-byte big-endian length prefix followed by that many
//! UTF-8 reply bytes. Adapted from `hdds-discovery-server`'s
//! `ClientConnection`, which length-prefixes both directions over JSON
//! `DiscoveryMessage`s — here only the reply direction is prefixed, and
//! the payload is the plain-text op reply rather than a JSON envelope.

use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct ClientConnection {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    pub peer_addr: SocketAddr,
}

impl ClientConnection {
    pub fn new(stream: TcpStream) -> Result<Self, ConnectionError> {
        let peer_addr = stream.peer_addr()?;
        let writer = stream.try_clone()?;
        Ok(Self {
            reader: BufReader::new(stream),
            writer,
            peer_addr,
        })
    }

    /// Reads one command line. Returns `Ok(None)` on EOF (client closed),
    /// per spec.md §6: "The server also accepts EOF/empty receive to
    /// close a client."
    pub fn read_command(&mut self) -> Result<Option<String>, ConnectionError> {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line)?;
        if n == 0 {
            return Ok(None);
        }
        let trimmed = line.trim_end_matches(['\n', '\r']);
        Ok(Some(trimmed.to_string()))
    }

    /// Writes one reply with a 4-byte big-endian length prefix
    /// (spec.md §6).
    pub fn send_reply(&mut self, reply: &str) -> Result<(), ConnectionError> {
        let bytes = reply.as_bytes();
        let len = (bytes.len() as u32).to_be_bytes();
        self.writer.write_all(&len)?;
        self.writer.write_all(bytes)?;
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;

    #[test]
    fn read_command_then_send_reply_roundtrip() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let client_thread = std::thread::spawn(move || {
            let mut client = TcpStream::connect(addr).unwrap();
            client.write_all(b"pathfind -s A@B -d C@D\n").unwrap();

            let mut len_buf = [0u8; 4];
            client.read_exact(&mut len_buf).unwrap();
            let len = u32::from_be_bytes(len_buf) as usize;
            let mut body = vec![0u8; len];
            client.read_exact(&mut body).unwrap();
            String::from_utf8(body).unwrap()
        });

        let (stream, _) = listener.accept().unwrap();
        let mut conn = ClientConnection::new(stream).unwrap();
        let cmd = conn.read_command().unwrap().unwrap();
        assert_eq!(cmd, "pathfind -s A@B -d C@D");
        conn.send_reply("ERROR: no such port").unwrap();

        let received = client_thread.join().unwrap();
        assert_eq!(received, "ERROR: no such port");
    }

    #[test]
    fn read_command_returns_none_on_eof() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let client_thread = std::thread::spawn(move || {
            let _client = TcpStream::connect(addr).unwrap();
        });

        let (stream, _) = listener.accept().unwrap();
        let mut conn = ClientConnection::new(stream).unwrap();
        client_thread.join().unwrap();
        assert!(conn.read_command().unwrap().is_none());
    }
}
