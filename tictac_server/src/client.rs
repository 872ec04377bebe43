// TCP client library for connecting to the game session server.
//
// Provides a non-blocking interface for a caller's main loop to talk to
// the server. Architecture:
// - `connect()` performs TCP connect + the username handshake on the
//   calling thread, then spawns a background reader thread.
// - The reader thread reads framed lines in a loop, deserializes
//   `ServerMessage`, and pushes into an `mpsc` channel.
// - The caller holds a `BufWriter<TcpStream>` for sending.
// - `poll()` drains the inbox non-blocking, returning all queued messages.
//
// The interactive terminal loop (prompting a human, printing boards) is
// the caller's concern — this module only speaks the wire protocol.

use std::io::{BufReader, BufWriter};
use std::net::{Shutdown, TcpStream};
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tictac_protocol::framing::{read_message, write_message};
use tictac_protocol::message::{ClientMessage, ServerMessage};
use tictac_protocol::types::RestartChoice;

/// Information returned by a successful `connect()` handshake.
pub struct JoinInfo {
    /// The seat-assignment ack text ("Welcome, ... You are playing as X.").
    pub greeting: String,
}

/// TCP client for the game session protocol.
pub struct NetClient {
    writer: BufWriter<TcpStream>,
    inbox: Receiver<ServerMessage>,
    _reader_thread: Option<JoinHandle<()>>,
}

impl NetClient {
    /// Connect to a server, answer its username request, and spawn a
    /// reader thread. Returns the client and the seat-assignment greeting
    /// on success.
    pub fn connect(addr: &str, username: &str) -> Result<(Self, JoinInfo), String> {
        let stream = TcpStream::connect(addr).map_err(|e| format!("connect failed: {e}"))?;

        // Bound the handshake so a wedged server can't hang the caller.
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .ok();

        let reader_stream = stream
            .try_clone()
            .map_err(|e| format!("clone failed: {e}"))?;
        let mut writer = BufWriter::new(stream);
        let mut reader = BufReader::new(reader_stream);

        // The server opens with a username request — or an error line when
        // the table is already full.
        match recv_msg(&mut reader)? {
            ServerMessage::UsernameRequest { .. } => {}
            ServerMessage::Error { message } => return Err(format!("rejected: {message}")),
            other => return Err(format!("unexpected first message: {other:?}")),
        }

        send_msg(
            &mut writer,
            &ClientMessage::UsernameResponse {
                username: username.into(),
            },
        )?;

        let greeting = match recv_msg(&mut reader)? {
            ServerMessage::Response { message } => message,
            ServerMessage::Error { message } => return Err(format!("rejected: {message}")),
            other => return Err(format!("unexpected response: {other:?}")),
        };

        // Clear the handshake timeout for the long-lived reader loop.
        if let Ok(inner) = reader.get_ref().try_clone() {
            inner.set_read_timeout(None).ok();
        }

        let (tx, rx) = mpsc::channel();
        let reader_thread = thread::spawn(move || {
            reader_loop(reader, tx);
        });

        Ok((
            Self {
                writer,
                inbox: rx,
                _reader_thread: Some(reader_thread),
            },
            JoinInfo { greeting },
        ))
    }

    /// Attempt to claim a cell (1-9).
    pub fn send_move(&mut self, position: u8) -> Result<(), String> {
        send_msg(&mut self.writer, &ClientMessage::Move { position })
    }

    /// Vote on a rematch after the game concluded.
    pub fn send_restart(&mut self, decision: RestartChoice) -> Result<(), String> {
        send_msg(&mut self.writer, &ClientMessage::RestartDecision { decision })
    }

    /// End the whole session for both players.
    pub fn quit(&mut self) -> Result<(), String> {
        send_msg(&mut self.writer, &ClientMessage::Quit)
    }

    /// Tear the connection down without a protocol farewell, the way a
    /// crashed client would. Shuts the socket itself down so the reader
    /// thread unblocks and the server sees a plain disconnect.
    pub fn disconnect(&mut self) {
        let _ = self.writer.get_ref().shutdown(Shutdown::Both);
    }

    /// Drain all queued server messages (non-blocking).
    pub fn poll(&self) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(msg) = self.inbox.try_recv() {
            messages.push(msg);
        }
        messages
    }
}

/// Serialize a `ClientMessage` to JSON and write it as one line.
fn send_msg(writer: &mut BufWriter<TcpStream>, msg: &ClientMessage) -> Result<(), String> {
    let json = serde_json::to_vec(msg).map_err(|e| e.to_string())?;
    write_message(writer, &json).map_err(|e| e.to_string())
}

/// Read and deserialize one `ServerMessage` (blocking).
fn recv_msg(reader: &mut BufReader<TcpStream>) -> Result<ServerMessage, String> {
    let bytes = read_message(reader).map_err(|e| format!("read failed: {e}"))?;
    serde_json::from_slice(&bytes).map_err(|e| format!("parse failed: {e}"))
}

/// Reader thread: read framed lines in a loop, push to the channel.
/// Exits on EOF, a read error, a malformed line, or the receiver dropping.
fn reader_loop(mut reader: BufReader<TcpStream>, tx: mpsc::Sender<ServerMessage>) {
    while let Ok(bytes) = read_message(&mut reader) {
        match serde_json::from_slice::<ServerMessage>(&bytes) {
            Ok(msg) => {
                if tx.send(msg).is_err() {
                    break; // Caller dropped the client.
                }
            }
            Err(_) => break,
        }
    }
}
