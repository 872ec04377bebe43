// Test-only player for end-to-end session tests.
//
// Wraps the real `NetClient` (from `tictac_server::client`) to provide a
// synchronous, test-friendly API for exercising the full protocol:
// connect → identify → move → outcome → rematch vote. The only
// test-specific code is the blocking `next()` wrapper around
// `NetClient::poll()`; all networking uses the same code paths as a real
// client.
//
// See also: `tests/full_game.rs` for the scenarios.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::thread;
use std::time::{Duration, Instant};

use tictac_protocol::message::ServerMessage;
use tictac_protocol::types::RestartChoice;
use tictac_server::client::NetClient;

/// Default timeout for blocking poll operations.
const POLL_TIMEOUT: Duration = Duration::from_secs(5);

/// Sleep duration between poll attempts.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A test player wrapping a real NetClient.
pub struct TestPlayer {
    client: NetClient,
    inbox: VecDeque<ServerMessage>,
    /// The seat-assignment greeting received during the handshake.
    pub greeting: String,
}

impl TestPlayer {
    /// Connect to a server and complete the username handshake.
    pub fn connect(addr: SocketAddr, name: &str) -> Self {
        Self::try_connect(addr, name).expect("TestPlayer::connect failed")
    }

    /// Like `connect`, but surfaces the rejection reason (table full).
    pub fn try_connect(addr: SocketAddr, name: &str) -> Result<Self, String> {
        let (client, info) = NetClient::connect(&addr.to_string(), name)?;
        Ok(Self {
            client,
            inbox: VecDeque::new(),
            greeting: info.greeting,
        })
    }

    pub fn send_move(&mut self, position: u8) {
        self.client.send_move(position).expect("send_move failed");
    }

    pub fn vote(&mut self, decision: RestartChoice) {
        self.client
            .send_restart(decision)
            .expect("send_restart failed");
    }

    pub fn quit(&mut self) {
        self.client.quit().expect("quit failed");
    }

    /// Tear the connection down abruptly — no quit message, just a closed
    /// socket, as the server would see a crashed client.
    pub fn disconnect(mut self) {
        self.client.disconnect();
    }

    /// Blocking pop of the next server message, in arrival order.
    /// Panics after `POLL_TIMEOUT` without one.
    pub fn next(&mut self) -> ServerMessage {
        let start = Instant::now();
        loop {
            if let Some(msg) = self.inbox.pop_front() {
                return msg;
            }
            for msg in self.client.poll() {
                self.inbox.push_back(msg);
            }
            if self.inbox.is_empty() {
                assert!(
                    start.elapsed() < POLL_TIMEOUT,
                    "timed out waiting for a server message"
                );
                thread::sleep(POLL_INTERVAL);
            }
        }
    }

    /// Pop the next message and insist it is an `error`, returning its text.
    pub fn next_error(&mut self) -> String {
        match self.next() {
            ServerMessage::Error { message } => message,
            other => panic!("expected Error, got {other:?}"),
        }
    }
}
