// tictac_server — a two-player game session multiplexed over one TCP
// socket server.
//
// The server accepts up to two connections, assigns each a seat after an
// identity exchange, arbitrates alternating moves on a 9-cell board, and
// sequences the game-over / rematch negotiation between both peers — all
// on a single thread that never blocks on either socket.
//
// Module overview:
// - `board.rs`:    The 9-cell grid — placement rules, win/draw detection.
// - `session.rs`:  Session state — connection registry, seat assignment,
//                  the protocol state machine, and the message sender.
//                  The core data structure that `server.rs` drives.
// - `server.rs`:   TCP listener and the single-threaded non-blocking
//                  event loop; owns the idle-timeout clock and performs
//                  the orderly shutdown.
// - `client.rs`:   Library client — connect/handshake plus typed send
//                  helpers and a non-blocking `poll()`.
//
// Dependencies: `tictac_protocol` (shared message types and framing),
// `serde_json` at the wire seams, `log` for event logging.
//
// The server can run as a standalone binary (`main.rs`) or be embedded in
// another process via the library API (`start_server`).

pub mod board;
pub mod client;
pub mod server;
pub mod session;

pub use server::{ServerConfig, ServerHandle, ShutdownReason, serve, start_server};
pub use session::SessionEnd;
