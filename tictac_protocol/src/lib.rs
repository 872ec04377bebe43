// tictac_protocol — wire protocol for the game session server.
//
// This crate defines the message types, framing, and serialization used by
// the session server (`tictac_server`) and game clients to communicate
// over TCP. It is shared between both sides and has no dependency on the
// game logic.
//
// Module overview:
// - `types.rs`:    Core types — `Seat`, `RestartChoice`, `ConnId`.
// - `message.rs`:  Client-to-server and server-to-client message enums.
// - `framing.rs`:  Newline-delimited framing over any `Read`/`Write`
//                  stream, plus `FrameBuffer` for non-blocking reads.
//
// Design decisions:
// - **JSON lines.** Each message is a single JSON object on its own line,
//   tagged with a `type` field. Easy to drive from a terminal with netcat
//   when debugging, and clients dispatch on the tag instead of matching
//   message text.
// - **No async runtime.** Uses `std::io::Read`/`Write` for framing,
//   compatible with both blocking streams and the server's non-blocking
//   event loop.

pub mod framing;
pub mod message;
pub mod types;

pub use framing::{DELIMITER, FrameBuffer, read_message, write_message};
pub use message::{BoardCells, ClientMessage, ServerMessage};
pub use types::{ConnId, RestartChoice, Seat};
