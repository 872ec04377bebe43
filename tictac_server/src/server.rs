// TCP server and main event loop for the game session.
//
// Architecture: one thread owns everything — the non-blocking listener,
// every client socket, the per-connection frame buffers, and the
// `GameSession`. Each pass over the loop:
//
// 1. Checks the idle clock (last accept or last successfully parsed
//    message); an idle session shuts down without a broadcast.
// 2. Accepts any pending connections; a third connection gets a
//    "table full" error and is closed unregistered.
// 3. Reads whatever bytes each socket has ready (fixed 1 KiB chunks),
//    runs them through the `FrameBuffer`, and feeds every complete
//    message to the session. A zero-byte read or a reset is a
//    disconnect, not an error.
// 4. Reaps connections that failed on read or write through the same
//    cleanup path.
//
// Nothing blocks except a short bounded sleep when a pass found no work,
// which keeps the idle check serviced on a quiet socket set. Because only
// one message is processed at a time, every session transition is atomic;
// ordering between the two players is their arrival order at the loop.
//
// Shutdown is orderly: on a terminal session event (quit, declined or
// abandoned rematch vote), the idle timeout, or a `stop()` request, the
// loop closes every connection, drops the listener, and returns the
// reason to the caller — no process exit from inside the loop.

use std::fmt;
use std::io::{self, Read};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use tictac_protocol::framing::FrameBuffer;
use tictac_protocol::message::ClientMessage;
use tictac_protocol::types::ConnId;

use crate::session::{GameSession, SessionEnd};

/// How long the loop sleeps when a pass over the sockets found no work.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Fixed receive chunk per read call.
const RECV_CHUNK: usize = 1024;

/// Configuration for starting a session server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Shut down after this long without an accept or a parsed message.
    pub idle_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 9999,
            idle_timeout: Duration::from_secs(300),
        }
    }
}

/// Why the event loop returned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShutdownReason {
    /// The session ended through the protocol (quit or rematch vote).
    Session(SessionEnd),
    /// No activity for the configured idle duration.
    IdleTimeout,
    /// `ServerHandle::stop()` was called.
    Stopped,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Session(SessionEnd::Quit { name }) => write!(f, "{name} quit"),
            ShutdownReason::Session(SessionEnd::Declined) => write!(f, "rematch declined"),
            ShutdownReason::Session(SessionEnd::Abandoned) => {
                write!(f, "a player left during the rematch vote")
            }
            ShutdownReason::IdleTimeout => write!(f, "idle timeout"),
            ShutdownReason::Stopped => write!(f, "stop requested"),
        }
    }
}

/// Handle returned by `start_server` to control the running server.
pub struct ServerHandle {
    keep_running: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<ShutdownReason>>,
}

impl ServerHandle {
    /// Signal the loop to stop and wait for it to wind down.
    pub fn stop(mut self) -> ShutdownReason {
        self.keep_running.store(false, Ordering::SeqCst);
        self.join()
    }

    /// Wait for the session to end on its own terms.
    pub fn wait(mut self) -> ShutdownReason {
        self.join()
    }

    fn join(&mut self) -> ShutdownReason {
        match self.thread.take() {
            Some(handle) => handle.join().unwrap_or(ShutdownReason::Stopped),
            None => ShutdownReason::Stopped,
        }
    }
}

/// Bind and run the session loop on the calling thread until it ends.
pub fn serve(config: ServerConfig) -> io::Result<ShutdownReason> {
    let listener = bind(&config)?;
    info!("listening on {}", listener.local_addr()?);
    Ok(run_session(
        listener,
        config,
        Arc::new(AtomicBool::new(true)),
    ))
}

/// Start the session server on a background thread. Returns a handle for
/// stopping it and the actual bound address (useful when port 0 is used to
/// let the OS pick a free port).
pub fn start_server(config: ServerConfig) -> io::Result<(ServerHandle, SocketAddr)> {
    let listener = bind(&config)?;
    let addr = listener.local_addr()?;
    let keep_running = Arc::new(AtomicBool::new(true));
    let keep_running_loop = keep_running.clone();

    let thread = thread::spawn(move || run_session(listener, config, keep_running_loop));

    Ok((
        ServerHandle {
            keep_running,
            thread: Some(thread),
        },
        addr,
    ))
}

fn bind(config: &ServerConfig) -> io::Result<TcpListener> {
    let listener = TcpListener::bind((config.host.as_str(), config.port))?;
    listener.set_nonblocking(true)?;
    Ok(listener)
}

/// A connection's read side, owned by the event loop. The matching write
/// half lives in the session registry.
struct Conn {
    id: ConnId,
    stream: TcpStream,
    frames: FrameBuffer,
}

/// Main event loop. Runs until a terminal session event, the idle timeout,
/// or `keep_running` going false.
fn run_session(
    listener: TcpListener,
    config: ServerConfig,
    keep_running: Arc<AtomicBool>,
) -> ShutdownReason {
    let mut session = GameSession::new();
    let mut conns: Vec<Conn> = Vec::new();
    let mut next_id: u32 = 0;
    let mut last_activity = Instant::now();

    let reason = 'main: loop {
        if !keep_running.load(Ordering::SeqCst) {
            break ShutdownReason::Stopped;
        }
        // Idle check first, so it cannot be starved by traffic handling.
        if last_activity.elapsed() >= config.idle_timeout {
            info!("no activity for {:?}, shutting down", config.idle_timeout);
            break ShutdownReason::IdleTimeout;
        }

        let mut idle_pass = true;

        // Accept any pending connections.
        loop {
            match listener.accept() {
                Ok((stream, addr)) => {
                    idle_pass = false;
                    last_activity = Instant::now();
                    if let Err(e) = stream.set_nonblocking(true) {
                        warn!("failed to set {addr} non-blocking: {e}");
                        continue;
                    }
                    let write_half = match stream.try_clone() {
                        Ok(clone) => clone,
                        Err(e) => {
                            warn!("failed to clone stream for {addr}: {e}");
                            continue;
                        }
                    };
                    let id = ConnId(next_id);
                    next_id += 1;
                    if session.register(id, write_half) {
                        info!("accepted connection from {addr} as {id:?}");
                        conns.push(Conn {
                            id,
                            stream,
                            frames: FrameBuffer::new(),
                        });
                    } else {
                        info!("rejected connection from {addr}: table is full");
                        // `stream` drops here, closing the socket.
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("accept error: {e}");
                    break;
                }
            }
        }

        // Read every socket that has bytes ready and dispatch complete
        // messages. Disconnects are collected and reaped below.
        let mut dead: Vec<ConnId> = Vec::new();
        for conn in &mut conns {
            let mut chunk = [0u8; RECV_CHUNK];
            loop {
                match conn.stream.read(&mut chunk) {
                    Ok(0) => {
                        debug!("{:?} closed the connection", conn.id);
                        dead.push(conn.id);
                        break;
                    }
                    Ok(n) => {
                        idle_pass = false;
                        conn.frames.push(&chunk[..n]);
                    }
                    Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                    Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                    Err(e) => {
                        debug!("read error on {:?}: {e}", conn.id);
                        dead.push(conn.id);
                        break;
                    }
                }
            }

            while let Some(frame) = conn.frames.next_frame() {
                match serde_json::from_slice::<ClientMessage>(&frame) {
                    Ok(msg) => {
                        last_activity = Instant::now();
                        if let Some(end) = session.handle_message(conn.id, msg) {
                            break 'main ShutdownReason::Session(end);
                        }
                    }
                    Err(e) => {
                        debug!("malformed message from {:?}: {e}", conn.id);
                        session.send_error(conn.id, "Malformed message.");
                    }
                }
            }
        }

        // Write failures take the same cleanup path as read failures.
        dead.extend(session.take_dead());
        for id in dead {
            conns.retain(|c| c.id != id);
            if let Some(end) = session.remove(id) {
                break 'main ShutdownReason::Session(end);
            }
        }

        if idle_pass {
            thread::sleep(POLL_INTERVAL);
        }
    };

    info!("session over: {reason}");
    // Dropping the connections and the session closes every socket; the
    // listener is released when it goes out of scope.
    drop(conns);
    reason
}
