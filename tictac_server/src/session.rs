// Session state for the game server.
//
// `GameSession` is the central data structure that `server.rs` drives. It
// tracks connected players, seat assignment, the board, whose turn it is,
// and pending rematch votes. All mutation happens through methods called
// from the server's single-threaded event loop — no internal locking.
//
// Key responsibilities:
// - Registry: map each live connection to its (lazily assigned) display
//   name, seat, and rematch vote. Entries are removed exactly when the
//   connection goes away; removing an unknown id is a no-op.
// - Arbitration: `handle_message` decides, for every inbound message,
//   whether it is legal given the current phase and the sender's seat,
//   mutates the board/registry, and pushes the resulting messages out.
//   Terminal events (quit, declined or abandoned rematch vote) are
//   reported to the caller as a `SessionEnd`; the event loop performs the
//   actual shutdown.
// - Sending: `GameSession` holds cloned `TcpStream` write halves wrapped
//   in `BufWriter`. `send_to`/`broadcast` serialize a `ServerMessage` to a
//   JSON line and write it out. A write failure marks the connection dead
//   (`take_dead`) so the event loop can run the same cleanup path it uses
//   for read failures — it never aborts a broadcast to the other peer.

use std::collections::BTreeMap;
use std::io::{self, BufWriter};
use std::net::TcpStream;

use log::{debug, info, warn};

use tictac_protocol::framing::write_message;
use tictac_protocol::message::{ClientMessage, ServerMessage};
use tictac_protocol::types::{ConnId, RestartChoice, Seat};

use crate::board::{Board, Outcome};

/// Coarse-grained state of the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Fewer than two identified connections.
    AwaitingPlayers,
    /// Both seats filled, game running.
    InProgress,
    /// Winner or draw decided, rematch votes pending.
    Concluded,
    /// A terminal event fired; the event loop is winding down.
    ShuttingDown,
}

/// Why the session ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEnd {
    /// A player sent `quit`.
    Quit { name: String },
    /// A rematch vote came back `n`.
    Declined,
    /// A player disconnected while a rematch vote was pending.
    Abandoned,
}

/// Which board-bearing message a broadcast should use.
#[derive(Clone, Copy)]
enum BoardKind {
    Start,
    Turn,
}

struct Player {
    name: Option<String>,
    seat: Option<Seat>,
    restart: Option<RestartChoice>,
    writer: BufWriter<TcpStream>,
}

/// Session state for one two-player game.
pub struct GameSession {
    players: BTreeMap<ConnId, Player>,
    board: Board,
    phase: Phase,
    turn: Seat,
    /// Connections whose writes failed; drained by the event loop.
    dead: Vec<ConnId>,
}

impl GameSession {
    pub fn new() -> Self {
        Self {
            players: BTreeMap::new(),
            board: Board::new(),
            phase: Phase::AwaitingPlayers,
            turn: Seat::X,
            dead: Vec::new(),
        }
    }

    /// Register a freshly accepted connection and ask it to identify
    /// itself. Returns `false` when both player slots are taken: the new
    /// socket gets a "table full" error and is not registered — the caller
    /// closes it.
    pub fn register(&mut self, id: ConnId, stream: TcpStream) -> bool {
        if self.players.len() >= 2 {
            let mut writer = BufWriter::new(stream);
            let reject = ServerMessage::Error {
                message: "The table is full.".into(),
            };
            if let Err(e) = send_message(&mut writer, &reject) {
                debug!("failed to send table-full rejection: {e}");
            }
            return false;
        }

        self.players.insert(
            id,
            Player {
                name: None,
                seat: None,
                restart: None,
                writer: BufWriter::new(stream),
            },
        );
        self.send_to(
            id,
            &ServerMessage::UsernameRequest {
                message: "Please enter your username.".into(),
            },
        );
        true
    }

    /// Arbitrate one inbound message. Returns `Some` when the message ends
    /// the whole session.
    pub fn handle_message(&mut self, id: ConnId, msg: ClientMessage) -> Option<SessionEnd> {
        debug!("message from {id:?}: {msg:?}");
        match msg {
            ClientMessage::UsernameResponse { username } => self.handle_username(id, username),
            ClientMessage::Move { position } => self.handle_move(id, position),
            ClientMessage::RestartDecision { decision } => self.handle_restart(id, decision),
            ClientMessage::Quit => self.handle_quit(id),
        }
    }

    /// Unicast an `error` line; used both internally and by the event loop
    /// for frames that failed to parse.
    pub fn send_error(&mut self, id: ConnId, text: &str) {
        self.send_to(
            id,
            &ServerMessage::Error {
                message: text.into(),
            },
        );
    }

    /// Unregister a connection that went away. Idempotent: removing an
    /// unknown id is a no-op. During a game the remaining peer is told the
    /// opponent left; during a rematch vote the session ends, since the
    /// missing vote can never arrive.
    pub fn remove(&mut self, id: ConnId) -> Option<SessionEnd> {
        let player = self.players.remove(&id)?;
        let name = player
            .name
            .unwrap_or_else(|| "Your opponent".into());
        info!("connection {id:?} ({name}) removed");

        match self.phase {
            Phase::InProgress if player.seat.is_some() => {
                self.broadcast(&ServerMessage::DisconnectNotice {
                    message: format!("{name} left the game."),
                });
                None
            }
            Phase::Concluded => {
                self.broadcast(&ServerMessage::End {
                    message: format!("{name} left before the rematch vote. Goodbye!"),
                    board: None,
                });
                self.phase = Phase::ShuttingDown;
                Some(SessionEnd::Abandoned)
            }
            _ => None,
        }
    }

    /// Drain the ids whose writes failed since the last call.
    pub fn take_dead(&mut self) -> Vec<ConnId> {
        std::mem::take(&mut self.dead)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// The seat currently authorized to move.
    pub fn turn(&self) -> Seat {
        self.turn
    }

    // --- message handlers ---

    fn handle_username(&mut self, id: ConnId, username: String) -> Option<SessionEnd> {
        if !self.players.contains_key(&id) {
            return None;
        }
        if self.phase == Phase::Concluded {
            self.send_error(id, "The game has already ended.");
            return None;
        }
        if self.players[&id].seat.is_some() {
            self.send_error(id, "You already have a username.");
            return None;
        }

        // Lowest free seat, so a pre-game departure of the X holder can't
        // leave a game with two O seats.
        let seat = if self.players.values().any(|p| p.seat == Some(Seat::X)) {
            Seat::O
        } else {
            Seat::X
        };
        if let Some(player) = self.players.get_mut(&id) {
            player.name = Some(username.clone());
            player.seat = Some(seat);
        }
        info!("{username} takes seat {seat}");
        self.send_to(
            id,
            &ServerMessage::Response {
                message: format!("Welcome, {username}! You are playing as {seat}."),
            },
        );

        let seats_filled = self.players.values().filter(|p| p.seat.is_some()).count() == 2;
        if seats_filled {
            if self.phase == Phase::AwaitingPlayers {
                self.phase = Phase::InProgress;
            }
            let base = format!(
                "Game on: {} (X) vs {} (O).",
                self.name_of(Seat::X),
                self.name_of(Seat::O)
            );
            self.broadcast_board(BoardKind::Start, &base);
        }
        None
    }

    fn handle_move(&mut self, id: ConnId, position: u8) -> Option<SessionEnd> {
        match self.phase {
            Phase::AwaitingPlayers => {
                self.send_error(id, "Waiting for an opponent to join.");
                return None;
            }
            Phase::Concluded => {
                self.send_error(id, "The game has already ended.");
                return None;
            }
            Phase::ShuttingDown => return None,
            Phase::InProgress => {}
        }

        let seat = match self.players.get(&id).and_then(|p| p.seat) {
            Some(seat) => seat,
            None => {
                self.send_error(id, "Set a username first.");
                return None;
            }
        };
        // The opponent may have dropped mid-game; play resumes once a new
        // connection takes the free seat.
        if self.players.values().filter(|p| p.seat.is_some()).count() < 2 {
            self.send_error(id, "Waiting for an opponent to join.");
            return None;
        }
        if seat != self.turn {
            self.send_error(id, "Not your turn.");
            return None;
        }
        if let Err(e) = self.board.place(position, seat) {
            self.send_error(id, &e.to_string());
            return None;
        }

        let mover = self.name_of(seat);
        match self.board.outcome() {
            Some(Outcome::Win(winner)) => {
                let text = format!("{} wins!", self.name_of(winner));
                self.conclude(&text);
            }
            Some(Outcome::Draw) => {
                self.conclude("It's a draw.");
            }
            None => {
                self.turn = seat.other();
                let base = format!("{mover} took cell {position}.");
                self.broadcast_board(BoardKind::Turn, &base);
            }
        }
        None
    }

    /// Enter `Concluded`: announce the outcome with the final board, then
    /// open the rematch vote.
    fn conclude(&mut self, text: &str) {
        info!("game over: {text}");
        self.phase = Phase::Concluded;
        self.clear_votes();
        let board = self.board.cells();
        self.broadcast(&ServerMessage::End {
            message: text.into(),
            board: Some(board),
        });
        self.broadcast(&ServerMessage::PromptRestart {
            message: "Play again? (y/n)".into(),
        });
    }

    fn handle_restart(&mut self, id: ConnId, decision: RestartChoice) -> Option<SessionEnd> {
        if self.phase != Phase::Concluded {
            self.send_error(id, "No rematch vote is open.");
            return None;
        }
        if let Some(player) = self.players.get_mut(&id) {
            player.restart = Some(decision);
        }

        let votes: Vec<RestartChoice> = self
            .players
            .values()
            .filter(|p| p.seat.is_some())
            .filter_map(|p| p.restart)
            .collect();
        if votes.len() < 2 {
            return None;
        }

        if votes.contains(&RestartChoice::No) {
            self.broadcast(&ServerMessage::End {
                message: "No rematch. Thanks for playing!".into(),
                board: None,
            });
            self.phase = Phase::ShuttingDown;
            return Some(SessionEnd::Declined);
        }

        // Both said yes: fresh board, X to move.
        info!("rematch accepted");
        self.board.reset();
        self.turn = Seat::X;
        self.clear_votes();
        self.phase = Phase::InProgress;
        let base = format!(
            "Rematch! {} (X) vs {} (O).",
            self.name_of(Seat::X),
            self.name_of(Seat::O)
        );
        self.broadcast_board(BoardKind::Start, &base);
        None
    }

    fn handle_quit(&mut self, id: ConnId) -> Option<SessionEnd> {
        let name = self
            .players
            .get(&id)
            .and_then(|p| p.name.clone())
            .unwrap_or_else(|| "A player".into());
        info!("{name} quit; ending the session");
        self.broadcast(&ServerMessage::End {
            message: format!("{name} quit the game."),
            board: None,
        });
        self.phase = Phase::ShuttingDown;
        Some(SessionEnd::Quit { name })
    }

    // --- sending ---

    /// Send a message to one connection. A failed write marks the
    /// connection dead for the event loop to reap.
    fn send_to(&mut self, id: ConnId, msg: &ServerMessage) {
        let Some(player) = self.players.get_mut(&id) else {
            return;
        };
        if let Err(e) = send_message(&mut player.writer, msg) {
            warn!("write to {id:?} failed: {e}");
            if !self.dead.contains(&id) {
                self.dead.push(id);
            }
        }
    }

    /// Send the same message to every registered connection.
    fn broadcast(&mut self, msg: &ServerMessage) {
        let ids: Vec<ConnId> = self.players.keys().copied().collect();
        for id in ids {
            self.send_to(id, msg);
        }
    }

    /// Broadcast a board-bearing message, appending a "Your move." suffix
    /// for whichever connection holds the turn.
    fn broadcast_board(&mut self, kind: BoardKind, base: &str) {
        let board = self.board.cells();
        let turn = self.turn;
        let ids: Vec<ConnId> = self.players.keys().copied().collect();
        for id in ids {
            let your_move = self
                .players
                .get(&id)
                .is_some_and(|p| p.seat == Some(turn));
            let mut message = base.to_string();
            if your_move {
                message.push_str(" Your move.");
            }
            let msg = match kind {
                BoardKind::Start => ServerMessage::Start { message, board },
                BoardKind::Turn => ServerMessage::Turn { message, board },
            };
            self.send_to(id, &msg);
        }
    }

    fn clear_votes(&mut self) {
        for player in self.players.values_mut() {
            player.restart = None;
        }
    }

    /// Display name of the player holding `seat`, falling back to the seat
    /// symbol (a seated player always has a name).
    fn name_of(&self, seat: Seat) -> String {
        self.players
            .values()
            .find(|p| p.seat == Some(seat))
            .and_then(|p| p.name.clone())
            .unwrap_or_else(|| seat.to_string())
    }
}

impl Default for GameSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Serialize a `ServerMessage` to JSON and write it as one line.
fn send_message(writer: &mut BufWriter<TcpStream>, msg: &ServerMessage) -> io::Result<()> {
    let json = serde_json::to_vec(msg)?;
    write_message(writer, &json)
}

#[cfg(test)]
mod tests {
    use std::io::BufReader;
    use std::net::TcpListener;
    use std::time::Duration;

    use tictac_protocol::framing::read_message;

    use super::*;

    /// Create a TCP pair: (client_stream, server_stream) on localhost.
    fn tcp_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    /// Read a ServerMessage from a TCP stream.
    fn recv(reader: &mut BufReader<TcpStream>) -> ServerMessage {
        let bytes = read_message(reader).unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    /// Register two connections and complete both identity exchanges.
    /// Returns the session and each client's read side, with all
    /// handshake traffic (username_request, response, start) drained.
    fn seated_session() -> (GameSession, BufReader<TcpStream>, BufReader<TcpStream>) {
        let (client_a, server_a) = tcp_pair();
        let (client_b, server_b) = tcp_pair();
        let mut session = GameSession::new();

        assert!(session.register(ConnId(0), server_a));
        assert!(session.register(ConnId(1), server_b));
        session.handle_message(
            ConnId(0),
            ClientMessage::UsernameResponse {
                username: "Alice".into(),
            },
        );
        session.handle_message(
            ConnId(1),
            ClientMessage::UsernameResponse {
                username: "Bob".into(),
            },
        );

        let mut reader_a = BufReader::new(client_a);
        let mut reader_b = BufReader::new(client_b);
        // Alice: username_request, response, start. Bob: username_request,
        // response, start.
        for reader in [&mut reader_a, &mut reader_b] {
            let _ = recv(reader);
            let _ = recv(reader);
            let _ = recv(reader);
        }
        (session, reader_a, reader_b)
    }

    #[test]
    fn register_sends_username_request() {
        let (client, server) = tcp_pair();
        let mut session = GameSession::new();
        assert!(session.register(ConnId(0), server));
        assert_eq!(session.player_count(), 1);

        let mut reader = BufReader::new(client);
        match recv(&mut reader) {
            ServerMessage::UsernameRequest { .. } => {}
            other => panic!("expected UsernameRequest, got {other:?}"),
        }
    }

    #[test]
    fn third_connection_rejected_table_full() {
        let (_client_a, server_a) = tcp_pair();
        let (_client_b, server_b) = tcp_pair();
        let (client_c, server_c) = tcp_pair();
        let mut session = GameSession::new();

        assert!(session.register(ConnId(0), server_a));
        assert!(session.register(ConnId(1), server_b));
        assert!(!session.register(ConnId(2), server_c));
        assert_eq!(session.player_count(), 2);

        let mut reader = BufReader::new(client_c);
        match recv(&mut reader) {
            ServerMessage::Error { message } => assert_eq!(message, "The table is full."),
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[test]
    fn first_username_gets_x_second_gets_o() {
        let (client_a, server_a) = tcp_pair();
        let (client_b, server_b) = tcp_pair();
        let mut session = GameSession::new();
        session.register(ConnId(0), server_a);
        session.register(ConnId(1), server_b);
        assert_eq!(session.phase(), Phase::AwaitingPlayers);

        session.handle_message(
            ConnId(0),
            ClientMessage::UsernameResponse {
                username: "Alice".into(),
            },
        );
        assert_eq!(session.phase(), Phase::AwaitingPlayers);

        session.handle_message(
            ConnId(1),
            ClientMessage::UsernameResponse {
                username: "Bob".into(),
            },
        );
        assert_eq!(session.phase(), Phase::InProgress);
        assert_eq!(session.turn(), Seat::X);

        let mut reader_a = BufReader::new(client_a);
        let _ = recv(&mut reader_a); // username_request
        match recv(&mut reader_a) {
            ServerMessage::Response { message } => {
                assert!(message.contains("Alice"), "got: {message}");
                assert!(message.contains('X'), "got: {message}");
            }
            other => panic!("expected Response, got {other:?}"),
        }
        // Start goes to both; Alice (X) gets the turn prompt.
        match recv(&mut reader_a) {
            ServerMessage::Start { message, board } => {
                assert!(message.ends_with("Your move."), "got: {message}");
                assert_eq!(board, [None; 9]);
            }
            other => panic!("expected Start, got {other:?}"),
        }

        let mut reader_b = BufReader::new(client_b);
        let _ = recv(&mut reader_b); // username_request
        match recv(&mut reader_b) {
            ServerMessage::Response { message } => {
                assert!(message.contains('O'), "got: {message}");
            }
            other => panic!("expected Response, got {other:?}"),
        }
        match recv(&mut reader_b) {
            ServerMessage::Start { message, .. } => {
                assert!(!message.ends_with("Your move."), "got: {message}");
            }
            other => panic!("expected Start, got {other:?}"),
        }
    }

    #[test]
    fn seat_x_reopens_when_its_holder_leaves_before_the_game_starts() {
        let (_client_a, server_a) = tcp_pair();
        let (client_b, server_b) = tcp_pair();
        let mut session = GameSession::new();
        session.register(ConnId(0), server_a);
        session.handle_message(
            ConnId(0),
            ClientMessage::UsernameResponse {
                username: "Alice".into(),
            },
        );
        assert_eq!(session.remove(ConnId(0)), None);

        // The next player to identify takes the freed X seat.
        session.register(ConnId(1), server_b);
        session.handle_message(
            ConnId(1),
            ClientMessage::UsernameResponse {
                username: "Bob".into(),
            },
        );
        let mut reader = BufReader::new(client_b);
        let _ = recv(&mut reader); // username_request
        match recv(&mut reader) {
            ServerMessage::Response { message } => {
                assert!(message.contains('X'), "got: {message}");
            }
            other => panic!("expected Response, got {other:?}"),
        }
    }

    #[test]
    fn second_username_on_same_connection_rejected() {
        let (client, server) = tcp_pair();
        let mut session = GameSession::new();
        session.register(ConnId(0), server);
        session.handle_message(
            ConnId(0),
            ClientMessage::UsernameResponse {
                username: "Alice".into(),
            },
        );
        session.handle_message(
            ConnId(0),
            ClientMessage::UsernameResponse {
                username: "Mallory".into(),
            },
        );

        let mut reader = BufReader::new(client);
        let _ = recv(&mut reader); // username_request
        let _ = recv(&mut reader); // response
        match recv(&mut reader) {
            ServerMessage::Error { .. } => {}
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[test]
    fn move_before_opponent_joins_rejected() {
        let (client, server) = tcp_pair();
        let mut session = GameSession::new();
        session.register(ConnId(0), server);
        session.handle_message(
            ConnId(0),
            ClientMessage::UsernameResponse {
                username: "Alice".into(),
            },
        );
        session.handle_message(ConnId(0), ClientMessage::Move { position: 1 });

        let mut reader = BufReader::new(client);
        let _ = recv(&mut reader);
        let _ = recv(&mut reader);
        match recv(&mut reader) {
            ServerMessage::Error { message } => {
                assert!(message.contains("opponent"), "got: {message}");
            }
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[test]
    fn out_of_turn_move_rejected_without_board_change() {
        let (mut session, mut reader_a, mut reader_b) = seated_session();

        // Bob (O) tries to move first.
        session.handle_message(ConnId(1), ClientMessage::Move { position: 1 });
        match recv(&mut reader_b) {
            ServerMessage::Error { message } => assert_eq!(message, "Not your turn."),
            other => panic!("expected Error, got {other:?}"),
        }
        assert_eq!(session.turn(), Seat::X);

        // The cell Bob aimed at is still free for Alice.
        session.handle_message(ConnId(0), ClientMessage::Move { position: 1 });
        match recv(&mut reader_a) {
            ServerMessage::Turn { board, .. } => assert_eq!(board[0], Some(Seat::X)),
            other => panic!("expected Turn, got {other:?}"),
        }
    }

    #[test]
    fn out_of_range_position_rejected_and_turn_kept() {
        let (mut session, mut reader_a, _reader_b) = seated_session();

        session.handle_message(ConnId(0), ClientMessage::Move { position: 12 });
        match recv(&mut reader_a) {
            ServerMessage::Error { message } => {
                assert!(message.contains("Invalid position"), "got: {message}");
            }
            other => panic!("expected Error, got {other:?}"),
        }
        assert_eq!(session.turn(), Seat::X);

        // The rejected move did not consume Alice's turn.
        session.handle_message(ConnId(0), ClientMessage::Move { position: 5 });
        match recv(&mut reader_a) {
            ServerMessage::Turn { board, .. } => assert_eq!(board[4], Some(Seat::X)),
            other => panic!("expected Turn, got {other:?}"),
        }
        assert_eq!(session.turn(), Seat::O);
    }

    #[test]
    fn occupied_cell_error_goes_to_offender() {
        let (mut session, _reader_a, mut reader_b) = seated_session();

        session.handle_message(ConnId(0), ClientMessage::Move { position: 5 });
        let _ = recv(&mut reader_b); // turn broadcast

        session.handle_message(ConnId(1), ClientMessage::Move { position: 5 });
        match recv(&mut reader_b) {
            ServerMessage::Error { message } => {
                assert!(message.contains("already taken"), "got: {message}");
            }
            other => panic!("expected Error, got {other:?}"),
        }
        assert_eq!(session.turn(), Seat::O);
    }

    #[test]
    fn turn_broadcast_prompts_next_player() {
        let (mut session, mut reader_a, mut reader_b) = seated_session();

        session.handle_message(ConnId(0), ClientMessage::Move { position: 1 });
        match recv(&mut reader_a) {
            ServerMessage::Turn { message, .. } => {
                assert!(!message.ends_with("Your move."), "got: {message}");
            }
            other => panic!("expected Turn, got {other:?}"),
        }
        match recv(&mut reader_b) {
            ServerMessage::Turn { message, board } => {
                assert!(message.ends_with("Your move."), "got: {message}");
                assert_eq!(board[0], Some(Seat::X));
            }
            other => panic!("expected Turn, got {other:?}"),
        }
    }

    #[test]
    fn diagonal_win_concludes_and_prompts_restart() {
        let (mut session, mut reader_a, mut reader_b) = seated_session();

        // X: 1, 5, 9 — O: 2, 8.
        for (id, position) in [(0, 1), (1, 2), (0, 5), (1, 8), (0, 9)] {
            session.handle_message(ConnId(id), ClientMessage::Move { position });
        }
        assert_eq!(session.phase(), Phase::Concluded);

        // Drain the four turn broadcasts on each side.
        for reader in [&mut reader_a, &mut reader_b] {
            for _ in 0..4 {
                let _ = recv(reader);
            }
        }
        for reader in [&mut reader_a, &mut reader_b] {
            match recv(reader) {
                ServerMessage::End { message, board } => {
                    assert_eq!(message, "Alice wins!");
                    let board = board.expect("final board");
                    assert_eq!(board[0], Some(Seat::X));
                    assert_eq!(board[4], Some(Seat::X));
                    assert_eq!(board[8], Some(Seat::X));
                }
                other => panic!("expected End, got {other:?}"),
            }
            match recv(reader) {
                ServerMessage::PromptRestart { .. } => {}
                other => panic!("expected PromptRestart, got {other:?}"),
            }
        }
    }

    #[test]
    fn full_board_without_winner_is_draw() {
        let (mut session, mut reader_a, _reader_b) = seated_session();

        for (id, position) in [
            (0, 1),
            (1, 2),
            (0, 3),
            (1, 5),
            (0, 4),
            (1, 7),
            (0, 8),
            (1, 6),
            (0, 9),
        ] {
            session.handle_message(ConnId(id), ClientMessage::Move { position });
        }
        assert_eq!(session.phase(), Phase::Concluded);

        for _ in 0..8 {
            let _ = recv(&mut reader_a);
        }
        match recv(&mut reader_a) {
            ServerMessage::End { message, .. } => assert_eq!(message, "It's a draw."),
            other => panic!("expected End, got {other:?}"),
        }
    }

    #[test]
    fn move_after_conclusion_rejected() {
        let (mut session, _reader_a, mut reader_b) = seated_session();
        for (id, position) in [(0, 1), (1, 4), (0, 2), (1, 5), (0, 3)] {
            session.handle_message(ConnId(id), ClientMessage::Move { position });
        }
        assert_eq!(session.phase(), Phase::Concluded);

        session.handle_message(ConnId(1), ClientMessage::Move { position: 6 });
        // Bob: 4 turn broadcasts, end, prompt_restart, then the error.
        for _ in 0..6 {
            let _ = recv(&mut reader_b);
        }
        match recv(&mut reader_b) {
            ServerMessage::Error { message } => {
                assert!(message.contains("ended"), "got: {message}");
            }
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[test]
    fn rematch_requires_both_votes() {
        let (mut session, _reader_a, _reader_b) = seated_session();
        for (id, position) in [(0, 1), (1, 4), (0, 2), (1, 5), (0, 3)] {
            session.handle_message(ConnId(id), ClientMessage::Move { position });
        }

        let end = session.handle_message(
            ConnId(0),
            ClientMessage::RestartDecision {
                decision: RestartChoice::Yes,
            },
        );
        assert_eq!(end, None);
        assert_eq!(session.phase(), Phase::Concluded);
    }

    #[test]
    fn rematch_both_yes_resets_board_and_turn() {
        let (mut session, mut reader_a, _reader_b) = seated_session();
        // O wins so the turn pointer does not sit on X by accident.
        for (id, position) in [(0, 1), (1, 4), (0, 2), (1, 5), (0, 7), (1, 6)] {
            session.handle_message(ConnId(id), ClientMessage::Move { position });
        }
        assert_eq!(session.phase(), Phase::Concluded);

        session.handle_message(
            ConnId(0),
            ClientMessage::RestartDecision {
                decision: RestartChoice::Yes,
            },
        );
        let end = session.handle_message(
            ConnId(1),
            ClientMessage::RestartDecision {
                decision: RestartChoice::Yes,
            },
        );
        assert_eq!(end, None);
        assert_eq!(session.phase(), Phase::InProgress);
        assert_eq!(session.turn(), Seat::X);

        // Alice: 5 turn broadcasts, end, prompt_restart, then a fresh start.
        for _ in 0..7 {
            let _ = recv(&mut reader_a);
        }
        match recv(&mut reader_a) {
            ServerMessage::Start { message, board } => {
                assert_eq!(board, [None; 9]);
                assert!(message.ends_with("Your move."), "got: {message}");
            }
            other => panic!("expected Start, got {other:?}"),
        }
    }

    #[test]
    fn rematch_any_no_ends_session() {
        let (mut session, _reader_a, mut reader_b) = seated_session();
        for (id, position) in [(0, 1), (1, 4), (0, 2), (1, 5), (0, 3)] {
            session.handle_message(ConnId(id), ClientMessage::Move { position });
        }

        session.handle_message(
            ConnId(0),
            ClientMessage::RestartDecision {
                decision: RestartChoice::No,
            },
        );
        let end = session.handle_message(
            ConnId(1),
            ClientMessage::RestartDecision {
                decision: RestartChoice::Yes,
            },
        );
        assert_eq!(end, Some(SessionEnd::Declined));
        assert_eq!(session.phase(), Phase::ShuttingDown);

        // Bob: 4 turn broadcasts, end, prompt_restart, final end.
        for _ in 0..6 {
            let _ = recv(&mut reader_b);
        }
        match recv(&mut reader_b) {
            ServerMessage::End { message, board } => {
                assert!(message.contains("No rematch"), "got: {message}");
                assert_eq!(board, None);
            }
            other => panic!("expected End, got {other:?}"),
        }
    }

    #[test]
    fn restart_vote_outside_concluded_rejected() {
        let (mut session, mut reader_a, _reader_b) = seated_session();
        session.handle_message(
            ConnId(0),
            ClientMessage::RestartDecision {
                decision: RestartChoice::Yes,
            },
        );
        match recv(&mut reader_a) {
            ServerMessage::Error { message } => {
                assert!(message.contains("vote"), "got: {message}");
            }
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[test]
    fn quit_ends_session_for_both() {
        let (mut session, mut reader_a, _reader_b) = seated_session();
        let end = session.handle_message(ConnId(1), ClientMessage::Quit);
        assert_eq!(
            end,
            Some(SessionEnd::Quit {
                name: "Bob".into()
            })
        );

        match recv(&mut reader_a) {
            ServerMessage::End { message, .. } => {
                assert_eq!(message, "Bob quit the game.");
            }
            other => panic!("expected End, got {other:?}"),
        }
    }

    #[test]
    fn disconnect_during_game_notifies_peer_and_keeps_running() {
        let (mut session, mut reader_a, _reader_b) = seated_session();
        let end = session.remove(ConnId(1));
        assert_eq!(end, None);
        assert_eq!(session.player_count(), 1);

        match recv(&mut reader_a) {
            ServerMessage::DisconnectNotice { message } => {
                assert!(message.contains("Bob"), "got: {message}");
            }
            other => panic!("expected DisconnectNotice, got {other:?}"),
        }
    }

    #[test]
    fn disconnect_during_vote_ends_session() {
        let (mut session, mut reader_a, _reader_b) = seated_session();
        for (id, position) in [(0, 1), (1, 4), (0, 2), (1, 5), (0, 3)] {
            session.handle_message(ConnId(id), ClientMessage::Move { position });
        }
        assert_eq!(session.phase(), Phase::Concluded);

        let end = session.remove(ConnId(1));
        assert_eq!(end, Some(SessionEnd::Abandoned));

        // Alice: 4 turn broadcasts, end, prompt_restart, final end.
        for _ in 0..6 {
            let _ = recv(&mut reader_a);
        }
        match recv(&mut reader_a) {
            ServerMessage::End { message, .. } => {
                assert!(message.contains("left"), "got: {message}");
            }
            other => panic!("expected End, got {other:?}"),
        }
    }

    #[test]
    fn remove_is_idempotent() {
        let (mut session, _reader_a, _reader_b) = seated_session();
        assert_eq!(session.remove(ConnId(1)), None);
        assert_eq!(session.remove(ConnId(1)), None);
        assert_eq!(session.remove(ConnId(99)), None);
        assert_eq!(session.player_count(), 1);
    }

    #[test]
    fn write_failure_marks_connection_dead() {
        let (client, server) = tcp_pair();
        let mut session = GameSession::new();
        session.register(ConnId(0), server);

        // Close the client end; writes fail once the kernel notices the
        // reset, which can take a couple of attempts.
        drop(client);
        let mut dead = Vec::new();
        for _ in 0..20 {
            session.send_error(ConnId(0), "are you there?");
            dead = session.take_dead();
            if !dead.is_empty() {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(dead, vec![ConnId(0)]);
        assert!(session.take_dead().is_empty());
    }
}
