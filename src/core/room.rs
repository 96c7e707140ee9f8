//! Match rooms: the per-pair game engine
//!
//! A room owns one board, the turn pointer and the match status behind a
//! single lock. Both players' read loops submit commands through the
//! methods here; every broadcast for one command is sent while that lock is
//! held, so each player sees events in the order they were produced.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use uuid::Uuid;

use crate::config::RematchPolicy;
use crate::constants::WIN_LENGTH;
use crate::core::board::{Board, Cell, Mark};
use crate::core::connection::{Connection, SessionId};
use crate::core::message::{ClientCommand, ServerEvent};
use crate::core::session::PlayerSession;
use crate::error::{Result, RustyCaroError};

/// How a finished match ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Outcome {
    Win(Mark),
    Draw,
}

/// Lifecycle of a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RoomStatus {
    InProgress,
    Finished(Outcome),
    /// Terminal; one of the players left
    Closed,
}

/// Why a player is leaving a room
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveReason {
    /// The player sent EXIT
    Exit,
    /// The player's connection closed or failed to read
    Disconnected,
    /// An event could not be delivered to the player
    SendFailed,
}

/// A player's place in a room
#[derive(Clone)]
pub struct Seat {
    pub room: Arc<Room>,
    pub mark: Mark,
}

/// Point-in-time view of a room, logged when the room closes
#[derive(Debug, Clone, Serialize)]
pub struct RoomSnapshot {
    pub id: String,
    pub player_x: String,
    pub player_o: String,
    pub size: usize,
    pub turn: Mark,
    pub status: RoomStatus,
    pub moves_played: usize,
    pub games_started: u32,
    pub created_at: DateTime<Utc>,
    pub board: String,
}

struct RoomState {
    board: Board,
    turn: Mark,
    status: RoomStatus,
    rematch_requests: [bool; 2],
    /// Outbound channels, dropped once the room closes
    seats: [Option<Connection>; 2],
    /// First seat that failed to receive an event during the current command
    failed_delivery: Option<Mark>,
    games_started: u32,
}

impl RoomState {
    fn send_to(&mut self, mark: Mark, event: &ServerEvent) {
        let delivered = match &self.seats[mark.index()] {
            Some(connection) => connection.send_event(event),
            None => false,
        };
        if !delivered && self.failed_delivery.is_none() {
            self.failed_delivery = Some(mark);
        }
    }

    /// Send to X first, then O
    fn broadcast(&mut self, event: &ServerEvent) {
        self.send_to(Mark::X, event);
        self.send_to(Mark::O, event);
    }
}

/// Live state machine for one matched pair of players
pub struct Room {
    /// Unique identifier for the room
    pub id: String,
    nicknames: [String; 2],
    session_ids: [SessionId; 2],
    rematch_policy: RematchPolicy,
    created_at: DateTime<Utc>,
    state: Mutex<RoomState>,
    departed: watch::Sender<Option<Mark>>,
}

impl Room {
    /// Seat `x_player` as X and `o_player` as O on a fresh board
    pub fn new(
        size: usize,
        x_player: &PlayerSession,
        o_player: &PlayerSession,
        rematch_policy: RematchPolicy,
    ) -> Arc<Self> {
        let (departed, _) = watch::channel(None);

        Arc::new(Self {
            id: Uuid::new_v4().to_string(),
            nicknames: [x_player.nickname.clone(), o_player.nickname.clone()],
            session_ids: [x_player.id, o_player.id],
            rematch_policy,
            created_at: Utc::now(),
            state: Mutex::new(RoomState {
                board: Board::new(size),
                turn: Mark::X,
                status: RoomStatus::InProgress,
                rematch_requests: [false; 2],
                seats: [
                    Some(x_player.connection.clone()),
                    Some(o_player.connection.clone()),
                ],
                failed_delivery: None,
                games_started: 1,
            }),
            departed,
        })
    }

    pub fn nickname(&self, mark: Mark) -> &str {
        &self.nicknames[mark.index()]
    }

    pub fn session_id(&self, mark: Mark) -> SessionId {
        self.session_ids[mark.index()]
    }

    pub fn rematch_policy(&self) -> RematchPolicy {
        self.rematch_policy
    }

    /// Tell both players their roles and open the first match
    pub async fn start(&self) {
        let mut state = self.state.lock().await;
        if state.status == RoomStatus::Closed {
            return;
        }

        info!(
            "Room {} started: {} (X) vs {} (O)",
            self.id,
            self.nickname(Mark::X),
            self.nickname(Mark::O)
        );

        for mark in [Mark::X, Mark::O] {
            state.send_to(mark, &ServerEvent::Role(mark));
        }
        for mark in [Mark::X, Mark::O] {
            let opponent = ServerEvent::Opponent(self.nickname(mark.other()).to_string());
            state.send_to(mark, &opponent);
        }
        self.announce_start(&mut state);

        self.settle_deliveries(&mut state);
    }

    /// Apply one decoded command from the player holding `mark`
    pub async fn handle_command(&self, mark: Mark, command: ClientCommand) -> Result<()> {
        match command {
            ClientCommand::Move { x, y } => self.play_move(mark, x, y).await.map(|_| ()),
            ClientCommand::Rematch => self.request_rematch(mark).await.map(|_| ()),
            ClientCommand::Exit => {
                self.leave(mark, LeaveReason::Exit).await;
                Ok(())
            }
            ClientCommand::Nick(_) => Err(RustyCaroError::MalformedCommand(
                "NICK is only accepted as the first line".to_string(),
            )),
        }
    }

    /// Place `mark` at (x, y) and return the resulting status
    pub async fn play_move(&self, mark: Mark, x: i64, y: i64) -> Result<RoomStatus> {
        let mut state = self.state.lock().await;

        match state.status {
            RoomStatus::Closed => return Err(RustyCaroError::RoomClosed),
            RoomStatus::Finished(_) => return Err(RustyCaroError::MatchFinished),
            RoomStatus::InProgress => {}
        }
        if state.turn != mark {
            return Err(RustyCaroError::NotYourTurn);
        }
        let (col, row) = state.board.checked_position(x, y)?;
        state.board.place(col, row, mark)?;

        debug!("Room {}: {} played ({}, {})", self.id, mark, col, row);
        state.broadcast(&ServerEvent::Board {
            x: col,
            y: row,
            mark,
        });

        if state.board.is_winning_move(col, row, WIN_LENGTH) {
            state.status = RoomStatus::Finished(Outcome::Win(mark));
            state.broadcast(&ServerEvent::Win(mark));
            info!("Room {}: {} wins as {}", self.id, self.nickname(mark), mark);
        } else if state.board.is_full() {
            state.status = RoomStatus::Finished(Outcome::Draw);
            state.broadcast(&ServerEvent::Draw);
            info!("Room {}: draw", self.id);
        } else {
            state.turn = mark.other();
            let turn = state.turn;
            state.broadcast(&ServerEvent::Turn(turn));
        }

        self.settle_deliveries(&mut state);
        Ok(state.status)
    }

    /// Ask for a new match once the current one has finished.
    ///
    /// Returns whether the match restarted; under mutual consent the first
    /// request only records the wish and notifies the opponent.
    pub async fn request_rematch(&self, mark: Mark) -> Result<bool> {
        let mut state = self.state.lock().await;

        match state.status {
            RoomStatus::Closed => return Err(RustyCaroError::RoomClosed),
            RoomStatus::InProgress => return Err(RustyCaroError::MatchNotFinished),
            RoomStatus::Finished(_) => {}
        }

        let requester = self.nickname(mark).to_string();
        let restarted = match self.rematch_policy {
            RematchPolicy::SingleSided => {
                state.send_to(
                    mark.other(),
                    &ServerEvent::info(format!("{} started a rematch", requester)),
                );
                self.restart(&mut state);
                true
            }
            RematchPolicy::MutualConsent => {
                if state.rematch_requests[mark.index()] {
                    state.send_to(
                        mark,
                        &ServerEvent::info("Waiting for opponent to accept the rematch"),
                    );
                    false
                } else if state.rematch_requests[mark.other().index()] {
                    state.send_to(
                        mark.other(),
                        &ServerEvent::info(format!("{} accepted the rematch", requester)),
                    );
                    self.restart(&mut state);
                    true
                } else {
                    state.rematch_requests[mark.index()] = true;
                    state.send_to(
                        mark.other(),
                        &ServerEvent::info(format!(
                            "{} wants a rematch, send REMATCH to accept",
                            requester
                        )),
                    );
                    state.send_to(
                        mark,
                        &ServerEvent::info("Waiting for opponent to accept the rematch"),
                    );
                    false
                }
            }
        };

        self.settle_deliveries(&mut state);
        Ok(restarted)
    }

    /// Remove a player from the room and close it for both sides.
    ///
    /// The remaining player is told with `OPPONENT_LEFT`. Leaving a closed
    /// room does nothing.
    pub async fn leave(&self, mark: Mark, reason: LeaveReason) {
        let mut state = self.state.lock().await;
        self.close(&mut state, mark, reason);
    }

    pub async fn status(&self) -> RoomStatus {
        self.state.lock().await.status
    }

    pub async fn turn(&self) -> Mark {
        self.state.lock().await.turn
    }

    pub async fn cell(&self, x: usize, y: usize) -> Option<Cell> {
        self.state.lock().await.board.get(x, y)
    }

    pub async fn filled_cells(&self) -> usize {
        self.state.lock().await.board.filled()
    }

    pub async fn snapshot(&self) -> RoomSnapshot {
        let state = self.state.lock().await;
        self.snapshot_locked(&state)
    }

    /// Subscribe to room closure; the value becomes the mark that left
    pub fn subscribe(&self) -> watch::Receiver<Option<Mark>> {
        self.departed.subscribe()
    }

    /// Mark of the player that closed the room, if it is closed
    pub fn departed(&self) -> Option<Mark> {
        *self.departed.borrow()
    }

    fn announce_start(&self, state: &mut RoomState) {
        let size = state.board.size();
        let turn = state.turn;
        state.broadcast(&ServerEvent::Start { size });
        state.broadcast(&ServerEvent::Turn(turn));
    }

    fn restart(&self, state: &mut RoomState) {
        state.board.clear();
        state.turn = Mark::X;
        state.status = RoomStatus::InProgress;
        state.rematch_requests = [false; 2];
        state.games_started += 1;
        info!("Room {}: rematch #{}", self.id, state.games_started - 1);
        self.announce_start(state);
    }

    // A failed send counts as that player leaving
    fn settle_deliveries(&self, state: &mut RoomState) {
        if let Some(failed) = state.failed_delivery.take() {
            warn!(
                "Room {}: lost connection to {} ({})",
                self.id,
                self.nickname(failed),
                failed
            );
            self.close(state, failed, LeaveReason::SendFailed);
        }
    }

    fn close(&self, state: &mut RoomState, leaver: Mark, reason: LeaveReason) {
        if state.status == RoomStatus::Closed {
            return;
        }
        state.status = RoomStatus::Closed;

        if reason == LeaveReason::Exit {
            state.send_to(leaver, &ServerEvent::info("Goodbye"));
        }
        state.send_to(leaver.other(), &ServerEvent::OpponentLeft);
        if state.failed_delivery.take() == Some(leaver.other()) {
            debug!("Room {}: both players are gone", self.id);
        }
        state.seats = [None, None];

        info!(
            "Room {} closed: {} left ({:?})",
            self.id,
            self.nickname(leaver),
            reason
        );
        match serde_json::to_string(&self.snapshot_locked(state)) {
            Ok(json) => debug!("Room {} final state: {}", self.id, json),
            Err(e) => warn!("Failed to serialize room {}: {}", self.id, e),
        }

        self.departed.send_replace(Some(leaver));
    }

    fn snapshot_locked(&self, state: &RoomState) -> RoomSnapshot {
        RoomSnapshot {
            id: self.id.clone(),
            player_x: self.nickname(Mark::X).to_string(),
            player_o: self.nickname(Mark::O).to_string(),
            size: state.board.size(),
            turn: state.turn,
            status: state.status,
            moves_played: state.board.filled(),
            games_started: state.games_started,
            created_at: self.created_at,
            board: state.board.to_string(),
        }
    }
}
