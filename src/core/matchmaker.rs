//! FIFO matchmaking
//!
//! The first player to arrive waits; the next arrival is paired with the
//! oldest waiting player. The dequeue-or-enqueue decision is made under one
//! mutex so concurrent arrivals can neither both wait nor both claim the
//! same opponent.

use log::{debug, error, info};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::oneshot;

use crate::config::{RematchPolicy, ServerConfig};
use crate::core::board::Mark;
use crate::core::connection::SessionId;
use crate::core::message::ServerEvent;
use crate::core::room::{LeaveReason, Room, Seat};
use crate::core::session::PlayerSession;
use crate::error::{Result, RustyCaroError};

struct WaitingEntry {
    session: PlayerSession,
    seat_tx: oneshot::Sender<Seat>,
}

/// Handed to a queued player; resolves to its seat once an opponent arrives
pub struct WaitTicket {
    pub session_id: SessionId,
    pub seat: oneshot::Receiver<Seat>,
}

/// Result of arriving at the matchmaker
pub enum Pairing {
    /// No opponent yet; the session is now in the queue
    Waiting(WaitTicket),
    /// Paired with the oldest waiting session, seated as O
    Paired(Seat),
}

pub struct Matchmaker {
    queue: Mutex<VecDeque<WaitingEntry>>,
    board_size: usize,
    rematch_policy: RematchPolicy,
    rooms_created: AtomicU64,
}

impl Matchmaker {
    pub fn new(board_size: usize, rematch_policy: RematchPolicy) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            board_size,
            rematch_policy,
            rooms_created: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(config.board_size, config.rematch_policy)
    }

    /// Pair `session` with the oldest waiting player, or queue it.
    ///
    /// A queued session is told it is waiting before it becomes visible to
    /// other arrivals.
    ///
    /// The new room is started before either player receives its seat, so
    /// both see `START` before anything else the room sends.
    pub async fn enqueue_or_pair(&self, session: PlayerSession) -> Result<Pairing> {
        let peer = {
            let mut queue = self.queue.lock()?;

            if queue.iter().any(|entry| entry.session.id == session.id) {
                return Err(RustyCaroError::SystemError(format!(
                    "Session {} is already waiting",
                    session.id
                )));
            }

            let mut peer = None;
            while let Some(entry) = queue.pop_front() {
                if entry.session.is_connected() && !entry.seat_tx.is_closed() {
                    peer = Some(entry);
                    break;
                }
                debug!("Skipping stale waiting session {}", entry.session.id);
            }

            match peer {
                Some(entry) => entry,
                None => {
                    let (seat_tx, seat) = oneshot::channel();
                    let session_id = session.id;
                    info!("'{}' is waiting for an opponent", session.nickname);
                    session.send(&ServerEvent::info("Waiting for an opponent..."));
                    queue.push_back(WaitingEntry { session, seat_tx });
                    return Ok(Pairing::Waiting(WaitTicket { session_id, seat }));
                }
            }
        };

        let room = Room::new(
            self.board_size,
            &peer.session,
            &session,
            self.rematch_policy,
        );
        let total = self.rooms_created.fetch_add(1, Ordering::Relaxed) + 1;
        info!(
            "Paired '{}' with '{}' in room {} ({} rooms so far)",
            peer.session.nickname, session.nickname, room.id, total
        );
        room.start().await;

        let x_seat = Seat {
            room: room.clone(),
            mark: Mark::X,
        };
        if peer.seat_tx.send(x_seat).is_err() {
            debug!("Waiting session {} went away during pairing", peer.session.id);
            room.leave(Mark::X, LeaveReason::Disconnected).await;
        }

        Ok(Pairing::Paired(Seat {
            room,
            mark: Mark::O,
        }))
    }

    /// Remove a waiting session from the queue.
    ///
    /// Returns false if it is no longer queued, e.g. because it was paired
    /// in the meantime and its ticket is about to resolve.
    pub fn cancel(&self, session_id: SessionId) -> Result<bool> {
        let mut queue = self.queue.lock()?;
        match queue.iter().position(|entry| entry.session.id == session_id) {
            Some(index) => {
                queue.remove(index);
                debug!("Session {} left the wait queue", session_id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Number of sessions currently waiting; 0 (and an error log) if the
    /// queue lock is poisoned
    pub fn queue_len(&self) -> usize {
        match self.queue.lock() {
            Ok(queue) => queue.len(),
            Err(e) => {
                error!("Wait queue is unavailable: {}", e);
                0
            }
        }
    }

    pub fn rooms_created(&self) -> u64 {
        self.rooms_created.load(Ordering::Relaxed)
    }
}
