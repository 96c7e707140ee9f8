use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, BufReader};
use tokio::net::TcpStream;
use tokio::sync::watch;

use crate::config::{DisconnectPolicy, ServerConfig};
use crate::core::board::Mark;
use crate::core::connection::Connection;
use crate::core::matchmaker::{Matchmaker, Pairing, WaitTicket};
use crate::core::message::{ClientCommand, ServerEvent};
use crate::core::room::{LeaveReason, Seat};
use crate::core::session::{handshake, CommandReader, PlayerSession};
use crate::error::RustyCaroError;

/// How a registered session's read loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The player sent EXIT
    Exited,
    /// The player's connection closed or failed
    Disconnected,
    /// The opponent left and the survivor is not requeued
    OpponentLeft,
}

// Handle a TCP connection from accept to close
pub async fn handle_tcp_client(
    stream: TcpStream,
    matchmaker: Arc<Matchmaker>,
    config: Arc<ServerConfig>,
) {
    let peer_addr = stream
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    let (read_half, write_half) = stream.into_split();

    // Spawn a task to forward queued events to the socket
    let (connection, _writer) = Connection::spawn_writer(write_half);
    let mut reader = CommandReader::new(BufReader::new(read_half), config.max_line_length);

    info!("Client connected: {} from {}", connection.id, peer_addr);

    let session = match handshake(&mut reader, connection.clone()).await {
        Ok(session) => session,
        Err(e) => {
            warn!("Closing {} after failed handshake: {}", connection.id, e);
            return;
        }
    };
    drop(connection);

    let end = run_session(session.clone(), &mut reader, &matchmaker, config.disconnect_policy).await;
    info!(
        "Client disconnected: '{}' ({:?}) after {:?}",
        session.nickname,
        end,
        session.connection.connection_duration()
    );
}

/// Drive a registered session through matchmaking and matches until it ends.
///
/// With [`DisconnectPolicy::Requeue`] a player whose opponent left goes back
/// to the matchmaker instead of being disconnected.
pub async fn run_session<R>(
    session: PlayerSession,
    reader: &mut CommandReader<R>,
    matchmaker: &Matchmaker,
    policy: DisconnectPolicy,
) -> SessionEnd
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let seat = match find_seat(&session, reader, matchmaker).await {
            Ok(seat) => seat,
            Err(end) => return end,
        };

        match play(&session, reader, &seat).await {
            SessionEnd::OpponentLeft
                if policy == DisconnectPolicy::Requeue && session.is_connected() =>
            {
                debug!("Requeueing '{}' after opponent left", session.nickname);
                continue;
            }
            end => return end,
        }
    }
}

// Wait in the matchmaker queue until seated, or until the player gives up
async fn find_seat<R>(
    session: &PlayerSession,
    reader: &mut CommandReader<R>,
    matchmaker: &Matchmaker,
) -> Result<Seat, SessionEnd>
where
    R: AsyncBufRead + Unpin,
{
    let mut ticket = match matchmaker.enqueue_or_pair(session.clone()).await {
        Ok(Pairing::Paired(seat)) => return Ok(seat),
        Ok(Pairing::Waiting(ticket)) => ticket,
        Err(e) => {
            error!("Matchmaking failed for '{}': {}", session.nickname, e);
            session.send(&ServerEvent::info("Matchmaking is unavailable"));
            return Err(SessionEnd::Disconnected);
        }
    };

    loop {
        // The opening lines reach the client before the seat does; a command
        // answering them must be handled in the room, not rejected here.
        tokio::select! {
            biased;
            seat = &mut ticket.seat => {
                return seat.map_err(|_| {
                    warn!("Pairing for '{}' was abandoned", session.nickname);
                    SessionEnd::Disconnected
                });
            }
            command = reader.next_command() => match command {
                Some(Ok(ClientCommand::Exit)) => {
                    return Err(abandon_queue(session, ticket, matchmaker, LeaveReason::Exit).await);
                }
                None => {
                    return Err(abandon_queue(session, ticket, matchmaker, LeaveReason::Disconnected).await);
                }
                Some(Err(e)) if e.is_fatal() => {
                    warn!("Read error from waiting '{}': {}", session.nickname, e);
                    return Err(abandon_queue(session, ticket, matchmaker, LeaveReason::Disconnected).await);
                }
                Some(Ok(_)) => {
                    session.send(&ServerEvent::info(RustyCaroError::NotInMatch.to_string()));
                }
                Some(Err(e)) => {
                    session.send(&ServerEvent::info(e.to_string()));
                }
            }
        }
    }
}

// Leave the queue; if a pairing already claimed us, leave the new room instead
async fn abandon_queue(
    session: &PlayerSession,
    ticket: WaitTicket,
    matchmaker: &Matchmaker,
    reason: LeaveReason,
) -> SessionEnd {
    let removed = matchmaker.cancel(ticket.session_id).unwrap_or_else(|e| {
        error!("Failed to remove '{}' from the queue: {}", session.nickname, e);
        false
    });

    if removed {
        if reason == LeaveReason::Exit {
            session.send(&ServerEvent::info("Goodbye"));
        }
    } else if let Ok(seat) = ticket.seat.await {
        seat.room.leave(seat.mark, reason).await;
    }

    match reason {
        LeaveReason::Exit => SessionEnd::Exited,
        _ => SessionEnd::Disconnected,
    }
}

// Forward commands to the room until someone leaves
async fn play<R>(session: &PlayerSession, reader: &mut CommandReader<R>, seat: &Seat) -> SessionEnd
where
    R: AsyncBufRead + Unpin,
{
    let mut departed = seat.room.subscribe();

    loop {
        tokio::select! {
            command = reader.next_command() => match command {
                None => {
                    seat.room.leave(seat.mark, LeaveReason::Disconnected).await;
                    return SessionEnd::Disconnected;
                }
                Some(Err(e)) if e.is_fatal() => {
                    warn!("Read error from '{}': {}", session.nickname, e);
                    seat.room.leave(seat.mark, LeaveReason::Disconnected).await;
                    return SessionEnd::Disconnected;
                }
                Some(Err(e)) => {
                    session.send(&ServerEvent::info(e.to_string()));
                }
                Some(Ok(ClientCommand::Exit)) => {
                    seat.room.leave(seat.mark, LeaveReason::Exit).await;
                    return SessionEnd::Exited;
                }
                Some(Ok(command)) => match seat.room.handle_command(seat.mark, command).await {
                    Ok(()) => {}
                    // The closure branch reports how the room ended
                    Err(RustyCaroError::RoomClosed) => {}
                    Err(e) => {
                        debug!("Rejected command from '{}': {}", session.nickname, e);
                        session.send(&ServerEvent::info(e.to_string()));
                    }
                },
            },
            leaver = wait_for_departure(&mut departed) => {
                return if leaver == Some(seat.mark) {
                    SessionEnd::Disconnected
                } else {
                    SessionEnd::OpponentLeft
                };
            }
        }
    }
}

// Resolves once the room closes, with the mark of the player that left
async fn wait_for_departure(departed: &mut watch::Receiver<Option<Mark>>) -> Option<Mark> {
    match departed.wait_for(|leaver| leaver.is_some()).await {
        Ok(leaver) => *leaver,
        Err(_) => None,
    }
}
