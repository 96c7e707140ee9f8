use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

use rusty_caro::config::RematchPolicy;
use rusty_caro::core::connection::Connection;
use rusty_caro::core::matchmaker::{Matchmaker, Pairing};
use rusty_caro::core::room::Seat;
use rusty_caro::core::{Mark, PlayerSession};

fn session(name: &str) -> (PlayerSession, mpsc::UnboundedReceiver<String>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (PlayerSession::register(name, Connection::new(tx)).unwrap(), rx)
}

async fn seat_of(pairing: Pairing) -> Seat {
    match pairing {
        Pairing::Paired(seat) => seat,
        Pairing::Waiting(ticket) => timeout(Duration::from_secs(5), ticket.seat)
            .await
            .expect("ticket never resolved")
            .expect("pairing abandoned"),
    }
}

#[tokio::test]
async fn test_fifo_pairs_in_arrival_order() {
    let matchmaker = Matchmaker::new(15, RematchPolicy::SingleSided);
    let (a, _a_rx) = session("A");
    let (b, _b_rx) = session("B");
    let (c, _c_rx) = session("C");
    let (d, _d_rx) = session("D");

    let a_ticket = match matchmaker.enqueue_or_pair(a).await.unwrap() {
        Pairing::Waiting(ticket) => ticket,
        Pairing::Paired(_) => panic!("A should wait"),
    };
    let b_seat = match matchmaker.enqueue_or_pair(b).await.unwrap() {
        Pairing::Paired(seat) => seat,
        Pairing::Waiting(_) => panic!("B should pair with A"),
    };
    assert_eq!(matchmaker.queue_len(), 0);

    let c_pairing = matchmaker.enqueue_or_pair(c).await.unwrap();
    assert!(matches!(c_pairing, Pairing::Waiting(_)));
    let d_seat = seat_of(matchmaker.enqueue_or_pair(d).await.unwrap()).await;
    let c_seat = seat_of(c_pairing).await;
    let a_seat = a_ticket.seat.await.unwrap();

    // The earlier arrival plays X
    assert_eq!(a_seat.mark, Mark::X);
    assert_eq!(b_seat.mark, Mark::O);
    assert!(Arc::ptr_eq(&a_seat.room, &b_seat.room));
    assert_eq!(b_seat.room.nickname(Mark::X), "A");
    assert_eq!(b_seat.room.nickname(Mark::O), "B");

    assert_eq!(c_seat.mark, Mark::X);
    assert_eq!(d_seat.mark, Mark::O);
    assert!(Arc::ptr_eq(&c_seat.room, &d_seat.room));
    assert_eq!(d_seat.room.nickname(Mark::X), "C");
    assert_eq!(d_seat.room.nickname(Mark::O), "D");

    assert_eq!(matchmaker.rooms_created(), 2);
    assert_eq!(matchmaker.queue_len(), 0);
}

#[tokio::test]
async fn test_pairing_sends_role_opponent_start_turn() {
    let matchmaker = Matchmaker::new(9, RematchPolicy::SingleSided);
    let (a, mut a_rx) = session("alice");
    let (b, mut b_rx) = session("bob");

    let waiting = matchmaker.enqueue_or_pair(a).await.unwrap();
    let _b_seat = seat_of(matchmaker.enqueue_or_pair(b).await.unwrap()).await;
    let _a_seat = seat_of(waiting).await;

    let a_lines: Vec<String> = std::iter::from_fn(|| a_rx.try_recv().ok()).collect();
    let b_lines: Vec<String> = std::iter::from_fn(|| b_rx.try_recv().ok()).collect();
    assert_eq!(
        a_lines,
        [
            "INFO:Waiting for an opponent...",
            "ROLE:X",
            "OPPONENT:bob",
            "START:SIZE=9",
            "TURN:X"
        ]
    );
    assert_eq!(b_lines, ["ROLE:O", "OPPONENT:alice", "START:SIZE=9", "TURN:X"]);
}

#[tokio::test]
async fn test_abandoned_ticket_is_not_paired() {
    let matchmaker = Matchmaker::new(15, RematchPolicy::SingleSided);
    let (a, _a_rx) = session("A");
    let (b, _b_rx) = session("B");

    // A's connection stays open but nobody is listening for its seat
    let ticket = matchmaker.enqueue_or_pair(a).await.unwrap();
    drop(ticket);

    let pairing = matchmaker.enqueue_or_pair(b).await.unwrap();
    assert!(matches!(pairing, Pairing::Waiting(_)));
    assert_eq!(matchmaker.queue_len(), 1);
    assert_eq!(matchmaker.rooms_created(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_arrivals_never_double_pair() {
    let matchmaker = Arc::new(Matchmaker::new(15, RematchPolicy::SingleSided));
    let mut receivers = Vec::new();
    let mut handles = Vec::new();

    for i in 0..64 {
        let (player, rx) = session(&format!("player{}", i));
        receivers.push(rx);
        let matchmaker = matchmaker.clone();
        handles.push(tokio::spawn(async move {
            let pairing = matchmaker.enqueue_or_pair(player).await.unwrap();
            seat_of(pairing).await
        }));
    }

    let mut seats = Vec::new();
    for handle in handles {
        seats.push(handle.await.unwrap());
    }

    assert_eq!(matchmaker.rooms_created(), 32);
    assert_eq!(matchmaker.queue_len(), 0);

    let rooms: HashSet<String> = seats.iter().map(|seat| seat.room.id.clone()).collect();
    assert_eq!(rooms.len(), 32);
    for room_id in &rooms {
        let marks: Vec<Mark> = seats
            .iter()
            .filter(|seat| &seat.room.id == room_id)
            .map(|seat| seat.mark)
            .collect();
        assert_eq!(marks.len(), 2);
        assert!(marks.contains(&Mark::X) && marks.contains(&Mark::O));
    }
}
