use lcus_relay_core::prelude::*;
use lcus_relay_core::protocol::FrameError;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn open(board: &SimulatedBoard) -> Session {
    Session::with_transport(board.clone(), SessionConfig::new("sim")).unwrap()
}

fn open_with(board: &SimulatedBoard, config: SessionConfig) -> Session {
    Session::with_transport(board.clone(), config).unwrap()
}

fn snapshot(states: &[(u8, bool)]) -> StatusSnapshot {
    StatusSnapshot::from_states(states.iter().copied())
}

#[test]
fn test_fresh_board_reports_all_off() {
    let board = SimulatedBoard::new(2);
    let session = open(&board);

    assert_eq!(session.channel_count(), 2);
    assert_eq!(session.relays(), vec![1, 2]);
    assert_eq!(session.status().unwrap(), snapshot(&[(1, false), (2, false)]));
}

#[test]
fn test_on_then_status_of() {
    let board = SimulatedBoard::new(2);
    let session = open(&board);

    assert!(session.on(1).unwrap());
    assert_eq!(session.status_of(1).unwrap(), snapshot(&[(1, true)]));
    assert_eq!(board.relay_state(1), Some(true));
    assert_eq!(
        session.last_status(),
        Some(snapshot(&[(1, true), (2, false)]))
    );
}

#[test]
fn test_toggle_turns_relay_off_after_duration() {
    let board = SimulatedBoard::new(2);
    let session = open(&board);

    assert!(session.toggle(2, Duration::from_millis(300)).unwrap());
    assert_eq!(session.status_of(2).unwrap(), snapshot(&[(2, true)]));
    assert!(session.off_pending(2));

    thread::sleep(Duration::from_millis(800));
    assert_eq!(session.status_of(2).unwrap(), snapshot(&[(2, false)]));
    assert!(!session.off_pending(2));
    assert_eq!(board.relay_state(2), Some(false));
}

#[test]
fn test_missing_relay_is_rejected_by_board() {
    let board = SimulatedBoard::new(2);
    let session = open(&board);

    assert!(!session.on(3).unwrap());
    assert!(!session.toggle(3, Duration::from_millis(10)).unwrap());
    assert_eq!(session.status().unwrap(), snapshot(&[(1, false), (2, false)]));
}

#[test]
fn test_status_of_missing_relay_is_invalid_index() {
    let board = SimulatedBoard::new(2);
    let session = open(&board);

    assert!(matches!(session.status_of(3), Err(RelayError::InvalidIndex(3))));
    assert!(matches!(session.status_of(0), Err(RelayError::InvalidIndex(0))));
}

#[test]
fn test_redundant_off_succeeds() {
    let board = SimulatedBoard::new(2);
    let session = open(&board);

    assert!(session.off(1).unwrap());
    assert!(session.off(1).unwrap());
}

#[test]
fn test_all_on_and_all_off() {
    let board = SimulatedBoard::new(4);
    let session = open(&board);

    assert!(session.all_on().unwrap());
    assert_eq!(
        session.status().unwrap(),
        snapshot(&[(1, true), (2, true), (3, true), (4, true)])
    );
    assert!(session.all_off().unwrap());
    assert!(session.status().unwrap().iter().all(|(_, on)| !on));
}

#[test]
fn test_timeout_then_recovery() {
    let board = SimulatedBoard::new(2);
    let session = open_with(
        &board,
        SessionConfig {
            timeout_ms: 20,
            ..SessionConfig::new("sim")
        },
    );

    board.set_latency(Duration::from_millis(100));
    assert!(matches!(session.on(1), Err(RelayError::ResponseTimeout)));
    assert!(matches!(session.status(), Err(RelayError::ResponseTimeout)));

    board.set_latency(Duration::ZERO);
    assert!(session.on(2).unwrap());
    assert_eq!(session.status_of(2).unwrap(), snapshot(&[(2, true)]));
}

#[test]
fn test_longer_timeout_tolerates_latency() {
    let board = SimulatedBoard::new(1);
    let session = open(&board);

    board.set_latency(Duration::from_millis(100));
    assert!(matches!(session.status(), Err(RelayError::ResponseTimeout)));
    session.set_timeout(Duration::from_millis(300));
    assert_eq!(session.status().unwrap(), snapshot(&[(1, false)]));
}

#[test]
fn test_explicit_off_cancels_pending_toggle() {
    let board = SimulatedBoard::new(2);
    let session = open(&board);

    assert!(session.toggle(1, Duration::from_millis(200)).unwrap());
    assert!(session.off(1).unwrap());
    assert!(!session.off_pending(1));

    assert!(session.on(1).unwrap());
    thread::sleep(Duration::from_millis(500));
    assert_eq!(board.relay_state(1), Some(true));
}

#[test]
fn test_second_toggle_restarts_timer() {
    let board = SimulatedBoard::new(1);
    let session = open(&board);

    assert!(session.toggle(1, Duration::from_millis(300)).unwrap());
    thread::sleep(Duration::from_millis(150));
    assert!(session.toggle(1, Duration::from_millis(600)).unwrap());

    thread::sleep(Duration::from_millis(300));
    assert_eq!(board.relay_state(1), Some(true));
    thread::sleep(Duration::from_millis(700));
    assert_eq!(board.relay_state(1), Some(false));
}

#[test]
fn test_close_cancels_toggle_and_rejects_operations() {
    let board = SimulatedBoard::new(2);
    let session = open(&board);

    assert!(session.toggle(1, Duration::from_millis(200)).unwrap());
    session.close().unwrap();
    assert!(session.is_closed());
    assert!(board.is_closed());

    thread::sleep(Duration::from_millis(400));
    assert_eq!(board.relay_state(1), Some(true));

    assert!(matches!(session.status(), Err(RelayError::SessionClosed)));
    assert!(matches!(session.on(1), Err(RelayError::SessionClosed)));
    assert!(matches!(
        session.toggle(1, Duration::from_millis(1)),
        Err(RelayError::SessionClosed)
    ));
    session.close().unwrap();
}

#[test]
fn test_drop_closes_transport() {
    let board = SimulatedBoard::new(1);
    drop(open(&board));
    assert!(board.is_closed());
}

#[test]
fn test_discovers_channel_count() {
    for channels in [1, 2, 4, 8] {
        let board = SimulatedBoard::new(channels);
        let session = open(&board);
        assert_eq!(session.channel_count(), channels);
        assert_eq!(session.status().unwrap().len(), channels as usize);
    }
}

#[test]
fn test_discovery_without_reply_times_out() {
    let board = SimulatedBoard::new(2);
    board.set_latency(Duration::from_secs(1));
    let result = Session::with_transport(
        board.clone(),
        SessionConfig {
            timeout_ms: 10,
            ..SessionConfig::new("sim")
        },
    );
    assert!(matches!(result, Err(RelayError::ResponseTimeout)));
    assert!(board.is_closed());
}

#[test]
fn test_init_off_resets_relays() {
    let board = SimulatedBoard::new(2);
    board.set_relay_state(1, true);
    let _session = open(&board);
    assert_eq!(board.relay_state(1), Some(false));

    let board = SimulatedBoard::new(2);
    board.set_relay_state(1, true);
    let session = open_with(
        &board,
        SessionConfig {
            init_off: false,
            ..SessionConfig::new("sim")
        },
    );
    assert_eq!(session.status_of(1).unwrap(), snapshot(&[(1, true)]));
}

#[test]
fn test_echo_acknowledgement() {
    let board = SimulatedBoard::new(2).with_echo();
    let session = open_with(
        &board,
        SessionConfig {
            channels: Some(2),
            ack: AckMode::Echo,
            ..SessionConfig::new("sim")
        },
    );

    assert!(session.on(2).unwrap());
    assert!(!session.on(3).unwrap());
    assert_eq!(session.status().unwrap(), snapshot(&[(1, false), (2, true)]));
    assert!(session.off(2).unwrap());
    assert_eq!(session.last_status(), Some(snapshot(&[(1, false), (2, false)])));
}

#[test]
fn test_echo_mode_without_echo_times_out() {
    let board = SimulatedBoard::new(1);
    let result = Session::with_transport(
        board,
        SessionConfig {
            channels: Some(1),
            ack: AckMode::Echo,
            ..SessionConfig::new("sim")
        },
    );
    assert!(matches!(result, Err(RelayError::ResponseTimeout)));
}

#[test]
fn test_stale_first_read_is_discarded() {
    let board = SimulatedBoard::new(2);
    let session = open(&board);
    board.set_stale_reads(1);
    assert!(session.on(1).unwrap());

    let board = SimulatedBoard::new(2);
    let session = open_with(
        &board,
        SessionConfig {
            status_reads: 1,
            ..SessionConfig::new("sim")
        },
    );
    board.set_stale_reads(1);
    assert!(!session.on(1).unwrap());
    assert_eq!(board.relay_state(1), Some(true));
}

#[test]
fn test_corrupt_reply_is_transport_error() {
    let board = SimulatedBoard::new(2);
    let session = open_with(
        &board,
        SessionConfig {
            status_reads: 1,
            ..SessionConfig::new("sim")
        },
    );

    board.corrupt_next_reply();
    let err = session.status().unwrap_err();
    assert!(matches!(
        err,
        RelayError::TransportError(TransportFault::Frame(FrameError::MalformedFrame(_)))
    ));
    assert!(err.is_recoverable());
    assert_eq!(session.status().unwrap(), snapshot(&[(1, false), (2, false)]));
}

#[test]
fn test_write_failure_leaves_session_usable() {
    let board = SimulatedBoard::new(2);
    let session = open(&board);

    board.fail_next_write();
    assert!(matches!(
        session.on(1),
        Err(RelayError::TransportError(TransportFault::Io(_)))
    ));
    assert!(session.on(1).unwrap());
}

#[test]
fn test_concurrent_callers_are_serialized() {
    let board = SimulatedBoard::new(4);
    let session = Arc::new(open(&board));

    let workers: Vec<_> = (1..=4u8)
        .map(|relay| {
            let session = Arc::clone(&session);
            thread::spawn(move || {
                for i in 0..10 {
                    let on = i % 2 == 0;
                    let ok = if on {
                        session.on(relay).unwrap()
                    } else {
                        session.off(relay).unwrap()
                    };
                    assert!(ok);
                    assert_eq!(session.status().unwrap().len(), 4);
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }
    assert!(session.status().unwrap().iter().all(|(_, on)| !on));
}

fn slow_config() -> SessionConfig {
    SessionConfig {
        channels: Some(2),
        timeout_ms: 1000,
        ..SessionConfig::new("sim")
    }
}

#[test]
fn test_close_during_exchange_reports_session_closed() {
    let board = SimulatedBoard::new(2);
    let session = Arc::new(open_with(&board, slow_config()));
    board.set_latency(Duration::from_millis(300));

    let reader = {
        let session = Arc::clone(&session);
        thread::spawn(move || session.status())
    };
    thread::sleep(Duration::from_millis(50));
    session.close().unwrap();

    assert!(matches!(reader.join().unwrap(), Err(RelayError::SessionClosed)));
    assert!(board.is_closed());
}

#[test]
fn test_close_during_toggle_leaves_nothing_pending() {
    let board = SimulatedBoard::new(2);
    let session = Arc::new(open_with(&board, slow_config()));
    board.set_latency(Duration::from_millis(300));

    let toggler = {
        let session = Arc::clone(&session);
        thread::spawn(move || session.toggle(1, Duration::from_millis(50)))
    };
    thread::sleep(Duration::from_millis(50));
    session.close().unwrap();

    assert!(matches!(toggler.join().unwrap(), Err(RelayError::SessionClosed)));
    assert!(!session.off_pending(1));
}

#[test]
fn test_deferred_off_waits_for_exchange_in_flight() {
    let board = SimulatedBoard::new(2);
    let session = open_with(&board, slow_config());

    assert!(session.toggle(1, Duration::from_millis(100)).unwrap());
    let before = board.written().len();

    // The timer fires while this status exchange still holds the link
    board.set_latency(Duration::from_millis(300));
    assert_eq!(session.status().unwrap(), snapshot(&[(1, true), (2, false)]));

    for _ in 0..300 {
        if !session.off_pending(1) {
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }
    assert!(!session.off_pending(1));
    assert_eq!(board.relay_state(1), Some(false));
    assert_eq!(
        board.written()[before..].to_vec(),
        vec![0xFF, 0xFF, 0xA0, 0x01, 0x00, 0xA1, 0xFF, 0xFF]
    );
}
