//! End-to-end session tests against an in-process fake boat.
//!
//! Each test binds a local TCP listener on an ephemeral port and plays the
//! boat's side of the protocol by hand: accept, exchange newline-framed
//! lines, drop the socket to simulate a lost link.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::timeout;

use boatlink::{Command, Event, LinkState, SessionCoordinator, Winch};

const STEP: Duration = Duration::from_secs(5);

/// The boat side of one accepted connection.
struct FakeBoat {
    reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
    writer: tokio::net::tcp::OwnedWriteHalf,
}

impl FakeBoat {
    async fn accept(listener: &TcpListener) -> Self {
        let (sock, _) = timeout(STEP, listener.accept())
            .await
            .expect("client connects in time")
            .expect("accept");
        let (read_half, writer) = sock.into_split();
        Self { reader: BufReader::new(read_half), writer }
    }

    /// Read one frame line from the client, without the newline.
    async fn read_line(&mut self) -> String {
        let mut line = String::new();
        let n = timeout(STEP, self.reader.read_line(&mut line))
            .await
            .expect("client writes in time")
            .expect("read");
        assert!(n > 0, "client closed the connection");
        line.trim_end_matches('\n').to_string()
    }

    /// Assert the client stays quiet for `window`.
    async fn expect_silence(&mut self, window: Duration) {
        let mut line = String::new();
        let result = timeout(window, self.reader.read_line(&mut line)).await;
        assert!(
            result.is_err(),
            "expected no traffic, got: {}",
            line.trim_end()
        );
    }

    async fn send_line(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\n").as_bytes())
            .await
            .expect("server write");
    }
}

async fn start_session(listener: &TcpListener) -> (SessionCoordinator, FakeBoat) {
    let port = listener.local_addr().expect("addr").port();
    let mut session = SessionCoordinator::new("127.0.0.1", port);
    session.start().expect("start");
    let mut boat = FakeBoat::accept(listener).await;
    // Every fresh link begins with the client's info request.
    assert_eq!(boat.read_line().await, "GBI:GBI");
    (session, boat)
}

async fn next_event(rx: &mut tokio::sync::broadcast::Receiver<Event>) -> Event {
    loop {
        match timeout(STEP, rx.recv()).await.expect("event in time") {
            Ok(event) => return event,
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => panic!("event channel closed"),
        }
    }
}

#[tokio::test]
async fn test_decodes_and_broadcasts_telemetry() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let mut session = SessionCoordinator::new("127.0.0.1", listener.local_addr().unwrap().port());
    let mut events = session.subscribe();
    session.start().expect("start");
    let mut boat = FakeBoat::accept(&listener).await;
    boat.read_line().await; // GBI

    boat.send_line("PA:16.93:52.41:120:1:PA").await;
    boat.send_line("WI:LOW_BATTERY:WI").await;
    boat.send_line("BI:Walrus:Ada:harbor-patrol:BI").await;

    assert_eq!(
        next_event(&mut events).await,
        Event::PositionUpdate { lon: 16.93, lat: 52.41, speed_cm_s: 120.0, seq: 1 }
    );
    assert_eq!(
        next_event(&mut events).await,
        Event::Warning { code: "LOW_BATTERY".to_string() }
    );
    assert_eq!(
        next_event(&mut events).await,
        Event::BoatInfo {
            name: "Walrus".to_string(),
            captain: "Ada".to_string(),
            mission: "harbor-patrol".to_string(),
        }
    );

    session.stop().await;
}

#[tokio::test]
async fn test_malformed_lines_are_dropped_not_fatal() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let mut session = SessionCoordinator::new("127.0.0.1", listener.local_addr().unwrap().port());
    let mut events = session.subscribe();
    session.start().expect("start");
    let mut boat = FakeBoat::accept(&listener).await;
    boat.read_line().await; // GBI

    boat.send_line("PA:garbage:52.41:120:1:PA").await; // bad longitude
    boat.send_line("XX:whatever:XX").await; // unknown code
    boat.send_line("PA:1.0:2.0:30").await; // missing envelope
    boat.send_line("WI:STILL_ALIVE:WI").await;

    // Only the valid frame comes through; nothing crashed in between.
    assert_eq!(
        next_event(&mut events).await,
        Event::Warning { code: "STILL_ALIVE".to_string() }
    );

    session.stop().await;
}

#[tokio::test]
async fn test_gap_triggers_exactly_one_lost_request() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let (mut session, mut boat) = start_session(&listener).await;

    boat.send_line("PA:1.0:2.0:10:5:PA").await;
    boat.send_line("PA:1.0:2.0:10:9:PA").await; // 6,7,8 missing

    assert_eq!(boat.read_line().await, "LI:6:LI");

    // The watermark advanced to 9: the next in-order frame and even a
    // duplicate of the old gap must not produce another request.
    boat.send_line("PA:1.0:2.0:10:10:PA").await;
    boat.send_line("PA:1.0:2.0:10:7:PA").await; // stale
    boat.expect_silence(Duration::from_millis(300)).await;

    session.stop().await;
}

#[tokio::test]
async fn test_lost_ack_participates_in_gap_detection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let (mut session, mut boat) = start_session(&listener).await;

    boat.send_line("PA:1.0:2.0:10:3:PA").await;
    boat.send_line("LI:6:LI").await; // ack carries seq 6: 4,5 missing

    assert_eq!(boat.read_line().await, "LI:4:LI");

    session.stop().await;
}

#[tokio::test]
async fn test_counter_restart_does_not_request_retransmission() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let (mut session, mut boat) = start_session(&listener).await;

    boat.send_line("PA:1.0:2.0:10:1500:PA").await;
    boat.send_line("PA:1.0:2.0:10:2:PA").await; // onboard reboot

    boat.expect_silence(Duration::from_millis(300)).await;

    session.stop().await;
}

#[tokio::test]
async fn test_commands_are_encoded_with_monotonic_sequence() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let (mut session, mut boat) = start_session(&listener).await;

    session
        .send(Command::SetSpeed { left: 5, right: 7, winch: Winch::Off })
        .await
        .expect("send");
    session
        .send(Command::SetMission { mission: "auto".to_string() })
        .await
        .expect("send");

    assert_eq!(boat.read_line().await, "SS:5:7:1:SS");
    assert_eq!(boat.read_line().await, "SM:auto:2:SM");

    // Ack the mission so teardown doesn't race a retransmission.
    boat.send_line("CA:SM:2:CA").await;

    session.stop().await;
}

#[tokio::test]
async fn test_winch_rides_in_its_own_action_frame() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let (mut session, mut boat) = start_session(&listener).await;

    session
        .send(Command::SetSpeed { left: 6, right: 6, winch: Winch::Up })
        .await
        .expect("send");

    assert_eq!(boat.read_line().await, "SS:6:6:1:SS");
    assert_eq!(boat.read_line().await, "SA:WN:2:2:SA");
    boat.send_line("CA:SA:2:CA").await;

    session.stop().await;
}

#[tokio::test]
async fn test_winch_off_transition_is_transmitted() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let (mut session, mut boat) = start_session(&listener).await;

    session
        .send(Command::SetSpeed { left: 5, right: 5, winch: Winch::Up })
        .await
        .expect("send");
    assert_eq!(boat.read_line().await, "SS:5:5:1:SS");
    assert_eq!(boat.read_line().await, "SA:WN:2:2:SA");
    boat.send_line("CA:SA:2:CA").await;

    // The winch latches: commanding it back to Off must go out on the
    // wire too, or the boat-side winch keeps running.
    session
        .send(Command::SetSpeed { left: 5, right: 5, winch: Winch::Off })
        .await
        .expect("send");
    assert_eq!(boat.read_line().await, "SS:5:5:3:SS");
    assert_eq!(boat.read_line().await, "SA:WN:1:4:SA");
    boat.send_line("CA:SA:4:CA").await;

    // An unchanged winch state produces no extra frame.
    session
        .send(Command::SetSpeed { left: 6, right: 6, winch: Winch::Off })
        .await
        .expect("send");
    assert_eq!(boat.read_line().await, "SS:6:6:5:SS");
    boat.expect_silence(Duration::from_millis(300)).await;

    session.stop().await;
}

#[tokio::test]
async fn test_latched_winch_is_reasserted_after_reconnect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let (mut session, mut boat) = start_session(&listener).await;

    session
        .send(Command::SetSpeed { left: 5, right: 5, winch: Winch::Down })
        .await
        .expect("send");
    assert_eq!(boat.read_line().await, "SS:5:5:1:SS");
    assert_eq!(boat.read_line().await, "SA:WN:0:2:SA");
    boat.send_line("CA:SA:2:CA").await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    drop(boat); // link lost

    // A rebooted boat comes up with the winch off; the new link must
    // restate the latched Down after the fresh info request.
    let mut boat = FakeBoat::accept(&listener).await;
    assert_eq!(boat.read_line().await, "GBI:GBI");
    assert_eq!(boat.read_line().await, "SA:WN:0:3:SA");
    boat.send_line("CA:SA:3:CA").await;

    session.stop().await;
}

#[tokio::test]
async fn test_unacked_command_is_retransmitted() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let (mut session, mut boat) = start_session(&listener).await;

    session
        .send(Command::SetMission { mission: "dock".to_string() })
        .await
        .expect("send");
    assert_eq!(boat.read_line().await, "SM:dock:1:SM");

    // No ack: the same wire line must show up again after the ack timeout.
    assert_eq!(boat.read_line().await, "SM:dock:1:SM");

    boat.send_line("CA:SM:1:CA").await;
    session.stop().await;
}

#[tokio::test]
async fn test_ack_stops_retransmission_and_is_broadcast() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let mut session = SessionCoordinator::new("127.0.0.1", listener.local_addr().unwrap().port());
    let mut events = session.subscribe();
    session.start().expect("start");
    let mut boat = FakeBoat::accept(&listener).await;
    boat.read_line().await; // GBI

    session
        .send(Command::set_waypoint(16.9, 52.4))
        .await
        .expect("send");
    assert_eq!(boat.read_line().await, "SA:SW:16.9;52.4:1:SA");
    boat.send_line("CA:SA:1:CA").await;

    // The ack reaches subscribers like any other event.
    loop {
        if let Event::CommandAck { command_type, seq } = next_event(&mut events).await {
            assert_eq!(command_type, "SA");
            assert_eq!(seq, 1);
            break;
        }
    }

    // Past the 2s ack timeout, nothing gets resent.
    boat.expect_silence(Duration::from_millis(2600)).await;

    session.stop().await;
}

#[tokio::test]
async fn test_reconnect_resets_tracker_and_rerequests_info() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let (mut session, mut boat) = start_session(&listener).await;

    boat.send_line("PA:1.0:2.0:10:5000:PA").await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    drop(boat); // link lost

    // The supervisor retries after its fixed delay; the new link must
    // start with a fresh GBI.
    let mut boat = FakeBoat::accept(&listener).await;
    assert_eq!(boat.read_line().await, "GBI:GBI");

    // A tiny sequence number on the new link is the first observation of a
    // fresh tracker, not a restart or a gap.
    boat.send_line("PA:1.0:2.0:10:3:PA").await;
    boat.expect_silence(Duration::from_millis(300)).await;

    session.stop().await;
}

#[tokio::test]
async fn test_link_state_is_observable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    let mut session = SessionCoordinator::new("127.0.0.1", port);
    let mut state = session.link_state();
    assert_eq!(*state.borrow(), LinkState::Disconnected);

    session.start().expect("start");
    let _boat = FakeBoat::accept(&listener).await;

    timeout(STEP, async {
        while *state.borrow_and_update() != LinkState::Connected {
            state.changed().await.expect("state channel open");
        }
    })
    .await
    .expect("reaches Connected");

    session.stop().await;
    assert_eq!(*session.link_state().borrow(), LinkState::Disconnected);
}

#[tokio::test]
async fn test_stop_with_unreachable_boat_returns_promptly() {
    // Bind then drop so the port is (very likely) refusing connections.
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    drop(listener);

    let mut session = SessionCoordinator::new("127.0.0.1", port);
    session.start().expect("start");
    tokio::time::sleep(Duration::from_millis(50)).await;

    timeout(Duration::from_secs(10), session.stop())
        .await
        .expect("stop completes promptly");
}

// Connecting writes nothing until the link is up, so a TcpStream helper is
// enough to confirm the session never binds or listens itself.
#[tokio::test]
async fn test_client_is_the_connecting_side() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    let mut session = SessionCoordinator::new("127.0.0.1", port);
    session.start().expect("start");

    // If the session tried to bind the same port instead of connecting,
    // accept would never complete.
    let accepted = timeout(STEP, listener.accept()).await;
    assert!(accepted.is_ok(), "session should dial out to the boat");

    // Sanity: our own dial to the listener also still works.
    assert!(TcpStream::connect(("127.0.0.1", port)).await.is_ok());

    session.stop().await;
}
