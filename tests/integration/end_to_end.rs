//! End-to-end: two clients exchange a line through an in-process relay.
//!
//! Verifies that the relay forwards bytes verbatim to every other peer, that
//! the receiving client logs the parsed `(sender, text)` pair, and that the
//! sender never sees its own line echoed back.

use std::sync::Arc;
use std::time::Duration;

use relaychat::client::{ChatClient, receive_activity};
use relaychat::session::PeerSession;
use relaychat::shutdown::{ExitReason, Shutdown};
use relaychat_proto::line::ChatLine;
use relaychat_server::relay::{self, RelayServer};

async fn start_relay() -> RelayServer {
    relay::start_server("127.0.0.1:0")
        .await
        .expect("failed to start relay server")
}

async fn connect(server: &RelayServer, name: &str) -> Arc<ChatClient> {
    let addr = server.local_addr();
    let session = PeerSession::connect(&addr.ip().to_string(), addr.port())
        .await
        .expect("connect should succeed");
    let (writer, reader) = session.split();
    let client = Arc::new(ChatClient::new(name, writer, Arc::new(Shutdown::new())));
    tokio::spawn(receive_activity(Arc::clone(&client), reader));
    client
}

/// Wait until the relay has registered `n` peers.
async fn wait_for_peers(server: &RelayServer, n: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while server.state().registry.count().await < n {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("peers never registered");
}

/// Wait until `client` has logged at least `n` lines.
async fn wait_for_lines(client: &ChatClient, n: usize) -> Vec<ChatLine> {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let log = client.state().log_snapshot();
            if log.len() >= n {
                return log.lines().to_vec();
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("lines never arrived")
}

#[tokio::test]
async fn line_reaches_other_client_but_not_sender() {
    let server = start_relay().await;
    let alice = connect(&server, "alice").await;
    let bob = connect(&server, "bob").await;
    wait_for_peers(&server, 2).await;

    alice.send_message("hi".to_string()).await;

    assert_eq!(wait_for_lines(&bob, 1).await, [ChatLine::new("alice", "hi")]);

    // Give a stray echo time to arrive before checking alice's log.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        alice.state().log_snapshot().lines(),
        [ChatLine::new("alice", "hi")],
        "alice should only hold her own local copy"
    );

    alice.leave(ExitReason::UserRequested).await;
    bob.leave(ExitReason::UserRequested).await;
    server.shutdown().await;
}

#[tokio::test]
async fn text_with_commas_survives_the_round_trip() {
    let server = start_relay().await;
    let alice = connect(&server, "alice").await;
    let bob = connect(&server, "bob").await;
    wait_for_peers(&server, 2).await;

    alice.send_message("hello,world, again".to_string()).await;

    assert_eq!(
        wait_for_lines(&bob, 1).await,
        [ChatLine::new("alice", "hello,world, again")]
    );
    server.shutdown().await;
}

#[tokio::test]
async fn lifecycle_notices_reach_peers() {
    let server = start_relay().await;
    let bob = connect(&server, "bob").await;
    let alice = connect(&server, "alice").await;
    wait_for_peers(&server, 2).await;

    alice.announce_join().await.unwrap();
    alice.leave(ExitReason::UserRequested).await;

    assert_eq!(
        wait_for_lines(&bob, 2).await,
        [
            ChatLine::new("alice", "joined the chat!"),
            ChatLine::new("alice", "disconnected!"),
        ]
    );
    server.shutdown().await;
}

#[tokio::test]
async fn server_shutdown_is_reported_to_clients() {
    let server = start_relay().await;
    let alice = connect(&server, "alice").await;
    wait_for_peers(&server, 1).await;

    server.shutdown().await;

    let mut signal = alice.shutdown().subscribe();
    let reason = tokio::time::timeout(Duration::from_secs(5), signal.triggered())
        .await
        .expect("client never noticed the server closing");
    assert_eq!(reason, ExitReason::ServerClosed);
    assert_eq!(reason.exit_code(), 1);
}
