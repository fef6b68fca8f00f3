//! Client shutdown against a live relay: concurrent leave requests produce a
//! single disconnect notice and a single recorded reason.

use std::sync::Arc;
use std::time::Duration;

use relaychat::client::ChatClient;
use relaychat::session::PeerSession;
use relaychat::shutdown::{ExitReason, Shutdown};
use relaychat_server::relay;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_leave_sends_one_notice() {
    let server = relay::start_server("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr();

    let observer = TcpStream::connect(addr).await.unwrap();
    let session = PeerSession::connect(&addr.ip().to_string(), addr.port())
        .await
        .unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while server.state().registry.count().await < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    let (writer, _reader) = session.split();
    let shutdown = Arc::new(Shutdown::new());
    let client = Arc::new(ChatClient::new("alice", writer, Arc::clone(&shutdown)));

    let first = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.leave(ExitReason::UserRequested).await }
    });
    let second = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.leave(ExitReason::Failed).await }
    });
    let winners = u8::from(first.await.unwrap()) + u8::from(second.await.unwrap());
    assert_eq!(winners, 1);
    assert!(shutdown.is_triggered());

    let mut lines = BufReader::new(observer).lines();
    let notice = tokio::time::timeout(Duration::from_secs(5), lines.next_line())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(notice.as_deref(), Some("alice,disconnected!"));

    // No second notice follows; the relay closes the observer on shutdown.
    server.shutdown().await;
    let rest = tokio::time::timeout(Duration::from_secs(5), lines.next_line())
        .await
        .unwrap()
        .unwrap_or(None);
    assert!(rest.is_none());
}

#[tokio::test]
async fn exit_codes_follow_the_reason() {
    assert_eq!(ExitReason::UserRequested.exit_code(), 0);
    assert_eq!(ExitReason::ServerClosed.exit_code(), 1);
    assert_eq!(ExitReason::Failed.exit_code(), 1);
}
