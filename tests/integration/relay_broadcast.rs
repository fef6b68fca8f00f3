//! Relay broadcast behavior observed over raw TCP sockets.

use std::time::Duration;

use relaychat_proto::line::ChatLine;
use relaychat_server::registry::Origin;
use relaychat_server::relay::{self, RelayServer};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

struct RawPeer {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl RawPeer {
    async fn connect(server: &RelayServer) -> Self {
        let stream = TcpStream::connect(server.local_addr()).await.unwrap();
        let (read, writer) = stream.into_split();
        Self {
            reader: BufReader::new(read),
            writer,
        }
    }

    async fn send(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.unwrap();
    }

    async fn next_line(&mut self) -> String {
        let mut line = String::new();
        tokio::time::timeout(Duration::from_secs(5), self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for a line")
            .unwrap();
        line
    }

    async fn expect_silence(&mut self) {
        let mut buf = [0u8; 64];
        let result =
            tokio::time::timeout(Duration::from_millis(150), self.reader.read(&mut buf)).await;
        assert!(result.is_err(), "expected no data, got {result:?}");
    }
}

async fn start_with_peers(n: usize) -> (RelayServer, Vec<RawPeer>) {
    let server = relay::start_server("127.0.0.1:0").await.unwrap();
    let mut peers = Vec::with_capacity(n);
    for _ in 0..n {
        peers.push(RawPeer::connect(&server).await);
    }
    tokio::time::timeout(Duration::from_secs(5), async {
        while server.state().registry.count().await < n {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    (server, peers)
}

#[tokio::test]
async fn bytes_are_forwarded_to_every_other_peer() {
    let (server, mut peers) = start_with_peers(3).await;

    peers[0].send(b"alice,hi\n").await;

    assert_eq!(peers[1].next_line().await, "alice,hi\n");
    assert_eq!(peers[2].next_line().await, "alice,hi\n");
    peers[0].expect_silence().await;

    server.shutdown().await;
}

#[tokio::test]
async fn operator_broadcast_reaches_everyone() {
    let (server, mut peers) = start_with_peers(2).await;

    let wire = ChatLine::new("Server", "maintenance at noon").to_wire();
    let report = server
        .state()
        .registry
        .broadcast(Origin::Server, wire.as_bytes())
        .await;
    assert_eq!(report.delivered, 2);

    for peer in &mut peers {
        assert_eq!(peer.next_line().await, "Server,maintenance at noon\n");
    }
    server.shutdown().await;
}

#[tokio::test]
async fn departed_peer_is_forgotten() {
    let (server, mut peers) = start_with_peers(2).await;

    let gone = peers.remove(0);
    drop(gone);

    tokio::time::timeout(Duration::from_secs(5), async {
        while server.state().registry.count().await > 1 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("closed peer was never removed");

    let mut late = RawPeer::connect(&server).await;
    tokio::time::timeout(Duration::from_secs(5), async {
        while server.state().registry.count().await < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    late.send(b"carol,still here\n").await;
    assert_eq!(peers[0].next_line().await, "carol,still here\n");

    server.shutdown().await;
}

#[tokio::test]
async fn shutdown_closes_client_sockets() {
    let (server, mut peers) = start_with_peers(2).await;
    server.shutdown().await;

    for peer in &mut peers {
        let mut buf = Vec::new();
        let n = tokio::time::timeout(Duration::from_secs(5), peer.reader.read_to_end(&mut buf))
            .await
            .expect("socket was not closed")
            .unwrap_or(0);
        assert_eq!(n, 0);
    }
}
