//! End-to-end tests: a `LossServer` on an ephemeral loopback port fed by a
//! `SequenceSender` in the same runtime.

use std::time::Duration;

use lossmon::client::SequenceSender;
use lossmon::packet::HEADER_SIZE;
use lossmon::{LossServer, ServerConfig, SessionState, SessionStats};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

struct Running {
    sender: SequenceSender,
    stats: watch::Receiver<SessionStats>,
    stop: Option<oneshot::Sender<()>>,
    server: JoinHandle<SessionStats>,
}

async fn start(window: u16, reply_delay: Duration) -> Running {
    let config = ServerConfig::new("127.0.0.1".parse().unwrap(), 0, window)
        .unwrap()
        .with_reply_delay(reply_delay);
    let server = LossServer::bind(config).expect("bind failed");
    let addr = server.local_addr().expect("bound address");
    let stats = server.subscribe();

    let (stop, stopped) = oneshot::channel::<()>();
    let server = tokio::spawn(server.run(async {
        let _ = stopped.await;
    }));

    let sender = SequenceSender::connect(addr, 64).await.expect("connect failed");
    Running {
        sender,
        stats,
        stop: Some(stop),
        server,
    }
}

async fn wait_for_received(stats: &mut watch::Receiver<SessionStats>, n: u64) -> SessionStats {
    let snapshot = timeout(WAIT, stats.wait_for(|s| s.received >= n))
        .await
        .expect("timed out waiting for messages")
        .expect("server gone");
    *snapshot
}

#[tokio::test]
async fn test_in_order_delivery_and_reply() {
    let mut run = start(32, Duration::from_millis(50)).await;

    for seq in 0..3 {
        run.sender.send(seq).await.unwrap();
    }
    let stats = wait_for_received(&mut run.stats, 3).await;
    assert_eq!(stats.state, SessionState::Connected);
    assert_eq!(stats.received, 3);
    assert_eq!(stats.lost, 0);

    let mut reply = [0xFFu8; 100];
    timeout(WAIT, run.sender.read_reply(&mut reply))
        .await
        .expect("no reply")
        .unwrap();
    assert!(reply.iter().all(|&b| b == 0));

    run.sender.shutdown().await.unwrap();
    let final_stats = timeout(WAIT, run.server).await.expect("server did not stop").unwrap();
    assert_eq!(final_stats.state, SessionState::Closed);
    assert_eq!(final_stats.received, 3);
    assert!(final_stats.sent >= 1);
}

#[tokio::test]
async fn test_gap_counted_after_window_slides() {
    let mut run = start(8, Duration::from_millis(20)).await;

    for seq in (0..=15).filter(|&s| s != 2) {
        run.sender.send(seq).await.unwrap();
    }
    let stats = wait_for_received(&mut run.stats, 15).await;
    assert_eq!(stats.received, 15);
    assert_eq!(stats.lost, 1);
    assert_eq!(stats.window_size, 8);

    run.sender.shutdown().await.unwrap();
    let final_stats = timeout(WAIT, run.server).await.unwrap().unwrap();
    assert_eq!(final_stats.lost, 1);
}

#[tokio::test]
async fn test_empty_and_short_messages_are_skipped() {
    let mut run = start(32, Duration::from_millis(20)).await;

    run.sender.send(0).await.unwrap();
    run.sender.send_raw(&[]).await.unwrap();
    run.sender.send_raw(&[1u8; HEADER_SIZE - 1]).await.unwrap();
    run.sender.send(1).await.unwrap();

    let stats = wait_for_received(&mut run.stats, 2).await;
    assert_eq!(stats.received, 2);
    assert_eq!(stats.lost, 0);
    assert_eq!(stats.state, SessionState::Connected);

    run.sender.shutdown().await.unwrap();
    timeout(WAIT, run.server).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_shutdown_stops_without_peer_close() {
    let mut run = start(32, Duration::from_secs(60)).await;

    run.sender.send(0).await.unwrap();
    wait_for_received(&mut run.stats, 1).await;

    run.stop.take().unwrap().send(()).unwrap();
    let final_stats = timeout(WAIT, run.server).await.unwrap().unwrap();
    assert_eq!(final_stats.state, SessionState::Closed);
    assert_eq!(final_stats.received, 1);
    assert_eq!(final_stats.sent, 0);
}

#[tokio::test]
async fn test_bind_conflict_is_reported() {
    let first = LossServer::bind(ServerConfig::new("127.0.0.1".parse().unwrap(), 0, 32).unwrap())
        .unwrap();
    let taken = first.local_addr().unwrap();

    // Keep a live listener on the port so the second bind cannot reuse it.
    let config = ServerConfig::new(taken.ip(), taken.port(), 32).unwrap();
    match LossServer::bind(config) {
        Err(lossmon::SessionError::Bind { addr, .. }) => assert_eq!(addr, taken),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("second bind to {taken} succeeded"),
    }
}
