use chrono::{TimeZone, Utc};
use interop_core::{CanonicalMessage, MessageType, Validator};
use interop_stream::tcp::encode_frame;
use interop_stream::{CancellationToken, Publisher, TcpPublisher, TcpSubscription, TopicFilter};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

fn validator() -> Arc<Validator> {
    Arc::new(Validator::with_embedded_schema().unwrap())
}

fn message(message_type: MessageType, uid: &str) -> CanonicalMessage {
    let candidate = CanonicalMessage::new(
        message_type,
        uid,
        Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap(),
        37.7749,
        -122.4194,
    );
    match message_type {
        MessageType::Vmf => candidate.with_altitude(10.0).with_metadata("msg_type", 1i64),
        MessageType::Cot => candidate.with_metadata("callsign", "Alpha-1"),
    }
}

async fn wait_for_subscribers(publisher: &Publisher, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while publisher.subscriber_count() < count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("subscriber never attached");
}

#[tokio::test]
async fn test_tcp_publish_subscribe() {
    let publisher = Publisher::new(validator(), 64);
    let server = TcpPublisher::bind("127.0.0.1:0", publisher.clone())
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    let cancel = CancellationToken::new();
    let server_task = tokio::spawn(server.serve(cancel.clone()));

    let mut vmf_sub = TcpSubscription::connect(addr, TopicFilter::from(MessageType::Vmf), validator())
        .await
        .unwrap();
    let mut all_sub = TcpSubscription::connect(addr, TopicFilter::all(), validator())
        .await
        .unwrap();
    wait_for_subscribers(&publisher, 2).await;

    publisher.publish(message(MessageType::Cot, "cot-1")).unwrap();
    publisher.publish(message(MessageType::Vmf, "vmf-1")).unwrap();

    let received = vmf_sub.recv_timeout(Duration::from_secs(5)).await.unwrap();
    assert_eq!(received.uid, "vmf-1");
    assert_eq!(received.raw_metadata["msg_type"].as_i64(), Some(1));

    let first = all_sub.recv_timeout(Duration::from_secs(5)).await.unwrap();
    let second = all_sub.recv_timeout(Duration::from_secs(5)).await.unwrap();
    assert_eq!(first.uid, "cot-1");
    assert_eq!(second.uid, "vmf-1");
    assert_eq!(all_sub.stats().received, 2);

    cancel.cancel();
    server_task.await.unwrap().unwrap();
    assert!(vmf_sub.recv().await.unwrap().is_none());
}

#[tokio::test]
async fn test_disconnect_releases_subscription() {
    let publisher = Publisher::new(validator(), 8);
    let server = TcpPublisher::bind("127.0.0.1:0", publisher.clone())
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    let cancel = CancellationToken::new();
    tokio::spawn(server.serve(cancel.clone()));

    let sub = TcpSubscription::connect(addr, TopicFilter::all(), validator())
        .await
        .unwrap();
    wait_for_subscribers(&publisher, 1).await;

    // Nothing is published, so only the closed socket can end the session.
    drop(sub);
    tokio::time::timeout(Duration::from_secs(5), async {
        while publisher.subscriber_count() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("subscription outlived its connection");

    cancel.cancel();
}

#[tokio::test]
async fn test_subscriber_drops_bad_frames() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let validator = validator();
    let good = validator.validate(message(MessageType::Cot, "good")).unwrap();
    let good_frame = encode_frame(&good).unwrap();
    let mut out_of_range = good_frame.replace("37.7749", "97.7749");
    out_of_range.push('\n');

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut filter_line = [0u8; 16];
        let n = stream.read(&mut filter_line).await.unwrap();
        assert_eq!(&filter_line[..n], b"\n");

        stream.write_all(b"garbage without json\n").await.unwrap();
        stream.write_all(out_of_range.as_bytes()).await.unwrap();
        stream
            .write_all(format!("{good_frame}\n").as_bytes())
            .await
            .unwrap();
        stream.shutdown().await.unwrap();
    });

    let mut sub = TcpSubscription::connect(addr, TopicFilter::all(), validator)
        .await
        .unwrap();

    let received = sub.recv().await.unwrap().unwrap();
    assert_eq!(received.uid, "good");
    assert_eq!(sub.stats().rejected, 2);

    server.await.unwrap();
    assert!(sub.recv().await.unwrap().is_none());
}

#[tokio::test]
async fn test_receive_timeout() {
    let publisher = Publisher::new(validator(), 8);
    let server = TcpPublisher::bind("127.0.0.1:0", publisher.clone())
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    let cancel = CancellationToken::new();
    tokio::spawn(server.serve(cancel.clone()));

    let mut sub = TcpSubscription::connect(addr, TopicFilter::all(), validator())
        .await
        .unwrap();
    let err = sub
        .recv_timeout(Duration::from_millis(100))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "Stream");

    cancel.cancel();
}
