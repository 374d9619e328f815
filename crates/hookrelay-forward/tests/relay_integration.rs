#![allow(clippy::unwrap_used)] // Integration tests use unwrap for brevity

//! Full relay path: webhook into a broker, through the forwarding client,
//! out to a local target.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, Uri};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

use hookrelay_broker::{BrokerConfig, BrokerHandle};
use hookrelay_forward::{ClientState, ForwardClient, ForwardConfig};

const TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
struct Seen {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
}

async fn record(
    State(tx): State<mpsc::UnboundedSender<Seen>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> &'static str {
    let _ = tx.send(Seen {
        method,
        uri,
        headers,
        body,
    });
    "ok"
}

async fn boot_target() -> (String, mpsc::UnboundedReceiver<Seen>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let router = Router::new().fallback(record).with_state(tx);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    (format!("http://{addr}"), rx)
}

async fn boot_broker() -> (BrokerHandle, oneshot::Sender<()>) {
    let (tx, rx) = oneshot::channel::<()>();
    let config = BrokerConfig::new(SocketAddr::from(([127, 0, 0, 1], 0)));
    let handle = hookrelay_broker::start(&config, async {
        let _ = rx.await;
    })
    .await
    .unwrap();
    (handle, tx)
}

async fn wait_for_subscribers(broker: &BrokerHandle, channel: &str, n: usize) {
    timeout(TIMEOUT, async {
        while broker.hub().subscribers(channel).await.unwrap().len() != n {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

async fn next_seen(rx: &mut mpsc::UnboundedReceiver<Seen>) -> Seen {
    timeout(TIMEOUT, rx.recv()).await.unwrap().unwrap()
}

#[tokio::test]
async fn webhook_is_replayed_against_target_until_interrupted() {
    let (broker, _stop_broker) = boot_broker().await;
    let (target_url, mut seen) = boot_target().await;

    let config =
        ForwardConfig::new(broker.local_addr().to_string(), "orders", &target_url).unwrap();
    let client = Arc::new(ForwardClient::new(config).unwrap());
    let mut state = client.subscribe_state();
    let (interrupt, interrupted) = oneshot::channel::<()>();
    let running = tokio::spawn({
        let client = Arc::clone(&client);
        async move {
            client
                .run(async {
                    let _ = interrupted.await;
                })
                .await
        }
    });
    wait_for_subscribers(&broker, "orders", 1).await;

    let http = reqwest::Client::new();
    let base = format!("http://{}", broker.local_addr());
    let resp = http
        .post(format!("{base}/orders"))
        .header("X-Test", "1")
        .header("Content-Type", "application/json")
        .body("{x:1}")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.text().await.unwrap(), "Event sent");

    let post = next_seen(&mut seen).await;
    assert_eq!(post.method, Method::POST);
    assert_eq!(post.uri.path(), "/");
    assert_eq!(post.uri.query(), None);
    assert_eq!(post.headers["x-test"], "1");
    assert_eq!(post.headers["content-type"], "application/json");
    assert_eq!(&post.body[..], b"{x:1}");

    http.get(format!("{base}/orders?a=1&a=2"))
        .send()
        .await
        .unwrap();
    let get = next_seen(&mut seen).await;
    assert_eq!(get.method, Method::GET);
    assert_eq!(get.uri.query(), Some("a=1&a=2"));
    assert!(get.body.is_empty());

    interrupt.send(()).unwrap();
    timeout(TIMEOUT, running).await.unwrap().unwrap().unwrap();
    assert_eq!(*state.borrow_and_update(), ClientState::Closed);
    wait_for_subscribers(&broker, "orders", 0).await;

    let stats = client.replayer().stats().snapshot();
    assert_eq!(stats.received, 2);
    assert_eq!(stats.malformed, 0);
}
