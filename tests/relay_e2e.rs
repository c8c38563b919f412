//! End-to-end tests: real listener, real WebSocket subscribers.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use strike_relay::api::{self, ApiConfig, ApiError, AppState};
use strike_relay::capture::{
    extract, CaptureError, CaptureEvent, CaptureSession, CaptureSource, CaptureSupervisor,
    SupervisorConfig,
};
use strike_relay::shutdown::{graceful_shutdown, ShutdownOutcome};
use strike_relay::websocket::{HubConfig, RelayHub};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Relay {
    addr: SocketAddr,
    hub: Arc<RelayHub>,
    shutdown: CancellationToken,
    server: JoinHandle<Result<(), ApiError>>,
}

async fn start_relay(hub_config: HubConfig) -> Relay {
    let hub = Arc::new(RelayHub::new(hub_config));
    let shutdown = CancellationToken::new();
    let config = ApiConfig::new("127.0.0.1", 0);

    let listener = api::bind(&config).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = AppState::new(Arc::clone(&hub), config, shutdown.clone());
    let server = tokio::spawn(api::serve(listener, state));

    Relay {
        addr,
        hub,
        shutdown,
        server,
    }
}

impl Relay {
    /// Connect a subscriber and wait until the hub has registered it
    async fn subscribe(&self, path: &str) -> Client {
        let expected = self.hub.connection_count().await + 1;
        let (client, _) = connect_async(format!("ws://{}{}", self.addr, path))
            .await
            .unwrap();
        wait_until(|| async { self.hub.connection_count().await >= expected }).await;
        client
    }
}

async fn wait_until<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn next_json(client: &mut Client) -> serde_json::Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("no message in time")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn assert_silent(client: &mut Client) {
    let result = tokio::time::timeout(Duration::from_millis(200), client.next()).await;
    assert!(result.is_err(), "expected no message, got {:?}", result);
}

/// True once the relay has closed this client
async fn closed_by_server(client: &mut Client) -> bool {
    let deadline = Duration::from_secs(2);
    tokio::time::timeout(deadline, async {
        loop {
            match client.next().await {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => return true,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await
    .unwrap_or(false)
}

#[tokio::test]
async fn test_subscribers_before_and_after_ingest() {
    let relay = start_relay(HubConfig {
        max_strikes: 1,
        send_backlog_on_connect: false,
        ..Default::default()
    })
    .await;

    let mut early = relay.subscribe("/").await;

    relay.hub.ingest(extract(r#"{"lat": 10, "lon": 20}"#).unwrap()).await;
    relay.hub.ingest(extract(r#"{"lat": -5, "lon": 40}"#).unwrap()).await;

    let first = next_json(&mut early).await;
    let second = next_json(&mut early).await;
    assert_eq!((first["lat"].as_f64(), first["lng"].as_f64()), (Some(10.0), Some(20.0)));
    assert_eq!((second["lat"].as_f64(), second["lng"].as_f64()), (Some(-5.0), Some(40.0)));

    let history = relay.hub.snapshot(10).await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].lat, -5.0);

    let mut late = relay.subscribe("/ws").await;
    assert_silent(&mut late).await;
}

#[tokio::test]
async fn test_backlog_sent_on_connect() {
    let relay = start_relay(HubConfig::default()).await;

    relay.hub.ingest(extract(r#"{"lat": 1, "lon": 2}"#).unwrap()).await;
    relay.hub.ingest(extract(r#"{"lat": 3, "lon": 4}"#).unwrap()).await;

    let mut client = relay.subscribe("/").await;
    let backlog = next_json(&mut client).await;

    assert_eq!(backlog["type"], "initial");
    let strikes = backlog["strikes"].as_array().unwrap();
    assert_eq!(strikes.len(), 2);
    assert_eq!(strikes[0]["lat"], 3.0);
    assert_eq!(strikes[1]["lat"], 1.0);

    relay.hub.ingest(extract(r#"{"lat": 5, "lon": 6}"#).unwrap()).await;
    assert_eq!(next_json(&mut client).await["lat"], 5.0);
}

#[tokio::test]
async fn test_disconnected_subscriber_is_removed() {
    let relay = start_relay(HubConfig::default()).await;

    let mut stays = relay.subscribe("/").await;
    let mut leaves = relay.subscribe("/").await;
    leaves.close(None).await.unwrap();

    wait_until(|| async { relay.hub.connection_count().await == 1 }).await;

    relay.hub.ingest(extract(r#"{"lat": 1, "lon": 1}"#).unwrap()).await;
    assert_eq!(next_json(&mut stays).await["lat"], 1.0);
}

#[tokio::test]
async fn test_shutdown_disconnects_all_subscribers() {
    let relay = start_relay(HubConfig::default()).await;

    let mut clients = Vec::new();
    for _ in 0..3 {
        clients.push(relay.subscribe("/").await);
    }
    assert_eq!(relay.hub.connection_count().await, 3);

    let server = relay.server;
    let started = std::time::Instant::now();
    let outcome = graceful_shutdown(
        &relay.shutdown,
        &relay.hub,
        async move {
            let _ = server.await;
        },
        Duration::from_secs(2),
    )
    .await;

    assert_eq!(outcome, ShutdownOutcome::Completed);
    assert!(started.elapsed() < Duration::from_secs(2));

    for client in clients.iter_mut() {
        assert!(closed_by_server(client).await);
    }
    assert_eq!(relay.hub.connection_count().await, 0);

    // Listener is gone
    assert!(connect_async(format!("ws://{}/", relay.addr)).await.is_err());
}

/// Source that replays fixed payloads once, then holds the session open
struct ReplaySource {
    payloads: Mutex<Option<Vec<String>>>,
}

struct ReplaySession {
    payloads: std::vec::IntoIter<String>,
}

#[async_trait]
impl CaptureSource for ReplaySource {
    fn name(&self) -> &str {
        "replay"
    }

    async fn start(&self) -> Result<Box<dyn CaptureSession>, CaptureError> {
        let payloads = self.payloads.lock().unwrap().take().unwrap_or_default();
        Ok(Box::new(ReplaySession {
            payloads: payloads.into_iter(),
        }))
    }
}

#[async_trait]
impl CaptureSession for ReplaySession {
    async fn next_event(&mut self) -> Result<CaptureEvent, CaptureError> {
        match self.payloads.next() {
            Some(p) => Ok(CaptureEvent::Payload(p)),
            None => std::future::pending().await,
        }
    }
}

#[tokio::test]
async fn test_encoded_frames_reach_subscribers() {
    let relay = start_relay(HubConfig {
        send_backlog_on_connect: false,
        ..Default::default()
    })
    .await;
    let mut client = relay.subscribe("/").await;

    // `{"lat":1,"lon":1}` with the second `":` sent as a dictionary code
    let mut units: Vec<u16> = r#"{"lat":1,"lon"#.encode_utf16().collect();
    let colon_one = 256 + 5; // `":` defined while reading `:`
    units.push(colon_one);
    units.push(b'1' as u16);
    units.push(b'}' as u16);
    let encoded = String::from_utf16(&units).unwrap();

    let source = Arc::new(ReplaySource {
        payloads: Mutex::new(Some(vec!["not a strike".to_string(), encoded])),
    });
    let supervisor =
        CaptureSupervisor::new(source, Arc::clone(&relay.hub), SupervisorConfig::default());
    let stats = supervisor.stats();
    let handle = supervisor.start(relay.shutdown.clone());

    let strike = next_json(&mut client).await;
    assert_eq!(strike["lat"], 1.0);
    assert_eq!(strike["lng"], 1.0);
    assert!(strike["id"].as_str().unwrap().starts_with("strike-"));

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.rejected, 1);
    assert_eq!(snapshot.strikes, 1);

    relay.shutdown.cancel();
    handle.await.unwrap();
}
