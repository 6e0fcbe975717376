//! End-to-end responder behavior over an in-memory datagram bus.
//!
//! The bus mirrors multicast semantics: every datagram sent by any endpoint
//! is delivered to every endpoint, including the sender.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;

use groupcast::{
    Config, DatagramTransport, InboundMessage, Payload, RecvFailure, Rejection, Responder,
    ResponderError, TransportError,
};

#[derive(Clone, Default)]
struct LoopbackBus {
    inboxes: Arc<Mutex<Vec<mpsc::UnboundedSender<(Vec<u8>, SocketAddr)>>>>,
}

impl LoopbackBus {
    fn endpoint(&self, addr: SocketAddr) -> LoopbackTransport {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inboxes.lock().push(tx);
        let (shutdown_tx, _) = watch::channel(false);
        LoopbackTransport {
            addr,
            bus: self.clone(),
            rx: tokio::sync::Mutex::new(rx),
            open: Mutex::new(Phase::Unopened),
            shutdown_tx,
        }
    }

    fn deliver(&self, bytes: &[u8], from: SocketAddr) {
        for tx in self.inboxes.lock().iter() {
            let _ = tx.send((bytes.to_vec(), from));
        }
    }
}

enum Phase {
    Unopened,
    Open,
    Closed,
}

struct LoopbackTransport {
    addr: SocketAddr,
    bus: LoopbackBus,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<(Vec<u8>, SocketAddr)>>,
    open: Mutex<Phase>,
    shutdown_tx: watch::Sender<bool>,
}

impl LoopbackTransport {
    fn check_open(&self) -> Result<(), TransportError> {
        match &*self.open.lock() {
            Phase::Unopened => Err(TransportError::NotOpen),
            Phase::Open => Ok(()),
            Phase::Closed => Err(TransportError::Closed),
        }
    }
}

#[async_trait]
impl DatagramTransport for LoopbackTransport {
    async fn open(&self) -> Result<(), TransportError> {
        let mut phase = self.open.lock();
        match &*phase {
            Phase::Unopened => {
                *phase = Phase::Open;
                Ok(())
            }
            Phase::Open => Err(TransportError::AlreadyOpen),
            Phase::Closed => Err(TransportError::Closed),
        }
    }

    async fn recv(&self) -> Result<(Vec<u8>, SocketAddr), TransportError> {
        self.check_open()?;
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut rx = self.rx.lock().await;
        tokio::select! {
            _ = shutdown_rx.wait_for(|closed| *closed) => Err(TransportError::Closed),
            received = rx.recv() => received.ok_or(TransportError::Closed),
        }
    }

    async fn send_to(&self, bytes: &[u8], _target: SocketAddr) -> Result<(), TransportError> {
        self.check_open()?;
        self.bus.deliver(bytes, self.addr);
        Ok(())
    }

    fn close(&self) {
        *self.open.lock() = Phase::Closed;
        let _ = self.shutdown_tx.send(true);
    }
}

fn addr(port: u16) -> SocketAddr {
    format!("127.0.0.1:{port}").parse().unwrap()
}

fn responder_on(bus: &LoopbackBus, port: u16, secret: &str) -> Responder<LoopbackTransport> {
    let config = Config {
        secret: secret.into(),
        ..Config::default()
    };
    let (responder, warnings) =
        Responder::with_transport(config, bus.endpoint(addr(port))).unwrap();
    assert!(warnings.is_empty());
    responder
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 2s");
}

#[tokio::test]
async fn peers_with_the_shared_secret_receive_and_outsiders_reject() {
    let bus = LoopbackBus::default();
    let alice = responder_on(&bus, 4001, "k");
    let bob = responder_on(&bus, 4002, "k");
    let carol = responder_on(&bus, 4003, "other");

    let received: Arc<Mutex<Vec<(InboundMessage, SocketAddr)>>> = Arc::default();
    let sink = received.clone();
    bob.on_message(move |message, sender| sink.lock().push((message.clone(), sender)));

    let rejections: Arc<Mutex<Vec<Rejection>>> = Arc::default();
    let sink = rejections.clone();
    carol.on_error(move |failure| {
        if let RecvFailure::Rejection { rejection, .. } = failure {
            sink.lock().push(rejection.clone());
        }
    });

    alice.open().await.unwrap();
    bob.open().await.unwrap();
    carol.open().await.unwrap();

    alice
        .broadcast("HELLO", Payload::Json(serde_json::json!({"name": "Joe"})))
        .await
        .unwrap();

    wait_until(|| !received.lock().is_empty()).await;
    wait_until(|| !rejections.lock().is_empty()).await;

    let (message, sender) = received.lock()[0].clone();
    assert_eq!(message.command, "HELLO");
    assert_eq!(
        message.payload,
        Payload::Json(serde_json::json!({"name": "Joe"}))
    );
    assert_eq!(sender, addr(4001));

    assert_eq!(rejections.lock()[0], Rejection::InvalidSignature);
}

#[tokio::test]
async fn rejections_carry_the_partial_frame_and_sender() {
    let bus = LoopbackBus::default();
    let alice = responder_on(&bus, 4011, "k");
    let carol = responder_on(&bus, 4012, "other");

    let frames: Arc<Mutex<Vec<(String, SocketAddr)>>> = Arc::default();
    let sink = frames.clone();
    carol.on_error(move |failure| {
        if let RecvFailure::Rejection { frame, sender, .. } = failure {
            sink.lock().push((frame.command.clone(), *sender));
        }
    });

    alice.open().await.unwrap();
    carol.open().await.unwrap();
    alice.broadcast("PING", Payload::Text("x".into())).await.unwrap();

    wait_until(|| !frames.lock().is_empty()).await;
    assert_eq!(frames.lock()[0], ("PING".to_string(), addr(4011)));
}

#[tokio::test]
async fn payloads_containing_the_delimiter_survive_the_full_path() {
    let bus = LoopbackBus::default();
    let alice = responder_on(&bus, 4021, "k");
    let bob = responder_on(&bus, 4022, "k");

    let received: Arc<Mutex<Vec<Payload>>> = Arc::default();
    let sink = received.clone();
    bob.on_message(move |message, _| sink.lock().push(message.payload.clone()));

    alice.open().await.unwrap();
    bob.open().await.unwrap();
    alice
        .broadcast("RAW", Payload::Text("left|middle|right".into()))
        .await
        .unwrap();

    wait_until(|| !received.lock().is_empty()).await;
    assert_eq!(received.lock()[0], Payload::Text("left|middle|right".into()));
}

#[tokio::test]
async fn empty_command_fails_synchronously_even_with_no_error_subscribers() {
    let bus = LoopbackBus::default();
    let alice = responder_on(&bus, 4031, "k");
    alice.open().await.unwrap();

    let err = alice.broadcast("", Payload::Text("x".into())).await.unwrap_err();
    assert!(matches!(err, ResponderError::CommandEmpty));
}

#[tokio::test]
async fn bad_signature_with_no_error_subscribers_is_silently_dropped() {
    let bus = LoopbackBus::default();
    let alice = responder_on(&bus, 4041, "other-secret");
    let bob = responder_on(&bus, 4042, "k");

    let messages = Arc::new(AtomicUsize::new(0));
    let counter = messages.clone();
    bob.on_message(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    alice.open().await.unwrap();
    bob.open().await.unwrap();

    // No error subscribers on bob; the rejection must vanish without a crash.
    alice.broadcast("HELLO", Payload::Text("x".into())).await.unwrap();
    sleep(Duration::from_millis(100)).await;
    assert_eq!(messages.load(Ordering::SeqCst), 0);

    // The pipeline keeps running for later, valid traffic.
    let charlie = responder_on(&bus, 4043, "k");
    charlie.open().await.unwrap();
    charlie.broadcast("HELLO", Payload::Text("x".into())).await.unwrap();
    wait_until(|| messages.load(Ordering::SeqCst) == 1).await;
}

#[tokio::test]
async fn broadcast_before_open_surfaces_a_transport_error() {
    let bus = LoopbackBus::default();
    let alice = responder_on(&bus, 4051, "k");
    let err = alice.broadcast("HELLO", Payload::Text("x".into())).await.unwrap_err();
    assert!(matches!(
        err,
        ResponderError::Transport(TransportError::NotOpen)
    ));
}

#[tokio::test]
async fn lifecycle_events_fire_and_closed_is_terminal() {
    let bus = LoopbackBus::default();
    let alice = responder_on(&bus, 4061, "k");

    let opened = Arc::new(AtomicUsize::new(0));
    let closed = Arc::new(AtomicUsize::new(0));
    let counter = opened.clone();
    alice.on_opened(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let counter = closed.clone();
    alice.on_closed(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    alice.open().await.unwrap();
    assert_eq!(opened.load(Ordering::SeqCst), 1);

    alice.close().await;
    assert_eq!(closed.load(Ordering::SeqCst), 1);

    let err = alice.broadcast("HELLO", Payload::Text("x".into())).await.unwrap_err();
    assert!(matches!(
        err,
        ResponderError::Transport(TransportError::Closed)
    ));
}

#[tokio::test]
async fn message_subscribers_run_in_registration_order() {
    let bus = LoopbackBus::default();
    let alice = responder_on(&bus, 4071, "k");
    let bob = responder_on(&bus, 4072, "k");

    let order: Arc<Mutex<Vec<&'static str>>> = Arc::default();
    for tag in ["first", "second"] {
        let order = order.clone();
        bob.on_message(move |_, _| order.lock().push(tag));
    }

    alice.open().await.unwrap();
    bob.open().await.unwrap();
    alice.broadcast("HELLO", Payload::Text("x".into())).await.unwrap();

    wait_until(|| order.lock().len() == 2).await;
    assert_eq!(*order.lock(), vec!["first", "second"]);
}
