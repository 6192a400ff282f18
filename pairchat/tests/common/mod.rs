//! Fakes for the transport, engine and capture seams shared by the
//! integration suites

#![allow(dead_code)]

use async_trait::async_trait;
use pairchat::*;
use pairchat_signaling::{InboundSignal, MatchedPayload};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

// ----- capture -----

#[derive(Debug)]
pub struct FakeCapture {
    id: String,
    audio: AtomicBool,
    video: AtomicBool,
    stopped: AtomicBool,
}

impl FakeCapture {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            audio: AtomicBool::new(true),
            video: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
        })
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl MediaSource for FakeCapture {
    fn id(&self) -> &str {
        &self.id
    }

    fn track_enabled(&self, kind: TrackKind) -> Option<bool> {
        Some(match kind {
            TrackKind::Audio => self.audio.load(Ordering::SeqCst),
            TrackKind::Video => self.video.load(Ordering::SeqCst),
        })
    }

    fn set_track_enabled(&self, kind: TrackKind, enabled: bool) -> bool {
        match kind {
            TrackKind::Audio => self.audio.store(enabled, Ordering::SeqCst),
            TrackKind::Video => self.video.store(enabled, Ordering::SeqCst),
        }
        true
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakeDevices {
    pub deny: AtomicBool,
    pub captures: Mutex<Vec<Arc<FakeCapture>>>,
}

impl FakeDevices {
    pub fn acquired(&self) -> usize {
        self.captures.lock().len()
    }
}

#[async_trait]
impl MediaDevices for FakeDevices {
    async fn acquire(
        &self,
        _constraints: &MediaConstraints,
    ) -> Result<Arc<dyn MediaSource>, PairChatError> {
        if self.deny.load(Ordering::SeqCst) {
            return Err(PairChatError::MediaUnavailable {
                reason: "NotAllowedError: permission denied".to_string(),
            });
        }
        let mut captures = self.captures.lock();
        let capture = FakeCapture::new(&format!("capture-{}", captures.len()));
        captures.push(capture.clone());
        Ok(capture)
    }
}

// ----- engine -----

/// Test-side view of one engine instance
#[derive(Clone)]
pub struct EngineProbe {
    pub role: Role,
    pub sink: EngineEventSink,
    pub applied: Arc<Mutex<Vec<SignalPayload>>>,
    pub closed: Arc<AtomicBool>,
}

impl EngineProbe {
    pub fn applied_seqs(&self) -> Vec<u64> {
        self.applied
            .lock()
            .iter()
            .filter_map(|p| p.as_value()["seq"].as_u64())
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

pub struct FakeEngine {
    probe: EngineProbe,
    live: Arc<AtomicUsize>,
}

impl FakeEngine {
    pub fn new(role: Role, sink: EngineEventSink, live: Arc<AtomicUsize>) -> (Self, EngineProbe) {
        live.fetch_add(1, Ordering::SeqCst);
        let probe = EngineProbe {
            role,
            sink,
            applied: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
        };
        (
            Self {
                probe: probe.clone(),
                live,
            },
            probe,
        )
    }
}

impl NegotiationEngine for FakeEngine {
    fn signal(&mut self, payload: SignalPayload) -> Result<(), PairChatError> {
        self.probe.applied.lock().push(payload);
        Ok(())
    }

    fn close(&mut self) {
        if !self.probe.closed.swap(true, Ordering::SeqCst) {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
        // A real engine fires its close callback while being torn down
        self.probe.sink.emit(EngineEvent::Closed);
    }
}

#[derive(Default)]
pub struct FakeFactory {
    pub fail: AtomicBool,
    pub live: Arc<AtomicUsize>,
    pub max_live: AtomicUsize,
    pub engines: Mutex<Vec<EngineProbe>>,
}

impl FakeFactory {
    pub fn engine(&self, index: usize) -> Option<EngineProbe> {
        self.engines.lock().get(index).cloned()
    }

    pub fn created(&self) -> usize {
        self.engines.lock().len()
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EngineFactory for FakeFactory {
    async fn create(
        &self,
        config: EngineConfig,
        _media: Arc<dyn MediaSource>,
        events: EngineEventSink,
    ) -> Result<Box<dyn NegotiationEngine>, PairChatError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PairChatError::EngineLoadFailure {
                reason: "engine module unavailable".to_string(),
            });
        }
        let (engine, probe) = FakeEngine::new(config.role, events.clone(), self.live.clone());
        self.max_live
            .fetch_max(self.live.load(Ordering::SeqCst), Ordering::SeqCst);
        if config.role.is_initiator() {
            events.emit(EngineEvent::Signal(SignalPayload::new(
                json!({"type": "offer", "sdp": "v=0"}),
            )));
        }
        self.engines.lock().push(probe);
        Ok(Box::new(engine))
    }
}

// ----- transport -----

#[derive(Default)]
pub struct FakeTransport {
    pub sent: Mutex<Vec<ClientEvent>>,
    pub fail: AtomicBool,
    pub closed: AtomicBool,
}

impl FakeTransport {
    pub fn sent_names(&self) -> Vec<&'static str> {
        self.sent.lock().iter().map(|e| e.event_name()).collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.sent_names().iter().filter(|n| **n == name).count()
    }
}

#[async_trait]
impl RealtimeTransport for FakeTransport {
    async fn send(&self, event: ClientEvent) -> Result<(), PairChatError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PairChatError::Transport {
                reason: "socket closed".to_string(),
            });
        }
        self.sent.lock().push(event);
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

// ----- wire helpers -----

pub fn matched(room: &str, initiator: bool) -> ServerEvent {
    ServerEvent::Matched(MatchedPayload {
        partner_info: ParticipantIdentity::new("Bee").with_id("bee"),
        room_id: room.into(),
        initiator,
    })
}

pub fn signal_for(room: &str, seq: u64) -> ServerEvent {
    ServerEvent::Signal(InboundSignal::Wrapped {
        signal: SignalPayload::new(json!({ "seq": seq })),
        room_id: Some(room.into()),
        sender_id: Some("bee".to_string()),
    })
}

pub fn identity() -> ParticipantIdentity {
    ParticipantIdentity::new("Ann").with_id("ann")
}

// ----- running sessions -----

pub struct TestSession {
    pub session: Session,
    pub transport: Arc<FakeTransport>,
    pub server: mpsc::UnboundedSender<TransportEvent>,
    pub factory: Arc<FakeFactory>,
    pub devices: Arc<FakeDevices>,
}

impl TestSession {
    pub fn spawn(config: SessionConfig) -> Self {
        let transport = Arc::new(FakeTransport::default());
        let factory = Arc::new(FakeFactory::default());
        let devices = Arc::new(FakeDevices::default());
        let (server, events) = mpsc::unbounded_channel();

        let session = SessionBuilder::new()
            .identity(identity())
            .transport(transport.clone(), events)
            .engine_factory(factory.clone())
            .media_devices(devices.clone())
            .config(config)
            .spawn()
            .expect("session should start");

        Self {
            session,
            transport,
            server,
            factory,
            devices,
        }
    }

    pub fn handle(&self) -> &SessionHandle {
        &self.session.handle
    }

    pub fn deliver(&self, event: ServerEvent) {
        self.server
            .send(TransportEvent::Message(event))
            .expect("controller should be running");
    }

    /// Wait for the first event matching `pred`, skipping others
    pub async fn expect_event<F>(&mut self, pred: F) -> SessionEvent
    where
        F: Fn(&SessionEvent) -> bool,
    {
        self.expect_event_within(Duration::from_secs(5), pred).await
    }

    pub async fn expect_event_within<F>(&mut self, limit: Duration, pred: F) -> SessionEvent
    where
        F: Fn(&SessionEvent) -> bool,
    {
        let events = &mut self.session.events;
        tokio::time::timeout(limit, async {
            loop {
                match events.next().await {
                    Some(event) if pred(&event) => return event,
                    Some(_) => continue,
                    None => panic!("event stream closed"),
                }
            }
        })
        .await
        .expect("timed out waiting for event")
    }

    pub async fn wait_for_state(&mut self, state: SessionState) -> SessionSnapshot {
        let handle = self.session.handle.clone();
        tokio::time::timeout(Duration::from_secs(5), async move {
            loop {
                let snapshot = handle.snapshot().await.expect("controller alive");
                if snapshot.state == state {
                    return snapshot;
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("timed out waiting for state")
    }

    /// Drive the session to `Connected` in `room` and return its engine
    pub async fn connect(&mut self, room: &str, initiator: bool) -> EngineProbe {
        if self.handle().snapshot().await.unwrap().state != SessionState::Queued {
            self.handle().request_match(MatchFilters::any()).await.unwrap();
        }
        let before = self.factory.created();
        self.deliver(matched(room, initiator));

        let probe = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Some(probe) = self.factory.engine(before) {
                    return probe;
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("engine was not built");

        let snapshot = self.wait_for_engine().await;
        assert_eq!(snapshot.room_id, Some(RoomId::from(room)));

        assert!(probe.sink.emit(EngineEvent::Connected));
        self.expect_event(|e| matches!(e, SessionEvent::Connected { .. }))
            .await;
        probe
    }

    async fn wait_for_engine(&self) -> SessionSnapshot {
        let handle = self.session.handle.clone();
        tokio::time::timeout(Duration::from_secs(5), async move {
            loop {
                let snapshot = handle.snapshot().await.expect("controller alive");
                if snapshot.engine_live {
                    return snapshot;
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("engine never registered")
    }
}

pub fn fast_config() -> SessionConfig {
    SessionConfig::default().rematch_delay(Duration::from_millis(10))
}
