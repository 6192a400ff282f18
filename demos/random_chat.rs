//! Random chat against a running coordinator
//!
//! Connects to the coordinator, asks for a partner, says hello once the
//! peers are connected and skips to the next partner after a while.
//! Media and negotiation are stand-ins that only log what they would do.
//!
//! ```text
//! cargo run --example random_chat -- ws://localhost:3000/ws Ann
//! ```

use anyhow::Context;
use async_trait::async_trait;
use pairchat::{
    init_logging, EngineConfig, EngineEvent, EngineEventSink, EngineFactory, MatchFilters,
    MediaConstraints, MediaDevices, MediaSource, NegotiationEngine, PairChatError,
    ParticipantIdentity, SessionBuilder, SessionEvent, SignalPayload, TrackKind,
};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Capture that holds no real device
#[derive(Debug)]
struct PretendCamera {
    audio: AtomicBool,
    video: AtomicBool,
}

impl MediaSource for PretendCamera {
    fn id(&self) -> &str {
        "pretend-camera"
    }

    fn track_enabled(&self, kind: TrackKind) -> Option<bool> {
        Some(match kind {
            TrackKind::Audio => self.audio.load(Ordering::Relaxed),
            TrackKind::Video => self.video.load(Ordering::Relaxed),
        })
    }

    fn set_track_enabled(&self, kind: TrackKind, enabled: bool) -> bool {
        match kind {
            TrackKind::Audio => self.audio.store(enabled, Ordering::Relaxed),
            TrackKind::Video => self.video.store(enabled, Ordering::Relaxed),
        }
        true
    }

    fn stop(&self) {
        println!("📷 Camera released");
    }
}

struct PretendDevices;

#[async_trait]
impl MediaDevices for PretendDevices {
    async fn acquire(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<Arc<dyn MediaSource>, PairChatError> {
        println!(
            "📷 Opening camera (audio: {}, video: {})",
            constraints.audio,
            constraints.video
        );
        Ok(Arc::new(PretendCamera {
            audio: AtomicBool::new(true),
            video: AtomicBool::new(true),
        }))
    }
}

/// Engine that prints payloads and declares itself connected on the
/// first one it receives
struct LoggingEngine {
    events: EngineEventSink,
    connected: bool,
}

impl NegotiationEngine for LoggingEngine {
    fn signal(&mut self, payload: SignalPayload) -> Result<(), PairChatError> {
        println!("   ⬇️ signal {}", payload.as_value());
        if !self.connected {
            self.connected = true;
            self.events.emit(EngineEvent::Connected);
        }
        Ok(())
    }

    fn close(&mut self) {
        println!("   🔌 engine closed");
        self.events.emit(EngineEvent::Closed);
    }
}

struct LoggingEngines;

#[async_trait]
impl EngineFactory for LoggingEngines {
    async fn create(
        &self,
        config: EngineConfig,
        _media: Arc<dyn MediaSource>,
        events: EngineEventSink,
    ) -> Result<Box<dyn NegotiationEngine>, PairChatError> {
        println!(
            "⚙️ Building engine as {:?} with {} ICE servers",
            config.role,
            config.ice_servers.len()
        );
        if config.role.is_initiator() {
            events.emit(EngineEvent::Signal(SignalPayload::new(
                json!({"type": "offer", "sdp": "v=0"}),
            )));
        }
        Ok(Box::new(LoggingEngine {
            events,
            connected: false,
        }))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging("pairchat=info");

    let mut args = std::env::args().skip(1);
    let url = args
        .next()
        .unwrap_or_else(|| "ws://localhost:3000/ws".to_string());
    let username = args.next().unwrap_or_else(|| "Guest".to_string());

    println!("🎲 PairChat random chat demo");
    println!("   coordinator: {}", url);
    println!("   username:    {}", username);

    let mut session = SessionBuilder::new()
        .identity(ParticipantIdentity::new(username))
        .engine_factory(Arc::new(LoggingEngines))
        .media_devices(Arc::new(PretendDevices))
        .rematch_delay(Duration::from_secs(1))
        .websocket(&url)
        .await
        .with_context(|| format!("connecting to {}", url))?
        .spawn()?;

    session.handle.request_match(MatchFilters::any()).await?;

    let handle = session.handle.clone();
    let mut partners = 0;
    loop {
        tokio::select! {
            event = session.events.next() => {
                let Some(event) = event else { break };
                match &event {
                    SessionEvent::PartnerMatched { partner } => {
                        partners += 1;
                        println!("🤝 Partner #{}: {}", partners, partner.username());
                    }
                    SessionEvent::Connected { room_id } => {
                        println!("✅ Connected in {}", room_id);
                        if let Err(e) = handle.send_chat("hi 👋").await {
                            println!("❌ {}", e);
                        }
                        let skipper = handle.clone();
                        tokio::spawn(async move {
                            tokio::time::sleep(Duration::from_secs(20)).await;
                            let _ = skipper.skip().await;
                        });
                    }
                    SessionEvent::ChatMessage { message } => {
                        println!("💬 {}: {}", message.sender, message.text);
                    }
                    SessionEvent::PartnerLeft { notice } => println!("👋 {}", notice),
                    SessionEvent::SessionEnded { reason } => println!("🏁 Ended: {}", reason),
                    SessionEvent::AttemptFinished { summary } => {
                        println!("📊 {}", summary.to_json());
                    }
                    SessionEvent::Error { code, error, .. } => {
                        println!("❌ {}: {}", code, error);
                    }
                    other => println!("   {}", other.event_type()),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("👋 Leaving");
                break;
            }
        }
    }

    handle.shutdown().await.ok();
    session.task.await.context("controller task")?;
    Ok(())
}
