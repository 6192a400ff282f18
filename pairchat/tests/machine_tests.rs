//! Scenario tests for the sans-IO session machine
//!
//! The machine is driven by hand: completions for media and engine
//! construction are injected directly, so races such as signals arriving
//! before the engine exists can be reproduced exactly.

mod common;

use common::*;
use pairchat::*;
use pairchat_signaling::{ChatPayload, JoinRequest};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_test::{assert_err, assert_ok};

struct Harness {
    machine: SessionMachine,
    engine_tx: mpsc::UnboundedSender<EngineNotification>,
    engine_rx: mpsc::UnboundedReceiver<EngineNotification>,
    live: Arc<AtomicUsize>,
    capture: Arc<FakeCapture>,
}

impl Harness {
    fn new(config: SessionConfig) -> Self {
        let (engine_tx, engine_rx) = mpsc::unbounded_channel();
        Self {
            machine: SessionMachine::new(identity(), config),
            engine_tx,
            engine_rx,
            live: Arc::new(AtomicUsize::new(0)),
            capture: FakeCapture::new("cam"),
        }
    }

    fn immediate() -> Self {
        Self::new(SessionConfig::default().rematch_delay(Duration::ZERO))
    }

    fn drain(&mut self) -> Vec<Output> {
        self.machine.drain_outputs()
    }

    fn transmitted(&mut self) -> Vec<ClientEvent> {
        self.drain()
            .into_iter()
            .filter_map(|o| match o {
                Output::Transmit(event) => Some(event),
                _ => None,
            })
            .collect()
    }

    fn queue(&mut self) {
        assert_ok!(self.machine.request_match(MatchFilters::any()));
    }

    fn pair(&mut self, room: &str, initiator: bool) {
        self.machine.handle_server_event(matched(room, initiator));
    }

    fn media_ready(&mut self) {
        let generation = self.machine.generation();
        self.machine
            .handle_media_ready(generation, self.capture.clone());
    }

    fn engine_ready(&mut self) -> EngineProbe {
        let generation = self.machine.generation();
        self.engine_ready_for(generation)
    }

    fn engine_ready_for(&mut self, generation: Generation) -> EngineProbe {
        let role = self
            .machine
            .partner()
            .map(|p| p.local_role())
            .unwrap_or(Role::Responder);
        let sink = EngineEventSink::new(generation, self.engine_tx.clone());
        let (engine, probe) = FakeEngine::new(role, sink.clone(), self.live.clone());
        self.machine
            .handle_engine_ready(generation, Box::new(engine), sink);
        probe
    }

    /// Forward everything engines emitted into the machine
    fn pump(&mut self) {
        while let Ok(notification) = self.engine_rx.try_recv() {
            self.machine.handle_engine_event(notification);
        }
    }

    fn connect(&mut self, room: &str, initiator: bool) -> EngineProbe {
        if self.machine.state() != SessionState::Queued {
            self.queue();
        }
        self.pair(room, initiator);
        if self.machine.state() == SessionState::Matched {
            self.media_ready();
        }
        let probe = self.engine_ready();
        assert!(probe.sink.emit(EngineEvent::Connected));
        self.pump();
        assert_eq!(self.machine.state(), SessionState::Connected);
        probe
    }

    fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

fn events(outputs: &[Output]) -> Vec<&SessionEvent> {
    outputs
        .iter()
        .filter_map(|o| match o {
            Output::Emit(event) => Some(event),
            _ => None,
        })
        .collect()
}

fn error_code(outputs: &[Output]) -> Option<(String, bool)> {
    events(outputs).into_iter().find_map(|e| match e {
        SessionEvent::Error {
            code, recoverable, ..
        } => Some((code.clone(), *recoverable)),
        _ => None,
    })
}

#[test]
fn test_match_then_negotiate() {
    let mut h = Harness::immediate();
    let filters = MatchFilters::any().gender(GenderPreference::Female);
    assert_ok!(h.machine.request_match(filters.clone()));

    assert_eq!(
        h.transmitted(),
        vec![ClientEvent::JoinVideoChat(JoinRequest {
            user_info: identity(),
            filters,
        })]
    );

    h.pair("r1", true);
    assert_eq!(h.machine.state(), SessionState::Matched);
    let outputs = h.drain();
    assert!(outputs
        .iter()
        .any(|o| matches!(o, Output::AcquireMedia { .. })));
    assert_eq!(h.machine.partner().unwrap().username(), "Bee");

    h.media_ready();
    assert_eq!(h.machine.state(), SessionState::Negotiating);
    let outputs = h.drain();
    let changes: Vec<_> = events(&outputs)
        .into_iter()
        .filter_map(|e| match e {
            SessionEvent::StateChanged { from, to } => Some((*from, *to)),
            _ => None,
        })
        .collect();
    assert_eq!(
        changes,
        vec![(SessionState::Matched, SessionState::Negotiating)]
    );

    let build = outputs.iter().find_map(|o| match o {
        Output::BuildEngine { config, .. } => Some(config.clone()),
        _ => None,
    });
    let config = build.expect("engine requested");
    assert_eq!(config.role, Role::Initiator);
    assert!(config.trickle);
    assert_eq!(config.ice_servers.len(), 5);
    assert!(outputs.iter().any(|o| matches!(
        o,
        Output::ArmNegotiationTimer { after, .. } if *after == Duration::from_secs(30)
    )));
}

#[test]
fn test_buffered_signals_flush_in_arrival_order() {
    for n in 0..=6u64 {
        let mut h = Harness::immediate();
        h.queue();
        h.pair("r1", false);
        h.media_ready();

        for seq in 0..n {
            h.machine.handle_server_event(signal_for("r1", seq));
        }
        assert_eq!(h.machine.buffered_signals(), n as usize);

        let engine = h.engine_ready();
        assert_eq!(engine.applied_seqs(), (0..n).collect::<Vec<_>>());
        assert_eq!(h.machine.buffered_signals(), 0);

        h.machine.handle_server_event(signal_for("r1", 100));
        let mut expected: Vec<u64> = (0..n).collect();
        expected.push(100);
        assert_eq!(engine.applied_seqs(), expected);
    }
}

#[test]
fn test_signals_before_engine_with_stale_room_interleaved() {
    let mut h = Harness::immediate();
    h.queue();
    h.pair("r1", false);
    h.media_ready();

    h.machine.handle_server_event(signal_for("r1", 1));
    h.machine.handle_server_event(signal_for("r0", 50));
    h.machine.handle_server_event(signal_for("r1", 2));
    assert_eq!(h.machine.buffered_signals(), 2);

    let engine = h.engine_ready();
    h.machine.handle_server_event(signal_for("r1", 3));
    assert_eq!(engine.applied_seqs(), vec![1, 2, 3]);
}

#[test]
fn test_stale_room_never_reaches_engine_across_skip() {
    let mut h = Harness::immediate();
    h.queue();
    h.pair("r1", false);
    h.media_ready();
    h.machine.handle_server_event(signal_for("r1", 1));
    h.machine.handle_server_event(signal_for("r1", 2));
    let old_generation = h.machine.generation();
    h.drain();

    h.machine.skip();
    let sent = h.transmitted();
    assert!(matches!(&sent[0], ClientEvent::LeaveVideoChat));
    assert!(matches!(&sent[1], ClientEvent::JoinVideoChat(_)));
    assert_eq!(h.machine.state(), SessionState::Queued);
    assert_eq!(h.machine.buffered_signals(), 0);

    h.machine.handle_server_event(signal_for("r1", 3));

    h.pair("r2", false);
    // Media from the first pairing is reused
    assert_eq!(h.machine.state(), SessionState::Negotiating);
    h.machine.handle_server_event(signal_for("r1", 4));
    h.machine.handle_server_event(signal_for("r2", 5));

    let late = h.engine_ready_for(old_generation);
    assert!(late.is_closed());
    assert!(late.applied_seqs().is_empty());
    assert_eq!(h.live(), 0);

    let engine = h.engine_ready();
    assert_eq!(engine.applied_seqs(), vec![5]);
    assert_eq!(h.live(), 1);
}

#[test]
fn test_partner_left_tears_down_and_waits() {
    let mut h = Harness::immediate();
    let engine = h.connect("r1", true);
    h.drain();

    h.machine.handle_server_event(ServerEvent::UserLeft);
    let outputs = h.drain();

    assert_eq!(h.machine.state(), SessionState::Ended);
    assert!(engine.is_closed());
    assert!(events(&outputs).iter().any(|e| matches!(
        e,
        SessionEvent::PartnerLeft { notice } if notice == PARTNER_LEFT_NOTICE
    )));
    assert!(events(&outputs).iter().any(|e| matches!(
        e,
        SessionEvent::SessionEnded { reason: EndReason::PartnerLeft }
    )));
    assert!(!outputs.iter().any(|o| matches!(o, Output::Transmit(_))));

    // The close callback fired during teardown never arrives
    assert!(h.engine_rx.try_recv().is_err());

    h.machine.skip();
    assert_eq!(h.machine.state(), SessionState::Queued);
    assert!(matches!(
        h.transmitted().as_slice(),
        [ClientEvent::JoinVideoChat(_)]
    ));
}

#[test]
fn test_chat_rejected_while_idle() {
    let mut h = Harness::immediate();
    let error = assert_err!(h.machine.send_chat("hi"));
    assert_eq!(error.error_code(), "CHAT_REJECTED");
    assert!(h.drain().is_empty());
    assert!(h.machine.chat().is_empty());
}

#[test]
fn test_chat_is_scoped_to_current_room() {
    let mut h = Harness::immediate();
    h.connect("r1", false);
    h.drain();

    assert_err!(h.machine.send_chat("   "));
    let sent = assert_ok!(h.machine.send_chat("hi"));
    assert!(sent.is_local());
    match h.transmitted().as_slice() {
        [ClientEvent::ChatMessage(payload)] => {
            assert_eq!(payload.room_id, Some(RoomId::from("r1")));
            assert_eq!(payload.sender, "Ann");
        }
        other => panic!("unexpected {:?}", other),
    }

    let inbound = |room: Option<&str>, text: &str| {
        ServerEvent::ChatMessage(ChatPayload {
            text: text.to_string(),
            timestamp: chrono::Utc::now(),
            sender: "Bee".to_string(),
            room_id: room.map(RoomId::from),
        })
    };
    h.machine.handle_server_event(inbound(Some("r2"), "wrong room"));
    h.machine.handle_server_event(inbound(None, "untagged"));
    h.machine.handle_server_event(inbound(Some("r1"), "tagged"));

    let texts: Vec<_> = h.machine.chat().messages().iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, vec!["hi", "untagged", "tagged"]);

    h.machine.skip();
    assert!(h.machine.chat().is_empty());
}

#[test]
fn test_toggle_is_involution_without_traffic() {
    let mut h = Harness::immediate();
    h.connect("r1", false);
    h.drain();

    for kind in [TrackKind::Audio, TrackKind::Video] {
        let before = h.machine.media().unwrap().is_enabled(kind);
        assert_eq!(h.machine.toggle_track(kind), before.map(|v| !v));
        assert_eq!(h.machine.toggle_track(kind), before);
        assert_eq!(h.machine.media().unwrap().is_enabled(kind), before);
    }

    assert_eq!(h.machine.state(), SessionState::Connected);
    let outputs = h.drain();
    assert!(outputs
        .iter()
        .all(|o| matches!(o, Output::Emit(SessionEvent::TrackToggled { .. }))));
    assert_eq!(outputs.len(), 4);
}

#[test]
fn test_skip_from_every_state_reaches_queued() {
    type Setup = fn(&mut Harness);
    let setups: [(&str, Setup); 7] = [
        ("idle", |_| {}),
        ("queued", |h| h.queue()),
        ("matched", |h| {
            h.queue();
            h.pair("r1", true);
        }),
        ("negotiating", |h| {
            h.queue();
            h.pair("r1", true);
            h.media_ready();
        }),
        ("negotiating with engine", |h| {
            h.queue();
            h.pair("r1", true);
            h.media_ready();
            h.engine_ready();
        }),
        ("connected", |h| {
            h.connect("r1", true);
        }),
        ("ended", |h| {
            h.connect("r1", true);
            h.machine.handle_server_event(ServerEvent::PartnerDisconnected);
        }),
    ];

    for (name, setup) in setups {
        let mut h = Harness::immediate();
        setup(&mut h);
        assert!(h.live() <= 1, "{}", name);

        h.machine.skip();
        assert_eq!(h.machine.state(), SessionState::Queued, "{}", name);
        assert_eq!(h.live(), 0, "{}", name);
        assert!(!h.machine.has_engine(), "{}", name);

        // And it can pair again with a single engine
        h.pair("r2", false);
        if h.machine.state() == SessionState::Matched {
            h.media_ready();
        }
        h.engine_ready();
        assert_eq!(h.live(), 1, "{}", name);
    }
}

#[test]
fn test_engine_failure_ends_attempt() {
    let mut h = Harness::immediate();
    h.queue();
    h.pair("r1", true);
    h.media_ready();
    let engine = h.engine_ready();
    h.drain();

    engine.sink.emit(EngineEvent::Failed {
        reason: "ICE failed".to_string(),
    });
    h.pump();

    let outputs = h.drain();
    assert_eq!(h.machine.state(), SessionState::Ended);
    assert!(engine.is_closed());
    assert_eq!(
        error_code(&outputs),
        Some(("NEGOTIATION_FAILURE".to_string(), true))
    );
}

#[test]
fn test_negotiation_timeout_only_for_current_attempt() {
    let mut h = Harness::immediate();
    h.queue();
    h.pair("r1", false);
    h.media_ready();
    let generation = h.machine.generation();
    h.drain();

    h.machine.handle_negotiation_timeout(generation - 1);
    assert_eq!(h.machine.state(), SessionState::Negotiating);

    h.machine.handle_negotiation_timeout(generation);
    assert_eq!(h.machine.state(), SessionState::Ended);
    assert_eq!(
        error_code(&h.drain()),
        Some(("NEGOTIATION_TIMEOUT".to_string(), true))
    );
}

#[test]
fn test_timeout_after_connect_is_ignored() {
    let mut h = Harness::immediate();
    h.connect("r1", false);
    let generation = h.machine.generation();
    h.machine.handle_negotiation_timeout(generation);
    assert_eq!(h.machine.state(), SessionState::Connected);
}

#[test]
fn test_media_failure_is_terminal_for_attempt() {
    let mut h = Harness::immediate();
    h.queue();
    h.pair("r1", true);
    let generation = h.machine.generation();
    h.drain();

    h.machine.handle_media_failed(
        generation,
        PairChatError::MediaUnavailable {
            reason: "denied".to_string(),
        },
    );
    let outputs = h.drain();
    assert_eq!(h.machine.state(), SessionState::Ended);
    assert_eq!(
        error_code(&outputs),
        Some(("MEDIA_UNAVAILABLE".to_string(), false))
    );
    assert!(!outputs
        .iter()
        .any(|o| matches!(o, Output::BuildEngine { .. })));

    // The caller may retry from scratch
    assert_ok!(h.machine.request_match(MatchFilters::any()));
}

#[test]
fn test_late_media_from_old_attempt_is_released() {
    let mut h = Harness::immediate();
    h.queue();
    h.pair("r1", true);
    let old_generation = h.machine.generation();
    h.machine.skip();

    let late = FakeCapture::new("late");
    h.machine.handle_media_ready(old_generation, late.clone());
    assert!(late.is_stopped());
    assert!(h.machine.media().is_none());
    assert_eq!(h.machine.state(), SessionState::Queued);
}

#[test]
fn test_reacquire_policy_releases_media_between_pairings() {
    let mut h = Harness::new(
        SessionConfig::default()
            .rematch_delay(Duration::ZERO)
            .media_policy(MediaPolicy::Reacquire),
    );
    h.connect("r1", false);
    h.machine.skip();
    assert!(h.capture.is_stopped());
    h.drain();

    h.pair("r2", false);
    assert_eq!(h.machine.state(), SessionState::Matched);
    assert!(h
        .drain()
        .iter()
        .any(|o| matches!(o, Output::AcquireMedia { .. })));
}

#[test]
fn test_leave_releases_media_and_returns_to_idle() {
    let mut h = Harness::immediate();
    let engine = h.connect("r1", false);
    h.drain();

    h.machine.leave();
    assert_eq!(h.machine.state(), SessionState::Idle);
    assert!(engine.is_closed());
    assert!(h.capture.is_stopped());
    assert!(h.machine.media().is_none());
    assert!(matches!(
        h.transmitted().as_slice(),
        [ClientEvent::LeaveVideoChat]
    ));
}

#[test]
fn test_disconnect_releases_media_under_reuse_policy() {
    let mut h = Harness::immediate();
    let engine = h.connect("r1", false);
    h.drain();

    h.machine.disconnect();
    assert_eq!(h.machine.state(), SessionState::Ended);
    assert!(engine.is_closed());
    assert!(h.capture.is_stopped());
    assert!(h.machine.media().is_none());
    assert!(!h.machine.snapshot().media_acquired);

    // The next pairing acquires media again
    h.queue();
    h.pair("r2", false);
    assert_eq!(h.machine.state(), SessionState::Matched);
    assert!(h
        .drain()
        .iter()
        .any(|o| matches!(o, Output::AcquireMedia { .. })));
}

#[test]
fn test_skip_announces_next_match_only_when_connected() {
    let mut h = Harness::immediate();
    h.queue();
    h.pair("r1", true);
    h.media_ready();
    assert_eq!(h.machine.state(), SessionState::Negotiating);
    h.drain();

    h.machine.skip();
    let names: Vec<_> = h.transmitted().iter().map(|e| e.event_name()).collect();
    assert_eq!(names, vec!["leave-video-chat", "join-video-chat"]);

    h.connect("r2", true);
    h.drain();
    h.machine.skip();
    let sent = h.transmitted();
    assert!(matches!(
        &sent[0],
        ClientEvent::NextMatch(req) if req.room_id == RoomId::from("r2")
    ));
    assert!(matches!(&sent[1], ClientEvent::JoinVideoChat(_)));
}

#[test]
fn test_transport_loss_while_queued_ends_attempt() {
    let mut h = Harness::immediate();
    h.queue();
    h.drain();

    h.machine.handle_transport_lost("connection reset");
    assert_eq!(h.machine.state(), SessionState::Ended);
    assert_eq!(
        error_code(&h.drain()),
        Some(("TRANSPORT_ERROR".to_string(), true))
    );
}

#[test]
fn test_rematch_waits_for_scheduled_delay() {
    let mut h = Harness::new(SessionConfig::default());
    h.connect("r1", false);
    h.drain();

    h.machine.skip();
    assert_eq!(h.machine.state(), SessionState::Ended);
    assert!(h.machine.rematch_pending());
    let generation = h.machine.generation();
    let outputs = h.drain();
    assert!(outputs.iter().any(|o| matches!(
        o,
        Output::ScheduleRematch { generation: g, after }
            if *g == generation && *after == Duration::from_millis(500)
    )));

    h.machine.handle_rematch_due(generation - 1);
    assert_eq!(h.machine.state(), SessionState::Ended);

    h.machine.handle_rematch_due(generation);
    assert_eq!(h.machine.state(), SessionState::Queued);
    assert!(matches!(
        h.transmitted().as_slice(),
        [ClientEvent::JoinVideoChat(_)]
    ));
}

#[test]
fn test_disconnect_cancels_pending_rematch() {
    let mut h = Harness::new(SessionConfig::default());
    h.connect("r1", false);
    h.machine.skip();
    let generation = h.machine.generation();

    h.machine.disconnect();
    h.machine.handle_rematch_due(generation);
    assert_eq!(h.machine.state(), SessionState::Ended);
}

#[test]
fn test_attempt_summary_counts_traffic() {
    let mut h = Harness::immediate();
    h.connect("r1", true);
    h.machine.handle_server_event(signal_for("r1", 1));
    h.machine.handle_server_event(signal_for("r9", 2));
    h.drain();

    h.machine.disconnect();
    let outputs = h.drain();
    let summary = events(&outputs)
        .into_iter()
        .find_map(|e| match e {
            SessionEvent::AttemptFinished { summary } => Some(summary.clone()),
            _ => None,
        })
        .expect("summary emitted");

    assert_eq!(summary.room_id, Some(RoomId::from("r1")));
    assert_eq!(summary.stats.signals_received, 1);
    assert_eq!(summary.stats.signals_stale, 1);
    assert_eq!(summary.outcome, "local disconnect");
    assert!(summary.time_to_connect.is_some());
}

#[test]
fn test_pairing_outside_filters_still_proceeds() {
    let mut h = Harness::immediate();
    assert_ok!(h
        .machine
        .request_match(MatchFilters::any().gender(GenderPreference::Male)));
    h.pair("r1", false);
    assert_eq!(h.machine.state(), SessionState::Matched);
}

#[test]
fn test_snapshot_reflects_pairing() {
    let mut h = Harness::immediate();
    h.queue();
    h.pair("r1", true);
    h.media_ready();
    h.machine.handle_server_event(signal_for("r1", 1));

    let snapshot = h.machine.snapshot();
    assert_eq!(snapshot.state, SessionState::Negotiating);
    assert_eq!(snapshot.room_id, Some(RoomId::from("r1")));
    assert_eq!(snapshot.role, Some(Role::Initiator));
    assert_eq!(snapshot.buffered_signals, 1);
    assert!(!snapshot.engine_live);
    assert!(snapshot.media_acquired);
    assert_eq!(snapshot.audio_enabled, Some(true));
}
