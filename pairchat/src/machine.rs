//! Sans-IO peer session state machine
//!
//! [`SessionMachine`] owns everything one client knows about its current
//! pairing: the state, the room assignment, the signal buffer or the live
//! engine, local media, chat and the attempt timeline. It never performs
//! I/O. Commands and inputs are applied synchronously and side effects are
//! queued as [`Output`]s, which the async controller executes in order.
//!
//! Work that has to suspend (media acquisition, engine construction,
//! timers) is requested with the current [`Generation`]. The generation is
//! bumped on every new pairing and every teardown, so a completion that
//! comes back tagged with an older generation belongs to an attempt that no
//! longer exists and is discarded.

use crate::buffer::SignalBuffer;
use crate::chat::{ChatLog, ChatMessage};
use crate::config::{MediaPolicy, SessionConfig};
use crate::event::{EndReason, SessionEvent, PARTNER_LEFT_NOTICE};
use crate::participant::{LocalParticipant, RemoteParticipant};
use crate::state::SessionState;
use crate::track::LocalTracks;
use pairchat_core::{
    EngineConfig, EngineEvent, EngineEventSink, EngineNotification, Generation, MatchFilters,
    MediaConstraints, MediaSource, NegotiationEngine, PairChatError, ParticipantIdentity,
    RemoteStream, Role, RoomAssignment, RoomId, TrackKind,
};
use pairchat_diagnostics::{AttemptTimeline, ConnectionPhase, ConnectionStats};
use pairchat_signaling::{
    ChatPayload, ClientEvent, InboundSignal, JoinRequest, MatchedPayload, NextMatchRequest,
    ServerEvent, SignalRelay,
};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Side effect requested by the machine
#[derive(Debug)]
pub enum Output {
    /// Send an event to the coordinator
    Transmit(ClientEvent),
    /// Deliver an event to observers
    Emit(SessionEvent),
    /// Acquire local media, then call `handle_media_ready` or `handle_media_failed`
    AcquireMedia {
        /// Attempt the result belongs to
        generation: Generation,
        /// Capture request
        constraints: MediaConstraints,
    },
    /// Construct an engine, then call `handle_engine_ready` or `handle_engine_failed`
    BuildEngine {
        /// Attempt the engine belongs to
        generation: Generation,
        /// Engine parameters
        config: EngineConfig,
        /// Local capture to attach
        media: Arc<dyn MediaSource>,
    },
    /// Call `handle_negotiation_timeout` after `after`
    ArmNegotiationTimer {
        /// Attempt the timer belongs to
        generation: Generation,
        /// Grace period
        after: Duration,
    },
    /// Call `handle_rematch_due` after `after`
    ScheduleRematch {
        /// Generation at scheduling time
        generation: Generation,
        /// Delay before re-requesting
        after: Duration,
    },
}

/// Point-in-time view of a session
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    /// Current state
    pub state: SessionState,
    /// Current room, when paired
    pub room_id: Option<RoomId>,
    /// Current partner, when paired
    pub partner: Option<ParticipantIdentity>,
    /// This side's role, when paired
    pub role: Option<Role>,
    /// Signals waiting for the engine
    pub buffered_signals: usize,
    /// Whether an engine instance exists
    pub engine_live: bool,
    /// Whether local media is held
    pub media_acquired: bool,
    /// Local audio flag, when media is held
    pub audio_enabled: Option<bool>,
    /// Local video flag, when media is held
    pub video_enabled: Option<bool>,
    /// Chat of the current session
    pub chat: Vec<ChatMessage>,
    /// Last submitted filters
    pub filters: Option<MatchFilters>,
    /// Current generation
    pub generation: Generation,
}

struct EngineSlot {
    engine: Box<dyn NegotiationEngine>,
    sink: EngineEventSink,
}

enum Negotiation {
    /// No engine yet; inbound signals wait here
    Pending(SignalBuffer),
    /// Engine constructed; inbound signals go straight to it
    Live(EngineSlot),
}

struct ActivePairing {
    assignment: RoomAssignment,
    partner: RemoteParticipant,
    negotiation: Negotiation,
    remote_stream: Option<RemoteStream>,
}

impl ActivePairing {
    fn room_id(&self) -> &RoomId {
        self.assignment.room_id()
    }
}

/// Client-side peer session state machine
pub struct SessionMachine {
    config: SessionConfig,
    local: LocalParticipant,
    state: SessionState,
    generation: Generation,
    pairing: Option<ActivePairing>,
    media: Option<LocalTracks>,
    chat: ChatLog,
    timeline: Option<AttemptTimeline>,
    rematch_pending: bool,
    outputs: VecDeque<Output>,
}

impl SessionMachine {
    /// Create an idle machine
    pub fn new(identity: ParticipantIdentity, config: SessionConfig) -> Self {
        Self {
            config,
            local: LocalParticipant::new(identity),
            state: SessionState::Idle,
            generation: 0,
            pairing: None,
            media: None,
            chat: ChatLog::new(),
            timeline: None,
            rematch_pending: false,
            outputs: VecDeque::new(),
        }
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Current generation
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Local participant
    pub fn local(&self) -> &LocalParticipant {
        &self.local
    }

    /// Current room, when paired
    pub fn room_id(&self) -> Option<&RoomId> {
        self.pairing.as_ref().map(|p| p.room_id())
    }

    /// Current partner, when paired
    pub fn partner(&self) -> Option<&RemoteParticipant> {
        self.pairing.as_ref().map(|p| &p.partner)
    }

    /// Partner stream, once the engine surfaced it
    pub fn remote_stream(&self) -> Option<&RemoteStream> {
        self.pairing.as_ref().and_then(|p| p.remote_stream.as_ref())
    }

    /// Whether an engine instance exists
    pub fn has_engine(&self) -> bool {
        matches!(
            self.pairing.as_ref().map(|p| &p.negotiation),
            Some(Negotiation::Live(_))
        )
    }

    /// Signals waiting for the engine
    pub fn buffered_signals(&self) -> usize {
        match self.pairing.as_ref().map(|p| &p.negotiation) {
            Some(Negotiation::Pending(buffer)) => buffer.len(),
            _ => 0,
        }
    }

    /// Local media, when held
    pub fn media(&self) -> Option<&LocalTracks> {
        self.media.as_ref()
    }

    /// Chat of the current session
    pub fn chat(&self) -> &ChatLog {
        &self.chat
    }

    /// Whether a re-request is scheduled
    pub fn rematch_pending(&self) -> bool {
        self.rematch_pending
    }

    /// Take the next queued side effect
    pub fn poll_output(&mut self) -> Option<Output> {
        self.outputs.pop_front()
    }

    /// Take every queued side effect
    pub fn drain_outputs(&mut self) -> Vec<Output> {
        self.outputs.drain(..).collect()
    }

    /// Point-in-time view
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            room_id: self.room_id().cloned(),
            partner: self.partner().map(|p| p.identity().clone()),
            role: self.partner().map(|p| p.local_role()),
            buffered_signals: self.buffered_signals(),
            engine_live: self.has_engine(),
            media_acquired: self.media.is_some(),
            audio_enabled: self.media.as_ref().and_then(|m| m.is_enabled(TrackKind::Audio)),
            video_enabled: self.media.as_ref().and_then(|m| m.is_enabled(TrackKind::Video)),
            chat: self.chat.messages().to_vec(),
            filters: self.local.filters().cloned(),
            generation: self.generation,
        }
    }

    // ----- commands -----

    /// Submit a match request with a new filter snapshot
    ///
    /// Allowed from `Idle` and `Ended` only.
    pub fn request_match(&mut self, filters: MatchFilters) -> Result<(), PairChatError> {
        if !matches!(self.state, SessionState::Idle | SessionState::Ended) {
            return Err(PairChatError::InvalidTransition {
                from: self.state.to_string(),
                to: SessionState::Queued.to_string(),
            });
        }
        self.rematch_pending = false;
        self.submit_request(filters);
        Ok(())
    }

    /// Abandon the current partner and queue for another one
    ///
    /// Safe in every state. A connected partner is announced with a
    /// next-match for the room; an unfinished pairing is left with a plain
    /// leave before teardown.
    pub fn skip(&mut self) {
        if let Some(pairing) = &self.pairing {
            info!("⏭️ Skipping partner in room {}", pairing.room_id());
            let event = if self.state == SessionState::Connected {
                ClientEvent::NextMatch(NextMatchRequest {
                    room_id: pairing.room_id().clone(),
                    user_info: self.local.identity().clone(),
                    filters: self.local.filters_or_default(),
                })
            } else {
                ClientEvent::LeaveVideoChat
            };
            self.transmit(event);
            self.end_session(EndReason::Skipped, None);
            self.schedule_rematch();
        } else {
            self.requeue();
        }
    }

    /// Leave the current partner and queue for another one
    ///
    /// Unlike [`skip`](Self::skip) this announces a plain leave rather than
    /// a next-match.
    pub fn find_new_partner(&mut self) {
        if self.state.is_paired() {
            info!("🔍 Looking for a new partner");
            self.transmit(ClientEvent::LeaveVideoChat);
            self.end_session(EndReason::Skipped, None);
            self.schedule_rematch();
        } else {
            self.requeue();
        }
    }

    /// Replace the filter snapshot
    ///
    /// When paired the session is torn down and re-queued with the new
    /// filters; when queued the request is resubmitted; otherwise the
    /// filters are stored for the next request.
    pub fn update_filters(&mut self, filters: MatchFilters) {
        match self.state {
            SessionState::Matched | SessionState::Negotiating | SessionState::Connected => {
                info!("🎛️ Filters changed mid-session; re-queueing");
                self.local.apply_filters(filters);
                self.transmit(ClientEvent::LeaveVideoChat);
                self.end_session(EndReason::FiltersChanged, None);
                self.schedule_rematch();
            }
            SessionState::Queued => self.submit_request(filters),
            SessionState::Idle | SessionState::Ended => {
                debug!("Filters stored for the next request");
                self.local.apply_filters(filters);
            }
        }
    }

    /// End the current attempt without re-queueing
    ///
    /// Local media is released whatever the media policy; the next
    /// pairing acquires it again.
    pub fn disconnect(&mut self) {
        self.rematch_pending = false;
        match self.state {
            SessionState::Idle | SessionState::Ended => {
                debug!("Disconnect ignored in {}", self.state);
            }
            _ => {
                self.transmit(ClientEvent::LeaveVideoChat);
                self.end_session(EndReason::LocalDisconnect, None);
            }
        }
        self.release_media();
    }

    /// Leave entirely: end any attempt, release media, return to `Idle`
    pub fn leave(&mut self) {
        self.rematch_pending = false;
        if self.state != SessionState::Idle && self.state != SessionState::Ended {
            self.transmit(ClientEvent::LeaveVideoChat);
            self.end_session(EndReason::Left, None);
        }
        self.release_media();
        if self.state == SessionState::Ended {
            self.set_state(SessionState::Idle);
        }
    }

    /// Send a chat message to the partner
    ///
    /// Only accepted while `Connected`. Rejected messages are neither
    /// transmitted nor recorded.
    pub fn send_chat(&mut self, text: impl Into<String>) -> Result<ChatMessage, PairChatError> {
        let room_id = match (&self.pairing, self.state) {
            (Some(pairing), SessionState::Connected) => pairing.room_id().clone(),
            _ => {
                return Err(PairChatError::ChatRejected {
                    reason: format!("session is {}", self.state),
                })
            }
        };
        let message = ChatMessage::local(text, self.local.identity().username.clone())?;
        self.transmit(ClientEvent::ChatMessage(message.to_payload(&room_id)));
        self.chat.push(message.clone());
        if let Some(stats) = self.stats() {
            stats.chat_sent += 1;
        }
        self.emit(SessionEvent::ChatMessage {
            message: message.clone(),
        });
        Ok(message)
    }

    /// Flip a local track; `None` when no media or no such track is held
    pub fn toggle_track(&mut self, kind: TrackKind) -> Option<bool> {
        let enabled = self.media.as_ref()?.toggle(kind)?;
        self.emit(SessionEvent::TrackToggled { kind, enabled });
        Some(enabled)
    }

    // ----- inputs -----

    /// The transport reported it is connected
    pub fn handle_transport_connected(&mut self) {
        info!("📡 Transport connected");
        self.emit(SessionEvent::TransportConnected);
    }

    /// The transport dropped
    ///
    /// Any room in progress is treated as if the partner departed.
    pub fn handle_transport_lost(&mut self, reason: impl Into<String>) {
        let error = PairChatError::Transport {
            reason: reason.into(),
        };
        self.rematch_pending = false;
        match self.state {
            SessionState::Idle | SessionState::Ended => {
                warn!("📡 {}", error);
                self.emit(SessionEvent::from_error(&error));
            }
            _ => {
                warn!("📡 {} while {}; ending attempt", error, self.state);
                self.end_session(
                    EndReason::Failed {
                        code: error.error_code(),
                    },
                    Some(error),
                );
            }
        }
    }

    /// An event from the coordinator
    pub fn handle_server_event(&mut self, event: ServerEvent) {
        trace!("⬇️ {}", event.event_name());
        match event {
            ServerEvent::Matched(payload) => self.on_matched(payload),
            ServerEvent::Signal(signal) => self.on_signal(signal),
            ServerEvent::ChatMessage(payload) => self.on_chat(payload),
            ServerEvent::PartnerDisconnected => {
                if self.state.is_paired() {
                    info!("👋 Partner disconnected");
                    self.emit(SessionEvent::PartnerDisconnected);
                    self.end_session(EndReason::PartnerDisconnected, None);
                } else {
                    debug!("partner-disconnected ignored in {}", self.state);
                }
            }
            ServerEvent::UserLeft => {
                if self.state.is_paired() {
                    info!("👋 Partner moved on");
                    self.emit(SessionEvent::PartnerLeft {
                        notice: PARTNER_LEFT_NOTICE.to_string(),
                    });
                    self.end_session(EndReason::PartnerLeft, None);
                } else {
                    debug!("user-left ignored in {}", self.state);
                }
            }
        }
    }

    /// Local media acquisition finished
    pub fn handle_media_ready(&mut self, generation: Generation, source: Arc<dyn MediaSource>) {
        if generation != self.generation || self.state != SessionState::Matched {
            debug!(
                "Releasing media from stale attempt {} (current {})",
                generation, self.generation
            );
            source.stop();
            return;
        }
        let tracks = LocalTracks::new(source);
        let media = tracks.media();
        self.media = Some(tracks);
        self.begin_negotiation(media);
    }

    /// Local media acquisition failed
    pub fn handle_media_failed(&mut self, generation: Generation, error: PairChatError) {
        if generation != self.generation || self.state != SessionState::Matched {
            debug!("Ignoring media failure from stale attempt {}", generation);
            return;
        }
        error!("🎥 {}", error);
        self.end_session(
            EndReason::Failed {
                code: error.error_code(),
            },
            Some(error),
        );
    }

    /// Engine construction finished
    ///
    /// Every buffered signal is delivered to the new engine in arrival
    /// order before this returns.
    pub fn handle_engine_ready(
        &mut self,
        generation: Generation,
        mut engine: Box<dyn NegotiationEngine>,
        sink: EngineEventSink,
    ) {
        let current = generation == self.generation
            && matches!(
                self.state,
                SessionState::Negotiating | SessionState::Connected
            );
        let pairing = match self.pairing.as_mut() {
            Some(pairing) if current && matches!(pairing.negotiation, Negotiation::Pending(_)) => {
                pairing
            }
            _ => {
                debug!("Closing engine from stale attempt {}", generation);
                sink.invalidate();
                engine.close();
                return;
            }
        };

        let room_id = pairing.room_id().clone();
        let buffer = match std::mem::replace(
            &mut pairing.negotiation,
            Negotiation::Pending(SignalBuffer::new(room_id.clone())),
        ) {
            Negotiation::Pending(buffer) => buffer,
            Negotiation::Live(slot) => {
                pairing.negotiation = Negotiation::Live(slot);
                sink.invalidate();
                engine.close();
                return;
            }
        };

        info!(
            "⚙️ Engine ready for room {} ({:?})",
            room_id,
            pairing.partner.local_role()
        );
        let report = buffer.drain_into(engine.as_mut());
        pairing.negotiation = Negotiation::Live(EngineSlot { engine, sink });

        if report.rejected > 0 {
            warn!(
                "{} of {} buffered signals were rejected by the engine",
                report.rejected,
                report.delivered + report.rejected
            );
        }
    }

    /// Engine construction failed
    pub fn handle_engine_failed(&mut self, generation: Generation, error: PairChatError) {
        if generation != self.generation || self.state != SessionState::Negotiating {
            debug!("Ignoring engine failure from stale attempt {}", generation);
            return;
        }
        error!("⚙️ {}", error);
        self.end_session(
            EndReason::Failed {
                code: error.error_code(),
            },
            Some(error),
        );
    }

    /// A callback from the engine
    ///
    /// Engines may start emitting while still being constructed, so events
    /// are accepted for the current pairing whether or not
    /// `handle_engine_ready` has run yet.
    pub fn handle_engine_event(&mut self, notification: EngineNotification) {
        if notification.generation != self.generation || self.pairing.is_none() {
            trace!(
                "Dropping {} from engine generation {} (current {})",
                notification.event.event_type(),
                notification.generation,
                self.generation
            );
            return;
        }

        match notification.event {
            EngineEvent::Signal(signal) => {
                let room_id = match self.room_id() {
                    Some(room_id) => room_id.clone(),
                    None => return,
                };
                debug!("⬆️ Relaying signal for room {}", room_id);
                let relay = SignalRelay {
                    room_id,
                    signal,
                    sender_id: self.local.id().to_string(),
                };
                self.transmit(ClientEvent::Signal(relay));
                if let Some(stats) = self.stats() {
                    stats.signals_sent += 1;
                }
            }
            EngineEvent::RemoteStream(stream) => {
                info!("🎬 Remote stream {} available", stream.id);
                if let Some(pairing) = self.pairing.as_mut() {
                    pairing.remote_stream = Some(stream.clone());
                }
                self.emit(SessionEvent::RemoteStreamAvailable { stream });
            }
            EngineEvent::Connected => {
                if self.state != SessionState::Negotiating {
                    debug!("Engine connected again in {}", self.state);
                    return;
                }
                if self.set_state(SessionState::Connected) {
                    if let Some(timeline) = self.timeline.as_mut() {
                        timeline.mark(ConnectionPhase::Connected);
                    }
                    if let Some(room_id) = self.room_id().cloned() {
                        info!("✅ Connected in room {}", room_id);
                        self.emit(SessionEvent::Connected { room_id });
                    }
                }
            }
            EngineEvent::Closed => {
                info!("🔌 Engine reported closure");
                self.end_session(EndReason::EngineClosed, None);
            }
            EngineEvent::Failed { reason } => {
                let error = PairChatError::NegotiationFailure {
                    room_id: self.room_id().map(|r| r.to_string()).unwrap_or_default(),
                    reason,
                };
                error!("❌ {}", error);
                self.end_session(
                    EndReason::Failed {
                        code: error.error_code(),
                    },
                    Some(error),
                );
            }
        }
    }

    /// The negotiation grace period elapsed
    pub fn handle_negotiation_timeout(&mut self, generation: Generation) {
        if generation != self.generation || self.state != SessionState::Negotiating {
            return;
        }
        let error = PairChatError::NegotiationTimeout {
            room_id: self.room_id().map(|r| r.to_string()).unwrap_or_default(),
            after: self.config.negotiation_timeout.unwrap_or_default(),
        };
        warn!("⏰ {}", error);
        self.end_session(
            EndReason::Failed {
                code: error.error_code(),
            },
            Some(error),
        );
    }

    /// A scheduled re-request is due
    pub fn handle_rematch_due(&mut self, generation: Generation) {
        if generation != self.generation || !self.rematch_pending {
            return;
        }
        self.rematch_pending = false;
        if self.state == SessionState::Ended {
            let filters = self.local.filters_or_default();
            self.submit_request(filters);
        }
    }

    // ----- internals -----

    fn on_matched(&mut self, payload: MatchedPayload) {
        if self.state != SessionState::Queued {
            warn!(
                "Ignoring pairing for room {} in {}",
                payload.room_id, self.state
            );
            return;
        }

        let assignment =
            RoomAssignment::new(payload.room_id, payload.partner_info, payload.initiator);
        let partner = RemoteParticipant::from_assignment(&assignment);
        let room_id = assignment.room_id().clone();

        if let Some(filters) = self.local.filters() {
            if !filters.accepts(self.local.identity(), assignment.partner()) {
                warn!(
                    "Coordinator paired us with {} outside our filters",
                    partner.username()
                );
            }
        }

        self.generation += 1;
        self.pairing = Some(ActivePairing {
            negotiation: Negotiation::Pending(SignalBuffer::new(room_id.clone())),
            partner: partner.clone(),
            assignment,
            remote_stream: None,
        });
        if let Some(timeline) = self.timeline.as_mut() {
            timeline.set_room(room_id.clone());
            timeline.mark(ConnectionPhase::Matched);
        }

        info!(
            "🤝 Matched with {} in room {} as {:?}",
            partner.username(),
            room_id,
            partner.local_role()
        );
        self.set_state(SessionState::Matched);
        self.transmit(ClientEvent::JoinRoom(room_id));
        self.emit(SessionEvent::PartnerMatched { partner });

        match self.media.as_ref().map(|m| m.media()) {
            Some(media) => {
                debug!("Reusing local media for the new pairing");
                self.begin_negotiation(media);
            }
            None => {
                self.outputs.push_back(Output::AcquireMedia {
                    generation: self.generation,
                    constraints: self.config.media_constraints.clone(),
                });
            }
        }
    }

    fn begin_negotiation(&mut self, media: Arc<dyn MediaSource>) {
        let role = match self.partner() {
            Some(partner) => partner.local_role(),
            None => return,
        };
        if !self.set_state(SessionState::Negotiating) {
            return;
        }
        if let Some(timeline) = self.timeline.as_mut() {
            timeline.mark(ConnectionPhase::Negotiating);
        }
        if let Some(after) = self.config.negotiation_timeout {
            self.outputs.push_back(Output::ArmNegotiationTimer {
                generation: self.generation,
                after,
            });
        }
        self.outputs.push_back(Output::BuildEngine {
            generation: self.generation,
            config: EngineConfig {
                role,
                ice_servers: self.config.ice_servers.clone(),
                trickle: self.config.trickle,
            },
            media,
        });
    }

    fn on_signal(&mut self, signal: InboundSignal) {
        let pairing = match self.pairing.as_mut() {
            Some(pairing) => pairing,
            None => {
                debug!("Dropping signal received in {}", self.state);
                return;
            }
        };

        let envelope = signal.into_envelope(pairing.assignment.room_id());
        if !envelope.is_for(pairing.room_id()) {
            warn!(
                "🗑️ Dropping stale signal for room {} (current {})",
                envelope.room_id,
                pairing.room_id()
            );
            if let Some(stats) = self.stats() {
                stats.signals_stale += 1;
            }
            return;
        }

        let buffered = match &mut pairing.negotiation {
            Negotiation::Pending(buffer) => {
                if let Err(e) = buffer.push(envelope) {
                    warn!("🗑️ {}", e);
                    return;
                }
                true
            }
            Negotiation::Live(slot) => {
                if let Err(e) = slot.engine.signal(envelope.payload) {
                    warn!("Engine rejected signal: {}", e);
                }
                false
            }
        };

        if let Some(stats) = self.stats() {
            stats.signals_received += 1;
            if buffered {
                stats.signals_buffered += 1;
            }
        }
    }

    fn on_chat(&mut self, payload: ChatPayload) {
        let current = match (&self.pairing, self.state) {
            (Some(pairing), SessionState::Connected) => pairing.room_id().clone(),
            _ => {
                debug!("Dropping chat received in {}", self.state);
                return;
            }
        };
        if let Some(room_id) = &payload.room_id {
            if room_id != &current {
                warn!(
                    "🗑️ Dropping chat for room {} (current {})",
                    room_id, current
                );
                return;
            }
        }

        let message = ChatMessage::from_payload(payload);
        self.chat.push(message.clone());
        if let Some(stats) = self.stats() {
            stats.chat_received += 1;
        }
        self.emit(SessionEvent::ChatMessage { message });
    }

    fn submit_request(&mut self, filters: MatchFilters) {
        self.local.apply_filters(filters.clone());
        if self.state != SessionState::Queued {
            if !self.set_state(SessionState::Queued) {
                return;
            }
        } else {
            debug!("Resubmitting match request");
        }
        self.timeline = Some(AttemptTimeline::start());

        info!("🎲 Requesting a match ({:?})", filters);
        self.transmit(ClientEvent::JoinVideoChat(JoinRequest {
            user_info: self.local.identity().clone(),
            filters: filters.clone(),
        }));
        self.emit(SessionEvent::Queued { filters });
    }

    fn requeue(&mut self) {
        let filters = self.local.filters_or_default();
        self.rematch_pending = false;
        self.submit_request(filters);
    }

    fn schedule_rematch(&mut self) {
        if self.state != SessionState::Ended {
            return;
        }
        if self.config.rematch_delay.is_zero() {
            let filters = self.local.filters_or_default();
            self.submit_request(filters);
            return;
        }
        self.rematch_pending = true;
        self.outputs.push_back(Output::ScheduleRematch {
            generation: self.generation,
            after: self.config.rematch_delay,
        });
    }

    /// Tear down the current attempt and move to `Ended`
    ///
    /// The engine's sink is invalidated before the engine is closed, so
    /// nothing it emits during teardown reaches the machine.
    fn end_session(&mut self, reason: EndReason, failure: Option<PairChatError>) {
        if let Some(pairing) = self.pairing.take() {
            match pairing.negotiation {
                Negotiation::Live(mut slot) => {
                    slot.sink.invalidate();
                    slot.engine.close();
                    debug!("🧹 Engine for room {} destroyed", pairing.assignment.room_id());
                }
                Negotiation::Pending(buffer) => {
                    buffer.discard();
                }
            }
        }
        self.chat.clear();
        if self.config.media_policy == MediaPolicy::Reacquire {
            self.release_media();
        }
        self.generation += 1;

        if let Some(mut timeline) = self.timeline.take() {
            timeline.mark(ConnectionPhase::Ended);
            let summary = timeline.summary(reason.to_string());
            info!("📊 Attempt finished: {}", summary.to_json());
            self.emit(SessionEvent::AttemptFinished { summary });
        }

        self.set_state(SessionState::Ended);
        info!("🏁 Session ended: {}", reason);
        self.emit(SessionEvent::SessionEnded { reason });

        if let Some(failure) = failure {
            self.emit(SessionEvent::from_error(&failure));
        }
    }

    fn release_media(&mut self) {
        if let Some(media) = self.media.take() {
            media.release();
        }
    }

    fn set_state(&mut self, to: SessionState) -> bool {
        let from = self.state;
        match from.transition(to) {
            Ok(next) => {
                self.state = next;
                info!("🔄 Session state: {} -> {}", from, next);
                self.emit(SessionEvent::StateChanged { from, to: next });
                true
            }
            Err(e) => {
                error!("{}", e);
                false
            }
        }
    }

    fn stats(&mut self) -> Option<&mut ConnectionStats> {
        self.timeline.as_mut().map(|t| &mut t.stats)
    }

    fn transmit(&mut self, event: ClientEvent) {
        self.outputs.push_back(Output::Transmit(event));
    }

    fn emit(&mut self, event: SessionEvent) {
        self.outputs.push_back(Output::Emit(event));
    }
}

impl fmt::Debug for SessionMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionMachine")
            .field("state", &self.state)
            .field("generation", &self.generation)
            .field("room_id", &self.room_id())
            .field("engine_live", &self.has_engine())
            .field("media_acquired", &self.media.is_some())
            .field("pending_outputs", &self.outputs.len())
            .finish()
    }
}
