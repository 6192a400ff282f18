//! Async driver for the session machine
//!
//! [`PeerSessionController`] is the single event loop of one client. It
//! feeds transport traffic, engine callbacks, finished background work and
//! user commands into the [`SessionMachine`] one at a time, and executes the
//! machine's outputs in order after every input.

use crate::chat::ChatMessage;
use crate::event::{EventStream, SessionEvent};
use crate::machine::{Output, SessionMachine, SessionSnapshot};
use pairchat_core::{
    EngineEventSink, EngineFactory, EngineNotification, Generation, MatchFilters, MediaDevices,
    MediaSource, NegotiationEngine, PairChatError, TrackKind,
};
use pairchat_signaling::{RealtimeTransport, TransportEvent};
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Requests sent from a [`SessionHandle`](crate::SessionHandle) to the loop
#[derive(Debug)]
pub(crate) enum Command {
    RequestMatch {
        filters: MatchFilters,
        reply: oneshot::Sender<Result<(), PairChatError>>,
    },
    Skip {
        reply: oneshot::Sender<()>,
    },
    FindNewPartner {
        reply: oneshot::Sender<()>,
    },
    UpdateFilters {
        filters: MatchFilters,
        reply: oneshot::Sender<()>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    Leave {
        reply: oneshot::Sender<()>,
    },
    SendChat {
        text: String,
        reply: oneshot::Sender<Result<ChatMessage, PairChatError>>,
    },
    ToggleTrack {
        kind: TrackKind,
        reply: oneshot::Sender<Option<bool>>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    Subscribe {
        reply: oneshot::Sender<EventStream>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Result of background work, returned to the loop
enum Completion {
    Media {
        generation: Generation,
        result: Result<Arc<dyn MediaSource>, PairChatError>,
    },
    Engine {
        generation: Generation,
        result: Result<Box<dyn NegotiationEngine>, PairChatError>,
        sink: EngineEventSink,
    },
    NegotiationTimeout {
        generation: Generation,
    },
    RematchDue {
        generation: Generation,
    },
}

/// Spawned work bound to one generation
struct PendingTask {
    generation: Generation,
    handle: JoinHandle<()>,
    sink: Option<EngineEventSink>,
}

/// Collaborators the controller drives
pub(crate) struct Collaborators {
    pub transport: Arc<dyn RealtimeTransport>,
    pub transport_events: mpsc::UnboundedReceiver<TransportEvent>,
    pub engine_factory: Arc<dyn EngineFactory>,
    pub media_devices: Arc<dyn MediaDevices>,
}

/// Single-threaded event loop owning one [`SessionMachine`]
pub struct PeerSessionController {
    machine: SessionMachine,
    transport: Arc<dyn RealtimeTransport>,
    transport_events: mpsc::UnboundedReceiver<TransportEvent>,
    transport_open: bool,
    transport_lost: bool,
    engine_factory: Arc<dyn EngineFactory>,
    media_devices: Arc<dyn MediaDevices>,
    commands: mpsc::UnboundedReceiver<Command>,
    engine_tx: mpsc::UnboundedSender<EngineNotification>,
    engine_rx: mpsc::UnboundedReceiver<EngineNotification>,
    completion_tx: mpsc::UnboundedSender<Completion>,
    completion_rx: mpsc::UnboundedReceiver<Completion>,
    subscribers: Vec<mpsc::UnboundedSender<SessionEvent>>,
    tasks: Vec<PendingTask>,
}

impl PeerSessionController {
    pub(crate) fn new(
        machine: SessionMachine,
        collaborators: Collaborators,
        commands: mpsc::UnboundedReceiver<Command>,
    ) -> Self {
        let (engine_tx, engine_rx) = mpsc::unbounded_channel();
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        Self {
            machine,
            transport: collaborators.transport,
            transport_events: collaborators.transport_events,
            transport_open: true,
            transport_lost: false,
            engine_factory: collaborators.engine_factory,
            media_devices: collaborators.media_devices,
            commands,
            engine_tx,
            engine_rx,
            completion_tx,
            completion_rx,
            subscribers: Vec::new(),
            tasks: Vec::new(),
        }
    }

    /// Register an observer
    pub(crate) fn subscribe(&mut self) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        EventStream::new(rx)
    }

    /// Run until shutdown or until every handle is dropped
    ///
    /// On exit the current attempt is torn down, local media is released and
    /// the transport is closed.
    pub async fn run(mut self) {
        info!("🚀 Session controller started");

        loop {
            tokio::select! {
                biased;

                event = self.transport_events.recv(), if self.transport_open => {
                    match event {
                        Some(event) => self.on_transport_event(event),
                        None => {
                            self.transport_open = false;
                            if !self.transport_lost {
                                self.transport_lost = true;
                                self.machine.handle_transport_lost("transport channel closed");
                            }
                        }
                    }
                }

                Some(notification) = self.engine_rx.recv() => {
                    self.machine.handle_engine_event(notification);
                }

                Some(completion) = self.completion_rx.recv() => {
                    self.on_completion(completion);
                }

                command = self.commands.recv() => {
                    match command {
                        Some(command) => {
                            if self.on_command(command).await.is_break() {
                                break;
                            }
                        }
                        None => {
                            debug!("All session handles dropped");
                            self.machine.leave();
                            self.flush().await.ok();
                            break;
                        }
                    }
                }
            }

            self.flush().await.ok();
        }

        self.cancel_all_tasks();
        self.transport.close().await;
        info!("🛑 Session controller stopped");
    }

    fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => {
                self.transport_lost = false;
                self.machine.handle_transport_connected();
            }
            TransportEvent::Message(event) => self.machine.handle_server_event(event),
            TransportEvent::Disconnected { reason } => {
                if !self.transport_lost {
                    self.transport_lost = true;
                    self.machine.handle_transport_lost(reason);
                }
            }
        }
    }

    fn on_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Media { generation, result } => match result {
                Ok(source) => self.machine.handle_media_ready(generation, source),
                Err(e) => self.machine.handle_media_failed(generation, e),
            },
            Completion::Engine {
                generation,
                result,
                sink,
            } => match result {
                Ok(engine) => self.machine.handle_engine_ready(generation, engine, sink),
                Err(e) => {
                    sink.invalidate();
                    self.machine.handle_engine_failed(generation, e);
                }
            },
            Completion::NegotiationTimeout { generation } => {
                self.machine.handle_negotiation_timeout(generation)
            }
            Completion::RematchDue { generation } => self.machine.handle_rematch_due(generation),
        }
    }

    /// Apply a command, execute its outputs, then answer the caller
    ///
    /// Commands that put traffic on the wire answer with the send failure,
    /// if any. Breaks after shutdown.
    async fn on_command(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::RequestMatch { filters, reply } => {
                let result = self.machine.request_match(filters);
                let sent = self.flush().await;
                let _ = reply.send(result.and(sent));
            }
            Command::Skip { reply } => {
                self.machine.skip();
                self.flush().await.ok();
                let _ = reply.send(());
            }
            Command::FindNewPartner { reply } => {
                self.machine.find_new_partner();
                self.flush().await.ok();
                let _ = reply.send(());
            }
            Command::UpdateFilters { filters, reply } => {
                self.machine.update_filters(filters);
                self.flush().await.ok();
                let _ = reply.send(());
            }
            Command::Disconnect { reply } => {
                self.machine.disconnect();
                self.flush().await.ok();
                let _ = reply.send(());
            }
            Command::Leave { reply } => {
                self.machine.leave();
                self.flush().await.ok();
                let _ = reply.send(());
            }
            Command::SendChat { text, reply } => {
                let result = self.machine.send_chat(text);
                let sent = self.flush().await;
                let _ = reply.send(result.and_then(|message| sent.map(|_| message)));
            }
            Command::ToggleTrack { kind, reply } => {
                let result = self.machine.toggle_track(kind);
                self.flush().await.ok();
                let _ = reply.send(result);
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.machine.snapshot());
            }
            Command::Subscribe { reply } => {
                let stream = self.subscribe();
                let _ = reply.send(stream);
            }
            Command::Shutdown { reply } => {
                info!("🛑 Session controller shutting down");
                self.machine.leave();
                self.flush().await.ok();
                let _ = reply.send(());
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    /// Execute every queued output
    ///
    /// Returns the first transport send failure. A failed send is handled
    /// as transport loss before the remaining outputs run.
    async fn flush(&mut self) -> Result<(), PairChatError> {
        let mut sent = Ok(());
        while let Some(output) = self.machine.poll_output() {
            match output {
                Output::Transmit(event) => {
                    let name = event.event_name();
                    if let Err(e) = self.transport.send(event).await {
                        error!("📡 Failed to send {}: {}", name, e);
                        if sent.is_ok() {
                            self.transport_lost = true;
                            self.machine.handle_transport_lost(e.to_string());
                            sent = Err(e);
                        }
                    }
                }
                Output::Emit(event) => self.publish(event),
                Output::AcquireMedia {
                    generation,
                    constraints,
                } => {
                    debug!("🎥 Acquiring local media for attempt {}", generation);
                    let devices = Arc::clone(&self.media_devices);
                    let tx = self.completion_tx.clone();
                    let handle = tokio::spawn(async move {
                        let result = devices.acquire(&constraints).await;
                        let _ = tx.send(Completion::Media { generation, result });
                    });
                    self.track_task(generation, handle, None);
                }
                Output::BuildEngine {
                    generation,
                    config,
                    media,
                } => {
                    debug!(
                        "⚙️ Building engine for attempt {} as {:?}",
                        generation, config.role
                    );
                    let sink = EngineEventSink::new(generation, self.engine_tx.clone());
                    let factory = Arc::clone(&self.engine_factory);
                    let tx = self.completion_tx.clone();
                    let task_sink = sink.clone();
                    let handle = tokio::spawn(async move {
                        let result = factory.create(config, media, task_sink.clone()).await;
                        let _ = tx.send(Completion::Engine {
                            generation,
                            result,
                            sink: task_sink,
                        });
                    });
                    self.track_task(generation, handle, Some(sink));
                }
                Output::ArmNegotiationTimer { generation, after } => {
                    let tx = self.completion_tx.clone();
                    let handle = tokio::spawn(async move {
                        tokio::time::sleep(after).await;
                        let _ = tx.send(Completion::NegotiationTimeout { generation });
                    });
                    self.track_task(generation, handle, None);
                }
                Output::ScheduleRematch { generation, after } => {
                    let tx = self.completion_tx.clone();
                    let handle = tokio::spawn(async move {
                        tokio::time::sleep(after).await;
                        let _ = tx.send(Completion::RematchDue { generation });
                    });
                    self.track_task(generation, handle, None);
                }
            }
        }
        self.cancel_stale_tasks();
        sent
    }

    fn publish(&mut self, event: SessionEvent) {
        debug!("📡 Session event: {}", event.event_type());
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn track_task(
        &mut self,
        generation: Generation,
        handle: JoinHandle<()>,
        sink: Option<EngineEventSink>,
    ) {
        self.tasks.push(PendingTask {
            generation,
            handle,
            sink,
        });
    }

    /// Abort work that belongs to an attempt that no longer exists
    fn cancel_stale_tasks(&mut self) {
        let current = self.machine.generation();
        self.tasks.retain(|task| {
            if task.handle.is_finished() {
                return false;
            }
            if task.generation != current {
                if let Some(sink) = &task.sink {
                    sink.invalidate();
                }
                task.handle.abort();
                return false;
            }
            true
        });
    }

    fn cancel_all_tasks(&mut self) {
        for task in self.tasks.drain(..) {
            if let Some(sink) = &task.sink {
                sink.invalidate();
            }
            task.handle.abort();
        }
    }
}
