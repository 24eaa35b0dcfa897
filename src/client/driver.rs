//! Client tick driver
//!
//! Polls the server on a fixed real-time cadence while unpaused and forwards
//! every response to the UI side over a crossbeam channel. Player actions
//! freeze the local clock while in flight so unconfirmed time is never shown.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::{interval_at, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::client::clock::{InterpolatedClock, ResyncOutcome};
use crate::game::actions::GameAction;
use crate::game::constants::sync::SYNC_INTERVAL_MS;
use crate::net::framing::FramingError;
use crate::net::protocol::{ClientMessage, ErrorKind, ServerMessage, SyncResponse};

/// Request/response channel to the server
#[allow(async_fn_in_trait)]
pub trait SyncTransport {
    async fn request(&mut self, message: ClientMessage) -> Result<ServerMessage, DriverError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("Connection closed")]
    Disconnected,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Framing error: {0}")]
    Framing(#[from] FramingError),
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
    #[error("Driver stopped")]
    Stopped,
}

impl DriverError {
    /// Whether the connection is unusable and the driver should stop
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DriverError::Disconnected
                | DriverError::Io(_)
                | DriverError::Stopped
                | DriverError::Framing(FramingError::ConnectionClosed)
                | DriverError::Framing(FramingError::Io(_))
        )
    }
}

/// Commands from the UI to the driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCommand {
    Action(GameAction),
    Pause,
    Resume,
    Shutdown,
}

/// Notifications from the driver to the UI
#[derive(Debug, Clone, PartialEq)]
pub enum DriverEvent {
    /// A sync or action response; the delta goes to the applier
    Response {
        response: SyncResponse,
        from_action: bool,
        resync: ResyncOutcome,
    },
    /// The server stopped accrual for inactivity
    AutoPaused,
    /// Server-side failure for one request
    ServerError { kind: ErrorKind, message: String },
    /// Transport failure for one request; the next cadence retries
    TransportError(String),
    Stopped,
}

/// UI-side handle to a running driver
pub struct DriverHandle {
    commands: mpsc::Sender<DriverCommand>,
    events: crossbeam_channel::Receiver<DriverEvent>,
    clock: Arc<Mutex<InterpolatedClock>>,
}

impl DriverHandle {
    pub async fn send(&self, command: DriverCommand) -> Result<(), DriverError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| DriverError::Stopped)
    }

    /// Drain pending events without blocking
    pub fn drain_events(&self) -> Vec<DriverEvent> {
        self.events.try_iter().collect()
    }

    pub fn events(&self) -> &crossbeam_channel::Receiver<DriverEvent> {
        &self.events
    }

    /// Displayed `(time_of_day, current_day)` at `now`
    pub fn display(&self, now: Instant) -> (u32, u32) {
        self.clock.lock().display(now)
    }

    pub fn clock(&self) -> Arc<Mutex<InterpolatedClock>> {
        self.clock.clone()
    }
}

pub struct TickDriver<T: SyncTransport> {
    transport: T,
    clock: Arc<Mutex<InterpolatedClock>>,
    commands: mpsc::Receiver<DriverCommand>,
    events: crossbeam_channel::Sender<DriverEvent>,
    cadence: Duration,
    paused: bool,
}

impl<T: SyncTransport> TickDriver<T> {
    pub fn new(transport: T, clock: InterpolatedClock) -> (Self, DriverHandle) {
        let (command_tx, command_rx) = mpsc::channel(32);
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        let clock = Arc::new(Mutex::new(clock));

        let driver = Self {
            transport,
            clock: clock.clone(),
            commands: command_rx,
            events: event_tx,
            cadence: Duration::from_millis(SYNC_INTERVAL_MS),
            paused: false,
        };
        let handle = DriverHandle {
            commands: command_tx,
            events: event_rx,
            clock,
        };
        (driver, handle)
    }

    pub fn with_cadence(mut self, cadence: Duration) -> Self {
        self.cadence = cadence;
        self
    }

    /// Run until shutdown, a dropped handle or a fatal transport error
    pub async fn run(mut self) -> Result<(), DriverError> {
        let start = tokio::time::Instant::now() + self.cadence;
        let mut ticker = interval_at(start, self.cadence);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Tick driver started, cadence {:?}", self.cadence);

        let result = loop {
            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else { break Ok(()) };
                    match command {
                        DriverCommand::Shutdown => break Ok(()),
                        DriverCommand::Pause => {
                            self.paused = true;
                            self.clock.lock().pause(Instant::now());
                            if let Err(e) = self.exchange(GameAction::Pause).await {
                                if e.is_fatal() { break Err(e) }
                            }
                        }
                        DriverCommand::Resume => {
                            self.paused = false;
                            if let Err(e) = self.exchange(GameAction::Resume).await {
                                if e.is_fatal() { break Err(e) }
                            }
                        }
                        DriverCommand::Action(action) => {
                            if let Err(e) = self.exchange(action).await {
                                if e.is_fatal() { break Err(e) }
                            }
                        }
                    }
                }
                _ = ticker.tick(), if !self.paused => {
                    if let Err(e) = self.sync().await {
                        if e.is_fatal() { break Err(e) }
                    }
                }
            }
        };

        let _ = self.events.send(DriverEvent::Stopped);
        info!("Tick driver stopped");
        result
    }

    async fn sync(&mut self) -> Result<(), DriverError> {
        let reply = self.transport.request(ClientMessage::Sync).await;
        self.handle_reply(reply, false)
    }

    /// Send an action with the clock frozen until the server answers
    async fn exchange(&mut self, action: GameAction) -> Result<(), DriverError> {
        debug!("Sending action {}", action.name());
        self.clock.lock().pause(Instant::now());
        let reply = self.transport.request(ClientMessage::Action(action)).await;
        if !self.paused {
            self.clock.lock().resume(Instant::now());
        }
        self.handle_reply(reply, true)
    }

    fn handle_reply(
        &mut self,
        reply: Result<ServerMessage, DriverError>,
        from_action: bool,
    ) -> Result<(), DriverError> {
        let message = match reply {
            Ok(message) => message,
            Err(e) => {
                warn!("Sync request failed: {}", e);
                self.emit(DriverEvent::TransportError(e.to_string()));
                return Err(e);
            }
        };

        match message {
            ServerMessage::Sync(response) | ServerMessage::Opened(response) => {
                let resync = self.clock.lock().on_authoritative(
                    response.time_of_day,
                    response.current_day,
                    Instant::now(),
                    response.force_resync,
                );
                let auto_paused = response.auto_paused;
                self.emit(DriverEvent::Response {
                    response,
                    from_action,
                    resync,
                });
                if auto_paused && !self.paused {
                    info!("Server auto-paused the session");
                    self.paused = true;
                    self.clock.lock().pause(Instant::now());
                    self.emit(DriverEvent::AutoPaused);
                }
                Ok(())
            }
            ServerMessage::Error { kind, message } => {
                warn!("Server error {:?}: {}", kind, message);
                self.emit(DriverEvent::ServerError { kind, message });
                Ok(())
            }
            ServerMessage::Closed => Err(DriverError::Disconnected),
            other => Err(DriverError::UnexpectedResponse(format!("{:?}", other))),
        }
    }

    fn emit(&self, event: DriverEvent) {
        if self.events.send(event).is_err() {
            debug!("Driver event dropped, no receiver");
        }
    }
}
