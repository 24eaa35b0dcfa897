//! TCP sync server
//!
//! One task per connection. A connection binds to a save with `Open` and then
//! exchanges framed request/response pairs; every request produces exactly
//! one reply. Scheduler calls take blocking locks and may touch the save
//! repository, so they run on the blocking pool.

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::metrics::Metrics;
use crate::net::framing::{read_message, write_message, FramingError};
use crate::net::protocol::{decode, encode, ClientMessage, ErrorKind, ServerMessage};
use crate::net::scheduler::{SchedulerError, TickScheduler};
use crate::net::session::SessionKey;

/// Sync server
pub struct SyncServer {
    scheduler: Arc<TickScheduler>,
    metrics: Arc<Metrics>,
}

impl SyncServer {
    pub fn new(scheduler: Arc<TickScheduler>) -> Self {
        let metrics = scheduler.metrics().clone();
        Self { scheduler, metrics }
    }

    /// Bind and serve until the task is dropped
    pub async fn run(self, addr: SocketAddr) -> anyhow::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!("Sync server listening on {}", listener.local_addr()?);
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener
    pub async fn serve(self, listener: TcpListener) -> anyhow::Result<()> {
        loop {
            let (socket, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Accept failed: {}", e);
                    continue;
                }
            };

            let scheduler = self.scheduler.clone();
            let metrics = self.metrics.clone();
            tokio::spawn(async move {
                metrics.connections_active.fetch_add(1, Ordering::Relaxed);
                let result = handle_connection(socket, peer, scheduler, metrics.clone()).await;
                metrics.connections_active.fetch_sub(1, Ordering::Relaxed);
                match result {
                    Ok(()) | Err(FramingError::ConnectionClosed) => {
                        debug!("Connection from {} closed", peer)
                    }
                    Err(e) => warn!("Connection error from {}: {}", peer, e),
                }
            });
        }
    }
}

async fn handle_connection(
    mut socket: TcpStream,
    peer: SocketAddr,
    scheduler: Arc<TickScheduler>,
    metrics: Arc<Metrics>,
) -> Result<(), FramingError> {
    socket.set_nodelay(true)?;
    debug!("New connection from {}", peer);

    // Save this connection is bound to
    let mut bound: Option<SessionKey> = None;

    loop {
        let data = read_message(&mut socket).await?;
        metrics
            .bytes_received
            .fetch_add(data.len() as u64 + 4, Ordering::Relaxed);

        let reply = match decode::<ClientMessage>(&data) {
            Ok(message) => dispatch(&scheduler, &mut bound, message).await,
            Err(e) => {
                warn!("Failed to decode client message from {}: {}", peer, e);
                Metrics::incr(&metrics.request_errors);
                ServerMessage::Error {
                    kind: ErrorKind::Protocol,
                    message: e.to_string(),
                }
            }
        };

        let encoded = encode(&reply)?;
        write_message(&mut socket, &encoded).await?;
        metrics
            .bytes_sent
            .fetch_add(encoded.len() as u64 + 4, Ordering::Relaxed);
    }
}

/// Route one request to the scheduler
async fn dispatch(
    scheduler: &Arc<TickScheduler>,
    bound: &mut Option<SessionKey>,
    message: ClientMessage,
) -> ServerMessage {
    let now = Instant::now();

    if let ClientMessage::Ping { timestamp } = message {
        return ServerMessage::Pong {
            client_timestamp: timestamp,
            server_timestamp: unix_millis(),
        };
    }

    if let ClientMessage::Open { player, save } = message {
        let key = SessionKey::new(player, save);
        if let Some(previous) = bound.as_ref().filter(|previous| **previous != key) {
            debug!("Connection rebinding from {} to {}", previous, key);
        }
        let result = blocking(scheduler, {
            let key = key.clone();
            move |s| s.open(&key, now)
        })
        .await;
        return match result {
            Ok(response) => {
                info!("Opened session {}", key);
                *bound = Some(key);
                ServerMessage::Opened(response)
            }
            Err(e) => error_reply(scheduler, e),
        };
    }

    let Some(key) = bound.clone() else {
        Metrics::incr(&scheduler.metrics().request_errors);
        return ServerMessage::Error {
            kind: ErrorKind::NotOpened,
            message: "No session open on this connection".to_string(),
        };
    };

    match message {
        ClientMessage::Sync => {
            match blocking(scheduler, move |s| s.sync(&key, now)).await {
                Ok(response) => ServerMessage::Sync(response),
                Err(e) => error_reply(scheduler, e),
            }
        }
        ClientMessage::Action(action) => {
            if let Err(e) = action.validate_params() {
                Metrics::incr(&scheduler.metrics().actions_rejected);
                return ServerMessage::Error {
                    kind: ErrorKind::Protocol,
                    message: e.to_string(),
                };
            }
            match blocking(scheduler, move |s| s.perform(&key, &action, now)).await {
                Ok(response) => ServerMessage::Sync(response),
                Err(e) => error_reply(scheduler, e),
            }
        }
        ClientMessage::Close => {
            let closing = key.clone();
            match blocking(scheduler, move |s| s.close(&closing)).await {
                Ok(_) => {
                    *bound = None;
                    ServerMessage::Closed
                }
                Err(e) => error_reply(scheduler, e),
            }
        }
        ClientMessage::Open { .. } | ClientMessage::Ping { .. } => ServerMessage::Error {
            kind: ErrorKind::Internal,
            message: "Unroutable message".to_string(),
        },
    }
}

/// Run a scheduler call on the blocking pool
async fn blocking<T, F>(scheduler: &Arc<TickScheduler>, f: F) -> Result<T, SchedulerError>
where
    T: Send + 'static,
    F: FnOnce(&TickScheduler) -> Result<T, SchedulerError> + Send + 'static,
{
    let scheduler = scheduler.clone();
    match tokio::task::spawn_blocking(move || f(&scheduler)).await {
        Ok(result) => result,
        Err(e) => Err(SchedulerError::Worker(e.to_string())),
    }
}

fn error_reply(scheduler: &TickScheduler, error: SchedulerError) -> ServerMessage {
    Metrics::incr(&scheduler.metrics().request_errors);
    let kind = error.kind();
    if kind == ErrorKind::Internal {
        warn!("Request failed: {}", error);
    } else {
        debug!("Request failed: {}", error);
    }
    ServerMessage::Error {
        kind,
        message: error.to_string(),
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Periodically persist and drop sessions idle longer than `timeout`
pub fn start_session_reaper(
    scheduler: Arc<TickScheduler>,
    period: Duration,
    timeout: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let result = blocking(&scheduler, move |s| Ok(s.evict_idle(timeout, Instant::now()))).await;
            match result {
                Ok(0) => {}
                Ok(evicted) => info!("Reaper evicted {} idle sessions", evicted),
                Err(e) => warn!("Reaper failed: {}", e),
            }
        }
    })
}
