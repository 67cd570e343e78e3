// Socket Subscriber - Project Beacon
//
// One long-lived push connection per venue, owning the reconnect/backoff
// state machine and the heartbeat/staleness detector. Accepted tickers are
// forwarded to the aggregator queue; the connection never permanently gives
// up on a venue while the engine runs.

use crate::backoff::BackoffPolicy;
use crate::cache::TickerCache;
use crate::health::HealthMonitor;
use crate::types::{ConnectionState, Ticker};
use crate::validate::Validator;
use crate::venue::VenueAdapter;
use futures_util::{SinkExt, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

enum SessionEnd {
    Reconnect,
    Shutdown,
}

pub struct SocketSubscriber {
    pub adapter: Arc<dyn VenueAdapter>,
    pub cache: Arc<TickerCache>,
    pub validator: Arc<Validator>,
    pub health: Arc<HealthMonitor>,
    pub universe: Arc<HashSet<String>>,
    /// Canonical pairs to subscribe on connect.
    pub pairs: Vec<String>,
    pub update_tx: mpsc::Sender<Ticker>,
    pub connect_timeout: Duration,
    pub heartbeat_timeout: Duration,
    /// Proactive recycle window, ahead of venue-side 24h connection limits.
    pub connection_lifetime: Duration,
    pub backoff: BackoffPolicy,
}

impl SocketSubscriber {
    pub fn spawn(
        self,
        shutdown: watch::Receiver<bool>,
        reconnect_rx: mpsc::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown, reconnect_rx))
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>, mut reconnect_rx: mpsc::Receiver<()>) {
        let venue = self.adapter.name();
        let Some(ws_url) = self.adapter.ws_url().map(str::to_string) else {
            debug!(venue, "no push endpoint; socket subscriber idle");
            return;
        };

        let mut attempt: u32 = 0;
        loop {
            if *shutdown.borrow() {
                break;
            }

            self.health.set_state(venue, ConnectionState::Connecting);
            info!(venue, url = %ws_url, "connecting push feed");

            let connecting = tokio::time::timeout(self.connect_timeout, connect_async(ws_url.as_str()));
            tokio::select! {
                result = connecting => match result {
                    Ok(Ok((stream, _response))) => {
                        attempt = 0;
                        self.health.set_state(venue, ConnectionState::Connected);
                        info!(venue, "push feed connected");

                        let end = self
                            .stream_session(stream, &mut shutdown, &mut reconnect_rx)
                            .await;
                        self.health.set_state(venue, ConnectionState::Disconnected);
                        if matches!(end, SessionEnd::Shutdown) {
                            return;
                        }
                    }
                    Ok(Err(error)) => {
                        warn!(venue, %error, "push connect failed");
                        self.health.set_state(venue, ConnectionState::Disconnected);
                    }
                    Err(_elapsed) => {
                        warn!(venue, timeout = ?self.connect_timeout, "push connect timed out");
                        self.health.set_state(venue, ConnectionState::Disconnected);
                    }
                },
                _ = shutdown.changed() => break,
            }

            self.health.set_state(venue, ConnectionState::Reconnecting);
            attempt = attempt.saturating_add(1);
            let delay = self.backoff.delay(attempt);
            info!(venue, attempt, ?delay, "scheduling push reconnect");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => break,
            }
        }

        self.health.set_state(venue, ConnectionState::Disconnected);
        debug!(venue, "socket subscriber stopped");
    }

    /// One connected session: subscribe handshake, then the read loop until
    /// error, close, staleness, recycle, commanded reconnect, or shutdown.
    async fn stream_session(
        &self,
        stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
        shutdown: &mut watch::Receiver<bool>,
        reconnect_rx: &mut mpsc::Receiver<()>,
    ) -> SessionEnd {
        let venue = self.adapter.name();
        let (mut write, mut read) = stream.split();

        for message in self.adapter.subscribe_messages(&self.pairs) {
            if let Err(error) = write.send(Message::Text(message.into())).await {
                warn!(venue, %error, "failed to send subscribe message");
                return SessionEnd::Reconnect;
            }
        }

        let session_deadline = Instant::now() + self.connection_lifetime;
        let mut heartbeat_deadline = Instant::now() + self.heartbeat_timeout;
        let mut commands_open = true;

        loop {
            tokio::select! {
                message = read.next() => match message {
                    Some(Ok(Message::Text(text))) => {
                        heartbeat_deadline = Instant::now() + self.heartbeat_timeout;
                        if !self.handle_frame(text.as_str()).await {
                            return SessionEnd::Shutdown;
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        // Keepalives count as liveness.
                        heartbeat_deadline = Instant::now() + self.heartbeat_timeout;
                        if write.send(Message::Pong(payload)).await.is_err() {
                            warn!(venue, "failed to send pong");
                            return SessionEnd::Reconnect;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        heartbeat_deadline = Instant::now() + self.heartbeat_timeout;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        warn!(venue, ?frame, "push feed closed by server");
                        return SessionEnd::Reconnect;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        if is_expected_disconnect(&error) {
                            warn!(venue, %error, "transient push disconnect");
                        } else {
                            warn!(venue, %error, "push feed error");
                        }
                        return SessionEnd::Reconnect;
                    }
                    None => {
                        warn!(venue, "push stream ended");
                        return SessionEnd::Reconnect;
                    }
                },
                _ = tokio::time::sleep_until(heartbeat_deadline) => {
                    warn!(
                        venue,
                        window = ?self.heartbeat_timeout,
                        "no frames within heartbeat window; forcing reconnect"
                    );
                    return SessionEnd::Reconnect;
                }
                _ = tokio::time::sleep_until(session_deadline) => {
                    info!(venue, "scheduled connection recycle");
                    return SessionEnd::Reconnect;
                }
                command = reconnect_rx.recv(), if commands_open => match command {
                    Some(()) => {
                        info!(venue, "reconnect commanded by health monitor");
                        return SessionEnd::Reconnect;
                    }
                    None => commands_open = false,
                },
                _ = shutdown.changed() => {
                    let _ = write.send(Message::Close(None)).await;
                    return SessionEnd::Shutdown;
                }
            }
        }
    }

    /// Parse, validate, and enqueue one inbound frame. Returns false only
    /// when the aggregator queue is gone (engine stopping).
    async fn handle_frame(&self, frame: &str) -> bool {
        let venue = self.adapter.name();
        let tickers = self.adapter.parse_push_frame(frame);
        if tickers.is_empty() {
            // Control frame or unrecognized shape.
            debug!(venue, "unhandled push frame");
            return true;
        }

        for ticker in tickers {
            if !self.universe.contains(&ticker.pair) {
                continue;
            }
            match self.validator.validate(&ticker, &self.cache) {
                Ok(()) => {
                    self.health.record_update(venue);
                    if self.update_tx.send(ticker).await.is_err() {
                        return false;
                    }
                }
                Err(reason) => {
                    warn!(venue, pair = %ticker.pair, %reason, "push tick rejected");
                }
            }
        }
        true
    }
}

fn is_expected_disconnect(error: &tungstenite::Error) -> bool {
    matches!(
        error,
        tungstenite::Error::ConnectionClosed
            | tungstenite::Error::AlreadyClosed
            | tungstenite::Error::Protocol(ProtocolError::ResetWithoutClosingHandshake)
            | tungstenite::Error::Io(_)
    )
}
