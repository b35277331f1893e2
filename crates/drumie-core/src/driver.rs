//! The session driver task.
//!
//! One driver owns the connection, the connection state and every channel.
//! It selects over timers, completions of spawned token fetches and dials,
//! inbound frames, and application commands. Every callback fires from
//! here, so callbacks never interleave with frame handling.
//!
//! Spawned work is tagged with an epoch. The session epoch is bumped on
//! every connect attempt and teardown, each channel's epoch on every
//! subscribe attempt and cancellation; a completion whose epoch no longer
//! matches is discarded.

use bytes::Bytes;
use drumie_protocol::{Frame, Payload, ProtocolError, PROTOCOL_VERSION};
use drumie_transport::{
    Connection, Connector, TransportError, WebSocketConfig, WebSocketConnector,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::channel::{validate_channel_name, Channel, ChannelSpec, ChannelState};
use crate::codes;
use crate::config::SessionConfig;
use crate::dispatcher::{self, ChannelEvent, DropReason, Route, SessionEvent};
use crate::error::ClientError;
use crate::events::{ConnectedContext, ConnectingContext, DisconnectedContext, SessionCallbacks};
use crate::metrics;
use crate::presence::PresenceState;
use crate::registry::{ChannelRegistry, ChannelSlot};
use crate::session::{ConnectionState, SessionOptions};
use crate::token::{
    ConnectTokenProvider, SubscribeTokenRequest, Token, TokenError,
};

/// Identifies a channel registration.
#[derive(Debug, Clone)]
pub(crate) struct ChannelRef {
    pub(crate) name: String,
    pub(crate) id: u64,
}

/// Requests from [`Session`](crate::Session) and
/// [`ChannelHandle`](crate::ChannelHandle).
pub(crate) enum Command {
    Connect,
    SubscribeAll {
        reply: oneshot::Sender<()>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    AddChannel {
        spec: ChannelSpec,
        reply: oneshot::Sender<Result<ChannelSlot, ClientError>>,
    },
    RemoveChannel {
        channel: ChannelRef,
        reply: oneshot::Sender<Result<(), ClientError>>,
    },
    Subscribe {
        channel: ChannelRef,
        reply: oneshot::Sender<Result<(), ClientError>>,
    },
    Unsubscribe {
        channel: ChannelRef,
        reply: oneshot::Sender<Result<(), ClientError>>,
    },
    Publish {
        channel: ChannelRef,
        payload: Payload,
        reply: oneshot::Sender<Result<(), ClientError>>,
    },
    Presence {
        channel: ChannelRef,
        reply: oneshot::Sender<Result<Vec<PresenceState>, ClientError>>,
    },
}

/// Completions of work spawned by the driver.
enum Event {
    ConnectToken {
        epoch: u64,
        result: Result<Token, TokenError>,
    },
    Dialed {
        epoch: u64,
        result: Result<Box<dyn Connection>, TransportError>,
    },
    SubscribeToken {
        channel: ChannelRef,
        epoch: u64,
        result: Result<Token, TokenError>,
    },
}

struct Heartbeat {
    interval: Duration,
    next_ping: Instant,
    last_inbound: Instant,
}

impl Heartbeat {
    fn new(interval: Duration) -> Self {
        let now = Instant::now();
        Self {
            interval,
            next_ping: now + interval,
            last_inbound: now,
        }
    }

    /// The connection is considered dead after two silent intervals.
    fn expires_at(&self) -> Instant {
        self.last_inbound + self.interval * 2
    }

    fn next_wake(&self) -> Instant {
        self.next_ping.min(self.expires_at())
    }
}

enum Backoff {
    Scheduled,
    Disabled,
    Exhausted,
}

pub(crate) struct Driver {
    endpoint: String,
    config: SessionConfig,
    connector: Arc<dyn Connector>,
    token_provider: Arc<dyn ConnectTokenProvider>,
    callbacks: SessionCallbacks,

    registry: Arc<ChannelRegistry>,
    channels: HashMap<String, Channel>,

    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    conn: Option<Box<dyn Connection>>,
    connection_token: Option<Token>,
    epoch: u64,
    attempts: u32,
    next_request_id: u64,

    reconnect_at: Option<Instant>,
    handshake_deadline: Option<Instant>,
    heartbeat: Option<Heartbeat>,

    commands: mpsc::UnboundedReceiver<Command>,
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: mpsc::UnboundedReceiver<Event>,
}

impl Driver {
    pub(crate) fn new(
        endpoint: String,
        options: SessionOptions,
        registry: Arc<ChannelRegistry>,
        commands: mpsc::UnboundedReceiver<Command>,
    ) -> (Self, watch::Receiver<ConnectionState>) {
        let SessionOptions {
            token_provider,
            callbacks,
            config,
            connector,
        } = options;

        let connector: Arc<dyn Connector> = match connector {
            Some(connector) => connector,
            None => Arc::new(WebSocketConnector::new(WebSocketConfig {
                max_message_size: config.max_message_size,
                ..WebSocketConfig::default()
            })),
        };

        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let driver = Self {
            endpoint,
            config,
            connector,
            token_provider,
            callbacks,
            registry,
            channels: HashMap::new(),
            state: ConnectionState::Disconnected,
            state_tx,
            conn: None,
            connection_token: None,
            epoch: 0,
            attempts: 0,
            next_request_id: 0,
            reconnect_at: None,
            handshake_deadline: None,
            heartbeat: None,
            commands,
            events_tx,
            events_rx,
        };
        (driver, state_rx)
    }

    /// Run until every session and channel handle has been dropped.
    pub(crate) async fn run(mut self) {
        debug!(endpoint = %self.endpoint, transport = self.connector.name(), "Session driver started");

        loop {
            let deadline = self.next_deadline();

            tokio::select! {
                biased;

                _ = sleep_until_opt(deadline) => self.on_timer().await,

                Some(event) = self.events_rx.recv() => self.on_event(event).await,

                result = recv_frame(&mut self.conn) => self.on_recv(result).await,

                command = self.commands.recv() => match command {
                    Some(command) => self.on_command(command).await,
                    None => break,
                },
            }
        }

        self.shutdown().await;
    }

    async fn shutdown(&mut self) {
        debug!(endpoint = %self.endpoint, "Session driver stopping");
        self.epoch += 1;
        if let Some(mut conn) = self.conn.take() {
            if let Err(e) = conn.close().await {
                debug!(error = %e, "Error closing transport");
            }
        }
        self.set_state(ConnectionState::Disconnected);
    }

    fn next_deadline(&self) -> Option<Instant> {
        [
            self.reconnect_at,
            self.handshake_deadline,
            self.heartbeat.as_ref().map(Heartbeat::next_wake),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state == state {
            return;
        }
        self.state = state;
        self.state_tx.send_replace(state);
        metrics::set_connection_state(state);
    }

    fn allocate_request_id(&mut self) -> u64 {
        self.next_request_id += 1;
        self.next_request_id
    }

    // ---- channels ----

    pub(crate) fn add_channel(&mut self, spec: ChannelSpec) -> Result<ChannelSlot, ClientError> {
        validate_channel_name(spec.name()).map_err(ClientError::InvalidChannel)?;

        let (state_tx, state_rx) = watch::channel(ChannelState::Unsubscribed);
        let id = self.registry.insert(spec.name(), state_rx.clone())?;
        let name = spec.name().to_string();
        let channel = Channel::new(spec, id, state_tx, self.config.presence);
        self.channels.insert(name, channel);

        Ok(ChannelSlot {
            id,
            state: state_rx,
        })
    }

    fn channel_mut(&mut self, channel: &ChannelRef) -> Result<&mut Channel, ClientError> {
        self.channels
            .get_mut(&channel.name)
            .filter(|ch| ch.id() == channel.id)
            .ok_or_else(|| ClientError::ChannelNotFound(channel.name.clone()))
    }

    async fn remove_channel(&mut self, channel: &ChannelRef) -> Result<(), ClientError> {
        let notify = self.channel_mut(channel)?.deactivate();
        self.channels.remove(&channel.name);
        self.registry.remove(&channel.name, channel.id);

        if notify {
            self.send_unsubscribe(&channel.name).await;
        }
        Ok(())
    }

    /// Mark a channel wanted; subscribes at once when connected.
    fn activate(&mut self, name: &str) {
        let Some(channel) = self.channels.get_mut(name) else {
            return;
        };
        if channel.activate() && self.state == ConnectionState::Connected {
            self.start_subscribe(name, codes::SUBSCRIBE_CALLED, "subscribe called");
        }
    }

    fn subscribe_channel(&mut self, channel: &ChannelRef) -> Result<(), ClientError> {
        let activated = self.channel_mut(channel)?.activate();
        match self.state {
            ConnectionState::Connected if activated => {
                self.start_subscribe(&channel.name, codes::SUBSCRIBE_CALLED, "subscribe called");
            }
            ConnectionState::Disconnected => self.connect(codes::CONNECT_CALLED, "subscribe called"),
            _ => {}
        }
        Ok(())
    }

    async fn unsubscribe_channel(&mut self, channel: &ChannelRef) -> Result<(), ClientError> {
        if self.channel_mut(channel)?.deactivate() {
            self.send_unsubscribe(&channel.name).await;
        }
        Ok(())
    }

    async fn send_unsubscribe(&mut self, name: &str) {
        if self.state != ConnectionState::Connected {
            return;
        }
        let id = self.allocate_request_id();
        // Failure is logged by `send`; the transport loss surfaces on recv
        let _ = self.send(Frame::unsubscribe(id, name)).await;
    }

    /// Spawn a subscribe token fetch for an active channel.
    fn start_subscribe(&mut self, name: &str, code: u16, reason: &str) {
        if self.state != ConnectionState::Connected {
            return;
        }
        let Some(connection_token) = self.connection_token.clone() else {
            return;
        };
        let Some(channel) = self.channels.get_mut(name) else {
            return;
        };
        let Some(epoch) = channel.begin_attempt(code, reason) else {
            return;
        };

        let provider = channel.provider();
        let channel = ChannelRef {
            name: name.to_string(),
            id: channel.id(),
        };
        let events = self.events_tx.clone();

        tokio::spawn(async move {
            let request = SubscribeTokenRequest {
                connection_token,
                channel: channel.name.clone(),
            };
            let result = provider.subscribe_token(request).await;
            let _ = events.send(Event::SubscribeToken {
                channel,
                epoch,
                result,
            });
        });
    }

    fn resubscribe_all(&mut self) {
        for name in self.registry.names() {
            self.start_subscribe(&name, codes::RECONNECTING, "resubscribing");
        }
    }

    async fn on_subscribe_token(
        &mut self,
        channel: ChannelRef,
        epoch: u64,
        result: Result<Token, TokenError>,
    ) {
        if self.state != ConnectionState::Connected {
            return;
        }
        let request_id = self.allocate_request_id();
        let Ok(ch) = self.channel_mut(&channel) else {
            debug!(channel = %channel.name, "Discarding subscribe token for removed channel");
            return;
        };

        match result {
            Ok(token) => {
                if !ch.token_ready(epoch, request_id) {
                    return;
                }
                let frame = Frame::subscribe(request_id, channel.name.as_str(), token.as_str());
                if self.send(frame).await.is_ok() {
                    metrics::record_subscription();
                }
            }
            Err(e) => {
                if ch.token_failed(epoch, e) {
                    metrics::record_error("token_fetch_failed");
                }
            }
        }
    }

    async fn publish(&mut self, channel: &ChannelRef, payload: Payload) -> Result<(), ClientError> {
        let connected = self.state == ConnectionState::Connected;
        let ch = self.channel_mut(channel)?;
        if !connected {
            return Err(ClientError::PublishRejected {
                channel: channel.name.clone(),
                reason: "session not connected",
            });
        }
        ch.check_publish()?;

        let rejected = |reason| ClientError::PublishRejected {
            channel: channel.name.clone(),
            reason,
        };

        let data = drumie_protocol::encode(&Frame::publish(channel.name.as_str(), payload))
            .map_err(|_| rejected("payload could not be encoded"))?;
        if data.len() > self.config.max_message_size {
            return Err(rejected("message too large"));
        }
        self.send_raw(data)
            .await
            .map_err(|_| rejected("transport send failed"))
    }

    // ---- connection ----

    /// Start connecting unless already connecting or connected.
    fn connect(&mut self, code: u16, reason: &str) {
        if self.state != ConnectionState::Disconnected {
            return;
        }
        self.reconnect_at = None;
        self.attempts = 0;
        self.start_connect(code, reason);
    }

    fn start_connect(&mut self, code: u16, reason: &str) {
        self.epoch += 1;
        let epoch = self.epoch;
        self.set_state(ConnectionState::Connecting);
        metrics::record_connect_attempt();
        info!(endpoint = %self.endpoint, code, epoch, "Connecting");

        self.callbacks.connecting(ConnectingContext {
            code,
            reason: reason.to_string(),
            error: None,
        });

        let provider = Arc::clone(&self.token_provider);
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let result = provider.connect_token().await;
            let _ = events.send(Event::ConnectToken { epoch, result });
        });
    }

    fn spawn_dial(&mut self, epoch: u64) {
        let connector = Arc::clone(&self.connector);
        let endpoint = self.endpoint.clone();
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let result = connector.connect(&endpoint).await;
            let _ = events.send(Event::Dialed { epoch, result });
        });
    }

    async fn on_dialed(&mut self, conn: Box<dyn Connection>) {
        let Some(token) = self.connection_token.as_ref() else {
            close_in_background(conn);
            return;
        };
        let frame = Frame::connect(PROTOCOL_VERSION.major, token.as_str(), self.config.name.clone());

        debug!(connection = %conn.id(), "Transport dialed, sending connect frame");
        self.conn = Some(conn);
        self.handshake_deadline = Some(Instant::now() + self.config.handshake_timeout());

        if self.send(frame).await.is_err() {
            self.fail_attempt(
                codes::TRANSPORT_CLOSED,
                ClientError::ConnectFailed("failed to send connect frame".into()),
                true,
            );
        }
    }

    async fn on_connected(&mut self, connection_id: String, version: u8, heartbeat: u32) {
        if self.state != ConnectionState::Connecting || self.conn.is_none() {
            debug!(connection_id = %connection_id, "Ignoring unexpected connected frame");
            metrics::record_dropped(DropReason::Unmatched.as_str());
            return;
        }
        if !PROTOCOL_VERSION.accepts_major(version) {
            warn!(version, supported = %PROTOCOL_VERSION, "Server answered with an unsupported protocol version");
            self.fail_attempt(
                codes::UNSUPPORTED_VERSION,
                ClientError::ConnectFailed(format!("unsupported protocol version {}", version)),
                false,
            );
            return;
        }

        self.handshake_deadline = None;
        self.attempts = 0;
        self.heartbeat = (heartbeat > 0).then(|| Heartbeat::new(Duration::from_millis(heartbeat.into())));
        self.set_state(ConnectionState::Connected);

        let transport = self.connector.name();
        info!(connection_id = %connection_id, transport, heartbeat, "Session connected");
        self.callbacks.connected(ConnectedContext {
            connection_id,
            transport,
            version,
            heartbeat,
        });

        self.resubscribe_all();
    }

    /// A connect attempt failed before the session reached `Connected`.
    fn fail_attempt(&mut self, code: u16, error: ClientError, reconnect: bool) {
        warn!(endpoint = %self.endpoint, code, error = %error, "Connect attempt failed");
        metrics::record_error(error.kind());
        let reason = error.to_string();

        self.callbacks.connecting(ConnectingContext {
            code,
            reason: reason.clone(),
            error: Some(error),
        });
        self.lose_connection(code, reason, reconnect);
    }

    /// An established or half-established transport went away.
    fn lose_connection(&mut self, code: u16, reason: String, reconnect: bool) {
        info!(endpoint = %self.endpoint, code, reason = %reason, "Session disconnected");
        self.epoch += 1;
        self.reset_connection();

        let outcome = if reconnect {
            self.schedule_reconnect()
        } else {
            self.attempts = 0;
            Backoff::Disabled
        };

        let ctx = match outcome {
            Backoff::Scheduled => DisconnectedContext {
                code,
                reason,
                reconnect: true,
            },
            Backoff::Disabled => DisconnectedContext {
                code,
                reason,
                reconnect: false,
            },
            Backoff::Exhausted => DisconnectedContext {
                code: codes::RECONNECT_EXHAUSTED,
                reason: format!("reconnect attempts exhausted after: {}", reason),
                reconnect: false,
            },
        };
        self.callbacks.disconnected(ctx);
    }

    /// Drop the transport and return every channel to `Unsubscribed`.
    fn reset_connection(&mut self) {
        if let Some(conn) = self.conn.take() {
            close_in_background(conn);
        }
        self.connection_token = None;
        self.handshake_deadline = None;
        self.heartbeat = None;
        self.set_state(ConnectionState::Disconnected);
        for channel in self.channels.values_mut() {
            channel.session_lost();
        }
    }

    fn schedule_reconnect(&mut self) -> Backoff {
        if !self.config.reconnect.enabled {
            return Backoff::Disabled;
        }
        match self.config.reconnect.delay(self.attempts) {
            Some(delay) => {
                self.attempts += 1;
                self.reconnect_at = Some(Instant::now() + delay);
                metrics::record_reconnect_scheduled();
                info!(attempt = self.attempts, delay_ms = delay.as_millis() as u64, "Reconnect scheduled");
                Backoff::Scheduled
            }
            None => {
                warn!(attempts = self.attempts, "Reconnect attempts exhausted");
                self.attempts = 0;
                Backoff::Exhausted
            }
        }
    }

    fn disconnect(&mut self) {
        let was_disconnected = self.state == ConnectionState::Disconnected;

        self.epoch += 1;
        self.reconnect_at = None;
        self.attempts = 0;
        for channel in self.channels.values_mut() {
            channel.release();
        }
        self.reset_connection();

        if !was_disconnected {
            info!(endpoint = %self.endpoint, "Session disconnected by application");
            self.callbacks.disconnected(DisconnectedContext {
                code: codes::DISCONNECT_CALLED,
                reason: "disconnect called".to_string(),
                reconnect: false,
            });
        }
    }

    // ---- I/O ----

    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        trace!(frame_type = ?frame.frame_type(), channel = ?frame.channel(), "Outbound frame");
        let data = drumie_protocol::encode(&frame).map_err(|e| {
            warn!(error = %e, "Failed to encode frame");
            TransportError::Protocol(e)
        })?;
        self.send_raw(data).await
    }

    async fn send_raw(&mut self, data: Bytes) -> Result<(), TransportError> {
        let Some(conn) = self.conn.as_mut() else {
            return Err(TransportError::ConnectionClosed);
        };
        let len = data.len();
        match conn.send_raw(data).await {
            Ok(()) => {
                metrics::record_outbound(len);
                Ok(())
            }
            Err(e) => {
                warn!(connection = %conn.id(), error = %e, "Failed to send frame");
                metrics::record_error("send");
                Err(e)
            }
        }
    }

    async fn on_recv(&mut self, result: Result<Option<Frame>, TransportError>) {
        match result {
            Ok(Some(frame)) => {
                metrics::record_inbound();
                if let Some(heartbeat) = self.heartbeat.as_mut() {
                    heartbeat.last_inbound = Instant::now();
                }
                self.on_frame(frame).await;
            }
            Ok(None) => {
                self.lose_connection(codes::TRANSPORT_CLOSED, "transport closed".into(), true);
            }
            Err(TransportError::Protocol(ProtocolError::Decode(e))) => {
                debug!(error = %e, "Dropping malformed frame");
                metrics::record_dropped(DropReason::Malformed.as_str());
            }
            Err(e) => {
                warn!(error = %e, "Transport error");
                metrics::record_error("transport");
                self.lose_connection(codes::TRANSPORT_CLOSED, e.to_string(), true);
            }
        }
    }

    async fn on_frame(&mut self, frame: Frame) {
        trace!(frame_type = ?frame.frame_type(), channel = ?frame.channel(), "Inbound frame");

        match dispatcher::route(frame) {
            Route::Session(event) => self.on_session_event(event).await,
            Route::Channel { channel, event } => self.deliver(&channel, event),
            Route::Dropped(reason) => {
                debug!(reason = reason.as_str(), "Dropping inbound frame");
                metrics::record_dropped(reason.as_str());
            }
        }
    }

    fn deliver(&mut self, name: &str, event: ChannelEvent) {
        let Some(channel) = self.channels.get_mut(name) else {
            debug!(channel = %name, "Dropping frame for unknown channel");
            metrics::record_dropped(DropReason::UnknownChannel.as_str());
            return;
        };
        if !dispatcher::deliver(channel, event) {
            trace!(channel = %name, "Channel not accepting frame");
            metrics::record_dropped(DropReason::NotSubscribed.as_str());
        }
    }

    /// The channel waiting on subscribe request `id`, if any.
    fn channel_awaiting(&self, id: u64) -> Option<String> {
        self.channels
            .values()
            .find(|ch| ch.pending_request() == Some(id))
            .map(|ch| ch.name().to_string())
    }

    async fn on_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Connected {
                connection_id,
                version,
                heartbeat,
            } => self.on_connected(connection_id, version, heartbeat).await,
            SessionEvent::Disconnect {
                code,
                reason,
                reconnect,
            } if self.state == ConnectionState::Connecting => {
                self.fail_attempt(code, ClientError::ConnectFailed(reason), reconnect);
            }
            SessionEvent::Disconnect {
                code,
                reason,
                reconnect,
            } => {
                info!(code, reason = %reason, reconnect, "Server closed the session");
                self.lose_connection(code, reason, reconnect);
            }
            SessionEvent::Ping { timestamp } => {
                let _ = self.send(Frame::pong(timestamp)).await;
            }
            SessionEvent::Pong => {}
            SessionEvent::Ack { id } => match self.channel_awaiting(id) {
                Some(name) => self.deliver(&name, ChannelEvent::SubscribeAck { id }),
                None => {
                    trace!(id, "Unmatched ack");
                    metrics::record_dropped(DropReason::Unmatched.as_str());
                }
            },
            SessionEvent::Error { id, code, message } => match self.channel_awaiting(id) {
                Some(name) => self.deliver(&name, ChannelEvent::SubscribeError { id, code, message }),
                None => {
                    warn!(id, code, message = %message, "Server reported an error");
                    metrics::record_error("server");
                }
            },
        }
    }

    async fn on_event(&mut self, event: Event) {
        match event {
            Event::ConnectToken { epoch, result } => {
                if epoch != self.epoch || self.state != ConnectionState::Connecting {
                    debug!(epoch, current = self.epoch, "Discarding stale connection token");
                    return;
                }
                match result {
                    Ok(token) => {
                        self.connection_token = Some(token);
                        self.spawn_dial(epoch);
                    }
                    Err(e) => self.fail_attempt(codes::TOKEN_FETCH_FAILED, e.into(), true),
                }
            }
            Event::Dialed { epoch, result } => {
                let stale = epoch != self.epoch || self.state != ConnectionState::Connecting;
                match result {
                    Ok(conn) if stale => {
                        debug!(epoch, current = self.epoch, "Closing stale transport");
                        close_in_background(conn);
                    }
                    Ok(conn) => self.on_dialed(conn).await,
                    Err(_) if stale => {}
                    Err(e) => {
                        self.fail_attempt(
                            codes::CONNECT_FAILED,
                            ClientError::ConnectFailed(e.to_string()),
                            true,
                        );
                    }
                }
            }
            Event::SubscribeToken {
                channel,
                epoch,
                result,
            } => self.on_subscribe_token(channel, epoch, result).await,
        }
    }

    async fn on_timer(&mut self) {
        let now = Instant::now();

        if self.reconnect_at.is_some_and(|at| at <= now) {
            self.reconnect_at = None;
            if self.state == ConnectionState::Disconnected {
                self.start_connect(codes::RECONNECTING, "reconnecting");
            }
        }

        if self.handshake_deadline.is_some_and(|at| at <= now) {
            self.fail_attempt(
                codes::HANDSHAKE_TIMEOUT,
                ClientError::ConnectFailed("handshake timed out".into()),
                true,
            );
            return;
        }

        let Some(heartbeat) = self.heartbeat.as_mut() else {
            return;
        };
        if heartbeat.expires_at() <= now {
            warn!(endpoint = %self.endpoint, "No inbound traffic within two heartbeat intervals");
            self.lose_connection(codes::NO_PING, "no ping".into(), true);
            return;
        }
        if heartbeat.next_ping <= now {
            heartbeat.next_ping = now + heartbeat.interval;
            let _ = self.send(Frame::ping()).await;
        }
    }

    async fn on_command(&mut self, command: Command) {
        match command {
            Command::Connect => self.connect(codes::CONNECT_CALLED, "connect called"),
            Command::SubscribeAll { reply } => {
                for name in self.registry.names() {
                    self.activate(&name);
                }
                self.connect(codes::CONNECT_CALLED, "subscribe called");
                let _ = reply.send(());
            }
            Command::Disconnect { reply } => {
                self.disconnect();
                let _ = reply.send(());
            }
            Command::AddChannel { spec, reply } => {
                let _ = reply.send(self.add_channel(spec));
            }
            Command::RemoveChannel { channel, reply } => {
                let _ = reply.send(self.remove_channel(&channel).await);
            }
            Command::Subscribe { channel, reply } => {
                let _ = reply.send(self.subscribe_channel(&channel));
            }
            Command::Unsubscribe { channel, reply } => {
                let _ = reply.send(self.unsubscribe_channel(&channel).await);
            }
            Command::Publish {
                channel,
                payload,
                reply,
            } => {
                let result = self.publish(&channel, payload).await;
                if let Err(e) = &result {
                    debug!(channel = %channel.name, error = %e, "Publish rejected");
                    metrics::record_error(e.kind());
                }
                let _ = reply.send(result);
            }
            Command::Presence { channel, reply } => {
                let result = self.channel_mut(&channel).map(|ch| ch.presence_snapshot());
                let _ = reply.send(result);
            }
        }
    }
}

/// Receive from the connection, or wait forever when there is none.
async fn recv_frame(
    conn: &mut Option<Box<dyn Connection>>,
) -> Result<Option<Frame>, TransportError> {
    match conn {
        Some(conn) => conn.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn close_in_background(mut conn: Box<dyn Connection>) {
    tokio::spawn(async move {
        if let Err(e) = conn.close().await {
            debug!(connection = %conn.id(), error = %e, "Error closing transport");
        }
    });
}
