//! Sessions and channel handles.
//!
//! A [`Session`] owns one connection to a Drumie server and multiplexes
//! every registered channel over it. All state lives in a driver task
//! spawned by [`Session::new`]; the `Session` and its [`ChannelHandle`]s
//! are cheap clones that send commands to that task.
//!
//! ```rust,ignore
//! use drumie_core::{connect_token_fn, subscribe_token_fn, ChannelSpec, Session, SessionOptions, Token};
//!
//! let options = SessionOptions::new(connect_token_fn(|| async { fetch_connect_token().await }))
//!     .on_connected(|ctx| println!("connected: {}", ctx.connection_id));
//! let customer = ChannelSpec::new("customer", subscribe_token_fn(|req| fetch_subscribe_token(req)))
//!     .on_listen(|ctx| println!("{}: {}", ctx.channel, ctx.payload));
//!
//! let session = Session::new("ws://localhost:8000/connect", options, vec![customer])?;
//! session.subscribe().await?;
//! session.get_channel("customer")?.publish("hello").await?;
//! ```

use drumie_protocol::Payload;
use drumie_transport::Connector;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::info;

use crate::channel::{ChannelSpec, ChannelState};
use crate::config::SessionConfig;
use crate::driver::{ChannelRef, Command, Driver};
use crate::error::ClientError;
use crate::events::{ConnectedContext, ConnectingContext, DisconnectedContext, SessionCallbacks};
use crate::presence::PresenceState;
use crate::registry::{ChannelRegistry, ChannelSlot};
use crate::token::ConnectTokenProvider;

/// Connection state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No connection and no attempt in progress.
    Disconnected,
    /// Fetching a token, dialing, or waiting for the server's acknowledgment.
    Connecting,
    /// Acknowledged by the server.
    Connected,
}

/// Options for [`Session::new`].
pub struct SessionOptions {
    pub(crate) token_provider: Arc<dyn ConnectTokenProvider>,
    pub(crate) callbacks: SessionCallbacks,
    pub(crate) config: SessionConfig,
    pub(crate) connector: Option<Arc<dyn Connector>>,
}

impl SessionOptions {
    /// Create options with the provider for connection tokens.
    pub fn new(token_provider: impl ConnectTokenProvider + 'static) -> Self {
        Self {
            token_provider: Arc::new(token_provider),
            callbacks: SessionCallbacks::default(),
            config: SessionConfig::default(),
            connector: None,
        }
    }

    /// Use a custom configuration.
    #[must_use]
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Dial through a custom connector instead of WebSocket.
    #[must_use]
    pub fn connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Called when a connect attempt starts or fails.
    #[must_use]
    pub fn on_connecting(mut self, f: impl Fn(ConnectingContext) + Send + Sync + 'static) -> Self {
        self.callbacks.connecting = Some(Arc::new(f));
        self
    }

    /// Called when the server accepts the connection.
    #[must_use]
    pub fn on_connected(mut self, f: impl Fn(ConnectedContext) + Send + Sync + 'static) -> Self {
        self.callbacks.connected = Some(Arc::new(f));
        self
    }

    /// Called when the connection is lost or closed.
    #[must_use]
    pub fn on_disconnected(
        mut self,
        f: impl Fn(DisconnectedContext) + Send + Sync + 'static,
    ) -> Self {
        self.callbacks.disconnected = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for SessionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionOptions")
            .field("callbacks", &self.callbacks)
            .field("config", &self.config)
            .field("custom_connector", &self.connector.is_some())
            .finish()
    }
}

struct Shared {
    endpoint: String,
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    registry: Arc<ChannelRegistry>,
}

/// A multiplexed, token-authenticated pub/sub session.
#[derive(Clone)]
pub struct Session {
    shared: Arc<Shared>,
}

impl Session {
    /// Create a session and register the initial channels.
    ///
    /// Nothing is dialed until [`connect`](Self::connect) or
    /// [`subscribe`](Self::subscribe) is called. Must be called from
    /// within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateChannel` or `InvalidChannel` if the channel list
    /// contains a repeated or invalid name.
    pub fn new(
        endpoint: impl Into<String>,
        options: SessionOptions,
        channels: Vec<ChannelSpec>,
    ) -> Result<Self, ClientError> {
        let endpoint = endpoint.into();
        let registry = Arc::new(ChannelRegistry::new());
        let (commands, commands_rx) = mpsc::unbounded_channel();

        let (mut driver, state) = Driver::new(
            endpoint.clone(),
            options,
            Arc::clone(&registry),
            commands_rx,
        );
        for spec in channels {
            driver.add_channel(spec)?;
        }
        tokio::spawn(driver.run());

        info!(endpoint = %endpoint, channels = registry.len(), "Session created");

        Ok(Self {
            shared: Arc::new(Shared {
                endpoint,
                commands,
                state,
                registry,
            }),
        })
    }

    /// The server endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.shared.endpoint
    }

    /// Start connecting. Does nothing if already connecting or connected.
    ///
    /// # Errors
    ///
    /// Returns `SessionClosed` if the driver has stopped.
    pub fn connect(&self) -> Result<(), ClientError> {
        self.shared
            .commands
            .send(Command::Connect)
            .map_err(|_| ClientError::SessionClosed)
    }

    /// Subscribe every registered channel, connecting first if needed.
    ///
    /// # Errors
    ///
    /// Returns `SessionClosed` if the driver has stopped.
    pub async fn subscribe(&self) -> Result<(), ClientError> {
        request(&self.shared.commands, |reply| Command::SubscribeAll { reply }).await
    }

    /// Close the connection and release every channel subscription.
    ///
    /// Channels stay registered. When this returns no further channel
    /// callbacks fire until a channel is subscribed again.
    ///
    /// # Errors
    ///
    /// Returns `SessionClosed` if the driver has stopped.
    pub async fn disconnect(&self) -> Result<(), ClientError> {
        request(&self.shared.commands, |reply| Command::Disconnect { reply }).await
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Watch the connection state.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.clone()
    }

    /// Register a channel. The channel is not subscribed.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateChannel` if the name is taken, `InvalidChannel`
    /// if it is not a valid channel name.
    pub async fn add_channel(&self, spec: ChannelSpec) -> Result<ChannelHandle, ClientError> {
        let name = spec.name().to_string();
        let slot = request(&self.shared.commands, |reply| Command::AddChannel {
            spec,
            reply,
        })
        .await??;
        Ok(self.handle(name, slot))
    }

    /// Unsubscribe a channel if needed and remove it from the registry.
    ///
    /// # Errors
    ///
    /// Returns `ChannelNotFound` if the channel was already removed.
    pub async fn remove_channel(&self, handle: &ChannelHandle) -> Result<(), ClientError> {
        let channel = handle.channel_ref();
        request(&self.shared.commands, |reply| Command::RemoveChannel {
            channel,
            reply,
        })
        .await?
    }

    /// Look up a registered channel.
    ///
    /// # Errors
    ///
    /// Returns `ChannelNotFound` if no channel has that name.
    pub fn get_channel(&self, name: &str) -> Result<ChannelHandle, ClientError> {
        self.shared
            .registry
            .get(name)
            .map(|slot| self.handle(name.to_string(), slot))
            .ok_or_else(|| ClientError::ChannelNotFound(name.to_string()))
    }

    /// Names of all registered channels, in registration order.
    #[must_use]
    pub fn channels(&self) -> Vec<String> {
        self.shared.registry.names()
    }

    fn handle(&self, name: String, slot: ChannelSlot) -> ChannelHandle {
        ChannelHandle {
            name,
            id: slot.id,
            commands: self.shared.commands.clone(),
            state: slot.state,
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("endpoint", &self.shared.endpoint)
            .field("state", &self.state())
            .field("channels", &self.channels())
            .finish()
    }
}

/// A reference to a registered channel.
///
/// Operations through a handle whose channel has been removed fail with
/// `ChannelNotFound`, even if a channel with the same name was added since.
#[derive(Clone)]
pub struct ChannelHandle {
    name: String,
    id: u64,
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ChannelState>,
}

impl ChannelHandle {
    /// Channel name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current subscription state.
    #[must_use]
    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    /// Watch the subscription state.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ChannelState> {
        self.state.clone()
    }

    /// Subscribe this channel, connecting the session first if needed.
    ///
    /// The outcome is reported through the `subscribing` and `subscribed`
    /// callbacks.
    ///
    /// # Errors
    ///
    /// Returns `ChannelNotFound` if the channel was removed.
    pub async fn subscribe(&self) -> Result<(), ClientError> {
        let channel = self.channel_ref();
        request(&self.commands, |reply| Command::Subscribe { channel, reply }).await?
    }

    /// Unsubscribe this channel. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns `ChannelNotFound` if the channel was removed.
    pub async fn unsubscribe(&self) -> Result<(), ClientError> {
        let channel = self.channel_ref();
        request(&self.commands, |reply| Command::Unsubscribe { channel, reply }).await?
    }

    /// Publish a text or JSON payload.
    ///
    /// # Errors
    ///
    /// Returns `PublishRejected` unless the session is connected and the
    /// channel subscribed; nothing is sent in that case.
    pub async fn publish(&self, payload: impl Into<Payload>) -> Result<(), ClientError> {
        let channel = self.channel_ref();
        let payload = payload.into();
        request(&self.commands, |reply| Command::Publish {
            channel,
            payload,
            reply,
        })
        .await?
    }

    /// Members currently present on the channel.
    ///
    /// # Errors
    ///
    /// Returns `ChannelNotFound` if the channel was removed.
    pub async fn presence(&self) -> Result<Vec<PresenceState>, ClientError> {
        let channel = self.channel_ref();
        request(&self.commands, |reply| Command::Presence { channel, reply }).await?
    }

    fn channel_ref(&self) -> ChannelRef {
        ChannelRef {
            name: self.name.clone(),
            id: self.id,
        }
    }
}

impl fmt::Debug for ChannelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelHandle")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

async fn request<T>(
    commands: &mpsc::UnboundedSender<Command>,
    build: impl FnOnce(oneshot::Sender<T>) -> Command,
) -> Result<T, ClientError> {
    let (reply, rx) = oneshot::channel();
    commands
        .send(build(reply))
        .map_err(|_| ClientError::SessionClosed)?;
    rx.await.map_err(|_| ClientError::SessionClosed)
}
