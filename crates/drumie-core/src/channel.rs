//! Channel subscription state machine.
//!
//! A channel moves `Unsubscribed -> Subscribing -> Subscribed` and falls back
//! to `Unsubscribed` when it is unsubscribed, rejected, or its session loses
//! the connection. The session driver owns every [`Channel`]; applications
//! reach them through [`ChannelHandle`](crate::ChannelHandle)s.

use drumie_protocol::{Payload, PresenceAction};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, trace, warn};

use crate::codes;
use crate::config::PresencePolicy;
use crate::error::ClientError;
use crate::events::{
    ChannelCallbacks, ListenContext, PresenceContext, SubscribedContext, SubscribingContext,
};
use crate::presence::{Presence, PresenceState};
use crate::token::{SubscribeTokenProvider, TokenError};

/// Maximum channel name length.
pub const MAX_CHANNEL_NAME_LENGTH: usize = 256;

/// Validate a channel name.
///
/// # Errors
///
/// Returns an error message if the channel name is invalid.
pub fn validate_channel_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("Channel name cannot be empty");
    }
    if name.len() > MAX_CHANNEL_NAME_LENGTH {
        return Err("Channel name too long");
    }
    if name.starts_with('$') {
        return Err("Channel names starting with '$' are reserved");
    }
    // Check for valid ASCII printable characters
    if !name.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) {
        return Err("Channel name contains invalid characters");
    }
    Ok(())
}

/// Subscription state of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelState {
    /// Not subscribed.
    Unsubscribed,
    /// Waiting for a token or for the server's acknowledgment.
    Subscribing,
    /// Acknowledged by the server.
    Subscribed,
}

/// Everything needed to register a channel.
pub struct ChannelSpec {
    pub(crate) name: String,
    pub(crate) provider: Arc<dyn SubscribeTokenProvider>,
    pub(crate) callbacks: ChannelCallbacks,
}

impl ChannelSpec {
    /// Describe a channel and the provider for its subscription tokens.
    pub fn new(name: impl Into<String>, provider: impl SubscribeTokenProvider + 'static) -> Self {
        Self {
            name: name.into(),
            provider: Arc::new(provider),
            callbacks: ChannelCallbacks::default(),
        }
    }

    /// Channel name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Called when a subscribe attempt starts or fails.
    #[must_use]
    pub fn on_subscribing(mut self, f: impl Fn(SubscribingContext) + Send + Sync + 'static) -> Self {
        self.callbacks.subscribing = Some(Arc::new(f));
        self
    }

    /// Called when the server acknowledges the subscription.
    #[must_use]
    pub fn on_subscribed(mut self, f: impl Fn(SubscribedContext) + Send + Sync + 'static) -> Self {
        self.callbacks.subscribed = Some(Arc::new(f));
        self
    }

    /// Called when another client joins the channel.
    #[must_use]
    pub fn on_join(mut self, f: impl Fn(PresenceContext) + Send + Sync + 'static) -> Self {
        self.callbacks.join = Some(Arc::new(f));
        self
    }

    /// Called when another client leaves the channel.
    #[must_use]
    pub fn on_leave(mut self, f: impl Fn(PresenceContext) + Send + Sync + 'static) -> Self {
        self.callbacks.leave = Some(Arc::new(f));
        self
    }

    /// Called for every message delivered on the channel.
    #[must_use]
    pub fn on_listen(mut self, f: impl Fn(ListenContext) + Send + Sync + 'static) -> Self {
        self.callbacks.listen = Some(Arc::new(f));
        self
    }
}

/// A registered channel, owned by the session driver.
pub(crate) struct Channel {
    name: String,
    /// Registry id; a re-added channel gets a new one.
    id: u64,
    state: ChannelState,
    state_tx: watch::Sender<ChannelState>,
    /// Whether the application wants this channel subscribed.
    active: bool,
    /// Bumped whenever an in-flight token fetch must be discarded.
    epoch: u64,
    /// Outstanding subscribe request id.
    pending: Option<u64>,
    /// Subscribed at least once since the last `activate`.
    was_subscribed: bool,
    provider: Arc<dyn SubscribeTokenProvider>,
    callbacks: ChannelCallbacks,
    presence: Presence,
    policy: PresencePolicy,
}

impl Channel {
    pub(crate) fn new(
        spec: ChannelSpec,
        id: u64,
        state_tx: watch::Sender<ChannelState>,
        policy: PresencePolicy,
    ) -> Self {
        state_tx.send_replace(ChannelState::Unsubscribed);
        Self {
            name: spec.name,
            id,
            state: ChannelState::Unsubscribed,
            state_tx,
            active: false,
            epoch: 0,
            pending: None,
            was_subscribed: false,
            provider: spec.provider,
            callbacks: spec.callbacks,
            presence: Presence::new(),
            policy,
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> ChannelState {
        self.state
    }

    #[cfg(test)]
    pub(crate) fn is_active(&self) -> bool {
        self.active
    }

    pub(crate) fn pending_request(&self) -> Option<u64> {
        self.pending
    }

    pub(crate) fn provider(&self) -> Arc<dyn SubscribeTokenProvider> {
        Arc::clone(&self.provider)
    }

    #[cfg(test)]
    pub(crate) fn watch(&self) -> watch::Receiver<ChannelState> {
        self.state_tx.subscribe()
    }

    pub(crate) fn presence_snapshot(&self) -> Vec<PresenceState> {
        self.presence.snapshot()
    }

    fn set_state(&mut self, state: ChannelState) {
        if self.state == state {
            return;
        }
        self.state = state;
        self.state_tx.send_replace(state);
    }

    fn enter_subscribing(&mut self, code: u16, reason: &str) {
        if self.state == ChannelState::Subscribing {
            return;
        }
        self.set_state(ChannelState::Subscribing);
        debug!(channel = %self.name, code, "Channel subscribing");
        self.callbacks.subscribing(SubscribingContext {
            channel: self.name.clone(),
            code,
            reason: reason.to_string(),
            error: None,
        });
    }

    /// Mark the channel wanted and move it to `Subscribing`.
    ///
    /// Returns `false` if it was already active.
    pub(crate) fn activate(&mut self) -> bool {
        if self.active {
            return false;
        }
        self.active = true;
        self.was_subscribed = false;
        self.epoch += 1;
        self.pending = None;
        self.enter_subscribing(codes::SUBSCRIBE_CALLED, "subscribe called");
        true
    }

    /// Start a subscribe attempt on a connected session.
    ///
    /// Returns the epoch that tags the token fetch, or `None` if the
    /// channel is not active.
    pub(crate) fn begin_attempt(&mut self, code: u16, reason: &str) -> Option<u64> {
        if !self.active {
            return None;
        }
        self.enter_subscribing(code, reason);
        self.epoch += 1;
        self.pending = None;
        trace!(channel = %self.name, epoch = self.epoch, "Requesting subscribe token");
        Some(self.epoch)
    }

    fn accepts_token(&self, epoch: u64) -> bool {
        self.active
            && self.epoch == epoch
            && self.state == ChannelState::Subscribing
            && self.pending.is_none()
    }

    /// A subscribe token arrived; record the request that will carry it.
    ///
    /// Returns `false` if the token is stale and must be discarded.
    pub(crate) fn token_ready(&mut self, epoch: u64, request_id: u64) -> bool {
        if !self.accepts_token(epoch) {
            debug!(channel = %self.name, epoch, current = self.epoch, "Discarding stale subscribe token");
            return false;
        }
        self.pending = Some(request_id);
        true
    }

    /// The token provider failed.
    pub(crate) fn token_failed(&mut self, epoch: u64, error: TokenError) -> bool {
        if !self.accepts_token(epoch) {
            return false;
        }
        self.fail(codes::TOKEN_FETCH_FAILED, ClientError::from(error));
        true
    }

    fn fail(&mut self, code: u16, error: ClientError) {
        warn!(channel = %self.name, error = %error, "Subscribe failed");
        self.active = false;
        self.epoch += 1;
        self.pending = None;
        self.presence.clear();
        self.set_state(ChannelState::Unsubscribed);
        self.callbacks.subscribing(SubscribingContext {
            channel: self.name.clone(),
            code,
            reason: error.to_string(),
            error: Some(error),
        });
    }

    /// The server acknowledged a subscribe request.
    ///
    /// Acks that do not match the outstanding request are ignored, so a
    /// repeated ack fires nothing.
    pub(crate) fn on_subscribe_ack(&mut self, request_id: u64) -> bool {
        if self.state != ChannelState::Subscribing || self.pending != Some(request_id) {
            trace!(channel = %self.name, request_id, "Ignoring unmatched subscribe ack");
            return false;
        }
        self.pending = None;
        self.set_state(ChannelState::Subscribed);
        let resubscribed = std::mem::replace(&mut self.was_subscribed, true);
        debug!(channel = %self.name, resubscribed, "Channel subscribed");

        self.callbacks.subscribed(SubscribedContext {
            channel: self.name.clone(),
            resubscribed,
        });

        if resubscribed && self.policy == PresencePolicy::Replay {
            for member in self.presence.snapshot() {
                self.callbacks.join(PresenceContext {
                    channel: self.name.clone(),
                    client: member.client,
                    data: member.data,
                    replayed: true,
                });
            }
        }
        true
    }

    /// The server rejected a subscribe request.
    pub(crate) fn on_subscribe_error(&mut self, request_id: u64, code: u16, message: String) -> bool {
        if self.pending != Some(request_id) {
            return false;
        }
        let error = ClientError::SubscribeRejected {
            channel: self.name.clone(),
            code,
            message,
        };
        self.fail(codes::SUBSCRIBE_REJECTED, error);
        true
    }

    /// A join or leave frame arrived. Ignored unless subscribed.
    pub(crate) fn on_presence(
        &mut self,
        action: PresenceAction,
        client: String,
        data: Option<serde_json::Value>,
    ) -> bool {
        if self.state != ChannelState::Subscribed {
            return false;
        }
        let ctx = PresenceContext {
            channel: self.name.clone(),
            client,
            data,
            replayed: false,
        };
        match action {
            PresenceAction::Join => {
                self.presence.join(ctx.client.clone(), ctx.data.clone());
                self.callbacks.join(ctx);
            }
            PresenceAction::Leave => {
                self.presence.leave(&ctx.client);
                self.callbacks.leave(ctx);
            }
        }
        true
    }

    /// A message arrived. Ignored unless subscribed.
    pub(crate) fn on_message(
        &mut self,
        payload: Payload,
        source: Option<String>,
        event: Option<String>,
    ) -> bool {
        if self.state != ChannelState::Subscribed {
            return false;
        }
        self.callbacks.listen(ListenContext {
            channel: self.name.clone(),
            payload,
            source,
            event,
        });
        true
    }

    /// Unsubscribe. Idempotent.
    ///
    /// Returns `true` if the server may consider the channel subscribed and
    /// should be sent an unsubscribe frame.
    pub(crate) fn deactivate(&mut self) -> bool {
        if !self.active && self.state == ChannelState::Unsubscribed {
            return false;
        }
        let notify = self.state == ChannelState::Subscribed || self.pending.is_some();
        self.release();
        debug!(channel = %self.name, "Channel unsubscribed");
        notify
    }

    /// Drop the subscription without talking to the server.
    pub(crate) fn release(&mut self) {
        self.active = false;
        self.epoch += 1;
        self.pending = None;
        self.was_subscribed = false;
        self.presence.clear();
        self.set_state(ChannelState::Unsubscribed);
    }

    /// The session lost its connection. The channel stays active and is
    /// resubscribed once the session is connected again.
    pub(crate) fn session_lost(&mut self) {
        self.epoch += 1;
        self.pending = None;
        if self.policy == PresencePolicy::Clean {
            self.presence.clear();
        }
        self.set_state(ChannelState::Unsubscribed);
    }

    /// Check that a publish is allowed.
    pub(crate) fn check_publish(&self) -> Result<(), ClientError> {
        if self.state != ChannelState::Subscribed {
            return Err(ClientError::PublishRejected {
                channel: self.name.clone(),
                reason: "channel not subscribed",
            });
        }
        Ok(())
    }
}
