//! The client loop: subscribe, publish periodically, shut down on Ctrl-C.

use anyhow::{Context, Result};
use drumie_core::{ChannelHandle, ChannelSpec, Session, SessionOptions};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::auth::HttpTokenIssuer;
use crate::config::Config;

fn channel_spec(name: &str, issuer: HttpTokenIssuer) -> ChannelSpec {
    ChannelSpec::new(name, issuer)
        .on_subscribing(|ctx| match &ctx.error {
            Some(error) => warn!(channel = %ctx.channel, code = ctx.code, %error, "Subscribe failed"),
            None => info!(channel = %ctx.channel, code = ctx.code, "Subscribing"),
        })
        .on_subscribed(|ctx| {
            info!(channel = %ctx.channel, resubscribed = ctx.resubscribed, "Subscribed")
        })
        .on_join(|ctx| info!(channel = %ctx.channel, client = %ctx.client, "Joined"))
        .on_leave(|ctx| info!(channel = %ctx.channel, client = %ctx.client, "Left"))
        .on_listen(|ctx| {
            info!(
                channel = %ctx.channel,
                source = ctx.source.as_deref().unwrap_or("-"),
                payload = %ctx.payload,
                "Message"
            )
        })
}

/// Run until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the session cannot be created or shut down.
pub async fn run(config: Config) -> Result<()> {
    let issuer = HttpTokenIssuer::new(&config.auth)
        .context("Failed to build token issuer client")?;

    let options = SessionOptions::new(issuer.clone())
        .config(config.session.clone())
        .on_connecting(|ctx| match &ctx.error {
            Some(error) => warn!(code = ctx.code, %error, "Connect attempt failed"),
            None => info!(code = ctx.code, reason = %ctx.reason, "Connecting"),
        })
        .on_connected(|ctx| {
            info!(
                connection_id = %ctx.connection_id,
                transport = ctx.transport,
                heartbeat = ctx.heartbeat,
                "Connected"
            )
        })
        .on_disconnected(|ctx| {
            warn!(code = ctx.code, reason = %ctx.reason, reconnect = ctx.reconnect, "Disconnected")
        });

    let specs = config
        .channels
        .iter()
        .map(|name| channel_spec(name, issuer.clone()))
        .collect();
    let session = Session::new(config.endpoint.as_str(), options, specs)
        .context("Failed to create session")?;
    session.subscribe().await?;

    let publisher = config
        .publish
        .channel
        .as_deref()
        .map(|name| session.get_channel(name))
        .transpose()?;

    let mut ticker = tokio::time::interval(Duration::from_millis(config.publish.interval_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut count: u64 = 0;

    loop {
        tokio::select! {
            result = &mut shutdown => {
                result.context("Failed to listen for Ctrl-C")?;
                info!("Shutting down");
                break;
            }
            _ = ticker.tick(), if publisher.is_some() => {
                if let Some(channel) = &publisher {
                    publish_next(channel, &config.publish.prefix, &mut count).await;
                }
            }
        }
    }

    if let Some(channel) = &publisher {
        channel.unsubscribe().await?;
    }
    session.disconnect().await?;
    Ok(())
}

/// Advance the tick counter and format the next message. The counter moves
/// on every tick, published or not.
fn next_message(prefix: &str, count: &mut u64) -> String {
    *count += 1;
    format!("{prefix} {count}")
}

async fn publish_next(channel: &ChannelHandle, prefix: &str, count: &mut u64) {
    let text = next_message(prefix, count);
    match channel.publish(text.as_str()).await {
        Ok(()) => debug!(channel = %channel.name(), text = %text, "Published"),
        Err(e) => debug!(channel = %channel.name(), text = %text, error = %e, "Publish skipped"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_advances_every_tick() {
        let mut count = 0;
        assert_eq!(next_message("auto publish", &mut count), "auto publish 1");
        assert_eq!(next_message("auto publish", &mut count), "auto publish 2");
        assert_eq!(count, 2);
    }
}
