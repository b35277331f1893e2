//! Session metrics.
//!
//! Instrumentation goes through the `metrics` facade; nothing is recorded
//! until the application installs a recorder (the `drumie` binary installs
//! the Prometheus exporter).

use metrics::{counter, gauge};

use crate::session::ConnectionState;

/// Metric names.
pub mod names {
    pub const FRAMES_TOTAL: &str = "drumie_frames_total";
    pub const FRAME_BYTES_TOTAL: &str = "drumie_frame_bytes_total";
    pub const CONNECT_ATTEMPTS_TOTAL: &str = "drumie_connect_attempts_total";
    pub const RECONNECTS_SCHEDULED_TOTAL: &str = "drumie_reconnects_scheduled_total";
    pub const SUBSCRIPTIONS_TOTAL: &str = "drumie_subscriptions_total";
    pub const DROPPED_FRAMES_TOTAL: &str = "drumie_dropped_frames_total";
    pub const ERRORS_TOTAL: &str = "drumie_errors_total";
    pub const CONNECTION_STATE: &str = "drumie_connection_state";
}

/// Register metric descriptions with the installed recorder.
pub fn describe() {
    metrics::describe_counter!(names::FRAMES_TOTAL, "Frames sent and received");
    metrics::describe_counter!(names::FRAME_BYTES_TOTAL, "Encoded bytes of frames sent");
    metrics::describe_counter!(names::CONNECT_ATTEMPTS_TOTAL, "Connect attempts started");
    metrics::describe_counter!(
        names::RECONNECTS_SCHEDULED_TOTAL,
        "Reconnect attempts scheduled by the backoff policy"
    );
    metrics::describe_counter!(names::SUBSCRIPTIONS_TOTAL, "Subscribe requests sent");
    metrics::describe_counter!(
        names::DROPPED_FRAMES_TOTAL,
        "Inbound frames dropped without firing a callback"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Connect, subscribe and publish failures");
    metrics::describe_gauge!(
        names::CONNECTION_STATE,
        "Connection state (0 disconnected, 1 connecting, 2 connected)"
    );
}

pub(crate) fn record_inbound() {
    counter!(names::FRAMES_TOTAL, "direction" => "inbound").increment(1);
}

pub(crate) fn record_outbound(bytes: usize) {
    counter!(names::FRAMES_TOTAL, "direction" => "outbound").increment(1);
    counter!(names::FRAME_BYTES_TOTAL).increment(bytes as u64);
}

pub(crate) fn record_connect_attempt() {
    counter!(names::CONNECT_ATTEMPTS_TOTAL).increment(1);
}

pub(crate) fn record_reconnect_scheduled() {
    counter!(names::RECONNECTS_SCHEDULED_TOTAL).increment(1);
}

pub(crate) fn record_subscription() {
    counter!(names::SUBSCRIPTIONS_TOTAL).increment(1);
}

pub(crate) fn record_dropped(reason: &'static str) {
    counter!(names::DROPPED_FRAMES_TOTAL, "reason" => reason).increment(1);
}

pub(crate) fn record_error(error_type: &'static str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type).increment(1);
}

pub(crate) fn set_connection_state(state: ConnectionState) {
    let value = match state {
        ConnectionState::Disconnected => 0.0,
        ConnectionState::Connecting => 1.0,
        ConnectionState::Connected => 2.0,
    };
    gauge!(names::CONNECTION_STATE).set(value);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder() {
        // No recorder installed: every call is a no-op
        describe();
        record_outbound(42);
        record_dropped("unknown_channel");
        set_connection_state(ConnectionState::Connected);
    }
}
