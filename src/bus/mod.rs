//! Message Bus
//!
//! MQTT integration for the console. Inbound device traffic is decoded once
//! at this boundary into the tagged [`BusEvent`] enum and handed to the
//! coordinator; outbound shift/alarm signals arrive over a bounded queue and
//! are published at QoS 2 so alarms are never silently dropped in transit.
//!
//! A publish or connection failure never rolls back coordinator state — the
//! mutation is already committed by the time a signal reaches this module.

use crate::coordinator::Coordinator;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::defaults::{MQTT_RECONNECT_DELAY_SECS, MQTT_REQUEST_CAPACITY};

// ============================================================================
// Topics
// ============================================================================

/// Topic layout shared with the checkpoint firmware and circuit handler.
pub mod topics {
    /// Per-device connectivity status, e.g. `sentry-platform/checkpoint-A/connected`
    pub const CONNECTED_WILDCARD: &str = "sentry-platform/+/connected";
    /// Suffix every connectivity topic ends with
    pub const CONNECTED_SUFFIX: &str = "connected";
    /// Overdue check-in reports from the circuit handler
    pub const OVERDUE: &str = "sentry-platform/checkpoints/overdue-scan";
    /// Scan validity verdicts from the checkpoints
    pub const SCAN_RESULTS: &str = "sentry-platform/checkpoints/scan-results";
    /// Shift completion signal from the circuit handler
    pub const DONE: &str = "sentry-platform/circuit-handler/done";
    /// Outbound: whether a shift is being monitored ("ON"/"OFF")
    pub const SHIFT_ON_OFF: &str = "sentry-platform/console/shift-on-off";
    /// Outbound: alarm state ("ON"/"OFF")
    pub const ALARM: &str = "sentry-platform/console/alarm";
}

// ============================================================================
// Inbound Events
// ============================================================================

/// A fully decoded inbound bus event, dispatched by exhaustive match in the
/// coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    /// Device heartbeat-style connectivity change
    Connectivity { id: String, connected: bool },
    /// An expected visit did not occur within its window
    Overdue {
        card: String,
        checkpoint: String,
        expected: u64,
    },
    /// A card was physically scanned at a checkpoint
    Scan {
        valid: bool,
        reason: String,
        card: String,
        checkpoint: String,
        time: u64,
    },
    /// The circuit handler reports the shift finished
    Complete,
}

/// Malformed or unroutable inbound message. Logged and dropped — never fatal
/// to the event stream.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unrecognized topic: {0}")]
    UnknownTopic(String),
    #[error("invalid payload on {topic}: {source}")]
    Payload {
        topic: String,
        source: serde_json::Error,
    },
}

#[derive(Deserialize)]
struct ConnectivityPayload {
    id: String,
    connected: bool,
}

#[derive(Deserialize)]
struct OverduePayload {
    id: String,
    checkpoint: String,
    time: u64,
    #[serde(default)]
    #[allow(dead_code)]
    checked: bool,
}

#[derive(Deserialize)]
struct ScanPayload {
    valid: bool,
    #[serde(default)]
    reason: String,
    id: String,
    checkpoint: String,
    time: u64,
}

/// Decode a raw publish into a [`BusEvent`].
///
/// Payloads are validated in full before any state is touched.
pub fn decode(topic: &str, payload: &[u8]) -> Result<BusEvent, DecodeError> {
    let wrap = |source| DecodeError::Payload {
        topic: topic.to_string(),
        source,
    };

    if topic.rsplit('/').next() == Some(topics::CONNECTED_SUFFIX) {
        let p: ConnectivityPayload = serde_json::from_slice(payload).map_err(wrap)?;
        return Ok(BusEvent::Connectivity {
            id: p.id,
            connected: p.connected,
        });
    }

    match topic {
        topics::OVERDUE => {
            let p: OverduePayload = serde_json::from_slice(payload).map_err(wrap)?;
            Ok(BusEvent::Overdue {
                card: p.id,
                checkpoint: p.checkpoint,
                expected: p.time,
            })
        }
        topics::SCAN_RESULTS => {
            let p: ScanPayload = serde_json::from_slice(payload).map_err(wrap)?;
            Ok(BusEvent::Scan {
                valid: p.valid,
                reason: p.reason,
                card: p.id,
                checkpoint: p.checkpoint,
                time: p.time,
            })
        }
        topics::DONE => Ok(BusEvent::Complete),
        other => Err(DecodeError::UnknownTopic(other.to_string())),
    }
}

// ============================================================================
// Outbound Signals
// ============================================================================

/// Outbound console signal, queued by the coordinator after its state
/// mutation commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Shift monitoring on/off
    Shift(bool),
    /// Alarm on/off
    Alarm(bool),
}

impl Signal {
    pub fn topic(self) -> &'static str {
        match self {
            Signal::Shift(_) => topics::SHIFT_ON_OFF,
            Signal::Alarm(_) => topics::ALARM,
        }
    }

    pub fn payload(self) -> &'static str {
        match self {
            Signal::Shift(true) | Signal::Alarm(true) => "ON",
            Signal::Shift(false) | Signal::Alarm(false) => "OFF",
        }
    }
}

// ============================================================================
// Client Task
// ============================================================================

/// Run the MQTT client until cancelled.
///
/// One task owns both directions: the event loop poll (inbound decode +
/// dispatch) and the bounded outbound signal queue. Events are processed to
/// completion once dequeued; there is no cancellation mid-event.
pub async fn run(
    coordinator: Arc<Coordinator>,
    mut outbound: mpsc::Receiver<Signal>,
    cancel: CancellationToken,
) {
    let cfg = &crate::config::get().broker;
    let mut options = MqttOptions::new(cfg.client_id.clone(), cfg.host.clone(), cfg.port);
    options.set_keep_alive(Duration::from_secs(cfg.keep_alive_secs));

    let (client, mut event_loop) = AsyncClient::new(options, MQTT_REQUEST_CAPACITY);
    info!(host = %cfg.host, port = cfg.port, "MQTT client starting");

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                info!("[MessageBus] Received shutdown signal");
                let _ = client.disconnect().await;
                return;
            }

            signal = outbound.recv() => {
                let Some(signal) = signal else {
                    warn!("[MessageBus] Outbound queue closed — stopping");
                    return;
                };
                // Alarm and shift signals must survive broker redelivery:
                // QoS 2 gives exactly-once-effective semantics.
                if let Err(e) = client
                    .publish(signal.topic(), QoS::ExactlyOnce, false, signal.payload())
                    .await
                {
                    warn!(signal = ?signal, error = %e, "Publish failed — state already committed, continuing");
                }
            }

            event = event_loop.poll() => {
                match event {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("Connected to broker");
                        coordinator.set_console_connected(true).await;
                        for topic in [
                            topics::CONNECTED_WILDCARD,
                            topics::OVERDUE,
                            topics::SCAN_RESULTS,
                            topics::DONE,
                        ] {
                            if let Err(e) = client.subscribe(topic, QoS::ExactlyOnce).await {
                                warn!(topic = topic, error = %e, "Subscribe failed");
                            }
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        match decode(&publish.topic, &publish.payload) {
                            Ok(event) => coordinator.handle_event(event).await,
                            Err(e) => warn!(error = %e, "Dropping malformed bus message"),
                        }
                    }
                    Ok(Event::Incoming(Packet::Disconnect)) => {
                        warn!("Broker sent disconnect");
                        coordinator.set_console_connected(false).await;
                    }
                    Ok(other) => {
                        debug!(event = ?other, "Bus event");
                    }
                    Err(e) => {
                        warn!(error = %e, "MQTT connection error — retrying");
                        coordinator.set_console_connected(false).await;
                        tokio::select! {
                            () = cancel.cancelled() => return,
                            () = tokio::time::sleep(Duration::from_secs(MQTT_RECONNECT_DELAY_SECS)) => {}
                        }
                    }
                }
            }
        }
    }
}
