//! Shared domain types for the patrol monitoring console.
//!
//! Everything that crosses a module boundary lives here: circuit entries and
//! their conformance status, stored shift records, registered sentries and
//! cards, the closed device set, and the viewer-facing alert payload.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Devices
// ============================================================================

/// The closed set of devices whose broker connectivity is tracked.
///
/// `Console` is this process itself; its status is set by the bus client on
/// connect/disconnect, never from an inbound payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Device {
    Console,
    CircuitHandler,
    CheckpointA,
    CheckpointB,
    CheckpointC,
    CheckpointD,
}

impl Device {
    /// All tracked devices, in display order.
    pub const ALL: [Device; 6] = [
        Device::Console,
        Device::CircuitHandler,
        Device::CheckpointA,
        Device::CheckpointB,
        Device::CheckpointC,
        Device::CheckpointD,
    ];

    /// Wire identifier used in connectivity payloads.
    pub fn id(self) -> &'static str {
        match self {
            Device::Console => "console",
            Device::CircuitHandler => "circuit-handler",
            Device::CheckpointA => "checkpoint-A",
            Device::CheckpointB => "checkpoint-B",
            Device::CheckpointC => "checkpoint-C",
            Device::CheckpointD => "checkpoint-D",
        }
    }

    /// Parse a wire identifier. Names outside the fixed set yield `None`;
    /// callers ignore them rather than failing the event stream.
    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "console" => Some(Device::Console),
            "circuit-handler" => Some(Device::CircuitHandler),
            "checkpoint-A" => Some(Device::CheckpointA),
            "checkpoint-B" => Some(Device::CheckpointB),
            "checkpoint-C" => Some(Device::CheckpointC),
            "checkpoint-D" => Some(Device::CheckpointD),
            _ => None,
        }
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

// ============================================================================
// Circuit Entries
// ============================================================================

/// Conformance status of a single expected checkpoint visit.
///
/// Transitions only `Pending -> Confirmed` or `Pending -> Missed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Pending,
    Confirmed,
    Missed,
}

impl std::fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryStatus::Pending => write!(f, "pending"),
            EntryStatus::Confirmed => write!(f, "confirmed"),
            EntryStatus::Missed => write!(f, "missed"),
        }
    }
}

/// One expected checkpoint visit in a circuit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitEntry {
    /// Checkpoint name (e.g. "A")
    pub checkpoint: String,
    /// Full name of the sentry expected at this visit
    pub sentry: String,
    /// RFID card id carried by the sentry
    pub card: String,
    /// Expected check-in time (epoch seconds)
    pub expected_time: u64,
    /// Observed check-in time, once confirmed
    pub observed_time: Option<u64>,
    pub status: EntryStatus,
}

impl CircuitEntry {
    pub fn pending(
        checkpoint: impl Into<String>,
        sentry: impl Into<String>,
        card: impl Into<String>,
        expected_time: u64,
    ) -> Self {
        Self {
            checkpoint: checkpoint.into(),
            sentry: sentry.into(),
            card: card.into(),
            expected_time,
            observed_time: None,
            status: EntryStatus::Pending,
        }
    }
}

// ============================================================================
// Stored Records
// ============================================================================

/// A sentry/card pairing for one shift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    /// Full name of the assigned sentry
    pub sentry: String,
    /// Human-readable card alias
    pub card_alias: String,
    /// RFID card id
    pub card_id: String,
}

/// A durable shift record: the generated circuit plus its live outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCircuit {
    pub id: u64,
    /// Shift boundaries (epoch seconds)
    pub shift_start: u64,
    pub shift_end: u64,
    pub sentries: Vec<Assignment>,
    pub circuit: Vec<CircuitEntry>,
    /// Expected visit count per checkpoint, from the schedule generator
    pub path_freqs: BTreeMap<String, u32>,
    pub completed: bool,
    /// Epochs at which an alarm was raised while this circuit was monitored
    pub alarms: Vec<u64>,
}

/// A registered RFID card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub rfid_id: String,
    pub alias: String,
}

/// A registered sentry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentry {
    pub national_id: String,
    pub full_name: String,
    pub phone_no: String,
}

// ============================================================================
// Push Channel Payload
// ============================================================================

/// Severity of a pushed alert message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Info,
    Success,
    Danger,
}

impl std::fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertLevel::Info => write!(f, "info"),
            AlertLevel::Success => write!(f, "success"),
            AlertLevel::Danger => write!(f, "danger"),
        }
    }
}

/// One live notification delivered to every connected viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushAlert {
    pub alert_level: AlertLevel,
    pub message: String,
}

impl PushAlert {
    pub fn new(alert_level: AlertLevel, message: impl Into<String>) -> Self {
        Self {
            alert_level,
            message: message.into(),
        }
    }
}

// ============================================================================
// Time Formatting
// ============================================================================

/// Render an epoch as `HH:MM:SS` (UTC) for viewer-facing messages.
pub fn format_clock(epoch: u64) -> String {
    chrono::DateTime::from_timestamp(epoch as i64, 0)
        .map(|dt| dt.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| epoch.to_string())
}

/// Render an epoch as `DD/MM/YYYY, HH:MM:SS` (UTC).
pub fn format_date_time(epoch: u64) -> String {
    chrono::DateTime::from_timestamp(epoch as i64, 0)
        .map(|dt| dt.format("%d/%m/%Y, %H:%M:%S").to_string())
        .unwrap_or_else(|| epoch.to_string())
}
