//! Sentry Console: Security Patrol Operational Monitoring
//!
//! Live monitoring console for RFID security patrols. Checkpoint devices and
//! a circuit-handler process publish scan and status events over MQTT; this
//! console validates them against the expected patrol schedule, escalates
//! alarms, and pushes updates to connected viewers in real time.
//!
//! ## Architecture
//!
//! - **Coordinator**: single active-session state machine for the shift
//! - **Message Bus**: MQTT ingestion/publication (rumqttc)
//! - **Push Channel**: WebSocket fan-out of live alert messages
//! - **Record Store**: sled-backed storage of sentries, cards, and circuits
//! - **Schedule Generator**: builds the ordered circuit for a shift

pub mod api;
pub mod bus;
pub mod config;
pub mod coordinator;
pub mod push;
pub mod schedule;
pub mod store;
pub mod types;

// Re-export the core coordinator surface
pub use coordinator::{Coordinator, SessionSnapshot};

// Re-export commonly used types
pub use types::{
    AlertLevel, Assignment, Card, CircuitEntry, Device, EntryStatus, PushAlert, Sentry,
    StoredCircuit,
};

// Re-export storage
pub use store::{RecordStore, StoreError};

// Re-export bus events
pub use bus::{BusEvent, Signal};
