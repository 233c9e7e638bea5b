//! Patrol Session Coordinator
//!
//! The single active-session state machine for a shift. Ingests decoded bus
//! events and operator actions, validates them against the expected patrol
//! schedule, mutates live session state under one lock, escalates alarms,
//! and enqueues outbound notifications after the mutation commits.
//!
//! Two independent sources feed this type concurrently — the MQTT event
//! loop and the operator HTTP surface — so every mutation goes through the
//! single `RwLock` write path and snapshot reads observe a consistent
//! point-in-time view.

mod connectivity;

pub use connectivity::ConnectivityTable;

use crate::bus::{BusEvent, Signal};
use crate::push::PushChannel;
use crate::store::{RecordStore, StoreError};
use crate::types::{format_clock, AlertLevel, CircuitEntry, Device, EntryStatus};
use serde::Serialize;
use std::collections::BTreeMap;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

/// Scan reason string that triggers registry-based card classification.
const REASON_NOT_ON_DUTY: &str = "card not on duty";

// ============================================================================
// Session State
// ============================================================================

/// The single live session. Cleared as one unit — never partially.
#[derive(Debug, Clone, Default)]
pub struct ActiveSession {
    /// Whether a circuit is currently under monitoring
    pub active: bool,
    /// Record-store id of the monitored circuit
    pub circuit_id: Option<u64>,
    /// Ordered expected visits, mutated as scans and overdue reports arrive
    pub circuit: Vec<CircuitEntry>,
    /// Expected visit count per checkpoint; read-only during the session
    pub path_frequencies: BTreeMap<String, u32>,
    pub start_epoch: u64,
    pub end_epoch: u64,
    /// Set once the handler reports the circuit satisfied or time-expired
    pub completed: bool,
    /// Append-only alarm raise times for post-shift audit
    pub alarm_history: Vec<u64>,
    /// Current alarm state; cleared only by explicit silence
    pub alarm_active: bool,
}

/// Everything the coordinator owns, guarded together so a select/deselect
/// never interleaves with an in-flight scan update.
#[derive(Debug, Default)]
struct CoordinatorState {
    session: ActiveSession,
    connectivity: ConnectivityTable,
}

/// Point-in-time view of the active session for rendering.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub active: bool,
    pub circuit_id: Option<u64>,
    pub circuit: Vec<CircuitEntry>,
    pub path_frequencies: BTreeMap<String, u32>,
    pub start_epoch: u64,
    pub end_epoch: u64,
    pub completed: bool,
    pub alarm_history: Vec<u64>,
    pub alarm_active: bool,
}

impl From<&ActiveSession> for SessionSnapshot {
    fn from(session: &ActiveSession) -> Self {
        Self {
            active: session.active,
            circuit_id: session.circuit_id,
            circuit: session.circuit.clone(),
            path_frequencies: session.path_frequencies.clone(),
            start_epoch: session.start_epoch,
            end_epoch: session.end_epoch,
            completed: session.completed,
            alarm_history: session.alarm_history.clone(),
            alarm_active: session.alarm_active,
        }
    }
}

// ============================================================================
// Coordinator
// ============================================================================

/// Owns the active session and connectivity table for their full in-memory
/// lifetime. One instance per running console.
pub struct Coordinator {
    state: RwLock<CoordinatorState>,
    store: RecordStore,
    /// Bounded outbound dispatch: state commits first, then the signal is
    /// enqueued without blocking event ingestion.
    outbound: mpsc::Sender<Signal>,
    push: PushChannel,
}

impl Coordinator {
    pub fn new(store: RecordStore, outbound: mpsc::Sender<Signal>, push: PushChannel) -> Self {
        Self {
            state: RwLock::new(CoordinatorState::default()),
            store,
            outbound,
            push,
        }
    }

    // ------------------------------------------------------------------
    // Operator actions
    // ------------------------------------------------------------------

    /// Start monitoring a stored circuit, unconditionally replacing any
    /// session already active.
    pub async fn select_circuit(&self, id: u64) -> Result<(), StoreError> {
        let stored = self.store.get_circuit(id)?;

        {
            let mut state = self.state.write().await;
            state.session = ActiveSession {
                active: true,
                circuit_id: Some(stored.id),
                circuit: stored.circuit,
                path_frequencies: stored.path_freqs,
                start_epoch: stored.shift_start,
                end_epoch: stored.shift_end,
                completed: stored.completed,
                alarm_history: stored.alarms,
                alarm_active: false,
            };
        }

        info!(circuit_id = id, "Shift set — monitoring started");
        self.send_signal(Signal::Shift(true));
        Ok(())
    }

    /// Clear the session to its empty state. Idempotent.
    pub async fn deselect_circuit(&self) {
        {
            let mut state = self.state.write().await;
            state.session = ActiveSession::default();
        }

        info!("Shift deselected");
        self.send_signal(Signal::Shift(false));
    }

    /// Write the live circuit back to its record-store entry.
    pub async fn save_current_circuit(&self) -> Result<(), StoreError> {
        let state = self.state.read().await;
        let session = &state.session;
        let id = session.circuit_id.ok_or(StoreError::NotFound("circuit"))?;

        self.store.save_circuit(
            id,
            &session.circuit,
            &session.alarm_history,
            session.completed,
        )?;
        info!(circuit_id = id, "Current circuit saved");
        Ok(())
    }

    /// Deactivate the alarm. Never mutates the alarm history; safe to call
    /// when no alarm is active.
    pub async fn silence_alarm(&self) {
        {
            let mut state = self.state.write().await;
            if state.session.alarm_active {
                state.session.alarm_active = false;
                info!("Alarm silenced");
            } else {
                debug!("Silence requested with no active alarm");
            }
        }

        self.send_signal(Signal::Alarm(false));
    }

    // ------------------------------------------------------------------
    // Bus event ingestion
    // ------------------------------------------------------------------

    /// Apply one decoded bus event. Never panics and never leaves the
    /// session partially mutated; a bad event degrades to a log line or an
    /// alarm per the rules below.
    pub async fn handle_event(&self, event: BusEvent) {
        match event {
            BusEvent::Connectivity { id, connected } => {
                self.on_connectivity(&id, connected).await;
            }
            BusEvent::Overdue {
                card,
                checkpoint,
                expected,
            } => {
                self.on_overdue(&card, &checkpoint, expected).await;
            }
            BusEvent::Scan {
                valid,
                reason,
                card,
                checkpoint,
                time,
            } => {
                if valid {
                    self.on_valid_scan(&card, &checkpoint, time).await;
                } else {
                    self.on_invalid_scan(&reason, &card, &checkpoint, time).await;
                }
            }
            BusEvent::Complete => self.on_shift_complete().await,
        }
    }

    async fn on_connectivity(&self, id: &str, connected: bool) {
        let device = match Device::from_id(id) {
            // The console's own status is set by the bus client, never by a
            // payload claiming to be us.
            Some(Device::Console) | None => {
                warn!(id = id, "Connectivity event for unrecognized device ignored");
                return;
            }
            Some(device) => device,
        };

        let mut state = self.state.write().await;
        state.connectivity.set(device, connected);
        info!(device = %device, connected = connected, "Device connectivity updated");
    }

    async fn on_overdue(&self, card: &str, checkpoint: &str, expected: u64) {
        {
            let mut state = self.state.write().await;
            if !state.session.active {
                warn!(card = card, checkpoint = checkpoint, "Overdue event with no active shift — dropped");
                return;
            }

            // Prefer the exact scheduled visit; fall back to any pending
            // entry for the pair.
            let entry = state
                .session
                .circuit
                .iter_mut()
                .filter(|e| {
                    e.card == card && e.checkpoint == checkpoint && e.status == EntryStatus::Pending
                })
                .min_by_key(|e| e.expected_time.abs_diff(expected));

            match entry {
                Some(entry) => {
                    entry.status = EntryStatus::Missed;
                    debug!(card = card, checkpoint = checkpoint, "Circuit entry marked missed");
                }
                // An overdue report we cannot match still alarms: it means
                // the devices and the console disagree about the schedule.
                None => {
                    warn!(card = card, checkpoint = checkpoint, "Overdue report matches no pending entry");
                }
            }

            Self::raise_alarm(&mut state.session);
        }

        self.send_signal(Signal::Alarm(true));
        self.push.push(
            AlertLevel::Danger,
            format!(
                "OVERDUE CHECK-IN! Sentry with card ID: {} expected at checkpoint {} at {}.",
                card.to_uppercase(),
                checkpoint,
                format_clock(expected)
            ),
        );
    }

    async fn on_valid_scan(&self, card: &str, checkpoint: &str, time: u64) {
        {
            let mut state = self.state.write().await;
            if !state.session.active {
                warn!(card = card, checkpoint = checkpoint, "Scan result with no active shift — dropped");
                return;
            }

            let entry = state.session.circuit.iter_mut().find(|e| {
                e.card == card && e.checkpoint == checkpoint && e.status == EntryStatus::Pending
            });

            match entry {
                Some(entry) => {
                    entry.status = EntryStatus::Confirmed;
                    entry.observed_time = Some(time);
                    debug!(card = card, checkpoint = checkpoint, "Circuit entry confirmed");
                }
                // Accepted and logged, but no entry is fabricated and a
                // confirmed entry is never reverted.
                None => {
                    info!(card = card, checkpoint = checkpoint, "Valid scan without a matching pending entry");
                }
            }
        }

        self.push.push(
            AlertLevel::Success,
            format!(
                "SUCCESSFUL CHECK-IN! Sentry with card ID: {} checked in at checkpoint {} at {}.",
                card.to_uppercase(),
                checkpoint,
                format_clock(time)
            ),
        );
    }

    async fn on_invalid_scan(&self, reason: &str, card: &str, checkpoint: &str, time: u64) {
        // Registry lookup happens before taking the lock; classification
        // does not depend on session state.
        let tag = if reason == REASON_NOT_ON_DUTY {
            match self.store.get_card(card) {
                Ok(Some(_)) => "STOLEN CARD".to_string(),
                Ok(None) => "UNKNOWN CARD".to_string(),
                Err(e) => {
                    warn!(error = %e, "Card registry lookup failed — treating card as unknown");
                    "UNKNOWN CARD".to_string()
                }
            }
        } else {
            reason.to_uppercase()
        };

        {
            let mut state = self.state.write().await;
            if !state.session.active {
                warn!(card = card, tag = %tag, "Invalid scan with no active shift — dropped");
                return;
            }
            Self::raise_alarm(&mut state.session);
        }

        self.send_signal(Signal::Alarm(true));
        self.push.push(
            AlertLevel::Danger,
            format!(
                "{}! Sentry with card ID: {} checked in at checkpoint {} at {}.",
                tag,
                card.to_uppercase(),
                checkpoint,
                format_clock(time)
            ),
        );
    }

    async fn on_shift_complete(&self) {
        {
            let mut state = self.state.write().await;
            if !state.session.active {
                debug!("Completion signal with no active shift — dropped");
                return;
            }
            state.session.completed = true;
            state.session.active = false;
        }

        info!("Circuit complete — monitoring stopped");
        self.send_signal(Signal::Shift(false));
        self.push
            .push(AlertLevel::Success, "CIRCUIT COMPLETE! Save and exit.");
    }

    /// Console broker connectivity, reported by the bus client itself.
    pub async fn set_console_connected(&self, connected: bool) {
        let mut state = self.state.write().await;
        state.connectivity.set(Device::Console, connected);
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    pub async fn session_snapshot(&self) -> SessionSnapshot {
        let state = self.state.read().await;
        SessionSnapshot::from(&state.session)
    }

    pub async fn connectivity_snapshot(&self) -> BTreeMap<&'static str, bool> {
        let state = self.state.read().await;
        state.connectivity.snapshot()
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Shared alarm protocol: flag + append-only history. The caller
    /// enqueues the alarm signal and push message after the lock drops.
    fn raise_alarm(session: &mut ActiveSession) {
        session.alarm_active = true;
        session.alarm_history.push(now_epoch());
    }

    /// Enqueue an outbound signal without blocking. A full or closed queue
    /// is logged and dropped; the state mutation it describes already stands.
    fn send_signal(&self, signal: Signal) {
        if let Err(e) = self.outbound.try_send(signal) {
            warn!(signal = ?signal, error = %e, "Outbound signal dropped");
        }
    }
}

fn now_epoch() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Assignment, Card};

    struct Fixture {
        coordinator: Coordinator,
        signals: mpsc::Receiver<Signal>,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = RecordStore::open(dir.path().join("records.db")).expect("open");
        let (tx, rx) = mpsc::channel(16);
        let push = PushChannel::new(16);
        Fixture {
            coordinator: Coordinator::new(store.clone(), tx, push),
            signals: rx,
            _dir: dir,
        }
    }

    fn seed_circuit(coordinator: &Coordinator) -> u64 {
        let entries = vec![
            CircuitEntry::pending("A", "Jane Smith", "04a1", 1_000),
            CircuitEntry::pending("B", "John Doe", "04b2", 2_000),
            CircuitEntry::pending("C", "Jane Smith", "04a1", 3_000),
        ];
        coordinator
            .store
            .create_circuit(
                500,
                10_000,
                vec![Assignment {
                    sentry: "Jane Smith".into(),
                    card_alias: "blue-1".into(),
                    card_id: "04a1".into(),
                }],
                entries,
                BTreeMap::from([
                    ("A".to_string(), 1),
                    ("B".to_string(), 1),
                    ("C".to_string(), 1),
                ]),
            )
            .expect("create")
            .id
    }

    fn drain(signals: &mut mpsc::Receiver<Signal>) -> Vec<Signal> {
        let mut out = Vec::new();
        while let Ok(signal) = signals.try_recv() {
            out.push(signal);
        }
        out
    }

    #[tokio::test]
    async fn test_select_publishes_shift_on_and_resets_session() {
        let mut fx = fixture();
        let id = seed_circuit(&fx.coordinator);

        fx.coordinator.select_circuit(id).await.expect("select");

        let snapshot = fx.coordinator.session_snapshot().await;
        assert!(snapshot.active);
        assert_eq!(snapshot.circuit_id, Some(id));
        assert_eq!(snapshot.circuit.len(), 3);
        assert!(!snapshot.alarm_active);
        assert!(snapshot.alarm_history.is_empty());
        assert_eq!(drain(&mut fx.signals), vec![Signal::Shift(true)]);
    }

    #[tokio::test]
    async fn test_select_missing_circuit_is_not_found() {
        let fx = fixture();
        assert!(matches!(
            fx.coordinator.select_circuit(999).await,
            Err(StoreError::NotFound("circuit"))
        ));
        // Session stays cleared
        assert!(!fx.coordinator.session_snapshot().await.active);
    }

    #[tokio::test]
    async fn test_deselect_is_idempotent() {
        let fx = fixture();
        fx.coordinator.deselect_circuit().await;
        let first = fx.coordinator.session_snapshot().await;
        fx.coordinator.deselect_circuit().await;
        let second = fx.coordinator.session_snapshot().await;

        assert!(!first.active && !second.active);
        assert_eq!(first.circuit_id, second.circuit_id);
        assert!(second.circuit.is_empty());
        assert_eq!(second.start_epoch, 0);
        assert_eq!(second.end_epoch, 0);
    }

    #[tokio::test]
    async fn test_valid_scan_confirms_exactly_once() {
        let fx = fixture();
        let id = seed_circuit(&fx.coordinator);
        fx.coordinator.select_circuit(id).await.expect("select");

        let scan = BusEvent::Scan {
            valid: true,
            reason: String::new(),
            card: "04b2".into(),
            checkpoint: "B".into(),
            time: 2_005,
        };
        fx.coordinator.handle_event(scan.clone()).await;
        fx.coordinator.handle_event(scan).await;

        let snapshot = fx.coordinator.session_snapshot().await;
        assert_eq!(snapshot.circuit[1].status, EntryStatus::Confirmed);
        assert_eq!(snapshot.circuit[1].observed_time, Some(2_005));
        assert_eq!(snapshot.circuit[0].status, EntryStatus::Pending);
        assert_eq!(snapshot.circuit[2].status, EntryStatus::Pending);
        assert!(!snapshot.alarm_active);
    }

    #[tokio::test]
    async fn test_valid_scan_without_match_fabricates_nothing() {
        let fx = fixture();
        let id = seed_circuit(&fx.coordinator);
        fx.coordinator.select_circuit(id).await.expect("select");

        fx.coordinator
            .handle_event(BusEvent::Scan {
                valid: true,
                reason: String::new(),
                card: "ffff".into(),
                checkpoint: "D".into(),
                time: 2_500,
            })
            .await;

        let snapshot = fx.coordinator.session_snapshot().await;
        assert_eq!(snapshot.circuit.len(), 3);
        assert!(snapshot
            .circuit
            .iter()
            .all(|e| e.status == EntryStatus::Pending));
        assert!(!snapshot.alarm_active);
    }

    #[tokio::test]
    async fn test_overdue_marks_missed_and_alarms() {
        let mut fx = fixture();
        let id = seed_circuit(&fx.coordinator);
        fx.coordinator.select_circuit(id).await.expect("select");
        drain(&mut fx.signals);

        fx.coordinator
            .handle_event(BusEvent::Overdue {
                card: "04a1".into(),
                checkpoint: "A".into(),
                expected: 1_000,
            })
            .await;

        let snapshot = fx.coordinator.session_snapshot().await;
        assert_eq!(snapshot.circuit[0].status, EntryStatus::Missed);
        assert!(snapshot.alarm_active);
        assert_eq!(snapshot.alarm_history.len(), 1);
        assert_eq!(drain(&mut fx.signals), vec![Signal::Alarm(true)]);
    }

    #[tokio::test]
    async fn test_unmatched_overdue_still_alarms() {
        let fx = fixture();
        let id = seed_circuit(&fx.coordinator);
        fx.coordinator.select_circuit(id).await.expect("select");

        fx.coordinator
            .handle_event(BusEvent::Overdue {
                card: "04a1".into(),
                checkpoint: "D".into(), // not in the circuit
                expected: 9_999,
            })
            .await;

        let snapshot = fx.coordinator.session_snapshot().await;
        assert!(snapshot.alarm_active);
        assert_eq!(snapshot.alarm_history.len(), 1);
        assert!(snapshot
            .circuit
            .iter()
            .all(|e| e.status == EntryStatus::Pending));
    }

    #[tokio::test]
    async fn test_silence_clears_flag_but_not_history() {
        let mut fx = fixture();
        let id = seed_circuit(&fx.coordinator);
        fx.coordinator.select_circuit(id).await.expect("select");
        fx.coordinator
            .handle_event(BusEvent::Overdue {
                card: "04a1".into(),
                checkpoint: "A".into(),
                expected: 1_000,
            })
            .await;
        drain(&mut fx.signals);

        fx.coordinator.silence_alarm().await;

        let snapshot = fx.coordinator.session_snapshot().await;
        assert!(!snapshot.alarm_active);
        assert_eq!(snapshot.alarm_history.len(), 1);
        assert_eq!(drain(&mut fx.signals), vec![Signal::Alarm(false)]);

        // A fresh selection resets history; silence never does.
        fx.coordinator.select_circuit(id).await.expect("select");
        let snapshot = fx.coordinator.session_snapshot().await;
        assert!(snapshot.alarm_history.is_empty());
        assert!(!snapshot.alarm_active);
    }

    #[tokio::test]
    async fn test_silence_without_alarm_is_safe() {
        let fx = fixture();
        fx.coordinator.silence_alarm().await;
        assert!(!fx.coordinator.session_snapshot().await.alarm_active);
    }

    #[tokio::test]
    async fn test_invalid_scan_stolen_vs_unknown_card() {
        let fx = fixture();
        let id = seed_circuit(&fx.coordinator);
        fx.coordinator
            .store
            .put_card(&Card {
                rfid_id: "04a1".into(),
                alias: "blue-1".into(),
            })
            .expect("put");
        fx.coordinator.select_circuit(id).await.expect("select");

        let mut alerts = fx.coordinator.push.subscribe();

        // Registered card, not on duty -> stolen
        fx.coordinator
            .handle_event(BusEvent::Scan {
                valid: false,
                reason: "card not on duty".into(),
                card: "04a1".into(),
                checkpoint: "A".into(),
                time: 1_000,
            })
            .await;
        let alert = alerts.try_recv().expect("alert");
        assert_eq!(alert.alert_level, AlertLevel::Danger);
        assert!(alert.message.starts_with("STOLEN CARD!"));

        // Unregistered card -> unknown
        fx.coordinator
            .handle_event(BusEvent::Scan {
                valid: false,
                reason: "card not on duty".into(),
                card: "ffff".into(),
                checkpoint: "A".into(),
                time: 1_001,
            })
            .await;
        let alert = alerts.try_recv().expect("alert");
        assert!(alert.message.starts_with("UNKNOWN CARD!"));

        // Any other reason surfaces verbatim, upper-cased
        fx.coordinator
            .handle_event(BusEvent::Scan {
                valid: false,
                reason: "scan window closed".into(),
                card: "04a1".into(),
                checkpoint: "A".into(),
                time: 1_002,
            })
            .await;
        let alert = alerts.try_recv().expect("alert");
        assert!(alert.message.starts_with("SCAN WINDOW CLOSED!"));

        let snapshot = fx.coordinator.session_snapshot().await;
        assert_eq!(snapshot.alarm_history.len(), 3);
        assert!(snapshot.alarm_active);
    }

    #[tokio::test]
    async fn test_shift_complete_is_monotonic_and_publishes_off() {
        let mut fx = fixture();
        let id = seed_circuit(&fx.coordinator);
        fx.coordinator.select_circuit(id).await.expect("select");
        drain(&mut fx.signals);

        fx.coordinator.handle_event(BusEvent::Complete).await;

        let snapshot = fx.coordinator.session_snapshot().await;
        assert!(snapshot.completed);
        assert!(!snapshot.active);
        assert_eq!(drain(&mut fx.signals), vec![Signal::Shift(false)]);

        // Only a new selection resets `completed`
        fx.coordinator.select_circuit(id).await.expect("select");
        assert!(!fx.coordinator.session_snapshot().await.completed);
    }

    #[tokio::test]
    async fn test_events_without_active_shift_are_dropped() {
        let fx = fixture();

        fx.coordinator
            .handle_event(BusEvent::Overdue {
                card: "04a1".into(),
                checkpoint: "A".into(),
                expected: 1_000,
            })
            .await;
        fx.coordinator.handle_event(BusEvent::Complete).await;

        let snapshot = fx.coordinator.session_snapshot().await;
        assert!(!snapshot.alarm_active);
        assert!(snapshot.alarm_history.is_empty());
        assert!(!snapshot.completed);
    }

    #[tokio::test]
    async fn test_connectivity_updates_and_ignores_unknown_devices() {
        let fx = fixture();

        fx.coordinator
            .handle_event(BusEvent::Connectivity {
                id: "checkpoint-C".into(),
                connected: true,
            })
            .await;
        let before = fx.coordinator.connectivity_snapshot().await;

        fx.coordinator
            .handle_event(BusEvent::Connectivity {
                id: "checkpoint-Z".into(),
                connected: true,
            })
            .await;
        fx.coordinator
            .handle_event(BusEvent::Connectivity {
                id: "console".into(),
                connected: false,
            })
            .await;

        let after = fx.coordinator.connectivity_snapshot().await;
        assert_eq!(before, after);
        assert!(after["checkpoint-C"]);
    }

    #[tokio::test]
    async fn test_save_roundtrips_live_state() {
        let fx = fixture();
        let id = seed_circuit(&fx.coordinator);
        fx.coordinator.select_circuit(id).await.expect("select");

        fx.coordinator
            .handle_event(BusEvent::Scan {
                valid: true,
                reason: String::new(),
                card: "04a1".into(),
                checkpoint: "A".into(),
                time: 1_010,
            })
            .await;
        fx.coordinator.save_current_circuit().await.expect("save");

        let stored = fx.coordinator.store.get_circuit(id).expect("get");
        assert_eq!(stored.circuit[0].status, EntryStatus::Confirmed);
        assert_eq!(stored.circuit[0].observed_time, Some(1_010));
    }

    #[tokio::test]
    async fn test_save_without_session_is_not_found() {
        let fx = fixture();
        assert!(matches!(
            fx.coordinator.save_current_circuit().await,
            Err(StoreError::NotFound("circuit"))
        ));
    }
}
