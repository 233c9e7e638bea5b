//! Schedule Generator
//!
//! Builds the full ordered circuit for a shift from sentry/card assignments,
//! a start date/time, and a duration. Output is the shift window, a
//! per-checkpoint visit-frequency table, and the entry list the coordinator
//! validates live scans against.
//!
//! Sentries are staggered across the checkpoint cycle so no two sentries are
//! expected at the same checkpoint simultaneously, and each expected time
//! carries a small random jitter so the patrol pattern is not predictable to
//! an outside observer.

use crate::config::PatrolConfig;
use crate::types::{Assignment, CircuitEntry};
use chrono::{NaiveDate, NaiveTime};
use rand::Rng;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("at least one sentry/card assignment is required")]
    NoAssignments,
    #[error("at least one checkpoint must be configured")]
    NoCheckpoints,
    #[error("shift duration must be at least one patrol leg")]
    WindowTooShort,
    #[error("invalid shift start: {0}")]
    InvalidStart(String),
}

/// Output of circuit generation.
#[derive(Debug, Clone)]
pub struct GeneratedRoute {
    pub start: u64,
    pub end: u64,
    /// Expected visit count per checkpoint across the whole shift
    pub paths: BTreeMap<String, u32>,
    /// Ordered by expected time
    pub circuit: Vec<CircuitEntry>,
}

/// Generate a circuit from a calendar start and a duration.
///
/// The naive date/time is interpreted as UTC; deployments run devices and
/// console on a shared clock.
pub fn generate(
    patrol: &PatrolConfig,
    assignments: &[Assignment],
    date: NaiveDate,
    time: NaiveTime,
    duration_hours: u32,
    duration_minutes: u32,
) -> Result<GeneratedRoute, ScheduleError> {
    let start = date
        .and_time(time)
        .and_utc()
        .timestamp()
        .try_into()
        .map_err(|_| ScheduleError::InvalidStart(format!("{date} {time}")))?;
    let duration_secs = u64::from(duration_hours) * 3600 + u64::from(duration_minutes) * 60;
    generate_window(patrol, assignments, start, duration_secs)
}

/// Generate a circuit over an explicit epoch window.
pub fn generate_window(
    patrol: &PatrolConfig,
    assignments: &[Assignment],
    start: u64,
    duration_secs: u64,
) -> Result<GeneratedRoute, ScheduleError> {
    if assignments.is_empty() {
        return Err(ScheduleError::NoAssignments);
    }
    // console.toml can configure `checkpoints = []`; the rotation below
    // indexes modulo the list length.
    if patrol.checkpoints.is_empty() {
        return Err(ScheduleError::NoCheckpoints);
    }
    let leg = patrol.leg_interval_secs.max(1);
    if duration_secs < leg {
        return Err(ScheduleError::WindowTooShort);
    }

    let end = start + duration_secs;
    let checkpoints = &patrol.checkpoints;
    let mut rng = rand::thread_rng();

    let mut circuit = Vec::new();
    let mut paths: BTreeMap<String, u32> = BTreeMap::new();

    let rounds = duration_secs / leg;
    for round in 0..rounds {
        let base = start + round * leg;
        for (idx, assignment) in assignments.iter().enumerate() {
            // Stagger sentries across the checkpoint cycle
            let checkpoint = &checkpoints[(round as usize + idx) % checkpoints.len()];
            let jitter = if patrol.leg_jitter_secs > 0 {
                rng.gen_range(0..=patrol.leg_jitter_secs)
            } else {
                0
            };
            let expected = (base + jitter).min(end);

            circuit.push(CircuitEntry::pending(
                checkpoint.clone(),
                assignment.sentry.clone(),
                assignment.card_id.clone(),
                expected,
            ));
            *paths.entry(checkpoint.clone()).or_insert(0) += 1;
        }
    }

    circuit.sort_by_key(|entry| entry.expected_time);

    tracing::info!(
        sentries = assignments.len(),
        entries = circuit.len(),
        start = start,
        end = end,
        "Circuit generated"
    );

    Ok(GeneratedRoute {
        start,
        end,
        paths,
        circuit,
    })
}
