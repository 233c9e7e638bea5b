//! Record Store
//!
//! Durable storage of sentries, cards, and shift circuits on sled. Circuits
//! use monotonic u64 ids stored as big-endian keys for natural chronological
//! ordering; cards and sentries are keyed by their natural identifiers.
//!
//! The store owns the durable copies only. The coordinator owns the live
//! session in memory and writes back exclusively on explicit save.

use crate::types::{Assignment, Card, CircuitEntry, Sentry, StoredCircuit};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

const CIRCUITS_TREE: &str = "circuits";
const CARDS_TREE: &str = "cards";
const SENTRIES_TREE: &str = "sentries";

/// Error type for record store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("{0} not found")]
    NotFound(&'static str),
}

/// sled-backed record store. Cheap to clone; all clones share one database.
#[derive(Clone)]
pub struct RecordStore {
    db: Arc<sled::Db>,
    circuits: sled::Tree,
    cards: sled::Tree,
    sentries: sled::Tree,
}

impl RecordStore {
    /// Open or create the record store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        let circuits = db.open_tree(CIRCUITS_TREE)?;
        let cards = db.open_tree(CARDS_TREE)?;
        let sentries = db.open_tree(SENTRIES_TREE)?;
        Ok(Self {
            db: Arc::new(db),
            circuits,
            cards,
            sentries,
        })
    }

    // ------------------------------------------------------------------
    // Circuits
    // ------------------------------------------------------------------

    /// Persist a freshly generated circuit and return it with its new id.
    pub fn create_circuit(
        &self,
        shift_start: u64,
        shift_end: u64,
        sentries: Vec<Assignment>,
        circuit: Vec<CircuitEntry>,
        path_freqs: BTreeMap<String, u32>,
    ) -> Result<StoredCircuit, StoreError> {
        let id = self.db.generate_id()?;
        let record = StoredCircuit {
            id,
            shift_start,
            shift_end,
            sentries,
            circuit,
            path_freqs,
            completed: false,
            alarms: Vec::new(),
        };
        self.circuits
            .insert(id.to_be_bytes(), serde_json::to_vec(&record)?)?;
        Ok(record)
    }

    /// Fetch a stored circuit by id.
    pub fn get_circuit(&self, id: u64) -> Result<StoredCircuit, StoreError> {
        match self.circuits.get(id.to_be_bytes())? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Err(StoreError::NotFound("circuit")),
        }
    }

    /// Write the live session state back onto an existing circuit record.
    pub fn save_circuit(
        &self,
        id: u64,
        circuit: &[CircuitEntry],
        alarms: &[u64],
        completed: bool,
    ) -> Result<(), StoreError> {
        let mut record = self.get_circuit(id)?;
        record.circuit = circuit.to_vec();
        record.alarms = alarms.to_vec();
        record.completed = completed;
        self.circuits
            .insert(id.to_be_bytes(), serde_json::to_vec(&record)?)?;
        Ok(())
    }

    /// All stored circuits, oldest first.
    pub fn list_circuits(&self) -> Vec<StoredCircuit> {
        self.circuits
            .iter()
            .filter_map(|item| item.ok())
            .filter_map(|(_, bytes)| serde_json::from_slice(&bytes).ok())
            .collect()
    }

    /// Delete a stored circuit.
    pub fn delete_circuit(&self, id: u64) -> Result<(), StoreError> {
        match self.circuits.remove(id.to_be_bytes())? {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound("circuit")),
        }
    }

    // ------------------------------------------------------------------
    // Cards
    // ------------------------------------------------------------------

    /// Register or update a card, keyed by RFID id.
    pub fn put_card(&self, card: &Card) -> Result<(), StoreError> {
        self.cards
            .insert(card.rfid_id.as_bytes(), serde_json::to_vec(card)?)?;
        Ok(())
    }

    /// Look up a card by RFID id.
    pub fn get_card(&self, rfid_id: &str) -> Result<Option<Card>, StoreError> {
        match self.cards.get(rfid_id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// All registered cards.
    pub fn list_cards(&self) -> Vec<Card> {
        self.cards
            .iter()
            .filter_map(|item| item.ok())
            .filter_map(|(_, bytes)| serde_json::from_slice(&bytes).ok())
            .collect()
    }

    // ------------------------------------------------------------------
    // Sentries
    // ------------------------------------------------------------------

    /// Register or update a sentry, keyed by national id.
    pub fn put_sentry(&self, sentry: &Sentry) -> Result<(), StoreError> {
        self.sentries
            .insert(sentry.national_id.as_bytes(), serde_json::to_vec(sentry)?)?;
        Ok(())
    }

    /// All registered sentries.
    pub fn list_sentries(&self) -> Vec<Sentry> {
        self.sentries
            .iter()
            .filter_map(|item| item.ok())
            .filter_map(|(_, bytes)| serde_json::from_slice(&bytes).ok())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CircuitEntry;

    fn open_temp() -> (RecordStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = RecordStore::open(dir.path().join("records.db")).expect("open");
        (store, dir)
    }

    fn sample_entries() -> Vec<CircuitEntry> {
        vec![
            CircuitEntry::pending("A", "Jane Smith", "04a1", 1_700_000_000),
            CircuitEntry::pending("B", "Jane Smith", "04a1", 1_700_000_900),
        ]
    }

    #[test]
    fn test_circuit_create_get_roundtrip() {
        let (store, _dir) = open_temp();
        let created = store
            .create_circuit(
                1_700_000_000,
                1_700_028_800,
                vec![Assignment {
                    sentry: "Jane Smith".into(),
                    card_alias: "blue-1".into(),
                    card_id: "04a1".into(),
                }],
                sample_entries(),
                BTreeMap::from([("A".to_string(), 1), ("B".to_string(), 1)]),
            )
            .expect("create");

        let fetched = store.get_circuit(created.id).expect("get");
        assert_eq!(fetched, created);
        assert!(!fetched.completed);
        assert!(fetched.alarms.is_empty());
    }

    #[test]
    fn test_get_missing_circuit_is_not_found() {
        let (store, _dir) = open_temp();
        assert!(matches!(
            store.get_circuit(42),
            Err(StoreError::NotFound("circuit"))
        ));
    }

    #[test]
    fn test_save_circuit_overwrites_live_fields() {
        let (store, _dir) = open_temp();
        let created = store
            .create_circuit(0, 100, Vec::new(), sample_entries(), BTreeMap::new())
            .expect("create");

        let mut updated = sample_entries();
        updated[0].status = crate::types::EntryStatus::Confirmed;
        updated[0].observed_time = Some(1_700_000_010);

        store
            .save_circuit(created.id, &updated, &[1_700_000_500], true)
            .expect("save");

        let fetched = store.get_circuit(created.id).expect("get");
        assert_eq!(fetched.circuit, updated);
        assert_eq!(fetched.alarms, vec![1_700_000_500]);
        assert!(fetched.completed);
        // Generation-time fields are untouched by save
        assert_eq!(fetched.shift_end, 100);
    }

    #[test]
    fn test_delete_circuit() {
        let (store, _dir) = open_temp();
        let created = store
            .create_circuit(0, 100, Vec::new(), Vec::new(), BTreeMap::new())
            .expect("create");
        store.delete_circuit(created.id).expect("delete");
        assert!(store.get_circuit(created.id).is_err());
        assert!(store.delete_circuit(created.id).is_err());
    }

    #[test]
    fn test_card_registry() {
        let (store, _dir) = open_temp();
        let card = Card {
            rfid_id: "04a1b2c3".into(),
            alias: "blue-1".into(),
        };
        store.put_card(&card).expect("put");

        assert_eq!(store.get_card("04a1b2c3").expect("get"), Some(card));
        assert_eq!(store.get_card("deadbeef").expect("get"), None);
        assert_eq!(store.list_cards().len(), 1);
    }
}
