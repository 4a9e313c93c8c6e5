//! Persisted booking snapshots.
//!
//! A snapshot is written through the [`SnapshotStore`] boundary on every
//! state-machine mutation and read back exactly once at session start. The
//! wire form keeps the integer step so snapshots written by older builds
//! (including legacy step-6 terminals) still decode.

use std::path::PathBuf;
use std::sync::Mutex;

use bevy_ecs::prelude::Resource;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::booking::{BookingState, BookingStep};
use crate::stations::StationId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingSnapshot {
    pub step: u8,
    pub departure_station_id: Option<StationId>,
    pub arrival_station_id: Option<StationId>,
    pub date_time_confirmed: bool,
    pub departure_date: Option<i64>,
    pub departure_time: Option<i64>,
}

impl BookingSnapshot {
    pub fn capture(state: &BookingState) -> Self {
        Self {
            step: state.step().as_number(),
            departure_station_id: state.departure_station_id(),
            arrival_station_id: state.arrival_station_id(),
            date_time_confirmed: state.date_time_confirmed(),
            departure_date: state.departure_date(),
            departure_time: state.departure_time(),
        }
    }

    /// Rebuilds a [`BookingState`]. Unknown step numbers are rejected; legacy
    /// steps 5/6 restore as-is for the recovery monitor to judge.
    pub fn restore(&self) -> Result<BookingState, SnapshotError> {
        let step =
            BookingStep::from_number(self.step).ok_or(SnapshotError::InvalidStep(self.step))?;
        Ok(BookingState::restore(
            step,
            self.departure_station_id,
            self.arrival_station_id,
            self.date_time_confirmed,
            self.departure_date,
            self.departure_time,
        ))
    }
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("snapshot carries invalid step {0}")]
    InvalidStep(u8),
    #[error("snapshot store lock poisoned")]
    StorePoisoned,
}

/// Persistent user/session store boundary: load once, save on every mutation.
pub trait SnapshotStore: Send + Sync {
    fn save(&self, snapshot: &BookingSnapshot) -> Result<(), SnapshotError>;
    fn load(&self) -> Result<Option<BookingSnapshot>, SnapshotError>;
    fn clear(&self) -> Result<(), SnapshotError>;
}

impl<S: SnapshotStore> SnapshotStore for std::sync::Arc<S> {
    fn save(&self, snapshot: &BookingSnapshot) -> Result<(), SnapshotError> {
        self.as_ref().save(snapshot)
    }

    fn load(&self) -> Result<Option<BookingSnapshot>, SnapshotError> {
        self.as_ref().load()
    }

    fn clear(&self) -> Result<(), SnapshotError> {
        self.as_ref().clear()
    }
}

/// ECS resource wrapping a boxed snapshot store.
#[derive(Resource)]
pub struct SnapshotStoreResource(pub Box<dyn SnapshotStore>);

/// In-memory store, the default for tests and demos.
#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    slot: Mutex<Option<BookingSnapshot>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a snapshot, as if a previous session had
    /// persisted it.
    pub fn seeded(snapshot: BookingSnapshot) -> Self {
        Self {
            slot: Mutex::new(Some(snapshot)),
        }
    }
}

impl SnapshotStore for InMemorySnapshotStore {
    fn save(&self, snapshot: &BookingSnapshot) -> Result<(), SnapshotError> {
        let mut slot = self.slot.lock().map_err(|_| SnapshotError::StorePoisoned)?;
        *slot = Some(snapshot.clone());
        Ok(())
    }

    fn load(&self) -> Result<Option<BookingSnapshot>, SnapshotError> {
        let slot = self.slot.lock().map_err(|_| SnapshotError::StorePoisoned)?;
        Ok(slot.clone())
    }

    fn clear(&self) -> Result<(), SnapshotError> {
        let mut slot = self.slot.lock().map_err(|_| SnapshotError::StorePoisoned)?;
        *slot = None;
        Ok(())
    }
}

/// JSON file store for embedding hosts that persist to disk.
#[derive(Debug, Clone)]
pub struct JsonFileSnapshotStore {
    path: PathBuf,
}

impl JsonFileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SnapshotStore for JsonFileSnapshotStore {
    fn save(&self, snapshot: &BookingSnapshot) -> Result<(), SnapshotError> {
        let data = serde_json::to_vec_pretty(snapshot)?;
        std::fs::write(&self.path, data)?;
        Ok(())
    }

    fn load(&self) -> Result<Option<BookingSnapshot>, SnapshotError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = std::fs::read(&self.path)?;
        Ok(Some(serde_json::from_slice(&data)?))
    }

    fn clear(&self) -> Result<(), SnapshotError> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}
