//! High-level client that wires the resolver and coordinator to one store.
//! The CLI and HTTP server both go through this.

use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use crate::coordinator::ReservationCoordinator;
use crate::error::ScheduleResult;
use crate::infrastructure::{ScheduleStore, SeedableStore};
use crate::infrastructure_in_memory::InMemoryScheduleStore;
use crate::resolver::ScheduleResolver;
use crate::types::*;

/// Entry point for availability queries and bookings.
///
/// Cloning is cheap and every clone talks to the same store.
#[derive(Clone)]
pub struct CoraClient {
    resolver: ScheduleResolver<dyn ScheduleStore>,
    coordinator: ReservationCoordinator<dyn ScheduleStore>,
}

impl CoraClient {
    pub fn from_store(store: Arc<dyn ScheduleStore>) -> Self {
        Self {
            resolver: ScheduleResolver::new(Arc::clone(&store)),
            coordinator: ReservationCoordinator::new(store),
        }
    }

    /// Create a client over an empty in-memory store.
    pub fn new() -> Self {
        Self::from_store(Arc::new(InMemoryScheduleStore::new()))
    }

    /// Create a client over an in-memory store loaded with `seed`.
    pub fn with_seed(seed: &ScheduleSeed) -> ScheduleResult<Self> {
        let store = InMemoryScheduleStore::with_seed(seed)?;
        Ok(Self::from_store(Arc::new(store)))
    }

    /// Create a client backed by SQLite at the given path.
    /// Bookings persist across restarts.
    #[cfg(feature = "sqlite")]
    pub fn with_sqlite(path: &str, busy_timeout: std::time::Duration) -> ScheduleResult<Self> {
        let store = crate::infrastructure_sqlite::SqliteScheduleStore::open(path, busy_timeout)?;
        Ok(Self::from_store(Arc::new(store)))
    }

    /// Seed `store` and build a client over it.
    pub fn seeded<S: SeedableStore + 'static>(store: S, seed: &ScheduleSeed) -> ScheduleResult<Self> {
        store.load_seed(seed)?;
        Ok(Self::from_store(Arc::new(store)))
    }

    /// A client over the same store whose writes stop once `deadline` has
    /// passed. Reads are not affected.
    pub fn until(&self, deadline: Instant) -> Self {
        Self {
            resolver: self.resolver.clone(),
            coordinator: self.coordinator.until(deadline),
        }
    }

    /// Abort the statement the store is running, if the backend supports it.
    pub fn interrupt(&self) {
        self.coordinator.interrupt();
    }

    pub fn resolver(&self) -> &ScheduleResolver<dyn ScheduleStore> {
        &self.resolver
    }

    pub fn coordinator(&self) -> &ReservationCoordinator<dyn ScheduleStore> {
        &self.coordinator
    }

    pub fn free_rooms(&self, slot: SlotId, date: NaiveDate) -> ScheduleResult<BTreeSet<RoomId>> {
        self.resolver.free_rooms(slot, date)
    }

    pub fn free_slots(&self, room: &str, date: NaiveDate) -> ScheduleResult<BTreeSet<SlotId>> {
        self.resolver.free_slots(room, date)
    }

    pub fn day_timetable(&self, room: &str, date: NaiveDate) -> ScheduleResult<BTreeMap<SlotId, String>> {
        self.resolver.effective_day_timetable(room, date)
    }

    pub fn reserve(
        &self,
        room: &str,
        date: NaiveDate,
        slot: SlotId,
        instructor: &str,
        subject: &str,
    ) -> ScheduleResult<ReserveOutcome> {
        self.coordinator.reserve(room, date, slot, instructor, subject)
    }

    pub fn reserve_range(
        &self,
        room: &str,
        date: NaiveDate,
        start: SlotId,
        end: SlotId,
        instructor: &str,
        subject: &str,
    ) -> ScheduleResult<usize> {
        self.coordinator.reserve_range(room, date, start, end, instructor, subject)
    }

    pub fn reserve_range_report(
        &self,
        room: &str,
        date: NaiveDate,
        start: SlotId,
        end: SlotId,
        instructor: &str,
        subject: &str,
    ) -> ScheduleResult<RangeReservation> {
        self.coordinator
            .reserve_range_report(room, date, start, end, instructor, subject)
    }

    pub fn cancel(&self, room: &str, date: NaiveDate, slot: SlotId) -> ScheduleResult<CancelOutcome> {
        self.coordinator.cancel(room, date, slot)
    }

    pub fn bookings_for(&self, instructor: &str) -> ScheduleResult<Vec<BookingRecord>> {
        self.coordinator.bookings_for(instructor)
    }

    pub fn all_slots(&self) -> ScheduleResult<Vec<Slot>> {
        self.resolver.all_slots()
    }

    pub fn all_rooms(&self) -> ScheduleResult<Vec<RoomId>> {
        self.resolver.all_rooms()
    }

    pub fn all_subjects(&self) -> ScheduleResult<Vec<Subject>> {
        self.resolver.all_subjects()
    }
}

impl Default for CoraClient {
    fn default() -> Self {
        Self::new()
    }
}
