use chrono::NaiveDate;

use crate::error::ScheduleResult;
use crate::types::{OverrideEntry, RoomId, ScheduleSeed, Slot, SlotId, Subject, TemplateEntry, Weekday};

/// Defines the contract for timetable storage backends.
///
/// Every method is one bounded access to the store. Implementations hold
/// all shared state themselves and must be safe to call from many threads
/// at once.
pub trait ScheduleStore: Send + Sync {
    /// Template rows of one room on one weekday.
    fn template_for_room(&self, room: &str, weekday: Weekday) -> ScheduleResult<Vec<TemplateEntry>>;

    /// Template rows of every room for one weekday/slot.
    fn template_for_slot(&self, weekday: Weekday, slot: SlotId) -> ScheduleResult<Vec<TemplateEntry>>;

    /// Override rows of one room on one date.
    fn overrides_for_room(&self, room: &str, date: NaiveDate) -> ScheduleResult<Vec<OverrideEntry>>;

    /// Override rows of every room for one date/slot.
    fn overrides_for_slot(&self, date: NaiveDate, slot: SlotId) -> ScheduleResult<Vec<OverrideEntry>>;

    /// Insert `entry` only if the template marks its slot `"FREE"` on
    /// `weekday` and no override exists for its key yet.
    ///
    /// The check and the write are a single atomic step: of any number of
    /// concurrent calls for the same key, at most one returns `true`.
    fn insert_override_if_free(&self, entry: &OverrideEntry, weekday: Weekday) -> ScheduleResult<bool>;

    /// Remove the override for a key. Returns whether a row was removed.
    fn delete_override(&self, room: &str, date: NaiveDate, slot: SlotId) -> ScheduleResult<bool>;

    /// All overrides booked by an instructor, in no particular order.
    fn overrides_for_instructor(&self, instructor: &str) -> ScheduleResult<Vec<OverrideEntry>>;

    /// Slot reference data ordered by id.
    fn slots(&self) -> ScheduleResult<Vec<Slot>>;

    /// Distinct rooms appearing in the template, sorted.
    fn rooms(&self) -> ScheduleResult<Vec<RoomId>>;

    /// Subject reference data, including the `"FREE"` sentinel if present.
    fn subjects(&self) -> ScheduleResult<Vec<Subject>>;

    /// Abort the statement the backend is running right now, if it can.
    ///
    /// The aborted call fails with `StoreUnavailable` and writes nothing.
    /// Backends whose calls cannot block for long ignore this.
    fn interrupt(&self) {}
}

/// Setup path for loading reference data into a store.
///
/// This sits outside the engine: the resolver and coordinator never write
/// template rows.
pub trait SeedableStore: ScheduleStore {
    fn load_seed(&self, seed: &ScheduleSeed) -> ScheduleResult<()>;
}
