//! Read path: overlays date-specific overrides on the weekly template.

use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::error::{ScheduleError, ScheduleResult};
use crate::infrastructure::ScheduleStore;
use crate::types::{OverrideEntry, RoomId, Slot, SlotId, Subject, TemplateEntry, Weekday, FREE_SUBJECT};

/// The freedom predicate shared by every read and write path.
///
/// A slot can be booked only when its template row is the `"FREE"` sentinel
/// and nothing has been booked over it for the date. Template-occupied slots
/// are never bookable, whatever the overrides say.
pub fn is_slot_free(template: Option<&TemplateEntry>, booking: Option<&OverrideEntry>) -> bool {
    template.is_some_and(TemplateEntry::is_free) && booking.is_none()
}

/// Both tiers for one key: the weekday template row and the dated override.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Occupancy {
    pub template: Option<TemplateEntry>,
    pub booking: Option<OverrideEntry>,
}

impl Occupancy {
    /// Override subject if booked, otherwise the template subject.
    pub fn effective_subject(&self) -> Option<&str> {
        self.booking
            .as_ref()
            .map(|b| b.subject.as_str())
            .or_else(|| self.template.as_ref().map(|t| t.subject.as_str()))
    }

    pub fn is_free(&self) -> bool {
        is_slot_free(self.template.as_ref(), self.booking.as_ref())
    }
}

/// Merges template and override rows into one [`Occupancy`] per key.
///
/// A key seen twice within the same tier means the store broke its
/// uniqueness guarantee; that is reported, never resolved by picking a row.
pub fn overlay<K: Ord + Clone>(
    template: Vec<TemplateEntry>,
    overrides: Vec<OverrideEntry>,
    template_key: impl Fn(&TemplateEntry) -> K,
    override_key: impl Fn(&OverrideEntry) -> K,
) -> ScheduleResult<BTreeMap<K, Occupancy>> {
    let mut cells: BTreeMap<K, Occupancy> = BTreeMap::new();

    let template_rows = count_by(&template, |t| template_key(t));
    if let Some((entry, rows)) = first_duplicate(&template, &template_rows, |t| template_key(t)) {
        return Err(ScheduleError::DataIntegrity {
            table: "template_entries",
            key: format!("{}/{}/{}", entry.room, entry.weekday, entry.slot),
            rows,
        });
    }
    let override_rows = count_by(&overrides, |o| override_key(o));
    if let Some((entry, rows)) = first_duplicate(&overrides, &override_rows, |o| override_key(o)) {
        return Err(ScheduleError::DataIntegrity {
            table: "override_entries",
            key: format!("{}/{}/{}", entry.room, entry.date, entry.slot),
            rows,
        });
    }

    for entry in template {
        let key = template_key(&entry);
        cells.entry(key).or_default().template = Some(entry);
    }
    for entry in overrides {
        let key = override_key(&entry);
        cells.entry(key).or_default().booking = Some(entry);
    }
    Ok(cells)
}

fn count_by<T, K: Ord>(rows: &[T], key: impl Fn(&T) -> K) -> BTreeMap<K, usize> {
    let mut counts = BTreeMap::new();
    for row in rows {
        *counts.entry(key(row)).or_insert(0) += 1;
    }
    counts
}

fn first_duplicate<'a, T, K: Ord>(
    rows: &'a [T],
    counts: &BTreeMap<K, usize>,
    key: impl Fn(&T) -> K,
) -> Option<(&'a T, usize)> {
    rows.iter().find_map(|row| match counts.get(&key(row)) {
        Some(&n) if n > 1 => Some((row, n)),
        _ => None,
    })
}

/// Computes free rooms, free slots and effective timetables for a date.
pub struct ScheduleResolver<S: ?Sized> {
    store: Arc<S>,
}

impl<S: ScheduleStore + ?Sized> ScheduleResolver<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Occupancy of every room in one slot on one date, keyed by room.
    pub fn slot_occupancy(&self, slot: SlotId, date: NaiveDate) -> ScheduleResult<BTreeMap<RoomId, Occupancy>> {
        let template = match Weekday::from_date(date) {
            Some(weekday) => self.store.template_for_slot(weekday, slot)?,
            None => Vec::new(),
        };
        let overrides = self.store.overrides_for_slot(date, slot)?;
        overlay(template, overrides, |t| t.room.clone(), |o| o.room.clone())
    }

    /// Occupancy of every slot of one room on one date, keyed by slot.
    pub fn day_occupancy(&self, room: &str, date: NaiveDate) -> ScheduleResult<BTreeMap<SlotId, Occupancy>> {
        let template = match Weekday::from_date(date) {
            Some(weekday) => self.store.template_for_room(room, weekday)?,
            None => Vec::new(),
        };
        let overrides = self.store.overrides_for_room(room, date)?;
        overlay(template, overrides, |t| t.slot, |o| o.slot)
    }

    /// Rooms that can still be booked for `slot` on `date`.
    pub fn free_rooms(&self, slot: SlotId, date: NaiveDate) -> ScheduleResult<BTreeSet<RoomId>> {
        if Weekday::from_date(date).is_none() {
            return Ok(BTreeSet::new());
        }
        let rooms: BTreeSet<RoomId> = self
            .slot_occupancy(slot, date)?
            .into_iter()
            .filter(|(_, cell)| cell.is_free())
            .map(|(room, _)| room)
            .collect();
        tracing::debug!(slot, %date, free = rooms.len(), "Resolved free rooms");
        Ok(rooms)
    }

    /// Slots of `room` that can still be booked on `date`.
    pub fn free_slots(&self, room: &str, date: NaiveDate) -> ScheduleResult<BTreeSet<SlotId>> {
        if Weekday::from_date(date).is_none() {
            return Ok(BTreeSet::new());
        }
        let slots: BTreeSet<SlotId> = self
            .day_occupancy(room, date)?
            .into_iter()
            .filter(|(_, cell)| cell.is_free())
            .map(|(slot, _)| slot)
            .collect();
        tracing::debug!(room, %date, free = slots.len(), "Resolved free slots");
        Ok(slots)
    }

    /// Subject occupying each slot of `room` on `date`.
    ///
    /// Slots without a template row are left out, even when booked.
    pub fn effective_day_timetable(&self, room: &str, date: NaiveDate) -> ScheduleResult<BTreeMap<SlotId, String>> {
        Ok(self
            .day_occupancy(room, date)?
            .into_iter()
            .filter(|(_, cell)| cell.template.is_some())
            .filter_map(|(slot, cell)| cell.effective_subject().map(|s| (slot, s.to_string())))
            .collect())
    }

    pub fn all_slots(&self) -> ScheduleResult<Vec<Slot>> {
        self.store.slots()
    }

    pub fn all_rooms(&self) -> ScheduleResult<Vec<RoomId>> {
        self.store.rooms()
    }

    /// Bookable subjects; the `"FREE"` sentinel is not one of them.
    pub fn all_subjects(&self) -> ScheduleResult<Vec<Subject>> {
        Ok(self
            .store
            .subjects()?
            .into_iter()
            .filter(|s| s.id != FREE_SUBJECT)
            .collect())
    }
}

impl<S: ?Sized> Clone for ScheduleResolver<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}
