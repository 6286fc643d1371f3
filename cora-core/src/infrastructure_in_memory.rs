use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{ScheduleError, ScheduleResult};
use crate::infrastructure::{ScheduleStore, SeedableStore};
use crate::resolver::is_slot_free;
use crate::types::*;

type TemplateKey = (RoomId, Weekday, SlotId);
type OverrideKey = (RoomId, NaiveDate, SlotId);

#[derive(Default)]
struct Tables {
    slots: BTreeMap<SlotId, Slot>,
    subjects: BTreeMap<String, Subject>,
    template: HashMap<TemplateKey, TemplateEntry>,
    overrides: HashMap<OverrideKey, OverrideEntry>,
}

/// A store that keeps every table in process memory.
///
/// A single lock guards all tables, so the conditional insert sees the
/// template and the override table in one consistent state.
#[derive(Default)]
pub struct InMemoryScheduleStore {
    tables: RwLock<Tables>,
}

impl InMemoryScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_seed(seed: &ScheduleSeed) -> ScheduleResult<Self> {
        let store = Self::new();
        store.load_seed(seed)?;
        Ok(store)
    }

    fn read(&self) -> ScheduleResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| ScheduleError::StoreUnavailable("in-memory store lock poisoned".into()))
    }

    fn write(&self) -> ScheduleResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| ScheduleError::StoreUnavailable("in-memory store lock poisoned".into()))
    }
}

impl ScheduleStore for InMemoryScheduleStore {
    fn template_for_room(&self, room: &str, weekday: Weekday) -> ScheduleResult<Vec<TemplateEntry>> {
        Ok(self
            .read()?
            .template
            .values()
            .filter(|t| t.room == room && t.weekday == weekday)
            .cloned()
            .collect())
    }

    fn template_for_slot(&self, weekday: Weekday, slot: SlotId) -> ScheduleResult<Vec<TemplateEntry>> {
        Ok(self
            .read()?
            .template
            .values()
            .filter(|t| t.weekday == weekday && t.slot == slot)
            .cloned()
            .collect())
    }

    fn overrides_for_room(&self, room: &str, date: NaiveDate) -> ScheduleResult<Vec<OverrideEntry>> {
        Ok(self
            .read()?
            .overrides
            .values()
            .filter(|o| o.room == room && o.date == date)
            .cloned()
            .collect())
    }

    fn overrides_for_slot(&self, date: NaiveDate, slot: SlotId) -> ScheduleResult<Vec<OverrideEntry>> {
        Ok(self
            .read()?
            .overrides
            .values()
            .filter(|o| o.date == date && o.slot == slot)
            .cloned()
            .collect())
    }

    fn insert_override_if_free(&self, entry: &OverrideEntry, weekday: Weekday) -> ScheduleResult<bool> {
        let mut tables = self.write()?;
        let template_key = (entry.room.clone(), weekday, entry.slot);
        let override_key = (entry.room.clone(), entry.date, entry.slot);

        let free = is_slot_free(
            tables.template.get(&template_key),
            tables.overrides.get(&override_key),
        );
        if free {
            tables.overrides.insert(override_key, entry.clone());
        }
        Ok(free)
    }

    fn delete_override(&self, room: &str, date: NaiveDate, slot: SlotId) -> ScheduleResult<bool> {
        Ok(self
            .write()?
            .overrides
            .remove(&(room.to_string(), date, slot))
            .is_some())
    }

    fn overrides_for_instructor(&self, instructor: &str) -> ScheduleResult<Vec<OverrideEntry>> {
        Ok(self
            .read()?
            .overrides
            .values()
            .filter(|o| o.instructor == instructor)
            .cloned()
            .collect())
    }

    fn slots(&self) -> ScheduleResult<Vec<Slot>> {
        Ok(self.read()?.slots.values().cloned().collect())
    }

    fn rooms(&self) -> ScheduleResult<Vec<RoomId>> {
        let rooms: BTreeSet<RoomId> = self
            .read()?
            .template
            .keys()
            .map(|(room, _, _)| room.clone())
            .collect();
        Ok(rooms.into_iter().collect())
    }

    fn subjects(&self) -> ScheduleResult<Vec<Subject>> {
        Ok(self.read()?.subjects.values().cloned().collect())
    }
}

impl SeedableStore for InMemoryScheduleStore {
    fn load_seed(&self, seed: &ScheduleSeed) -> ScheduleResult<()> {
        let mut tables = self.write()?;
        for slot in &seed.slots {
            tables.slots.insert(slot.id, slot.clone());
        }
        for subject in &seed.subjects {
            tables.subjects.insert(subject.id.clone(), subject.clone());
        }
        for entry in &seed.template {
            tables
                .template
                .insert((entry.room.clone(), entry.weekday, entry.slot), entry.clone());
        }
        Ok(())
    }
}
