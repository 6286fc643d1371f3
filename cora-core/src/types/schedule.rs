use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{RoomId, Slot, SlotId, Subject, Weekday, FREE_SUBJECT};

/// One row of the recurring weekly timetable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateEntry {
    pub room: RoomId,
    pub weekday: Weekday,
    pub slot: SlotId,
    pub subject: String,
    pub instructor: String,
}

impl TemplateEntry {
    /// Whether this template slot carries the `"FREE"` sentinel.
    pub fn is_free(&self) -> bool {
        self.subject == FREE_SUBJECT
    }
}

/// A date-specific booking that supersedes the template for one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideEntry {
    pub room: RoomId,
    pub date: NaiveDate,
    pub slot: SlotId,
    pub instructor: String,
    pub subject: String,
}

/// What an instructor has booked, as reported back to them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRecord {
    pub room: RoomId,
    pub date: NaiveDate,
    pub slot: SlotId,
    pub instructor: String,
    pub subject: String,
}

impl From<OverrideEntry> for BookingRecord {
    fn from(entry: OverrideEntry) -> Self {
        Self {
            room: entry.room,
            date: entry.date,
            slot: entry.slot,
            instructor: entry.instructor,
            subject: entry.subject,
        }
    }
}

/// Result of a single-slot reservation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReserveOutcome {
    /// The override row was written.
    Reserved,
    /// The slot is occupied in the template or already booked for the date.
    NotFree,
}

/// Result of a cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancelOutcome {
    /// An override row existed and was removed.
    Canceled,
    /// Nothing was booked for the slot; no change was made.
    NotFound,
}

/// How far a range reservation got.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeReservation {
    /// Slots booked by this call.
    pub reserved: usize,
    /// Slots in the requested range.
    pub requested: usize,
    /// The deadline passed before every slot was tried. Slots booked up to
    /// that point stay booked.
    pub expired: bool,
}

impl RangeReservation {
    pub fn new(start: SlotId, end: SlotId) -> Self {
        Self {
            reserved: 0,
            requested: end.checked_sub(start).map_or(0, |span| span as usize + 1),
            expired: false,
        }
    }
}

/// Reference data used to set up a store before the engine runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleSeed {
    #[serde(default)]
    pub slots: Vec<Slot>,
    #[serde(default)]
    pub subjects: Vec<Subject>,
    #[serde(default)]
    pub template: Vec<TemplateEntry>,
}

impl ScheduleSeed {
    pub fn from_json(input: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(input)
    }
}
