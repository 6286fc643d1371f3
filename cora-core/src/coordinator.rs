//! Write path: conditional reservations and cancellations.

use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Instant;

use crate::error::{ScheduleError, ScheduleResult};
use crate::infrastructure::ScheduleStore;
use crate::types::{BookingRecord, CancelOutcome, OverrideEntry, RangeReservation, ReserveOutcome, SlotId, Weekday};

/// Books and releases slots against a shared store.
///
/// Holds nothing but the store handle and an optional deadline; every
/// decision is made by the store at write time, so any number of
/// coordinators may share one store.
pub struct ReservationCoordinator<S: ?Sized> {
    store: Arc<S>,
    deadline: Option<Instant>,
}

impl<S: ScheduleStore + ?Sized> ReservationCoordinator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store, deadline: None }
    }

    /// A coordinator over the same store that issues no store write once
    /// `deadline` has passed.
    pub fn until(&self, deadline: Instant) -> Self {
        Self {
            store: Arc::clone(&self.store),
            deadline: Some(deadline),
        }
    }

    fn expired(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    fn check_deadline(&self) -> ScheduleResult<()> {
        if self.expired() {
            Err(ScheduleError::StoreUnavailable("deadline passed before the store was called".into()))
        } else {
            Ok(())
        }
    }

    /// Book one slot if it is free.
    ///
    /// Weekend dates have no template rows and are never free.
    pub fn reserve(
        &self,
        room: &str,
        date: NaiveDate,
        slot: SlotId,
        instructor: &str,
        subject: &str,
    ) -> ScheduleResult<ReserveOutcome> {
        let Some(weekday) = Weekday::from_date(date) else {
            tracing::info!(room, %date, slot, "Reservation denied: no template on weekends");
            return Ok(ReserveOutcome::NotFree);
        };

        let entry = OverrideEntry {
            room: room.to_string(),
            date,
            slot,
            instructor: instructor.to_string(),
            subject: subject.to_string(),
        };

        self.check_deadline()?;
        if self.store.insert_override_if_free(&entry, weekday)? {
            tracing::info!(room, %date, slot, instructor, subject, "Slot reserved");
            Ok(ReserveOutcome::Reserved)
        } else {
            tracing::info!(room, %date, slot, instructor, "Reservation denied: slot not free");
            Ok(ReserveOutcome::NotFree)
        }
    }

    /// Book every free slot in `start..=end`, skipping the rest.
    ///
    /// Returns how many slots were booked. Slots are independent: a busy slot
    /// does not stop the ones after it, and nothing is rolled back. If the
    /// deadline cuts the range short the call fails, leaving the earlier
    /// bookings in place; use [`reserve_range_report`](Self::reserve_range_report)
    /// to learn how many there were.
    pub fn reserve_range(
        &self,
        room: &str,
        date: NaiveDate,
        start: SlotId,
        end: SlotId,
        instructor: &str,
        subject: &str,
    ) -> ScheduleResult<usize> {
        let outcome = self.reserve_range_report(room, date, start, end, instructor, subject)?;
        if outcome.expired {
            return Err(ScheduleError::StoreUnavailable(format!(
                "deadline passed after {} of {} slots were reserved",
                outcome.reserved, outcome.requested
            )));
        }
        Ok(outcome.reserved)
    }

    /// Like [`reserve_range`](Self::reserve_range), but a deadline that
    /// passes mid-range stops the loop and is reported in the outcome.
    pub fn reserve_range_report(
        &self,
        room: &str,
        date: NaiveDate,
        start: SlotId,
        end: SlotId,
        instructor: &str,
        subject: &str,
    ) -> ScheduleResult<RangeReservation> {
        let mut outcome = RangeReservation::new(start, end);
        for slot in start..=end {
            if self.expired() {
                tracing::warn!(room, %date, slot, reserved = outcome.reserved, "Range reservation stopped at deadline");
                outcome.expired = true;
                break;
            }
            if self.reserve(room, date, slot, instructor, subject)? == ReserveOutcome::Reserved {
                outcome.reserved += 1;
            }
        }
        tracing::debug!(room, %date, start, end, reserved = outcome.reserved, "Range reservation finished");
        Ok(outcome)
    }

    /// Release a booking. Cancelling an unbooked slot changes nothing.
    pub fn cancel(&self, room: &str, date: NaiveDate, slot: SlotId) -> ScheduleResult<CancelOutcome> {
        self.check_deadline()?;
        if self.store.delete_override(room, date, slot)? {
            tracing::info!(room, %date, slot, "Booking canceled");
            Ok(CancelOutcome::Canceled)
        } else {
            tracing::debug!(room, %date, slot, "Nothing to cancel");
            Ok(CancelOutcome::NotFound)
        }
    }

    /// Ask the store to abort whatever statement it is running.
    pub fn interrupt(&self) {
        self.store.interrupt();
    }

    /// Everything an instructor currently has booked.
    pub fn bookings_for(&self, instructor: &str) -> ScheduleResult<Vec<BookingRecord>> {
        Ok(self
            .store
            .overrides_for_instructor(instructor)?
            .into_iter()
            .map(BookingRecord::from)
            .collect())
    }
}

impl<S: ?Sized> Clone for ReservationCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            deadline: self.deadline,
        }
    }
}
