#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use std::collections::BTreeSet;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::{Duration, Instant};

    use crate::coordinator::ReservationCoordinator;
    use crate::error::ScheduleResult;
    use crate::fixtures::{monday, saturday, seed, tuesday, FACULTY};
    use crate::infrastructure::ScheduleStore;
    use crate::infrastructure_in_memory::InMemoryScheduleStore;
    use crate::resolver::ScheduleResolver;
    use crate::types::*;

    fn seeded() -> (ScheduleResolver<InMemoryScheduleStore>, ReservationCoordinator<InMemoryScheduleStore>) {
        let store = Arc::new(InMemoryScheduleStore::with_seed(&seed()).unwrap());
        (
            ScheduleResolver::new(Arc::clone(&store)),
            ReservationCoordinator::new(store),
        )
    }

    #[test]
    fn test_double_booking_is_rejected() {
        let (_, coordinator) = seeded();

        assert_eq!(
            coordinator.reserve("A104", monday(), 4, FACULTY, "CS101").unwrap(),
            ReserveOutcome::Reserved
        );
        assert_eq!(
            coordinator.reserve("A104", monday(), 4, "other@x", "CS201").unwrap(),
            ReserveOutcome::NotFree
        );

        // The first booking is kept, not overwritten.
        let bookings = coordinator.bookings_for(FACULTY).unwrap();
        assert_eq!(bookings.len(), 1);
        assert_eq!(bookings[0].subject, "CS101");
        assert!(coordinator.bookings_for("other@x").unwrap().is_empty());
    }

    #[test]
    fn test_a104_monday_scenario() {
        let (resolver, coordinator) = seeded();

        let before = resolver.free_slots("A104", monday()).unwrap();
        assert!(before.contains(&4));
        assert!(!before.contains(&2));

        assert_eq!(
            coordinator.reserve("A104", monday(), 4, FACULTY, "CS101").unwrap(),
            ReserveOutcome::Reserved
        );
        assert_eq!(
            coordinator.reserve("A104", monday(), 2, FACULTY, "CS101").unwrap(),
            ReserveOutcome::NotFree
        );

        let after = resolver.free_slots("A104", monday()).unwrap();
        assert!(!after.contains(&4));
        assert!(!after.contains(&2));
    }

    #[test]
    fn test_cancel_restores_freedom() {
        let (resolver, coordinator) = seeded();

        coordinator.reserve("A104", monday(), 4, FACULTY, "CS101").unwrap();
        assert!(!resolver.free_slots("A104", monday()).unwrap().contains(&4));

        assert_eq!(
            coordinator.cancel("A104", monday(), 4).unwrap(),
            CancelOutcome::Canceled
        );
        assert!(resolver.free_slots("A104", monday()).unwrap().contains(&4));
        assert_eq!(
            coordinator.reserve("A104", monday(), 4, "other@x", "CS201").unwrap(),
            ReserveOutcome::Reserved
        );
    }

    #[test]
    fn test_cancel_without_booking_is_idempotent() {
        let (resolver, coordinator) = seeded();
        let before = resolver.free_slots("A104", monday()).unwrap();

        assert_eq!(coordinator.cancel("A104", monday(), 4).unwrap(), CancelOutcome::NotFound);
        assert_eq!(coordinator.cancel("A104", monday(), 4).unwrap(), CancelOutcome::NotFound);
        // Cancelling a template-occupied slot cannot free it.
        assert_eq!(coordinator.cancel("A104", monday(), 2).unwrap(), CancelOutcome::NotFound);

        assert_eq!(resolver.free_slots("A104", monday()).unwrap(), before);
    }

    #[test]
    fn test_reserve_range_on_free_slots() {
        let (resolver, coordinator) = seeded();

        assert_eq!(
            coordinator.reserve_range("A104", tuesday(), 5, 8, FACULTY, "CS201").unwrap(),
            4
        );
        assert_eq!(
            coordinator.reserve_range("A104", tuesday(), 5, 8, FACULTY, "CS201").unwrap(),
            0
        );
        assert!(resolver.free_slots("A104", tuesday()).unwrap().is_empty());
    }

    #[test]
    fn test_reserve_range_counts_partial_success() {
        let (resolver, coordinator) = seeded();

        // Slot 7 is already taken by someone else.
        coordinator.reserve("A104", monday(), 7, "other@x", "MA101").unwrap();
        let before = resolver.free_slots("A104", monday()).unwrap();
        assert_eq!(before, BTreeSet::from([3, 4, 5, 8]));

        // 1, 2 and 6 are template-occupied, 7 is booked: 3, 4, 5, 8 remain.
        let reserved = coordinator
            .reserve_range("A104", monday(), 1, 8, FACULTY, "CS101")
            .unwrap();
        assert_eq!(reserved, 4);

        assert!(resolver.free_slots("A104", monday()).unwrap().is_empty());
        let mine: BTreeSet<u32> = coordinator
            .bookings_for(FACULTY)
            .unwrap()
            .into_iter()
            .map(|b| b.slot)
            .collect();
        assert_eq!(mine, before);
    }

    #[test]
    fn test_reserve_range_edge_cases() {
        let (_, coordinator) = seeded();

        assert_eq!(coordinator.reserve_range("A104", tuesday(), 8, 5, FACULTY, "CS201").unwrap(), 0);
        assert_eq!(coordinator.reserve_range("A104", tuesday(), 6, 6, FACULTY, "CS201").unwrap(), 1);
        assert_eq!(coordinator.reserve_range("A104", tuesday(), 9, 12, FACULTY, "CS201").unwrap(), 0);
    }

    #[test]
    fn test_weekend_and_unknown_room_are_not_free() {
        let (_, coordinator) = seeded();

        assert_eq!(
            coordinator.reserve("A104", saturday(), 4, FACULTY, "CS101").unwrap(),
            ReserveOutcome::NotFree
        );
        assert_eq!(
            coordinator.reserve("Z999", monday(), 4, FACULTY, "CS101").unwrap(),
            ReserveOutcome::NotFree
        );
        assert!(coordinator.bookings_for(FACULTY).unwrap().is_empty());
    }

    #[test]
    fn test_bookings_for_lists_only_that_instructor() {
        let (_, coordinator) = seeded();

        coordinator.reserve("A104", monday(), 3, FACULTY, "CS101").unwrap();
        coordinator.reserve("B201", monday(), 2, FACULTY, "CS201").unwrap();
        coordinator.reserve("A104", monday(), 4, "other@x", "MA101").unwrap();

        let mut bookings = coordinator.bookings_for(FACULTY).unwrap();
        bookings.sort_by(|a, b| a.room.cmp(&b.room));
        assert_eq!(bookings.len(), 2);
        assert_eq!((bookings[0].room.as_str(), bookings[0].slot), ("A104", 3));
        assert_eq!((bookings[1].room.as_str(), bookings[1].slot), ("B201", 2));
        assert!(bookings.iter().all(|b| b.instructor == FACULTY && b.date == monday()));
    }

    #[test]
    fn test_concurrent_reservations_have_one_winner() {
        let (_, coordinator) = seeded();
        let contenders = 16;
        let barrier = Arc::new(Barrier::new(contenders));

        let handles: Vec<_> = (0..contenders)
            .map(|i| {
                let coordinator = coordinator.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    coordinator.reserve("A104", monday(), 4, &format!("fac{i}@x"), "CS101")
                })
            })
            .collect();

        let outcomes: Vec<ReserveOutcome> = handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap())
            .collect();

        let winners = outcomes.iter().filter(|o| **o == ReserveOutcome::Reserved).count();
        assert_eq!(winners, 1);
        assert_eq!(outcomes.len() - winners, contenders - 1);
    }

    #[test]
    fn test_concurrent_overlapping_ranges_never_double_book() {
        let (resolver, coordinator) = seeded();
        let contenders = 8;
        let barrier = Arc::new(Barrier::new(contenders));

        let handles: Vec<_> = (0..contenders)
            .map(|i| {
                let coordinator = coordinator.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    coordinator.reserve_range("A104", tuesday(), 5, 8, &format!("fac{i}@x"), "CS201")
                })
            })
            .collect();

        let total: usize = handles.into_iter().map(|h| h.join().unwrap().unwrap()).sum();
        assert_eq!(total, 4);
        assert!(resolver.free_slots("A104", tuesday()).unwrap().is_empty());
    }

    #[test]
    fn test_passed_deadline_blocks_every_write() {
        let (resolver, coordinator) = seeded();
        assert_eq!(
            coordinator.reserve("A104", monday(), 4, FACULTY, "CS101").unwrap(),
            ReserveOutcome::Reserved
        );

        let late = coordinator.until(Instant::now());
        assert!(late.reserve("A104", tuesday(), 5, FACULTY, "CS101").unwrap_err().is_store_unavailable());
        assert!(late.cancel("A104", monday(), 4).unwrap_err().is_store_unavailable());
        assert!(late
            .reserve_range("A104", tuesday(), 5, 8, FACULTY, "CS101")
            .unwrap_err()
            .is_store_unavailable());
        assert_eq!(
            late.reserve_range_report("A104", tuesday(), 5, 8, FACULTY, "CS101").unwrap(),
            RangeReservation {
                reserved: 0,
                requested: 4,
                expired: true,
            }
        );

        // Nothing moved: Monday's booking stands and Tuesday is still open.
        assert_eq!(late.bookings_for(FACULTY).unwrap().len(), 1);
        assert_eq!(resolver.free_slots("A104", tuesday()).unwrap(), BTreeSet::from([5, 6, 7, 8]));
    }

    #[test]
    fn test_distant_deadline_changes_nothing() {
        let (_, coordinator) = seeded();
        let bounded = coordinator.until(Instant::now() + Duration::from_secs(60));

        assert_eq!(
            bounded.reserve_range_report("A104", tuesday(), 5, 8, FACULTY, "CS201").unwrap(),
            RangeReservation {
                reserved: 4,
                requested: 4,
                expired: false,
            }
        );
        assert_eq!(bounded.cancel("A104", tuesday(), 5).unwrap(), CancelOutcome::Canceled);
        assert_eq!(RangeReservation::new(8, 5).requested, 0);
    }

    /// Takes a while to write, like a store under lock contention.
    struct SlowWrites(InMemoryScheduleStore);

    impl ScheduleStore for SlowWrites {
        fn template_for_room(&self, room: &str, weekday: Weekday) -> ScheduleResult<Vec<TemplateEntry>> {
            self.0.template_for_room(room, weekday)
        }
        fn template_for_slot(&self, weekday: Weekday, slot: SlotId) -> ScheduleResult<Vec<TemplateEntry>> {
            self.0.template_for_slot(weekday, slot)
        }
        fn overrides_for_room(&self, room: &str, date: NaiveDate) -> ScheduleResult<Vec<OverrideEntry>> {
            self.0.overrides_for_room(room, date)
        }
        fn overrides_for_slot(&self, date: NaiveDate, slot: SlotId) -> ScheduleResult<Vec<OverrideEntry>> {
            self.0.overrides_for_slot(date, slot)
        }
        fn insert_override_if_free(&self, entry: &OverrideEntry, weekday: Weekday) -> ScheduleResult<bool> {
            thread::sleep(Duration::from_millis(40));
            self.0.insert_override_if_free(entry, weekday)
        }
        fn delete_override(&self, room: &str, date: NaiveDate, slot: SlotId) -> ScheduleResult<bool> {
            self.0.delete_override(room, date, slot)
        }
        fn overrides_for_instructor(&self, instructor: &str) -> ScheduleResult<Vec<OverrideEntry>> {
            self.0.overrides_for_instructor(instructor)
        }
        fn slots(&self) -> ScheduleResult<Vec<Slot>> {
            self.0.slots()
        }
        fn rooms(&self) -> ScheduleResult<Vec<RoomId>> {
            self.0.rooms()
        }
        fn subjects(&self) -> ScheduleResult<Vec<Subject>> {
            self.0.subjects()
        }
    }

    #[test]
    fn test_range_stops_at_deadline_and_counts_what_it_booked() {
        let store = Arc::new(SlowWrites(InMemoryScheduleStore::with_seed(&seed()).unwrap()));
        let resolver = ScheduleResolver::new(Arc::clone(&store));
        let coordinator = ReservationCoordinator::new(store).until(Instant::now() + Duration::from_millis(60));

        let outcome = coordinator
            .reserve_range_report("A104", tuesday(), 5, 8, FACULTY, "CS201")
            .unwrap();
        assert!(outcome.expired);
        assert!(outcome.reserved < 4);

        // The count matches the store exactly: no slot is booked unreported.
        let booked = coordinator.bookings_for(FACULTY).unwrap().len();
        assert_eq!(outcome.reserved, booked);
        assert_eq!(resolver.free_slots("A104", tuesday()).unwrap().len(), 4 - booked);
    }
}
