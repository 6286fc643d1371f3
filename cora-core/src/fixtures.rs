use chrono::{NaiveDate, NaiveTime};

use crate::types::{ScheduleSeed, Slot, Subject, TemplateEntry, Weekday};

pub const FACULTY: &str = "fac@x";

pub fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

pub fn tuesday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
}

pub fn saturday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 6).unwrap()
}

fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn entry(room: &str, weekday: Weekday, slot: u32, subject: &str) -> TemplateEntry {
    TemplateEntry {
        room: room.to_string(),
        weekday,
        slot,
        subject: subject.to_string(),
        instructor: if subject == "FREE" { "none".into() } else { "staff@x".into() },
    }
}

/// Eight slots, two rooms.
///
/// A104 MON: 1 MA101, 2 CS101, 3-5 FREE, 6 MA101, 7-8 FREE
/// A104 TUE: 1-4 CS101, 5-8 FREE
/// B201 MON: 2 and 4 FREE, everything else CS201
/// B201 TUE: all CS201
pub fn seed() -> ScheduleSeed {
    let slots = [
        (1, time(8, 50), time(9, 40)),
        (2, time(9, 40), time(10, 30)),
        (3, time(10, 40), time(11, 30)),
        (4, time(11, 30), time(12, 20)),
        (5, time(13, 40), time(14, 30)),
        (6, time(14, 30), time(15, 20)),
        (7, time(15, 20), time(16, 10)),
        (8, time(16, 10), time(17, 0)),
    ]
    .into_iter()
    .map(|(id, start, end)| Slot { id, start, end })
    .collect();

    let subjects = [("FREE", "Free"), ("CS101", "Programming"), ("CS201", "Data Structures"), ("MA101", "Calculus")]
        .into_iter()
        .map(|(id, name)| Subject {
            id: id.to_string(),
            name: name.to_string(),
        })
        .collect();

    let a104_mon = ["MA101", "CS101", "FREE", "FREE", "FREE", "MA101", "FREE", "FREE"];
    let a104_tue = ["CS101", "CS101", "CS101", "CS101", "FREE", "FREE", "FREE", "FREE"];
    let b201_mon = ["CS201", "FREE", "CS201", "FREE", "CS201", "CS201", "CS201", "CS201"];
    let b201_tue = ["CS201"; 8];

    let mut template = Vec::new();
    for (room, weekday, row) in [
        ("A104", Weekday::Mon, a104_mon),
        ("A104", Weekday::Tue, a104_tue),
        ("B201", Weekday::Mon, b201_mon),
        ("B201", Weekday::Tue, b201_tue),
    ] {
        for (i, subject) in row.iter().enumerate() {
            template.push(entry(room, weekday, i as u32 + 1, subject));
        }
    }

    ScheduleSeed {
        slots,
        subjects,
        template,
    }
}
