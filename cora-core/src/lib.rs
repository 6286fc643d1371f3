//! # cora-core
//!
//! Room and slot availability for a weekly class timetable.
//! Resolves free rooms and slots for a date by overlaying dated bookings
//! on the recurring template, and books slots with an atomic
//! check-and-insert so a slot is never handed out twice.

pub mod client;
pub mod coordinator;
pub mod error;
pub mod infrastructure;
#[path = "infrastructure_in_memory.rs"]
pub mod infrastructure_in_memory;
#[cfg(feature = "sqlite")]
#[path = "infrastructure_sqlite.rs"]
pub mod infrastructure_sqlite;
pub mod resolver;
pub mod types;

#[cfg(test)]
mod fixtures;
#[cfg(test)]
mod coordinator_test;
