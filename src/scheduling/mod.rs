//! Booking rules: wall clock, availability, validation and recurrence.

pub mod availability;
pub mod recurrence;
pub mod rules;
pub mod time;
pub mod worker;
