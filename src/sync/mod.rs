//! Background tasks that keep the live views and the range cache current.

pub mod scheduler;
