//! # SubTrack Calendar
//!
//! Pure date arithmetic: conversion between the Gregorian calendar and the
//! Chinese lunar calendar (1900–2100), and the "next due date" computation
//! for recurring subscriptions in either calendar.
//!
//! Nothing in this crate performs I/O; all functions are safe to call from
//! any thread.

pub mod lunar;
pub mod recurrence;

pub use lunar::{LunarDate, lunar_to_solar, solar_date_to_lunar, solar_to_lunar};
pub use recurrence::next_due_date;
