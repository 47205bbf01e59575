use chrono::NaiveDate;

use crate::model::SlotKey;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    /// The slot's date is flagged as a day off.
    DayOffBlocked(NaiveDate),
    /// A slot in the requested span is already occupied (directly or by the
    /// derived span of an existing appointment).
    Overlap(SlotKey),
    /// The span would run past the last generated slot of the day.
    InsufficientSpace(SlotKey),
    /// Cannot un-confirm a completed appointment.
    CompletedLocked(SlotKey),
    /// Cannot mark an unconfirmed appointment completed.
    NotConfirmed(SlotKey),
    /// No appointment recorded under the key.
    NotFound(SlotKey),
    /// Commit attempted without a selected slot.
    NoSelection,
    /// Draft failed field validation.
    InvalidDraft(&'static str),
    /// The store rejected a write; the optimistic mutation was rolled back.
    StoreWriteFailed(String),
    /// The store could not be read.
    StoreReadFailed(String),
}

impl std::fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScheduleError::DayOffBlocked(date) => {
                write!(f, "day {date} is marked as a day off")
            }
            ScheduleError::Overlap(key) => write!(f, "slot {key} is already booked"),
            ScheduleError::InsufficientSpace(key) => {
                write!(f, "span starting at {key} runs past the end of the day")
            }
            ScheduleError::CompletedLocked(key) => {
                write!(f, "appointment {key} is completed; confirmation is locked")
            }
            ScheduleError::NotConfirmed(key) => {
                write!(f, "appointment {key} is not confirmed")
            }
            ScheduleError::NotFound(key) => write!(f, "no appointment at {key}"),
            ScheduleError::NoSelection => write!(f, "no slot selected"),
            ScheduleError::InvalidDraft(msg) => write!(f, "invalid draft: {msg}"),
            ScheduleError::StoreWriteFailed(e) => write!(f, "store write failed: {e}"),
            ScheduleError::StoreReadFailed(e) => write!(f, "store read failed: {e}"),
        }
    }
}

impl std::error::Error for ScheduleError {}
