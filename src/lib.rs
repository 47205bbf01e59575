//! Weekly clinic scheduling over a shared document store.
//!
//! [`Scheduler`] keeps a week-oriented appointment book: 30-minute slots,
//! multi-slot visits recorded under their start key only, day-off flags that
//! gate whole days, and a confirm/complete lifecycle per appointment. State is
//! mirrored to a [`store::RemoteStore`]: mutations apply locally first and
//! write through, while the store's change stream reconciles every replica
//! running [`Scheduler::run_sync`].

pub mod engine;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod store;

pub use engine::{ScheduleError, Scheduler};
pub use model::{day_key, Appointment, AppointmentDraft, DayColumn, SlotCell, SlotKey, SlotState};
pub use store::{MemoryStore, RemoteStore, Snapshot, StoreError};
