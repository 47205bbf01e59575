//! Hard limits and grid constants. Everything that bounds user input or
//! shapes the slot grid lives here so the numbers are in one place.

/// Slot granularity in minutes. Durations must be positive multiples of this.
pub const SLOT_MINUTES: u32 = 30;

/// Hour of the first bookable slot (08:00).
pub const DAY_START_HOUR: u32 = 8;

/// Slots generated per day: 08:00 through 22:30 inclusive.
pub const SLOTS_PER_DAY: usize = 30;

/// Longest bookable appointment; a span can never leave its day.
pub const MAX_DURATION_MINUTES: u32 = SLOT_MINUTES * SLOTS_PER_DAY as u32;

/// Caps on free-text draft fields.
pub const MAX_DOCTOR_LEN: usize = 128;
pub const MAX_PATIENT_LEN: usize = 128;
pub const MAX_COMMENT_LEN: usize = 1024;

/// Trailing-edge delay for render change ticks.
pub const RENDER_DEBOUNCE_MS: u64 = 100;

/// Pause between subscription attempts while the store refuses them.
pub const SYNC_RETRY_MS: u64 = 500;
