use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Timelike};

use crate::limits::{DAY_START_HOUR, SLOT_MINUTES, SLOTS_PER_DAY};
use crate::model::SlotKey;

// ── Week math ─────────────────────────────────────────────────────

/// Monday of the week containing `reference`. Monday-anchored regardless of
/// locale, and idempotent: `week_start(week_start(d)) == week_start(d)`.
pub fn week_start(reference: NaiveDate) -> NaiveDate {
    let back = reference.weekday().num_days_from_monday() as i64;
    reference - Duration::days(back)
}

/// The seven dates of the week containing `reference`, Monday first.
pub fn week_days(reference: NaiveDate) -> Vec<NaiveDate> {
    let start = week_start(reference);
    (0..7).map(|i| start + Duration::days(i)).collect()
}

/// Week navigation: the Monday `weeks` weeks away from the week containing
/// `anchor`. Negative values go backwards.
pub fn shift_weeks(anchor: NaiveDate, weeks: i64) -> NaiveDate {
    week_start(anchor) + Duration::days(7 * weeks)
}

// ── Slot grid ─────────────────────────────────────────────────────

/// Index of `time` in the day's grid (0-based), or None when off-grid:
/// unaligned minutes, before 08:00, or past the last slot.
pub fn slot_index(time: NaiveTime) -> Option<usize> {
    if time.second() != 0 || time.minute() % SLOT_MINUTES != 0 {
        return None;
    }
    let minutes = time.hour() * 60 + time.minute();
    let start = DAY_START_HOUR * 60;
    if minutes < start {
        return None;
    }
    let idx = ((minutes - start) / SLOT_MINUTES) as usize;
    (idx < SLOTS_PER_DAY).then_some(idx)
}

/// Time of the grid slot at `index`, or None past the end of the day.
pub fn slot_time(index: usize) -> Option<NaiveTime> {
    if index >= SLOTS_PER_DAY {
        return None;
    }
    let minutes = DAY_START_HOUR * 60 + index as u32 * SLOT_MINUTES;
    NaiveTime::from_hms_opt(minutes / 60, minutes % 60, 0)
}

/// The day's bookable times: 08:00 through 22:30 inclusive, 30-minute steps,
/// exactly `SLOTS_PER_DAY` entries. Pure; recomputed on every call.
pub fn time_slots() -> Vec<NaiveTime> {
    (0..SLOTS_PER_DAY).filter_map(slot_time).collect()
}

/// Display helper: start + duration with minute overflow carried into hours.
/// Carries past midnight by wrapping; spans that would cross midnight are
/// rejected during validation and never reach rendering.
pub fn end_time(start: NaiveTime, duration_minutes: u32) -> NaiveTime {
    start
        .overflowing_add_signed(Duration::minutes(duration_minutes as i64))
        .0
}

/// The start key followed by `duration/30 - 1` consecutive successors at
/// 30-minute steps within the same day. None when the duration is zero, the
/// start is off-grid, or the span would run past the day's last slot.
pub fn span_keys(start: SlotKey, duration_minutes: u32) -> Option<Vec<SlotKey>> {
    let needed = (duration_minutes / SLOT_MINUTES) as usize;
    if needed == 0 {
        return None;
    }
    let first = slot_index(start.time)?;
    if first + needed > SLOTS_PER_DAY {
        return None;
    }
    (first..first + needed)
        .map(|i| slot_time(i).map(|t| SlotKey::new(start.date, t)))
        .collect()
}
