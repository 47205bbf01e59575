use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;

use crate::model::*;

use super::slots::span_keys;
use super::ScheduleError;

/// Field-level checks on a draft, before any occupancy is consulted.
pub(crate) fn validate_draft(draft: &AppointmentDraft) -> Result<(), ScheduleError> {
    use crate::limits::*;
    if draft.doctor.trim().is_empty() {
        return Err(ScheduleError::InvalidDraft("doctor must not be empty"));
    }
    if draft.doctor.len() > MAX_DOCTOR_LEN {
        return Err(ScheduleError::InvalidDraft("doctor name too long"));
    }
    if draft.patient.trim().is_empty() {
        return Err(ScheduleError::InvalidDraft("patient must not be empty"));
    }
    if draft.patient.len() > MAX_PATIENT_LEN {
        return Err(ScheduleError::InvalidDraft("patient name too long"));
    }
    if draft.duration == 0 || draft.duration % SLOT_MINUTES != 0 {
        return Err(ScheduleError::InvalidDraft(
            "duration must be a positive multiple of the slot length",
        ));
    }
    if draft.duration > MAX_DURATION_MINUTES {
        return Err(ScheduleError::InvalidDraft("duration exceeds the bookable day"));
    }
    if let Some(comment) = &draft.comment {
        if comment.len() > MAX_COMMENT_LEN {
            return Err(ScheduleError::InvalidDraft("comment too long"));
        }
    }
    Ok(())
}

/// Check that a span of `duration` minutes starting at `key` can be booked.
///
/// `excluding` names a start key whose recorded appointment is ignored, so an
/// edit does not collide with the span it is replacing.
pub(crate) fn ensure_bookable(
    appointments: &HashMap<SlotKey, Appointment>,
    day_offs: &HashSet<NaiveDate>,
    key: SlotKey,
    duration: u32,
    excluding: Option<SlotKey>,
) -> Result<(), ScheduleError> {
    if day_offs.contains(&key.date) {
        return Err(ScheduleError::DayOffBlocked(key.date));
    }
    let wanted = span_keys(key, duration).ok_or(ScheduleError::InsufficientSpace(key))?;

    // Expand the recorded appointments into the slots they cover, so a booking
    // that starts on a covered slot is caught, not just an exact key clash.
    // Spans never leave their day; only same-day entries can collide.
    let mut occupied: HashSet<SlotKey> = HashSet::new();
    for (start, appointment) in appointments
        .iter()
        .filter(|(start, _)| start.date == key.date)
    {
        if excluding == Some(*start) {
            continue;
        }
        match span_keys(*start, appointment.duration) {
            Some(span) => occupied.extend(span),
            // A foreign writer can sync a span we would not accept ourselves;
            // still block at least its start slot.
            None => {
                occupied.insert(*start);
            }
        }
    }

    for slot in wanted {
        if occupied.contains(&slot) {
            return Err(ScheduleError::Overlap(slot));
        }
    }
    Ok(())
}
