use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::limits::SLOT_MINUTES;

/// Day-key wire format: `"{year}-{month}-{day}"`, unpadded, 1-based month.
/// Must round-trip through `parse_day_key`; it is the store's membership key
/// for day-offs and the prefix of every slot key.
pub fn day_key(date: NaiveDate) -> String {
    format!("{}-{}-{}", date.year(), date.month(), date.day())
}

/// Parse a day key back into a date. Accepts exactly the `day_key` format.
pub fn parse_day_key(s: &str) -> Option<NaiveDate> {
    let mut parts = s.splitn(3, '-');
    let year: i32 = parts.next()?.parse().ok()?;
    let month: u32 = parts.next()?.parse().ok()?;
    let day: u32 = parts.next()?.parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Error for a slot-key string that does not match the wire format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseKeyError(pub String);

impl std::fmt::Display for ParseKeyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "malformed slot key: {}", self.0)
    }
}

impl std::error::Error for ParseKeyError {}

/// Addresses one 30-minute cell: calendar date + time-of-day.
///
/// String form is `day_key(date)` + `-` + `HH:MM` and doubles as the store's
/// object key, so serde goes through the string conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SlotKey {
    pub date: NaiveDate,
    pub time: NaiveTime,
}

impl SlotKey {
    pub fn new(date: NaiveDate, time: NaiveTime) -> Self {
        Self { date, time }
    }
}

impl std::fmt::Display for SlotKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}-{:02}:{:02}",
            day_key(self.date),
            self.time.hour(),
            self.time.minute()
        )
    }
}

impl std::str::FromStr for SlotKey {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseKeyError(s.to_string());
        let (day_part, time_part) = s.rsplit_once('-').ok_or_else(err)?;
        let time = NaiveTime::parse_from_str(time_part, "%H:%M").map_err(|_| err())?;
        if time.minute() % SLOT_MINUTES != 0 {
            return Err(err());
        }
        let date = parse_day_key(day_part).ok_or_else(err)?;
        Ok(Self { date, time })
    }
}

impl TryFrom<String> for SlotKey {
    type Error = ParseKeyError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<SlotKey> for String {
    fn from(key: SlotKey) -> Self {
        key.to_string()
    }
}

/// A booked visit. Recorded under its start slot key only; the further slots
/// covered by `duration` are derived by lookahead, never separate entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub doctor: String,
    pub patient: String,
    /// Minutes, a positive multiple of 30.
    pub duration: u32,
    #[serde(default)]
    pub confirmed: bool,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl Appointment {
    /// Number of 30-minute slots this appointment covers.
    pub fn slots(&self) -> u32 {
        self.duration / SLOT_MINUTES
    }
}

/// Form payload for creating or replacing an appointment. Carries no
/// completion field: a commit always lands with `completed = false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentDraft {
    pub doctor: String,
    pub patient: String,
    pub duration: u32,
    #[serde(default)]
    pub confirmed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl AppointmentDraft {
    pub fn into_appointment(self) -> Appointment {
        Appointment {
            doctor: self.doctor,
            patient: self.patient,
            duration: self.duration,
            confirmed: self.confirmed,
            completed: false,
            comment: self.comment,
        }
    }
}

/// Render state of one grid cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SlotState {
    /// Nothing booked; the cell is selectable.
    Free,
    /// An appointment starts here.
    Booked {
        appointment: Appointment,
        /// Timeline end of the span, for display.
        end_time: NaiveTime,
    },
    /// Inside the span of an appointment starting earlier in the day.
    Covered { start: SlotKey },
}

/// One cell of the weekly grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotCell {
    pub key: SlotKey,
    pub time: NaiveTime,
    pub state: SlotState,
}

/// One rendered day: its date, the day-off flag, and the day's cells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayColumn {
    pub date: NaiveDate,
    pub day_off: bool,
    pub slots: Vec<SlotCell>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn day_key_is_unpadded() {
        assert_eq!(day_key(date(2024, 5, 3)), "2024-5-3");
        assert_eq!(day_key(date(2024, 12, 31)), "2024-12-31");
    }

    #[test]
    fn day_key_roundtrip() {
        let d = date(2025, 1, 7);
        assert_eq!(parse_day_key(&day_key(d)), Some(d));
    }

    #[test]
    fn parse_day_key_rejects_garbage() {
        assert_eq!(parse_day_key("2024-13-1"), None); // no 13th month
        assert_eq!(parse_day_key("2024-5"), None);
        assert_eq!(parse_day_key("soon"), None);
    }

    #[test]
    fn slot_key_display_matches_wire_format() {
        let key = SlotKey::new(date(2024, 5, 3), time(8, 0));
        assert_eq!(key.to_string(), "2024-5-3-08:00");
    }

    #[test]
    fn slot_key_roundtrip() {
        let key = SlotKey::new(date(2024, 11, 25), time(22, 30));
        let parsed: SlotKey = key.to_string().parse().unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn slot_key_rejects_unaligned_minute() {
        assert!("2024-5-3-10:15".parse::<SlotKey>().is_err());
    }

    #[test]
    fn slot_key_rejects_missing_time() {
        assert!("2024-5-3".parse::<SlotKey>().is_err());
    }

    #[test]
    fn slot_key_serde_as_string() {
        let key = SlotKey::new(date(2024, 5, 3), time(10, 30));
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"2024-5-3-10:30\"");
        let back: SlotKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }

    #[test]
    fn appointment_tolerates_missing_fields() {
        let raw = r#"{"doctor":"Ivanova","patient":"Petrov","duration":60}"#;
        let appt: Appointment = serde_json::from_str(raw).unwrap();
        assert!(!appt.confirmed);
        assert!(!appt.completed);
        assert_eq!(appt.comment, None);
        assert_eq!(appt.slots(), 2);
    }

    #[test]
    fn draft_never_lands_completed() {
        let draft = AppointmentDraft {
            doctor: "Ivanova".into(),
            patient: "Petrov".into(),
            duration: 90,
            confirmed: true,
            comment: Some("first visit".into()),
        };
        let appt = draft.into_appointment();
        assert!(appt.confirmed);
        assert!(!appt.completed);
    }
}
