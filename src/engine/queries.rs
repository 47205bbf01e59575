use std::collections::HashMap;
use std::sync::atomic::Ordering;

use chrono::{NaiveDate, NaiveTime};

use crate::model::*;

use super::slots::{end_time, span_keys, time_slots, week_days};
use super::Scheduler;

impl Scheduler {
    /// Slot the next commit targets, if any.
    pub async fn selection(&self) -> Option<SlotKey> {
        *self.selection.read().await
    }

    /// Appointment snapshot the selection is editing, if any.
    pub async fn editing(&self) -> Option<(SlotKey, Appointment)> {
        self.editing.read().await.clone()
    }

    pub async fn appointment(&self, key: &SlotKey) -> Option<Appointment> {
        self.state.read().await.appointments.get(key).cloned()
    }

    /// Every appointment, ordered by start slot.
    pub async fn appointments(&self) -> Vec<(SlotKey, Appointment)> {
        let state = self.state.read().await;
        let mut out: Vec<(SlotKey, Appointment)> = state
            .appointments
            .iter()
            .map(|(key, appt)| (*key, appt.clone()))
            .collect();
        out.sort_by_key(|(key, _)| *key);
        out
    }

    /// Days currently flagged off, sorted.
    pub async fn day_offs(&self) -> Vec<NaiveDate> {
        let mut out: Vec<NaiveDate> = self.state.read().await.day_offs.iter().copied().collect();
        out.sort();
        out
    }

    pub async fn is_day_off(&self, date: NaiveDate) -> bool {
        self.state.read().await.day_offs.contains(&date)
    }

    /// True while the sync loop cannot follow the store: the subscription was
    /// refused, or a lagged change stream is being re-read.
    pub fn is_reconnecting(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    /// The week containing `reference`, as seven columns of resolved cells,
    /// all read under one guard.
    pub async fn week_grid(&self, reference: NaiveDate) -> Vec<DayColumn> {
        let times: Vec<NaiveTime> = time_slots();
        let state = self.state.read().await;

        // Expand every span once; cells then resolve by direct lookup.
        let mut covered: HashMap<SlotKey, SlotKey> = HashMap::new();
        for (start, appointment) in &state.appointments {
            let Some(span) = span_keys(*start, appointment.duration) else {
                continue;
            };
            for cell in span.into_iter().skip(1) {
                covered.insert(cell, *start);
            }
        }

        week_days(reference)
            .into_iter()
            .map(|date| {
                let day_off = state.day_offs.contains(&date);
                let slots = times
                    .iter()
                    .map(|&time| {
                        let key = SlotKey::new(date, time);
                        let cell_state = if let Some(appointment) = state.appointments.get(&key) {
                            let appointment = appointment.clone();
                            let end = end_time(time, appointment.duration);
                            SlotState::Booked {
                                appointment,
                                end_time: end,
                            }
                        } else if let Some(start) = covered.get(&key) {
                            SlotState::Covered { start: *start }
                        } else {
                            SlotState::Free
                        };
                        SlotCell {
                            key,
                            time,
                            state: cell_state,
                        }
                    })
                    .collect();
                DayColumn {
                    date,
                    day_off,
                    slots,
                }
            })
            .collect()
    }
}
