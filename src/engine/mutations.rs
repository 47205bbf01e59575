use std::time::Instant;

use chrono::NaiveDate;
use futures::future::try_join_all;
use serde_json::{Map, Value};

use crate::model::*;

use super::conflict::{ensure_bookable, validate_draft};
use super::{
    appointment_path, day_offs_value, update_state_gauges, ScheduleError, Scheduler, DAY_OFFS_PATH,
};

fn observe_op<T>(op: &'static str, started: Instant, result: &Result<T, ScheduleError>) {
    let status = if result.is_ok() { "ok" } else { "err" };
    metrics::counter!(crate::observability::OPS_TOTAL, "op" => op, "status" => status)
        .increment(1);
    metrics::histogram!(crate::observability::OP_DURATION_SECONDS, "op" => op)
        .record(started.elapsed().as_secs_f64());
    if let Err(err) = result {
        metrics::counter!(
            crate::observability::REJECTIONS_TOTAL,
            "op" => op,
            "reason" => crate::observability::error_label(err)
        )
        .increment(1);
    }
}

impl Scheduler {
    /// Select `key` as the target of the next commit. Returns the appointment
    /// already recorded there, if any; the commit then replaces that span.
    ///
    /// Selecting a slot on a day off fails and leaves any prior selection
    /// untouched.
    pub async fn select_slot(&self, key: SlotKey) -> Result<Option<Appointment>, ScheduleError> {
        let started = Instant::now();
        let result = async {
            let mut selection = self.selection.write().await;
            let mut editing = self.editing.write().await;
            let state = self.state.read().await;
            if state.day_offs.contains(&key.date) {
                return Err(ScheduleError::DayOffBlocked(key.date));
            }
            let existing = state.appointments.get(&key).cloned();
            *selection = Some(key);
            *editing = existing.clone().map(|appt| (key, appt));
            Ok(existing)
        }
        .await;
        observe_op("select_slot", started, &result);
        result
    }

    pub async fn clear_selection(&self) {
        *self.selection.write().await = None;
        *self.editing.write().await = None;
    }

    /// Run every commit-time check against the selected slot without writing.
    pub async fn validate_booking(&self, draft: &AppointmentDraft) -> Result<(), ScheduleError> {
        let Some(key) = *self.selection.read().await else {
            return Err(ScheduleError::NoSelection);
        };
        validate_draft(draft)?;
        let excluding = self.editing.read().await.as_ref().map(|(k, _)| *k);
        let state = self.state.read().await;
        ensure_bookable(&state.appointments, &state.day_offs, key, draft.duration, excluding)
    }

    /// Book the draft at the selected slot: validate, apply locally, then
    /// write through. A failed store write rolls the local change back and
    /// keeps the selection so the caller can retry.
    pub async fn commit_booking(&self, draft: AppointmentDraft) -> Result<SlotKey, ScheduleError> {
        let started = Instant::now();
        let result = async {
            let Some(key) = *self.selection.read().await else {
                return Err(ScheduleError::NoSelection);
            };
            validate_draft(&draft)?;
            let excluding = self.editing.read().await.as_ref().map(|(k, _)| *k);
            let duration = draft.duration;
            let appt = draft.into_appointment();
            let value = serde_json::to_value(&appt).expect("appointment serializes to JSON");

            // Conflict check and insert stay under one write guard; a sync
            // swap cannot land between them.
            let mut state = self.state.write().await;
            ensure_bookable(&state.appointments, &state.day_offs, key, duration, excluding)?;
            let prev = state.appointments.insert(key, appt);
            update_state_gauges(&state);
            drop(state);

            match self.store.write(&appointment_path(key), value).await {
                Ok(()) => {
                    *self.selection.write().await = None;
                    *self.editing.write().await = None;
                    self.render.mark_dirty();
                    Ok(key)
                }
                Err(err) => {
                    let mut state = self.state.write().await;
                    match prev {
                        Some(prev) => {
                            state.appointments.insert(key, prev);
                        }
                        None => {
                            state.appointments.remove(&key);
                        }
                    }
                    update_state_gauges(&state);
                    drop(state);
                    metrics::counter!(crate::observability::STORE_ROLLBACKS_TOTAL).increment(1);
                    tracing::warn!(%key, %err, "store write failed; booking rolled back");
                    Err(ScheduleError::StoreWriteFailed(err.to_string()))
                }
            }
        }
        .await;
        observe_op("commit_booking", started, &result);
        result
    }

    /// Remove the appointment starting at `key`. The store delete is
    /// best-effort: local removal stands even if the write fails, and the next
    /// snapshot settles any disagreement.
    pub async fn delete_appointment(&self, key: SlotKey) -> Result<Appointment, ScheduleError> {
        let started = Instant::now();
        let result = async {
            let mut selection = self.selection.write().await;
            let mut editing = self.editing.write().await;
            let mut state = self.state.write().await;
            let Some(appt) = state.appointments.remove(&key) else {
                return Err(ScheduleError::NotFound(key));
            };
            if *selection == Some(key) {
                *selection = None;
            }
            if editing.as_ref().is_some_and(|(k, _)| *k == key) {
                *editing = None;
            }
            update_state_gauges(&state);
            drop(state);
            drop(editing);
            drop(selection);

            if let Err(err) = self.store.delete(&appointment_path(key)).await {
                tracing::warn!(%key, %err, "store delete failed; next snapshot settles it");
            }
            self.render.mark_dirty();
            Ok(appt)
        }
        .await;
        observe_op("delete_appointment", started, &result);
        result
    }

    /// Flag or unflag a whole day. Flagging cascades: every appointment on the
    /// day is deleted, and the removed start keys are returned. Unflagging
    /// never restores them.
    pub async fn set_day_off(&self, date: NaiveDate, on: bool) -> Result<Vec<SlotKey>, ScheduleError> {
        let started = Instant::now();
        let result = if on {
            self.mark_day_off(date).await
        } else {
            self.unmark_day_off(date).await
        };
        observe_op("set_day_off", started, &result);
        result
    }

    async fn mark_day_off(&self, date: NaiveDate) -> Result<Vec<SlotKey>, ScheduleError> {
        // Local first: flag the day and drop its appointments, all under one
        // guard so the cascade sees a settled table.
        let mut state = self.state.write().await;
        if state.day_offs.contains(&date) {
            return Ok(Vec::new());
        }
        let removed: Vec<(SlotKey, Appointment)> = state
            .appointments
            .iter()
            .filter(|(key, _)| key.date == date)
            .map(|(key, appt)| (*key, appt.clone()))
            .collect();
        state.day_offs.insert(date);
        for (key, _) in &removed {
            state.appointments.remove(key);
        }
        let flags = day_offs_value(&state);
        update_state_gauges(&state);
        drop(state);

        // Write-through: every appointment doc, then the flag array.
        let paths: Vec<String> = removed.iter().map(|(key, _)| appointment_path(*key)).collect();
        let deletes = paths.iter().map(|path| self.store.delete(path));
        let written = match try_join_all(deletes).await {
            Ok(_) => self.store.write(DAY_OFFS_PATH, flags).await,
            Err(err) => Err(err),
        };

        if let Err(err) = written {
            // Full rollback: restore the flag state and the local schedule,
            // then re-write any docs the partial cascade may have deleted.
            let mut state = self.state.write().await;
            state.day_offs.remove(&date);
            for (key, appt) in &removed {
                state.appointments.insert(*key, appt.clone());
            }
            update_state_gauges(&state);
            drop(state);
            for (key, appt) in &removed {
                let value = serde_json::to_value(appt).expect("appointment serializes to JSON");
                if let Err(rewrite_err) = self.store.write(&appointment_path(*key), value).await {
                    tracing::warn!(%key, %rewrite_err, "compensating re-write failed");
                }
            }
            metrics::counter!(crate::observability::STORE_ROLLBACKS_TOTAL).increment(1);
            tracing::warn!(%date, %err, "day-off cascade failed; rolled back");
            return Err(ScheduleError::StoreWriteFailed(err.to_string()));
        }

        metrics::counter!(crate::observability::CASCADE_DELETES_TOTAL)
            .increment(removed.len() as u64);
        self.render.mark_dirty();
        Ok(removed.into_iter().map(|(key, _)| key).collect())
    }

    async fn unmark_day_off(&self, date: NaiveDate) -> Result<Vec<SlotKey>, ScheduleError> {
        let mut state = self.state.write().await;
        if !state.day_offs.contains(&date) {
            return Ok(Vec::new());
        }
        state.day_offs.remove(&date);
        let flags = day_offs_value(&state);
        update_state_gauges(&state);
        drop(state);

        if let Err(err) = self.store.write(DAY_OFFS_PATH, flags).await {
            let mut state = self.state.write().await;
            state.day_offs.insert(date);
            update_state_gauges(&state);
            metrics::counter!(crate::observability::STORE_ROLLBACKS_TOTAL).increment(1);
            return Err(ScheduleError::StoreWriteFailed(err.to_string()));
        }
        self.render.mark_dirty();
        Ok(Vec::new())
    }

    /// Flip the confirmation flag. Un-confirming a completed appointment is
    /// refused; un-confirming otherwise also clears completion, in the same
    /// store update, since completion implies confirmation.
    pub async fn set_confirmed(&self, key: SlotKey, value: bool) -> Result<(), ScheduleError> {
        let started = Instant::now();
        let result = async {
            let mut state = self.state.write().await;
            let Some(entry) = state.appointments.get_mut(&key) else {
                return Err(ScheduleError::NotFound(key));
            };
            if !value && entry.completed {
                return Err(ScheduleError::CompletedLocked(key));
            }
            let prev = entry.clone();
            entry.confirmed = value;
            let mut fields = Map::new();
            fields.insert("confirmed".into(), Value::Bool(value));
            if !value {
                entry.completed = false;
                fields.insert("completed".into(), Value::Bool(false));
            }
            // Release the lock before awaiting.
            drop(state);

            if let Err(err) = self.store.update(&appointment_path(key), fields).await {
                self.state.write().await.appointments.insert(key, prev);
                metrics::counter!(crate::observability::STORE_ROLLBACKS_TOTAL).increment(1);
                return Err(ScheduleError::StoreWriteFailed(err.to_string()));
            }
            self.render.mark_dirty();
            Ok(())
        }
        .await;
        observe_op("set_confirmed", started, &result);
        result
    }

    /// Mark or clear completion. Requires the appointment to be confirmed.
    pub async fn set_completion(&self, key: SlotKey, value: bool) -> Result<(), ScheduleError> {
        let started = Instant::now();
        let result = async {
            let mut state = self.state.write().await;
            let Some(entry) = state.appointments.get_mut(&key) else {
                return Err(ScheduleError::NotFound(key));
            };
            if !entry.confirmed {
                return Err(ScheduleError::NotConfirmed(key));
            }
            let prev = entry.clone();
            entry.completed = value;
            drop(state);

            let mut fields = Map::new();
            fields.insert("completed".into(), Value::Bool(value));
            if let Err(err) = self.store.update(&appointment_path(key), fields).await {
                self.state.write().await.appointments.insert(key, prev);
                metrics::counter!(crate::observability::STORE_ROLLBACKS_TOTAL).increment(1);
                return Err(ScheduleError::StoreWriteFailed(err.to_string()));
            }
            self.render.mark_dirty();
            Ok(())
        }
        .await;
        observe_op("set_completion", started, &result);
        result
    }
}
