mod conflict;
mod error;
mod mutations;
mod queries;
pub mod slots;

pub use error::ScheduleError;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde_json::Value;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;

use crate::limits::SYNC_RETRY_MS;
use crate::model::*;
use crate::notify::RenderHub;
use crate::store::{RemoteStore, Snapshot, StoreError};

// ── Store document paths ─────────────────────────────

/// Top-level document holding every appointment, keyed by slot-key string.
pub const APPOINTMENTS_PATH: &str = "appointments";

/// Top-level document holding the day-off flags as an array of day keys.
pub const DAY_OFFS_PATH: &str = "dayOffs";

pub(super) fn appointment_path(key: SlotKey) -> String {
    format!("{APPOINTMENTS_PATH}/{key}")
}

// ── Wire parsing ─────────────────────────────

/// Decode the appointments document. Entries that fail to parse are skipped
/// with a warning so one bad record cannot take down the whole schedule.
fn parse_appointments(doc: Option<&Value>) -> HashMap<SlotKey, Appointment> {
    let mut out = HashMap::new();
    let Some(Value::Object(map)) = doc else {
        return out;
    };
    for (raw_key, raw_value) in map {
        let Ok(key) = raw_key.parse::<SlotKey>() else {
            tracing::warn!(key = %raw_key, "skipping appointment under malformed key");
            continue;
        };
        match serde_json::from_value::<Appointment>(raw_value.clone()) {
            Ok(appt) => {
                out.insert(key, appt);
            }
            Err(err) => {
                tracing::warn!(key = %raw_key, %err, "skipping undecodable appointment");
            }
        }
    }
    out
}

/// Decode the day-off document: an array of day-key strings.
fn parse_day_offs(doc: Option<&Value>) -> HashSet<NaiveDate> {
    let mut out = HashSet::new();
    let Some(Value::Array(items)) = doc else {
        return out;
    };
    for item in items {
        match item.as_str().and_then(parse_day_key) {
            Some(date) => {
                out.insert(date);
            }
            None => tracing::warn!(?item, "skipping malformed day-off entry"),
        }
    }
    out
}

/// The two store documents as local collections, each tagged with the store
/// revision it was last reconciled at. One lock guards the whole grid:
/// mutations hold it in write mode across the conflict check and the local
/// apply, reconciles across the wholesale swap.
#[derive(Default)]
struct GridState {
    appointments: HashMap<SlotKey, Appointment>,
    day_offs: HashSet<NaiveDate>,
    /// Revision `appointments` was last reconciled at.
    appointments_seq: u64,
    /// Revision `day_offs` was last reconciled at.
    day_offs_seq: u64,
}

/// Current sizes of both collections, exported as gauges.
fn update_state_gauges(state: &GridState) {
    metrics::gauge!(crate::observability::APPOINTMENTS_BOOKED)
        .set(state.appointments.len() as f64);
    metrics::gauge!(crate::observability::DAYS_OFF).set(state.day_offs.len() as f64);
}

/// Wire form of the day-off set: a sorted array of day keys.
fn day_offs_value(state: &GridState) -> Value {
    let mut days: Vec<NaiveDate> = state.day_offs.iter().copied().collect();
    days.sort();
    Value::Array(days.into_iter().map(|d| Value::String(day_key(d))).collect())
}

/// Weekly appointment schedule, kept in lockstep with a remote document store.
///
/// Mutations are optimistic: local state changes first, the corresponding
/// store write follows, and a failed write rolls the local change back. The
/// store's own change streams feed [`Scheduler::run_sync`], which replaces
/// each document's collection whenever a fresher snapshot of it arrives.
///
/// Lock order wherever several are held: selection, then editing, then state.
pub struct Scheduler {
    /// Grid collections plus per-document revisions, behind one lock.
    state: RwLock<GridState>,
    /// Slot the next commit targets, if any.
    pub(super) selection: RwLock<Option<SlotKey>>,
    /// Appointment found under the selection at select time. Present means
    /// the next commit replaces that span instead of creating a new one.
    pub(super) editing: RwLock<Option<(SlotKey, Appointment)>>,
    /// Set while the sync loop cannot follow the store.
    degraded: AtomicBool,
    pub(super) store: Arc<dyn RemoteStore>,
    pub(super) render: RenderHub,
}

impl Scheduler {
    /// A scheduler starts empty; call [`Scheduler::load`] to prime it and
    /// [`Scheduler::spawn_sync`] to keep it following the store.
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self {
            state: RwLock::new(GridState::default()),
            selection: RwLock::new(None),
            editing: RwLock::new(None),
            degraded: AtomicBool::new(false),
            store,
            render: RenderHub::new(),
        }
    }

    /// Debounced change ticks for render layers. One tick per quiet window.
    pub fn render_ticks(&self) -> broadcast::Receiver<()> {
        self.render.subscribe()
    }

    /// Prime local state from the store.
    pub async fn load(&self) -> Result<(), ScheduleError> {
        let (apps, offs) = self
            .read_both()
            .await
            .map_err(|e| ScheduleError::StoreReadFailed(e.to_string()))?;
        self.reconcile_appointments(parse_appointments(apps.value.as_ref()), apps.seq)
            .await;
        self.reconcile_day_offs(parse_day_offs(offs.value.as_ref()), offs.seq)
            .await;
        Ok(())
    }

    async fn read_both(&self) -> Result<(Snapshot, Snapshot), StoreError> {
        let apps = self.store.read(APPOINTMENTS_PATH).await?;
        let offs = self.store.read(DAY_OFFS_PATH).await?;
        Ok((apps, offs))
    }

    /// Replace local state wholesale from a snapshot pair read at revision
    /// `seq`. Each document keeps its own last-applied revision, so only the
    /// documents that have not seen `seq` yet are swapped. Returns whether
    /// anything was applied.
    async fn reconcile(
        &self,
        appointments: HashMap<SlotKey, Appointment>,
        day_offs: HashSet<NaiveDate>,
        seq: u64,
    ) -> bool {
        let mut state = self.state.write().await;
        let mut applied = false;
        if seq > state.appointments_seq {
            state.appointments = appointments;
            state.appointments_seq = seq;
            applied = true;
        }
        if seq > state.day_offs_seq {
            state.day_offs = day_offs;
            state.day_offs_seq = seq;
            applied = true;
        }
        self.note_reconcile(&state, applied)
    }

    /// Swap in the appointments document pushed at revision `seq`. A push is
    /// skipped only when this document has already seen that revision, so a
    /// push on one document can never stale out the other.
    async fn reconcile_appointments(
        &self,
        appointments: HashMap<SlotKey, Appointment>,
        seq: u64,
    ) -> bool {
        let mut state = self.state.write().await;
        let applied = seq > state.appointments_seq;
        if applied {
            state.appointments = appointments;
            state.appointments_seq = seq;
        }
        self.note_reconcile(&state, applied)
    }

    /// Swap in the day-off document pushed at revision `seq`.
    async fn reconcile_day_offs(&self, day_offs: HashSet<NaiveDate>, seq: u64) -> bool {
        let mut state = self.state.write().await;
        let applied = seq > state.day_offs_seq;
        if applied {
            state.day_offs = day_offs;
            state.day_offs_seq = seq;
        }
        self.note_reconcile(&state, applied)
    }

    fn note_reconcile(&self, state: &GridState, applied: bool) -> bool {
        if applied {
            metrics::counter!(crate::observability::RECONCILES_APPLIED_TOTAL).increment(1);
            update_state_gauges(state);
            self.render.mark_dirty();
        } else {
            metrics::counter!(crate::observability::RECONCILES_STALE_TOTAL).increment(1);
        }
        applied
    }

    /// Follow the store's change streams until they close.
    /// 1. Subscribe to both documents, retrying while the store refuses, and
    ///    apply the initial snapshots.
    /// 2. On every push, re-parse that document and swap it in.
    /// 3. On lag, flag degraded and recover with full re-reads.
    pub async fn run_sync(self: Arc<Self>) {
        let (apps, mut app_rx, offs, mut off_rx) = self.subscribe_both().await;
        self.reconcile_appointments(parse_appointments(apps.value.as_ref()), apps.seq)
            .await;
        self.reconcile_day_offs(parse_day_offs(offs.value.as_ref()), offs.seq)
            .await;
        self.set_degraded(false);

        loop {
            tokio::select! {
                push = app_rx.recv() => match push {
                    Ok(snap) => {
                        self.reconcile_appointments(parse_appointments(snap.value.as_ref()), snap.seq)
                            .await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "appointments stream lagged; resyncing");
                        self.resync().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                push = off_rx.recv() => match push {
                    Ok(snap) => {
                        self.reconcile_day_offs(parse_day_offs(snap.value.as_ref()), snap.seq)
                            .await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "day-off stream lagged; resyncing");
                        self.resync().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        tracing::info!("store sync loop stopped");
    }

    /// Spawn [`Scheduler::run_sync`] on the runtime.
    pub fn spawn_sync(self: &Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(Arc::clone(self).run_sync())
    }

    /// Subscribe to both documents. A refusal flags the link degraded and
    /// the attempt repeats after a pause.
    async fn subscribe_both(
        &self,
    ) -> (
        Snapshot,
        broadcast::Receiver<Snapshot>,
        Snapshot,
        broadcast::Receiver<Snapshot>,
    ) {
        loop {
            match self.try_subscribe_both().await {
                Ok(subs) => return subs,
                Err(err) => {
                    tracing::error!(%err, "store subscription failed; retrying");
                    self.set_degraded(true);
                    tokio::time::sleep(Duration::from_millis(SYNC_RETRY_MS)).await;
                }
            }
        }
    }

    async fn try_subscribe_both(
        &self,
    ) -> Result<
        (
            Snapshot,
            broadcast::Receiver<Snapshot>,
            Snapshot,
            broadcast::Receiver<Snapshot>,
        ),
        StoreError,
    > {
        let (apps, app_rx) = self.store.subscribe(APPOINTMENTS_PATH).await?;
        let (offs, off_rx) = self.store.subscribe(DAY_OFFS_PATH).await?;
        Ok((apps, app_rx, offs, off_rx))
    }

    /// Full re-read after a lagged stream. The degraded flag stays up until
    /// the re-read lands; on failure local state is kept as-is.
    async fn resync(&self) {
        self.set_degraded(true);
        match self.read_both().await {
            Ok((apps, offs)) => {
                self.reconcile_appointments(parse_appointments(apps.value.as_ref()), apps.seq)
                    .await;
                self.reconcile_day_offs(parse_day_offs(offs.value.as_ref()), offs.seq)
                    .await;
                self.set_degraded(false);
            }
            Err(err) => {
                tracing::error!(%err, "resync read failed; keeping stale schedule");
            }
        }
    }

    fn set_degraded(&self, on: bool) {
        self.degraded.store(on, Ordering::Relaxed);
        metrics::gauge!(crate::observability::SYNC_DEGRADED).set(if on { 1.0 } else { 0.0 });
    }
}
