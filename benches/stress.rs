use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Days, NaiveDate, NaiveTime};

use slotgrid::{AppointmentDraft, MemoryStore, Scheduler, SlotKey};

fn base_monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, 13).unwrap()
}

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies.last().unwrap().as_secs_f64() * 1000.0,
    );
}

fn slot_at(day: NaiveDate, index: usize) -> SlotKey {
    let hour = 8 + (index as u32) / 2;
    let minute = ((index as u32) % 2) * 30;
    SlotKey::new(day, NaiveTime::from_hms_opt(hour, minute, 0).unwrap())
}

/// The i-th bookable slot of a rolling grid starting at `start`, 30 per day.
fn nth_slot(start: NaiveDate, i: usize) -> SlotKey {
    let day = start.checked_add_days(Days::new((i / 30) as u64)).unwrap();
    slot_at(day, i % 30)
}

fn draft(i: usize) -> AppointmentDraft {
    AppointmentDraft {
        doctor: format!("doctor-{}", i % 7),
        patient: format!("patient-{i}"),
        duration: 30,
        confirmed: false,
        comment: None,
    }
}

async fn phase1_sequential() {
    let scheduler = Scheduler::new(Arc::new(MemoryStore::new()));
    let n = 2000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    for i in 0..n {
        let key = nth_slot(base_monday(), i);
        let t = Instant::now();
        scheduler.select_slot(key).await.unwrap();
        scheduler.commit_booking(draft(i)).await.unwrap();
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} bookings in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("booking latency", &mut latencies);
}

async fn phase2_concurrent() {
    let n_tasks = 10;
    let n_per_task = 200;
    let store = Arc::new(MemoryStore::new());

    let start = Instant::now();
    let mut handles = Vec::new();

    for t in 0..n_tasks {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            // One session per task, each booking inside its own stretch of
            // weeks so nothing conflicts.
            let scheduler = Scheduler::new(store);
            let task_start = base_monday()
                .checked_add_days(Days::new(t as u64 * 70))
                .unwrap();
            for i in 0..n_per_task {
                let key = nth_slot(task_start, i);
                scheduler.select_slot(key).await.unwrap();
                scheduler.commit_booking(draft(i)).await.unwrap();
            }
        }));
    }

    for h in handles {
        h.await.unwrap();
    }

    let elapsed = start.elapsed();
    let total = n_tasks * n_per_task;
    let ops = total as f64 / elapsed.as_secs_f64();
    println!(
        "  {n_tasks} tasks x {n_per_task} bookings = {total} total in {:.2}s = {ops:.0} ops/sec",
        elapsed.as_secs_f64()
    );
}

async fn phase3_grid_reads_under_load() {
    let scheduler = Arc::new(Scheduler::new(Arc::new(MemoryStore::new())));

    // Pre-fill a dense fortnight so grids resolve against real spans.
    for i in 0..400 {
        let key = nth_slot(base_monday(), i);
        scheduler.select_slot(key).await.unwrap();
        scheduler.commit_booking(draft(i)).await.unwrap();
    }

    // Background writer churning one far-future day.
    let stop = Arc::new(AtomicBool::new(false));
    let writer = {
        let scheduler = scheduler.clone();
        let stop = stop.clone();
        tokio::spawn(async move {
            let day = base_monday().checked_add_days(Days::new(7000)).unwrap();
            let mut i = 0usize;
            while !stop.load(Ordering::Relaxed) {
                let key = slot_at(day, i % 30);
                scheduler.select_slot(key).await.unwrap();
                scheduler.commit_booking(draft(i)).await.unwrap();
                scheduler.delete_appointment(key).await.unwrap();
                i += 1;
            }
        })
    };

    let n_reads = 5000;
    let mut latencies = Vec::with_capacity(n_reads);
    for i in 0..n_reads {
        let reference = base_monday()
            .checked_add_days(Days::new(((i % 3) * 7) as u64))
            .unwrap();
        let t = Instant::now();
        let grid = scheduler.week_grid(reference).await;
        latencies.push(t.elapsed());
        assert_eq!(grid.len(), 7);
    }

    stop.store(true, Ordering::Relaxed);
    let _ = writer.await;

    print_latency("week grid", &mut latencies);
}

async fn phase4_session_storm() {
    let n_sessions = 50;
    let ops_per_session = 10;
    let store = Arc::new(MemoryStore::new());

    let start = Instant::now();
    let success = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::new();

    for s in 0..n_sessions {
        let store = store.clone();
        let success = success.clone();
        handles.push(tokio::spawn(async move {
            // Full session lifecycle: prime, follow the store, book, leave.
            let scheduler = Arc::new(Scheduler::new(store));
            scheduler.load().await.unwrap();
            let sync = scheduler.spawn_sync();

            let session_start = base_monday()
                .checked_add_days(Days::new(s as u64 * 7))
                .unwrap();
            for i in 0..ops_per_session {
                let key = nth_slot(session_start, i);
                scheduler.select_slot(key).await.unwrap();
                scheduler.commit_booking(draft(i)).await.unwrap();
            }

            sync.abort();
            success.fetch_add(1, Ordering::Relaxed);
        }));
    }

    for h in handles {
        let _ = h.await;
    }

    let elapsed = start.elapsed();
    let ok = success.load(Ordering::Relaxed);
    println!(
        "  {n_sessions} sessions, {ops_per_session} bookings each: {ok}/{n_sessions} succeeded in {:.2}s",
        elapsed.as_secs_f64()
    );
}

#[tokio::main]
async fn main() {
    println!("=== slotgrid stress benchmark ===\n");

    println!("[phase 1] sequential booking throughput");
    phase1_sequential().await;

    println!("\n[phase 2] concurrent booking throughput");
    phase2_concurrent().await;

    println!("\n[phase 3] grid reads under write load");
    phase3_grid_reads_under_load().await;

    println!("\n[phase 4] session storm");
    phase4_session_storm().await;

    println!("\n=== benchmark complete ===");
}
