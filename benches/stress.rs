use std::sync::Arc;
use std::time::{Duration, Instant};

use roombook::engine::Engine;
use roombook::model::{Candidate, Floor, Requester};
use roombook::notify::LiveHub;

const HOUR: i64 = 3_600_000;
const HALF_HOUR: i64 = HOUR / 2;
const DAY: i64 = 24 * HOUR;

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    if latencies.is_empty() {
        println!("  {label}: no samples");
        return;
    }
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.3}ms, p50={:.3}ms, p95={:.3}ms, p99={:.3}ms, max={:.3}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies[latencies.len() - 1].as_secs_f64() * 1000.0,
    );
}

fn requester(i: usize) -> Requester {
    Requester {
        user_id: format!("user{i}@example.org"),
        name: format!("user{i}"),
        department: "Bench".into(),
        phone: None,
        cpr: None,
    }
}

/// Midnight, a couple of days out, so every slot is in the future.
fn base_day() -> i64 {
    (chrono::Utc::now().timestamp_millis() / DAY + 2) * DAY
}

fn slot(floor: u8, room: &str, start: i64) -> Candidate {
    Candidate {
        floor: Floor(floor),
        room: room.to_string(),
        start,
        end: start + HALF_HOUR,
    }
}

fn fresh_engine(name: &str) -> Arc<Engine> {
    let dir = std::env::temp_dir().join("roombook_bench");
    std::fs::create_dir_all(&dir).expect("create bench dir");
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    Arc::new(Engine::new(path, Arc::new(LiveHub::new())).expect("open engine"))
}

async fn phase1_sequential(engine: &Engine, day: i64) {
    let n = 2000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();
    for i in 0..n {
        let t = Instant::now();
        engine
            .submit(slot(10, "Room1", day + i as i64 * HALF_HOUR), requester(i), format!("user{i}"))
            .await
            .expect("sequential submit");
        latencies.push(t.elapsed());
    }
    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} submits in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("submit", &mut latencies);
}

/// Many writers across both floors; group commit should batch their WAL
/// appends.
async fn phase2_concurrent(engine: Arc<Engine>, day: i64) {
    let rooms: [(u8, &str); 5] = [(10, "Room1"), (10, "Room2"), (10, "Room3"), (7, "Room1"), (7, "Room2")];
    let writers = 50;
    let per_writer = 40;
    let start = Instant::now();
    let mut handles = Vec::new();
    for w in 0..writers {
        let engine = engine.clone();
        let (floor, room) = rooms[w % rooms.len()];
        handles.push(tokio::spawn(async move {
            let mut ok = 0usize;
            for i in 0..per_writer {
                let at = day + 60 * DAY + ((w / rooms.len()) * per_writer + i) as i64 * HALF_HOUR;
                if engine.submit(slot(floor, room, at), requester(w), format!("user{w}")).await.is_ok() {
                    ok += 1;
                }
            }
            ok
        }));
    }
    let mut ok = 0;
    for h in handles {
        ok += h.await.expect("writer task");
    }
    let elapsed = start.elapsed();
    println!(
        "  {writers} writers x {per_writer} = {ok} accepted in {:.2}s = {:.0} ops/sec",
        elapsed.as_secs_f64(),
        ok as f64 / elapsed.as_secs_f64()
    );
}

/// Four pending requests per slot, then approve one of each, cascading
/// three declines into the same WAL record.
async fn phase3_approve_cascade(engine: &Engine, day: i64) {
    let slots = 200;
    let mut winners = Vec::with_capacity(slots);
    for s in 0..slots {
        let at = day + 120 * DAY + s as i64 * HOUR;
        for r in 0..4 {
            let b = engine
                .submit(slot(7, "Room2", at), requester(r), format!("user{r}"))
                .await
                .expect("contending submit");
            if r == 0 {
                winners.push(b.id);
            }
        }
    }

    let mut latencies = Vec::with_capacity(slots);
    let mut declined = 0;
    let start = Instant::now();
    for id in winners {
        let t = Instant::now();
        let approval = engine.approve(id).await.expect("approve");
        latencies.push(t.elapsed());
        declined += approval.declined.len();
    }
    println!(
        "  {slots} approvals, {declined} cascaded declines in {:.2}s",
        start.elapsed().as_secs_f64()
    );
    print_latency("approve", &mut latencies);
}

async fn phase4_read_under_load(engine: Arc<Engine>, day: i64) {
    let writer = {
        let engine = engine.clone();
        tokio::spawn(async move {
            for i in 0..1000 {
                let at = day + 200 * DAY + i as i64 * HALF_HOUR;
                let _ = engine.submit(slot(10, "Room3", at), requester(i), format!("user{i}")).await;
            }
        })
    };

    let mut latencies = Vec::new();
    while !writer.is_finished() {
        let t = Instant::now();
        let _ = engine.snapshot(Floor(10)).await.expect("snapshot");
        latencies.push(t.elapsed());
        tokio::task::yield_now().await;
    }
    writer.await.expect("writer task");
    print_latency("snapshot(floor 10)", &mut latencies);
}

#[tokio::main]
async fn main() {
    println!("=== roombook engine benchmark ===");
    let day = base_day();

    println!("\n[phase 1] sequential submit throughput");
    phase1_sequential(&fresh_engine("phase1.wal"), day).await;

    println!("\n[phase 2] concurrent submit throughput");
    phase2_concurrent(fresh_engine("phase2.wal"), day).await;

    println!("\n[phase 3] approve with cascade");
    phase3_approve_cascade(&fresh_engine("phase3.wal"), day).await;

    println!("\n[phase 4] snapshot latency under write load");
    let engine = fresh_engine("phase4.wal");
    phase4_read_under_load(engine.clone(), day).await;
    println!("  {} bookings on record", engine.booking_count());

    println!("\n=== benchmark complete ===");
}
