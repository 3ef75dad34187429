use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ulid::Ulid;

use fleetbook::engine::{BookingFilter, Engine, NewBooking};
use fleetbook::model::{Actor, ResourceKind, Role};
use fleetbook::notify::NotifyHub;

const HOUR: i64 = 3_600_000; // 1 hour in ms
const BASE: i64 = 1_893_456_000_000; // 2030-01-01T00:00Z

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
    let avg = total / latencies.len().max(1) as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        percentile(latencies, 100.0).as_secs_f64() * 1000.0,
    );
}

fn request(resource_id: Ulid, slot: i64) -> NewBooking {
    NewBooking {
        resource_id,
        start: BASE + slot * HOUR,
        end: BASE + (slot + 1) * HOUR,
        purpose: "bench".into(),
    }
}

struct Setup {
    engine: Arc<Engine>,
    admin: Actor,
    employees: Vec<Actor>,
    rooms: Vec<Ulid>,
}

async fn setup() -> Setup {
    let dir = std::env::temp_dir().join(format!("fleetbook_bench_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let engine = Arc::new(Engine::new(dir.join("fleetbook.wal"), Arc::new(NotifyHub::new())).unwrap());
    let admin = Actor::from(&engine.bootstrap_admin("Admin", "admin@bench.local").await.unwrap().unwrap());

    let mut employees = Vec::new();
    for i in 0..20 {
        let user = engine
            .register_user(&admin, &format!("Employee {i}"), &format!("e{i}@bench.local"), Role::Employee)
            .await
            .unwrap();
        employees.push(Actor::from(&user));
    }
    let mut rooms = Vec::new();
    for i in 0..10 {
        rooms.push(engine.create_resource(&admin, &format!("Room {i}"), ResourceKind::Room).await.unwrap().id);
    }
    println!("  created {} users, {} rooms", employees.len(), rooms.len());
    Setup { engine, admin, employees, rooms }
}

async fn phase1_sequential(s: &Setup) {
    let n = 2000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    for i in 0..n {
        let t = Instant::now();
        s.engine
            .create_booking(&s.employees[0], request(s.rooms[0], i as i64))
            .await
            .unwrap();
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} bookings in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("write latency", &mut latencies);
}

async fn phase2_concurrent(s: &Setup) {
    let n_tasks = 10;
    let n_per_task = 200;

    let start = Instant::now();
    let mut handles = Vec::new();
    for i in 0..n_tasks {
        let engine = s.engine.clone();
        let actor = s.employees[i % s.employees.len()];
        let room = s.rooms[1 + i % (s.rooms.len() - 1)];
        handles.push(tokio::spawn(async move {
            for j in 0..n_per_task {
                // Tasks sharing a room interleave their slots.
                let slot = (j * n_tasks + i) as i64;
                let _ = engine.create_booking(&actor, request(room, slot)).await;
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

async fn phase3_contended_slot(s: &Setup) {
    let rounds = 100;
    let contenders = s.employees.len();
    let winners = Arc::new(AtomicUsize::new(0));

    let start = Instant::now();
    for round in 0..rounds {
        let mut handles = Vec::new();
        for actor in s.employees.iter().copied() {
            let engine = s.engine.clone();
            let winners = winners.clone();
            let room = s.rooms[9];
            handles.push(tokio::spawn(async move {
                if engine.create_booking(&actor, request(room, 50_000 + round)).await.is_ok() {
                    winners.fetch_add(1, Ordering::Relaxed);
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
    }

    let won = winners.load(Ordering::Relaxed);
    println!(
        "  {rounds} slots x {contenders} contenders: {won} winners in {:.2}s",
        start.elapsed().as_secs_f64()
    );
    assert_eq!(won, rounds as usize, "every contended slot must have exactly one winner");
}

async fn phase4_read_under_load(s: &Setup) {
    let stop = Arc::new(AtomicBool::new(false));
    let mut writers = Vec::new();
    for w in 0..5 {
        let engine = s.engine.clone();
        let actor = s.employees[w];
        let room = s.rooms[w + 1];
        let stop = stop.clone();
        writers.push(tokio::spawn(async move {
            let mut i = 0i64;
            while !stop.load(Ordering::Relaxed) {
                let _ = engine.create_booking(&actor, request(room, 100_000 + i)).await;
                i += 1;
            }
        }));
    }

    let n_readers = 10;
    let reads_per_reader = 200;
    let mut readers = Vec::new();
    for _ in 0..n_readers {
        let engine = s.engine.clone();
        let admin = s.admin;
        let room = s.rooms[0];
        readers.push(tokio::spawn(async move {
            let filter = BookingFilter {
                resource_id: Some(room),
                from: Some(BASE),
                to: Some(BASE + 100 * HOUR),
                ..BookingFilter::default()
            };
            let mut latencies = Vec::with_capacity(reads_per_reader);
            for _ in 0..reads_per_reader {
                let t = Instant::now();
                let _ = engine.list_bookings(&admin, &filter).await;
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut all = Vec::new();
    for h in readers {
        all.extend(h.await.unwrap());
    }
    stop.store(true, Ordering::Relaxed);
    for h in writers {
        let _ = h.await;
    }
    print_latency("list_bookings", &mut all);
}

#[tokio::main]
async fn main() {
    println!("=== fleetbook stress benchmark ===\n");

    println!("[setup]");
    let s = setup().await;

    println!("\n[phase 1] sequential write throughput");
    phase1_sequential(&s).await;

    println!("\n[phase 2] concurrent write throughput");
    phase2_concurrent(&s).await;

    println!("\n[phase 3] contended slot");
    phase3_contended_slot(&s).await;

    println!("\n[phase 4] read latency under write load");
    phase4_read_under_load(&s).await;

    println!("\n=== done ===");
}
