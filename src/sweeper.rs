use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::engine::Engine;

/// Background task that periodically moves lapsed approvals to OVERDUE.
pub async fn run_sweeper(engine: Arc<Engine>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        match engine.mark_overdue().await {
            Ok(0) => debug!("overdue sweep: nothing to do"),
            Ok(n) => info!("overdue sweep marked {n} bookings"),
            Err(e) => warn!("overdue sweep failed: {e}"),
        }
    }
}

/// Background task that rewrites the WAL once enough appends pile up.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(30));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        let appends = engine.wal_appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        match engine.compact_wal().await {
            Ok(()) => info!("compacted WAL after {appends} appends"),
            Err(e) => warn!("WAL compaction failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::ApprovalPolicy;
    use crate::engine::NewBooking;
    use crate::model::*;
    use crate::notify::NotifyHub;
    use std::path::PathBuf;

    const T: Ms = 1_748_768_400_000;
    const H: Ms = 3_600_000;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("fleetbook_test_sweeper");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn sweeper_marks_lapsed_approvals() {
        let clock = Arc::new(ManualClock::new(T - H));
        let engine = Arc::new(
            Engine::with_options(
                test_wal_path("sweep.wal"),
                Arc::new(NotifyHub::new()),
                clock.clone(),
                ApprovalPolicy::default(),
            )
            .unwrap(),
        );
        let admin = Actor::from(
            &engine
                .bootstrap_admin("Admin", "admin@example.com")
                .await
                .unwrap()
                .unwrap(),
        );
        let employee = Actor::from(
            &engine
                .register_user(&admin, "Budi", "budi@example.com", Role::Employee)
                .await
                .unwrap(),
        );
        let room = engine
            .create_resource(&admin, "Room #5", ResourceKind::Room)
            .await
            .unwrap()
            .id;
        let b = engine
            .create_booking(
                &employee,
                NewBooking {
                    resource_id: room,
                    start: T,
                    end: T + H,
                    purpose: "Team sync".into(),
                },
            )
            .await
            .unwrap();
        engine.approve_booking(b.id, &admin, None).await.unwrap();
        clock.set(T + 2 * H);

        let task = tokio::spawn(run_sweeper(engine.clone(), Duration::from_millis(10)));
        let mut status = BookingStatus::Approved;
        for _ in 0..100 {
            status = engine.get_booking(b.id, &admin).await.unwrap().status;
            if status == BookingStatus::Overdue {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        task.abort();
        assert_eq!(status, BookingStatus::Overdue);
    }
}
