mod assignment;
mod audit;
mod bookings;
mod conflict;
mod duty;
mod error;
mod guest;
mod lifecycle;
mod queries;
mod registry;
mod store;

pub use bookings::NewBooking;
pub use error::{EngineError, ErrorClass};
pub use guest::{GuestReceipt, NewGuestBooking};
pub use lifecycle::{Authority, Lane, Transition};
pub use queries::BookingFilter;
pub use store::Directory;

use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, OwnedRwLockWriteGuard, RwLock};
use ulid::Ulid;

use crate::clock::{Clock, SystemClock};
use crate::config::ApprovalPolicy;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

use assignment::TripBoard;
use audit::AuditLog;
use duty::DutyRoster;

pub type SharedResourceState = Arc<RwLock<ResourceState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Background task that owns the WAL and batches appends for group commit:
/// take the first append, drain whatever else is already queued, then pay
/// for one fsync and answer every sender with the shared result.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let WalCommand::Append { event, response } = cmd else {
            handle_non_append(&mut wal, cmd);
            continue;
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    // Commit what we have before compaction swaps the file.
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }
        commit_batch(&mut wal, batch);
        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

fn commit_batch(wal: &mut Wal, mut batch: Vec<PendingAppend>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, &batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        tracing::error!("WAL flush failed for {} events: {e}", batch.len());
    }
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even after an append error so the half-written batch does not
    // leak into the next one.
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => commit_batch(wal, vec![(event, response)]),
    }
}

/// Where a booking lives and what it last transitioned to. Lets other
/// resources' operations read a booking's status without its lock.
#[derive(Debug, Clone, Copy)]
pub(super) struct BookingRef {
    pub resource_id: Ulid,
    pub status: BookingStatus,
}

/// Lock a std mutex that only guards short synchronous sections.
pub(super) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct Engine {
    pub state: DashMap<Ulid, SharedResourceState>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) policy: ApprovalPolicy,
    pub(super) directory: Directory,
    /// booking id → owning resource + status
    pub(super) bookings: DashMap<Ulid, BookingRef>,
    /// SHA-256 hex digest of a guest access token → booking id
    pub(super) guest_tokens: DashMap<String, Ulid>,
    trips: Mutex<TripBoard>,
    duties: Mutex<DutyRoster>,
    audit: Mutex<AuditLog>,
    // Writers hold these across check → WAL append → apply.
    // Order: resource lock → trip_lock → duty_lock → directory_lock.
    pub(super) trip_lock: tokio::sync::Mutex<()>,
    pub(super) duty_lock: tokio::sync::Mutex<()>,
    pub(super) directory_lock: tokio::sync::Mutex<()>,
}

/// Apply an event directly to a ResourceState (no locking; caller holds the lock).
fn apply_to_resource(rs: &mut ResourceState, event: &Event) {
    match event {
        Event::ResourceStatusChanged { status, .. } => rs.status = *status,
        Event::BookingRequested { id, resource_id, span, purpose, party, at } => {
            rs.insert_booking(Booking {
                id: *id,
                resource_id: *resource_id,
                span: *span,
                purpose: purpose.clone(),
                status: BookingStatus::Pending,
                party: party.clone(),
                approval: None,
                rejection_note: None,
                trip: None,
                returned_at: None,
                approval_log: Vec::new(),
                rating: None,
                created_at: *at,
                updated_at: *at,
            });
        }
        Event::BookingStatusChanged { id, to, actor, note, at, .. } => {
            if let Some(b) = rs.booking_mut(id) {
                apply_status(b, *to, *actor, note.as_deref(), *at);
            }
        }
        Event::TripAssigned { id, trip, .. } => {
            if let Some(b) = rs.booking_mut(id) {
                b.trip = Some(*trip);
                b.updated_at = trip.assigned_at;
            }
        }
        Event::DriverRated { rating, .. } => {
            if let Some(b) = rs.booking_mut(&rating.booking_id) {
                b.rating = Some(rating.clone());
            }
        }
        Event::BookingRestored { booking } => rs.insert_booking(booking.clone()),
        _ => {}
    }
}

fn apply_status(b: &mut Booking, to: BookingStatus, actor: Option<Ulid>, note: Option<&str>, at: Ms) {
    b.status = to;
    b.updated_at = at;
    match to {
        BookingStatus::Approved | BookingStatus::Rejected => {
            let action = if to == BookingStatus::Approved {
                ApprovalAction::Approved
            } else {
                b.rejection_note = note.map(str::to_string);
                ApprovalAction::Rejected
            };
            if let Some(by) = actor {
                b.approval = Some(Approval { by, at });
                b.approval_log.push(ApprovalEntry {
                    approver_id: by,
                    action,
                    note: note.map(str::to_string),
                    at,
                });
            }
        }
        BookingStatus::Cancelled => {
            if let Some(note) = note {
                b.rejection_note = Some(note.to_string());
            }
        }
        BookingStatus::Completed => b.returned_at = Some(at),
        BookingStatus::Pending | BookingStatus::Ongoing | BookingStatus::Overdue => {}
    }
}

impl Engine {
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>) -> io::Result<Self> {
        Self::with_options(wal_path, notify, Arc::new(SystemClock), ApprovalPolicy::default())
    }

    pub fn with_options(
        wal_path: PathBuf,
        notify: Arc<NotifyHub>,
        clock: Arc<dyn Clock>,
        policy: ApprovalPolicy,
    ) -> io::Result<Self> {
        let (wal, events) = Wal::recover(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            state: DashMap::new(),
            wal_tx,
            notify,
            clock,
            policy,
            directory: Directory::new(),
            bookings: DashMap::new(),
            guest_tokens: DashMap::new(),
            trips: Mutex::new(TripBoard::default()),
            duties: Mutex::new(DutyRoster::default()),
            audit: Mutex::new(AuditLog::default()),
            trip_lock: tokio::sync::Mutex::new(()),
            duty_lock: tokio::sync::Mutex::new(()),
            directory_lock: tokio::sync::Mutex::new(()),
        };

        // We're the sole owner of these Arcs, so try_write always succeeds.
        // Never block here: this runs inside the async runtime.
        for event in &events {
            match event {
                Event::ResourceCreated { id, name, kind, at, .. } => {
                    let rs = ResourceState::new(*id, name.clone(), *kind, *at);
                    engine.state.insert(*id, Arc::new(RwLock::new(rs)));
                    engine.apply_event(None, event);
                }
                Event::ResourceRestored { id, name, kind, status, created_at } => {
                    let mut rs = ResourceState::new(*id, name.clone(), *kind, *created_at);
                    rs.status = *status;
                    engine.state.insert(*id, Arc::new(RwLock::new(rs)));
                }
                Event::ResourceDeleted { id, .. } => {
                    if let Some(rs) = engine.get_resource(id) {
                        let guard = rs.try_read().map_err(|_| replay_contended())?;
                        engine.purge_resource(&guard);
                    }
                    engine.apply_event(None, event);
                }
                other => match other.resource_id() {
                    Some(resource_id) => {
                        if let Some(rs) = engine.get_resource(&resource_id) {
                            let mut guard = rs.try_write().map_err(|_| replay_contended())?;
                            engine.apply_event(Some(&mut *guard), other);
                        }
                    }
                    None => engine.apply_event(None, other),
                },
            }
        }

        metrics::gauge!(crate::observability::RESOURCES_ACTIVE).set(engine.state.len() as f64);
        if !events.is_empty() {
            tracing::info!(
                "replayed {} events: {} resources, {} bookings",
                events.len(),
                engine.state.len(),
                engine.bookings.len()
            );
        }
        Ok(engine)
    }

    pub fn now(&self) -> Ms {
        self.clock.now_ms()
    }

    pub fn approval_policy(&self) -> ApprovalPolicy {
        self.policy
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// Apply an event to every in-memory structure it touches. `rs` is the
    /// owning resource for per-resource events, already write-locked.
    fn apply_event(&self, mut rs: Option<&mut ResourceState>, event: &Event) {
        if let Some(rs) = rs.as_deref_mut() {
            apply_to_resource(rs, event);
        }
        let rs = rs.as_deref();
        self.index_event(rs, event);
        self.directory.apply_event(event);
        lock(&self.duties).apply(event);

        let mut audit = lock(&self.audit);
        if let Event::AuditRestored { entry } = event {
            audit.push(entry.clone());
        } else if let Some(entry) = audit::entry_for(event, rs) {
            audit.push(entry);
        }
    }

    fn index_event(&self, rs: Option<&ResourceState>, event: &Event) {
        match event {
            Event::BookingRequested { id, resource_id, party, .. } => {
                self.index_booking(*id, *resource_id, BookingStatus::Pending, party);
            }
            Event::BookingRestored { booking } => {
                self.index_booking(booking.id, booking.resource_id, booking.status, &booking.party);
                if let Some(trip) = &booking.trip {
                    lock(&self.trips).place(booking.id, trip, booking.span);
                }
            }
            Event::BookingStatusChanged { id, to, .. } => {
                if let Some(mut r) = self.bookings.get_mut(id) {
                    r.status = *to;
                }
            }
            Event::TripAssigned { id, trip, .. } => {
                if let Some(b) = rs.and_then(|rs| rs.booking(id)) {
                    lock(&self.trips).place(*id, trip, b.span);
                }
            }
            _ => {}
        }
    }

    fn index_booking(&self, id: Ulid, resource_id: Ulid, status: BookingStatus, party: &Party) {
        self.bookings.insert(id, BookingRef { resource_id, status });
        if let Party::Guest { token_digest, .. } = party {
            self.guest_tokens.insert(token_digest.clone(), id);
        }
    }

    /// Drop a resource and everything indexed under its bookings.
    fn purge_resource(&self, rs: &ResourceState) {
        let ids: Vec<Ulid> = rs.bookings.iter().map(|b| b.id).collect();
        for b in &rs.bookings {
            self.bookings.remove(&b.id);
            if let Party::Guest { token_digest, .. } = &b.party {
                self.guest_tokens.remove(token_digest);
            }
        }
        lock(&self.trips).forget(&ids);
        self.directory.forget_ratings(&ids);
        self.state.remove(&rs.id);
    }

    pub fn get_resource(&self, id: &Ulid) -> Option<SharedResourceState> {
        self.state.get(id).map(|e| e.value().clone())
    }

    /// WAL-append + apply in one call. The caller holds the resource lock.
    pub(super) async fn persist_and_apply(
        &self,
        rs: &mut ResourceState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.apply_event(Some(rs), event);
        Ok(())
    }

    /// WAL-append + apply for events that belong to no resource.
    pub(super) async fn persist(&self, event: &Event) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.apply_event(None, event);
        Ok(())
    }

    /// Acquire a resource's write lock, failing if it was deleted while we
    /// waited for it.
    pub(super) async fn lock_resource(
        &self,
        id: Ulid,
    ) -> Result<OwnedRwLockWriteGuard<ResourceState>, EngineError> {
        let rs = self
            .get_resource(&id)
            .ok_or(EngineError::NotFound("resource", id))?;
        let guard = rs.write_owned().await;
        if !self.state.contains_key(&id) {
            return Err(EngineError::NotFound("resource", id));
        }
        Ok(guard)
    }

    /// Lookup booking → resource, acquire the resource's write lock.
    pub(super) async fn resolve_booking_write(
        &self,
        booking_id: &Ulid,
    ) -> Result<OwnedRwLockWriteGuard<ResourceState>, EngineError> {
        let resource_id = self
            .bookings
            .get(booking_id)
            .map(|r| r.resource_id)
            .ok_or(EngineError::NotFound("booking", *booking_id))?;
        let guard = self.lock_resource(resource_id).await?;
        if guard.booking(booking_id).is_none() {
            return Err(EngineError::NotFound("booking", *booking_id));
        }
        Ok(guard)
    }

    /// Rewrite the WAL with only the events needed to recreate current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        // Hold every lock a writer would take, in writer order, until the
        // snapshot is queued; later appends land after it in the new file.
        let mut resource_ids: Vec<Ulid> = self.state.iter().map(|e| *e.key()).collect();
        resource_ids.sort();
        let mut guards = Vec::with_capacity(resource_ids.len());
        for id in resource_ids {
            if let Some(rs) = self.get_resource(&id) {
                guards.push(rs.read_owned().await);
            }
        }
        let trip_guard = self.trip_lock.lock().await;
        let duty_guard = self.duty_lock.lock().await;
        let directory_guard = self.directory_lock.lock().await;

        let mut events = Vec::new();
        for user in self.directory.users() {
            events.push(Event::UserRestored { user });
        }
        for driver in self.directory.drivers() {
            events.push(Event::DriverRestored { driver });
        }
        for rs in &guards {
            events.push(Event::ResourceRestored {
                id: rs.id,
                name: rs.name.clone(),
                kind: rs.kind,
                status: rs.status,
                created_at: rs.created_at,
            });
        }
        for vehicle in self.directory.vehicles() {
            events.push(Event::VehicleRestored { vehicle });
        }
        for rs in &guards {
            for booking in &rs.bookings {
                events.push(Event::BookingRestored {
                    booking: booking.clone(),
                });
            }
        }
        for duty in lock(&self.duties).snapshot() {
            events.push(Event::DutyRestored { duty });
        }
        for entry in lock(&self.audit).snapshot() {
            events.push(Event::AuditRestored { entry });
        }

        let (tx, rx) = oneshot::channel();
        let sent = self
            .wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await;
        drop(directory_guard);
        drop(duty_guard);
        drop(trip_guard);
        drop(guards);

        sent.map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

fn replay_contended() -> io::Error {
    io::Error::other("replay: resource lock unexpectedly contended")
}
