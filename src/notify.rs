use serde::Serialize;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::BookingStatus;

const CHANNEL_CAPACITY: usize = 256;

/// Approval decision addressed to whoever requested the booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub recipient_name: String,
    pub recipient_email: String,
    pub booking_id: Ulid,
    pub resource_name: String,
    pub status: BookingStatus,
    pub note: Option<String>,
}

/// Fire-and-forget fan-out of approval notices to delivery tasks.
pub struct NotifyHub {
    sender: broadcast::Sender<Notice>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            sender: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.sender.subscribe()
    }

    /// Send a notice. Dropped if nobody is listening; never fails the caller.
    pub fn send(&self, notice: Notice) {
        let booking_id = notice.booking_id;
        if self.sender.send(notice).is_err() {
            tracing::debug!("no notice subscribers, dropped notice for booking {booking_id}");
        }
    }
}
