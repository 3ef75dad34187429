//! Hard input limits. Anything past these is rejected with `LimitExceeded`
//! before a lock is taken.

use crate::model::Ms;

pub const MAX_RESOURCES: usize = 100_000;
pub const MAX_BOOKINGS_PER_RESOURCE: usize = 100_000;
pub const MAX_NAME_LEN: usize = 200;
pub const MAX_PURPOSE_LEN: usize = 2_000;
pub const MAX_NOTE_LEN: usize = 2_000;
pub const MAX_CONTACT_FIELD_LEN: usize = 255;

/// 2000-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// 2200-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 7_258_118_400_000;
/// A single booking may not span more than a year.
pub const MAX_SPAN_DURATION_MS: Ms = 366 * 24 * 3_600_000;

/// In-memory audit window; older entries are dropped first.
pub const MAX_AUDIT_ENTRIES: usize = 50_000;
