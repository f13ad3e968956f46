use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::state::RegistrationFlags;

/// A registration row as the roster sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub flags: RegistrationFlags,
    pub payment_completed: bool,
    pub cancelled_by: Option<Uuid>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

/// Registrations of one event split by status, each list in storage order.
#[derive(Debug, Default)]
pub struct Partition<'a> {
    pub confirmed: Vec<&'a RegistrationRecord>,
    pub waitlisted: Vec<&'a RegistrationRecord>,
    pub cancelled: Vec<&'a RegistrationRecord>,
}

/// Split `rows` (in storage order) into confirmed / waitlisted / cancelled.
///
/// Every user appears in at most one list. A processed row only counts as
/// cancelled when the user has no active row for the event, and only the
/// latest processed row per user is kept.
pub fn partition(rows: &[RegistrationRecord]) -> Partition<'_> {
    let active_users: HashSet<Uuid> = rows
        .iter()
        .filter(|r| r.flags.is_active())
        .map(|r| r.user_id)
        .collect();

    let mut out = Partition::default();
    let mut placed: HashSet<Uuid> = HashSet::new();
    let mut latest_cancelled: HashMap<Uuid, usize> = HashMap::new();

    for (idx, row) in rows.iter().enumerate() {
        if row.flags.is_active() {
            if !placed.insert(row.user_id) {
                continue;
            }
            if row.flags.is_waiting_list {
                out.waitlisted.push(row);
            } else {
                out.confirmed.push(row);
            }
        } else if !active_users.contains(&row.user_id) {
            latest_cancelled.insert(row.user_id, idx);
        }
    }

    let mut cancelled: Vec<usize> = latest_cancelled.into_values().collect();
    cancelled.sort_unstable();
    out.cancelled = cancelled.into_iter().map(|idx| &rows[idx]).collect();

    out
}

/// Who finalized a cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribution {
    SelfCancelled,
    Admin(Uuid),
    /// Legacy rows processed without a canceller.
    Unknown,
}

pub fn attribute(record: &RegistrationRecord) -> Attribution {
    match record.cancelled_by {
        Some(by) if by == record.user_id => Attribution::SelfCancelled,
        Some(by) => Attribution::Admin(by),
        None => Attribution::Unknown,
    }
}
