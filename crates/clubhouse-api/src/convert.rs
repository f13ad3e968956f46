use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use clubhouse_db::models::{EventRow, GuestRow, RegistrationRow};
use clubhouse_lifecycle::{RegistrationFlags, RegistrationRecord};
use clubhouse_types::models::{Event, EventTag, PlusOneGuest};

pub fn parse_id(raw: &str, what: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", what, raw, e);
        Uuid::nil()
    })
}

/// Accepts RFC 3339 and SQLite's `datetime('now')` format.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc()))
        .map_err(|e| warn!("Corrupt timestamp '{}': {}", raw, e))
        .ok()
}

pub fn tags_to_json(tags: &[EventTag]) -> String {
    serde_json::to_string(tags).unwrap_or_else(|_| "[]".to_string())
}

pub fn event(row: EventRow) -> Event {
    let tags: Vec<EventTag> = serde_json::from_str(&row.tags).unwrap_or_else(|e| {
        warn!("Corrupt tags '{}' on event '{}': {}", row.tags, row.id, e);
        Vec::new()
    });

    Event {
        id: parse_id(&row.id, "event id"),
        title: row.title,
        description: row.description,
        starts_at: row.starts_at.as_deref().and_then(parse_timestamp),
        capacity: row.capacity.and_then(|c| u32::try_from(c).ok()),
        tags,
        pay_in_app: row.pay_in_app,
        price_cents: row.price_cents,
        payment_instructions: row.payment_instructions,
        created_at: parse_timestamp(&row.created_at).unwrap_or_default(),
    }
}

pub fn flags(row: &RegistrationRow) -> RegistrationFlags {
    RegistrationFlags {
        is_waiting_list: row.is_waiting_list,
        refund_requested: row.refund_requested,
        refund_approved: row.refund_approved,
        refund_processed: row.refund_processed,
    }
}

pub fn record(row: &RegistrationRow) -> RegistrationRecord {
    RegistrationRecord {
        id: parse_id(&row.id, "registration id"),
        user_id: parse_id(&row.user_id, "user id"),
        flags: flags(row),
        payment_completed: row.payment_completed,
        cancelled_by: row.cancelled_by.as_deref().map(|id| parse_id(id, "cancelled_by")),
        cancelled_at: row.cancelled_at.as_deref().and_then(parse_timestamp),
    }
}

pub fn guest(row: GuestRow) -> PlusOneGuest {
    PlusOneGuest {
        id: parse_id(&row.id, "guest id"),
        registration_id: parse_id(&row.registration_id, "registration id"),
        name: row.name,
        email: row.email,
    }
}
