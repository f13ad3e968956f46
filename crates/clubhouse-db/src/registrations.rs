use anyhow::{Result, anyhow};
use rusqlite::Connection;
use tracing::debug;

use crate::models::RegistrationRow;
use crate::payments::{NewPayment, insert_payment, mark_payment_refunded};
use crate::{Database, OptionalExt};

const REGISTRATION_COLUMNS: &str = "id, event_id, user_id, is_waiting_list, payment_completed, \
     refund_requested, refund_requested_at, refund_approved, refund_processed, cancelled_by, \
     cancelled_at, created_at";

/// Result of a registration upsert.
#[derive(Debug, Clone)]
pub struct Enrollment {
    pub registration: RegistrationRow,
    /// True if a new row was inserted, false if an existing row was reused.
    pub inserted: bool,
}

impl Database {
    /// Register a user, placing them with `place` inside one transaction.
    ///
    /// `place` receives the confirmed count excluding the user's own rows and
    /// the user's latest existing row, and returns `is_waiting_list`. Because
    /// the count read and the write share the connection mutex, two registrations
    /// can never both take the last seat.
    pub fn register<F>(&self, event_id: &str, user_id: &str, new_id: &str, place: F) -> Result<Enrollment>
    where
        F: FnOnce(u32, Option<&RegistrationRow>) -> bool,
    {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;
            let count = confirmed_count_excluding(&tx, event_id, user_id)?;
            let existing = latest_registration(&tx, event_id, user_id)?;
            let waiting = place(count, existing.as_ref());
            debug!(
                "register {} on {}: confirmed_count={} waiting={}",
                user_id, event_id, count, waiting
            );
            let enrollment = upsert(&tx, existing, event_id, user_id, new_id, waiting, false)?;
            tx.commit()?;
            Ok(enrollment)
        })
    }

    /// Admin or payment enrollment: confirmed regardless of capacity, payment
    /// marked as completed.
    pub fn enroll(&self, event_id: &str, user_id: &str, new_id: &str) -> Result<Enrollment> {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;
            let existing = latest_registration(&tx, event_id, user_id)?;
            let enrollment = upsert(&tx, existing, event_id, user_id, new_id, false, true)?;
            tx.commit()?;
            Ok(enrollment)
        })
    }

    /// `enroll` plus the completed payment row, committed together.
    pub fn enroll_paid(
        &self,
        event_id: &str,
        user_id: &str,
        new_id: &str,
        payment: &NewPayment<'_>,
    ) -> Result<Enrollment> {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;
            let existing = latest_registration(&tx, event_id, user_id)?;
            let enrollment = upsert(&tx, existing, event_id, user_id, new_id, false, true)?;
            insert_payment(&tx, &enrollment.registration, payment)?;
            tx.commit()?;
            Ok(enrollment)
        })
    }

    pub fn get_registration(&self, id: &str) -> Result<Option<RegistrationRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM event_registrations WHERE id = ?1", REGISTRATION_COLUMNS);
            conn.query_row(&sql, [id], map_registration).optional()
        })
    }

    /// The user's active (not processed) row for the event, if any.
    pub fn active_registration(&self, event_id: &str, user_id: &str) -> Result<Option<RegistrationRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM event_registrations
                 WHERE event_id = ?1 AND user_id = ?2 AND refund_processed = 0
                 ORDER BY rowid DESC LIMIT 1",
                REGISTRATION_COLUMNS
            );
            conn.query_row(&sql, [event_id, user_id], map_registration).optional()
        })
    }

    /// All rows for an event in storage order.
    pub fn registrations_for_event(&self, event_id: &str) -> Result<Vec<RegistrationRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM event_registrations WHERE event_id = ?1 ORDER BY rowid",
                REGISTRATION_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([event_id], map_registration)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Terminal cancellation: the row stays, flagged as processed.
    pub fn finalize_cancellation(&self, id: &str, cancelled_by: &str) -> Result<RegistrationRow> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE event_registrations
                 SET refund_processed = 1, cancelled_by = ?2, cancelled_at = ?3, updated_at = ?3
                 WHERE id = ?1",
                rusqlite::params![id, cancelled_by, crate::now()],
            )?;
            fetch_registration(conn, id)
        })
    }

    /// Paid cancellation: ask for a refund, leave the registration active.
    pub fn request_refund(&self, id: &str) -> Result<RegistrationRow> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE event_registrations
                 SET refund_requested = 1, refund_requested_at = ?2, refund_approved = NULL,
                     updated_at = ?2
                 WHERE id = ?1",
                rusqlite::params![id, crate::now()],
            )?;
            fetch_registration(conn, id)
        })
    }

    /// Take the decision on a pending, undecided refund request by setting
    /// `refund_approved`. Returns false if the request is not pending or
    /// another decision already holds it.
    pub fn claim_refund(&self, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE event_registrations SET refund_approved = 1, updated_at = ?2
                 WHERE id = ?1 AND refund_requested = 1 AND refund_approved IS NULL
                   AND refund_processed = 0",
                rusqlite::params![id, crate::now()],
            )?;
            Ok(changed == 1)
        })
    }

    /// Undo `claim_refund` after the provider refused; the request is pending again.
    pub fn release_refund_claim(&self, id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE event_registrations SET refund_approved = NULL, updated_at = ?2
                 WHERE id = ?1 AND refund_approved = 1 AND refund_processed = 0",
                rusqlite::params![id, crate::now()],
            )?;
            Ok(())
        })
    }

    /// Finalize a claimed refund: the registration is cancelled by the admin
    /// and the refunded payment, if any, is marked in the same transaction.
    pub fn approve_refund(&self, id: &str, admin_id: &str, payment_id: Option<&str>) -> Result<RegistrationRow> {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;
            let now = crate::now();
            let changed = tx.execute(
                "UPDATE event_registrations
                 SET refund_processed = 1, cancelled_by = ?2, cancelled_at = ?3, updated_at = ?3
                 WHERE id = ?1 AND refund_approved = 1 AND refund_processed = 0",
                rusqlite::params![id, admin_id, now],
            )?;
            if changed != 1 {
                return Err(anyhow!("Refund for registration {} is no longer claimed", id));
            }
            if let Some(payment_id) = payment_id {
                mark_payment_refunded(&tx, payment_id)?;
            }
            let row = fetch_registration(&tx, id)?;
            tx.commit()?;
            Ok(row)
        })
    }

    /// Denied refund: the registration goes back to being confirmed. Returns
    /// `None` if the request is not pending or a decision already holds it.
    pub fn deny_refund(&self, id: &str) -> Result<Option<RegistrationRow>> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE event_registrations SET refund_approved = 0, updated_at = ?2
                 WHERE id = ?1 AND refund_requested = 1 AND refund_approved IS NULL
                   AND refund_processed = 0",
                rusqlite::params![id, crate::now()],
            )?;
            if changed == 1 {
                fetch_registration(conn, id).map(Some)
            } else {
                Ok(None)
            }
        })
    }

    /// Manual waitlist to confirmed conversion.
    pub fn promote_from_waitlist(&self, id: &str) -> Result<RegistrationRow> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE event_registrations SET is_waiting_list = 0, updated_at = ?2 WHERE id = ?1",
                rusqlite::params![id, crate::now()],
            )?;
            fetch_registration(conn, id)
        })
    }

    /// `(confirmed_count, waitlist_count)` from the counts view.
    pub fn registration_counts(&self, event_id: &str) -> Result<(u32, u32)> {
        self.with_conn(|conn| {
            let counts: Option<(u32, u32)> = conn
                .query_row(
                    "SELECT confirmed_count, waitlist_count FROM event_registration_counts
                     WHERE event_id = ?1",
                    [event_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            Ok(counts.unwrap_or((0, 0)))
        })
    }
}

fn upsert(
    conn: &Connection,
    existing: Option<RegistrationRow>,
    event_id: &str,
    user_id: &str,
    new_id: &str,
    waiting: bool,
    payment_completed: bool,
) -> Result<Enrollment> {
    let now = crate::now();

    match existing {
        Some(row) => {
            // An active row keeps a completed payment; a cancelled one starts over.
            conn.execute(
                "UPDATE event_registrations
                 SET is_waiting_list = ?2,
                     payment_completed = CASE WHEN refund_processed = 0
                                              THEN MAX(payment_completed, ?3) ELSE ?3 END,
                     refund_requested = 0, refund_requested_at = NULL, refund_approved = NULL,
                     refund_processed = 0, cancelled_by = NULL, cancelled_at = NULL,
                     updated_at = ?4
                 WHERE id = ?1",
                rusqlite::params![row.id, waiting, payment_completed, now],
            )?;
            Ok(Enrollment {
                registration: fetch_registration(conn, &row.id)?,
                inserted: false,
            })
        }
        None => {
            conn.execute(
                "INSERT INTO event_registrations
                     (id, event_id, user_id, is_waiting_list, payment_completed, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                rusqlite::params![new_id, event_id, user_id, waiting, payment_completed, now],
            )?;
            Ok(Enrollment {
                registration: fetch_registration(conn, new_id)?,
                inserted: true,
            })
        }
    }
}

fn confirmed_count_excluding(conn: &Connection, event_id: &str, user_id: &str) -> Result<u32> {
    let count: u32 = conn.query_row(
        "SELECT COUNT(*) FROM event_registrations
         WHERE event_id = ?1 AND user_id != ?2 AND is_waiting_list = 0 AND refund_processed = 0",
        [event_id, user_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

fn latest_registration(conn: &Connection, event_id: &str, user_id: &str) -> Result<Option<RegistrationRow>> {
    let sql = format!(
        "SELECT {} FROM event_registrations
         WHERE event_id = ?1 AND user_id = ?2
         ORDER BY rowid DESC LIMIT 1",
        REGISTRATION_COLUMNS
    );
    conn.query_row(&sql, [event_id, user_id], map_registration).optional()
}

fn fetch_registration(conn: &Connection, id: &str) -> Result<RegistrationRow> {
    let sql = format!("SELECT {} FROM event_registrations WHERE id = ?1", REGISTRATION_COLUMNS);
    conn.query_row(&sql, [id], map_registration)
        .optional()?
        .ok_or_else(|| anyhow!("Registration not found: {}", id))
}

fn map_registration(row: &rusqlite::Row<'_>) -> rusqlite::Result<RegistrationRow> {
    Ok(RegistrationRow {
        id: row.get(0)?,
        event_id: row.get(1)?,
        user_id: row.get(2)?,
        is_waiting_list: row.get(3)?,
        payment_completed: row.get(4)?,
        refund_requested: row.get(5)?,
        refund_requested_at: row.get(6)?,
        refund_approved: row.get(7)?,
        refund_processed: row.get(8)?,
        cancelled_by: row.get(9)?,
        cancelled_at: row.get(10)?,
        created_at: row.get(11)?,
    })
}
