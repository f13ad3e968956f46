use anyhow::Result;

use rusqlite::Connection;

use crate::models::{PaymentRow, RegistrationRow};
use crate::{Database, OptionalExt};

pub const PAYMENT_COMPLETED: &str = "completed";
pub const PAYMENT_REFUNDED: &str = "refunded";

/// A completed provider payment; the registration it belongs to is supplied
/// by `Database::enroll_paid`.
pub struct NewPayment<'a> {
    pub id: &'a str,
    pub amount_cents: i64,
    pub payment_provider: &'a str,
    pub provider_reference: &'a str,
}

pub(crate) fn insert_payment(
    conn: &Connection,
    registration: &RegistrationRow,
    payment: &NewPayment<'_>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO event_payments
             (id, event_id, user_id, registration_id, amount_cents, payment_provider,
              provider_reference, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        rusqlite::params![
            payment.id,
            registration.event_id,
            registration.user_id,
            registration.id,
            payment.amount_cents,
            payment.payment_provider,
            payment.provider_reference,
            PAYMENT_COMPLETED,
            crate::now(),
        ],
    )?;
    Ok(())
}

pub(crate) fn mark_payment_refunded(conn: &Connection, payment_id: &str) -> Result<()> {
    conn.execute(
        "UPDATE event_payments SET status = ?2 WHERE id = ?1",
        [payment_id, PAYMENT_REFUNDED],
    )?;
    Ok(())
}

impl Database {
    /// Latest completed (not yet refunded) payment for a registration.
    pub fn completed_payment(&self, registration_id: &str) -> Result<Option<PaymentRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, event_id, user_id, registration_id, amount_cents, payment_provider,
                        provider_reference, status
                 FROM event_payments
                 WHERE registration_id = ?1 AND status = ?2
                 ORDER BY rowid DESC LIMIT 1",
                [registration_id, PAYMENT_COMPLETED],
                |row| {
                    Ok(PaymentRow {
                        id: row.get(0)?,
                        event_id: row.get(1)?,
                        user_id: row.get(2)?,
                        registration_id: row.get(3)?,
                        amount_cents: row.get(4)?,
                        payment_provider: row.get(5)?,
                        provider_reference: row.get(6)?,
                        status: row.get(7)?,
                    })
                },
            )
            .optional()
        })
    }
}
