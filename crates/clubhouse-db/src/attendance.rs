use anyhow::{Result, anyhow};

use crate::models::{AttendanceRow, GuestRow};
use crate::{Database, OptionalExt};

impl Database {
    // -- Attendance --

    /// Insert-or-update the (event, user) verification, stamped with the
    /// verifier and the current time. Never deletes.
    pub fn set_attendance(
        &self,
        id: &str,
        event_id: &str,
        user_id: &str,
        verified: bool,
        verified_by: &str,
    ) -> Result<AttendanceRow> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO event_attendees (id, event_id, user_id, verified_attendance, verified_by, verified_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(event_id, user_id) DO UPDATE SET
                     verified_attendance = excluded.verified_attendance,
                     verified_by = excluded.verified_by,
                     verified_at = excluded.verified_at",
                rusqlite::params![id, event_id, user_id, verified, verified_by, crate::now()],
            )?;

            conn.query_row(
                "SELECT event_id, user_id, verified_attendance, verified_by, verified_at
                 FROM event_attendees WHERE event_id = ?1 AND user_id = ?2",
                [event_id, user_id],
                map_attendance,
            )
            .map_err(|e| anyhow!("Attendance row missing after upsert: {}", e))
        })
    }

    pub fn attendance_for_event(&self, event_id: &str) -> Result<Vec<AttendanceRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT event_id, user_id, verified_attendance, verified_by, verified_at
                 FROM event_attendees WHERE event_id = ?1",
            )?;
            let rows = stmt
                .query_map([event_id], map_attendance)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Plus-one guests --

    /// One guest per registration; a second call replaces the first.
    pub fn upsert_guest(
        &self,
        id: &str,
        registration_id: &str,
        event_id: &str,
        name: &str,
        email: Option<&str>,
    ) -> Result<GuestRow> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO event_plus_one_guests (id, registration_id, event_id, name, email)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(registration_id) DO UPDATE SET
                     name = excluded.name,
                     email = excluded.email",
                rusqlite::params![id, registration_id, event_id, name, email],
            )?;
            conn.query_row(
                "SELECT id, registration_id, event_id, name, email
                 FROM event_plus_one_guests WHERE registration_id = ?1",
                [registration_id],
                map_guest,
            )
            .map_err(|e| anyhow!("Guest row missing after upsert: {}", e))
        })
    }

    /// Returns true if a guest was deleted.
    pub fn delete_guest(&self, registration_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let deleted = conn.execute(
                "DELETE FROM event_plus_one_guests WHERE registration_id = ?1",
                [registration_id],
            )?;
            Ok(deleted > 0)
        })
    }

    pub fn guest_for_registration(&self, registration_id: &str) -> Result<Option<GuestRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, registration_id, event_id, name, email
                 FROM event_plus_one_guests WHERE registration_id = ?1",
                [registration_id],
                map_guest,
            )
            .optional()
        })
    }

    pub fn guests_for_event(&self, event_id: &str) -> Result<Vec<GuestRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, registration_id, event_id, name, email
                 FROM event_plus_one_guests WHERE event_id = ?1",
            )?;
            let rows = stmt
                .query_map([event_id], map_guest)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn map_attendance(row: &rusqlite::Row<'_>) -> rusqlite::Result<AttendanceRow> {
    Ok(AttendanceRow {
        event_id: row.get(0)?,
        user_id: row.get(1)?,
        verified_attendance: row.get(2)?,
        verified_by: row.get(3)?,
        verified_at: row.get(4)?,
    })
}

fn map_guest(row: &rusqlite::Row<'_>) -> rusqlite::Result<GuestRow> {
    Ok(GuestRow {
        id: row.get(0)?,
        registration_id: row.get(1)?,
        event_id: row.get(2)?,
        name: row.get(3)?,
        email: row.get(4)?,
    })
}
