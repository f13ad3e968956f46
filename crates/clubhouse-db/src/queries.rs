use std::collections::HashMap;

use crate::models::{EventRow, UserRow};
use crate::{Database, OptionalExt};
use anyhow::Result;
use rusqlite::Connection;

/// Event fields written on create and update.
pub struct NewEvent<'a> {
    pub id: &'a str,
    pub title: &'a str,
    pub description: &'a str,
    pub starts_at: Option<&'a str>,
    pub capacity: Option<i64>,
    pub tags: &'a str,
    pub pay_in_app: bool,
    pub price_cents: Option<i64>,
    pub payment_instructions: Option<&'a str>,
    pub created_by: Option<&'a str>,
}

const EVENT_COLUMNS: &str = "id, title, description, starts_at, capacity, tags, pay_in_app, \
     price_cents, payment_instructions, created_at";

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: &str,
        username: &str,
        password_hash: &str,
        display_name: &str,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, password, display_name) VALUES (?1, ?2, ?3, ?4)",
                (id, username, password_hash, display_name),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    /// Admin-role check. Unknown users are not admins.
    pub fn is_admin(&self, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let flag: Option<bool> = conn
                .query_row("SELECT is_admin FROM users WHERE id = ?1", [user_id], |row| {
                    row.get(0)
                })
                .optional()?;
            Ok(flag.unwrap_or(false))
        })
    }

    /// Returns false when no such user exists.
    pub fn set_admin_by_username(&self, username: &str, is_admin: bool) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET is_admin = ?1 WHERE username = ?2",
                rusqlite::params![is_admin, username],
            )?;
            Ok(changed > 0)
        })
    }

    /// Batch-fetch display names for a set of user IDs.
    pub fn display_names(&self, user_ids: &[String]) -> Result<HashMap<String, String>> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> = (1..=user_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT id, display_name FROM users WHERE id IN ({})",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> = user_ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();

            let names = stmt
                .query_map(params.as_slice(), |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<HashMap<String, String>, _>>()?;

            Ok(names)
        })
    }

    // -- Events --

    pub fn insert_event(&self, event: &NewEvent<'_>) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO events (id, title, description, starts_at, capacity, tags, pay_in_app,
                                     price_cents, payment_instructions, created_by, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                rusqlite::params![
                    event.id,
                    event.title,
                    event.description,
                    event.starts_at,
                    event.capacity,
                    event.tags,
                    event.pay_in_app,
                    event.price_cents,
                    event.payment_instructions,
                    event.created_by,
                    crate::now(),
                ],
            )?;
            Ok(())
        })
    }

    /// Overwrites every editable field. Returns false if the event is unknown.
    pub fn update_event(&self, event: &NewEvent<'_>) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE events SET title = ?2, description = ?3, starts_at = ?4, capacity = ?5,
                                   tags = ?6, pay_in_app = ?7, price_cents = ?8,
                                   payment_instructions = ?9
                 WHERE id = ?1",
                rusqlite::params![
                    event.id,
                    event.title,
                    event.description,
                    event.starts_at,
                    event.capacity,
                    event.tags,
                    event.pay_in_app,
                    event.price_cents,
                    event.payment_instructions,
                ],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn get_event(&self, id: &str) -> Result<Option<EventRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM events WHERE id = ?1", EVENT_COLUMNS);
            conn.query_row(&sql, [id], map_event).optional()
        })
    }

    pub fn list_events(&self) -> Result<Vec<EventRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM events ORDER BY starts_at IS NULL, starts_at, created_at",
                EVENT_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], map_event)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!(
        "SELECT id, username, password, display_name, is_admin, created_at FROM users WHERE {} = ?1",
        column
    );
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                password: row.get(2)?,
                display_name: row.get(3)?,
                is_admin: row.get(4)?,
                created_at: row.get(5)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn map_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<EventRow> {
    Ok(EventRow {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        starts_at: row.get(3)?,
        capacity: row.get(4)?,
        tags: row.get(5)?,
        pay_in_app: row.get(6)?,
        price_cents: row.get(7)?,
        payment_instructions: row.get(8)?,
        created_at: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_flag_round_trip() {
        let db = Database::open_in_memory().unwrap();
        db.create_user("u1", "alice", "hash", "Alice").unwrap();

        assert!(!db.is_admin("u1").unwrap());
        assert!(db.set_admin_by_username("alice", true).unwrap());
        assert!(db.is_admin("u1").unwrap());
        assert!(!db.set_admin_by_username("nobody", true).unwrap());
        assert!(!db.is_admin("missing").unwrap());
    }

    #[test]
    fn display_names_batch() {
        let db = Database::open_in_memory().unwrap();
        db.create_user("u1", "alice", "hash", "Alice").unwrap();
        db.create_user("u2", "bob", "hash", "Bob").unwrap();

        let names = db
            .display_names(&["u1".to_string(), "u2".to_string(), "u3".to_string()])
            .unwrap();
        assert_eq!(names.len(), 2);
        assert_eq!(names["u2"], "Bob");
        assert!(db.display_names(&[]).unwrap().is_empty());
    }

    #[test]
    fn event_update_overwrites_fields() {
        let db = Database::open_in_memory().unwrap();
        let mut event = NewEvent {
            id: "e1",
            title: "Quiz night",
            description: "",
            starts_at: None,
            capacity: Some(20),
            tags: "[]",
            pay_in_app: false,
            price_cents: None,
            payment_instructions: None,
            created_by: None,
        };
        db.insert_event(&event).unwrap();

        event.tags = r#"["registration_closed"]"#;
        event.capacity = None;
        assert!(db.update_event(&event).unwrap());

        let row = db.get_event("e1").unwrap().unwrap();
        assert_eq!(row.capacity, None);
        assert_eq!(row.tags, r#"["registration_closed"]"#);
        assert!(db.get_event("e2").unwrap().is_none());
        assert_eq!(db.list_events().unwrap().len(), 1);
    }
}
