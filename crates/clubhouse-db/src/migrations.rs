use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id            TEXT PRIMARY KEY,
                username      TEXT NOT NULL UNIQUE,
                password      TEXT NOT NULL,
                display_name  TEXT NOT NULL,
                is_admin      INTEGER NOT NULL DEFAULT 0,
                created_at    TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE events (
                id                    TEXT PRIMARY KEY,
                title                 TEXT NOT NULL,
                description           TEXT NOT NULL DEFAULT '',
                starts_at             TEXT,
                capacity              INTEGER,
                tags                  TEXT NOT NULL DEFAULT '[]',
                pay_in_app            INTEGER NOT NULL DEFAULT 0,
                price_cents           INTEGER,
                payment_instructions  TEXT,
                created_by            TEXT REFERENCES users(id),
                created_at            TEXT NOT NULL DEFAULT (datetime('now'))
            );

            -- No UNIQUE(event_id, user_id): cancelled rows are kept for audit
            -- and re-registration reuses the latest row.
            CREATE TABLE event_registrations (
                id                   TEXT PRIMARY KEY,
                event_id             TEXT NOT NULL REFERENCES events(id) ON DELETE CASCADE,
                user_id              TEXT NOT NULL REFERENCES users(id),
                is_waiting_list      INTEGER NOT NULL DEFAULT 0,
                payment_completed    INTEGER NOT NULL DEFAULT 0,
                refund_requested     INTEGER NOT NULL DEFAULT 0,
                refund_requested_at  TEXT,
                refund_approved      INTEGER,
                refund_processed     INTEGER NOT NULL DEFAULT 0,
                cancelled_by         TEXT,
                cancelled_at         TEXT,
                created_at           TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at           TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_registrations_event_user
                ON event_registrations(event_id, user_id);

            CREATE TABLE event_plus_one_guests (
                id               TEXT PRIMARY KEY,
                registration_id  TEXT NOT NULL UNIQUE REFERENCES event_registrations(id),
                event_id         TEXT NOT NULL REFERENCES events(id) ON DELETE CASCADE,
                name             TEXT NOT NULL,
                email            TEXT,
                created_at       TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE event_attendees (
                id                   TEXT PRIMARY KEY,
                event_id             TEXT NOT NULL REFERENCES events(id) ON DELETE CASCADE,
                user_id              TEXT NOT NULL REFERENCES users(id),
                verified_attendance  INTEGER NOT NULL DEFAULT 0,
                verified_by          TEXT,
                verified_at          TEXT,
                UNIQUE(event_id, user_id)
            );

            CREATE TABLE event_payments (
                id                  TEXT PRIMARY KEY,
                event_id            TEXT NOT NULL REFERENCES events(id) ON DELETE CASCADE,
                user_id             TEXT NOT NULL REFERENCES users(id),
                registration_id     TEXT NOT NULL REFERENCES event_registrations(id),
                amount_cents        INTEGER NOT NULL,
                payment_provider    TEXT NOT NULL,
                provider_reference  TEXT NOT NULL,
                status              TEXT NOT NULL DEFAULT 'completed',
                created_at          TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_payments_registration
                ON event_payments(registration_id);

            CREATE VIEW event_registration_counts AS
                SELECT event_id,
                       SUM(CASE WHEN is_waiting_list = 0 THEN 1 ELSE 0 END) AS confirmed_count,
                       SUM(CASE WHEN is_waiting_list = 1 THEN 1 ELSE 0 END) AS waitlist_count
                FROM event_registrations
                WHERE refund_processed = 0
                GROUP BY event_id;

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
