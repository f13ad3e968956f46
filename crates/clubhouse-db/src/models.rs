/// Database row types, one per SQLite table.
/// Distinct from clubhouse-types API models to keep the DB layer independent.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub display_name: String,
    pub is_admin: bool,
    pub created_at: String,
}

pub struct EventRow {
    pub id: String,
    pub title: String,
    pub description: String,
    pub starts_at: Option<String>,
    pub capacity: Option<i64>,
    /// JSON array of tag names.
    pub tags: String,
    pub pay_in_app: bool,
    pub price_cents: Option<i64>,
    pub payment_instructions: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct RegistrationRow {
    pub id: String,
    pub event_id: String,
    pub user_id: String,
    pub is_waiting_list: bool,
    pub payment_completed: bool,
    pub refund_requested: bool,
    pub refund_requested_at: Option<String>,
    pub refund_approved: Option<bool>,
    pub refund_processed: bool,
    pub cancelled_by: Option<String>,
    pub cancelled_at: Option<String>,
    pub created_at: String,
}

pub struct GuestRow {
    pub id: String,
    pub registration_id: String,
    pub event_id: String,
    pub name: String,
    pub email: Option<String>,
}

pub struct AttendanceRow {
    pub event_id: String,
    pub user_id: String,
    pub verified_attendance: bool,
    pub verified_by: Option<String>,
    pub verified_at: Option<String>,
}

pub struct PaymentRow {
    pub id: String,
    pub event_id: String,
    pub user_id: String,
    pub registration_id: String,
    pub amount_cents: i64,
    pub payment_provider: String,
    pub provider_reference: String,
    pub status: String,
}
