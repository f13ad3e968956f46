use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Event, EventTag, PaymentProvider, PlusOneGuest, RegistrationState};

// -- JWT Claims --

/// JWT claims shared across clubhouse-api (REST middleware) and
/// clubhouse-gateway (WebSocket authentication).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterAccountRequest {
    pub username: String,
    pub password: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterAccountResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub is_admin: bool,
    pub token: String,
}

// -- Events --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EventRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub starts_at: Option<DateTime<Utc>>,
    pub capacity: Option<u32>,
    #[serde(default)]
    pub tags: Vec<EventTag>,
    #[serde(default)]
    pub pay_in_app: bool,
    pub price_cents: Option<i64>,
    pub payment_instructions: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventSummary {
    #[serde(flatten)]
    pub event: Event,
    pub confirmed_count: u32,
    pub waitlist_count: u32,
}

#[derive(Debug, Serialize)]
pub struct EventDetailResponse {
    #[serde(flatten)]
    pub summary: EventSummary,
    /// The caller's own active registration, if any.
    pub my_registration: Option<MyRegistration>,
}

#[derive(Debug, Serialize)]
pub struct MyRegistration {
    pub registration_id: Uuid,
    pub state: RegistrationState,
    pub plus_one: Option<PlusOneGuest>,
}

// -- Registration lifecycle --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    Confirmed,
    Waitlisted,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub registration_id: Uuid,
    pub status: RegistrationStatus,
    /// Present for cost-bearing events paid outside the app.
    pub manual_payment: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationState {
    Finalized,
    PendingApproval,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub registration_id: Uuid,
    pub state: CancellationState,
}

// -- Plus-one --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GuestRequest {
    pub name: String,
    pub email: Option<String>,
}

// -- Roster --

#[derive(Debug, Serialize)]
pub struct RosterEntry {
    /// 1-based display position in storage order. Not a promotion priority.
    pub position: usize,
    pub registration_id: Uuid,
    pub user_id: Uuid,
    pub display_name: String,
    pub verified_attendance: bool,
    pub payment_completed: bool,
    pub refund_requested: bool,
    pub refund_approved: Option<bool>,
    pub plus_one: Option<PlusOneGuest>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CancelledByView {
    #[serde(rename = "self")]
    SelfCancelled,
    Admin { user_id: Uuid, display_name: String },
    Unknown,
}

#[derive(Debug, Serialize)]
pub struct CancelledEntry {
    pub registration_id: Uuid,
    pub user_id: Uuid,
    pub display_name: String,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_by: CancelledByView,
}

#[derive(Debug, Serialize)]
pub struct RosterResponse {
    pub event_id: Uuid,
    pub confirmed: Vec<RosterEntry>,
    pub waitlisted: Vec<RosterEntry>,
    pub cancelled: Vec<CancelledEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttendanceRequest {
    pub verified: bool,
}

#[derive(Debug, Serialize)]
pub struct AttendanceResponse {
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub verified_attendance: bool,
    pub verified_by: Uuid,
    pub verified_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckInRequest {
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct CodeResponse {
    pub code: String,
}

// -- Payments & refunds --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordPaymentRequest {
    pub user_id: Uuid,
    pub amount_cents: i64,
    pub provider: PaymentProvider,
    pub provider_reference: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RefundDecisionRequest {
    pub approve: bool,
}

#[derive(Debug, Serialize)]
pub struct RefundDecisionResponse {
    pub registration_id: Uuid,
    pub state: RegistrationState,
    pub refunded: bool,
}

// -- Errors --

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}
