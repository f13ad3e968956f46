use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status tags an admin attaches to an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventTag {
    RegistrationClosed,
    FullyBooked,
    Waitlist,
    /// Cost-bearing event.
    Paid,
    /// Invite-only event; exempt from the capacity overflow rule.
    Restricted,
    /// Registrants may bring one guest.
    PlusOne,
}

/// Effective state of a registration, derived from its stored flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationState {
    Confirmed,
    Waitlisted,
    PendingRefund,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentProvider {
    Stripe,
    Mollie,
    Paypal,
}

impl PaymentProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stripe => "stripe",
            Self::Mollie => "mollie",
            Self::Paypal => "paypal",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "stripe" => Some(Self::Stripe),
            "mollie" => Some(Self::Mollie),
            "paypal" => Some(Self::Paypal),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub starts_at: Option<DateTime<Utc>>,
    /// `None` means unlimited.
    pub capacity: Option<u32>,
    pub tags: Vec<EventTag>,
    /// Payment for this event is charged inside the app.
    pub pay_in_app: bool,
    pub price_cents: Option<i64>,
    pub payment_instructions: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Event {
    pub fn has_tag(&self, tag: EventTag) -> bool {
        self.tags.contains(&tag)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlusOneGuest {
    pub id: Uuid,
    pub registration_id: Uuid,
    pub name: String,
    pub email: Option<String>,
}
