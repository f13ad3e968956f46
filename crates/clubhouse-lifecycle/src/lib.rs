//! Clubhouse registration lifecycle rules.
//!
//! Pure decision logic shared by the API handlers:
//! - `state`: maps the stored registration flags to an effective state
//! - `writer`: admission and waitlist placement at registration time
//! - `cancellation`: free cancellation vs paid refund request
//! - `roster`: confirmed / waitlisted / cancelled partitioning and attribution
//!
//! Nothing here touches storage; callers read rows, ask these functions what
//! to do, and write the result.

pub mod cancellation;
pub mod roster;
pub mod state;
pub mod writer;

pub use cancellation::CancelAction;
pub use roster::{Attribution, Partition, RegistrationRecord};
pub use state::RegistrationFlags;
pub use writer::{Placement, Rejection};

use clubhouse_types::models::{Event, EventTag};

/// True when the event is cost-bearing and the charge happens inside the app.
pub fn charged_in_app(event: &Event) -> bool {
    event.has_tag(EventTag::Paid) && event.pay_in_app
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::Utc;
    use clubhouse_types::models::{Event, EventTag};
    use uuid::Uuid;

    pub fn event(tags: &[EventTag], capacity: Option<u32>, pay_in_app: bool) -> Event {
        Event {
            id: Uuid::new_v4(),
            title: "Spring drinks".into(),
            description: String::new(),
            starts_at: None,
            capacity,
            tags: tags.to_vec(),
            pay_in_app,
            price_cents: None,
            payment_instructions: None,
            created_at: Utc::now(),
        }
    }
}
