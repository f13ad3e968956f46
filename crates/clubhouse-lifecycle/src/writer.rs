use clubhouse_types::models::{Event, EventTag};
use thiserror::Error;

use crate::charged_in_app;
use crate::state::RegistrationFlags;

/// Shown when a cost-bearing event has no instructions of its own.
const DEFAULT_PAYMENT_INSTRUCTIONS: &str =
    "This event has a fee. Please transfer the amount to the club account before the event.";

/// Why a registration attempt was refused before anything was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("registration for this event is closed")]
    Closed,
    #[error("this event is paid in the app; complete the payment to register")]
    PaymentRequired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Confirmed,
    Waitlisted,
}

impl Placement {
    pub fn is_waiting_list(self) -> bool {
        self == Self::Waitlisted
    }
}

/// Preconditions checked before any read of the registration count.
pub fn admit(event: &Event) -> Result<(), Rejection> {
    if event.has_tag(EventTag::RegistrationClosed) {
        return Err(Rejection::Closed);
    }
    if charged_in_app(event) {
        return Err(Rejection::PaymentRequired);
    }
    Ok(())
}

/// Waitlist placement given a freshly read confirmed count.
///
/// `confirmed_count` must not include the registrant's own row. Restricted
/// events only honour the explicit waitlist tag. `FullyBooked` is a display
/// tag and does not affect placement.
pub fn place(event: &Event, confirmed_count: u32) -> Placement {
    if event.has_tag(EventTag::Waitlist) {
        return Placement::Waitlisted;
    }
    if event.has_tag(EventTag::Restricted) {
        return Placement::Confirmed;
    }
    match event.capacity {
        Some(capacity) if confirmed_count >= capacity => Placement::Waitlisted,
        _ => Placement::Confirmed,
    }
}

/// Placement for someone who may already hold a row for the event.
///
/// An active, non-waitlisted row stays confirmed: registering again never
/// pushes a member back onto the waitlist.
pub fn placement_for(
    event: &Event,
    confirmed_count: u32,
    current: Option<&RegistrationFlags>,
) -> Placement {
    match current {
        Some(flags) if flags.is_active() && !flags.is_waiting_list => Placement::Confirmed,
        _ => place(event, confirmed_count),
    }
}

/// Confirmed registrations on events not charged in the app get a
/// confirmation message.
pub fn sends_confirmation(event: &Event, placement: Placement) -> bool {
    placement == Placement::Confirmed && !charged_in_app(event)
}

/// Instructions replacing the standard success message for cost-bearing
/// events that are paid outside the app.
pub fn manual_payment_instructions(event: &Event) -> Option<String> {
    if event.has_tag(EventTag::Paid) && !event.pay_in_app {
        Some(
            event
                .payment_instructions
                .clone()
                .unwrap_or_else(|| DEFAULT_PAYMENT_INSTRUCTIONS.to_string()),
        )
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::event;

    #[test]
    fn capacity_boundary() {
        let e = event(&[], Some(10), false);
        assert_eq!(place(&e, 9), Placement::Confirmed);
        assert_eq!(place(&e, 10), Placement::Waitlisted);
        assert_eq!(place(&e, 11), Placement::Waitlisted);
    }

    #[test]
    fn unlimited_capacity_never_waitlists() {
        let e = event(&[], None, false);
        assert_eq!(place(&e, 10_000), Placement::Confirmed);
    }

    #[test]
    fn waitlist_tag_forces_waitlist() {
        let e = event(&[EventTag::Waitlist], Some(10), false);
        assert_eq!(place(&e, 0), Placement::Waitlisted);
    }

    #[test]
    fn restricted_events_skip_capacity_overflow() {
        let e = event(&[EventTag::Restricted], Some(2), false);
        assert_eq!(place(&e, 5), Placement::Confirmed);

        let tagged = event(&[EventTag::Restricted, EventTag::Waitlist], Some(2), false);
        assert_eq!(place(&tagged, 0), Placement::Waitlisted);
    }

    #[test]
    fn closed_is_checked_first() {
        let e = event(&[EventTag::RegistrationClosed, EventTag::Paid], Some(1), true);
        assert_eq!(admit(&e), Err(Rejection::Closed));
    }

    #[test]
    fn paid_in_app_is_rejected() {
        let e = event(&[EventTag::Paid], None, true);
        assert_eq!(admit(&e), Err(Rejection::PaymentRequired));
    }

    #[test]
    fn paid_outside_app_registers_with_instructions() {
        let mut e = event(&[EventTag::Paid], None, false);
        assert_eq!(admit(&e), Ok(()));
        assert_eq!(place(&e, 0), Placement::Confirmed);
        assert!(manual_payment_instructions(&e).is_some());

        e.payment_instructions = Some("Pay at the door".into());
        assert_eq!(manual_payment_instructions(&e).as_deref(), Some("Pay at the door"));
        assert!(sends_confirmation(&e, Placement::Confirmed));
    }

    #[test]
    fn free_events_have_no_payment_instructions() {
        let e = event(&[], None, true);
        assert!(manual_payment_instructions(&e).is_none());
    }

    #[test]
    fn repeat_registration_keeps_confirmed_seat() {
        let e = event(&[EventTag::Waitlist], Some(1), false);
        let confirmed = RegistrationFlags::default();
        assert_eq!(placement_for(&e, 5, Some(&confirmed)), Placement::Confirmed);

        let cancelled = RegistrationFlags {
            refund_processed: true,
            ..Default::default()
        };
        assert_eq!(placement_for(&e, 0, Some(&cancelled)), Placement::Waitlisted);

        let waiting = RegistrationFlags {
            is_waiting_list: true,
            ..Default::default()
        };
        let open = event(&[], Some(3), false);
        assert_eq!(placement_for(&open, 1, Some(&waiting)), Placement::Confirmed);
        assert_eq!(placement_for(&open, 3, None), Placement::Waitlisted);
    }

    #[test]
    fn waitlisted_gets_no_confirmation() {
        let e = event(&[], Some(1), false);
        assert!(!sends_confirmation(&e, Placement::Waitlisted));
    }
}
