use clubhouse_types::models::RegistrationState;

/// The four stored fields that encode a registration's lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistrationFlags {
    pub is_waiting_list: bool,
    pub refund_requested: bool,
    /// `None` until an admin decides on a refund request.
    pub refund_approved: Option<bool>,
    pub refund_processed: bool,
}

impl RegistrationFlags {
    /// `refund_processed` is the inactive marker; everything else is live.
    pub fn is_active(&self) -> bool {
        !self.refund_processed
    }

    pub fn state(&self) -> RegistrationState {
        if self.refund_processed {
            RegistrationState::Cancelled
        } else if self.refund_requested && self.refund_approved != Some(false) {
            RegistrationState::PendingRefund
        } else if self.is_waiting_list {
            RegistrationState::Waitlisted
        } else {
            RegistrationState::Confirmed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_row_is_confirmed() {
        assert_eq!(RegistrationFlags::default().state(), RegistrationState::Confirmed);
    }

    #[test]
    fn processed_wins_over_everything() {
        let flags = RegistrationFlags {
            is_waiting_list: true,
            refund_requested: true,
            refund_approved: Some(true),
            refund_processed: true,
        };
        assert_eq!(flags.state(), RegistrationState::Cancelled);
        assert!(!flags.is_active());
    }

    #[test]
    fn denied_refund_returns_to_confirmed() {
        let pending = RegistrationFlags {
            refund_requested: true,
            ..Default::default()
        };
        assert_eq!(pending.state(), RegistrationState::PendingRefund);

        let denied = RegistrationFlags {
            refund_approved: Some(false),
            ..pending
        };
        assert_eq!(denied.state(), RegistrationState::Confirmed);
    }

    #[test]
    fn waitlisted_row() {
        let flags = RegistrationFlags {
            is_waiting_list: true,
            ..Default::default()
        };
        assert_eq!(flags.state(), RegistrationState::Waitlisted);
        assert!(flags.is_active());
    }
}
