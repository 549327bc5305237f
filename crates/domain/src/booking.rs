//! Booking lifecycle.
//!
//! ```text
//! pending -> confirmed -> assigned -> in_progress -> picked_up -> completed
//!    \___________\____________\____________\_____________\____> cancelled
//! ```
//!
//! `completed` and `cancelled` are terminal. Admins may move a booking to
//! any state while it is not terminal; owners may only cancel.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{user::Role, validate};

wire_enum! {
    pub enum BookingStatus as "status" {
        Pending => "pending",
        Confirmed => "confirmed",
        Assigned => "assigned",
        InProgress => "in_progress",
        PickedUp => "picked_up",
        Completed => "completed",
        Cancelled => "cancelled",
    }
}

wire_enum! {
    pub enum TimeSlot as "pickup time slot" {
        Morning => "9:00 AM - 12:00 PM",
        Midday => "12:00 PM - 3:00 PM",
        Afternoon => "3:00 PM - 6:00 PM",
        Evening => "6:00 PM - 9:00 PM",
    }
}

wire_enum! {
    pub enum PaymentStatus as "payment status" {
        Pending => "pending",
        Paid => "paid",
        Failed => "failed",
    }
}

wire_enum! {
    pub enum PaymentMethod as "payment method" {
        Cash => "cash",
        Online => "online",
        BankTransfer => "bank_transfer",
    }
}

impl Default for BookingStatus {
    fn default() -> Self {
        BookingStatus::Pending
    }
}

impl Default for PaymentStatus {
    fn default() -> Self {
        PaymentStatus::Pending
    }
}

impl Default for PaymentMethod {
    fn default() -> Self {
        PaymentMethod::Cash
    }
}

impl BookingStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }

    pub fn can_cancel(self) -> bool {
        !self.is_terminal()
    }

    /// The regular successor in the lifecycle, if any.
    pub fn next(self) -> Option<BookingStatus> {
        use BookingStatus::*;
        match self {
            Pending => Some(Confirmed),
            Confirmed => Some(Assigned),
            Assigned => Some(InProgress),
            InProgress => Some(PickedUp),
            PickedUp => Some(Completed),
            Completed | Cancelled => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Cannot change a booking that is already {0}")]
    Terminal(BookingStatus),
    #[error("Only an admin can move a booking to {0}")]
    NotPermitted(BookingStatus),
}

/// Checks whether `role` may move a booking from `from` to `to`.
///
/// Admins are not held to lifecycle adjacency, so `pending -> completed`
/// is accepted for them.
pub fn authorize_transition(
    from: BookingStatus,
    to: BookingStatus,
    role: Role,
) -> Result<(), TransitionError> {
    if from.is_terminal() {
        return Err(TransitionError::Terminal(from));
    }
    match role {
        Role::Admin => Ok(()),
        Role::Customer if to == BookingStatus::Cancelled => Ok(()),
        Role::Customer => Err(TransitionError::NotPermitted(to)),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedbackError {
    #[error("Rating must be between 1 and 5")]
    Rating,
    #[error("Feedback comment cannot exceed 500 characters")]
    CommentTooLong,
    #[error("Feedback can only be added to completed bookings")]
    NotCompleted,
    #[error("Feedback has already been submitted for this booking")]
    AlreadySubmitted,
}

/// A validated customer rating. `submitted_at` is stamped by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    pub rating: u8,
    pub comment: Option<String>,
}

impl Feedback {
    pub fn new(rating: i64, comment: Option<String>) -> Result<Self, FeedbackError> {
        let rating = u8::try_from(rating)
            .ok()
            .filter(|r| (1..=5).contains(r))
            .ok_or(FeedbackError::Rating)?;
        let comment = comment
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        if let Some(comment) = &comment {
            validate::max_len("Feedback comment", comment, validate::MAX_NOTE_LEN)
                .map_err(|_| FeedbackError::CommentTooLong)?;
        }
        Ok(Self { rating, comment })
    }
}

/// Feedback is accepted once, and only for completed bookings.
pub fn ensure_feedback_allowed(
    status: BookingStatus,
    already_submitted: bool,
) -> Result<(), FeedbackError> {
    if status != BookingStatus::Completed {
        return Err(FeedbackError::NotCompleted);
    }
    if already_submitted {
        return Err(FeedbackError::AlreadySubmitted);
    }
    Ok(())
}

/// The first day a pickup may be booked for, given today's date.
pub fn earliest_pickup_date(today: NaiveDate) -> NaiveDate {
    today.checked_add_days(Days::new(1)).unwrap_or(today)
}

pub fn validate_pickup_date(date: NaiveDate, today: NaiveDate) -> Result<(), String> {
    if date < earliest_pickup_date(today) {
        Err("Pickup date must be at least tomorrow".to_string())
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NON_TERMINAL: [BookingStatus; 5] = [
        BookingStatus::Pending,
        BookingStatus::Confirmed,
        BookingStatus::Assigned,
        BookingStatus::InProgress,
        BookingStatus::PickedUp,
    ];

    #[test]
    fn cancellable_from_every_non_terminal_state() {
        for status in NON_TERMINAL {
            assert!(status.can_cancel());
            assert!(
                authorize_transition(status, BookingStatus::Cancelled, Role::Customer).is_ok()
            );
            assert!(authorize_transition(status, BookingStatus::Cancelled, Role::Admin).is_ok());
        }
    }

    #[test]
    fn terminal_states_are_final() {
        for from in [BookingStatus::Completed, BookingStatus::Cancelled] {
            assert!(!from.can_cancel());
            for to in BookingStatus::ALL {
                assert_eq!(
                    authorize_transition(from, *to, Role::Admin),
                    Err(TransitionError::Terminal(from))
                );
            }
        }
    }

    #[test]
    fn customers_can_only_cancel() {
        assert_eq!(
            authorize_transition(BookingStatus::Pending, BookingStatus::Confirmed, Role::Customer),
            Err(TransitionError::NotPermitted(BookingStatus::Confirmed))
        );
    }

    #[test]
    fn admins_may_skip_ahead() {
        assert!(
            authorize_transition(BookingStatus::Pending, BookingStatus::Completed, Role::Admin)
                .is_ok()
        );
    }

    #[test]
    fn lifecycle_successors() {
        let mut status = BookingStatus::Pending;
        let mut seen = vec![status];
        while let Some(next) = status.next() {
            seen.push(next);
            status = next;
        }
        assert_eq!(seen.len(), 6);
        assert_eq!(status, BookingStatus::Completed);
        assert_eq!(BookingStatus::Cancelled.next(), None);
    }

    #[test]
    fn feedback_only_once_and_only_when_completed() {
        assert_eq!(
            ensure_feedback_allowed(BookingStatus::PickedUp, false),
            Err(FeedbackError::NotCompleted)
        );
        assert!(ensure_feedback_allowed(BookingStatus::Completed, false).is_ok());
        assert_eq!(
            ensure_feedback_allowed(BookingStatus::Completed, true),
            Err(FeedbackError::AlreadySubmitted)
        );
    }

    #[test]
    fn feedback_rating_range() {
        assert_eq!(Feedback::new(0, None), Err(FeedbackError::Rating));
        assert_eq!(Feedback::new(6, None), Err(FeedbackError::Rating));
        let feedback = Feedback::new(5, Some("  great  ".to_string())).unwrap();
        assert_eq!(feedback.rating, 5);
        assert_eq!(feedback.comment.as_deref(), Some("great"));
        assert_eq!(
            Feedback::new(4, Some("x".repeat(501))),
            Err(FeedbackError::CommentTooLong)
        );
    }

    #[test]
    fn pickup_must_be_tomorrow_or_later() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 31).unwrap();
        assert_eq!(
            earliest_pickup_date(today),
            NaiveDate::from_ymd_opt(2026, 4, 1).unwrap()
        );
        assert!(validate_pickup_date(today, today).is_err());
        assert!(validate_pickup_date(earliest_pickup_date(today), today).is_ok());
    }

    #[test]
    fn wire_names() {
        assert_eq!(BookingStatus::InProgress.as_str(), "in_progress");
        assert_eq!("picked_up".parse::<BookingStatus>().unwrap(), BookingStatus::PickedUp);
        assert_eq!(
            serde_json::to_string(&TimeSlot::Morning).unwrap(),
            "\"9:00 AM - 12:00 PM\""
        );
        assert_eq!(PaymentMethod::BankTransfer.to_string(), "bank_transfer");
    }
}
