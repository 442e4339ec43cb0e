use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingStatus {
    Pending,
    Success,
    Cancelled,
    Refunded,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "Pending",
            BookingStatus::Success => "Success",
            BookingStatus::Cancelled => "Cancelled",
            BookingStatus::Refunded => "Refunded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Pending" => Some(BookingStatus::Pending),
            "Success" => Some(BookingStatus::Success),
            "Cancelled" => Some(BookingStatus::Cancelled),
            "Refunded" => Some(BookingStatus::Refunded),
            _ => None,
        }
    }

    /// Legal moves: Pending -> Success, Pending -> Cancelled, Success -> Refunded.
    /// A transition to the current status is allowed as an idempotent no-op so
    /// that re-submitting an already-settled payment does not fail.
    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        if *self == next {
            return true;
        }
        matches!(
            (self, next),
            (BookingStatus::Pending, BookingStatus::Success)
                | (BookingStatus::Pending, BookingStatus::Cancelled)
                | (BookingStatus::Success, BookingStatus::Refunded)
        )
    }
}

#[derive(Debug, Clone, Queryable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::bookings)]
pub struct Booking {
    pub id: i64,
    pub user_id: Uuid,
    pub venue_id: Uuid,
    pub event_name: String,
    pub event_type: String,
    pub booking_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub total_price: bigdecimal::BigDecimal,
    pub special_requests: Option<String>,
    pub status: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl Booking {
    /// True once the booking's scheduled end lies strictly in the past.
    /// `end_time == as_of.time()` on the same day is not elapsed yet.
    pub fn has_elapsed(&self, as_of: NaiveDateTime) -> bool {
        self.booking_date < as_of.date()
            || (self.booking_date == as_of.date() && self.end_time < as_of.time())
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::bookings)]
pub struct NewBooking {
    pub id: i64,
    pub user_id: Uuid,
    pub venue_id: Uuid,
    pub event_name: String,
    pub event_type: String,
    pub booking_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub total_price: bigdecimal::BigDecimal,
    pub special_requests: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, Queryable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::payments)]
pub struct Payment {
    pub id: Uuid,
    pub provider_order_id: String,
    pub provider_payment_id: String,
    pub booking_id: i64,
    pub user_id: Uuid,
    pub amount: bigdecimal::BigDecimal,
    pub payment_method: String,
    pub payment_status: String,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::payments)]
pub struct NewPayment {
    pub id: Uuid,
    pub provider_order_id: String,
    pub provider_payment_id: String,
    pub booking_id: i64,
    pub user_id: Uuid,
    pub amount: bigdecimal::BigDecimal,
    pub payment_method: String,
    pub payment_status: String,
}

#[derive(Debug, Clone, Queryable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::notifications)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub booking_id: Option<i64>,
    pub message: String,
    #[diesel(column_name = type_)]
    #[serde(rename = "type")]
    pub kind: String,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::notifications)]
pub struct NewNotification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub booking_id: Option<i64>,
    pub message: String,
    #[diesel(column_name = type_)]
    pub kind: String,
}

pub const REVIEW_REQUEST_KIND: &str = "Review_Request";

#[derive(Debug, Clone, Queryable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::venues)]
pub struct Venue {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub price: bigdecimal::BigDecimal,
    pub category: String,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Queryable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::users)]
pub struct User {
    pub id: Uuid,
    pub first_name: String,
    pub email: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// Join result for the scheduler scan and the owner dashboard. Each entity
/// keeps its own namespace; rows are never flattened into one record.
#[derive(Debug, Clone, Serialize)]
pub struct BookingWithParties {
    pub booking: Booking,
    pub venue: Venue,
    pub user: User,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingWithVenue {
    pub booking: Booking,
    pub venue: Venue,
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use chrono::NaiveDate;

    fn booking_on(date: NaiveDate, end_time: NaiveTime) -> Booking {
        Booking {
            id: 1,
            user_id: Uuid::new_v4(),
            venue_id: Uuid::new_v4(),
            event_name: "Reception".to_string(),
            event_type: "Wedding".to_string(),
            booking_date: date,
            start_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            end_time,
            total_price: BigDecimal::from(500),
            special_requests: None,
            status: "Pending".to_string(),
            created_at: None,
        }
    }

    #[test]
    fn status_round_trips() {
        for s in [
            BookingStatus::Pending,
            BookingStatus::Success,
            BookingStatus::Cancelled,
            BookingStatus::Refunded,
        ] {
            assert_eq!(BookingStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(BookingStatus::parse("Paid"), None);
    }

    #[test]
    fn legal_transitions_only() {
        use BookingStatus::*;
        assert!(Pending.can_transition_to(Success));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Success.can_transition_to(Refunded));

        assert!(!Pending.can_transition_to(Refunded));
        assert!(!Success.can_transition_to(Cancelled));
        assert!(!Success.can_transition_to(Pending));
        assert!(!Cancelled.can_transition_to(Success));
        assert!(!Cancelled.can_transition_to(Refunded));
        assert!(!Refunded.can_transition_to(Success));
    }

    #[test]
    fn same_status_is_idempotent() {
        use BookingStatus::*;
        for s in [Pending, Success, Cancelled, Refunded] {
            assert!(s.can_transition_to(s));
        }
    }

    #[test]
    fn elapsed_on_earlier_date() {
        let b = booking_on(
            NaiveDate::from_ymd_opt(2026, 8, 27).unwrap(),
            NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
        );
        let as_of = NaiveDate::from_ymd_opt(2026, 8, 28)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        assert!(b.has_elapsed(as_of));
    }

    #[test]
    fn elapsed_same_day_after_end() {
        let day = NaiveDate::from_ymd_opt(2026, 8, 28).unwrap();
        let b = booking_on(day, NaiveTime::from_hms_opt(8, 0, 0).unwrap());
        assert!(b.has_elapsed(day.and_hms_opt(9, 0, 0).unwrap()));
    }

    #[test]
    fn not_elapsed_at_exact_end_time() {
        let day = NaiveDate::from_ymd_opt(2026, 8, 28).unwrap();
        let b = booking_on(day, NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        assert!(!b.has_elapsed(day.and_hms_opt(9, 0, 0).unwrap()));
    }

    #[test]
    fn not_elapsed_on_future_date() {
        let b = booking_on(
            NaiveDate::from_ymd_opt(2026, 8, 29).unwrap(),
            NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
        );
        let as_of = NaiveDate::from_ymd_opt(2026, 8, 28)
            .unwrap()
            .and_hms_opt(23, 0, 0)
            .unwrap();
        assert!(!b.has_elapsed(as_of));
    }
}
