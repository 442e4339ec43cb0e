use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::result::DatabaseErrorKind;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use uuid::Uuid;

use crate::error::ServiceError;
use crate::models::*;
use crate::schema::{bookings, users, venues};

/// Inserts a new Pending booking under the caller-supplied id. The id is
/// expected to be collision-resistant, so a duplicate is a Conflict, not a
/// retry hint.
pub async fn create_booking(
    conn: &mut AsyncPgConnection,
    new_booking: NewBooking,
) -> Result<i64, ServiceError> {
    match diesel::insert_into(bookings::table)
        .values(&new_booking)
        .execute(conn)
        .await
    {
        Ok(_) => Ok(new_booking.id),
        Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
            Err(ServiceError::Conflict(new_booking.id))
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn get_booking(
    conn: &mut AsyncPgConnection,
    booking_id: i64,
) -> Result<Booking, ServiceError> {
    bookings::table
        .find(booking_id)
        .first::<Booking>(conn)
        .await
        .optional()?
        .ok_or(ServiceError::NotFound)
}

/// The single authorized mutation point for booking status. Verifies the
/// transition is legal, then applies it with an update conditioned on the
/// observed status so a concurrent writer cannot be overwritten: the first
/// terminal state wins and the loser gets InvalidTransition.
pub async fn transition_status(
    conn: &mut AsyncPgConnection,
    booking_id: i64,
    new_status: BookingStatus,
) -> Result<Booking, ServiceError> {
    let booking = get_booking(conn, booking_id).await?;
    let current = BookingStatus::parse(&booking.status)
        .ok_or_else(|| ServiceError::UnknownStatus(booking.status.clone()))?;

    if current == new_status {
        return Ok(booking);
    }
    if !current.can_transition_to(new_status) {
        return Err(ServiceError::InvalidTransition {
            from: current.as_str().to_string(),
            to: new_status.as_str().to_string(),
        });
    }

    let updated = diesel::update(
        bookings::table
            .filter(bookings::id.eq(booking_id))
            .filter(bookings::status.eq(current.as_str())),
    )
    .set(bookings::status.eq(new_status.as_str()))
    .get_result::<Booking>(conn)
    .await
    .optional()?;

    match updated {
        Some(b) => Ok(b),
        None => {
            // Lost the race: report against whatever status won.
            let now = get_booking(conn, booking_id).await?;
            Err(ServiceError::InvalidTransition {
                from: now.status,
                to: new_status.as_str().to_string(),
            })
        }
    }
}

/// Bookings whose scheduled end lies strictly before `as_of`:
/// `booking_date < as_of.date OR (booking_date == as_of.date AND end_time < as_of.time)`.
/// No ordering guarantee.
pub async fn elapsed_bookings(
    conn: &mut AsyncPgConnection,
    as_of: NaiveDateTime,
) -> Result<Vec<BookingWithParties>, ServiceError> {
    let rows: Vec<(Booking, Venue, User)> = bookings::table
        .inner_join(venues::table.on(venues::id.eq(bookings::venue_id)))
        .inner_join(users::table.on(users::id.eq(bookings::user_id)))
        .filter(
            bookings::booking_date.lt(as_of.date()).or(bookings::booking_date
                .eq(as_of.date())
                .and(bookings::end_time.lt(as_of.time()))),
        )
        .select((
            bookings::all_columns,
            venues::all_columns,
            users::all_columns,
        ))
        .load(conn)
        .await?;

    Ok(rows
        .into_iter()
        .map(|(booking, venue, user)| BookingWithParties {
            booking,
            venue,
            user,
        })
        .collect())
}

pub async fn bookings_for_user(
    conn: &mut AsyncPgConnection,
    user_id: Uuid,
) -> Result<Vec<BookingWithVenue>, ServiceError> {
    let rows = bookings::table
        .inner_join(venues::table.on(venues::id.eq(bookings::venue_id)))
        .filter(bookings::user_id.eq(user_id))
        .order(bookings::created_at.desc())
        .select((bookings::all_columns, venues::all_columns))
        .load::<(Booking, Venue)>(conn)
        .await?;
    Ok(rows
        .into_iter()
        .map(|(booking, venue)| BookingWithVenue { booking, venue })
        .collect())
}

pub async fn bookings_for_owner(
    conn: &mut AsyncPgConnection,
    owner_id: Uuid,
) -> Result<Vec<BookingWithParties>, ServiceError> {
    let rows: Vec<(Booking, Venue, User)> = bookings::table
        .inner_join(venues::table.on(venues::id.eq(bookings::venue_id)))
        .inner_join(users::table.on(users::id.eq(bookings::user_id)))
        .filter(venues::owner_id.eq(owner_id))
        .order(bookings::created_at.desc())
        .select((
            bookings::all_columns,
            venues::all_columns,
            users::all_columns,
        ))
        .load(conn)
        .await?;

    Ok(rows
        .into_iter()
        .map(|(booking, venue, user)| BookingWithParties {
            booking,
            venue,
            user,
        })
        .collect())
}
