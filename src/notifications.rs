use diesel::dsl::count_star;
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use uuid::Uuid;

use crate::error::ServiceError;
use crate::models::{NewNotification, Notification, REVIEW_REQUEST_KIND};
use crate::schema::notifications;

pub async fn append(
    conn: &mut AsyncPgConnection,
    user_id: Uuid,
    booking_id: Option<i64>,
    message: String,
    kind: String,
) -> Result<Notification, ServiceError> {
    let new_notification = NewNotification {
        id: Uuid::new_v4(),
        user_id,
        booking_id,
        message,
        kind,
    };

    let notification = diesel::insert_into(notifications::table)
        .values(&new_notification)
        .get_result::<Notification>(conn)
        .await?;
    Ok(notification)
}

pub async fn list_for_user(
    conn: &mut AsyncPgConnection,
    user_id: Uuid,
) -> Result<Vec<Notification>, ServiceError> {
    let rows = notifications::table
        .filter(notifications::user_id.eq(user_id))
        .order(notifications::created_at.desc())
        .load::<Notification>(conn)
        .await?;
    Ok(rows)
}

pub async fn delete_one(
    conn: &mut AsyncPgConnection,
    notification_id: Uuid,
) -> Result<(), ServiceError> {
    let deleted = diesel::delete(notifications::table.find(notification_id))
        .execute(conn)
        .await?;
    if deleted == 0 {
        return Err(ServiceError::NotFound);
    }
    Ok(())
}

pub async fn delete_all_for_user(
    conn: &mut AsyncPgConnection,
    user_id: Uuid,
) -> Result<usize, ServiceError> {
    let deleted = diesel::delete(notifications::table.filter(notifications::user_id.eq(user_id)))
        .execute(conn)
        .await?;
    Ok(deleted)
}

/// Dedup probe for the review scan. With `booking_id = None` the check is
/// user-scoped (any prior review request for this user suppresses a new one);
/// with `Some(id)` it is scoped to that booking.
pub async fn exists_review_request(
    conn: &mut AsyncPgConnection,
    user_id: Uuid,
    booking_id: Option<i64>,
) -> Result<bool, ServiceError> {
    let base = notifications::table
        .filter(notifications::user_id.eq(user_id))
        .filter(notifications::type_.eq(REVIEW_REQUEST_KIND));

    let count: i64 = match booking_id {
        Some(id) => {
            base.filter(notifications::booking_id.eq(id))
                .select(count_star())
                .get_result(conn)
                .await?
        }
        None => base.select(count_star()).get_result(conn).await?,
    };
    Ok(count > 0)
}
