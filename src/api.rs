use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{delete, get, post, put};
use axum::Router;
use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveTime, Utc};
use diesel_async::pooled_connection::bb8::Pool;
use diesel_async::AsyncPgConnection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::ServiceError;
use crate::gateway::{BookingContext, PaymentGateway, ProviderOrder};
use crate::ledger;
use crate::models::*;
use crate::notifications;
use crate::scheduler::{ReviewRequestScheduler, ScanSummary};

type DbPool = Pool<AsyncPgConnection>;

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub gateway: Arc<PaymentGateway>,
    pub scheduler: Arc<ReviewRequestScheduler>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/bookings/book", post(book_venue))
        .route(
            "/bookings/update-booking-status/:booking_id",
            put(update_booking_status),
        )
        .route("/bookings/user/:user_id", get(bookings_for_user))
        .route("/bookings/owner/:owner_id", get(bookings_for_owner))
        .route("/razorpay/create-booking", post(create_payment_order))
        .route("/razorpay/verify-payment", post(verify_payment))
        .route("/reviews/send-review-requests", post(send_review_requests))
        .route("/notifications/:user_id", get(list_notifications))
        .route("/notifications/add", post(add_notification))
        .route("/notifications/delete/:id", delete(delete_notification))
        .route(
            "/notifications/deleteall/:user_id",
            delete(delete_all_notifications),
        )
        .route("/health", get(health_check))
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookVenueRequest {
    pub booking_id: i64,
    pub user_id: Uuid,
    pub venue_id: Uuid,
    pub event_name: String,
    pub event_type: String,
    pub event_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub price: BigDecimal,
    #[serde(default)]
    pub special_requests: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookVenueResponse {
    pub success: bool,
    pub message: String,
    pub booking_id: i64,
}

async fn book_venue(
    State(state): State<AppState>,
    Json(request): Json<BookVenueRequest>,
) -> Result<(StatusCode, Json<BookVenueResponse>), ServiceError> {
    let new_booking = NewBooking {
        id: request.booking_id,
        user_id: request.user_id,
        venue_id: request.venue_id,
        event_name: request.event_name,
        event_type: request.event_type,
        booking_date: request.event_date,
        start_time: request.start_time,
        end_time: request.end_time,
        total_price: request.price,
        special_requests: request.special_requests,
        status: BookingStatus::Pending.as_str().to_string(),
    };

    let mut conn = state.pool.get().await?;
    let booking_id = ledger::create_booking(&mut conn, new_booking).await?;

    Ok((
        StatusCode::CREATED,
        Json(BookVenueResponse {
            success: true,
            message: "Booking created".to_string(),
            booking_id,
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

async fn update_booking_status(
    State(state): State<AppState>,
    Path(booking_id): Path<i64>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<Booking>, ServiceError> {
    let new_status = BookingStatus::parse(&request.status)
        .ok_or(ServiceError::UnknownStatus(request.status))?;

    let mut conn = state.pool.get().await?;
    let updated = ledger::transition_status(&mut conn, booking_id, new_status).await?;
    Ok(Json(updated))
}

async fn bookings_for_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<BookingWithVenue>>, ServiceError> {
    let mut conn = state.pool.get().await?;
    let rows = ledger::bookings_for_user(&mut conn, user_id).await?;
    Ok(Json(rows))
}

async fn bookings_for_owner(
    State(state): State<AppState>,
    Path(owner_id): Path<Uuid>,
) -> Result<Json<Vec<BookingWithParties>>, ServiceError> {
    let mut conn = state.pool.get().await?;
    let rows = ledger::bookings_for_owner(&mut conn, owner_id).await?;
    Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub amount: BigDecimal,
    pub currency: String,
}

async fn create_payment_order(
    State(state): State<AppState>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<Json<ProviderOrder>, ServiceError> {
    let order = state
        .gateway
        .client()
        .create_order(&request.amount, &request.currency)
        .await?;
    Ok(Json(order))
}

#[derive(Debug, Deserialize)]
pub struct VerifyPaymentRequest {
    pub razorpay_order_id: String,
    pub razorpay_payment_id: String,
    pub razorpay_signature: String,
    #[serde(rename = "bookingDetails")]
    pub booking_details: BookingContext,
    #[serde(rename = "paymentMethod")]
    pub payment_method: String,
}

async fn verify_payment(
    State(state): State<AppState>,
    Json(request): Json<VerifyPaymentRequest>,
) -> Result<Json<Payment>, ServiceError> {
    let payment = state
        .gateway
        .verify_and_record(
            &request.razorpay_order_id,
            &request.razorpay_payment_id,
            &request.razorpay_signature,
            request.booking_details,
            request.payment_method,
        )
        .await?;
    Ok(Json(payment))
}

#[derive(Debug, Serialize)]
pub struct ReviewScanResponse {
    pub success: bool,
    pub message: String,
    pub summary: ScanSummary,
}

async fn send_review_requests(
    State(state): State<AppState>,
) -> Result<Json<ReviewScanResponse>, ServiceError> {
    let summary = state.scheduler.run_scan(Utc::now().naive_utc()).await?;
    Ok(Json(ReviewScanResponse {
        success: true,
        message: format!("{} review request(s) sent", summary.created),
        summary,
    }))
}

async fn list_notifications(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<Notification>>, ServiceError> {
    let mut conn = state.pool.get().await?;
    let rows = notifications::list_for_user(&mut conn, user_id).await?;
    Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddNotificationRequest {
    pub user_id: Uuid,
    #[serde(default)]
    pub booking_id: Option<i64>,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
}

async fn add_notification(
    State(state): State<AppState>,
    Json(request): Json<AddNotificationRequest>,
) -> Result<(StatusCode, Json<Notification>), ServiceError> {
    let mut conn = state.pool.get().await?;
    let notification = notifications::append(
        &mut conn,
        request.user_id,
        request.booking_id,
        request.message,
        request.kind,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(notification)))
}

async fn delete_notification(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    let mut conn = state.pool.get().await?;
    notifications::delete_one(&mut conn, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct DeleteAllResponse {
    pub success: bool,
    pub deleted: usize,
}

async fn delete_all_notifications(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<DeleteAllResponse>, ServiceError> {
    let mut conn = state.pool.get().await?;
    let deleted = notifications::delete_all_for_user(&mut conn, user_id).await?;
    Ok(Json(DeleteAllResponse {
        success: true,
        deleted,
    }))
}

pub async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn book_request_uses_wire_field_names() {
        let body = serde_json::json!({
            "bookingId": 1724800000000i64,
            "userId": "7f4df8b0-0000-0000-0000-000000000001",
            "venueId": "7f4df8b0-0000-0000-0000-000000000002",
            "eventName": "Reception",
            "eventType": "Wedding",
            "eventDate": "2026-09-01",
            "startTime": "10:00:00",
            "endTime": "18:00:00",
            "price": 500,
            "specialRequests": "Vegetarian catering"
        });
        let parsed: BookVenueRequest = serde_json::from_value(body).unwrap();
        assert_eq!(parsed.booking_id, 1724800000000);
        assert_eq!(parsed.event_name, "Reception");
        assert_eq!(parsed.price, BigDecimal::from(500));
        assert_eq!(parsed.special_requests.as_deref(), Some("Vegetarian catering"));
    }

    #[test]
    fn special_requests_is_optional() {
        let body = serde_json::json!({
            "bookingId": 1,
            "userId": "7f4df8b0-0000-0000-0000-000000000001",
            "venueId": "7f4df8b0-0000-0000-0000-000000000002",
            "eventName": "Meetup",
            "eventType": "Corporate",
            "eventDate": "2026-09-01",
            "startTime": "10:00:00",
            "endTime": "12:00:00",
            "price": "149.50"
        });
        let parsed: BookVenueRequest = serde_json::from_value(body).unwrap();
        assert!(parsed.special_requests.is_none());
    }

    #[test]
    fn verify_request_uses_provider_field_names() {
        let body = serde_json::json!({
            "razorpay_order_id": "order_MkCeVzwr0cmYWF",
            "razorpay_payment_id": "pay_MkCfBEzLmXCCSt",
            "razorpay_signature": "deadbeef",
            "bookingDetails": {
                "bookingId": 42,
                "userId": "7f4df8b0-0000-0000-0000-000000000001",
                "amount": 500
            },
            "paymentMethod": "upi"
        });
        let parsed: VerifyPaymentRequest = serde_json::from_value(body).unwrap();
        assert_eq!(parsed.razorpay_order_id, "order_MkCeVzwr0cmYWF");
        assert_eq!(parsed.booking_details.booking_id, 42);
        assert_eq!(parsed.payment_method, "upi");
    }

    #[test]
    fn notification_add_accepts_type_keyword() {
        let body = serde_json::json!({
            "userId": "7f4df8b0-0000-0000-0000-000000000001",
            "bookingId": 42,
            "message": "Your booking is confirmed",
            "type": "Status_Change"
        });
        let parsed: AddNotificationRequest = serde_json::from_value(body).unwrap();
        assert_eq!(parsed.kind, "Status_Change");
        assert_eq!(parsed.booking_id, Some(42));
    }
}
