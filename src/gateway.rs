use bigdecimal::BigDecimal;
use diesel::prelude::*;
use diesel::result::DatabaseErrorKind;
use diesel_async::pooled_connection::bb8::Pool;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use hmac::{Hmac, Mac};
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::ServiceError;
use crate::ledger;
use crate::models::{BookingStatus, NewPayment, Payment};
use crate::schema::payments;

type DbPool = Pool<AsyncPgConnection>;

type HmacSha256 = Hmac<Sha256>;

/// Converts a major-unit amount into the provider's minor-unit integer
/// representation (paise for INR): multiply by 100, drop sub-minor residue.
pub fn to_minor_units(amount: &BigDecimal) -> Option<i64> {
    if amount < &BigDecimal::from(0) {
        return None;
    }
    (amount * BigDecimal::from(100)).with_scale(0).to_i64()
}

/// Hex HMAC-SHA256 over `order_id + "|" + payment_id`, the proof format the
/// provider hands to the checkout client.
pub fn expected_signature(secret: &str, order_id: &str, payment_id: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(order_id.as_bytes());
    mac.update(b"|");
    mac.update(payment_id.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

pub fn verify_signature(secret: &str, order_id: &str, payment_id: &str, supplied: &str) -> bool {
    let expected = expected_signature(secret, order_id, payment_id);
    constant_time_eq::constant_time_eq(expected.as_bytes(), supplied.as_bytes())
}

/// A booking counts as already settled if a payment exists for this provider
/// order or for the booking itself: a retried checkout carries a fresh order
/// id but the same booking, and both columns are unique.
fn recorded_payment_query(
    order_id: &str,
    booking_id: i64,
) -> payments::BoxedQuery<'_, diesel::pg::Pg> {
    payments::table
        .filter(
            payments::provider_order_id
                .eq(order_id)
                .or(payments::booking_id.eq(booking_id)),
        )
        .into_boxed()
}

/// PartialSettlement promises "retry just the transition". A booking that
/// already reached a different terminal state can never be healed by a retry,
/// so those failures keep their own identity and the caller learns a refund
/// is needed instead.
fn settlement_failure(booking_id: i64, err: ServiceError) -> ServiceError {
    match err {
        e @ (ServiceError::InvalidTransition { .. } | ServiceError::UnknownStatus(_)) => e,
        _ => ServiceError::PartialSettlement { booking_id },
    }
}

#[derive(Debug, Serialize)]
struct CreateOrderBody<'a> {
    amount: i64,
    currency: &'a str,
    receipt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub receipt: Option<String>,
    pub status: Option<String>,
}

/// Thin HTTP client for the provider's order API.
#[derive(Clone)]
pub struct RazorpayClient {
    http: reqwest::Client,
    key_id: String,
    key_secret: String,
    base_url: String,
}

impl RazorpayClient {
    pub fn new(
        key_id: String,
        key_secret: String,
        base_url: String,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            key_id,
            key_secret,
            base_url,
        })
    }

    pub async fn create_order(
        &self,
        amount: &BigDecimal,
        currency: &str,
    ) -> Result<ProviderOrder, ServiceError> {
        let minor = to_minor_units(amount)
            .ok_or_else(|| ServiceError::InvalidAmount(amount.to_string()))?;
        let body = CreateOrderBody {
            amount: minor,
            currency,
            receipt: format!("rcpt_{}", Uuid::new_v4().simple()),
        };

        // Network errors and timeouts are both retryable from the top of the
        // booking-to-payment flow.
        let response = self
            .http
            .post(format!("{}/orders", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::UpstreamUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ServiceError::UpstreamUnavailable(format!(
                "provider returned {}",
                response.status()
            )));
        }

        response
            .json::<ProviderOrder>()
            .await
            .map_err(|e| ServiceError::UpstreamUnavailable(e.to_string()))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingContext {
    pub booking_id: i64,
    pub user_id: Uuid,
    pub amount: BigDecimal,
}

/// Bridges an untrusted client-submitted payment confirmation to a trusted
/// ledger state change.
#[derive(Clone)]
pub struct PaymentGateway {
    pool: DbPool,
    client: RazorpayClient,
    secret: String,
}

impl PaymentGateway {
    pub fn new(pool: DbPool, client: RazorpayClient, secret: String) -> Self {
        Self {
            pool,
            client,
            secret,
        }
    }

    pub fn client(&self) -> &RazorpayClient {
        &self.client
    }

    /// Verifies the payment proof and settles the booking.
    ///
    /// A signature mismatch fails closed before any state is touched. On
    /// success the Payment row is durable first; only then is the booking
    /// transitioned. Re-submitting an already-recorded order id skips the
    /// insert and retries just the transition, so a PartialSettlement can be
    /// healed by calling this again with the same proof.
    pub async fn verify_and_record(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
        context: BookingContext,
        payment_method: String,
    ) -> Result<Payment, ServiceError> {
        if !verify_signature(&self.secret, order_id, payment_id, signature) {
            warn!(
                "payment proof rejected for booking {} (order {})",
                context.booking_id, order_id
            );
            return Err(ServiceError::SignatureInvalid);
        }

        let mut conn = self.pool.get().await?;

        // Unknown booking is the caller's error, not a settlement failure.
        ledger::get_booking(&mut conn, context.booking_id).await?;

        let existing = recorded_payment_query(order_id, context.booking_id)
            .first::<Payment>(&mut conn)
            .await
            .optional()?;

        let payment = match existing {
            Some(p) => {
                info!(
                    "payment for booking {} already recorded, retrying settlement only",
                    p.booking_id
                );
                p
            }
            None => {
                let new_payment = NewPayment {
                    id: Uuid::new_v4(),
                    provider_order_id: order_id.to_string(),
                    provider_payment_id: payment_id.to_string(),
                    booking_id: context.booking_id,
                    user_id: context.user_id,
                    amount: context.amount.clone(),
                    payment_method,
                    payment_status: "Success".to_string(),
                };
                match diesel::insert_into(payments::table)
                    .values(&new_payment)
                    .get_result::<Payment>(&mut conn)
                    .await
                {
                    Ok(p) => p,
                    // Lost a race on one of the unique keys (same order
                    // resubmitted, or a second order for an already-paid
                    // booking); the committed row is canonical.
                    Err(diesel::result::Error::DatabaseError(
                        DatabaseErrorKind::UniqueViolation,
                        info,
                    )) => {
                        match recorded_payment_query(order_id, context.booking_id)
                            .first::<Payment>(&mut conn)
                            .await
                            .optional()?
                        {
                            Some(p) => p,
                            None => {
                                return Err(diesel::result::Error::DatabaseError(
                                    DatabaseErrorKind::UniqueViolation,
                                    info,
                                )
                                .into())
                            }
                        }
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        };

        match ledger::transition_status(&mut conn, payment.booking_id, BookingStatus::Success).await
        {
            Ok(_) => {
                info!("booking {} settled via order {}", payment.booking_id, order_id);
                Ok(payment)
            }
            Err(e) => {
                error!(
                    "payment recorded but settlement of booking {} failed: {}",
                    payment.booking_id, e
                );
                Err(settlement_failure(payment.booking_id, e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn signature_matches_known_vector() {
        // hmac_sha256("test_key_secret", "order_MkCeVzwr0cmYWF|pay_MkCfBEzLmXCCSt")
        let expected = "03820bf8c5d763510d7278d60e2992945341dde92114486984ada30a00b7d324";
        assert_eq!(
            expected_signature("test_key_secret", "order_MkCeVzwr0cmYWF", "pay_MkCfBEzLmXCCSt"),
            expected
        );
        assert!(verify_signature(
            "test_key_secret",
            "order_MkCeVzwr0cmYWF",
            "pay_MkCfBEzLmXCCSt",
            expected
        ));
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let good = expected_signature("secret", "order_1", "pay_1");
        assert_eq!(
            good,
            "52115a0d3400de9e86aade1f1b6eba9e8974604f4e267a9e9a16633a4c8dd2cb"
        );

        // Flip one character.
        let mut tampered = good.clone().into_bytes();
        tampered[0] = if tampered[0] == b'5' { b'6' } else { b'5' };
        let tampered = String::from_utf8(tampered).unwrap();
        assert!(!verify_signature("secret", "order_1", "pay_1", &tampered));

        // Wrong length and empty strings never match either.
        assert!(!verify_signature("secret", "order_1", "pay_1", ""));
        assert!(!verify_signature("secret", "order_1", "pay_1", &good[..10]));
    }

    #[test]
    fn signature_depends_on_both_ids() {
        let a = expected_signature("secret", "order_1", "pay_1");
        let b = expected_signature("secret", "order_2", "pay_1");
        let c = expected_signature("secret", "order_1", "pay_2");
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn recorded_payment_lookup_matches_either_unique_key() {
        // A second checkout for an already-paid booking arrives with a fresh
        // order id; the lookup must still find the booking's payment row.
        let sql =
            diesel::debug_query::<diesel::pg::Pg, _>(&recorded_payment_query("order_1", 42))
                .to_string();
        assert!(sql.contains("provider_order_id"));
        assert!(sql.contains(" OR "));
        assert!(sql.contains("booking_id"));
    }

    #[test]
    fn terminal_state_loss_is_not_reported_as_partial_settlement() {
        let lost = ServiceError::InvalidTransition {
            from: "Cancelled".to_string(),
            to: "Success".to_string(),
        };
        match settlement_failure(7, lost) {
            ServiceError::InvalidTransition { from, to } => {
                assert_eq!(from, "Cancelled");
                assert_eq!(to, "Success");
            }
            other => panic!("expected InvalidTransition, got {}", other),
        }
    }

    #[test]
    fn transient_failures_become_partial_settlement() {
        let cases = [
            ServiceError::Database(diesel::result::Error::NotFound),
            ServiceError::Pool("connection timed out".to_string()),
        ];
        for err in cases {
            match settlement_failure(7, err) {
                ServiceError::PartialSettlement { booking_id } => assert_eq!(booking_id, 7),
                other => panic!("expected PartialSettlement, got {}", other),
            }
        }
    }

    #[test]
    fn major_amounts_convert_to_minor_units() {
        assert_eq!(to_minor_units(&BigDecimal::from(500)), Some(50000));
        assert_eq!(
            to_minor_units(&BigDecimal::from_str("499.99").unwrap()),
            Some(49999)
        );
        assert_eq!(to_minor_units(&BigDecimal::from(0)), Some(0));
        assert_eq!(to_minor_units(&BigDecimal::from(-1)), None);
    }
}
