//! Stock hold lifecycle against a real database.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use axum::http::StatusCode;
use serde_json::json;

use vendora_core::{CheckoutId, PaymentIntentId, ReservationStatus};
use vendora_integration_tests::{TestApp, payment_webhook};
use vendora_storefront::db::{OrderRepository, ReservationError, ReservationRepository, unix_now};
use vendora_storefront::models::HoldRequest;
use vendora_storefront::services::inventory::release_expired;

const TTL: Duration = Duration::from_secs(900);

async fn hold(
    app: &TestApp,
    variant_id: vendora_core::VariantId,
    quantity: i64,
    payment_intent: &str,
    ttl: Duration,
) -> CheckoutId {
    let repo = ReservationRepository::new(app.pool());
    let checkout_id = CheckoutId::generate();
    repo.create_reservation(&[HoldRequest { variant_id, quantity }], &checkout_id, ttl)
        .await
        .unwrap();
    repo.attach_payment_intent(&checkout_id, &PaymentIntentId::new(payment_intent))
        .await
        .unwrap();
    checkout_id
}

#[tokio::test]
async fn test_successful_payment_captures_stock_and_creates_one_order() {
    let mut app = TestApp::new().await;
    let variant = app.create_variant("MUG-1", 1_500, 10).await;

    let checkout_id = hold(&app, variant, 3, "pi_success", TTL).await;
    let level = app.inventory(variant).await;
    assert_eq!((level.in_stock, level.reserved), (10, 3));

    let metadata = json!({ "checkout_id": checkout_id.as_str(), "email": "buyer@example.com" });
    let (payload, signature) = payment_webhook("payment_intent.succeeded", "pi_success", 4_500, &metadata);

    let response = app.webhook(payload.clone(), &signature).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["received"], true);

    let level = app.inventory(variant).await;
    assert_eq!((level.in_stock, level.reserved), (7, 0));

    let pool = app.pool().clone();
    let orders = OrderRepository::new(&pool);
    let order = orders
        .get_by_payment_intent(&PaymentIntentId::new("pi_success"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.order.total.amount_cents, 4_500);
    assert_eq!(order.order.email.as_str(), "buyer@example.com");
    assert_eq!(order.items.len(), 1);

    // A retried delivery changes nothing.
    let response = app.webhook(payload, &signature).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(orders.count().await.unwrap(), 1);
    let level = app.inventory(variant).await;
    assert_eq!((level.in_stock, level.reserved), (7, 0));
}

#[tokio::test]
async fn test_insufficient_stock_holds_nothing() {
    let app = TestApp::new().await;
    let plenty = app.create_variant("A-1", 100, 10).await;
    let scarce = app.create_variant("B-1", 100, 1).await;

    let err = ReservationRepository::new(app.pool())
        .create_reservation(
            &[
                HoldRequest { variant_id: plenty, quantity: 2 },
                HoldRequest { variant_id: scarce, quantity: 2 },
            ],
            &CheckoutId::generate(),
            TTL,
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ReservationError::InsufficientStock { variant_id, available: 1, .. } if variant_id == scarce
    ));
    assert_eq!(app.inventory(plenty).await.reserved, 0);
    assert_eq!(app.inventory(scarce).await.reserved, 0);
}

#[tokio::test]
async fn test_concurrent_holds_never_oversell() {
    let app = TestApp::new().await;
    let variant = app.create_variant("LAST-5", 100, 5).await;

    let mut tasks = Vec::new();
    for _ in 0..12 {
        let pool = app.pool().clone();
        tasks.push(tokio::spawn(async move {
            ReservationRepository::new(&pool)
                .create_reservation(
                    &[HoldRequest { variant_id: variant, quantity: 1 }],
                    &CheckoutId::generate(),
                    TTL,
                )
                .await
        }));
    }

    let mut held = 0;
    let mut refused = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => held += 1,
            Err(ReservationError::InsufficientStock { .. }) => refused += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(held, 5);
    assert_eq!(refused, 7);
    let level = app.inventory(variant).await;
    assert_eq!((level.in_stock, level.reserved), (5, 5));
}

#[tokio::test]
async fn test_failed_payment_releases_holds() {
    let mut app = TestApp::new().await;
    let variant = app.create_variant("REL-1", 100, 4).await;
    hold(&app, variant, 4, "pi_failed", TTL).await;
    assert_eq!(app.inventory(variant).await.reserved, 4);

    let (payload, signature) =
        payment_webhook("payment_intent.payment_failed", "pi_failed", 400, &json!({}));
    let response = app.webhook(payload, &signature).await;
    assert_eq!(response.status, StatusCode::OK);

    let level = app.inventory(variant).await;
    assert_eq!((level.in_stock, level.reserved), (4, 0));
    let holds = ReservationRepository::new(app.pool())
        .list_by_payment_intent(&PaymentIntentId::new("pi_failed"))
        .await
        .unwrap();
    assert!(holds.iter().all(|h| h.status == ReservationStatus::Released));

    // Another hold on the same variant, then a retried failure delivery.
    hold(&app, variant, 1, "pi_other", TTL).await;
    let (payload, signature) =
        payment_webhook("payment_intent.payment_failed", "pi_failed", 400, &json!({}));
    let response = app.webhook(payload, &signature).await;
    assert_eq!(response.status, StatusCode::OK);

    let level = app.inventory(variant).await;
    assert_eq!((level.in_stock, level.reserved), (4, 1));
}

#[tokio::test]
async fn test_reserve_capture_and_fail_end_to_end() {
    let app = TestApp::new().await;
    let variant = app.create_variant("E2E-1", 1_000, 10).await;
    let repo = ReservationRepository::new(app.pool());

    hold(&app, variant, 2, "pi_paid", TTL).await;
    let level = app.inventory(variant).await;
    assert_eq!(level.available(), 8);
    assert!(level.reserved <= level.in_stock);

    let captured = repo
        .capture_all_reservations(&PaymentIntentId::new("pi_paid"))
        .await
        .unwrap();
    assert_eq!(captured, 1);
    let level = app.inventory(variant).await;
    assert_eq!((level.in_stock, level.reserved), (8, 0));
    let holds = repo
        .list_by_payment_intent(&PaymentIntentId::new("pi_paid"))
        .await
        .unwrap();
    assert_eq!(holds[0].status, ReservationStatus::Captured);

    hold(&app, variant, 3, "pi_declined", TTL).await;
    assert_eq!(app.inventory(variant).await.reserved, 3);
    let released = repo
        .release_reservation(&PaymentIntentId::new("pi_declined"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(released.status, ReservationStatus::Released);
    let level = app.inventory(variant).await;
    assert_eq!((level.in_stock, level.reserved), (8, 0));
}

#[tokio::test]
async fn test_capture_reservation_contract() {
    let app = TestApp::new().await;
    let variant = app.create_variant("CAP-1", 500, 6).await;
    let other = app.create_variant("CAP-2", 500, 6).await;
    let repo = ReservationRepository::new(app.pool());
    let intent = PaymentIntentId::new("pi_capture");

    let checkout_id = CheckoutId::generate();
    repo.create_reservation(
        &[
            HoldRequest { variant_id: variant, quantity: 2 },
            HoldRequest { variant_id: other, quantity: 1 },
        ],
        &checkout_id,
        TTL,
    )
    .await
    .unwrap();
    repo.attach_payment_intent(&checkout_id, &intent).await.unwrap();

    let first = repo.capture_reservation(&intent).await.unwrap().unwrap();
    assert_eq!(first.variant_id, variant);
    assert_eq!(first.status, ReservationStatus::Captured);
    assert_eq!(app.inventory(variant).await.in_stock, 4);
    assert_eq!(app.inventory(other).await.in_stock, 5);

    // Replays hand back the existing hold and move no counters.
    let again = repo.capture_reservation(&intent).await.unwrap().unwrap();
    assert_eq!(again.id, first.id);
    assert_eq!(again.status, ReservationStatus::Captured);
    assert_eq!(repo.capture_all_reservations(&intent).await.unwrap(), 0);
    let level = app.inventory(variant).await;
    assert_eq!((level.in_stock, level.reserved), (4, 0));

    // Releasing after capture leaves the captured holds alone.
    let after = repo.release_reservation(&intent).await.unwrap().unwrap();
    assert_eq!(after.status, ReservationStatus::Captured);
    assert_eq!(app.inventory(variant).await.in_stock, 4);

    let unknown = PaymentIntentId::new("pi_unknown");
    assert!(repo.capture_reservation(&unknown).await.unwrap().is_none());
    assert!(repo.release_reservation(&unknown).await.unwrap().is_none());
    assert_eq!(repo.capture_all_reservations(&unknown).await.unwrap(), 0);
}

#[tokio::test]
async fn test_release_reservation_twice_is_a_no_op() {
    let app = TestApp::new().await;
    let variant = app.create_variant("REL-2", 500, 5).await;
    let repo = ReservationRepository::new(app.pool());
    hold(&app, variant, 2, "pi_twice", TTL).await;
    hold(&app, variant, 1, "pi_keep", TTL).await;

    let intent = PaymentIntentId::new("pi_twice");
    let first = repo.release_reservation(&intent).await.unwrap().unwrap();
    assert_eq!(first.status, ReservationStatus::Released);
    assert_eq!(app.inventory(variant).await.reserved, 1);

    let second = repo.release_reservation(&intent).await.unwrap().unwrap();
    assert_eq!(second.id, first.id);
    let level = app.inventory(variant).await;
    assert_eq!((level.in_stock, level.reserved), (5, 1));
}

#[tokio::test]
async fn test_active_units_track_the_reserved_counter() {
    let app = TestApp::new().await;
    let variant = app.create_variant("SUM-1", 500, 20).await;
    let repo = ReservationRepository::new(app.pool());

    hold(&app, variant, 4, "pi_sum_a", TTL).await;
    hold(&app, variant, 3, "pi_sum_b", TTL).await;
    hold(&app, variant, 2, "pi_sum_c", TTL).await;
    repo.capture_all_reservations(&PaymentIntentId::new("pi_sum_a"))
        .await
        .unwrap();
    repo.release_reservation(&PaymentIntentId::new("pi_sum_b"))
        .await
        .unwrap();

    let level = app.inventory(variant).await;
    assert_eq!(repo.active_units(variant).await.unwrap(), level.reserved);
    assert_eq!((level.in_stock, level.reserved), (16, 2));
}

#[tokio::test]
async fn test_sweep_releases_expired_holds_only() {
    let app = TestApp::new().await;
    let variant = app.create_variant("EXP-1", 100, 10).await;
    hold(&app, variant, 2, "pi_expired", Duration::ZERO).await;
    hold(&app, variant, 3, "pi_fresh", TTL).await;

    let report = release_expired(app.pool(), unix_now() + 1).await.unwrap();
    assert_eq!(report.released_holds, 1);
    assert_eq!(report.released_units, 2);
    assert_eq!(report.payment_intents, vec![PaymentIntentId::new("pi_expired")]);

    let level = app.inventory(variant).await;
    assert_eq!((level.in_stock, level.reserved), (10, 3));

    // A second sweep finds nothing new.
    let report = release_expired(app.pool(), unix_now() + 1).await.unwrap();
    assert_eq!(report.released_holds, 0);
}

#[tokio::test]
async fn test_payment_after_sweep_still_records_order() {
    let mut app = TestApp::new().await;
    let variant = app.create_variant("LATE-1", 2_000, 5).await;
    let checkout_id = hold(&app, variant, 1, "pi_late", Duration::ZERO).await;
    release_expired(app.pool(), unix_now() + 1).await.unwrap();

    let metadata = json!({ "checkout_id": checkout_id.as_str(), "email": "late@example.com" });
    let (payload, signature) = payment_webhook("payment_intent.succeeded", "pi_late", 2_000, &metadata);
    let response = app.webhook(payload, &signature).await;
    assert_eq!(response.status, StatusCode::OK);

    let order = OrderRepository::new(app.pool())
        .get_by_payment_intent(&PaymentIntentId::new("pi_late"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.order.total.amount_cents, 2_000);

    // Released holds stay released; the stock was never consumed.
    let level = app.inventory(variant).await;
    assert_eq!((level.in_stock, level.reserved), (5, 0));
}

#[tokio::test]
async fn test_success_without_email_captures_and_waits() {
    let mut app = TestApp::new().await;
    let variant = app.create_variant("NOMAIL-1", 500, 3).await;
    let checkout_id = hold(&app, variant, 2, "pi_nomail", TTL).await;

    let metadata = json!({ "checkout_id": checkout_id.as_str() });
    let (payload, signature) = payment_webhook("payment_intent.succeeded", "pi_nomail", 1_000, &metadata);
    let response = app.webhook(payload, &signature).await;
    assert_eq!(response.status, StatusCode::OK);

    let level = app.inventory(variant).await;
    assert_eq!((level.in_stock, level.reserved), (1, 0));
    assert!(
        OrderRepository::new(app.pool())
            .get_by_payment_intent(&PaymentIntentId::new("pi_nomail"))
            .await
            .unwrap()
            .is_none()
    );
}
