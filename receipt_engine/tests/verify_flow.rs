//! End-to-end pipeline behaviour against a real (throwaway) SQLite backend with a scripted
//! OCR collaborator.

use std::io::Cursor;

use chrono::{Duration, Utc};
use receipt_engine::{
    events::{EventHandlers, EventHooks, EventProducers},
    test_utils::{
        prepare_env::{prepare_test_env, random_db_path},
        stub_ocr::ScriptedOcr,
    },
    traits::{FingerprintLedger, OrderStore},
    types::{
        Fingerprint,
        NewPendingOrder,
        OrderId,
        OrderStatusType,
        ReceiptSubmission,
        RejectionReason,
        ReviewReason,
        Verdict,
    },
    ReceiptFlowApi,
    SqliteDatabase,
    VerifyConfig,
};
use rve_common::MoneyAmount;

async fn new_db() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database")
}

fn test_config() -> VerifyConfig {
    VerifyConfig {
        ocr_timeout: std::time::Duration::from_millis(500),
        ocr_base_delay_ms: 5,
        ocr_max_delay_ms: 20,
        ..VerifyConfig::default()
    }
}

fn verifier(db: SqliteDatabase, ocr: ScriptedOcr) -> ReceiptFlowApi<SqliteDatabase, ScriptedOcr> {
    ReceiptFlowApi::new(db, ocr, test_config(), EventProducers::default())
}

/// A decodable grayscale-able PNG; the seed varies the pixel content and therefore the
/// content hash.
fn receipt_image(seed: u8) -> Vec<u8> {
    let img = image::RgbImage::from_fn(400, 300, |x, y| image::Rgb([seed, (x % 251) as u8, (y % 249) as u8]));
    let mut out = Vec::new();
    image::DynamicImage::ImageRgb8(img).write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png).unwrap();
    out
}

fn order(id: &str, buyer: &str, minor: i64) -> NewPendingOrder {
    NewPendingOrder::new(
        OrderId(id.to_string()),
        buyer.to_string(),
        MoneyAmount::from(minor),
        Utc::now() + Duration::hours(48),
    )
}

async fn status_of(db: &SqliteDatabase, id: &str) -> OrderStatusType {
    db.fetch_order_by_order_id(&OrderId(id.to_string())).await.unwrap().unwrap().status
}

#[tokio::test]
async fn reference_match_confirms_the_order() {
    let db = new_db().await;
    let api = verifier(
        db.clone(),
        ScriptedOcr::new(&[
            ("СберБанк Онлайн", 0.95),
            ("Сумма перевода 1 500,00 ₽", 0.90),
            ("Номер операции OP12345678", 0.88),
        ]),
    );
    let (_, inserted) = api.add_order(order("A-1001", "buyer-7", 150_000).with_reference("OP12345678")).await.unwrap();
    assert!(inserted);
    let (_, inserted) = api.add_order(order("A-1001", "buyer-7", 150_000).with_reference("OP12345678")).await.unwrap();
    assert!(!inserted, "order registration must be idempotent");

    let submission = ReceiptSubmission::new("sub-1", "buyer-7", receipt_image(1))
        .for_order(OrderId("A-1001".to_string()));
    let record = api.process_submission(submission).await.unwrap();

    assert_eq!(record.verdict, Verdict::Verified);
    assert_eq!(record.order_id, Some(OrderId("A-1001".to_string())));
    assert_eq!(record.fields.amount.as_ref().unwrap().value, MoneyAmount::from(150_000));
    assert_eq!(status_of(&db, "A-1001").await, OrderStatusType::Confirmed);
}

#[tokio::test]
async fn identical_resubmission_replays_the_original_verdict() {
    let db = new_db().await;
    let ocr = ScriptedOcr::new(&[
        ("Сумма перевода 1 500,00 ₽", 0.90),
        ("Номер операции OP23456789", 0.88),
    ]);
    let api = verifier(db.clone(), ocr);
    api.add_order(order("A-2001", "buyer-7", 150_000)).await.unwrap();

    let first = api
        .process_submission(
            ReceiptSubmission::new("sub-1", "buyer-7", receipt_image(2)).for_order(OrderId("A-2001".to_string())),
        )
        .await
        .unwrap();
    assert_eq!(first.verdict, Verdict::Verified);

    // Same proof again, new submission id: the original verdict comes back and nothing moves.
    let replay = api
        .process_submission(
            ReceiptSubmission::new("sub-2", "buyer-7", receipt_image(2)).for_order(OrderId("A-2001".to_string())),
        )
        .await
        .unwrap();
    assert_eq!(replay.verdict, Verdict::Verified);
    assert_eq!(replay.submission_id, "sub-1");
    assert_eq!(status_of(&db, "A-2001").await, OrderStatusType::Confirmed);
}

#[tokio::test]
async fn a_receipt_confirms_at_most_one_order() {
    let db = new_db().await;
    let ocr = ScriptedOcr::new(&[
        ("Сумма перевода 1 500,00 ₽", 0.90),
        ("Номер операции OP34567890", 0.88),
    ]);
    let api = verifier(db.clone(), ocr);
    api.add_order(order("A-3001", "buyer-7", 150_000)).await.unwrap();
    api.add_order(order("B-3002", "buyer-8", 150_000)).await.unwrap();

    let first = api
        .process_submission(
            ReceiptSubmission::new("sub-1", "buyer-7", receipt_image(3)).for_order(OrderId("A-3001".to_string())),
        )
        .await
        .unwrap();
    assert_eq!(first.verdict, Verdict::Verified);

    // The same transaction id presented for a different order is receipt reuse.
    let second = api
        .process_submission(
            ReceiptSubmission::new("sub-2", "buyer-8", receipt_image(4)).for_order(OrderId("B-3002".to_string())),
        )
        .await
        .unwrap();
    assert_eq!(second.verdict, Verdict::Rejected(RejectionReason::DuplicateReceipt));
    assert_eq!(status_of(&db, "B-3002").await, OrderStatusType::AwaitingPayment);

    let holder = db.claimant(&Fingerprint::TxId("OP34567890".to_string())).await.unwrap();
    assert_eq!(holder, Some(OrderId("A-3001".to_string())));
}

#[tokio::test]
async fn ambiguous_amounts_escalate_instead_of_guessing() {
    let db = new_db().await;
    let api = verifier(db.clone(), ScriptedOcr::new(&[("Оплата получена", 0.9), ("Сумма 1500,00 ₽", 0.9)]));
    api.add_order(order("C-4001", "buyer-9", 150_000)).await.unwrap();
    api.add_order(order("C-4002", "buyer-9", 150_000)).await.unwrap();

    let record = api
        .process_submission(ReceiptSubmission::new("sub-1", "buyer-9", receipt_image(5)))
        .await
        .unwrap();

    assert_eq!(record.verdict, Verdict::NeedsReview(ReviewReason::AmbiguousMatch));
    assert_eq!(record.order_id, None);
    assert_eq!(status_of(&db, "C-4001").await, OrderStatusType::AwaitingPayment);
    assert_eq!(status_of(&db, "C-4002").await, OrderStatusType::AwaitingPayment);
}

#[tokio::test]
async fn amount_within_relative_tolerance_matches() {
    let db = new_db().await;
    let api = verifier(db.clone(), ScriptedOcr::new(&[("Сумма 1000.00 ₽", 0.9)]));
    api.add_order(order("D-5001", "buyer-10", 99_999)).await.unwrap();

    let record = api
        .process_submission(
            ReceiptSubmission::new("sub-1", "buyer-10", receipt_image(6)).for_order(OrderId("D-5001".to_string())),
        )
        .await
        .unwrap();
    assert_eq!(record.verdict, Verdict::Verified);
    assert_eq!(status_of(&db, "D-5001").await, OrderStatusType::Confirmed);
}

#[tokio::test]
async fn amount_outside_tolerance_goes_to_review_and_can_be_rejected() {
    let db = new_db().await;
    let api = verifier(db.clone(), ScriptedOcr::new(&[("Сумма 1050.00 ₽", 0.9)]));
    api.add_order(order("D-6001", "buyer-11", 99_999)).await.unwrap();

    let record = api
        .process_submission(
            ReceiptSubmission::new("sub-1", "buyer-11", receipt_image(7)).for_order(OrderId("D-6001".to_string())),
        )
        .await
        .unwrap();
    assert_eq!(record.verdict, Verdict::NeedsReview(ReviewReason::Unmatched));
    assert_eq!(status_of(&db, "D-6001").await, OrderStatusType::UnderReview);

    // Manual resolution is the only way out of review.
    let resolved = api.resolve_review(&OrderId("D-6001".to_string()), false).await.unwrap();
    assert_eq!(resolved.status, OrderStatusType::Rejected);
}

#[tokio::test]
async fn expired_orders_are_never_confirmed() {
    let db = new_db().await;
    let ocr = ScriptedOcr::new(&[
        ("Сумма перевода 1 500,00 ₽", 0.90),
        ("Номер операции OP45678901", 0.88),
    ]);
    let api = verifier(db.clone(), ocr);
    let mut overdue = order("E-7001", "buyer-12", 150_000).with_reference("OP45678901");
    overdue.expires_at = Utc::now() - Duration::hours(1);
    api.add_order(overdue).await.unwrap();

    // Structurally perfect proof, but the order is past its expiry timestamp.
    let record = api
        .process_submission(
            ReceiptSubmission::new("sub-1", "buyer-12", receipt_image(8)).for_order(OrderId("E-7001".to_string())),
        )
        .await
        .unwrap();
    assert_eq!(record.verdict, Verdict::Rejected(RejectionReason::NoMatchingOrder));
    assert_ne!(status_of(&db, "E-7001").await, OrderStatusType::Confirmed);

    // The sweep moves it to Expired.
    let expired = api.expire_old_orders().await.unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(status_of(&db, "E-7001").await, OrderStatusType::Expired);
}

#[tokio::test]
async fn garbage_uploads_are_rejected_without_touching_ocr() {
    let db = new_db().await;
    let ocr = ScriptedOcr::always_failing();
    let api = verifier(db, ocr.clone());

    let record = api
        .process_submission(ReceiptSubmission::new("sub-1", "buyer-13", b"not an image at all".to_vec()))
        .await
        .unwrap();
    assert_eq!(record.verdict, Verdict::Rejected(RejectionReason::InvalidImage));
    assert_eq!(ocr.calls(), 0);
}

#[tokio::test]
async fn ocr_outage_parks_the_order_for_review() {
    let db = new_db().await;
    let api = verifier(db.clone(), ScriptedOcr::always_failing());
    api.add_order(order("F-8001", "buyer-14", 150_000)).await.unwrap();

    let record = api
        .process_submission(
            ReceiptSubmission::new("sub-1", "buyer-14", receipt_image(9)).for_order(OrderId("F-8001".to_string())),
        )
        .await
        .unwrap();
    assert_eq!(record.verdict, Verdict::NeedsReview(ReviewReason::OcrUnavailable));
    assert_eq!(status_of(&db, "F-8001").await, OrderStatusType::UnderReview);

    let resolved = api.resolve_review(&OrderId("F-8001".to_string()), true).await.unwrap();
    assert_eq!(resolved.status, OrderStatusType::Confirmed);
}

#[tokio::test]
async fn out_of_band_proof_falls_back_to_all_awaiting_orders() {
    let db = new_db().await;
    let api = verifier(db.clone(), ScriptedOcr::new(&[("Сумма 777,00 ₽", 0.9)]));
    api.add_order(order("H-1001", "buyer-16", 77_700)).await.unwrap();

    // Submitted by someone with no orders of their own (a relative paying on the buyer's
    // behalf); the engine widens the snapshot to every awaiting order.
    let record = api
        .process_submission(ReceiptSubmission::new("sub-1", "someone-else", receipt_image(11)))
        .await
        .unwrap();
    assert_eq!(record.verdict, Verdict::Verified);
    assert_eq!(status_of(&db, "H-1001").await, OrderStatusType::Confirmed);
}

#[tokio::test]
async fn verdict_and_confirmation_events_reach_registered_hooks() {
    use std::sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    };

    let db = new_db().await;
    let verdicts = Arc::new(AtomicU32::new(0));
    let confirmations = Arc::new(AtomicU32::new(0));
    let mut hooks = EventHooks::default();
    let count = verdicts.clone();
    hooks.on_verdict(move |_| {
        let count = count.clone();
        Box::pin(async move {
            count.fetch_add(1, Ordering::SeqCst);
        })
    });
    let count = confirmations.clone();
    hooks.on_order_confirmed(move |_| {
        let count = count.clone();
        Box::pin(async move {
            count.fetch_add(1, Ordering::SeqCst);
        })
    });
    let handlers = EventHandlers::new(16, hooks);
    let producers = handlers.producers();
    handlers.start_handlers().await;

    let api = ReceiptFlowApi::new(
        db.clone(),
        ScriptedOcr::new(&[("Сумма 555,00 ₽", 0.9)]),
        test_config(),
        producers,
    );
    api.add_order(order("I-1001", "buyer-17", 55_500)).await.unwrap();
    let record = api
        .process_submission(
            ReceiptSubmission::new("sub-1", "buyer-17", receipt_image(12)).for_order(OrderId("I-1001".to_string())),
        )
        .await
        .unwrap();
    assert_eq!(record.verdict, Verdict::Verified);

    // Hooks run on their own tasks; give them a moment to drain.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert_eq!(verdicts.load(Ordering::SeqCst), 1);
    assert_eq!(confirmations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn currency_mismatch_is_rejected_even_with_equal_amounts() {
    let db = new_db().await;
    let api = verifier(db.clone(), ScriptedOcr::new(&[("Amount 1500.00 USD", 0.9)]));
    api.add_order(order("G-9001", "buyer-15", 150_000)).await.unwrap();

    let record = api
        .process_submission(
            ReceiptSubmission::new("sub-1", "buyer-15", receipt_image(10)).for_order(OrderId("G-9001".to_string())),
        )
        .await
        .unwrap();
    assert_eq!(record.verdict, Verdict::Rejected(RejectionReason::CurrencyMismatch));
    assert_eq!(status_of(&db, "G-9001").await, OrderStatusType::AwaitingPayment);
}
