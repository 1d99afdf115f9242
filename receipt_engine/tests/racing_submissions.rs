//! Confirmation must be exactly-once under contention: N submissions racing to confirm the
//! same order end with one Confirmed transition and N-1 deterministic rejections.

use std::{io::Cursor, sync::Arc};

use chrono::{Duration, Utc};
use futures_util::future::join_all;
use log::*;
use receipt_engine::{
    events::EventProducers,
    test_utils::{
        prepare_env::{prepare_test_env, random_db_path},
        stub_ocr::ScriptedOcr,
    },
    traits::OrderStore,
    types::{NewPendingOrder, OrderId, OrderStatusType, ReceiptSubmission, RejectionReason, Verdict},
    ReceiptFlowApi,
    SqliteDatabase,
    VerifyConfig,
};
use rve_common::MoneyAmount;

const NUM_RACERS: usize = 8;

fn receipt_image(seed: u8) -> Vec<u8> {
    let img = image::RgbImage::from_fn(400, 300, |x, y| image::Rgb([seed, (x % 251) as u8, (y % 249) as u8]));
    let mut out = Vec::new();
    image::DynamicImage::ImageRgb8(img).write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png).unwrap();
    out
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_submissions_confirm_exactly_once() {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 8).await.expect("Error creating database");

    // No transaction id in the receipt text, so every racer carries a distinct image-hash
    // fingerprint and the order transition itself is the contended step.
    let ocr = ScriptedOcr::new(&[("Оплата выполнена", 0.95), ("Сумма 2500,00 ₽", 0.92)]);
    let config = VerifyConfig { ocr_base_delay_ms: 5, ocr_max_delay_ms: 20, ..VerifyConfig::default() };
    let api = Arc::new(ReceiptFlowApi::new(db.clone(), ocr, config, EventProducers::default()));

    let order_id = OrderId("RACE-1".to_string());
    let order = NewPendingOrder::new(
        order_id.clone(),
        "buyer-race".to_string(),
        MoneyAmount::from(250_000),
        Utc::now() + Duration::hours(48),
    );
    api.add_order(order).await.expect("Error registering order");

    info!("🚀️ Launching {NUM_RACERS} racing submissions");
    let tasks = (0..NUM_RACERS).map(|i| {
        let api = Arc::clone(&api);
        let order_id = order_id.clone();
        tokio::spawn(async move {
            #[allow(clippy::cast_possible_truncation)]
            let submission = ReceiptSubmission::new(format!("race-sub-{i}"), "buyer-race", receipt_image(i as u8))
                .for_order(order_id);
            api.process_submission(submission).await.expect("submission must settle")
        })
    });
    let verdicts: Vec<Verdict> =
        join_all(tasks).await.into_iter().map(|r| r.expect("task panicked").verdict).collect();

    let verified = verdicts.iter().filter(|v| v.is_verified()).count();
    let rejected = verdicts
        .iter()
        .filter(|v| matches!(v, Verdict::Rejected(RejectionReason::AlreadyConfirmed)))
        .count();
    assert_eq!(verified, 1, "exactly one racer must win: {verdicts:?}");
    assert_eq!(rejected, NUM_RACERS - 1, "all losers must see already_confirmed: {verdicts:?}");

    let order = db.fetch_order_by_order_id(&order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatusType::Confirmed);
    info!("🚀️ Race settled: 1 confirmed, {} rejected", NUM_RACERS - 1);
}
