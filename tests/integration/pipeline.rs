//! End-to-end pipeline runs.

use chrono::{Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use propedge::config::AppConfig;
use propedge::engine::executor::PaperVenue;
use propedge::engine::ledger::BankrollLedger;
use propedge::engine::orders::{FillSignal, Order, OrderState};
use propedge::engine::pipeline::{reconcile_orders, settle_orders, OutcomeSignal, Pipeline};
use propedge::engine::slip;
use propedge::sources::exchange::ExchangeAdapter;
use propedge::sources::sportsbook::SportsbookAdapter;
use propedge::sources::MarketSource;
use propedge::storage::{self, RunStore};
use propedge::strategy::edge::Candidate;
use propedge::types::{Direction, ExecutionMode, Outcome};

use crate::mock_source::{self, MockFeed, RecordingVenue};

// ---- helpers ---------------------------------------------------------------

fn temp_root() -> PathBuf {
    let mut p = std::env::temp_dir();
    p.push(format!("propedge_it_{}", uuid::Uuid::new_v4()));
    p
}

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()
}

fn config(root: &Path) -> AppConfig {
    let cfg = AppConfig::from_toml(&format!(
        r#"
        [engine]
        artifact_root = "{}"

        [projections]
        path = "unused.json"
        "#,
        root.join("runs").display()
    ))
    .unwrap();
    cfg.validate().unwrap();
    cfg
}

fn book(feed: MockFeed) -> MarketSource {
    MarketSource::new(
        Box::new(SportsbookAdapter::new("book")),
        Box::new(feed),
        std::time::Duration::from_secs(1),
    )
}

fn exchange(feed: MockFeed) -> MarketSource {
    MarketSource::new(
        Box::new(ExchangeAdapter::new("exchange")),
        Box::new(feed),
        std::time::Duration::from_secs(1),
    )
}

fn load_orders(store: &RunStore) -> Vec<Order> {
    store.load(date(), storage::ORDERS_FILE).unwrap().unwrap()
}

// ---- tests -----------------------------------------------------------------

#[tokio::test]
async fn test_full_run_across_sources() {
    let root = temp_root();
    let dead = MockFeed::new("dead", mock_source::sportsbook());
    dead.set_error("connection refused");
    let dead_source = MarketSource::new(
        Box::new(SportsbookAdapter::new("dead")),
        Box::new(dead.clone()),
        std::time::Duration::from_secs(1),
    );

    let ledger = Arc::new(BankrollLedger::in_memory(dec!(5000)));
    let pipeline = Pipeline::new(
        config(&root),
        Box::new(MockFeed::new("projections", mock_source::projections())),
        vec![
            book(MockFeed::new("book", mock_source::sportsbook())),
            exchange(MockFeed::new("exchange", mock_source::exchange())),
            dead_source,
        ],
        Arc::clone(&ledger),
        Box::new(PaperVenue::new()),
    );

    let report = pipeline.run(date(), Utc::now()).await.unwrap();
    assert_eq!(dead.fetch_count(), 1);
    assert_eq!(
        report.quotes,
        vec![("book".to_string(), 3), ("exchange".to_string(), 1), ("dead".to_string(), 0)]
    );
    // p3 fails the confidence gate; p1 clears on both venues.
    assert_eq!(report.candidates, 3);
    assert_eq!(report.orders, 3);
    assert_eq!(report.filled, 1);
    assert_eq!(report.open, 2);

    let store = pipeline.store();
    let candidates: Vec<Candidate> = store.load(date(), storage::CANDIDATES_FILE).unwrap().unwrap();
    let ranked: Vec<(&str, &str)> = candidates
        .iter()
        .map(|c| (c.key.entity.as_str(), c.source.as_str()))
        .collect();
    assert_eq!(ranked, vec![("p2", "book"), ("p1", "book"), ("p1", "exchange")]);
    assert_eq!(candidates[0].direction, Direction::Under);
    assert_eq!(candidates[0].mode, ExecutionMode::Take);
    assert_eq!(candidates[1].direction, Direction::Over);
    assert_eq!(candidates[1].mode, ExecutionMode::Make);
    assert!((candidates[1].edge_score - 31.707).abs() < 0.01);

    assert!(store.exists(date(), "quotes_dead.json"));
    // Sizing reads the ledger but never writes it.
    assert_eq!(ledger.read().bankroll, dec!(5000));
    assert!(ledger.history().is_empty());
    std::fs::remove_dir_all(&root).unwrap();
}

#[tokio::test]
async fn test_slip_on_disk_is_deterministic() {
    let root = temp_root();
    let pipeline = Pipeline::new(
        config(&root),
        Box::new(MockFeed::new("projections", mock_source::projections())),
        vec![book(MockFeed::new("book", mock_source::sportsbook()))],
        Arc::new(BankrollLedger::in_memory(dec!(5000))),
        Box::new(PaperVenue::new()),
    );
    pipeline.run(date(), Utc::now()).await.unwrap();
    let store = pipeline.store();

    let orders = load_orders(store);
    let on_disk = std::fs::read_to_string(store.path(date(), storage::SLIP_JSON_FILE)).unwrap();
    let first = slip::compile(date(), &orders).unwrap();
    let second = slip::compile(date(), &orders).unwrap();
    assert_eq!(first.json, on_disk);
    assert_eq!(first, second);

    let text = std::fs::read_to_string(store.path(date(), storage::SLIP_TEXT_FILE)).unwrap();
    assert_eq!(first.text, text);
    assert!(text.contains("p1"));
    assert!(text.contains("MAKE"));
    std::fs::remove_dir_all(&root).unwrap();
}

#[tokio::test]
async fn test_make_order_expires_and_stays_expired() {
    let root = temp_root();
    let projections = serde_json::json!([
        { "player": "p1", "stat": "points", "value": 27.8, "std_dev": 4.1, "confidence": 0.71 }
    ]);
    let pipeline = Pipeline::new(
        config(&root),
        Box::new(MockFeed::new("projections", projections)),
        vec![book(MockFeed::new("book", mock_source::sportsbook()))],
        Arc::new(BankrollLedger::in_memory(dec!(5000))),
        Box::new(PaperVenue::new()),
    );
    let t0 = Utc::now();
    pipeline.run(date(), t0).await.unwrap();
    let store = pipeline.store().clone();

    let orders = load_orders(&store);
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].state, OrderState::Open);
    assert_eq!(orders[0].wager.units, 4);
    assert_eq!(orders[0].wager.dollars, dec!(200));

    let early = reconcile_orders(&store, date(), &[], t0 + Duration::seconds(60)).await.unwrap();
    assert!(early.expired.is_empty());

    let later = t0 + Duration::seconds(3601);
    let first = reconcile_orders(&store, date(), &[], later).await.unwrap();
    let after_first = std::fs::read_to_string(store.path(date(), storage::ORDERS_FILE)).unwrap();
    let second = reconcile_orders(&store, date(), &[], later + Duration::seconds(1))
        .await
        .unwrap();
    let after_second = std::fs::read_to_string(store.path(date(), storage::ORDERS_FILE)).unwrap();

    assert_eq!(first.expired.len(), 1);
    assert!(second.expired.is_empty());
    assert_eq!(after_first, after_second);
    assert_eq!(load_orders(&store)[0].state, OrderState::Expired);

    // A fill arriving after expiry is rejected.
    let late = reconcile_orders(
        &store,
        date(),
        &[FillSignal { order_id: orders[0].id.clone() }],
        later + Duration::seconds(2),
    )
    .await
    .unwrap();
    assert_eq!(late.fills, 0);
    std::fs::remove_dir_all(&root).unwrap();
}

#[tokio::test]
async fn test_settlement_persists_across_reopen() {
    let root = temp_root();
    let ledger_path = root.join("ledger.json");
    std::fs::create_dir_all(&root).unwrap();

    let ledger = Arc::new(BankrollLedger::open(&ledger_path, dec!(5000)).unwrap());
    let pipeline = Pipeline::new(
        config(&root),
        Box::new(MockFeed::new("projections", mock_source::projections())),
        vec![book(MockFeed::new("book", mock_source::sportsbook()))],
        Arc::clone(&ledger),
        Box::new(PaperVenue::new()),
    );
    let t0 = Utc::now();
    pipeline.run(date(), t0).await.unwrap();
    let store = pipeline.store().clone();

    let open: Vec<FillSignal> = load_orders(&store)
        .iter()
        .filter(|o| o.state == OrderState::Open)
        .map(|o| FillSignal { order_id: o.id.clone() })
        .collect();
    reconcile_orders(&store, date(), &open, t0).await.unwrap();

    let orders = load_orders(&store);
    assert!(orders.iter().all(|o| o.state == OrderState::Filled));
    let fee = dec!(0.50);
    let outcomes: Vec<OutcomeSignal> = orders
        .iter()
        .enumerate()
        .map(|(i, o)| OutcomeSignal {
            order_id: o.id.clone(),
            outcome: if i % 2 == 0 { Outcome::Win } else { Outcome::Loss },
        })
        .collect();
    let expected: Decimal = orders
        .iter()
        .zip(&outcomes)
        .map(|(o, s)| o.settlement_payout(s.outcome, fee))
        .sum();

    let report = settle_orders(&store, &ledger, date(), &outcomes, fee).unwrap();
    assert_eq!(report.settled, orders.len());
    assert_eq!(report.pnl, expected);

    // Replaying the same outcomes changes nothing.
    let replay = settle_orders(&store, &ledger, date(), &outcomes, fee).unwrap();
    assert_eq!(replay.settled, 0);
    assert_eq!(replay.skipped, orders.len());
    drop(pipeline);
    drop(ledger);

    let reopened = BankrollLedger::open(&ledger_path, dec!(1)).unwrap();
    let snap = reopened.read();
    assert_eq!(snap.bankroll, dec!(5000) + expected);
    assert_eq!(snap.unit_value, snap.bankroll / dec!(100));
    assert_eq!(snap.settlements, orders.len());

    let exported: propedge::engine::ledger::LedgerExport =
        store.load(date(), storage::LEDGER_FILE).unwrap().unwrap();
    assert_eq!(exported.bankroll, snap.bankroll);
    std::fs::remove_dir_all(&root).unwrap();
}

#[tokio::test]
async fn test_rejected_orders_stay_new_and_cannot_settle() {
    let root = temp_root();
    let venue = RecordingVenue::rejecting(&["p2"]);
    let ledger = Arc::new(BankrollLedger::in_memory(dec!(5000)));
    let pipeline = Pipeline::new(
        config(&root),
        Box::new(MockFeed::new("projections", mock_source::projections())),
        vec![book(MockFeed::new("book", mock_source::sportsbook()))],
        Arc::clone(&ledger),
        Box::new(venue.clone()),
    );
    let report = pipeline.run(date(), Utc::now()).await.unwrap();
    assert_eq!(report.pending, 1);
    assert_eq!(venue.submitted().len(), 2);

    let store = pipeline.store().clone();
    let rejected = load_orders(&store)
        .into_iter()
        .find(|o| o.key().entity == "p2")
        .unwrap();
    assert_eq!(rejected.state, OrderState::New);

    // A stray fill signal does not promote an order the venue never took.
    let fill = FillSignal { order_id: rejected.id.clone() };
    let rec = reconcile_orders(&store, date(), &[fill], Utc::now()).await.unwrap();
    assert_eq!(rec.fills, 0);
    let reloaded = load_orders(&store)
        .into_iter()
        .find(|o| o.id == rejected.id)
        .unwrap();
    assert_eq!(reloaded.state, OrderState::New);

    let outcome = OutcomeSignal { order_id: rejected.id, outcome: Outcome::Win };
    let settle = settle_orders(&store, &ledger, date(), &[outcome], Decimal::ZERO).unwrap();
    assert_eq!(settle.settled, 0);
    assert_eq!(ledger.read().bankroll, dec!(5000));
    std::fs::remove_dir_all(&root).unwrap();
}

#[tokio::test]
async fn test_from_config_reads_files_and_skips_disabled() {
    let root = temp_root();
    std::fs::create_dir_all(&root).unwrap();
    let write = |name: &str, value: serde_json::Value| {
        let path = root.join(name);
        std::fs::write(&path, serde_json::to_string(&value).unwrap()).unwrap();
        path.display().to_string()
    };
    let projections = write("projections.json", mock_source::projections());
    let book_path = write("book.json", mock_source::sportsbook());

    let cfg = AppConfig::from_toml(&format!(
        r#"
        [engine]
        artifact_root = "{runs}"

        [projections]
        path = "{projections}"

        [[sources]]
        id = "book"
        kind = "sportsbook"
        path = "{book_path}"

        [[sources]]
        id = "missing"
        kind = "exchange"
        path = "{missing}"

        [[sources]]
        id = "off"
        kind = "exchange"
        enabled = false
        url_env = "PROPEDGE_TEST_UNSET_URL"
        "#,
        runs = root.join("runs").display(),
        missing = root.join("nope.json").display(),
    ))
    .unwrap();
    cfg.validate().unwrap();

    let pipeline =
        Pipeline::from_config(cfg, Arc::new(BankrollLedger::in_memory(dec!(5000)))).unwrap();
    let report = pipeline.run(date(), Utc::now()).await.unwrap();

    assert_eq!(
        report.quotes,
        vec![("book".to_string(), 3), ("missing".to_string(), 0)]
    );
    assert_eq!(report.candidates, 2);
    assert!(!pipeline.store().exists(date(), "quotes_off.json"));
    std::fs::remove_dir_all(&root).unwrap();
}

#[tokio::test]
async fn test_unreachable_projections_fail_run() {
    let root = temp_root();
    let feed = MockFeed::new("projections", mock_source::projections());
    feed.set_error("503 Service Unavailable");
    let pipeline = Pipeline::new(
        config(&root),
        Box::new(feed),
        vec![book(MockFeed::new("book", mock_source::sportsbook()))],
        Arc::new(BankrollLedger::in_memory(dec!(5000))),
        Box::new(PaperVenue::new()),
    );
    assert!(pipeline.run(date(), Utc::now()).await.is_err());
    assert!(!pipeline.store().exists(date(), storage::ORDERS_FILE));

    let empty = Pipeline::new(
        config(&root),
        Box::new(MockFeed::empty("projections")),
        vec![book(MockFeed::new("book", mock_source::sportsbook()))],
        Arc::new(BankrollLedger::in_memory(dec!(5000))),
        Box::new(PaperVenue::new()),
    );
    assert!(empty.run(date(), Utc::now()).await.is_err());
}
