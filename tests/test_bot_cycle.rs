//! 执行周期编排测试

mod common;

use std::sync::Arc;

use paper_quant::error::app_error::AppError;
use paper_quant::trading::model::bot::BotState;
use paper_quant::trading::store::{MemoryStore, TradingStore};
use paper_quant::trading::task::bot_cycle::{execute_cycle, run_bot_cycle, CycleOutcome};

use common::{build_context, make_bot, oscillating_candles, FakeMarketData};

#[tokio::test]
async fn test_cycle_completes_and_records_signal() {
    let store = Arc::new(MemoryStore::new());
    let market = Arc::new(FakeMarketData::new(oscillating_candles(60, 100.0)));
    let ctx = build_context(store.clone(), market);

    let bot = make_bot("b1", BotState::Running);
    store.insert_bot(&bot).await.unwrap();

    let outcome = execute_cycle(&ctx, "b1", "run_1").await.unwrap();
    match outcome {
        CycleOutcome::Completed {
            run_id, confidence, ..
        } => {
            assert_eq!(run_id, "run_1");
            assert!((0.0..=1.0).contains(&confidence));
        }
        other => panic!("expected Completed, got {:?}", other),
    }

    // 信号已落库且带完整输入哈希
    let signals = store.recent_signals("b1", 10).await.unwrap();
    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0].inputs_hash.len(), 64);

    // K线已缓存、last_run_at 已刷新
    assert_eq!(
        store.recent_candles("BTCUSDT", "1h", 100).await.unwrap().len(),
        60
    );
    let bot = store.get_bot("b1").await.unwrap().unwrap();
    assert!(bot.last_run_at.is_some());
    assert_eq!(bot.state, BotState::Running);
}

#[tokio::test]
async fn test_cycle_skipped_when_not_running() {
    let store = Arc::new(MemoryStore::new());
    let market = Arc::new(FakeMarketData::new(oscillating_candles(60, 100.0)));
    let ctx = build_context(store.clone(), market);

    for state in [BotState::Stopped, BotState::Paused, BotState::Error] {
        let bot_id = format!("b_{}", state);
        let bot = make_bot(&bot_id, state);
        store.insert_bot(&bot).await.unwrap();

        let outcome = run_bot_cycle(&ctx, &bot_id, "run_1").await.unwrap();
        assert!(matches!(outcome, CycleOutcome::Skipped { .. }));
        // 跳过的周期不产生信号
        assert!(store.recent_signals(&bot_id, 10).await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn test_cycle_unknown_bot() {
    let store = Arc::new(MemoryStore::new());
    let market = Arc::new(FakeMarketData::new(oscillating_candles(60, 100.0)));
    let ctx = build_context(store.clone(), market);

    let err = execute_cycle(&ctx, "missing", "run_1").await.unwrap_err();
    assert!(matches!(err, AppError::BotNotFound(_)));
}

#[tokio::test]
async fn test_fatal_market_data_error_moves_bot_to_error() {
    let store = Arc::new(MemoryStore::new());
    let market = Arc::new(FakeMarketData::new(oscillating_candles(60, 100.0)));
    let ctx = build_context(store.clone(), market.clone());

    let bot = make_bot("b1", BotState::Running);
    store.insert_bot(&bot).await.unwrap();

    market.set_failure("上游不可用");
    let err = execute_cycle(&ctx, "b1", "run_1").await.unwrap_err();
    assert!(matches!(err, AppError::DataUnavailable(_)));

    let bot = store.get_bot("b1").await.unwrap().unwrap();
    assert_eq!(bot.state, BotState::Error);

    // 之后的周期因状态不满足而跳过，不再反复失败
    market.clear_failure();
    let outcome = run_bot_cycle(&ctx, "b1", "run_2").await.unwrap();
    assert!(matches!(outcome, CycleOutcome::Skipped { .. }));
}

#[tokio::test]
async fn test_too_few_candles_is_fatal() {
    let store = Arc::new(MemoryStore::new());
    let market = Arc::new(FakeMarketData::new(oscillating_candles(5, 100.0)));
    let ctx = build_context(store.clone(), market);

    let bot = make_bot("b1", BotState::Running);
    store.insert_bot(&bot).await.unwrap();

    let err = execute_cycle(&ctx, "b1", "run_1").await.unwrap_err();
    assert!(matches!(err, AppError::InsufficientData(_)));
    assert_eq!(
        store.get_bot("b1").await.unwrap().unwrap().state,
        BotState::Error
    );
}

#[tokio::test]
async fn test_unregistered_strategy_is_fatal() {
    let store = Arc::new(MemoryStore::new());
    let market = Arc::new(FakeMarketData::new(oscillating_candles(60, 100.0)));
    let ctx = build_context(store.clone(), market);

    let mut bot = make_bot("b1", BotState::Running);
    bot.strategy_id = "no_such_strategy".to_string();
    store.insert_bot(&bot).await.unwrap();

    let err = execute_cycle(&ctx, "b1", "run_1").await.unwrap_err();
    assert!(matches!(err, AppError::StrategyNotRegistered(_)));
    assert_eq!(
        store.get_bot("b1").await.unwrap().unwrap().state,
        BotState::Error
    );
}

#[tokio::test]
async fn test_invalid_params_is_fatal() {
    let store = Arc::new(MemoryStore::new());
    let market = Arc::new(FakeMarketData::new(oscillating_candles(60, 100.0)));
    let ctx = build_context(store.clone(), market);

    let mut bot = make_bot("b1", BotState::Running);
    bot.params = Some(r#"{"lookback": 3}"#.to_string());
    store.insert_bot(&bot).await.unwrap();

    let err = execute_cycle(&ctx, "b1", "run_1").await.unwrap_err();
    assert!(matches!(err, AppError::StrategyEvaluationFailed(_)));
}
