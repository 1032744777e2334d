//! 信号审计与输入哈希测试

mod common;

use std::sync::Arc;

use serde_json::json;

use paper_quant::trading::model::bot::BotState;
use paper_quant::trading::model::signal::SignalType;
use paper_quant::trading::services::audit_service::{
    make_inputs_hash, record_signal, signal_statistics, verify_signal_integrity,
};
use paper_quant::trading::store::{MemoryStore, TradingStore};
use paper_quant::trading::strategy::strategy_common::create_buy_signal;

use common::{make_bot, make_signal};

#[test]
fn test_hash_is_stable() {
    let inputs = json!({
        "bot_id": "b1",
        "candles": [[1, 100.0, 101.0, 99.0, 100.5, 10.0]],
        "params": {"lookback": 20},
    });
    let h1 = make_inputs_hash(&inputs).unwrap();
    let h2 = make_inputs_hash(&inputs).unwrap();

    assert_eq!(h1, h2);
    assert_eq!(h1.len(), 64);
    assert!(h1.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn test_hash_ignores_key_order() {
    let a = json!({"x": 1, "y": {"b": 2, "a": 3}});
    let b = json!({"y": {"a": 3, "b": 2}, "x": 1});
    assert_eq!(make_inputs_hash(&a).unwrap(), make_inputs_hash(&b).unwrap());
}

#[test]
fn test_hash_sensitive_to_values() {
    let a = json!({"close": 100.0});
    let b = json!({"close": 100.1});
    assert_ne!(make_inputs_hash(&a).unwrap(), make_inputs_hash(&b).unwrap());
}

#[tokio::test]
async fn test_record_and_verify_signal() {
    let store = MemoryStore::new();
    let bot = make_bot("b1", BotState::Running);
    let inputs = json!({"bot_id": "b1", "close": 100.0});
    let hash = make_inputs_hash(&inputs).unwrap();

    let result = create_buy_signal("breakout", 0.8, json!({"k": 1}));
    let signal = record_signal(&store, &bot, 1_700_000_000_000, &result, &hash)
        .await
        .unwrap();

    assert_eq!(signal.bot_id, "b1");
    assert_eq!(signal.signal_type, SignalType::Buy);
    assert_eq!(signal.inputs_hash, hash);
    assert!(signal.metadata.is_some());

    // 原始输入校验通过
    assert!(verify_signal_integrity(&store, &signal.id, &inputs)
        .await
        .unwrap());
    // 篡改后的输入校验失败
    let tampered = json!({"bot_id": "b1", "close": 999.0});
    assert!(!verify_signal_integrity(&store, &signal.id, &tampered)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_signal_statistics() {
    let store = MemoryStore::new();

    store
        .insert_signal(&make_signal("b1", SignalType::Buy, 0.8))
        .await
        .unwrap();
    store
        .insert_signal(&make_signal("b1", SignalType::Hold, 0.4))
        .await
        .unwrap();
    store
        .insert_signal(&make_signal("b1", SignalType::Sell, 0.6))
        .await
        .unwrap();
    // 其他机器人的信号不计入
    store
        .insert_signal(&make_signal("b2", SignalType::Buy, 0.9))
        .await
        .unwrap();

    let stats = signal_statistics(&store, "b1", 7).await.unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.buy_count, 1);
    assert_eq!(stats.sell_count, 1);
    assert_eq!(stats.hold_count, 1);
    assert!((stats.avg_confidence - 0.6).abs() < 1e-9);
}

#[tokio::test]
async fn test_statistics_empty() {
    let store = Arc::new(MemoryStore::new());
    let stats = signal_statistics(store.as_ref(), "missing", 7).await.unwrap();
    assert_eq!(stats.total, 0);
    assert_eq!(stats.avg_confidence, 0.0);
}
