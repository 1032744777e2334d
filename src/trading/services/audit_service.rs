//! 信号审计服务
//!
//! 每次策略评估的输入都以规范化JSON做 SHA-256 摘要，随信号一并落库。
//! 事后可凭同样的输入重算摘要，验证信号确实由这组输入产生。

use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::app_error::AppError;
use crate::time_util;
use crate::trading::model::bot::BotEntity;
use crate::trading::model::signal::{SignalEntity, SignalType};
use crate::trading::store::TradingStore;
use crate::trading::strategy::strategy_common::StrategyResult;

/// 递归按键名排序，保证对象键顺序不影响序列化结果
fn canonical_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted = serde_json::Map::new();
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for key in keys {
                sorted.insert(key.clone(), canonical_json(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical_json).collect()),
        other => other.clone(),
    }
}

/// 计算策略输入的 SHA-256 摘要（十六进制小写）
pub fn make_inputs_hash(inputs: &Value) -> Result<String, AppError> {
    let canonical = serde_json::to_string(&canonical_json(inputs))?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// 将策略评估结果写成不可变的信号记录
pub async fn record_signal(
    store: &dyn TradingStore,
    bot: &BotEntity,
    ts_ms: i64,
    result: &StrategyResult,
    inputs_hash: &str,
) -> Result<SignalEntity, AppError> {
    let metadata = if result.metadata.is_null() {
        None
    } else {
        Some(serde_json::to_string(&result.metadata)?)
    };
    let signal = SignalEntity {
        id: Uuid::new_v4().to_string(),
        bot_id: bot.id.clone(),
        ts: ts_ms,
        signal_type: result.signal_type,
        confidence: result.confidence,
        reason: result.reason.clone(),
        inputs_hash: inputs_hash.to_string(),
        metadata,
    };

    store
        .insert_signal(&signal)
        .await
        .map_err(|e| AppError::AuditPersistFailed(format!("bot_id={}: {}", bot.id, e)))?;

    info!(
        "信号已记录: bot_id={}, signal_id={}, type={}, confidence={:.3}",
        bot.id, signal.id, signal.signal_type, signal.confidence
    );
    Ok(signal)
}

/// 用当时的输入重算摘要，校验信号完整性
pub async fn verify_signal_integrity(
    store: &dyn TradingStore,
    signal_id: &str,
    inputs: &Value,
) -> Result<bool, AppError> {
    let signal = store
        .get_signal(signal_id)
        .await?
        .ok_or_else(|| AppError::DataUnavailable(format!("信号不存在: {}", signal_id)))?;

    let recomputed = make_inputs_hash(inputs)?;
    let matches = recomputed == signal.inputs_hash;
    if !matches {
        warn!(
            "信号完整性校验失败: signal_id={}, stored={}, recomputed={}",
            signal_id, signal.inputs_hash, recomputed
        );
    }
    Ok(matches)
}

/// 一段时间窗口内的信号统计
#[derive(Debug, Clone, serde::Serialize)]
pub struct SignalStatistics {
    pub bot_id: String,
    pub days: u32,
    pub total: usize,
    pub buy_count: usize,
    pub sell_count: usize,
    pub hold_count: usize,
    pub avg_confidence: f64,
}

pub async fn signal_statistics(
    store: &dyn TradingStore,
    bot_id: &str,
    days: u32,
) -> Result<SignalStatistics, AppError> {
    let since = time_util::now_mills() - (days as i64) * 24 * 3600 * 1000;
    let signals: Vec<SignalEntity> = store
        .recent_signals(bot_id, 10_000)
        .await?
        .into_iter()
        .filter(|s| s.ts >= since)
        .collect();

    let total = signals.len();
    let buy_count = signals
        .iter()
        .filter(|s| s.signal_type == SignalType::Buy)
        .count();
    let sell_count = signals
        .iter()
        .filter(|s| s.signal_type == SignalType::Sell)
        .count();
    let hold_count = total - buy_count - sell_count;
    let avg_confidence = if total == 0 {
        0.0
    } else {
        signals.iter().map(|s| s.confidence).sum::<f64>() / total as f64
    };

    Ok(SignalStatistics {
        bot_id: bot_id.to_string(),
        days,
        total,
        buy_count,
        sell_count,
        hold_count,
        avg_confidence,
    })
}
